//! Receive adapter: evaluates a PromQL query on a schedule and forwards each
//! result to the sink.

use crate::{
    config::AdapterConfig,
    crds::PROMQL_EVENT_TYPE,
    duration,
    error::Result,
    schedule::Schedule,
    telemetry::AdapterMetrics,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::{error, info, instrument, warn};

pub mod cloudevents;
pub mod prometheus;

use cloudevents::CloudEvent;
use prometheus::PrometheusClient;

pub struct Adapter {
    sink: String,
    server_url: String,
    promql: String,
    schedule: Schedule,
    step: Option<chrono::Duration>,
    prometheus: PrometheusClient,
    http: reqwest::Client,
    metrics: AdapterMetrics,
}

impl Adapter {
    pub fn new(config: &AdapterConfig, metrics: AdapterMetrics) -> Result<Self> {
        let schedule = Schedule::parse(&config.schedule)?;
        let step = config.step.as_deref().map(duration::parse).transpose()?;
        let prometheus = PrometheusClient::new(
            &config.server_url,
            config.auth_token_file.as_deref(),
            config.ca_cert_config_map.as_deref(),
        )?;

        Ok(Adapter {
            sink: config.sink.clone(),
            server_url: config.server_url.clone(),
            promql: config.promql.clone(),
            schedule,
            step,
            prometheus,
            http: reqwest::Client::new(),
            metrics,
        })
    }

    /// Run until `shutdown` resolves or the schedule has no further activation.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        let mut previous = Utc::now();

        loop {
            // activations missed while a query was running are skipped
            let Some(next) = self.schedule.next_after(previous.max(Utc::now())) else {
                warn!("Schedule has no further activations, stopping");
                return Ok(());
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut shutdown => {
                    info!("Shutting down receive adapter");
                    return Ok(());
                }
            }

            self.tick(previous, next).await;
            previous = next;
        }
    }

    #[instrument(skip(self))]
    async fn tick(&self, start: DateTime<Utc>, at: DateTime<Utc>) {
        self.metrics.queries.inc();
        let result = match self.step {
            Some(step) => {
                self.prometheus
                    .query_range(&self.promql, start, at, step)
                    .await
            }
            None => self.prometheus.query(&self.promql, at).await,
        };

        let data = match result {
            Ok(data) => data,
            Err(e) => {
                self.metrics.query_errors.inc();
                error!("Query failed: {}", e);
                return;
            }
        };

        let event = CloudEvent::new(PROMQL_EVENT_TYPE, &self.server_url, data)
            .with_subject(&self.promql);
        match cloudevents::send(&self.http, &self.sink, &event).await {
            Ok(()) => self.metrics.events_sent.inc(),
            Err(e) => {
                self.metrics.event_errors.inc();
                error!("Failed to send event {}: {}", event.id, e);
            }
        }
    }
}
