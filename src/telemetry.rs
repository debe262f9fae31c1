use crate::{config::logging::LoggingConfig, crds::PrometheusSource, error::Result};
use axum::{http::StatusCode, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Controller metrics
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,
    pub reconcile_count: IntCounter,
    pub reconcile_errors: IntCounter,
    pub ready_sources: IntGauge,
    pub is_leader: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("prometheus_source".into()), None)?;
        let reconcile_count = IntCounter::new("reconcile_total", "Reconciliations run")?;
        let reconcile_errors =
            IntCounter::new("reconcile_errors_total", "Reconciliations that failed")?;
        let ready_sources = IntGauge::new("ready_sources", "Sources whose Ready condition is True")?;
        let is_leader = IntGauge::new("leader", "1 while this replica holds the lease")?;
        registry.register(Box::new(reconcile_count.clone()))?;
        registry.register(Box::new(reconcile_errors.clone()))?;
        registry.register(Box::new(ready_sources.clone()))?;
        registry.register(Box::new(is_leader.clone()))?;

        Ok(Metrics {
            registry,
            reconcile_count,
            reconcile_errors,
            ready_sources,
            is_leader,
        })
    }

    pub fn record_reconcile(&self) {
        self.reconcile_count.inc();
    }

    pub fn record_error(&self) {
        self.reconcile_errors.inc();
    }

    /// Recount the Ready sources from the controller's cache of all sources.
    pub fn set_ready_sources<'a>(
        &self,
        sources: impl IntoIterator<Item = &'a PrometheusSource>,
    ) {
        let ready = sources
            .into_iter()
            .filter(|s| s.status.as_ref().is_some_and(|st| st.is_ready()))
            .count();
        self.ready_sources.set(ready.try_into().unwrap_or(i64::MAX));
    }
}

/// Admission webhook metrics
#[derive(Clone)]
pub struct AdmissionMetrics {
    pub registry: Registry,
    pub requests: IntCounterVec,
}

impl AdmissionMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("prometheus_source_webhook".into()), None)?;
        let requests = IntCounterVec::new(
            Opts::new("admission_requests_total", "Admission requests by hook and verdict"),
            &["hook", "allowed"],
        )?;
        registry.register(Box::new(requests.clone()))?;
        Ok(AdmissionMetrics { registry, requests })
    }

    pub fn record(&self, hook: &str, allowed: bool) {
        self.requests
            .with_label_values(&[hook, if allowed { "true" } else { "false" }])
            .inc();
    }
}

/// Receive adapter metrics
#[derive(Clone)]
pub struct AdapterMetrics {
    pub registry: Registry,
    pub queries: IntCounter,
    pub query_errors: IntCounter,
    pub events_sent: IntCounter,
    pub event_errors: IntCounter,
}

impl AdapterMetrics {
    pub fn new(domain: &str) -> Result<Self> {
        // "knative.dev/sources" -> "knative_dev_sources"
        let namespace: String = domain
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let registry = Registry::new_custom(Some(namespace), None)?;
        let queries = IntCounter::new("promql_queries_total", "PromQL queries run")?;
        let query_errors = IntCounter::new("promql_query_errors_total", "PromQL queries that failed")?;
        let events_sent = IntCounter::new("event_count", "Events delivered to the sink")?;
        let event_errors = IntCounter::new("event_errors_total", "Events the sink did not accept")?;
        for c in [&queries, &query_errors, &events_sent, &event_errors] {
            registry.register(Box::new(c.clone()))?;
        }
        Ok(AdapterMetrics {
            registry,
            queries,
            query_errors,
            events_sent,
            event_errors,
        })
    }
}

/// Render a registry in the Prometheus text exposition format.
pub fn render(registry: &Registry) -> std::result::Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Serve `GET /metrics` for the given registry.
pub async fn serve_metrics(registry: Registry, port: u16) -> Result<()> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let registry = registry.clone();
            async move {
                match render(&registry) {
                    Ok(body) => (StatusCode::OK, body),
                    Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Serving metrics on :{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Install the global subscriber for `component`. `RUST_LOG` takes
/// precedence over the levels from `config-logging`.
pub fn init(component: &str, logging: &LoggingConfig) {
    let level = logging.level_for(component);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},kube=info,hyper=warn,h2=warn", level))
    });

    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .without_time()
            .with_file(false)
            .with_line_number(false)
            .with_env_filter(filter)
            .init();
    }
}
