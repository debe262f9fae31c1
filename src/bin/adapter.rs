use prometheus_source::{
    adapter::Adapter,
    config::{
        logging::LoggingConfig,
        observability::{MetricsOptions, ObservabilityConfig},
        AdapterConfig,
    },
    telemetry::{self, AdapterMetrics},
};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

const COMPONENT: &str = "adapter";
const DEFAULT_METRICS_DOMAIN: &str = "knative.dev/sources";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AdapterConfig::from_env()?;

    let logging = match config.logging_config.as_deref() {
        Some(raw) => LoggingConfig::from_json(raw)?,
        None => LoggingConfig::default(),
    };
    telemetry::init(COMPONENT, &logging);

    let metrics_options = config
        .metrics_config
        .as_deref()
        .map(MetricsOptions::from_json)
        .transpose()?;
    let (domain, observability) = match metrics_options {
        Some(ref options) => (options.domain.as_str(), options.observability()?),
        None => (DEFAULT_METRICS_DOMAIN, ObservabilityConfig::default()),
    };

    let metrics = AdapterMetrics::new(domain)?;
    if observability.metrics_enabled() {
        let registry = metrics.registry.clone();
        let port = observability.prometheus_port;
        tokio::spawn(async move {
            if let Err(e) = telemetry::serve_metrics(registry, port).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    info!(
        "Starting receive adapter for {}/{}: {:?} on {:?}",
        config.namespace, config.name, config.promql, config.schedule
    );
    let adapter = Adapter::new(&config, metrics)?;

    let mut terminate = signal(SignalKind::terminate())?;
    adapter
        .run(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        })
        .await?;

    Ok(())
}
