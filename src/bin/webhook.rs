use kube::Client;
use prometheus_source::{
    config::{self, logging::LoggingConfig, observability::ObservabilityConfig, WebhookConfig},
    telemetry::{self, AdmissionMetrics},
    webhook::{self, WebhookState},
};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

const COMPONENT: &str = "webhook";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // kube and the TLS listener both use ring
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = WebhookConfig::from_env()?;
    let client = Client::try_default().await?;
    let namespace = config.system_namespace.clone();

    let logging = LoggingConfig::from_data(
        &config::load_config_map(&client, &namespace, &config.logging_config_name).await?,
    )?;
    telemetry::init(COMPONENT, &logging);
    info!("Starting PrometheusSource admission webhook");

    let observability = ObservabilityConfig::from_data(
        &config::load_config_map(&client, &namespace, &config.observability_config_name).await?,
    )?;

    let metrics = Arc::new(AdmissionMetrics::new()?);
    if observability.metrics_enabled() {
        let registry = metrics.registry.clone();
        let port = observability.prometheus_port;
        tokio::spawn(async move {
            if let Err(e) = telemetry::serve_metrics(registry, port).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    let state = WebhookState {
        metrics,
        log_requests: observability.request_log_template.is_some(),
    };

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = webhook::serve(&config, state) => res?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
        _ = terminate.recv() => info!("Terminated, shutting down"),
    }

    Ok(())
}
