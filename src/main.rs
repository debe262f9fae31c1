use anyhow::bail;
use futures::StreamExt;
use k8s_openapi::api::{apps::v1::Deployment, coordination::v1::Lease};
use kube::{
    runtime::{
        controller::Controller,
        events::{Recorder, Reporter},
        watcher::Config as WatcherConfig,
    },
    Api, Client,
};
use prometheus_source::{
    config::{
        self, leader_election::LeaderElectionConfig, logging::LoggingConfig,
        observability::{MetricsOptions, ObservabilityConfig},
        ControllerConfig,
    },
    crds::PrometheusSource,
    leader_election::{LeaseLock, LEASE_NAME},
    reconciler::{self, Context},
    resources::{deployment::AdapterSettings, labels::CONTROLLER_AGENT_NAME},
    telemetry::{self, Metrics},
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "controller";
const READY_GAUGE_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ControllerConfig::from_env()?;
    let client = Client::try_default().await?;
    let namespace = config.system_namespace.clone();

    let logging_data =
        config::load_config_map(&client, &namespace, &config.logging_config_name).await?;
    telemetry::init(COMPONENT, &LoggingConfig::from_data(&logging_data)?);
    info!("Starting PrometheusSource controller as {}", config.identity);

    let observability_data =
        config::load_config_map(&client, &namespace, &config.observability_config_name).await?;
    let observability = ObservabilityConfig::from_data(&observability_data)?;
    let leader_election = LeaderElectionConfig::from_data(
        &config::load_config_map(&client, &namespace, &config.leader_election_config_name).await?,
    )?;
    info!("Configuration loaded");

    let metrics = Arc::new(Metrics::new()?);
    if observability.metrics_enabled() {
        let registry = metrics.registry.clone();
        let port = observability.prometheus_port;
        tokio::spawn(async move {
            if let Err(e) = telemetry::serve_metrics(registry, port).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    // the adapters get the same logging and observability settings
    let adapter = Arc::new(AdapterSettings {
        image: config.adapter_image.clone(),
        logging_config: serde_json::to_string(&logging_data)?,
        metrics_config: MetricsOptions {
            domain: config.metrics_domain.clone(),
            component: "prometheussource".to_string(),
            config_map: observability_data,
        }
        .to_json()?,
    });

    let lock = LeaseLock::new(
        Api::<Lease>::namespaced(client.clone(), &namespace),
        LEASE_NAME,
        &config.identity,
        leader_election,
    );
    lock.acquire().await?;
    metrics.is_leader.set(1);
    let (renewal, lost) = lock.spawn_renewal();

    let recorder = Recorder::new(
        client.clone(),
        Reporter {
            controller: CONTROLLER_AGENT_NAME.to_string(),
            instance: Some(config.identity.clone()),
        },
    );

    let ctx = Arc::new(Context {
        client: client.clone(),
        metrics: metrics.clone(),
        recorder,
        adapter,
    });

    let sources = Api::<PrometheusSource>::all(client.clone());
    // adapter deployments are owned by their source, changes trigger a reconcile of the owner
    let deployments = Api::<Deployment>::all(client.clone());

    let controller = Controller::new(sources, WatcherConfig::default())
        .owns(deployments, WatcherConfig::default());

    // recounted from the cache so restarts and deletions are reflected
    let cache = controller.store();
    let gauge_metrics = metrics.clone();
    let ready_gauge = tokio::spawn(async move {
        let mut interval = tokio::time::interval(READY_GAUGE_INTERVAL);
        loop {
            interval.tick().await;
            gauge_metrics.set_ready_sources(cache.state().iter().map(|s| s.as_ref()));
        }
    });

    let mut lost_signal = lost.clone();
    info!("Starting controller loop");
    controller
        .graceful_shutdown_on(async move {
            let _ = lost_signal.wait_for(|lost| *lost).await;
        })
        .shutdown_on_signal()
        .run(reconciler::reconcile, reconciler::error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => debug!("Reconciled: {:?}", o),
                // if the object cannot be found it was likely deleted. we can ignore this.
                Err(kube::runtime::controller::Error::ObjectNotFound(_)) => {}
                Err(e) => warn!("[!] Reconciliation error: {:?}", e),
            }
        })
        .await;

    renewal.abort();
    ready_gauge.abort();
    metrics.is_leader.set(0);

    if *lost.borrow() {
        bail!("leadership of lease {} lost", LEASE_NAME);
    }
    if let Err(e) = lock.release().await {
        warn!("Failed to release lease {}: {}", LEASE_NAME, e);
    }
    info!("Controller stopped");

    Ok(())
}
