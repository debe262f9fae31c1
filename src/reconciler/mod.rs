use crate::{
    crds::{PrometheusSource, PrometheusSourceStatus, CONDITION_READY},
    error::{Error, Result},
    resources::{
        deployment::{self, AdapterSettings},
        event_type,
    },
    schedule::Schedule,
    telemetry::Metrics,
};
use kube::{
    api::{Api, Patch, PatchParams},
    client::Client,
    runtime::{
        controller::Action,
        events::{Event, EventType, Recorder},
    },
    Resource, ResourceExt,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub mod sink;

const READY_REQUEUE: Duration = Duration::from_secs(300);
const WAITING_REQUEUE: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub metrics: Arc<Metrics>,
    pub recorder: Recorder,
    pub adapter: Arc<AdapterSettings>,
}

#[instrument(skip(ctx, source), fields(source_name = %source.name_any()))]
pub async fn reconcile(source: Arc<PrometheusSource>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = source.namespace().unwrap_or_default();

    info!("Reconciling PrometheusSource {}/{}", namespace, source.name_any());
    ctx.metrics.record_reconcile();

    let mut status = source.status.clone().unwrap_or_default();
    status.initialize_conditions();

    // An invalid schedule only changes with the spec, so wait for that
    if let Err(e) = Schedule::parse(&source.spec.schedule) {
        warn!("Invalid schedule: {}", e);
        status.mark_invalid_schedule("Invalid", e.to_string());
        update_status(&source, &ctx, status).await?;
        return Ok(Action::await_change());
    }
    status.mark_valid_schedule();

    let sink_uri = match sink::resolve(&ctx.client, &source.spec.sink, &namespace).await {
        Ok(uri) => uri,
        Err(e) => {
            status.mark_no_sink("NotFound", e.to_string());
            update_status(&source, &ctx, status).await?;
            return Err(e);
        }
    };
    status.mark_sink(&sink_uri);

    let adapter = deployment::apply(&ctx.client, &source, &sink_uri, &ctx.adapter).await?;
    status.propagate_deployment_availability(&adapter);

    if let Some(broker) = source.spec.sink.r#ref.as_ref().filter(|r| r.is_broker()) {
        event_type::apply(&ctx.client, &source, broker).await?;
    }

    let ready = status.is_ready();
    update_status(&source, &ctx, status).await?;

    Ok(Action::requeue(requeue_after(ready)))
}

fn requeue_after(ready: bool) -> Duration {
    if ready {
        READY_REQUEUE
    } else {
        WAITING_REQUEUE
    }
}

/// Patch the status subresource if anything changed and announce transitions
/// of the Ready condition.
pub async fn update_status(
    source: &PrometheusSource,
    ctx: &Context,
    mut status: PrometheusSourceStatus,
) -> Result<()> {
    let previous = source.status.clone().unwrap_or_default();
    status.status.observed_generation = source.meta().generation;
    if status == previous {
        return Ok(());
    }

    let api: Api<PrometheusSource> =
        Api::namespaced(ctx.client.clone(), &source.namespace().unwrap_or_default());

    let mut body = serde_json::to_value(&status)?;
    // merge patches only clear fields that are sent as null
    body["sinkUri"] = serde_json::json!(status.sink_uri);
    let patch = serde_json::json!({
        "status": body
    });

    api.patch_status(
        &source.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await?;

    if let Some(event) = transition_event(&previous, &status) {
        let reference = source.object_ref(&());
        if let Err(e) = ctx.recorder.publish(&event, &reference).await {
            warn!("Failed to publish event {}: {}", event.reason, e);
        }
    }

    Ok(())
}

/// The Kubernetes Event describing a change of the Ready condition, if any.
fn transition_event(
    previous: &PrometheusSourceStatus,
    current: &PrometheusSourceStatus,
) -> Option<Event> {
    let before = previous.status.get_condition(CONDITION_READY);
    let after = current.status.get_condition(CONDITION_READY)?;
    if before.map(|c| (&c.status, &c.reason)) == Some((&after.status, &after.reason)) {
        return None;
    }

    if after.is_true() {
        Some(Event {
            type_: EventType::Normal,
            reason: "PrometheusSourceReady".into(),
            note: Some("PrometheusSource is ready".into()),
            action: "Reconcile".into(),
            secondary: None,
        })
    } else if after.is_false() {
        Some(Event {
            type_: EventType::Warning,
            reason: after.reason.clone().unwrap_or_else(|| "NotReady".into()),
            note: after.message.clone(),
            action: "Reconcile".into(),
            secondary: None,
        })
    } else {
        None
    }
}

/// Error handling for reconciliation
pub fn error_policy(source: Arc<PrometheusSource>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        "[*] Reconciliation of {} failed: {:?}",
        source.name_any(),
        error
    );
    ctx.metrics.record_error();

    if error.is_retryable() {
        Action::requeue(Duration::from_secs(10))
    } else {
        Action::requeue(Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{ConditionStatus, CONDITION_SINK_PROVIDED};
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};

    fn ready_status() -> PrometheusSourceStatus {
        let mut status = PrometheusSourceStatus::default();
        status.initialize_conditions();
        status.mark_valid_schedule();
        status.mark_sink("http://sink/");
        status.propagate_deployment_availability(&Deployment {
            status: Some(DeploymentStatus {
                available_replicas: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        });
        status
    }

    #[test]
    fn test_requeue_intervals() {
        assert_eq!(requeue_after(true), Duration::from_secs(300));
        assert_eq!(requeue_after(false), Duration::from_secs(10));
    }

    #[test]
    fn test_event_when_becoming_ready() {
        let mut previous = PrometheusSourceStatus::default();
        previous.initialize_conditions();
        let event = transition_event(&previous, &ready_status()).unwrap();
        assert_eq!(event.type_, EventType::Normal);
        assert_eq!(event.reason, "PrometheusSourceReady");
    }

    #[test]
    fn test_warning_when_sink_lost() {
        let previous = ready_status();
        let mut current = previous.clone();
        current.mark_no_sink("NotFound", "Broker \"default/default\" not found");
        let ready = current.status.get_condition(CONDITION_READY).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert!(current.status.get_condition(CONDITION_SINK_PROVIDED).unwrap().is_false());

        let event = transition_event(&previous, &current).unwrap();
        assert_eq!(event.type_, EventType::Warning);
        assert_eq!(event.reason, "NotFound");
        assert_eq!(
            event.note.as_deref(),
            Some("Broker \"default/default\" not found")
        );
    }

    #[test]
    fn test_no_event_without_transition() {
        let status = ready_status();
        assert!(transition_event(&status, &status.clone()).is_none());

        // Unknown -> Unknown with a new reason is not worth an event
        let mut previous = PrometheusSourceStatus::default();
        previous.initialize_conditions();
        let mut current = previous.clone();
        current.mark_valid_schedule();
        current.mark_sink("http://sink/");
        current.propagate_deployment_availability(&Deployment::default());
        assert!(transition_event(&previous, &current).is_none());
    }
}
