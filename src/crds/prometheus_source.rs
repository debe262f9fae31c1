use super::{
    condition::{ConditionManager, ConditionSet, Status},
    destination::Destination,
};
use k8s_openapi::api::apps::v1::Deployment;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CloudEvent type of every event emitted by a PrometheusSource
pub const PROMQL_EVENT_TYPE: &str = "dev.knative.sources.prometheus.promql";

pub const CONDITION_VALID_SCHEDULE: &str = "ValidSchedule";
pub const CONDITION_SINK_PROVIDED: &str = "SinkProvided";
pub const CONDITION_DEPLOYED: &str = "Deployed";

pub const PROMETHEUS_SOURCE_CONDITIONS: ConditionSet = ConditionSet::living(&[
    CONDITION_VALID_SCHEDULE,
    CONDITION_SINK_PROVIDED,
    CONDITION_DEPLOYED,
]);

/// PrometheusSource runs a PromQL query on a cron schedule and delivers each
/// result to a sink as a CloudEvent
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "sources.knative.dev",
    version = "v1alpha1",
    kind = "PrometheusSource",
    plural = "prometheussources",
    singular = "prometheussource",
    namespaced,
    status = "PrometheusSourceStatus",
    category = "all",
    category = "knative",
    category = "sources",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#,
    printcolumn = r#"{"name":"Sink", "type":"string", "jsonPath":".status.sinkUri"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusSourceSpec {
    /// Service account the receive adapter runs as
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// URL of the Prometheus server
    #[serde(rename = "serverURL")]
    pub server_url: String,

    /// PromQL query evaluated on every activation
    #[serde(rename = "promQL")]
    pub prom_ql: String,

    /// Path of a file holding a bearer token for the Prometheus server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token_file: Option<String>,

    /// ConfigMap holding the CA certificate (service-ca.crt) of the Prometheus server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_config_map: Option<String>,

    /// Cron schedule, e.g. "* * * * *" or "@every 30s"
    pub schedule: String,

    /// Query resolution step; turns the query into a range query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,

    /// Where to deliver the events
    pub sink: Destination,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusSourceStatus {
    #[serde(flatten)]
    pub status: Status,

    /// Resolved URI of the sink
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_uri: Option<String>,
}

impl PrometheusSourceStatus {
    fn manager(&mut self) -> ConditionManager<'_> {
        PROMETHEUS_SOURCE_CONDITIONS.manage(&mut self.status)
    }

    pub fn initialize_conditions(&mut self) {
        self.manager().initialize();
    }

    pub fn is_ready(&self) -> bool {
        self.status
            .get_condition(PROMETHEUS_SOURCE_CONDITIONS.happy)
            .map(|c| c.is_true())
            .unwrap_or(false)
    }

    pub fn mark_valid_schedule(&mut self) {
        self.manager().mark_true(CONDITION_VALID_SCHEDULE);
    }

    pub fn mark_invalid_schedule(&mut self, reason: &str, message: impl Into<String>) {
        self.manager()
            .mark_false(CONDITION_VALID_SCHEDULE, reason, message);
    }

    pub fn mark_sink(&mut self, uri: &str) {
        self.sink_uri = Some(uri.to_string());
        self.manager().mark_true(CONDITION_SINK_PROVIDED);
    }

    pub fn mark_no_sink(&mut self, reason: &str, message: impl Into<String>) {
        self.sink_uri = None;
        self.manager()
            .mark_false(CONDITION_SINK_PROVIDED, reason, message);
    }

    /// Derive the Deployed condition from the adapter Deployment.
    pub fn propagate_deployment_availability(&mut self, deployment: &Deployment) {
        let available = deployment
            .status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or(0);

        if available > 0 {
            self.manager().mark_true(CONDITION_DEPLOYED);
        } else {
            let name = deployment.metadata.name.as_deref().unwrap_or_default();
            self.manager().mark_unknown(
                CONDITION_DEPLOYED,
                "DeploymentUnavailable",
                format!("The Deployment '{}' is unavailable.", name),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::condition::ConditionStatus;
    use k8s_openapi::api::apps::v1::DeploymentStatus;

    fn deployment(available: Option<i32>) -> Deployment {
        Deployment {
            metadata: kube::api::ObjectMeta {
                name: Some("adapter".into()),
                ..Default::default()
            },
            status: Some(DeploymentStatus {
                available_replicas: available,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_spec_field_names() {
        let spec: PrometheusSourceSpec = serde_json::from_value(serde_json::json!({
            "serverURL": "http://prometheus:9090",
            "promQL": "up",
            "schedule": "* * * * *",
            "step": "15s",
            "sink": {"uri": "http://sink.default.svc.cluster.local"}
        }))
        .unwrap();
        assert_eq!(spec.server_url, "http://prometheus:9090");
        assert_eq!(spec.prom_ql, "up");
        assert_eq!(spec.step.as_deref(), Some("15s"));
        assert!(spec.service_account_name.is_none());
    }

    #[test]
    fn test_status_becomes_ready() {
        let mut status = PrometheusSourceStatus::default();
        status.initialize_conditions();
        status.mark_valid_schedule();
        status.mark_sink("http://sink/");
        assert!(!status.is_ready());
        status.propagate_deployment_availability(&deployment(Some(1)));
        assert!(status.is_ready());
        assert_eq!(status.sink_uri.as_deref(), Some("http://sink/"));
    }

    #[test]
    fn test_unavailable_deployment_is_unknown() {
        let mut status = PrometheusSourceStatus::default();
        status.initialize_conditions();
        status.mark_valid_schedule();
        status.mark_sink("http://sink/");
        status.propagate_deployment_availability(&deployment(None));
        let deployed = status.status.get_condition(CONDITION_DEPLOYED).unwrap();
        assert_eq!(deployed.status, ConditionStatus::Unknown);
        assert_eq!(deployed.reason.as_deref(), Some("DeploymentUnavailable"));
        assert!(!status.is_ready());
    }

    #[test]
    fn test_lost_sink_clears_uri() {
        let mut status = PrometheusSourceStatus::default();
        status.mark_sink("http://sink/");
        status.mark_no_sink("NotFound", "gone");
        assert!(status.sink_uri.is_none());
        let ready = status.status.get_condition("Ready").unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
    }

    #[test]
    fn test_status_flattens_duck_fields() {
        let mut status = PrometheusSourceStatus::default();
        status.status.observed_generation = Some(3);
        status.sink_uri = Some("http://sink/".into());
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({"observedGeneration": 3, "sinkUri": "http://sink/"})
        );
    }
}
