use super::condition::{ConditionManager, ConditionSet, Status, CONDITION_READY};
use k8s_openapi::api::core::v1::PodSpec;
use kube::{api::ObjectMeta, CustomResource};
use schemars::{json_schema, JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Set when the revision starts materializing runtime resources, true once they are ready
pub const REVISION_CONDITION_READY: &str = CONDITION_READY;
/// Set when the underlying Kubernetes resources have been provisioned
pub const REVISION_CONDITION_RESOURCES_AVAILABLE: &str = "ResourcesAvailable";
/// Set when the readiness check of the revision completes
pub const REVISION_CONDITION_CONTAINER_HEALTHY: &str = "ContainerHealthy";
/// Set when the revision is receiving traffic
pub const REVISION_CONDITION_ACTIVE: &str = "Active";

/// Active is reported but does not gate readiness.
pub const REVISION_CONDITIONS: ConditionSet = ConditionSet::living(&[
    REVISION_CONDITION_RESOURCES_AVAILABLE,
    REVISION_CONDITION_CONTAINER_HEALTHY,
]);

/// Revision is an immutable snapshot of code and configuration. A revision
/// references a container image. Revisions are created by updates to a
/// Configuration.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[kube(
    group = "serving.knative.dev",
    version = "v1",
    kind = "Revision",
    plural = "revisions",
    singular = "revision",
    shortname = "rev",
    namespaced,
    status = "RevisionStatus",
    category = "all",
    category = "knative",
    category = "serving",
    printcolumn = r#"{"name":"Config Name", "type":"string", "jsonPath":".metadata.labels['serving\\.knative\\.dev/configuration']"}"#,
    printcolumn = r#"{"name":"Generation", "type":"string", "jsonPath":".metadata.labels['serving\\.knative\\.dev/configurationGeneration']"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type=='Ready')].reason"}"#,
    printcolumn = r#"{"name":"Actual Replicas", "type":"integer", "jsonPath":".status.actualReplicas"}"#,
    printcolumn = r#"{"name":"Desired Replicas", "type":"integer", "jsonPath":".status.desiredReplicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSpec {
    #[serde(flatten)]
    pub pod_spec: PodSpec,

    /// Maximum in-flight requests per container. 0 leaves concurrency
    /// unlimited and lets the autoscaler pick a target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_concurrency: Option<i64>,

    /// Maximum seconds the routing layer waits for a container to begin
    /// replying. A system default applies when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,

    /// Maximum seconds a request may stay open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_seconds: Option<i64>,
}

/// The inlined PodSpec keeps its fields unvalidated and unpruned.
impl JsonSchema for RevisionSpec {
    fn schema_name() -> Cow<'static, str> {
        "RevisionSpec".into()
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "type": "object",
            "description": "RevisionSpec holds the desired state of the Revision (from the client).",
            "x-kubernetes-preserve-unknown-fields": true,
            "properties": {
                "containerConcurrency": {"type": "integer", "format": "int64", "minimum": 0},
                "timeoutSeconds": {"type": "integer", "format": "int64"},
                "maxDurationSeconds": {"type": "integer", "format": "int64"}
            }
        })
    }
}

/// Data a revision should have when created from a template
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct RevisionTemplateSpec {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: RevisionSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevisionStatus {
    #[serde(flatten)]
    pub status: Status,

    /// Logging URL generated from the revision url template of the controller config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_url: Option<String>,

    /// Resolved image digests of the serving and non-serving containers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_statuses: Vec<ContainerStatus>,

    /// Resolved image digests of the init containers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_container_statuses: Vec<ContainerStatus>,

    /// Ready pods running this revision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_replicas: Option<i32>,

    /// Desired pods running this revision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_replicas: Option<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_digest: String,
}

/// Whether `t` is one of the condition types a Revision reports
pub fn is_revision_condition(t: &str) -> bool {
    matches!(
        t,
        REVISION_CONDITION_READY
            | REVISION_CONDITION_RESOURCES_AVAILABLE
            | REVISION_CONDITION_CONTAINER_HEALTHY
            | REVISION_CONDITION_ACTIVE
    )
}

impl Revision {
    pub fn get_status(&self) -> Option<&Status> {
        self.status.as_ref().map(|s| &s.status)
    }

    /// Reject any change to the spec of an existing revision.
    pub fn check_immutable(&self, old: &Revision) -> Result<(), String> {
        if self.spec == old.spec {
            return Ok(());
        }
        let old_spec = serde_json::to_value(&old.spec).unwrap_or_default();
        let new_spec = serde_json::to_value(&self.spec).unwrap_or_default();
        let changed: Vec<String> = json_patch::diff(&old_spec, &new_spec)
            .0
            .iter()
            .filter_map(|op| serde_json::to_value(op).ok())
            .filter_map(|op| op["path"].as_str().map(|p| format!("spec{}", p)))
            .collect();
        Err(format!("Immutable fields changed (-old +new): {}", changed.join(", ")))
    }
}

impl RevisionStatus {
    fn manager(&mut self) -> ConditionManager<'_> {
        REVISION_CONDITIONS.manage(&mut self.status)
    }

    pub fn initialize_conditions(&mut self) {
        self.manager().initialize();
    }

    pub fn is_ready(&self) -> bool {
        self.status
            .get_condition(REVISION_CONDITION_READY)
            .map(|c| c.is_true())
            .unwrap_or(false)
    }

    pub fn mark_resources_available(&mut self) {
        self.manager().mark_true(REVISION_CONDITION_RESOURCES_AVAILABLE);
    }

    pub fn mark_resources_unavailable(&mut self, reason: &str, message: impl Into<String>) {
        self.manager()
            .mark_false(REVISION_CONDITION_RESOURCES_AVAILABLE, reason, message);
    }

    pub fn mark_container_healthy(&mut self) {
        self.manager().mark_true(REVISION_CONDITION_CONTAINER_HEALTHY);
    }

    pub fn mark_container_unhealthy(&mut self, reason: &str, message: impl Into<String>) {
        self.manager()
            .mark_false(REVISION_CONDITION_CONTAINER_HEALTHY, reason, message);
    }

    pub fn mark_active(&mut self) {
        self.manager().mark_true(REVISION_CONDITION_ACTIVE);
    }

    pub fn mark_inactive(&mut self, reason: &str, message: impl Into<String>) {
        self.manager()
            .mark_false(REVISION_CONDITION_ACTIVE, reason, message);
    }
}
