use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// EventType CRD (owned by Knative Eventing, only applied by this controller)
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "eventing.knative.dev",
    version = "v1beta1",
    kind = "EventType",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeSpec {
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
