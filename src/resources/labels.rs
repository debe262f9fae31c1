use crate::{crds::PrometheusSource, utils};
use kube::ResourceExt;
use std::collections::BTreeMap;

pub const CONTROLLER_AGENT_NAME: &str = "prometheus-source-controller";
pub const SOURCE_LABEL: &str = "sources.knative.dev/source";
pub const NAME_LABEL: &str = "sources.knative.dev/name";

/// Labels selecting the adapter pods of one source
pub fn selector_labels(source: &PrometheusSource) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(SOURCE_LABEL.to_string(), CONTROLLER_AGENT_NAME.to_string());
    let uid = source.uid().unwrap_or_default();
    labels.insert(
        NAME_LABEL.to_string(),
        utils::label_value(&source.name_any(), &uid),
    );
    labels
}

/// Generate standard labels for all resources
pub fn common_labels(source: &PrometheusSource) -> BTreeMap<String, String> {
    let mut labels = selector_labels(source);
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        CONTROLLER_AGENT_NAME.to_string(),
    );
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        "receive-adapter".to_string(),
    );
    labels
}
