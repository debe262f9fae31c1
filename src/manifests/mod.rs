//! The release: every object needed to run PrometheusSources in a cluster,
//! built from typed API objects and printed by the `manifests` binary.

use crate::{config::DEFAULT_SYSTEM_NAMESPACE, crds::PrometheusSource, error::Result};
use k8s_openapi::{
    api::{
        admissionregistration::v1::{MutatingWebhookConfiguration, ValidatingWebhookConfiguration},
        apps::v1::{Deployment, StatefulSet},
        core::v1::{ConfigMap, Namespace, Secret, Service, ServiceAccount},
        rbac::v1::{ClusterRole, ClusterRoleBinding},
    },
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
    apimachinery::pkg::apis::meta::v1::LabelSelector,
};
use kube::{api::ObjectMeta, CustomResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod admission;
pub mod config_maps;
pub mod rbac;
pub mod workloads;

pub const CONTROLLER_NAME: &str = "prometheus-source-controller";
pub const CONTROLLER_SERVICE_ACCOUNT: &str = "prometheus-controller-manager";
pub const WEBHOOK_NAME: &str = "prometheus-source-webhook";
pub const WEBHOOK_SERVICE_ACCOUNT: &str = "prometheus-source-webhook";
pub const WEBHOOK_CERTS_SECRET: &str = "prometheus-source-webhook-certs";

const PART_OF: &str = "knative-eventing";
const RELEASE_LABEL: &str = "eventing.knative.dev/source";

/// Settings of a release, overridable from the environment of the
/// `manifests` binary
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReleaseOptions {
    #[serde(rename = "system_namespace")]
    pub namespace: String,
    pub controller_image: String,
    #[serde(rename = "prometheus_ra_image")]
    pub adapter_image: String,
    pub webhook_image: String,
}

impl Default for ReleaseOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_SYSTEM_NAMESPACE.to_string(),
            controller_image: image("controller"),
            adapter_image: image("adapter"),
            webhook_image: image("webhook"),
        }
    }
}

impl ReleaseOptions {
    pub fn from_env() -> Result<Self> {
        crate::config::from_env()
    }
}

fn image(component: &str) -> String {
    format!(
        "ghcr.io/knative-extensions/eventing-prometheus/{}:{}",
        component,
        env!("CARGO_PKG_VERSION")
    )
}

pub(crate) fn object_meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(BTreeMap::from([
            ("app.kubernetes.io/part-of".to_string(), PART_OF.to_string()),
            ("app.kubernetes.io/version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
            (RELEASE_LABEL.to_string(), "prometheus-source".to_string()),
        ])),
        ..Default::default()
    }
}

pub(crate) fn selector(app: &str) -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
        ..Default::default()
    }
}

/// All objects of a release, in the order they are applied
#[derive(Clone, Debug)]
pub struct Release {
    pub namespace: Namespace,
    pub service_accounts: Vec<ServiceAccount>,
    pub cluster_roles: Vec<ClusterRole>,
    pub cluster_role_bindings: Vec<ClusterRoleBinding>,
    pub crd: CustomResourceDefinition,
    pub config_maps: Vec<ConfigMap>,
    pub webhook_certs: Secret,
    pub webhook_service: Service,
    pub controller: StatefulSet,
    pub webhook: Deployment,
    pub defaulting: MutatingWebhookConfiguration,
    pub validation: ValidatingWebhookConfiguration,
}

impl Release {
    pub fn new(options: &ReleaseOptions) -> Self {
        Self {
            namespace: Namespace {
                metadata: object_meta(&options.namespace, None),
                ..Default::default()
            },
            service_accounts: rbac::service_accounts(options),
            cluster_roles: rbac::cluster_roles(),
            cluster_role_bindings: rbac::cluster_role_bindings(options),
            crd: PrometheusSource::crd(),
            config_maps: config_maps::config_maps(options),
            webhook_certs: admission::certs_secret(options),
            webhook_service: admission::service(options),
            controller: workloads::controller(options),
            webhook: workloads::webhook(options),
            defaulting: admission::defaulting(options),
            validation: admission::validation(options),
        }
    }

    /// Multi-document YAML stream of the release
    pub fn to_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for doc in self.documents()? {
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(&doc)?);
        }
        Ok(out)
    }

    fn documents(&self) -> Result<Vec<serde_json::Value>> {
        let mut docs = vec![to_value(&self.namespace)?];
        docs.extend(values(&self.service_accounts)?);
        docs.extend(values(&self.cluster_roles)?);
        docs.extend(values(&self.cluster_role_bindings)?);
        docs.push(to_value(&self.crd)?);
        docs.extend(values(&self.config_maps)?);
        docs.push(to_value(&self.webhook_certs)?);
        docs.push(to_value(&self.webhook_service)?);
        docs.push(to_value(&self.controller)?);
        docs.push(to_value(&self.webhook)?);
        docs.push(to_value(&self.defaulting)?);
        docs.push(to_value(&self.validation)?);
        Ok(docs)
    }
}

fn to_value<T: Serialize>(object: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(object)?)
}

fn values<T: Serialize>(objects: &[T]) -> Result<Vec<serde_json::Value>> {
    objects.iter().map(to_value).collect()
}
