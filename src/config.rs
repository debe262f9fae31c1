use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use serde::{de::DeserializeOwned, Deserialize};
use std::collections::BTreeMap;
use tracing::warn;

pub mod leader_election;
pub mod logging;
pub mod observability;

pub const DEFAULT_SYSTEM_NAMESPACE: &str = "knative-sources";
pub const DEFAULT_LOGGING_CONFIG_NAME: &str = "config-logging";
pub const DEFAULT_OBSERVABILITY_CONFIG_NAME: &str = "config-observability";
pub const DEFAULT_LEADER_ELECTION_CONFIG_NAME: &str = "config-leader-election-prometheus";

/// Settings of the controller process, read from the environment of the
/// `manager` container.
#[derive(Clone, Debug, Deserialize)]
pub struct ControllerConfig {
    /// Namespace holding the shared ConfigMaps and the leader election lease
    #[serde(default = "default_system_namespace")]
    pub system_namespace: String,

    /// Image of the receive adapter
    #[serde(rename = "prometheus_ra_image")]
    pub adapter_image: String,

    #[serde(rename = "config_logging_name", default = "default_logging_name")]
    pub logging_config_name: String,

    #[serde(rename = "config_observability_name", default = "default_observability_name")]
    pub observability_config_name: String,

    #[serde(rename = "config_leaderelection_name", default = "default_leader_election_name")]
    pub leader_election_config_name: String,

    /// Domain passed on to the adapters for their metrics
    #[serde(default = "default_metrics_domain")]
    pub metrics_domain: String,

    /// Identity used for leader election
    #[serde(rename = "pod_name", default = "default_identity")]
    pub identity: String,
}

/// Settings of the admission webhook process.
#[derive(Clone, Debug, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_system_namespace")]
    pub system_namespace: String,

    #[serde(default = "default_webhook_port")]
    pub webhook_port: u16,

    #[serde(rename = "webhook_tls_cert", default = "default_tls_cert")]
    pub tls_cert_file: String,

    #[serde(rename = "webhook_tls_key", default = "default_tls_key")]
    pub tls_key_file: String,

    #[serde(rename = "config_logging_name", default = "default_logging_name")]
    pub logging_config_name: String,

    #[serde(rename = "config_observability_name", default = "default_observability_name")]
    pub observability_config_name: String,
}

/// Settings of a receive adapter, written into its Deployment by the
/// controller.
#[derive(Clone, Debug, Deserialize)]
pub struct AdapterConfig {
    #[serde(rename = "k_sink")]
    pub sink: String,

    pub server_url: String,

    pub promql: String,

    pub schedule: String,

    #[serde(default)]
    pub step: Option<String>,

    #[serde(default)]
    pub auth_token_file: Option<String>,

    #[serde(default)]
    pub ca_cert_config_map: Option<String>,

    pub name: String,

    pub namespace: String,

    /// Serialized `config-logging` data
    #[serde(rename = "k_logging_config", default)]
    pub logging_config: Option<String>,

    /// Serialized metrics options
    #[serde(rename = "k_metrics_config", default)]
    pub metrics_config: Option<String>,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self> {
        from_env()
    }
}

impl WebhookConfig {
    pub fn from_env() -> Result<Self> {
        from_env()
    }
}

impl AdapterConfig {
    pub fn from_env() -> Result<Self> {
        let mut config: AdapterConfig = from_env()?;
        // unset and empty variables mean the same thing for the optional settings
        for field in [
            &mut config.step,
            &mut config.auth_token_file,
            &mut config.ca_cert_config_map,
            &mut config.logging_config,
            &mut config.metrics_config,
        ] {
            if field.as_deref().map(str::trim).unwrap_or_default().is_empty() {
                *field = None;
            }
        }
        Ok(config)
    }
}

pub(crate) fn from_env<T: DeserializeOwned>() -> Result<T> {
    let settings = ::config::Config::builder()
        .add_source(::config::Environment::default())
        .build()?;
    Ok(settings.try_deserialize()?)
}

/// Fetch the data of a ConfigMap. A missing ConfigMap yields empty data so
/// that every setting falls back to its default.
pub async fn load_config_map(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<BTreeMap<String, String>> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    match api.get(name).await {
        Ok(cm) => Ok(cm.data.unwrap_or_default()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            warn!("ConfigMap {}/{} not found, using defaults", namespace, name);
            Ok(BTreeMap::new())
        }
        Err(e) => Err(Error::from(e)),
    }
}

fn default_system_namespace() -> String {
    DEFAULT_SYSTEM_NAMESPACE.to_string()
}

fn default_logging_name() -> String {
    DEFAULT_LOGGING_CONFIG_NAME.to_string()
}

fn default_observability_name() -> String {
    DEFAULT_OBSERVABILITY_CONFIG_NAME.to_string()
}

fn default_leader_election_name() -> String {
    DEFAULT_LEADER_ELECTION_CONFIG_NAME.to_string()
}

fn default_metrics_domain() -> String {
    "knative.dev/sources".to_string()
}

fn default_identity() -> String {
    format!("prometheus-controller-{}", uuid::Uuid::new_v4())
}

fn default_webhook_port() -> u16 {
    8443
}

fn default_tls_cert() -> String {
    "/etc/webhook-certs/tls.crt".to_string()
}

fn default_tls_key() -> String {
    "/etc/webhook-certs/tls.key".to_string()
}
