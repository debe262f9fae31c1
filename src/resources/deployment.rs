use crate::{
    crds::PrometheusSource,
    error::{Error, Result},
    resources::labels,
    utils,
};
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{
            Capabilities, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, PodSpec,
            PodTemplateSpec, ResourceRequirements, SecurityContext, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::LabelSelector},
};
use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams},
    Client, Resource, ResourceExt,
};
use std::collections::BTreeMap;
use tracing::info;

pub const ADAPTER_CONTAINER_NAME: &str = "receive-adapter";
pub const ADAPTER_METRICS_PORT: i32 = 9090;
const CA_CERT_VOLUME: &str = "ca-cert";

/// Settings shared by every adapter Deployment the controller renders
#[derive(Clone, Debug)]
pub struct AdapterSettings {
    pub image: String,
    /// Serialized `config-logging` data
    pub logging_config: String,
    /// Serialized metrics options
    pub metrics_config: String,
}

/// Server-side apply the receive adapter of `source`.
pub async fn apply(
    client: &Client,
    source: &PrometheusSource,
    sink_uri: &str,
    settings: &AdapterSettings,
) -> Result<Deployment> {
    let namespace = source.namespace().unwrap_or_default();
    let api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    let deployment = build_deployment(source, sink_uri, settings)?;
    let name = deployment.name_any();

    let applied = api
        .patch(
            &name,
            &PatchParams::apply(labels::CONTROLLER_AGENT_NAME).force(),
            &Patch::Apply(&deployment),
        )
        .await?;
    info!("Applied receive adapter {}/{}", namespace, name);
    Ok(applied)
}

pub fn build_deployment(
    source: &PrometheusSource,
    sink_uri: &str,
    settings: &AdapterSettings,
) -> Result<Deployment> {
    let owner = source
        .controller_owner_ref(&())
        .ok_or_else(|| Error::ResourceCreationError {
            resource_type: "Deployment".to_string(),
            reason: "source has no uid yet".to_string(),
        })?;
    let uid = source.uid().unwrap_or_default();
    let name = utils::child_name(&source.name_any(), &uid);
    let spec = &source.spec;

    let mut env_vars = vec![
        env("K_SINK", sink_uri),
        env("SERVER_URL", &spec.server_url),
        env("PROMQL", &spec.prom_ql),
        env("SCHEDULE", &spec.schedule),
        env("NAME", &source.name_any()),
        env("NAMESPACE", &source.namespace().unwrap_or_default()),
        env("K_LOGGING_CONFIG", &settings.logging_config),
        env("K_METRICS_CONFIG", &settings.metrics_config),
    ];
    if let Some(ref step) = spec.step {
        env_vars.push(env("STEP", step));
    }
    if let Some(ref token_file) = spec.auth_token_file {
        env_vars.push(env("AUTH_TOKEN_FILE", token_file));
    }

    // CA bundle of the Prometheus server, mounted where the adapter looks for it
    let mut volumes = vec![];
    let mut volume_mounts = vec![];
    if let Some(ref config_map) = spec.ca_cert_config_map {
        env_vars.push(env("CA_CERT_CONFIG_MAP", config_map));
        volumes.push(Volume {
            name: CA_CERT_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map.clone(),
                ..Default::default()
            }),
            ..Default::default()
        });
        volume_mounts.push(VolumeMount {
            name: CA_CERT_VOLUME.to_string(),
            mount_path: format!("/etc/{}", config_map),
            read_only: Some(true),
            ..Default::default()
        });
    }

    let container = Container {
        name: ADAPTER_CONTAINER_NAME.to_string(),
        image: Some(settings.image.clone()),
        env: Some(env_vars),
        ports: Some(vec![ContainerPort {
            name: Some("metrics".to_string()),
            container_port: ADAPTER_METRICS_PORT,
            ..Default::default()
        }]),
        volume_mounts: if volume_mounts.is_empty() {
            None
        } else {
            Some(volume_mounts)
        },
        resources: Some(build_resources()),
        security_context: Some(build_security_context()),
        ..Default::default()
    };

    let pod_template = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels::common_labels(source)),
            annotations: Some(BTreeMap::from([(
                "sidecar.istio.io/inject".to_string(),
                "true".to_string(),
            )])),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: spec.service_account_name.clone(),
            containers: vec![container],
            volumes: if volumes.is_empty() {
                None
            } else {
                Some(volumes)
            },
            ..Default::default()
        }),
    };

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: source.namespace(),
            labels: Some(labels::common_labels(source)),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels::selector_labels(source)),
                ..Default::default()
            },
            template: pod_template,
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn build_resources() -> ResourceRequirements {
    let requests = BTreeMap::from([
        ("cpu".to_string(), Quantity("25m".to_string())),
        ("memory".to_string(), Quantity("32Mi".to_string())),
    ]);
    let limits = BTreeMap::from([
        ("cpu".to_string(), Quantity("500m".to_string())),
        ("memory".to_string(), Quantity("128Mi".to_string())),
    ]);

    ResourceRequirements {
        limits: Some(limits),
        requests: Some(requests),
        ..Default::default()
    }
}

pub(crate) fn build_security_context() -> SecurityContext {
    SecurityContext {
        privileged: Some(false),
        allow_privilege_escalation: Some(false),
        read_only_root_filesystem: Some(true),
        run_as_non_root: Some(true),
        capabilities: Some(Capabilities {
            add: None,
            drop: Some(vec!["ALL".to_string()]),
        }),
        ..Default::default()
    }
}
