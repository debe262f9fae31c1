use super::{
    object_meta, selector, ReleaseOptions, CONTROLLER_NAME, CONTROLLER_SERVICE_ACCOUNT,
    WEBHOOK_CERTS_SECRET, WEBHOOK_NAME, WEBHOOK_SERVICE_ACCOUNT,
};
use crate::{
    config::{
        observability::DEFAULT_PROMETHEUS_PORT, DEFAULT_LEADER_ELECTION_CONFIG_NAME,
        DEFAULT_LOGGING_CONFIG_NAME, DEFAULT_OBSERVABILITY_CONFIG_NAME,
    },
    resources::deployment::build_security_context,
};
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec},
        core::v1::{
            Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction, ObjectFieldSelector,
            PodSpec, PodTemplateSpec, Probe, ResourceRequirements, SecretVolumeSource, Volume,
            VolumeMount,
        },
    },
    apimachinery::pkg::{api::resource::Quantity, util::intstr::IntOrString},
};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

pub const WEBHOOK_PORT: i32 = 8443;
const WEBHOOK_CERTS_MOUNT: &str = "/etc/webhook-certs";

/// The controller runs as a single-replica StatefulSet; the lease guards
/// against overlap during rollouts.
pub fn controller(options: &ReleaseOptions) -> StatefulSet {
    let mut env = common_env();
    env.extend([
        env_value("CONFIG_LEADERELECTION_NAME", DEFAULT_LEADER_ELECTION_CONFIG_NAME),
        env_value("PROMETHEUS_RA_IMAGE", &options.adapter_image),
        env_value("METRICS_DOMAIN", "knative.dev/sources"),
        env_field("POD_NAME", "metadata.name"),
    ]);

    let container = Container {
        name: "manager".to_string(),
        image: Some(options.controller_image.clone()),
        env: Some(env),
        ports: Some(vec![metrics_port()]),
        resources: Some(resources("100m", "100Mi", "1000m", "1000Mi")),
        security_context: Some(build_security_context()),
        ..Default::default()
    };

    StatefulSet {
        metadata: object_meta(CONTROLLER_NAME, Some(&options.namespace)),
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            selector: selector(CONTROLLER_NAME),
            template: pod_template(CONTROLLER_NAME, CONTROLLER_SERVICE_ACCOUNT, container, None),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn webhook(options: &ReleaseOptions) -> Deployment {
    let mut env = common_env();
    env.extend([
        env_value("WEBHOOK_PORT", &WEBHOOK_PORT.to_string()),
        env_value("WEBHOOK_TLS_CERT", &format!("{}/tls.crt", WEBHOOK_CERTS_MOUNT)),
        env_value("WEBHOOK_TLS_KEY", &format!("{}/tls.key", WEBHOOK_CERTS_MOUNT)),
    ]);

    let container = Container {
        name: "webhook".to_string(),
        image: Some(options.webhook_image.clone()),
        env: Some(env),
        ports: Some(vec![
            ContainerPort {
                name: Some("https-webhook".to_string()),
                container_port: WEBHOOK_PORT,
                ..Default::default()
            },
            metrics_port(),
        ]),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/healthz".to_string()),
                port: IntOrString::Int(WEBHOOK_PORT),
                scheme: Some("HTTPS".to_string()),
                ..Default::default()
            }),
            period_seconds: Some(5),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: "webhook-certs".to_string(),
            mount_path: WEBHOOK_CERTS_MOUNT.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        resources: Some(resources("20m", "20Mi", "200m", "200Mi")),
        security_context: Some(build_security_context()),
        ..Default::default()
    };

    let certs = Volume {
        name: "webhook-certs".to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(WEBHOOK_CERTS_SECRET.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    Deployment {
        metadata: object_meta(WEBHOOK_NAME, Some(&options.namespace)),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: selector(WEBHOOK_NAME),
            template: pod_template(WEBHOOK_NAME, WEBHOOK_SERVICE_ACCOUNT, container, Some(certs)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_template(
    app: &str,
    service_account: &str,
    container: Container,
    volume: Option<Volume>,
) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: selector(app).match_labels,
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(service_account.to_string()),
            containers: vec![container],
            volumes: volume.map(|v| vec![v]),
            ..Default::default()
        }),
    }
}

/// Environment shared by controller and webhook
fn common_env() -> Vec<EnvVar> {
    vec![
        env_field("SYSTEM_NAMESPACE", "metadata.namespace"),
        env_value("CONFIG_LOGGING_NAME", DEFAULT_LOGGING_CONFIG_NAME),
        env_value("CONFIG_OBSERVABILITY_NAME", DEFAULT_OBSERVABILITY_CONFIG_NAME),
    ]
}

fn env_value(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn env_field(name: &str, path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn metrics_port() -> ContainerPort {
    ContainerPort {
        name: Some("metrics".to_string()),
        container_port: DEFAULT_PROMETHEUS_PORT.into(),
        ..Default::default()
    }
}

fn resources(
    cpu_request: &str,
    memory_request: &str,
    cpu_limit: &str,
    memory_limit: &str,
) -> ResourceRequirements {
    let quantities = |cpu: &str, memory: &str| {
        BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ])
    };
    ResourceRequirements {
        requests: Some(quantities(cpu_request, memory_request)),
        limits: Some(quantities(cpu_limit, memory_limit)),
        ..Default::default()
    }
}
