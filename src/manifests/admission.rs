use super::{object_meta, selector, ReleaseOptions, WEBHOOK_CERTS_SECRET, WEBHOOK_NAME};
use crate::{
    crds::{PrometheusSource, Revision},
    manifests::workloads::WEBHOOK_PORT,
    webhook::{DEFAULTING_PATH, VALIDATION_PATH},
};
use k8s_openapi::{
    api::{
        admissionregistration::v1::{
            MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
            ValidatingWebhook, ValidatingWebhookConfiguration, WebhookClientConfig,
        },
        core::v1::{Secret, Service, ServicePort, ServiceSpec},
    },
    apimachinery::pkg::{
        apis::meta::v1::{LabelSelector, LabelSelectorRequirement},
        util::intstr::IntOrString,
    },
};
use kube::Resource;

pub const DEFAULTING_WEBHOOK: &str = "defaulting.webhook.prometheus.sources.knative.dev";
pub const VALIDATION_WEBHOOK: &str = "validation.webhook.prometheus.sources.knative.dev";
pub const REVISION_WEBHOOK: &str = "revisions.validation.webhook.prometheus.sources.knative.dev";
pub const SERVICE_PORT: i32 = 443;

pub fn service(options: &ReleaseOptions) -> Service {
    Service {
        metadata: object_meta(WEBHOOK_NAME, Some(&options.namespace)),
        spec: Some(ServiceSpec {
            selector: selector(WEBHOOK_NAME).match_labels,
            ports: Some(vec![ServicePort {
                name: Some("https-webhook".to_string()),
                port: SERVICE_PORT,
                target_port: Some(IntOrString::Int(WEBHOOK_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Serving certificate of the webhook, populated by the cluster's certificate tooling
pub fn certs_secret(options: &ReleaseOptions) -> Secret {
    Secret {
        metadata: object_meta(WEBHOOK_CERTS_SECRET, Some(&options.namespace)),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

pub fn defaulting(options: &ReleaseOptions) -> MutatingWebhookConfiguration {
    MutatingWebhookConfiguration {
        metadata: object_meta(DEFAULTING_WEBHOOK, None),
        webhooks: Some(vec![MutatingWebhook {
            name: DEFAULTING_WEBHOOK.to_string(),
            admission_review_versions: vec!["v1".to_string()],
            client_config: client_config(options, DEFAULTING_PATH),
            failure_policy: Some("Fail".to_string()),
            side_effects: "None".to_string(),
            rules: Some(vec![rule::<PrometheusSource>(&["CREATE", "UPDATE"])]),
            ..Default::default()
        }]),
    }
}

pub fn validation(options: &ReleaseOptions) -> ValidatingWebhookConfiguration {
    ValidatingWebhookConfiguration {
        metadata: object_meta(VALIDATION_WEBHOOK, None),
        webhooks: Some(vec![
            ValidatingWebhook {
                name: VALIDATION_WEBHOOK.to_string(),
                admission_review_versions: vec!["v1".to_string()],
                client_config: client_config(options, VALIDATION_PATH),
                failure_policy: Some("Fail".to_string()),
                side_effects: "None".to_string(),
                rules: Some(vec![rule::<PrometheusSource>(&["CREATE", "UPDATE"])]),
                ..Default::default()
            },
            // Serving enforces Revision immutability itself; this check must
            // not block Revision updates while this webhook is down.
            ValidatingWebhook {
                name: REVISION_WEBHOOK.to_string(),
                admission_review_versions: vec!["v1".to_string()],
                client_config: client_config(options, VALIDATION_PATH),
                failure_policy: Some("Ignore".to_string()),
                side_effects: "None".to_string(),
                namespace_selector: Some(LabelSelector {
                    match_expressions: Some(vec![LabelSelectorRequirement {
                        key: "kubernetes.io/metadata.name".to_string(),
                        operator: "NotIn".to_string(),
                        values: Some(
                            ["kube-system", "knative-serving", options.namespace.as_str()]
                                .iter()
                                .map(|ns| ns.to_string())
                                .collect(),
                        ),
                    }]),
                    ..Default::default()
                }),
                rules: Some(vec![rule::<Revision>(&["UPDATE"])]),
                timeout_seconds: Some(5),
                ..Default::default()
            },
        ]),
    }
}

fn client_config(options: &ReleaseOptions, path: &str) -> WebhookClientConfig {
    WebhookClientConfig {
        service: Some(ServiceReference {
            name: WEBHOOK_NAME.to_string(),
            namespace: options.namespace.clone(),
            path: Some(path.to_string()),
            port: Some(SERVICE_PORT),
        }),
        ..Default::default()
    }
}

fn rule<K: Resource<DynamicType = ()>>(operations: &[&str]) -> RuleWithOperations {
    RuleWithOperations {
        api_groups: Some(vec![K::group(&()).to_string()]),
        api_versions: Some(vec![K::version(&()).to_string()]),
        operations: Some(operations.iter().map(|o| o.to_string()).collect()),
        resources: Some(vec![K::plural(&()).to_string()]),
        ..Default::default()
    }
}
