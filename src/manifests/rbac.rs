use super::{
    object_meta, ReleaseOptions, CONTROLLER_NAME, CONTROLLER_SERVICE_ACCOUNT, WEBHOOK_NAME,
    WEBHOOK_SERVICE_ACCOUNT,
};
use k8s_openapi::api::{
    core::v1::ServiceAccount,
    rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject},
};

const ALL_VERBS: &[&str] = &["get", "list", "watch", "create", "update", "patch", "delete"];
const READ_VERBS: &[&str] = &["get", "list", "watch"];

pub fn service_accounts(options: &ReleaseOptions) -> Vec<ServiceAccount> {
    [CONTROLLER_SERVICE_ACCOUNT, WEBHOOK_SERVICE_ACCOUNT]
        .into_iter()
        .map(|name| ServiceAccount {
            metadata: object_meta(name, Some(&options.namespace)),
            ..Default::default()
        })
        .collect()
}

pub fn cluster_roles() -> Vec<ClusterRole> {
    let controller = vec![
        rule(
            &["sources.knative.dev"],
            &[
                "prometheussources",
                "prometheussources/status",
                "prometheussources/finalizers",
            ],
            ALL_VERBS,
        ),
        rule(&["apps"], &["deployments"], ALL_VERBS),
        rule(&[""], &["secrets", "configmaps", "services", "events"], ALL_VERBS),
        rule(&["events.k8s.io"], &["events"], ALL_VERBS),
        rule(&["eventing.knative.dev"], &["eventtypes"], ALL_VERBS),
        // sinks are resolved through their status.address
        rule(&["eventing.knative.dev"], &["brokers"], READ_VERBS),
        rule(&["messaging.knative.dev"], &["channels"], READ_VERBS),
        rule(&["serving.knative.dev"], &["services", "routes"], READ_VERBS),
        rule(&["coordination.k8s.io"], &["leases"], ALL_VERBS),
    ];

    let webhook = vec![
        rule(
            &["sources.knative.dev"],
            &["prometheussources", "prometheussources/status"],
            READ_VERBS,
        ),
        rule(&["serving.knative.dev"], &["revisions"], READ_VERBS),
        rule(
            &["admissionregistration.k8s.io"],
            &[
                "mutatingwebhookconfigurations",
                "validatingwebhookconfigurations",
            ],
            &["get", "list", "watch", "update", "patch"],
        ),
        rule(&[""], &["configmaps", "secrets"], READ_VERBS),
        rule(&["coordination.k8s.io"], &["leases"], ALL_VERBS),
    ];

    vec![
        cluster_role(CONTROLLER_NAME, controller),
        cluster_role(WEBHOOK_NAME, webhook),
    ]
}

pub fn cluster_role_bindings(options: &ReleaseOptions) -> Vec<ClusterRoleBinding> {
    vec![
        binding(CONTROLLER_NAME, CONTROLLER_SERVICE_ACCOUNT, options),
        binding(WEBHOOK_NAME, WEBHOOK_SERVICE_ACCOUNT, options),
    ]
}

fn cluster_role(name: &str, rules: Vec<PolicyRule>) -> ClusterRole {
    ClusterRole {
        metadata: object_meta(name, None),
        rules: Some(rules),
        ..Default::default()
    }
}

fn binding(role: &str, service_account: &str, options: &ReleaseOptions) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: object_meta(role, None),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: role.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: service_account.to_string(),
            namespace: Some(options.namespace.clone()),
            ..Default::default()
        }]),
    }
}

fn rule(groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    PolicyRule {
        api_groups: Some(owned(groups)),
        resources: Some(owned(resources)),
        verbs: owned(verbs),
        ..Default::default()
    }
}
