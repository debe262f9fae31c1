//! Admission webhook for PrometheusSource (defaulting and validation) and
//! Revision (immutability).

use crate::{
    config::WebhookConfig,
    crds::{PrometheusSource, Revision},
    error::{Error, Result},
    telemetry::AdmissionMetrics,
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use kube::{
    core::{
        admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
        DynamicObject, GroupVersionKind,
    },
    Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub mod defaulting;
pub mod validation;

pub const DEFAULTING_PATH: &str = "/defaulting";
pub const VALIDATION_PATH: &str = "/validation";

#[derive(Clone)]
pub struct WebhookState {
    pub metrics: Arc<AdmissionMetrics>,
    /// Log every admission request
    pub log_requests: bool,
}

type Handler = fn(&AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse>;

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route(DEFAULTING_PATH, post(defaulting_handler))
        .route(VALIDATION_PATH, post(validation_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the webhook over TLS until the process is stopped.
pub async fn serve(config: &WebhookConfig, state: WebhookState) -> Result<()> {
    let tls = RustlsConfig::from_pem_file(&config.tls_cert_file, &config.tls_key_file).await?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));

    info!("Serving admission webhook on {}", addr);
    axum_server::bind_rustls(addr, tls)
        .serve(router(state).into_make_service())
        .await?;
    Ok(())
}

async fn defaulting_handler(
    State(state): State<WebhookState>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    Json(state.admit("defaulting", review, mutate))
}

async fn validation_handler(
    State(state): State<WebhookState>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    Json(state.admit("validation", review, validate))
}

impl WebhookState {
    fn admit(
        &self,
        hook: &str,
        review: AdmissionReview<DynamicObject>,
        handler: Handler,
    ) -> AdmissionReview<DynamicObject> {
        let req: AdmissionRequest<DynamicObject> = match review.try_into() {
            Ok(req) => req,
            Err(err) => {
                error!("invalid request: {}", err);
                self.metrics.record(hook, false);
                return AdmissionResponse::invalid(err.to_string()).into_review();
            }
        };

        if self.log_requests {
            info!(
                uid = %req.uid,
                kind = %req.kind.kind,
                operation = ?req.operation,
                name = %req.name,
                "{} request", hook
            );
        }

        let res = match handler(&req) {
            Ok(res) => res,
            Err(err) => {
                warn!("{} of {} failed: {}", hook, req.name, err);
                AdmissionResponse::from(&req).deny(err.to_string())
            }
        };
        self.metrics.record(hook, res.allowed);
        res.into_review()
    }
}

fn is_kind<K: Resource<DynamicType = ()>>(gvk: &GroupVersionKind) -> bool {
    gvk.group == K::group(&()) && gvk.kind == K::kind(&())
}

fn typed<K: DeserializeOwned>(obj: &DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Apply defaults to a PrometheusSource and answer with the resulting JSON patch.
fn mutate(req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
    let res = AdmissionResponse::from(req);
    let Some(obj) = req.object.as_ref() else {
        return Ok(res);
    };
    if !is_kind::<PrometheusSource>(&req.kind) {
        return Ok(res);
    }

    let original: PrometheusSource = typed(obj)?;
    let namespace = req
        .namespace
        .clone()
        .or_else(|| original.namespace())
        .unwrap_or_default();
    let mut defaulted = original.clone();
    defaulting::set_defaults(&mut defaulted, &namespace);

    let patch = json_patch::diff(
        &serde_json::to_value(&original)?,
        &serde_json::to_value(&defaulted)?,
    );
    if patch.0.is_empty() {
        return Ok(res);
    }
    res.with_patch(patch)
        .map_err(|e| Error::AdmissionError(e.to_string()))
}

fn validate(req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
    let res = AdmissionResponse::from(req);
    let Some(obj) = req.object.as_ref() else {
        return Ok(res);
    };
    let old = match req.operation {
        Operation::Update => req.old_object.as_ref(),
        _ => None,
    };

    if is_kind::<PrometheusSource>(&req.kind) {
        let source: PrometheusSource = typed(obj)?;
        let old: Option<PrometheusSource> = old.map(typed::<PrometheusSource>).transpose()?;
        let errors = validation::validate(&source, old.as_ref());
        if !errors.is_empty() {
            return Ok(res.deny(errors.join("; ")));
        }
    } else if is_kind::<Revision>(&req.kind) {
        if let Some(old) = old {
            let revision: Revision = typed(obj)?;
            if let Err(diff) = revision.check_immutable(&typed(old)?) {
                return Ok(res.deny(diff));
            }
        }
    }

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn state() -> WebhookState {
        WebhookState {
            metrics: Arc::new(AdmissionMetrics::new().unwrap()),
            log_requests: false,
        }
    }

    fn source_object(schedule: &str, sink_namespace: Option<&str>) -> Value {
        let mut reference = json!({
            "kind": "Broker",
            "name": "default",
            "apiVersion": "eventing.knative.dev/v1"
        });
        if let Some(ns) = sink_namespace {
            reference["namespace"] = json!(ns);
        }
        json!({
            "apiVersion": "sources.knative.dev/v1alpha1",
            "kind": "PrometheusSource",
            "metadata": {"name": "cpu", "namespace": "team-a"},
            "spec": {
                "serverURL": "http://prometheus.monitoring:9090",
                "promQL": "up",
                "schedule": schedule,
                "sink": {"ref": reference}
            }
        })
    }

    fn review(kind: Value, operation: &str, object: Value, old: Value) -> Value {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": kind,
                "resource": {"group": "sources.knative.dev", "version": "v1alpha1", "resource": "prometheussources"},
                "name": "cpu",
                "namespace": "team-a",
                "operation": operation,
                "userInfo": {"username": "admin"},
                "object": object,
                "oldObject": old,
                "dryRun": false
            }
        })
    }

    fn source_kind() -> Value {
        json!({"group": "sources.knative.dev", "version": "v1alpha1", "kind": "PrometheusSource"})
    }

    async fn post(path: &str, body: Value) -> Value {
        let response = router(state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = router(state())
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_defaulting_sets_sink_namespace() {
        let body = review(
            source_kind(),
            "CREATE",
            source_object(" * * * * * ", None),
            Value::Null,
        );
        let out = post(DEFAULTING_PATH, body).await;
        let response = &out["response"];
        assert_eq!(response["allowed"], true);
        assert_eq!(response["patchType"], "JSONPatch");
        assert!(!response["patch"].is_null());
    }

    #[test]
    fn test_mutate_patch_contents() {
        let body = review(
            source_kind(),
            "CREATE",
            source_object(" * * * * * ", None),
            Value::Null,
        );
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(body).unwrap();
        let req: AdmissionRequest<DynamicObject> = review.try_into().unwrap();
        let res = mutate(&req).unwrap();
        assert!(res.allowed);

        let patch: Value = serde_json::from_slice(res.patch.as_ref().unwrap()).unwrap();
        let ops = patch.as_array().unwrap();
        let paths: Vec<&str> = ops.iter().map(|op| op["path"].as_str().unwrap()).collect();
        assert!(paths.contains(&"/spec/schedule"));
        assert!(paths.contains(&"/spec/sink/ref/namespace"));
    }

    #[test]
    fn test_no_patch_when_already_defaulted() {
        let body = review(
            source_kind(),
            "CREATE",
            source_object("* * * * *", Some("team-a")),
            Value::Null,
        );
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(body).unwrap();
        let req: AdmissionRequest<DynamicObject> = review.try_into().unwrap();
        let res = mutate(&req).unwrap();
        assert!(res.allowed);
        assert!(res.patch.is_none());
    }

    #[tokio::test]
    async fn test_validation_denies_invalid_schedule() {
        let body = review(
            source_kind(),
            "CREATE",
            source_object("61 * * * *", Some("team-a")),
            Value::Null,
        );
        let out = post(VALIDATION_PATH, body).await;
        assert_eq!(out["response"]["allowed"], false);
        assert!(out["response"]["status"]["message"]
            .as_str()
            .unwrap()
            .contains("spec.schedule"));
    }

    #[tokio::test]
    async fn test_validation_allows_valid_source() {
        let body = review(
            source_kind(),
            "CREATE",
            source_object("@every 1m", Some("team-a")),
            Value::Null,
        );
        let out = post(VALIDATION_PATH, body).await;
        assert_eq!(out["response"]["allowed"], true);
        assert_eq!(
            out["response"]["uid"],
            "705ab4f5-6393-11e8-b7cc-42010a800002"
        );
    }

    #[tokio::test]
    async fn test_validation_rejects_service_account_change() {
        let mut old = source_object("* * * * *", Some("team-a"));
        old["spec"]["serviceAccountName"] = json!("reader");
        let mut new = old.clone();
        new["spec"]["serviceAccountName"] = json!("admin");

        let out = post(VALIDATION_PATH, review(source_kind(), "UPDATE", new, old)).await;
        assert_eq!(out["response"]["allowed"], false);
        assert!(out["response"]["status"]["message"]
            .as_str()
            .unwrap()
            .contains("immutable"));
    }

    #[tokio::test]
    async fn test_revision_spec_is_immutable() {
        let revision = |image: &str| {
            json!({
                "apiVersion": "serving.knative.dev/v1",
                "kind": "Revision",
                "metadata": {"name": "hello-00001", "namespace": "team-a"},
                "spec": {
                    "containers": [{"name": "user-container", "image": image}],
                    "timeoutSeconds": 300
                }
            })
        };
        let kind = json!({"group": "serving.knative.dev", "version": "v1", "kind": "Revision"});

        let out = post(
            VALIDATION_PATH,
            review(kind.clone(), "UPDATE", revision("hello:v2"), revision("hello:v1")),
        )
        .await;
        assert_eq!(out["response"]["allowed"], false);

        let out = post(
            VALIDATION_PATH,
            review(kind, "UPDATE", revision("hello:v1"), revision("hello:v1")),
        )
        .await;
        assert_eq!(out["response"]["allowed"], true);
    }

    #[tokio::test]
    async fn test_unknown_kinds_are_allowed() {
        let kind = json!({"group": "", "version": "v1", "kind": "ConfigMap"});
        let object = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cpu", "namespace": "team-a"},
            "data": {"schedule": "not a schedule"}
        });
        let out = post(VALIDATION_PATH, review(kind, "CREATE", object, Value::Null)).await;
        assert_eq!(out["response"]["allowed"], true);
    }
}
