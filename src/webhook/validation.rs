use crate::{
    crds::{Destination, PrometheusSource},
    duration,
    schedule::Schedule,
};
use chrono::Duration;
use reqwest::Url;

/// Every problem with a new or updated source, empty when it is valid.
pub fn validate(source: &PrometheusSource, old: Option<&PrometheusSource>) -> Vec<String> {
    let spec = &source.spec;
    let mut errors = Vec::new();

    match Url::parse(&spec.server_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(format!(
            "spec.serverURL: unsupported scheme {:?}",
            url.scheme()
        )),
        Err(e) => errors.push(format!(
            "spec.serverURL: invalid URL {:?}: {}",
            spec.server_url, e
        )),
    }

    if spec.prom_ql.trim().is_empty() {
        errors.push("spec.promQL: must not be empty".to_string());
    }

    if let Err(e) = Schedule::parse(&spec.schedule) {
        errors.push(format!("spec.schedule: {}", e));
    }

    if let Some(ref step) = spec.step {
        match duration::parse(step) {
            Ok(d) if d <= Duration::zero() => {
                errors.push("spec.step: must be a positive duration".to_string())
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("spec.step: {}", e)),
        }
    }

    if let Some(ref path) = spec.auth_token_file {
        if !path.starts_with('/') {
            errors.push(format!("spec.authTokenFile: {:?} is not an absolute path", path));
        }
    }

    errors.extend(validate_destination(&spec.sink));

    if let Some(old) = old {
        if old.spec.service_account_name != spec.service_account_name {
            errors.push("spec.serviceAccountName: field is immutable".to_string());
        }
    }

    errors
}

fn validate_destination(sink: &Destination) -> Vec<String> {
    let mut errors = Vec::new();
    match (&sink.r#ref, &sink.uri) {
        (None, None) => errors.push("spec.sink: expected exactly one of ref, uri".to_string()),
        (None, Some(uri)) => match Url::parse(uri) {
            Ok(_) => {}
            Err(_) => errors.push(format!("spec.sink.uri: {:?} is not an absolute URI", uri)),
        },
        (Some(reference), uri) => {
            for (field, value) in [
                ("kind", &reference.kind),
                ("apiVersion", &reference.api_version),
                ("name", &reference.name),
            ] {
                if value.trim().is_empty() {
                    errors.push(format!("spec.sink.ref.{}: missing field", field));
                }
            }
            // with a ref the uri is resolved against the ref's address
            if let Some(uri) = uri {
                if Url::parse(uri).is_ok() {
                    errors.push(format!(
                        "spec.sink.uri: {:?} must be relative when ref is set",
                        uri
                    ));
                }
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{KReference, PrometheusSourceSpec};

    fn source() -> PrometheusSource {
        PrometheusSource::new(
            "cpu",
            PrometheusSourceSpec {
                service_account_name: Some("prom-reader".into()),
                server_url: "https://thanos-querier.openshift-monitoring.svc:9091".into(),
                prom_ql: "sum(up)".into(),
                auth_token_file: Some("/var/run/secrets/kubernetes.io/serviceaccount/token".into()),
                ca_cert_config_map: Some("serving-certs-ca-bundle".into()),
                schedule: "*/5 * * * *".into(),
                step: Some("15s".into()),
                sink: Destination {
                    r#ref: Some(KReference {
                        kind: "Service".into(),
                        namespace: Some("default".into()),
                        name: "event-display".into(),
                        api_version: "serving.knative.dev/v1".into(),
                    }),
                    uri: None,
                },
            },
        )
    }

    #[test]
    fn test_valid_source() {
        assert!(validate(&source(), None).is_empty());
    }

    #[test]
    fn test_all_errors_are_reported() {
        let mut s = source();
        s.spec.server_url = "prometheus:9090/api".into();
        s.spec.prom_ql = " ".into();
        s.spec.schedule = "every minute".into();
        s.spec.step = Some("5 seconds".into());
        s.spec.auth_token_file = Some("token".into());

        let errors = validate(&s, None);
        assert_eq!(errors.len(), 5, "{:?}", errors);
        assert!(errors[0].starts_with("spec.serverURL"));
        assert!(errors[1].starts_with("spec.promQL"));
        assert!(errors[2].starts_with("spec.schedule"));
        assert!(errors[3].starts_with("spec.step"));
        assert!(errors[4].starts_with("spec.authTokenFile"));
    }

    #[test]
    fn test_step_must_be_positive() {
        let mut s = source();
        for step in ["0s", "0", "0ms"] {
            s.spec.step = Some(step.into());
            let errors = validate(&s, None);
            assert_eq!(errors, vec!["spec.step: must be a positive duration"], "{step}");
        }
        s.spec.step = Some("500ms".into());
        assert!(validate(&s, None).is_empty());
    }

    #[test]
    fn test_sink_shapes() {
        let mut s = source();
        s.spec.sink = Destination::default();
        assert_eq!(validate(&s, None).len(), 1);

        s.spec.sink.uri = Some("/relative".into());
        assert!(validate(&s, None)[0].starts_with("spec.sink.uri"));

        s.spec.sink.uri = Some("http://sink.default.svc.cluster.local".into());
        assert!(validate(&s, None).is_empty());

        let mut with_ref = source();
        with_ref.spec.sink.uri = Some("/extra/path".into());
        assert!(validate(&with_ref, None).is_empty());
        with_ref.spec.sink.uri = Some("http://elsewhere/".into());
        assert_eq!(validate(&with_ref, None).len(), 1);

        if let Some(r) = with_ref.spec.sink.r#ref.as_mut() {
            r.name = String::new();
            r.kind = String::new();
        }
        with_ref.spec.sink.uri = None;
        assert_eq!(validate(&with_ref, None).len(), 2);
    }

    #[test]
    fn test_service_account_is_immutable() {
        let old = source();
        let mut new = source();
        new.spec.service_account_name = Some("other".into());
        let errors = validate(&new, Some(&old));
        assert_eq!(errors, vec!["spec.serviceAccountName: field is immutable"]);

        // other fields may change
        let mut new = source();
        new.spec.prom_ql = "sum(rate(http_requests_total[1m]))".into();
        assert!(validate(&new, Some(&old)).is_empty());
    }

    #[test]
    fn test_unsupported_scheme() {
        let mut s = source();
        s.spec.server_url = "ftp://prometheus/".into();
        assert!(validate(&s, None)[0].contains("unsupported scheme"));
    }
}
