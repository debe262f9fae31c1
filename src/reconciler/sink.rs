use crate::{
    crds::{Destination, KReference},
    error::{Error, Result},
};
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{Api, DynamicObject},
    core::GroupVersionKind,
    discovery, Client,
};
use reqwest::Url;

/// Resolve a Destination to the URI events are POSTed to.
pub async fn resolve(client: &Client, dest: &Destination, default_namespace: &str) -> Result<String> {
    match (&dest.r#ref, &dest.uri) {
        (None, None) => Err(Error::SinkResolution(
            "sink has neither ref nor uri".to_string(),
        )),
        (None, Some(uri)) => parse_absolute(uri).map(String::from),
        (Some(reference), uri) => {
            let namespace = reference.namespace.as_deref().unwrap_or(default_namespace);
            let base = resolve_ref(client, reference, namespace).await?;
            match uri {
                Some(relative) => join(&base, relative),
                None => Ok(base),
            }
        }
    }
}

async fn resolve_ref(client: &Client, reference: &KReference, namespace: &str) -> Result<String> {
    if reference.is_core_service() {
        let services: Api<Service> = Api::namespaced(client.clone(), namespace);
        return match services.get_opt(&reference.name).await? {
            Some(_) => Ok(service_url(&reference.name, namespace)),
            None => Err(not_found(reference, namespace)),
        };
    }

    let (group, version) = split_api_version(&reference.api_version);
    let gvk = GroupVersionKind::gvk(group, version, &reference.kind);
    let (resource, _caps) = discovery::pinned_kind(client, &gvk).await.map_err(|e| {
        Error::SinkResolution(format!(
            "failed to discover {}: {}",
            reference.api_version, e
        ))
    })?;

    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &resource);
    let obj = api
        .get_opt(&reference.name)
        .await?
        .ok_or_else(|| not_found(reference, namespace))?;

    address_url(&obj).ok_or_else(|| {
        Error::SinkResolution(format!(
            "{} \"{}/{}\" does not contain address",
            reference.kind, namespace, reference.name
        ))
    })
}

/// `status.address.url` of an Addressable object
pub fn address_url(obj: &DynamicObject) -> Option<String> {
    obj.data
        .get("status")?
        .get("address")?
        .get("url")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(String::from)
}

pub fn service_url(name: &str, namespace: &str) -> String {
    format!("http://{}.{}.svc.cluster.local/", name, namespace)
}

fn split_api_version(api_version: &str) -> (&str, &str) {
    api_version.split_once('/').unwrap_or(("", api_version))
}

fn parse_absolute(uri: &str) -> Result<Url> {
    Url::parse(uri).map_err(|e| Error::SinkResolution(format!("invalid uri {:?}: {}", uri, e)))
}

fn join(base: &str, relative: &str) -> Result<String> {
    parse_absolute(base)?
        .join(relative)
        .map(String::from)
        .map_err(|e| Error::SinkResolution(format!("cannot resolve {:?} against {}: {}", relative, base, e)))
}

fn not_found(reference: &KReference, namespace: &str) -> Error {
    Error::SinkResolution(format!(
        "{} \"{}/{}\" not found",
        reference.kind, namespace, reference.name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_url() {
        assert_eq!(
            service_url("event-display", "default"),
            "http://event-display.default.svc.cluster.local/"
        );
    }

    #[test]
    fn test_address_url() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "eventing.knative.dev/v1",
            "kind": "Broker",
            "metadata": {"name": "default", "namespace": "default"},
            "status": {"address": {"url": "http://broker-ingress.knative-eventing.svc.cluster.local/default/default"}}
        }))
        .unwrap();
        assert_eq!(
            address_url(&obj).as_deref(),
            Some("http://broker-ingress.knative-eventing.svc.cluster.local/default/default")
        );
    }

    #[test]
    fn test_missing_address() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "serving.knative.dev/v1",
            "kind": "Service",
            "metadata": {"name": "hello"},
            "status": {"conditions": []}
        }))
        .unwrap();
        assert!(address_url(&obj).is_none());
    }

    #[test]
    fn test_split_api_version() {
        assert_eq!(split_api_version("v1"), ("", "v1"));
        assert_eq!(
            split_api_version("serving.knative.dev/v1"),
            ("serving.knative.dev", "v1")
        );
    }

    #[test]
    fn test_relative_uri_join() {
        assert_eq!(
            join("http://sink.default.svc.cluster.local/", "/extra/path").unwrap(),
            "http://sink.default.svc.cluster.local/extra/path"
        );
        assert_eq!(
            join("http://broker/default/default", "sub").unwrap(),
            "http://broker/default/sub"
        );
    }

    #[tokio::test]
    async fn test_uri_only_must_be_absolute() {
        // the uri-only path never talks to the cluster
        let client = test_client();
        let dest = Destination {
            r#ref: None,
            uri: Some("http://example.com/events".into()),
        };
        assert_eq!(
            resolve(&client, &dest, "default").await.unwrap(),
            "http://example.com/events"
        );
        let relative = Destination {
            r#ref: None,
            uri: Some("/events".into()),
        };
        assert!(resolve(&client, &relative, "default").await.is_err());
        assert!(resolve(&client, &Destination::default(), "default").await.is_err());
    }

    fn test_client() -> Client {
        let config = kube::Config::new("http://127.0.0.1:1".parse().unwrap());
        Client::try_from(config).unwrap()
    }
}
