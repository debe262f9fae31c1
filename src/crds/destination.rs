use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where events are delivered: an addressable object, a URI, or a URI
/// relative to an addressable object.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Reference to an Addressable object
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<KReference>,

    /// Absolute URI, or a URI relative to the resolved `ref`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KReference {
    pub kind: String,

    /// Defaults to the namespace of the referencing object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    pub name: String,

    pub api_version: String,
}

impl KReference {
    /// The API group of the referenced object, empty for the core group.
    pub fn group(&self) -> &str {
        self.api_version
            .split_once('/')
            .map(|(group, _)| group)
            .unwrap_or("")
    }

    pub fn is_core_service(&self) -> bool {
        self.kind == "Service" && self.api_version == "v1"
    }

    pub fn is_broker(&self) -> bool {
        self.kind == "Broker" && self.group() == "eventing.knative.dev"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_field_name() {
        let dest: Destination = serde_json::from_value(serde_json::json!({
            "ref": {"kind": "Broker", "name": "default", "apiVersion": "eventing.knative.dev/v1"}
        }))
        .unwrap();
        let r = dest.r#ref.unwrap();
        assert!(r.is_broker());
        assert_eq!(r.group(), "eventing.knative.dev");
        assert!(dest.uri.is_none());
    }

    #[test]
    fn test_core_service() {
        let r = KReference {
            kind: "Service".into(),
            namespace: None,
            name: "event-display".into(),
            api_version: "v1".into(),
        };
        assert!(r.is_core_service());
        assert_eq!(r.group(), "");
        // Knative Services share the kind name but not the group
        let ksvc = KReference {
            api_version: "serving.knative.dev/v1".into(),
            ..r
        };
        assert!(!ksvc.is_core_service());
    }
}
