use crate::{
    crds::{EventType, EventTypeSpec, KReference, PrometheusSource, PROMQL_EVENT_TYPE},
    error::{Error, Result},
    resources::labels,
    utils,
};
use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams},
    Client, Resource, ResourceExt,
};
use tracing::info;

/// Register the PromQL event type with the Broker the source delivers to.
pub async fn apply(
    client: &Client,
    source: &PrometheusSource,
    broker: &KReference,
) -> Result<EventType> {
    let namespace = source.namespace().unwrap_or_default();
    let api: Api<EventType> = Api::namespaced(client.clone(), &namespace);
    let event_type = build_event_type(source, broker)?;
    let name = event_type.name_any();

    let applied = api
        .patch(
            &name,
            &PatchParams::apply(labels::CONTROLLER_AGENT_NAME).force(),
            &Patch::Apply(&event_type),
        )
        .await?;
    info!("Applied EventType {}/{}", namespace, name);
    Ok(applied)
}

pub fn build_event_type(source: &PrometheusSource, broker: &KReference) -> Result<EventType> {
    let owner = source
        .controller_owner_ref(&())
        .ok_or_else(|| Error::ResourceCreationError {
            resource_type: "EventType".to_string(),
            reason: "source has no uid yet".to_string(),
        })?;
    let uid = source.uid().unwrap_or_default();

    let mut event_type = EventType::new(
        &utils::child_name(&source.name_any(), &uid),
        EventTypeSpec {
            r#type: PROMQL_EVENT_TYPE.to_string(),
            source: Some(source.spec.server_url.clone()),
            schema: None,
            broker: Some(broker.name.clone()),
            description: Some(format!("PromQL results of {}", source.name_any())),
        },
    );
    event_type.metadata = ObjectMeta {
        name: event_type.metadata.name.take(),
        namespace: source.namespace(),
        labels: Some(labels::selector_labels(source)),
        owner_references: Some(vec![owner]),
        ..Default::default()
    };
    Ok(event_type)
}
