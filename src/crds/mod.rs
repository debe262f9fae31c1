pub mod condition;
pub mod destination;
pub mod event_type;
pub mod prometheus_source;
pub mod revision;

// Re-export types
pub use condition::{
    Condition, ConditionSet, ConditionSeverity, ConditionStatus, Status, CONDITION_READY,
};
pub use destination::{Destination, KReference};
pub use event_type::{EventType, EventTypeSpec};
pub use prometheus_source::{
    PrometheusSource, PrometheusSourceSpec, PrometheusSourceStatus, CONDITION_DEPLOYED,
    CONDITION_SINK_PROVIDED, CONDITION_VALID_SCHEDULE, PROMQL_EVENT_TYPE,
};
pub use revision::{
    is_revision_condition, ContainerStatus, Revision, RevisionSpec, RevisionStatus,
    RevisionTemplateSpec,
};
