pub mod deployment;
pub mod event_type;
pub mod labels;
