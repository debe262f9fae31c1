pub mod adapter;
pub mod config;
pub mod crds;
pub mod date_time;
pub mod duration;
pub mod error;
pub mod leader_election;
pub mod manifests;
pub mod reconciler;
pub mod resources;
pub mod schedule;
pub mod telemetry;
pub mod utils;
pub mod webhook;
