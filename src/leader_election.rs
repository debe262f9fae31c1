//! Lease based leader election for the controller replicas.

use crate::{
    config::leader_election::LeaderElectionConfig,
    error::{Error, Result},
};
use chrono::{DateTime, Utc};
use k8s_openapi::{
    api::coordination::v1::{Lease, LeaseSpec},
    apimachinery::pkg::apis::meta::v1::MicroTime,
};
use kube::api::{Api, ObjectMeta, PostParams};
use std::time::Instant;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

pub const LEASE_NAME: &str = "prometheus-source-controller";

#[derive(Debug, PartialEq, Eq)]
enum LeaseDecision {
    Create,
    Renew,
    Takeover,
    HeldBy(String),
}

fn decide(lease: Option<&Lease>, identity: &str, now: DateTime<Utc>) -> LeaseDecision {
    let Some(lease) = lease else {
        return LeaseDecision::Create;
    };
    let spec = lease.spec.as_ref();
    let holder = spec
        .and_then(|s| s.holder_identity.as_deref())
        .unwrap_or_default();

    if holder == identity {
        return LeaseDecision::Renew;
    }
    if holder.is_empty() {
        return LeaseDecision::Takeover;
    }

    let renewed = spec.and_then(|s| s.renew_time.as_ref()).map(|t| t.0);
    let duration = spec
        .and_then(|s| s.lease_duration_seconds)
        .map(|secs| chrono::Duration::seconds(secs.into()));
    match (renewed, duration) {
        (Some(renewed), Some(duration)) if renewed + duration >= now => {
            LeaseDecision::HeldBy(holder.to_string())
        }
        _ => LeaseDecision::Takeover,
    }
}

#[derive(Clone)]
pub struct LeaseLock {
    api: Api<Lease>,
    name: String,
    identity: String,
    config: LeaderElectionConfig,
}

impl LeaseLock {
    pub fn new(api: Api<Lease>, name: &str, identity: &str, config: LeaderElectionConfig) -> Self {
        LeaseLock {
            api,
            name: name.to_string(),
            identity: identity.to_string(),
            config,
        }
    }

    fn lease_seconds(&self) -> i32 {
        self.config.lease_duration.as_secs().try_into().unwrap_or(i32::MAX)
    }

    /// One election round. Returns whether we hold the lease afterwards.
    pub async fn try_acquire_or_renew(&self) -> Result<bool> {
        let now = Utc::now();
        let existing = self
            .api
            .get_opt(&self.name)
            .await
            .map_err(|e| lease_error(&self.name, e))?;

        let decision = decide(existing.as_ref(), &self.identity, now);
        let Some(mut lease) = existing else {
            let lease = Lease {
                metadata: ObjectMeta {
                    name: Some(self.name.clone()),
                    ..Default::default()
                },
                spec: Some(LeaseSpec {
                    holder_identity: Some(self.identity.clone()),
                    lease_duration_seconds: Some(self.lease_seconds()),
                    acquire_time: Some(MicroTime(now)),
                    renew_time: Some(MicroTime(now)),
                    lease_transitions: Some(0),
                    ..Default::default()
                }),
            };
            let created = self.api.create(&PostParams::default(), &lease).await;
            return write_outcome(&self.name, created);
        };

        let spec = lease.spec.get_or_insert_with(LeaseSpec::default);
        match decision {
            LeaseDecision::HeldBy(holder) => {
                debug!("Lease {} is held by {}", self.name, holder);
                return Ok(false);
            }
            LeaseDecision::Renew => {
                spec.renew_time = Some(MicroTime(now));
                spec.lease_duration_seconds = Some(self.lease_seconds());
            }
            LeaseDecision::Takeover | LeaseDecision::Create => {
                spec.holder_identity = Some(self.identity.clone());
                spec.acquire_time = Some(MicroTime(now));
                spec.renew_time = Some(MicroTime(now));
                spec.lease_duration_seconds = Some(self.lease_seconds());
                spec.lease_transitions = Some(spec.lease_transitions.unwrap_or(0) + 1);
            }
        }

        // resourceVersion from the read makes this a compare-and-swap
        let replaced = self.api.replace(&self.name, &PostParams::default(), &lease).await;
        write_outcome(&self.name, replaced)
    }

    /// Block until the lease is ours.
    pub async fn acquire(&self) -> Result<()> {
        info!("Waiting for lease {} as {}", self.name, self.identity);
        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    info!("Acquired lease {}", self.name);
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to acquire lease {}: {}", self.name, e),
            }
            tokio::time::sleep(self.config.retry_period).await;
        }
    }

    /// Keep renewing the lease in the background. The returned receiver
    /// flips to `true` once leadership is lost.
    pub fn spawn_renewal(&self) -> (JoinHandle<()>, watch::Receiver<bool>) {
        let (lost_tx, lost_rx) = watch::channel(false);
        let lock = self.clone();

        let handle = tokio::spawn(async move {
            let mut last_renew = Instant::now();
            loop {
                tokio::time::sleep(lock.config.retry_period).await;
                match lock.try_acquire_or_renew().await {
                    Ok(true) => last_renew = Instant::now(),
                    Ok(false) => debug!("Lease {} renewal was not accepted", lock.name),
                    Err(e) => warn!("Failed to renew lease {}: {}", lock.name, e),
                }
                if last_renew.elapsed() > lock.config.renew_deadline {
                    warn!(
                        "Could not renew lease {} within {:?}",
                        lock.name, lock.config.renew_deadline
                    );
                    let _ = lost_tx.send(true);
                    return;
                }
            }
        });

        (handle, lost_rx)
    }

    /// Hand the lease back so another replica does not wait for expiry.
    pub async fn release(&self) -> Result<()> {
        let existing = self
            .api
            .get_opt(&self.name)
            .await
            .map_err(|e| lease_error(&self.name, e))?;
        let Some(mut lease) = existing else {
            return Ok(());
        };
        let spec = lease.spec.get_or_insert_with(LeaseSpec::default);
        if spec.holder_identity.as_deref() != Some(self.identity.as_str()) {
            return Ok(());
        }
        spec.holder_identity = None;
        spec.lease_duration_seconds = Some(1);
        spec.renew_time = Some(MicroTime(Utc::now()));
        self.api
            .replace(&self.name, &PostParams::default(), &lease)
            .await
            .map_err(|e| lease_error(&self.name, e))?;
        info!("Released lease {}", self.name);
        Ok(())
    }
}

/// A conflict means another replica wrote the lease first.
fn write_outcome(name: &str, res: kube::Result<Lease>) -> Result<bool> {
    match res {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
        Err(e) => Err(lease_error(name, e)),
    }
}

fn lease_error(name: &str, err: kube::Error) -> Error {
    Error::LeaderElection(format!("lease {}: {}", name, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lease(holder: Option<&str>, renewed_secs_ago: i64, duration: i32) -> Lease {
        Lease {
            metadata: ObjectMeta::default(),
            spec: Some(LeaseSpec {
                holder_identity: holder.map(String::from),
                lease_duration_seconds: Some(duration),
                renew_time: Some(MicroTime(
                    Utc::now() - chrono::Duration::seconds(renewed_secs_ago),
                )),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_missing_lease_is_created() {
        assert_eq!(decide(None, "me", Utc::now()), LeaseDecision::Create);
    }

    #[test]
    fn test_own_lease_is_renewed() {
        let l = lease(Some("me"), 100, 15);
        assert_eq!(decide(Some(&l), "me", Utc::now()), LeaseDecision::Renew);
    }

    #[test]
    fn test_live_lease_of_other_holder_is_respected() {
        let l = lease(Some("other"), 5, 15);
        assert_eq!(
            decide(Some(&l), "me", Utc::now()),
            LeaseDecision::HeldBy("other".into())
        );
    }

    #[test]
    fn test_expired_or_released_lease_is_taken_over() {
        let expired = lease(Some("other"), 30, 15);
        assert_eq!(decide(Some(&expired), "me", Utc::now()), LeaseDecision::Takeover);
        let released = lease(None, 0, 1);
        assert_eq!(decide(Some(&released), "me", Utc::now()), LeaseDecision::Takeover);
    }

    fn api_error(code: u16, reason: &str) -> kube::Error {
        let response: kube::core::ErrorResponse = serde_json::from_value(serde_json::json!({
            "status": "Failure",
            "message": "lease write failed",
            "reason": reason,
            "code": code
        }))
        .unwrap();
        kube::Error::Api(response)
    }

    #[test]
    fn test_conflicting_write_is_not_an_error() {
        let conflict = write_outcome(LEASE_NAME, Err(api_error(409, "Conflict")));
        assert!(!conflict.unwrap());
        assert!(write_outcome(LEASE_NAME, Ok(Lease::default())).unwrap());
    }

    #[test]
    fn test_failed_write_is_a_leader_election_error() {
        let err = write_outcome(LEASE_NAME, Err(api_error(403, "Forbidden"))).unwrap_err();
        assert!(matches!(
            err,
            Error::LeaderElection(ref msg) if msg.starts_with("lease prometheus-source-controller")
        ));
    }
}
