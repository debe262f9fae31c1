use crate::{
    duration,
    error::{Error, Result},
};
use std::{collections::BTreeMap, time::Duration};

/// Typed view of the `config-leader-election-prometheus` ConfigMap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderElectionConfig {
    pub resource_lock: String,
    pub lease_duration: Duration,
    pub renew_deadline: Duration,
    pub retry_period: Duration,
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        LeaderElectionConfig {
            resource_lock: "leases".to_string(),
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
        }
    }
}

impl LeaderElectionConfig {
    pub fn from_data(data: &BTreeMap<String, String>) -> Result<Self> {
        let mut config = LeaderElectionConfig::default();

        if let Some(lock) = data.get("resourceLock").filter(|s| !s.trim().is_empty()) {
            if lock.trim() != "leases" {
                return Err(Error::ConfigError(format!(
                    "resourceLock {:?} is not supported, only \"leases\"",
                    lock
                )));
            }
        }
        if let Some(d) = get_duration(data, "leaseDuration")? {
            config.lease_duration = d;
        }
        if let Some(d) = get_duration(data, "renewDeadline")? {
            config.renew_deadline = d;
        }
        if let Some(d) = get_duration(data, "retryPeriod")? {
            config.retry_period = d;
        }

        if config.renew_deadline >= config.lease_duration {
            return Err(Error::ConfigError(
                "renewDeadline must be shorter than leaseDuration".to_string(),
            ));
        }
        if config.retry_period.is_zero() {
            return Err(Error::ConfigError("retryPeriod must be positive".to_string()));
        }

        Ok(config)
    }
}

fn get_duration(data: &BTreeMap<String, String>, key: &str) -> Result<Option<Duration>> {
    match data.get(key).filter(|s| !s.trim().is_empty()) {
        None => Ok(None),
        Some(raw) => {
            let d = duration::parse(raw)?
                .to_std()
                .map_err(|_| Error::InvalidDuration(raw.clone()))?;
            Ok(Some(d))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parses_config_map() {
        let config = LeaderElectionConfig::from_data(&data(&[
            ("resourceLock", "leases"),
            ("leaseDuration", "30s"),
            ("renewDeadline", "20s"),
            ("retryPeriod", "4s"),
        ]))
        .unwrap();
        assert_eq!(config.lease_duration, Duration::from_secs(30));
        assert_eq!(config.renew_deadline, Duration::from_secs(20));
        assert_eq!(config.retry_period, Duration::from_secs(4));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(
            LeaderElectionConfig::from_data(&BTreeMap::new()).unwrap(),
            LeaderElectionConfig::default()
        );
    }

    #[test]
    fn test_rejects_inconsistent_values() {
        assert!(LeaderElectionConfig::from_data(&data(&[("resourceLock", "configmaps")])).is_err());
        assert!(LeaderElectionConfig::from_data(&data(&[("renewDeadline", "15s")])).is_err());
        assert!(LeaderElectionConfig::from_data(&data(&[("retryPeriod", "0s")])).is_err());
        assert!(LeaderElectionConfig::from_data(&data(&[("leaseDuration", "soon")])).is_err());
    }
}
