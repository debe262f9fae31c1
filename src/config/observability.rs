use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const METRICS_BACKEND_KEY: &str = "metrics.backend-destination";
const REQUEST_METRICS_BACKEND_KEY: &str = "metrics.request-metrics-backend-destination";
const PROMETHEUS_PORT_KEY: &str = "metrics.prometheus-port";
const REQUEST_LOG_TEMPLATE_KEY: &str = "logging.request-log-template";

pub const DEFAULT_PROMETHEUS_PORT: u16 = 9090;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricsBackend {
    Prometheus,
    /// Metrics are collected but not exported
    None,
}

/// Typed view of the `config-observability` ConfigMap.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservabilityConfig {
    pub metrics_backend: MetricsBackend,
    pub request_metrics_backend: MetricsBackend,
    pub prometheus_port: u16,
    /// Non-empty when every webhook request should be logged
    pub request_log_template: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        ObservabilityConfig {
            metrics_backend: MetricsBackend::Prometheus,
            request_metrics_backend: MetricsBackend::Prometheus,
            prometheus_port: DEFAULT_PROMETHEUS_PORT,
            request_log_template: None,
        }
    }
}

impl ObservabilityConfig {
    pub fn from_data(data: &BTreeMap<String, String>) -> Result<Self> {
        let mut config = ObservabilityConfig::default();

        if let Some(backend) = non_empty(data, METRICS_BACKEND_KEY) {
            config.metrics_backend = parse_backend(backend)?;
        }
        // request metrics follow the general backend unless set explicitly
        config.request_metrics_backend = match non_empty(data, REQUEST_METRICS_BACKEND_KEY) {
            Some(backend) => parse_backend(backend)?,
            None => config.metrics_backend,
        };
        if let Some(port) = non_empty(data, PROMETHEUS_PORT_KEY) {
            config.prometheus_port = port.parse().map_err(|_| {
                Error::ConfigError(format!("invalid {}: {:?}", PROMETHEUS_PORT_KEY, port))
            })?;
        }
        config.request_log_template = non_empty(data, REQUEST_LOG_TEMPLATE_KEY).map(String::from);

        Ok(config)
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_backend == MetricsBackend::Prometheus
    }
}

/// Metrics settings handed to a receive adapter through `K_METRICS_CONFIG`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsOptions {
    pub domain: String,
    pub component: String,
    #[serde(default)]
    pub config_map: BTreeMap<String, String>,
}

impl MetricsOptions {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn observability(&self) -> Result<ObservabilityConfig> {
        ObservabilityConfig::from_data(&self.config_map)
    }
}

fn non_empty<'a>(data: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    data.get(key).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn parse_backend(value: &str) -> Result<MetricsBackend> {
    match value.to_ascii_lowercase().as_str() {
        "prometheus" => Ok(MetricsBackend::Prometheus),
        "none" => Ok(MetricsBackend::None),
        other => Err(Error::ConfigError(format!(
            "unsupported metrics backend {:?}",
            other
        ))),
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
    fn test_defaults() {
        let config = ObservabilityConfig::from_data(&BTreeMap::new()).unwrap();
        assert!(config.metrics_enabled());
        assert_eq!(config.prometheus_port, 9090);
        assert!(config.request_log_template.is_none());
    }

    #[test]
    fn test_request_backend_follows_general_backend() {
        let config =
            ObservabilityConfig::from_data(&data(&[("metrics.backend-destination", "none")]))
                .unwrap();
        assert!(!config.metrics_enabled());
        assert_eq!(config.request_metrics_backend, MetricsBackend::None);
    }

    #[test]
    fn test_explicit_values() {
        let config = ObservabilityConfig::from_data(&data(&[
            ("metrics.backend-destination", "prometheus"),
            ("metrics.request-metrics-backend-destination", "none"),
            ("metrics.prometheus-port", "9091"),
            ("logging.request-log-template", "{{.Request.Method}} {{.Request.URL}}"),
        ]))
        .unwrap();
        assert_eq!(config.request_metrics_backend, MetricsBackend::None);
        assert_eq!(config.prometheus_port, 9091);
        assert!(config.request_log_template.is_some());
    }

    #[test]
    fn test_invalid_values() {
        assert!(
            ObservabilityConfig::from_data(&data(&[("metrics.backend-destination", "statsd")]))
                .is_err()
        );
        assert!(
            ObservabilityConfig::from_data(&data(&[("metrics.prometheus-port", "http")]))
                .is_err()
        );
    }

    #[test]
    fn test_metrics_options_carry_config_map() {
        let options = MetricsOptions {
            domain: "knative.dev/sources".into(),
            component: "prometheussource".into(),
            config_map: data(&[("metrics.prometheus-port", "9095")]),
        };
        let parsed = MetricsOptions::from_json(&options.to_json().unwrap()).unwrap();
        assert_eq!(parsed.observability().unwrap().prometheus_port, 9095);
    }
}
