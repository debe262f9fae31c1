use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing_subscriber::filter::LevelFilter;

const ZAP_LOGGER_CONFIG_KEY: &str = "zap-logger-config";
const COMPONENT_LEVEL_PREFIX: &str = "loglevel.";

/// Typed view of the `config-logging` ConfigMap.
#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: LevelFilter,
    pub json: bool,
    pub component_levels: BTreeMap<String, LevelFilter>,
}

/// The fields of the zap encoder config that matter to us.
#[derive(Deserialize)]
struct ZapConfig {
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LevelFilter::INFO,
            json: true,
            component_levels: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    pub fn from_data(data: &BTreeMap<String, String>) -> Result<Self> {
        let mut config = LoggingConfig::default();

        if let Some(raw) = data.get(ZAP_LOGGER_CONFIG_KEY).filter(|s| !s.trim().is_empty()) {
            let zap: ZapConfig = serde_json::from_str(raw).map_err(|e| {
                Error::ConfigError(format!("invalid {}: {}", ZAP_LOGGER_CONFIG_KEY, e))
            })?;
            if let Some(level) = zap.level {
                config.level = parse_level(&level)?;
            }
            if let Some(encoding) = zap.encoding {
                config.json = match encoding.as_str() {
                    "json" => true,
                    "console" => false,
                    other => {
                        return Err(Error::ConfigError(format!(
                            "unsupported log encoding {:?}",
                            other
                        )))
                    }
                };
            }
        }

        for (key, value) in data {
            if let Some(component) = key.strip_prefix(COMPONENT_LEVEL_PREFIX) {
                if value.trim().is_empty() {
                    continue;
                }
                config
                    .component_levels
                    .insert(component.to_string(), parse_level(value)?);
            }
        }

        Ok(config)
    }

    /// Parse the serialized ConfigMap data handed to the adapters.
    pub fn from_json(raw: &str) -> Result<Self> {
        let data: BTreeMap<String, String> = serde_json::from_str(raw)?;
        Self::from_data(&data)
    }

    pub fn level_for(&self, component: &str) -> LevelFilter {
        self.component_levels
            .get(component)
            .copied()
            .unwrap_or(self.level)
    }
}

/// Map zap level names onto tracing levels.
fn parse_level(level: &str) -> Result<LevelFilter> {
    match level.trim().to_ascii_lowercase().as_str() {
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" | "dpanic" | "panic" | "fatal" => Ok(LevelFilter::ERROR),
        other => Err(Error::ConfigError(format!("unknown log level {:?}", other))),
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
    fn test_defaults_when_empty() {
        assert_eq!(
            LoggingConfig::from_data(&BTreeMap::new()).unwrap(),
            LoggingConfig::default()
        );
    }

    #[test]
    fn test_zap_config_and_component_levels() {
        let config = LoggingConfig::from_data(&data(&[
            (
                "zap-logger-config",
                r#"{"level": "warn", "development": false, "encoding": "console",
                    "encoderConfig": {"timeKey": "ts", "messageKey": "msg"}}"#,
            ),
            ("loglevel.controller", "debug"),
            ("loglevel.webhook", ""),
        ]))
        .unwrap();
        assert_eq!(config.level, LevelFilter::WARN);
        assert!(!config.json);
        assert_eq!(config.level_for("controller"), LevelFilter::DEBUG);
        assert_eq!(config.level_for("webhook"), LevelFilter::WARN);
    }

    #[test]
    fn test_fatal_maps_to_error() {
        let config = LoggingConfig::from_data(&data(&[("loglevel.adapter", "fatal")])).unwrap();
        assert_eq!(config.level_for("adapter"), LevelFilter::ERROR);
    }

    #[test]
    fn test_invalid_values() {
        assert!(LoggingConfig::from_data(&data(&[("loglevel.controller", "loud")])).is_err());
        assert!(LoggingConfig::from_data(&data(&[("zap-logger-config", "{")])).is_err());
        assert!(LoggingConfig::from_data(&data(&[(
            "zap-logger-config",
            r#"{"encoding": "xml"}"#
        )]))
        .is_err());
    }

    #[test]
    fn test_from_json() {
        let config = LoggingConfig::from_json(r#"{"loglevel.adapter": "debug"}"#).unwrap();
        assert_eq!(config.level_for("adapter"), LevelFilter::DEBUG);
    }
}
