use super::{object_meta, ReleaseOptions};
use crate::config::{
    DEFAULT_LEADER_ELECTION_CONFIG_NAME, DEFAULT_LOGGING_CONFIG_NAME,
    DEFAULT_OBSERVABILITY_CONFIG_NAME,
};
use k8s_openapi::api::core::v1::ConfigMap;
use std::collections::BTreeMap;

const ZAP_LOGGER_CONFIG: &str = r#"{
  "level": "info",
  "development": false,
  "outputPaths": ["stdout"],
  "errorOutputPaths": ["stderr"],
  "encoding": "json",
  "encoderConfig": {
    "timeKey": "ts",
    "levelKey": "level",
    "nameKey": "logger",
    "callerKey": "caller",
    "messageKey": "msg",
    "stacktraceKey": "stacktrace",
    "lineEnding": "",
    "levelEncoder": "",
    "timeEncoder": "iso8601",
    "durationEncoder": "",
    "callerEncoder": ""
  }
}"#;

pub fn config_maps(options: &ReleaseOptions) -> Vec<ConfigMap> {
    vec![
        config_map(
            options,
            DEFAULT_LEADER_ELECTION_CONFIG_NAME,
            &[
                ("resourceLock", "leases"),
                ("leaseDuration", "15s"),
                ("renewDeadline", "10s"),
                ("retryPeriod", "2s"),
            ],
        ),
        config_map(
            options,
            DEFAULT_LOGGING_CONFIG_NAME,
            &[
                ("zap-logger-config", ZAP_LOGGER_CONFIG),
                ("loglevel.controller", "info"),
                ("loglevel.webhook", "info"),
                ("loglevel.adapter", "info"),
            ],
        ),
        config_map(
            options,
            DEFAULT_OBSERVABILITY_CONFIG_NAME,
            &[
                ("metrics.backend-destination", "prometheus"),
                ("metrics.request-metrics-backend-destination", "prometheus"),
                ("logging.request-log-template", ""),
                ("logging.enable-var-log-collection", "false"),
            ],
        ),
    ]
}

fn config_map(options: &ReleaseOptions, name: &str, data: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: object_meta(name, Some(&options.namespace)),
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..Default::default()
    }
}
