use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid schedule {schedule:?}: {reason}")]
    InvalidSchedule { schedule: String, reason: String },

    #[error("Invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("Sink resolution failed: {0}")]
    SinkResolution(String),

    #[error("Prometheus query failed: {error_type}: {error}")]
    PrometheusQuery { error_type: String, error: String },

    #[error("CloudEvent delivery to {sink} failed with status {status}")]
    EventDelivery { sink: String, status: u16 },

    #[error("Resource creation failed: {resource_type} - {reason}")]
    ResourceCreationError {
        resource_type: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Admission review error: {0}")]
    AdmissionError(String),

    #[error("Leader election error: {0}")]
    LeaderElection(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),
}

impl Error {
    /// Determine if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_)
                | Error::SinkResolution(_)
                | Error::HttpError(_)
                | Error::ResourceCreationError { .. }
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::ConfigError(err.to_string())
    }
}
