use crate::{
    duration,
    error::{Error, Result},
};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Certificate, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

/// File inside the CA ConfigMap mount holding the server's CA bundle
pub const CA_CERT_FILE: &str = "service-ca.crt";

/// Envelope of every Prometheus HTTP API response.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

pub struct PrometheusClient {
    http: reqwest::Client,
    base_url: String,
    token_file: Option<PathBuf>,
}

impl PrometheusClient {
    /// `ca_cert_config_map` names the ConfigMap mounted at `/etc/<name>/`.
    pub fn new(
        server_url: &str,
        auth_token_file: Option<&str>,
        ca_cert_config_map: Option<&str>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(config_map) = ca_cert_config_map {
            let path = format!("/etc/{}/{}", config_map, CA_CERT_FILE);
            let pem = std::fs::read(&path)?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }

        Ok(PrometheusClient {
            http: builder.build()?,
            base_url: server_url.trim_end_matches('/').to_string(),
            token_file: auth_token_file.map(PathBuf::from),
        })
    }

    /// Instant query evaluated at `at`.
    pub async fn query(&self, promql: &str, at: DateTime<Utc>) -> Result<Value> {
        let params = [("query", promql.to_string()), ("time", timestamp(at))];
        self.get("/api/v1/query", &params).await
    }

    /// Range query over `[start, end]` with resolution `step`.
    pub async fn query_range(
        &self,
        promql: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: chrono::Duration,
    ) -> Result<Value> {
        let params = [
            ("query", promql.to_string()),
            ("start", timestamp(start)),
            ("end", timestamp(end)),
            ("step", duration::to_seconds_param(step)),
        ];
        self.get("/api/v1/query_range", &params).await
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let mut request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(params);

        // the token may be rotated, read it on every request
        if let Some(ref token_file) = self.token_file {
            let token = tokio::fs::read_to_string(token_file).await?;
            request = request.bearer_auth(token.trim());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!("Prometheus answered {} with {} bytes", status, body.len());
        decode(status, &body)
    }
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Extract `data` from an API response, turning `status: error` into an error.
fn decode(status: StatusCode, body: &[u8]) -> Result<Value> {
    let response: ApiResponse = match serde_json::from_slice(body) {
        Ok(response) => response,
        Err(_) if !status.is_success() => {
            return Err(Error::PrometheusQuery {
                error_type: "http".to_string(),
                error: status.to_string(),
            })
        }
        Err(e) => return Err(Error::from(e)),
    };

    for warning in &response.warnings {
        debug!("Prometheus warning: {}", warning);
    }

    match response.status.as_str() {
        "success" => Ok(response.data.unwrap_or(Value::Null)),
        "error" => Err(Error::PrometheusQuery {
            error_type: response.error_type.unwrap_or_default(),
            error: response.error.unwrap_or_default(),
        }),
        other => Err(Error::PrometheusQuery {
            error_type: "bad_response".to_string(),
            error: format!("unexpected status {:?}", other),
        }),
    }
}
