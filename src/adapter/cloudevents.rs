//! CloudEvents 1.0 in HTTP binary content mode: attributes travel as `ce-`
//! headers, the data is the request body.

use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::debug;

pub const SPEC_VERSION: &str = "1.0";

#[derive(Clone, Debug, PartialEq)]
pub struct CloudEvent {
    pub id: String,
    pub source: String,
    pub r#type: String,
    pub subject: Option<String>,
    pub time: DateTime<Utc>,
    pub data: Value,
}

impl CloudEvent {
    pub fn new(r#type: &str, source: &str, data: Value) -> Self {
        CloudEvent {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            r#type: r#type.to_string(),
            subject: None,
            time: Utc::now(),
            data,
        }
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    /// Binary mode headers, values percent-encoded where needed.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("ce-specversion", SPEC_VERSION.to_string()),
            ("ce-id", encode_header_value(&self.id)),
            ("ce-source", encode_header_value(&self.source)),
            ("ce-type", encode_header_value(&self.r#type)),
        ];
        if let Some(ref subject) = self.subject {
            headers.push(("ce-subject", encode_header_value(subject)));
        }
        headers.push((
            "ce-time",
            self.time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        ));
        headers.push(("content-type", "application/json".to_string()));
        headers
    }
}

/// Percent-encode space, `"`, `%` and everything outside printable ASCII.
fn encode_header_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b' ' | b'"' | b'%' => out.push_str(&format!("%{:02X}", byte)),
            0x21..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// POST the event to the sink. Any non-2xx answer is a delivery failure.
pub async fn send(client: &reqwest::Client, sink: &str, event: &CloudEvent) -> Result<()> {
    let mut request = client.post(sink).body(serde_json::to_vec(&event.data)?);
    for (name, value) in event.headers() {
        request = request.header(name, value);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::EventDelivery {
            sink: sink.to_string(),
            status: status.as_u16(),
        });
    }
    debug!("Delivered event {} to {}", event.id, sink);
    Ok(())
}
