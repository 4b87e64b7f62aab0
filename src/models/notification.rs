use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use super::stage::{StageId, StageStatus};

/// Stage event emitted by the gateway for one step of a traced request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StageEvent {
    pub trace_id: String,
    #[serde(rename = "step")]
    pub stage: StageId,
    pub status: StageStatus,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_us: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<BTreeMap<String, Value>>,
}

/// Timestamps are informational only, so one that cannot be read is dropped
/// instead of failing the whole event
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(|value| {
        let parsed = value.as_str().and_then(parse_timestamp);
        if parsed.is_none() {
            debug!("ignoring unreadable timestamp {}", value);
        }
        parsed
    }))
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    // Zone-less forms are taken as UTC
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl StageEvent {
    pub fn new(trace_id: &str, stage: StageId, status: StageStatus) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            stage,
            status,
            timestamp: None,
            duration_us: None,
            error: None,
            details: None,
        }
    }

    pub fn with_duration(mut self, duration_us: u64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value);
        self
    }
}

/// Channel-level terminal signal kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Timeout,
    Error,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Timeout => "timeout",
            SignalKind::Error => "error",
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            SignalKind::Timeout => "connection timed out",
            SignalKind::Error => "channel error",
        }
    }
}

/// One message received on a trace channel
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Subscribed { trace_id: String, channel: String },
    Stage(StageEvent),
    Terminal { kind: SignalKind, message: String },
}

/// A payload that could not be classified as a [`Notification`]
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("unknown message type '{0}'")]
    UnknownType(String),
    #[error("malformed '{kind}' message: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct SubscribedWire {
    trace_id: String,
    #[serde(default)]
    channel: String,
}

#[derive(Deserialize)]
struct TerminalWire {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl Notification {
    /// Classify a raw channel payload
    ///
    /// Messages carrying a `type` field are acknowledgments or terminal
    /// signals. Untyped messages with a `step` are stage events. An untyped
    /// message with only an `error` is the gateway's subscribe-failure reply.
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(payload).map_err(ProtocolError::InvalidJson)?;
        let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;
        let msg_type = obj.get("type").and_then(Value::as_str).map(str::to_string);
        let has_step = obj.contains_key("step");
        let has_error = obj.contains_key("error");

        let kind = match msg_type.as_deref() {
            Some("subscribed") => {
                let wire: SubscribedWire = serde_json::from_value(value)
                    .map_err(|source| ProtocolError::Malformed { kind: "subscribed", source })?;
                return Ok(Notification::Subscribed {
                    trace_id: wire.trace_id,
                    channel: wire.channel,
                });
            }
            Some("timeout") => SignalKind::Timeout,
            Some("error") => SignalKind::Error,
            Some(other) => return Err(ProtocolError::UnknownType(other.to_string())),
            None if has_step => {
                let event: StageEvent = serde_json::from_value(value)
                    .map_err(|source| ProtocolError::Malformed { kind: "stage", source })?;
                return Ok(Notification::Stage(event));
            }
            None if has_error => SignalKind::Error,
            None => return Err(ProtocolError::UnknownType("<none>".to_string())),
        };

        let wire: TerminalWire = serde_json::from_value(value)
            .map_err(|source| ProtocolError::Malformed { kind: kind.as_str(), source })?;
        let message = wire
            .message
            .or(wire.error)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| kind.default_message().to_string());
        Ok(Notification::Terminal { kind, message })
    }
}
