use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::stage::{StageId, StageStatus};

/// State of the channel feeding a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        }
    }
}

/// Last known state of one pipeline stage
///
/// Optional fields keep their last known value: a later event that omits them
/// never clears them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    pub stage: StageId,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_us: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StageState {
    pub fn pending(stage: StageId) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            duration_us: None,
            error: None,
            details: None,
            updated_at: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.stage.label()
    }
}

/// Canonical view of one monitored trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceState {
    pub trace_id: String,
    pub stages: Vec<StageState>,
    pub connection: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_error: Option<String>,
}

impl TraceState {
    /// Seed a trace with every stage pending, in the given order
    pub fn seeded(trace_id: &str, order: &[StageId]) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            stages: order.iter().copied().map(StageState::pending).collect(),
            connection: ConnectionStatus::Connecting,
            trace_error: None,
        }
    }

    pub fn stage(&self, stage: StageId) -> Option<&StageState> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// True once every displayed stage has reached an outcome
    pub fn is_settled(&self) -> bool {
        !self.stages.is_empty() && self.stages.iter().all(|s| s.status.is_terminal())
    }

    /// True once the gateway has nothing more to report: every stage settled,
    /// a stage failed (the pipeline stops there), or COMPLETE resolved
    pub fn is_finished(&self) -> bool {
        self.is_settled()
            || self.failed_stage().is_some()
            || self
                .stage(StageId::Complete)
                .map_or(false, |s| s.status.is_terminal())
    }

    /// First stage that reported FAILED, if any
    pub fn failed_stage(&self) -> Option<&StageState> {
        self.stages.iter().find(|s| s.status == StageStatus::Failed)
    }

    /// Sum of reported stage durations in microseconds, saturating at `u64::MAX`
    pub fn total_duration_us(&self) -> u64 {
        self.stages
            .iter()
            .filter_map(|s| s.duration_us)
            .fold(0u64, |acc, d| acc.saturating_add(d))
    }
}
