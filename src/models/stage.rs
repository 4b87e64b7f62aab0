use serde::{Deserialize, Serialize};

/// Pipeline stage identifier
///
/// The variant order is the gateway's processing order. Which stages are
/// displayed, and in what order, is decided by [`crate::config::StageOrder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageId {
    Received,
    Auth,
    RateLimit,
    Circuit,
    Forward,
    Response,
    Complete,
}

impl StageId {
    /// Every stage the gateway knows about
    pub const ALL: [StageId; 7] = [
        StageId::Received,
        StageId::Auth,
        StageId::RateLimit,
        StageId::Circuit,
        StageId::Forward,
        StageId::Response,
        StageId::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Received => "RECEIVED",
            StageId::Auth => "AUTH",
            StageId::RateLimit => "RATE_LIMIT",
            StageId::Circuit => "CIRCUIT",
            StageId::Forward => "FORWARD",
            StageId::Response => "RESPONSE",
            StageId::Complete => "COMPLETE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RECEIVED" => Some(StageId::Received),
            "AUTH" => Some(StageId::Auth),
            "RATE_LIMIT" => Some(StageId::RateLimit),
            "CIRCUIT" => Some(StageId::Circuit),
            "FORWARD" => Some(StageId::Forward),
            "RESPONSE" => Some(StageId::Response),
            "COMPLETE" => Some(StageId::Complete),
            _ => None,
        }
    }

    /// Human-readable label for display
    pub fn label(&self) -> &'static str {
        match self {
            StageId::Received => "Request Received",
            StageId::Auth => "Authentication",
            StageId::RateLimit => "Rate Limiting",
            StageId::Circuit => "Circuit Breaker",
            StageId::Forward => "Forward to Backend",
            StageId::Response => "Response",
            StageId::Complete => "Complete",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage status
///
/// Ranked `Pending < Running < {Success, Failed, Skipped}`. The three outcomes
/// are terminal: once a stage reaches one, it never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "PENDING",
            StageStatus::Running => "RUNNING",
            StageStatus::Success => "SUCCESS",
            StageStatus::Failed => "FAILED",
            StageStatus::Skipped => "SKIPPED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(StageStatus::Pending),
            "RUNNING" => Some(StageStatus::Running),
            "SUCCESS" => Some(StageStatus::Success),
            "FAILED" => Some(StageStatus::Failed),
            "SKIPPED" => Some(StageStatus::Skipped),
            _ => None,
        }
    }

    /// Progress rank. Outcomes share the top rank.
    pub const fn rank(self) -> u8 {
        match self {
            StageStatus::Pending => 0,
            StageStatus::Running => 1,
            StageStatus::Success | StageStatus::Failed | StageStatus::Skipped => 2,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, StageStatus::Success | StageStatus::Failed | StageStatus::Skipped)
    }

    /// Whether a stage currently in `self` may take `next`.
    ///
    /// Re-delivery of the same terminal status is admitted so late optional
    /// fields (duration, error, details) still land.
    pub fn admits(self, next: StageStatus) -> bool {
        if self.is_terminal() {
            return next == self;
        }
        next.rank() >= self.rank() || !next.is_terminal()
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
