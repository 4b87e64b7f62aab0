// Configuration: ~/.tracewatch/rc with key=value lines

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::models::StageId;
use crate::utils::fuzzy::closest_match;
use crate::utils::parse_duration;

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8080";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Display order of stages when no configuration overrides it.
/// RESPONSE is part of the vocabulary but the gateway does not report it.
pub const DEFAULT_STAGE_ORDER: [StageId; 6] = [
    StageId::Received,
    StageId::Auth,
    StageId::RateLimit,
    StageId::Circuit,
    StageId::Forward,
    StageId::Complete,
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown stage '{stage}' in stage list{}", did_you_mean(.suggestion))]
    UnknownStage {
        stage: String,
        suggestion: Option<&'static str>,
    },
    #[error("Stage '{0}' listed more than once")]
    DuplicateStage(String),
    #[error("Stage list cannot be empty")]
    EmptyStageList,
    #[error("Invalid idle timeout '{value}': {reason}")]
    InvalidTimeout { value: String, reason: String },
    #[error("Invalid gateway URL '{0}': expected http:// or ws://")]
    InvalidGatewayUrl(String),
    #[error("Gateway URL '{0}' needs TLS, which tracewatch does not support; use http:// or ws://")]
    TlsUnsupported(String),
    #[error("Failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn did_you_mean(suggestion: &Option<&'static str>) -> String {
    match suggestion {
        Some(name) => format!("\n  Did you mean '{}'?", name),
        None => String::new(),
    }
}

fn suggest_stage(token: &str) -> Option<&'static str> {
    let names: Vec<&'static str> = StageId::ALL.iter().map(|s| s.as_str()).collect();
    closest_match(token, &names, 2)
}

/// Ordered, duplicate-free list of displayed stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOrder(Vec<StageId>);

impl StageOrder {
    /// Parse a comma-separated list such as `RECEIVED,AUTH,COMPLETE`
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let mut stages = Vec::new();
        let mut seen = HashSet::new();
        for token in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let stage = StageId::from_str(&token.to_ascii_uppercase()).ok_or_else(|| {
                ConfigError::UnknownStage {
                    stage: token.to_string(),
                    suggestion: suggest_stage(token),
                }
            })?;
            if !seen.insert(stage) {
                return Err(ConfigError::DuplicateStage(token.to_string()));
            }
            stages.push(stage);
        }
        if stages.is_empty() {
            return Err(ConfigError::EmptyStageList);
        }
        Ok(Self(stages))
    }

    pub fn as_slice(&self) -> &[StageId] {
        &self.0
    }
}

impl Default for StageOrder {
    fn default() -> Self {
        Self(DEFAULT_STAGE_ORDER.to_vec())
    }
}

/// Resolved settings for a watch session
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub gateway_url: String,
    pub stages: StageOrder,
    pub idle_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            stages: StageOrder::default(),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Get the configuration file path
    ///
    /// HOME wins over the platform lookup so tests can redirect it.
    pub fn config_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::home_dir)
            .map(|home| home.join(".tracewatch").join("rc"))
    }

    /// Load configuration from the default path, or defaults if absent
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse rc file content. Unknown keys are ignored.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "gateway.url" => config.set_gateway_url(value)?,
                "stages" => config.stages = StageOrder::parse(value)?,
                "watch.idle_timeout" => config.set_idle_timeout(value)?,
                _ => {}
            }
        }
        Ok(config)
    }

    pub fn set_gateway_url(&mut self, url: &str) -> Result<(), ConfigError> {
        let url = url.trim().trim_end_matches('/');
        if ["https://", "wss://"].iter().any(|scheme| url.starts_with(scheme)) {
            return Err(ConfigError::TlsUnsupported(url.to_string()));
        }
        if !["http://", "ws://"].iter().any(|scheme| url.starts_with(scheme)) {
            return Err(ConfigError::InvalidGatewayUrl(url.to_string()));
        }
        self.gateway_url = url.to_string();
        Ok(())
    }

    pub fn set_idle_timeout(&mut self, expr: &str) -> Result<(), ConfigError> {
        let secs = parse_duration(expr).map_err(|e| ConfigError::InvalidTimeout {
            value: expr.to_string(),
            reason: e.to_string(),
        })?;
        self.idle_timeout = Duration::from_secs(secs as u64);
        Ok(())
    }

    /// WebSocket URL of the trace channel for `trace_id`
    pub fn channel_url(&self, trace_id: &str) -> String {
        let base = if let Some(rest) = self.gateway_url.strip_prefix("http") {
            format!("ws{}", rest)
        } else {
            self.gateway_url.clone()
        };
        format!("{}/ws/trace/{}", base, trace_id)
    }
}
