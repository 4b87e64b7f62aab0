//! Channel transports.
//!
//! A transport opens one channel per trace and pushes everything that
//! happens on it into a [`DeliverySink`], tagged with the [`ChannelToken`]
//! the channel was opened under. The consumer side decides whether a
//! delivery is still current; transports never touch trace state.

use std::sync::mpsc;
use thiserror::Error;

pub mod replay;
pub mod ws;

pub use replay::ReplayTransport;
pub use ws::WsTransport;

/// Capability identifying one channel instance.
///
/// Tokens are never reused within a subscription manager, so a delivery
/// carrying an old token is always recognisable as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelToken(u64);

impl ChannelToken {
    pub fn new(generation: u64) -> Self {
        Self(generation)
    }

    pub fn generation(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ChannelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle and payload events of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Handshake completed
    Opened,
    /// One raw payload (a JSON object)
    Message(String),
    /// Transport failure; a `Closed` follows
    Failed(String),
    /// Channel closed by the remote end or the transport
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub token: ChannelToken,
    pub event: ChannelEvent,
}

impl Delivery {
    pub fn new(token: ChannelToken, event: ChannelEvent) -> Self {
        Self { token, event }
    }
}

pub type DeliverySink = mpsc::Sender<Delivery>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid channel URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Unsupported channel scheme '{0}' (only ws:// is supported)")]
    UnsupportedScheme(String),
    #[error("Failed to connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("WebSocket handshake with {url} failed: {reason}")]
    Handshake { url: String, reason: String },
    #[error("Failed to read recording {path}")]
    Recording {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Handle to an open channel, owned by the subscription manager
pub trait ChannelHandle {
    /// Tear the channel down. Deliveries may still arrive afterwards.
    fn close(&mut self);
}

/// Something that can open a trace channel
pub trait Transport {
    type Handle: ChannelHandle;

    fn open(
        &mut self,
        trace_id: &str,
        token: ChannelToken,
        sink: DeliverySink,
    ) -> Result<Self::Handle, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_token_ordering() {
        let a = ChannelToken::new(1);
        let b = ChannelToken::new(2);
        assert!(a < b);
        assert_ne!(a, b);
        assert_eq!(a.generation(), 1);
        assert_eq!(b.to_string(), "#2");
    }
}
