//! Subscription manager: owns the single active trace channel.
//!
//! Every channel is opened under a fresh [`ChannelToken`]. Deliveries are
//! only routed into the [`TraceStore`] while their token is the current one,
//! so anything still in flight from a superseded or stopped channel is
//! dropped here before the store's own trace id check ever sees it.

use log::{debug, info, warn};
use thiserror::Error;

use crate::models::{ConnectionStatus, Notification, SignalKind, TraceState};
use crate::store::{MergeOutcome, TraceStore};
use crate::transport::{
    ChannelEvent, ChannelHandle, ChannelToken, Delivery, DeliverySink, Transport, TransportError,
};
use crate::utils::validate_trace_id;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("{0}")]
    InvalidTraceId(String),
    #[error("Could not open trace channel: {0}")]
    Transport(#[from] TransportError),
}

/// What a single delivery did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingress {
    /// Delivery belonged to a channel that is no longer current
    Stale,
    /// Payload was malformed or addressed to another trace
    Dropped,
    /// Channel handshake completed
    Connected,
    /// The source confirmed the subscription
    Acknowledged,
    /// A stage event went through the store
    Merged(MergeOutcome),
    /// The source sent a timeout or error signal
    TraceError(SignalKind),
    /// The channel failed or closed; no further deliveries will come
    Disconnected,
}

impl Ingress {
    /// Whether the published snapshot may have changed
    pub fn changed_state(&self) -> bool {
        match self {
            Ingress::Stale | Ingress::Dropped | Ingress::Acknowledged => false,
            Ingress::Merged(outcome) => outcome.is_applied(),
            Ingress::Connected | Ingress::TraceError(_) | Ingress::Disconnected => true,
        }
    }
}

/// Delivery counters, kept for diagnostics only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub channels_opened: u64,
    pub superseded: u64,
    pub stale_deliveries: u64,
    pub malformed: u64,
    pub cross_talk: u64,
}

struct ActiveChannel<H> {
    token: ChannelToken,
    trace_id: String,
    handle: Option<H>,
}

pub struct SubscriptionManager<T: Transport> {
    transport: T,
    sink: DeliverySink,
    store: TraceStore,
    active: Option<ActiveChannel<T::Handle>>,
    generation: u64,
    stats: ChannelStats,
}

impl<T: Transport> SubscriptionManager<T> {
    /// `sink` is the sending half of the queue the caller drains into
    /// [`SubscriptionManager::handle`]
    pub fn new(transport: T, store: TraceStore, sink: DeliverySink) -> Self {
        Self {
            transport,
            sink,
            store,
            active: None,
            generation: 0,
            stats: ChannelStats::default(),
        }
    }

    /// Start monitoring `trace_id`, superseding any current channel
    ///
    /// The store is reset to the seeded state before the channel is opened.
    /// If opening fails the seeded state stays visible, marked disconnected
    /// with the failure as trace error.
    pub fn start_monitoring(&mut self, trace_id: &str) -> Result<ChannelToken, WatchError> {
        validate_trace_id(trace_id).map_err(WatchError::InvalidTraceId)?;

        if let Some(previous) = self.release_channel() {
            info!("superseding channel {} for trace {}", previous.token, previous.trace_id);
            self.stats.superseded += 1;
        }

        self.generation += 1;
        let token = ChannelToken::new(self.generation);
        self.store.reset(trace_id);
        self.active = Some(ActiveChannel {
            token,
            trace_id: trace_id.to_string(),
            handle: None,
        });

        match self.transport.open(trace_id, token, self.sink.clone()) {
            Ok(handle) => {
                if let Some(active) = self.active.as_mut() {
                    active.handle = Some(handle);
                }
                self.stats.channels_opened += 1;
                Ok(token)
            }
            Err(e) => {
                warn!("trace {}: channel {} failed to open: {}", trace_id, token, e);
                self.active = None;
                self.store.set_connection(ConnectionStatus::Disconnected);
                self.store.set_trace_error(&e.to_string());
                Err(WatchError::Transport(e))
            }
        }
    }

    /// Stop monitoring and clear the displayed trace
    pub fn stop_monitoring(&mut self) {
        if let Some(previous) = self.release_channel() {
            info!("stopped monitoring trace {}", previous.trace_id);
        }
        self.store.clear();
    }

    /// Give up on the current channel locally, e.g. after prolonged silence.
    /// Stage states stay visible; the reason becomes the trace error.
    pub fn abandon(&mut self, reason: &str) {
        if let Some(previous) = self.release_channel() {
            warn!("abandoning channel {} for trace {}: {}", previous.token, previous.trace_id, reason);
            self.store.set_trace_error(reason);
            self.store.set_connection(ConnectionStatus::Disconnected);
        }
    }

    /// Single ingress for everything a channel produces
    pub fn handle(&mut self, delivery: Delivery) -> Ingress {
        let trace_id = match &self.active {
            Some(active) if active.token == delivery.token => active.trace_id.clone(),
            _ => {
                debug!("dropping {:?} from stale channel {}", delivery.event, delivery.token);
                self.stats.stale_deliveries += 1;
                return Ingress::Stale;
            }
        };

        match delivery.event {
            ChannelEvent::Opened => {
                info!("channel {} connected for trace {}", delivery.token, trace_id);
                self.store.set_connection(ConnectionStatus::Connected);
                Ingress::Connected
            }
            ChannelEvent::Message(payload) => self.route(&trace_id, &payload),
            ChannelEvent::Failed(message) => {
                warn!("trace {}: {}", trace_id, message);
                self.store.set_trace_error(&message);
                self.store.set_connection(ConnectionStatus::Disconnected);
                Ingress::Disconnected
            }
            ChannelEvent::Closed => {
                info!("channel {} closed for trace {}", delivery.token, trace_id);
                // The transport is already gone; keep stage data for inspection
                self.active = None;
                self.store.set_connection(ConnectionStatus::Disconnected);
                Ingress::Disconnected
            }
        }
    }

    fn route(&mut self, trace_id: &str, payload: &str) -> Ingress {
        let notification = match Notification::parse(payload) {
            Ok(n) => n,
            Err(e) => {
                debug!("trace {}: dropping payload: {}", trace_id, e);
                self.stats.malformed += 1;
                return Ingress::Dropped;
            }
        };

        match notification {
            Notification::Subscribed { trace_id: confirmed, channel } => {
                if confirmed != trace_id {
                    debug!("ignoring subscription ack for {} on channel of {}", confirmed, trace_id);
                    self.stats.cross_talk += 1;
                    return Ingress::Dropped;
                }
                debug!("subscribed to trace {} ({})", confirmed, channel);
                Ingress::Acknowledged
            }
            Notification::Stage(event) => {
                if event.trace_id != trace_id {
                    debug!("dropping {} event tagged {} on channel of {}", event.stage, event.trace_id, trace_id);
                    self.stats.cross_talk += 1;
                    return Ingress::Dropped;
                }
                Ingress::Merged(self.store.merge(trace_id, &event))
            }
            Notification::Terminal { kind, message } => {
                warn!("trace {}: {} signal: {}", trace_id, kind.as_str(), message);
                self.store.set_trace_error(&message);
                Ingress::TraceError(kind)
            }
        }
    }

    fn release_channel(&mut self) -> Option<ActiveChannel<T::Handle>> {
        let mut previous = self.active.take()?;
        if let Some(handle) = previous.handle.as_mut() {
            handle.close();
        }
        Some(previous)
    }

    pub fn current_snapshot(&self) -> Option<&TraceState> {
        self.store.snapshot()
    }

    /// Token of the channel currently accepted, if any
    pub fn current_token(&self) -> Option<ChannelToken> {
        self.active.as_ref().map(|a| a.token)
    }

    pub fn store(&self) -> &TraceStore {
        &self.store
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }
}
