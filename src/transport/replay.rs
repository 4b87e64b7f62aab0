// Replay of a recorded channel: one JSON payload per line

use std::path::Path;

use super::{ChannelEvent, ChannelHandle, ChannelToken, Delivery, DeliverySink, Transport, TransportError};

/// Plays back recorded payloads as if they arrived on a live channel:
/// `Opened`, every non-blank line in order, then `Closed`.
pub struct ReplayTransport {
    payloads: Vec<String>,
}

pub struct ReplayHandle;

impl ChannelHandle for ReplayHandle {
    fn close(&mut self) {}
}

impl ReplayTransport {
    pub fn new(payloads: Vec<String>) -> Self {
        Self { payloads }
    }

    pub fn from_text(text: &str) -> Self {
        let payloads = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(payloads)
    }

    pub fn from_file(path: &Path) -> Result<Self, TransportError> {
        let text = std::fs::read_to_string(path).map_err(|source| TransportError::Recording {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_text(&text))
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

impl Transport for ReplayTransport {
    type Handle = ReplayHandle;

    fn open(
        &mut self,
        _trace_id: &str,
        token: ChannelToken,
        sink: DeliverySink,
    ) -> Result<Self::Handle, TransportError> {
        let events = std::iter::once(ChannelEvent::Opened)
            .chain(self.payloads.iter().cloned().map(ChannelEvent::Message))
            .chain(std::iter::once(ChannelEvent::Closed));
        for event in events {
            // Receiver gone means nobody is watching any more
            if sink.send(Delivery::new(token, event)).is_err() {
                break;
            }
        }
        Ok(ReplayHandle)
    }
}
