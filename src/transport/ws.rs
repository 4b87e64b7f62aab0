// WebSocket channel to the gateway's /ws/trace/{traceId} endpoint

use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info};
use tungstenite::http::Uri;
use tungstenite::Message;

use super::{ChannelEvent, ChannelHandle, ChannelToken, Delivery, DeliverySink, Transport, TransportError};
use crate::config::Config;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens one WebSocket per trace. The TCP connect and handshake happen in
/// [`Transport::open`]; frames are read on a dedicated thread that forwards
/// them to the sink.
pub struct WsTransport {
    config: Config,
}

pub struct WsHandle {
    control: TcpStream,
    cancelled: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

/// Split a ws:// URL into host and port
fn endpoint(url: &str) -> Result<(String, u16), TransportError> {
    let uri: Uri = url.parse().map_err(|e: tungstenite::http::uri::InvalidUri| {
        TransportError::InvalidUrl { url: url.to_string(), reason: e.to_string() }
    })?;
    match uri.scheme_str() {
        Some("ws") => {}
        Some(other) => return Err(TransportError::UnsupportedScheme(other.to_string())),
        None => {
            return Err(TransportError::InvalidUrl {
                url: url.to_string(),
                reason: "missing scheme".to_string(),
            })
        }
    }
    let host = uri.host().ok_or_else(|| TransportError::InvalidUrl {
        url: url.to_string(),
        reason: "missing host".to_string(),
    })?;
    Ok((host.to_string(), uri.port_u16().unwrap_or(80)))
}

fn connect(host: &str, port: u16) -> Result<TcpStream, TransportError> {
    let addr = format!("{}:{}", host, port);
    let mut last_err = None;
    let candidates = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Connect { addr: addr.clone(), source })?;
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    let source = last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
    });
    Err(TransportError::Connect { addr, source })
}

impl Transport for WsTransport {
    type Handle = WsHandle;

    fn open(
        &mut self,
        trace_id: &str,
        token: ChannelToken,
        sink: DeliverySink,
    ) -> Result<Self::Handle, TransportError> {
        let url = self.config.channel_url(trace_id);
        let (host, port) = endpoint(&url)?;
        info!("opening channel {} to {}", token, url);

        let stream = connect(&host, port)?;
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
        let control = stream.try_clone()?;

        let (mut socket, _response) = tungstenite::client(url.as_str(), stream).map_err(|e| {
            TransportError::Handshake { url: url.clone(), reason: e.to_string() }
        })?;
        socket.get_ref().set_read_timeout(None)?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let reader_cancelled = Arc::clone(&cancelled);
        let reader = thread::Builder::new()
            .name(format!("ws-channel-{}", token.generation()))
            .spawn(move || {
                let send = |event| sink.send(Delivery::new(token, event)).is_ok();
                if !send(ChannelEvent::Opened) {
                    return;
                }
                loop {
                    match socket.read() {
                        Ok(Message::Text(text)) => {
                            if !send(ChannelEvent::Message(text)) {
                                return;
                            }
                        }
                        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                            Ok(text) => {
                                if !send(ChannelEvent::Message(text)) {
                                    return;
                                }
                            }
                            Err(_) => debug!("channel {}: dropping non-UTF-8 binary frame", token),
                        },
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(tungstenite::Error::ConnectionClosed)
                        | Err(tungstenite::Error::AlreadyClosed) => break,
                        Err(e) => {
                            if !reader_cancelled.load(Ordering::SeqCst) {
                                send(ChannelEvent::Failed(format!("WebSocket connection error: {}", e)));
                            }
                            break;
                        }
                    }
                }
                send(ChannelEvent::Closed);
            })?;

        Ok(WsHandle {
            control,
            cancelled,
            reader: Some(reader),
        })
    }
}

impl ChannelHandle for WsHandle {
    fn close(&mut self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        // Unblocks the reader thread's pending read
        if let Err(e) = self.control.shutdown(Shutdown::Both) {
            debug!("channel shutdown: {}", e);
        }
        // The reader is left detached; anything it still sends is stale
        self.reader.take();
    }
}

impl Drop for WsHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::mpsc::{self, Receiver};
    use tungstenite::handshake::server::{ErrorResponse, Request, Response};

    const ACK: &str = r#"{"type":"subscribed","trace_id":"T1","channel":"trace:T1"}"#;
    const AUTH_RUNNING: &str = r#"{"trace_id":"T1","step":"AUTH","status":"RUNNING"}"#;
    const AUTH_FAILED: &str = r#"{"trace_id":"T1","step":"AUTH","status":"FAILED","error":"nope"}"#;

    fn local_gateway() -> (TcpListener, Config) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut config = Config::default();
        config.set_gateway_url(&format!("http://127.0.0.1:{}", port)).unwrap();
        (listener, config)
    }

    /// Everything delivered until the reader thread lets go of the sink
    fn collect(rx: &Receiver<Delivery>) -> Vec<Delivery> {
        let mut out = Vec::new();
        while let Ok(delivery) = rx.recv_timeout(Duration::from_secs(5)) {
            out.push(delivery);
        }
        out
    }

    #[test]
    fn test_channel_delivers_frames_then_close() {
        let (listener, config) = local_gateway();
        let (path_tx, path_rx) = mpsc::channel();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let record_path = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                path_tx.send(req.uri().path().to_string()).unwrap();
                Ok(resp)
            };
            let mut socket = tungstenite::accept_hdr(stream, record_path).unwrap();
            for frame in [ACK, AUTH_RUNNING, AUTH_FAILED] {
                socket.send(Message::text(frame)).unwrap();
            }
            socket.close(None).unwrap();
            while socket.read().is_ok() {}
        });

        let mut transport = WsTransport::new(config);
        let (tx, rx) = mpsc::channel();
        let token = ChannelToken::new(7);
        let _handle = transport.open("T1", token, tx).unwrap();

        let deliveries = collect(&rx);
        server.join().unwrap();
        assert_eq!(path_rx.recv().unwrap(), "/ws/trace/T1");
        assert!(deliveries.iter().all(|d| d.token == token));
        let events: Vec<ChannelEvent> = deliveries.into_iter().map(|d| d.event).collect();
        assert_eq!(
            events,
            vec![
                ChannelEvent::Opened,
                ChannelEvent::Message(ACK.to_string()),
                ChannelEvent::Message(AUTH_RUNNING.to_string()),
                ChannelEvent::Message(AUTH_FAILED.to_string()),
                ChannelEvent::Closed,
            ]
        );
    }

    #[test]
    fn test_close_mid_stream_is_quiet() {
        let (listener, config) = local_gateway();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut socket = tungstenite::accept(stream).unwrap();
            socket.send(Message::text(ACK)).unwrap();
            // Stay open until the client goes away
            while socket.read().is_ok() {}
        });

        let mut transport = WsTransport::new(config);
        let (tx, rx) = mpsc::channel();
        let token = ChannelToken::new(3);
        let mut handle = transport.open("T1", token, tx).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.event, ChannelEvent::Opened);
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(second.event, ChannelEvent::Message(ACK.to_string()));

        handle.close();
        let rest = collect(&rx);
        server.join().unwrap();
        assert!(rest.iter().all(|d| !matches!(d.event, ChannelEvent::Failed(_))));
        assert_eq!(rest.last().map(|d| &d.event), Some(&ChannelEvent::Closed));
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            endpoint("ws://localhost:8080/ws/trace/abc").unwrap(),
            ("localhost".to_string(), 8080)
        );
        assert_eq!(
            endpoint("ws://gateway.internal/ws/trace/abc").unwrap(),
            ("gateway.internal".to_string(), 80)
        );
    }

    #[test]
    fn test_endpoint_rejects_tls_and_garbage() {
        assert!(matches!(
            endpoint("wss://gw.example.com/ws/trace/abc"),
            Err(TransportError::UnsupportedScheme(s)) if s == "wss"
        ));
        assert!(matches!(endpoint("not a url"), Err(TransportError::InvalidUrl { .. })));
    }

    #[test]
    fn test_open_unreachable_gateway_fails() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut config = Config::default();
        config.set_gateway_url(&format!("http://127.0.0.1:{}", port)).unwrap();
        let mut transport = WsTransport::new(config);
        let (tx, _rx) = std::sync::mpsc::channel();
        let result = transport.open("abc", ChannelToken::new(1), tx);
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
