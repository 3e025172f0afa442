//! STOMP client over `tokio-tungstenite`.
//!
//! [`StompConnector::connect`] performs the WebSocket and STOMP handshakes,
//! then hands the socket to a background loop. [`StompHandle`] talks to that
//! loop through a command channel; inbound `MESSAGE` frames are routed to the
//! subscription named in their `subscription` header.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, instrument, warn};

use super::frame::{Command, Frame, parse_frames};
use crate::errors::TransportError;
use crate::traits::{
    Credentials, FrameHandler, InboundMessage, SubscriptionId, TransportConnector,
    TransportHandle,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Ack for a frame written by the handler loop.
type WriteAck = oneshot::Sender<Result<(), TransportError>>;

/// Subscription id header value -> (topic, handler).
type Routes = Arc<Mutex<HashMap<String, (String, FrameHandler)>>>;

/// Internal command for the handler loop.
struct Outgoing {
    frame: Frame,
    ack: WriteAck,
    close_after: bool,
}

/// Dials a STOMP broker over WebSocket.
#[derive(Clone, Debug)]
pub struct StompConnector {
    url: String,
    host: String,
    connect_timeout: Duration,
}

impl StompConnector {
    /// Connector for `url` (e.g. `ws://host:8080/ws/websocket`).
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        let url = url.into();
        let host = url
            .split("://")
            .nth(1)
            .and_then(|rest| rest.split(['/', ':']).next())
            .unwrap_or("localhost")
            .to_string();
        Self {
            url,
            host,
            connect_timeout,
        }
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn connect_frame(&self, credentials: &Credentials) -> Frame {
        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", &self.host)
            .header("heart-beat", "0,0");
        if let Some(token) = &credentials.access_token {
            frame = frame.header("Authorization", format!("Bearer {token}"));
        }
        frame
    }

    async fn handshake(&self, credentials: &Credentials) -> Result<WsStream, TransportError> {
        let (mut ws, _) = connect_async(&self.url)
            .await
            .map_err(|e| TransportError::Connect {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        ws.send(Message::Text(self.connect_frame(credentials).encode().into()))
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))?;

        while let Some(msg) = ws.next().await {
            let msg = msg.map_err(|e| TransportError::Socket(e.to_string()))?;
            let Message::Text(text) = msg else { continue };
            for frame in parse_frames(text.as_str())? {
                match frame.command {
                    Command::Connected => {
                        debug!(version = frame.get("version"), "STOMP connected");
                        return Ok(ws);
                    }
                    Command::Error => {
                        return Err(TransportError::Broker {
                            message: frame.get("message").unwrap_or("rejected").to_string(),
                        });
                    }
                    other => debug!(command = %other, "ignoring frame before CONNECTED"),
                }
            }
        }
        Err(TransportError::Connect {
            url: self.url.clone(),
            reason: "socket closed during handshake".into(),
        })
    }
}

#[async_trait]
impl TransportConnector for StompConnector {
    #[instrument(skip(self, credentials), fields(url = %self.url))]
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        let ws = tokio::time::timeout(self.connect_timeout, self.handshake(credentials))
            .await
            .map_err(|_| TransportError::Timeout {
                timeout_ms: u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX),
                context: format!("STOMP handshake with {}", self.url),
            })??;

        info!("transport connected");
        let handle: Arc<dyn TransportHandle> = Arc::new(StompHandle::spawn(ws));
        Ok(handle)
    }
}

/// A live STOMP session.
pub struct StompHandle {
    cmd_tx: mpsc::Sender<Outgoing>,
    connected: Arc<AtomicBool>,
    routes: Routes,
    next_sub: AtomicU64,
    _handler: JoinHandle<()>,
}

impl StompHandle {
    fn spawn(ws: WsStream) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Outgoing>(64);
        let connected = Arc::new(AtomicBool::new(true));
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let handler = tokio::spawn(stomp_handler_loop(
            ws,
            cmd_rx,
            Arc::clone(&routes),
            Arc::clone(&connected),
        ));
        Self {
            cmd_tx,
            connected,
            routes,
            next_sub: AtomicU64::new(1),
            _handler: handler,
        }
    }

    async fn write(&self, frame: Frame, close_after: bool) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let (ack, rx) = oneshot::channel();
        self.cmd_tx
            .send(Outgoing {
                frame,
                ack,
                close_after,
            })
            .await
            .map_err(|_| TransportError::NotConnected)?;
        rx.await.map_err(|_| TransportError::NotConnected)?
    }
}

#[async_trait]
impl TransportHandle for StompHandle {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: FrameHandler,
    ) -> Result<SubscriptionId, TransportError> {
        let id = SubscriptionId(self.next_sub.fetch_add(1, Ordering::Relaxed));
        let key = id.to_string();
        let _ = self
            .routes
            .lock()
            .insert(key.clone(), (topic.to_string(), handler));

        let frame = Frame::new(Command::Subscribe)
            .header("id", &key)
            .header("destination", topic)
            .header("ack", "auto");
        if let Err(e) = self.write(frame, false).await {
            let _ = self.routes.lock().remove(&key);
            return Err(e);
        }
        debug!(%id, topic, "subscribed");
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        let key = id.to_string();
        if self.routes.lock().remove(&key).is_none() {
            return Ok(());
        }
        if !self.is_connected() {
            return Ok(());
        }
        self.write(Frame::new(Command::Unsubscribe).header("id", key), false)
            .await
    }

    async fn send(&self, destination: &str, body: &str) -> Result<(), TransportError> {
        let frame = Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .body(body);
        self.write(frame, false).await
    }

    async fn disconnect(&self) {
        if !self.is_connected() {
            return;
        }
        if let Err(e) = self.write(Frame::new(Command::Disconnect), true).await {
            debug!(error = %e, "disconnect frame not delivered");
        }
        self.connected.store(false, Ordering::SeqCst);
        self.routes.lock().clear();
    }
}

async fn stomp_handler_loop(
    ws: WsStream,
    mut cmd_rx: mpsc::Receiver<Outgoing>,
    routes: Routes,
    connected: Arc<AtomicBool>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                let result = ws_tx
                    .send(Message::Text(cmd.frame.encode().into()))
                    .await
                    .map_err(|e| TransportError::Socket(e.to_string()));
                let failed = result.is_err();
                let _ = cmd.ack.send(result);
                if cmd.close_after {
                    let _ = ws_tx.close().await;
                    break;
                }
                if failed {
                    break;
                }
            }
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                let text = match msg {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let frames = match parse_frames(text.as_str()) {
                    Ok(frames) => frames,
                    Err(e) => {
                        warn!(error = %e, "dropping malformed STOMP frame");
                        continue;
                    }
                };
                for frame in frames {
                    match frame.command {
                        Command::Message => dispatch(&routes, frame),
                        Command::Error => {
                            warn!(
                                message = frame.get("message").unwrap_or_default(),
                                "broker reported error"
                            );
                        }
                        other => debug!(command = %other, "ignoring frame"),
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    info!("transport closed");
}

fn dispatch(routes: &Routes, frame: Frame) {
    let route = frame.get("subscription").and_then(|sub| {
        routes
            .lock()
            .get(sub)
            .map(|(topic, handler)| (topic.clone(), Arc::clone(handler)))
    });
    let Some((topic, handler)) = route else {
        debug!(
            subscription = frame.get("subscription"),
            "message for unknown subscription"
        );
        return;
    };
    let destination = frame.get("destination").map_or(topic, str::to_string);
    handler(InboundMessage {
        destination,
        body: frame.body,
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
