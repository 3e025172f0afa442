//! STOMP client against an in-test WebSocket broker.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use handoff_transport::stomp::{Command, Frame, parse_frames};
use handoff_transport::{
    Credentials, FrameHandler, InboundMessage, StompConnector, TransportConnector, TransportError,
    TransportHandle as _,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// Test broker: frames it receives and a way to push raw text to the client.
struct Broker {
    url: String,
    received: mpsc::UnboundedReceiver<Frame>,
    push: mpsc::UnboundedSender<String>,
}

impl Broker {
    async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("broker frame timeout")
            .expect("broker closed")
    }
}

/// Spawn a broker that answers `CONNECT` with `reply`.
async fn spawn_broker(reply: &'static str) -> Broker {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (received_tx, received) = mpsc::unbounded_channel();
    let (push, mut push_rx) = mpsc::unbounded_channel::<String>();

    let _task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        loop {
            tokio::select! {
                msg = ws.next() => {
                    let Some(Ok(Message::Text(text))) = msg else { break };
                    for frame in parse_frames(text.as_str()).unwrap() {
                        let is_connect = frame.command == Command::Connect;
                        let _ = received_tx.send(frame);
                        if is_connect {
                            ws.send(Message::Text(reply.to_string().into())).await.unwrap();
                        }
                    }
                }
                out = push_rx.recv() => {
                    let Some(out) = out else { break };
                    ws.send(Message::Text(out.into())).await.unwrap();
                }
            }
        }
    });

    Broker {
        url: format!("ws://{addr}/ws/websocket"),
        received,
        push,
    }
}

const CONNECTED: &str = "CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0";

#[tokio::test]
async fn connect_sends_credentials() {
    let mut broker = spawn_broker(CONNECTED).await;
    let connector = StompConnector::new(&broker.url, WAIT);
    let handle = connector
        .connect(&Credentials::bearer("secret"))
        .await
        .unwrap();
    assert!(handle.is_connected());

    let connect = broker.next_frame().await;
    assert_eq!(connect.command, Command::Connect);
    assert_eq!(connect.get("Authorization"), Some("Bearer secret"));
}

#[tokio::test]
async fn subscribe_and_receive_message() {
    let mut broker = spawn_broker(CONNECTED).await;
    let handle = StompConnector::new(&broker.url, WAIT)
        .connect(&Credentials::anonymous())
        .await
        .unwrap();
    let _connect = broker.next_frame().await;

    let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();
    let handler: FrameHandler = Arc::new(move |m| {
        let _ = tx.send(m);
    });
    let id = handle.subscribe("/topic/rooms/guest-1", handler).await.unwrap();

    let sub = broker.next_frame().await;
    assert_eq!(sub.command, Command::Subscribe);
    assert_eq!(sub.get("destination"), Some("/topic/rooms/guest-1"));
    assert_eq!(sub.get("id"), Some(id.to_string().as_str()));

    let message = Frame::new(Command::Message)
        .header("destination", "/topic/rooms/guest-1")
        .header("subscription", id.to_string())
        .header("message-id", "1")
        .body(r#"{"role":"AGENT","text":"hello"}"#);
    broker.push.send(message.encode()).unwrap();

    let got = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(got.destination, "/topic/rooms/guest-1");
    assert_eq!(got.body, r#"{"role":"AGENT","text":"hello"}"#);
}

#[tokio::test]
async fn send_writes_send_frame() {
    let mut broker = spawn_broker(CONNECTED).await;
    let handle = StompConnector::new(&broker.url, WAIT)
        .connect(&Credentials::anonymous())
        .await
        .unwrap();
    let _connect = broker.next_frame().await;

    handle
        .send("/app/support.send/guest-1", r#"{"type":"TEXT"}"#)
        .await
        .unwrap();

    let frame = broker.next_frame().await;
    assert_eq!(frame.command, Command::Send);
    assert_eq!(frame.get("destination"), Some("/app/support.send/guest-1"));
    assert_eq!(frame.body, r#"{"type":"TEXT"}"#);
}

#[tokio::test]
async fn unsubscribe_writes_frame() {
    let mut broker = spawn_broker(CONNECTED).await;
    let handle = StompConnector::new(&broker.url, WAIT)
        .connect(&Credentials::anonymous())
        .await
        .unwrap();
    let _connect = broker.next_frame().await;

    let handler: FrameHandler = Arc::new(|_| {});
    let id = handle.subscribe("/topic/x", handler).await.unwrap();
    let _sub = broker.next_frame().await;
    handle.unsubscribe(id).await.unwrap();

    let frame = broker.next_frame().await;
    assert_eq!(frame.command, Command::Unsubscribe);
    assert_eq!(frame.get("id"), Some(id.to_string().as_str()));
}

#[tokio::test]
async fn broker_error_rejects_connect() {
    let broker = spawn_broker("ERROR\nmessage:bad credentials\n\n\0").await;
    let err = StompConnector::new(&broker.url, WAIT)
        .connect(&Credentials::anonymous())
        .await
        .err()
        .unwrap();
    assert_matches!(err, TransportError::Broker { message } if message == "bad credentials");
}

#[tokio::test]
async fn disconnect_marks_handle_dead() {
    let mut broker = spawn_broker(CONNECTED).await;
    let handle = StompConnector::new(&broker.url, WAIT)
        .connect(&Credentials::anonymous())
        .await
        .unwrap();
    let _connect = broker.next_frame().await;

    handle.disconnect().await;
    assert!(!handle.is_connected());
    assert_eq!(broker.next_frame().await.command, Command::Disconnect);
    assert_matches!(
        handle.send("/app/x", "{}").await,
        Err(TransportError::NotConnected)
    );
}

#[tokio::test]
async fn refused_connection_is_retryable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = StompConnector::new(format!("ws://{addr}/ws"), WAIT)
        .connect(&Credentials::anonymous())
        .await
        .err()
        .unwrap();
    assert!(err.is_retryable(), "{err}");
}
