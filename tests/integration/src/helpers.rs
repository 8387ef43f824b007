//! Test helpers for integration tests
//!
//! [`FakeGateway`] accepts WebSocket connections on a local port and hands
//! each one to the test as a [`FakeConnection`] it can script frame by frame.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chat_common::{ClientConfig, Compression, GatewayConfig, Supervisor, SupervisorReceiver};
use chat_gateway::protocol::{GatewayMessage, IdentifyPayload, ResumePayload};
use chat_gateway::{ConnectionState, DispatchReceiver, GatewaySession};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// How long any single scripted step may take
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Heartbeat interval long enough that no beat fires during a test
pub const QUIET_INTERVAL: u64 = 45_000;

/// In-process gateway server
pub struct FakeGateway {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<FakeConnection>,
    _handle: JoinHandle<()>,
}

impl FakeGateway {
    /// Bind an ephemeral port and start accepting
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, connections) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                match accept_async(stream).await {
                    Ok(ws) => {
                        if tx.send(FakeConnection { ws }).is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("fake gateway: handshake failed: {e}"),
                }
            }
        });

        Ok(Self {
            addr,
            connections,
            _handle: handle,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the client to open the next socket
    pub async fn accept(&mut self) -> Result<FakeConnection> {
        tokio::time::timeout(STEP_TIMEOUT, self.connections.recv())
            .await
            .context("timed out waiting for a connection")?
            .context("fake gateway stopped")
    }

    /// Check that no further socket is opened within `wait`
    pub async fn expect_no_connection(&mut self, wait: Duration) -> Result<()> {
        match tokio::time::timeout(wait, self.connections.recv()).await {
            Ok(Some(_)) => bail!("unexpected extra connection"),
            _ => Ok(()),
        }
    }
}

/// Accepts TCP connections but never answers the WebSocket upgrade
pub struct StalledListener {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    _handle: JoinHandle<()>,
}

impl StalledListener {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        let handle = tokio::spawn(async move {
            // Held open so the client sees silence rather than a reset
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        });

        Ok(Self {
            addr,
            accepted,
            _handle: handle,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// TCP connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// URL of a local port nothing listens on
pub async fn refused_url() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("ws://{addr}"))
}

/// One accepted client socket
pub struct FakeConnection {
    ws: WebSocketStream<TcpStream>,
}

/// What the client sent next
#[derive(Debug)]
pub enum Received {
    Message(GatewayMessage),
    Close(Option<u16>),
}

impl FakeConnection {
    pub async fn send(&mut self, message: &GatewayMessage) -> Result<()> {
        self.ws.send(Message::Text(message.to_json()?)).await?;
        Ok(())
    }

    /// Send a raw binary frame
    pub async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.ws.send(Message::Binary(bytes)).await?;
        Ok(())
    }

    /// Next message or close frame from the client
    pub async fn next(&mut self) -> Result<Received> {
        loop {
            let frame = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for a client frame")?;
            match frame {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Received::Message(GatewayMessage::from_json(&text)?));
                }
                Some(Ok(Message::Close(frame))) => {
                    return Ok(Received::Close(frame.map(|f| u16::from(f.code))));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(Received::Close(None)),
            }
        }
    }

    /// Next message, failing on a close frame
    pub async fn recv(&mut self) -> Result<GatewayMessage> {
        match self.next().await? {
            Received::Message(message) => Ok(message),
            Received::Close(code) => bail!("client closed the socket ({code:?})"),
        }
    }

    /// Skip messages until the client closes, returning the close code
    pub async fn expect_close(&mut self) -> Result<Option<u16>> {
        loop {
            if let Received::Close(code) = self.next().await? {
                return Ok(code);
            }
        }
    }

    pub async fn hello(&mut self, interval_ms: u64) -> Result<()> {
        self.send(&GatewayMessage::hello(interval_ms)).await
    }

    pub async fn expect_identify(&mut self) -> Result<IdentifyPayload> {
        let message = self.recv().await?;
        message
            .as_identify()
            .with_context(|| format!("expected Identify, got {message}"))
    }

    pub async fn expect_resume(&mut self) -> Result<ResumePayload> {
        let message = self.recv().await?;
        message
            .as_resume()
            .with_context(|| format!("expected Resume, got {message}"))
    }

    /// Expect a heartbeat and return the sequence it carried
    pub async fn expect_heartbeat(&mut self) -> Result<Option<u64>> {
        let message = self.recv().await?;
        message
            .as_heartbeat_seq()
            .with_context(|| format!("expected Heartbeat, got {message}"))
    }

    pub async fn ready(&mut self, session_id: &str, seq: u64) -> Result<()> {
        let data = json!({
            "v": 10,
            "session_id": session_id,
            "user": {"id": "1", "username": "bot"},
            "guilds": [],
        });
        self.send(&GatewayMessage::dispatch("READY", seq, data)).await
    }

    pub async fn resumed(&mut self, seq: u64) -> Result<()> {
        self.send(&GatewayMessage::dispatch("RESUMED", seq, json!({})))
            .await
    }

    pub async fn dispatch(&mut self, name: &str, seq: u64, data: serde_json::Value) -> Result<()> {
        self.send(&GatewayMessage::dispatch(name, seq, data)).await
    }

    /// Hello, Identify, Ready
    pub async fn complete_identify(&mut self, session_id: &str) -> Result<IdentifyPayload> {
        self.hello(QUIET_INTERVAL).await?;
        let identify = self.expect_identify().await?;
        self.ready(session_id, 1).await?;
        Ok(identify)
    }

    /// Close the socket with a gateway close code
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.ws
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_string().into(),
            }))
            .await?;
        Ok(())
    }
}

/// Gateway settings tuned for tests
pub fn test_gateway_config() -> GatewayConfig {
    GatewayConfig {
        compression: Compression::None,
        connect_timeout: Duration::from_secs(2),
        handshake_timeout: Duration::from_secs(2),
        reconnect_delay: Duration::from_millis(10),
        invalid_session_delay: Duration::from_millis(10),
        heartbeat_jitter: false,
        ..GatewayConfig::default()
    }
}

/// Client settings tuned for tests
pub fn test_client_config() -> ClientConfig {
    let mut config = ClientConfig::new("test-token");
    config.gateway = test_gateway_config();
    config
}

/// A session pointed at `gateway`, plus its supervisor receiver
pub fn test_session(gateway: &FakeGateway) -> (GatewaySession, DispatchReceiver, SupervisorReceiver) {
    test_session_with(gateway, test_gateway_config())
}

pub fn test_session_with(
    gateway: &FakeGateway,
    config: GatewayConfig,
) -> (GatewaySession, DispatchReceiver, SupervisorReceiver) {
    session_for_url(gateway.url(), config)
}

/// A session pointed at an arbitrary gateway URL
pub fn session_for_url(
    url: String,
    config: GatewayConfig,
) -> (GatewaySession, DispatchReceiver, SupervisorReceiver) {
    let (supervisor, supervisor_rx) = Supervisor::channel();
    let (session, events) = GatewaySession::new(config, "test-token", url, supervisor);
    (session, events, supervisor_rx)
}

/// Wait until the session reaches `target`
pub async fn wait_for_state(session: &GatewaySession, target: ConnectionState) -> Result<()> {
    let mut rx = session.watch_state();
    tokio::time::timeout(STEP_TIMEOUT, rx.wait_for(|state| *state == target))
        .await
        .with_context(|| format!("timed out waiting for {target}"))??;
    Ok(())
}
