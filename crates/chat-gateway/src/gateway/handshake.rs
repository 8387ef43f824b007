//! Opening handshake
//!
//! Hello first, then Identify or Resume, then READY or RESUMED. Anything else
//! in between is a protocol violation, with two exceptions: dispatches the
//! server replays while resuming, and Invalid Session, which restarts the
//! exchange after a short delay.

use super::context::forward_dispatch;
use super::session::GatewaySession;
use crate::compression::Inflater;
use crate::connection::{ConnectionState, Session};
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{GatewayMessage, IdentifyPayload, IdentifyProperties, OpCode, ResumePayload};
use chat_common::Compression;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Gateway API version requested in the connect URL
pub const GATEWAY_VERSION: u8 = 10;

/// How an Identify or Resume was answered
enum Ack {
    Accepted,
    Invalidated { resumable: bool },
}

/// Build the connect URL with version, encoding and compression parameters
pub fn gateway_url(base: &str, compression: Compression) -> String {
    let mut url = if base.contains('?') {
        format!("{base}&")
    } else {
        format!("{}/?", base.trim_end_matches('/'))
    };
    url.push_str(&format!("v={GATEWAY_VERSION}&encoding=json"));
    if compression == Compression::ZlibStream {
        url.push_str("&compress=zlib-stream");
    }
    url
}

impl GatewaySession {
    /// Open the socket within the connect timeout
    pub(super) async fn open_socket(&self, resume: bool) -> GatewayResult<WsStream> {
        let inner = &self.inner;
        let base = if resume {
            inner
                .resume_url
                .lock()
                .clone()
                .unwrap_or_else(|| self.bootstrap_url().to_string())
        } else {
            self.bootstrap_url().to_string()
        };
        let url = gateway_url(&base, inner.config.compression);

        tracing::debug!(url = %url, resume, "Opening gateway socket");
        let (stream, _response) =
            tokio::time::timeout(inner.config.connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| GatewayError::ConnectTimeout)??;
        Ok(stream)
    }

    pub(super) async fn handshake(
        &self,
        stream: &mut WsStream,
        inflater: &mut Inflater,
        session: &Session,
        mut resume: bool,
    ) -> GatewayResult<()> {
        let hello = next_message(stream, inflater).await?;
        let Some(payload) = hello.as_hello() else {
            return Err(GatewayError::unexpected("Hello", hello.op, hello.event_name()));
        };
        session.set_heartbeat_interval(payload.heartbeat_interval);
        tracing::debug!(interval_ms = payload.heartbeat_interval, "Received Hello");

        loop {
            let opening = if resume {
                self.set_state(ConnectionState::Resuming);
                GatewayMessage::resume(&self.resume_payload(session)?)
            } else {
                self.set_state(ConnectionState::Identifying);
                GatewayMessage::identify(&self.identify_payload())
            };
            self.send_direct(stream, &opening).await?;
            self.set_state(ConnectionState::AwaitingAck);

            match self.await_ack(stream, inflater, session, resume).await? {
                Ack::Accepted => return Ok(()),
                Ack::Invalidated { resumable } => {
                    tracing::warn!(resume, resumable, "Session invalidated during handshake");
                    tokio::time::sleep(self.inner.config.invalid_session_delay).await;
                    if !(resume && resumable) {
                        resume = false;
                        session.reset();
                    }
                }
            }
        }
    }

    async fn await_ack(
        &self,
        stream: &mut WsStream,
        inflater: &mut Inflater,
        session: &Session,
        resume: bool,
    ) -> GatewayResult<Ack> {
        let expected = if resume { "RESUMED" } else { "READY" };
        loop {
            let message = next_message(stream, inflater).await?;
            match message.op {
                OpCode::Dispatch if resume => {
                    let resumed = message.event_name() == Some("RESUMED");
                    forward_dispatch(session, &self.inner.dispatch, message);
                    if resumed {
                        tracing::info!(seq = ?session.sequence(), "Gateway session resumed");
                        return Ok(Ack::Accepted);
                    }
                }
                OpCode::Dispatch => {
                    let Some(ready) = message.as_ready() else {
                        return Err(GatewayError::unexpected(
                            expected,
                            message.op,
                            message.event_name(),
                        ));
                    };
                    session.set_session_id(ready.session_id.clone());
                    *self.inner.resume_url.lock() = ready.resume_gateway_url;
                    tracing::info!(session_id = %ready.session_id, "Gateway session identified");
                    forward_dispatch(session, &self.inner.dispatch, message);
                    return Ok(Ack::Accepted);
                }
                OpCode::InvalidSession => {
                    return Ok(Ack::Invalidated {
                        resumable: message.as_invalid_session().unwrap_or(false),
                    });
                }
                op => return Err(GatewayError::unexpected(expected, op, message.event_name())),
            }
        }
    }

    fn identify_payload(&self) -> IdentifyPayload {
        let config = &self.inner.config;
        IdentifyPayload {
            token: self.inner.token.clone(),
            intents: config.intents,
            compress: config.compression == Compression::Payload,
            properties: IdentifyProperties::default(),
            presence: None,
        }
    }

    fn resume_payload(&self, session: &Session) -> GatewayResult<ResumePayload> {
        Ok(ResumePayload {
            token: self.inner.token.clone(),
            session_id: session.session_id().ok_or(GatewayError::InvalidSession)?,
            seq: session.sequence(),
        })
    }

    /// Send on the unsplit socket, still through the send budget
    async fn send_direct(&self, stream: &mut WsStream, message: &GatewayMessage) -> GatewayResult<()> {
        self.inner.send_budget.acquire().await;
        tracing::trace!(op = %message.op, "Sending handshake frame");
        stream.send(Message::Text(message.to_json()?)).await?;
        Ok(())
    }
}

/// Read until one whole gateway message is available
async fn next_message(stream: &mut WsStream, inflater: &mut Inflater) -> GatewayResult<GatewayMessage> {
    loop {
        let frame = stream
            .next()
            .await
            .ok_or_else(|| GatewayError::Connection("socket closed during handshake".to_string()))??;

        let text = match frame {
            Message::Text(text) => text,
            Message::Binary(bytes) => match inflater.inflate(&bytes)? {
                Some(text) => text,
                None => continue,
            },
            Message::Close(frame) => {
                return Err(GatewayError::Closed {
                    code: frame.as_ref().map(|f| u16::from(f.code)),
                    reason: frame.map(|f| f.reason.into_owned()).unwrap_or_default(),
                });
            }
            _ => continue,
        };

        let message = GatewayMessage::from_json(&text)?;
        tracing::trace!(op = %message.op, event = ?message.t, "Handshake frame");
        return Ok(message);
    }
}
