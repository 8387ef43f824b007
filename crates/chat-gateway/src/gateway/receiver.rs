//! Receive loop
//!
//! Decodes frames and routes them by opcode. Anything that ends the
//! connection becomes a signal to the control task; the loop never reconnects
//! by itself.

use super::context::{LoopContext, SignalKind};
use crate::compression::Inflater;
use crate::connection::SessionNotice;
use crate::error::GatewayError;
use crate::protocol::{CloseAction, CloseCode, GatewayMessage, OpCode};
use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

pub(crate) async fn run<S>(mut source: S, mut inflater: Inflater, ctx: LoopContext)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return,
            frame = source.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(bytes))) => match inflater.inflate(&bytes) {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(generation = ctx.generation, error = %e, "Dropping undecodable frame");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                let code = frame.as_ref().map(|f| u16::from(f.code));
                let reason = frame.map(|f| f.reason.into_owned()).unwrap_or_default();
                ctx.signal(on_close(code, reason));
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(generation = ctx.generation, error = %e, "Gateway socket error");
                ctx.signal(SignalKind::Reconnect { resume: true });
                return;
            }
            None => {
                tracing::warn!(generation = ctx.generation, "Gateway socket ended");
                ctx.signal(SignalKind::Reconnect { resume: true });
                return;
            }
        };

        let message = match GatewayMessage::from_json(&text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(generation = ctx.generation, error = %e, "Dropping undecodable frame");
                continue;
            }
        };
        tracing::trace!(op = %message.op, event = ?message.t, seq = ?message.s, "Received frame");

        if let Some(kind) = handle(&ctx, message) {
            ctx.signal(kind);
            return;
        }
    }
}

/// Route one message; returns a signal when the connection must end
fn handle(ctx: &LoopContext, message: GatewayMessage) -> Option<SignalKind> {
    match message.op {
        OpCode::Dispatch => {
            ctx.forward(message);
            None
        }
        OpCode::Heartbeat => {
            ctx.send(GatewayMessage::heartbeat(ctx.session.sequence()));
            None
        }
        OpCode::HeartbeatAck => {
            if let Some(latency) = ctx.session.ack() {
                tracing::trace!(latency_ms = latency.as_millis() as u64, "Heartbeat acknowledged");
                ctx.notify(SessionNotice::Alive { latency });
            }
            None
        }
        OpCode::InvalidSession => {
            let resume = message.as_invalid_session().unwrap_or(false);
            tracing::warn!(generation = ctx.generation, resumable = resume, "Session invalidated");
            Some(SignalKind::Reconnect { resume })
        }
        OpCode::Reconnect => {
            tracing::info!(generation = ctx.generation, "Server requested reconnect");
            Some(SignalKind::Reconnect { resume: true })
        }
        other => {
            tracing::warn!(op = %other, "Unexpected opcode from server ignored");
            None
        }
    }
}

fn on_close(code: Option<u16>, reason: String) -> SignalKind {
    let action = CloseCode::classify(code);
    tracing::warn!(code = ?code, reason = %reason, action = ?action, "Gateway closed the connection");
    match action {
        CloseAction::Resume => SignalKind::Reconnect { resume: true },
        CloseAction::Reidentify => SignalKind::Reconnect { resume: false },
        CloseAction::Fatal => SignalKind::Fatal {
            reason: GatewayError::Closed { code, reason }.to_string(),
        },
    }
}
