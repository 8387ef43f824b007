//! Outbound writer
//!
//! Every payload leaves through one FIFO queue per connection. The writer
//! spends one unit of the shared send budget before each frame and waits while
//! the budget is exhausted.

use crate::protocol::{ClientCloseReason, GatewayMessage};
use chat_core::WindowBudget;
use futures_util::{Sink, SinkExt};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

/// Outbound send budget shared by every connection of a session
#[derive(Debug)]
pub struct SendBudget {
    budget: Mutex<WindowBudget>,
}

impl SendBudget {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            budget: Mutex::new(WindowBudget::new(limit, window)),
        }
    }

    /// Wait until a send is permitted, then spend it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let now = Instant::now().into_std();
                match self.budget.lock().try_spend(now) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Gateway send budget exhausted");
            tokio::time::sleep(wait).await;
        }
    }

    /// Sends still available right now
    pub fn remaining(&self) -> usize {
        self.budget.lock().remaining(Instant::now().into_std())
    }
}

/// Close frame for a client close reason
pub fn close_frame(reason: ClientCloseReason) -> CloseFrame<'static> {
    CloseFrame {
        code: WsCloseCode::from(reason.code()),
        reason: Cow::Borrowed(reason.description()),
    }
}

/// Drain the outbound queue into the socket until cancelled
///
/// On cancellation, queued payloads are dropped and a close frame carrying
/// `close_reason` is sent.
pub async fn run<S>(
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<GatewayMessage>,
    budget: Arc<SendBudget>,
    close_reason: Arc<Mutex<ClientCloseReason>>,
    cancel: CancellationToken,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = budget.acquire() => {}
        }

        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(op = %message.op, error = %e, "Failed to encode outbound payload");
                continue;
            }
        };

        tracing::trace!(op = %message.op, "Sending frame");
        if let Err(e) = sink.send(Message::Text(json)).await {
            tracing::warn!(error = %e, "Failed to write to gateway socket");
            return;
        }
    }

    let reason = *close_reason.lock();
    tracing::debug!(code = reason.code(), "Closing gateway socket");
    let _ = sink.send(Message::Close(Some(close_frame(reason)))).await;
    let _ = sink.close().await;
}
