//! Shared context for one connection generation's loops

use crate::connection::{Session, SessionNotice};
use crate::dispatch::DispatchEvent;
use crate::protocol::{ClientCloseReason, GatewayMessage};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// What a loop asks the session control task to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SignalKind {
    Reconnect { resume: bool },
    Fatal { reason: String },
}

/// A loop signal tagged with the generation that raised it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoopSignal {
    pub generation: u64,
    pub kind: SignalKind,
}

#[derive(Clone)]
pub(crate) struct LoopContext {
    pub generation: u64,
    pub session: Arc<Session>,
    pub outbound: mpsc::UnboundedSender<GatewayMessage>,
    pub control: mpsc::UnboundedSender<LoopSignal>,
    pub notices: broadcast::Sender<SessionNotice>,
    pub dispatch: mpsc::UnboundedSender<DispatchEvent>,
    pub close_reason: Arc<Mutex<ClientCloseReason>>,
    pub cancel: CancellationToken,
}

impl LoopContext {
    /// Hand a decision to the control task
    pub fn signal(&self, kind: SignalKind) {
        tracing::debug!(generation = self.generation, signal = ?kind, "Loop signal");
        let _ = self.control.send(LoopSignal {
            generation: self.generation,
            kind,
        });
    }

    pub fn notify(&self, notice: SessionNotice) {
        let _ = self.notices.send(notice);
    }

    /// Queue a payload for the writer
    pub fn send(&self, message: GatewayMessage) {
        if self.outbound.send(message).is_err() {
            tracing::debug!(generation = self.generation, "Writer gone; payload dropped");
        }
    }

    /// Record the sequence number and pass a dispatch on
    pub fn forward(&self, message: GatewayMessage) {
        forward_dispatch(&self.session, &self.dispatch, message);
    }
}

pub(crate) fn forward_dispatch(
    session: &Session,
    dispatch: &mpsc::UnboundedSender<DispatchEvent>,
    message: GatewayMessage,
) {
    if let Some(seq) = message.s {
        session.update_sequence(seq);
    }
    let Some(event) = DispatchEvent::from_message(message) else {
        tracing::warn!("Dispatch without event name skipped");
        return;
    };
    tracing::trace!(event = %event.name, seq = ?event.sequence, "Dispatch received");
    if dispatch.send(event).is_err() {
        tracing::debug!("Dispatch receiver dropped; event discarded");
    }
}
