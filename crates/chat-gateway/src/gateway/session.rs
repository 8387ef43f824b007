//! Gateway session handle
//!
//! `GatewaySession` owns the connection state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Identifying | Resuming -> AwaitingAck -> Connected
//! Connected -> Reconnecting -> Connecting -> ...
//! any -> Terminated
//! ```
//!
//! Each successful handshake starts a new connection generation with its own
//! writer, heartbeat and receive tasks under one cancellation token. Loops
//! never reconnect on their own; they send a signal tagged with their
//! generation to a single control task, which ignores signals from
//! generations that are no longer current.

use super::context::{LoopContext, LoopSignal, SignalKind};
use super::handshake::WsStream;
use super::{heartbeat, receiver};
use crate::compression::Inflater;
use crate::connection::{writer, ConnectionState, SendBudget, Session, SessionNotice};
use crate::dispatch::DispatchEvent;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{
    ClientCloseReason, GatewayMessage, PresenceUpdatePayload, RequestGuildMembersPayload,
    VoiceStateUpdatePayload,
};
use chat_common::{GatewayConfig, Supervisor};
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Receiving end for dispatch events; feed it to a `DispatchQueue`
pub type DispatchReceiver = mpsc::UnboundedReceiver<DispatchEvent>;

/// Buffered notices per subscriber
const NOTICE_CAPACITY: usize = 64;

/// How long teardown waits for the writer to flush its close frame
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// One live connection and its tasks
struct Generation {
    id: u64,
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<GatewayMessage>,
    close_reason: Arc<Mutex<ClientCloseReason>>,
    writer: JoinHandle<()>,
}

pub(super) struct Inner {
    pub(super) config: GatewayConfig,
    pub(super) token: String,
    /// Bootstrap URL, used for every fresh Identify
    url: String,
    /// URL from READY, used for Resume
    pub(super) resume_url: Mutex<Option<String>>,
    state: watch::Sender<ConnectionState>,
    notices: broadcast::Sender<SessionNotice>,
    pub(super) dispatch: mpsc::UnboundedSender<DispatchEvent>,
    supervisor: Supervisor,
    root: CancellationToken,
    pub(super) send_budget: Arc<SendBudget>,
    current: Mutex<Option<Generation>>,
    /// Session of the last successful handshake; source of resume state
    last_session: Mutex<Option<Arc<Session>>>,
    generation: AtomicU64,
    control_tx: mpsc::UnboundedSender<LoopSignal>,
    control_rx: Mutex<Option<mpsc::UnboundedReceiver<LoopSignal>>>,
    /// Serializes connect, reconnect, disconnect and terminate
    lifecycle: tokio::sync::Mutex<()>,
}

/// Handle to a gateway session; clones share the same session
#[derive(Clone)]
pub struct GatewaySession {
    pub(super) inner: Arc<Inner>,
}

impl GatewaySession {
    /// Create a disconnected session for `url`
    ///
    /// Dispatch events arrive on the returned receiver in receive order.
    pub fn new(
        config: GatewayConfig,
        token: impl Into<String>,
        url: impl Into<String>,
        supervisor: Supervisor,
    ) -> (Self, DispatchReceiver) {
        let (dispatch, dispatch_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let send_budget = Arc::new(SendBudget::new(config.send_limit, config.send_window));

        let inner = Inner {
            config,
            token: token.into(),
            url: url.into(),
            resume_url: Mutex::new(None),
            state,
            notices,
            dispatch,
            supervisor,
            root: CancellationToken::new(),
            send_budget,
            current: Mutex::new(None),
            last_session: Mutex::new(None),
            generation: AtomicU64::new(0),
            control_tx,
            control_rx: Mutex::new(Some(control_rx)),
            lifecycle: tokio::sync::Mutex::new(()),
        };

        (
            Self {
                inner: Arc::new(inner),
            },
            dispatch_rx,
        )
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the socket and complete the handshake
    ///
    /// Resumes when a previous session can be resumed, identifies otherwise.
    /// A failed attempt is retried once; a second failure, or a fatal close
    /// code, escalates to the supervisor and terminates the session.
    pub async fn connect(&self) -> GatewayResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.ensure_live()?;
        if self.inner.current.lock().is_some() {
            tracing::debug!("Gateway session already connected");
            return Ok(());
        }
        self.spawn_control();

        let resume = self.can_resume();
        let first = match self.open(resume).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if first.is_fatal() {
            self.fatal(first.to_string());
            return Err(first);
        }

        tracing::warn!(error = %first, "Gateway connect failed; retrying once");
        tokio::time::sleep(self.inner.config.reconnect_delay).await;
        let resume = resume && !matches!(first, GatewayError::InvalidSession);
        match self.open(resume).await {
            Ok(()) => Ok(()),
            Err(second) => {
                self.fatal(format!("gateway connect failed twice: {second}"));
                Err(second)
            }
        }
    }

    /// Drop the current connection and handshake again
    pub async fn reconnect(&self, resume: bool) -> GatewayResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.reconnect_locked(resume).await
    }

    async fn reconnect_locked(&self, resume: bool) -> GatewayResult<()> {
        self.ensure_live()?;
        tracing::info!(resume, "Reconnecting gateway session");
        self.notify(SessionNotice::Reconnecting { resume });
        self.set_state(ConnectionState::Reconnecting);
        self.teardown(None).await;

        tokio::time::sleep(self.inner.config.reconnect_delay).await;
        let first = match self.open(resume && self.can_resume()).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if first.is_fatal() {
            self.fatal(first.to_string());
            return Err(first);
        }

        tracing::warn!(error = %first, "Reconnect failed; retrying without resume");
        tokio::time::sleep(self.inner.config.reconnect_delay).await;
        match self.open(false).await {
            Ok(()) => Ok(()),
            Err(second) => {
                self.fatal(format!("gateway reconnect failed twice: {second}"));
                Err(second)
            }
        }
    }

    /// Close the connection and stop its loops
    ///
    /// Queued outbound payloads are dropped. Closing with a reason that keeps
    /// the session lets a later [`connect`](Self::connect) resume it.
    pub async fn disconnect(&self, reason: ClientCloseReason) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        tracing::info!(reason = %reason, "Disconnecting gateway session");
        self.teardown(Some(reason)).await;
        if !reason.keeps_session() {
            self.forget_session();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Close the connection for good and ask the supervisor to exit
    pub async fn terminate(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.inner.root.is_cancelled() {
            return;
        }
        self.teardown(Some(ClientCloseReason::Terminate)).await;
        self.forget_session();
        self.set_state(ConnectionState::Terminated);
        tracing::info!("Gateway session terminated");
        self.inner.supervisor.exit("gateway session terminated");
        self.inner.root.cancel();
    }

    /// Unrecoverable failure: escalate and terminate
    fn fatal(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.inner.root.is_cancelled() {
            return;
        }
        tracing::error!(reason = %reason, "Gateway session failed");

        let generation = self.inner.current.lock().take();
        if let Some(generation) = generation {
            generation.cancel.cancel();
        }
        self.notify(SessionNotice::Fatal {
            reason: reason.clone(),
        });
        self.set_state(ConnectionState::Terminated);
        self.inner.supervisor.restart(reason);
        self.inner.root.cancel();
    }

    // =========================================================================
    // Connection generations
    // =========================================================================

    /// One socket open plus handshake
    async fn open(&self, resume: bool) -> GatewayResult<()> {
        let result = self.try_open(resume).await;
        if result.is_err() {
            self.set_state(ConnectionState::Disconnected);
        }
        result
    }

    async fn try_open(&self, resume: bool) -> GatewayResult<()> {
        self.ensure_live()?;
        self.set_state(ConnectionState::Connecting);

        let previous = self.inner.last_session.lock().clone();
        let session = match previous {
            Some(previous) if resume && previous.can_resume() => Session::resuming(&previous),
            _ => Session::new(),
        };
        let resume = session.can_resume();

        let mut stream = self.open_socket(resume).await?;
        let mut inflater = Inflater::new(self.inner.config.compression);

        let handshake = tokio::time::timeout(
            self.inner.config.handshake_timeout,
            self.handshake(&mut stream, &mut inflater, &session, resume),
        )
        .await
        .unwrap_or(Err(GatewayError::HandshakeTimeout));

        if let Err(err) = handshake {
            tracing::warn!(error = %err, resume, "Gateway handshake failed");
            let frame = writer::close_frame(err.to_close_reason());
            let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, stream.close(Some(frame))).await;
            return Err(err);
        }

        self.start(stream, inflater, Arc::new(session));
        Ok(())
    }

    /// Split the socket and start the generation's tasks
    fn start(&self, stream: WsStream, inflater: Inflater, session: Arc<Session>) {
        let inner = &self.inner;
        let id = inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let cancel = inner.root.child_token();
        let (sink, source) = stream.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let close_reason = Arc::new(Mutex::new(ClientCloseReason::Reconnecting));

        let ctx = LoopContext {
            generation: id,
            session: Arc::clone(&session),
            outbound: outbound.clone(),
            control: inner.control_tx.clone(),
            notices: inner.notices.clone(),
            dispatch: inner.dispatch.clone(),
            close_reason: Arc::clone(&close_reason),
            cancel: cancel.clone(),
        };

        let writer = tokio::spawn(writer::run(
            sink,
            outbound_rx,
            Arc::clone(&inner.send_budget),
            Arc::clone(&close_reason),
            cancel.clone(),
        ));
        tokio::spawn(heartbeat::run(ctx.clone(), inner.config.heartbeat_jitter));
        tokio::spawn(receiver::run(source, inflater, ctx));

        *inner.current.lock() = Some(Generation {
            id,
            cancel,
            outbound,
            close_reason,
            writer,
        });
        *inner.last_session.lock() = Some(Arc::clone(&session));

        tracing::info!(
            generation = id,
            session_id = ?session.session_id(),
            seq = ?session.sequence(),
            "Gateway session connected"
        );
        self.set_state(ConnectionState::Connected);
    }

    /// Cancel the current generation and wait for its close frame
    async fn teardown(&self, reason: Option<ClientCloseReason>) {
        let generation = self.inner.current.lock().take();
        let Some(generation) = generation else {
            return;
        };
        if let Some(reason) = reason {
            *generation.close_reason.lock() = reason;
        }

        tracing::debug!(generation = generation.id, "Tearing down gateway connection");
        generation.cancel.cancel();
        if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, generation.writer)
            .await
            .is_err()
        {
            tracing::warn!(generation = generation.id, "Writer did not finish closing in time");
        }
    }

    // =========================================================================
    // Control task
    // =========================================================================

    fn spawn_control(&self) {
        let Some(mut rx) = self.inner.control_rx.lock().take() else {
            return;
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let root = self.inner.root.clone();

        tokio::spawn(async move {
            loop {
                let signal = tokio::select! {
                    biased;
                    () = root.cancelled() => break,
                    signal = rx.recv() => match signal {
                        Some(signal) => signal,
                        None => break,
                    },
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                GatewaySession { inner }.handle_signal(signal).await;
            }
            tracing::debug!("Gateway control task stopped");
        });
    }

    async fn handle_signal(&self, signal: LoopSignal) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.generation() != Some(signal.generation) {
            tracing::debug!(
                generation = signal.generation,
                current = ?self.generation(),
                "Ignoring signal from stale connection"
            );
            return;
        }

        match signal.kind {
            SignalKind::Reconnect { resume } => {
                if let Err(e) = self.reconnect_locked(resume).await {
                    tracing::warn!(error = %e, "Gateway reconnect failed");
                }
            }
            SignalKind::Fatal { reason } => {
                self.teardown(None).await;
                self.fatal(reason);
            }
        }
    }

    // =========================================================================
    // Client commands
    // =========================================================================

    /// Send a Presence Update (op 3)
    pub fn update_presence(&self, presence: PresenceUpdatePayload) -> GatewayResult<()> {
        if !presence.is_valid_status() {
            return Err(GatewayError::InvalidPayload("unknown presence status"));
        }
        self.send_command(GatewayMessage::presence_update(&presence))
    }

    /// Send a Voice State Update (op 4)
    pub fn update_voice_state(&self, voice: VoiceStateUpdatePayload) -> GatewayResult<()> {
        self.send_command(GatewayMessage::voice_state_update(&voice))
    }

    /// Send a Request Guild Members (op 8)
    pub fn request_guild_members(&self, request: RequestGuildMembersPayload) -> GatewayResult<()> {
        if !request.is_valid() {
            return Err(GatewayError::InvalidPayload(
                "exactly one of query and user_ids must be set",
            ));
        }
        self.send_command(GatewayMessage::request_guild_members(&request))
    }

    fn send_command(&self, message: GatewayMessage) -> GatewayResult<()> {
        self.ensure_live()?;
        if !self.state().is_connected() {
            return Err(GatewayError::NotConnected);
        }
        let current = self.inner.current.lock();
        let generation = current.as_ref().ok_or(GatewayError::NotConnected)?;
        tracing::debug!(op = %message.op, "Queueing gateway command");
        generation
            .outbound
            .send(message)
            .map_err(|_| GatewayError::NotConnected)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to session notices
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.inner.notices.subscribe()
    }

    /// Session id of the last successful handshake
    pub fn session_id(&self) -> Option<String> {
        self.last_session().and_then(|s| s.session_id())
    }

    /// Last dispatch sequence number received
    pub fn sequence(&self) -> Option<u64> {
        self.last_session().and_then(|s| s.sequence())
    }

    /// Round trip of the last acknowledged heartbeat
    pub fn latency(&self) -> Option<Duration> {
        self.last_session().and_then(|s| s.latency())
    }

    /// Id of the live connection generation
    pub fn generation(&self) -> Option<u64> {
        self.inner.current.lock().as_ref().map(|g| g.id)
    }

    /// Outbound sends available right now
    pub fn send_budget_remaining(&self) -> usize {
        self.inner.send_budget.remaining()
    }

    /// URL every fresh Identify connects to
    pub fn bootstrap_url(&self) -> &str {
        &self.inner.url
    }

    /// URL the next Resume will connect to
    pub fn resume_url(&self) -> Option<String> {
        self.inner.resume_url.lock().clone()
    }

    fn last_session(&self) -> Option<Arc<Session>> {
        self.inner.last_session.lock().clone()
    }

    fn can_resume(&self) -> bool {
        self.last_session().is_some_and(|s| s.can_resume())
    }

    fn forget_session(&self) {
        *self.inner.last_session.lock() = None;
        *self.inner.resume_url.lock() = None;
    }

    fn ensure_live(&self) -> GatewayResult<()> {
        if self.inner.root.is_cancelled() {
            Err(GatewayError::Terminated)
        } else {
            Ok(())
        }
    }

    pub(super) fn set_state(&self, next: ConnectionState) {
        let changed = self.inner.state.send_if_modified(|state| {
            if *state == next || state.is_terminal() {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            tracing::debug!(state = %next, "Gateway state changed");
            self.notify(SessionNotice::StateChanged(next));
        }
    }

    fn notify(&self, notice: SessionNotice) {
        let _ = self.inner.notices.send(notice);
    }
}

impl std::fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession")
            .field("state", &self.state())
            .field("generation", &self.generation())
            .field("session_id", &self.session_id())
            .field("seq", &self.sequence())
            .finish()
    }
}
