//! Client handle
//!
//! [`Client`] owns one REST client, one gateway session and the dispatch queue
//! between them. It is threaded through explicitly; there is no global client.

use crate::error::{ClientError, ClientResult};
use chat_common::{ClientConfig, Supervisor, SupervisorReceiver, SupervisorSignal};
use chat_core::InFlight;
use chat_gateway::protocol::ClientCloseReason;
use chat_gateway::{
    DispatchPolicy, DispatchQueue, EventHandler, EventRouter, GatewayEventType, GatewaySession,
};
use chat_rest::RestClient;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long `shutdown` waits for the background tasks
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Builder for [`Client`]
///
/// Handlers are validated against the configured intents as they are added.
#[derive(Debug)]
pub struct ClientBuilder {
    config: ClientConfig,
    router: EventRouter,
    supervisor: Option<Supervisor>,
    gateway_url: Option<String>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        let router = EventRouter::new(config.gateway.intents);
        Self {
            config,
            router,
            supervisor: None,
            gateway_url: None,
        }
    }

    /// Handle one event type
    ///
    /// Fails if the event needs an intent the session will not identify with.
    pub fn on(self, event: GatewayEventType, handler: Arc<dyn EventHandler>) -> ClientResult<Self> {
        self.router.register(event, handler)?;
        Ok(self)
    }

    /// Handle an event by its raw name
    pub fn on_named(self, name: &str, handler: Arc<dyn EventHandler>) -> ClientResult<Self> {
        self.router.register_named(name, handler)?;
        Ok(self)
    }

    /// Handle every event
    #[must_use]
    pub fn on_any(self, handler: Arc<dyn EventHandler>) -> Self {
        self.router.register_all(handler);
        self
    }

    /// Report fatal conditions to an existing supervisor
    ///
    /// Without one, the client creates its own and hands out the receiver via
    /// [`Client::take_supervisor_receiver`].
    #[must_use]
    pub fn supervisor(mut self, supervisor: Supervisor) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Skip gateway discovery and connect here
    #[must_use]
    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    /// Wire the client together
    ///
    /// Looks up the gateway URL over REST unless one was configured. Starts
    /// the dispatch tasks but does not connect.
    pub async fn build(self) -> ClientResult<Client> {
        let Self {
            config,
            router,
            supervisor,
            gateway_url,
        } = self;

        let (supervisor, supervisor_rx) = match supervisor {
            Some(supervisor) => (supervisor, None),
            None => {
                let (supervisor, rx) = Supervisor::channel();
                (supervisor, Some(rx))
            }
        };

        let in_flight = InFlight::new();
        let rest = RestClient::new(
            config.rest.clone(),
            &config.token,
            in_flight.clone(),
            supervisor.clone(),
        )?;

        let url = match gateway_url.or_else(|| config.gateway.url.clone()) {
            Some(url) => url,
            None => rest.gateway_url().await?,
        };

        let (gateway, dispatch_rx) = GatewaySession::new(
            config.gateway.clone(),
            config.token.clone(),
            url,
            supervisor.clone(),
        );

        let policy = if config.dispatch.defer_while_rest {
            DispatchPolicy::DeferWhileRestInFlight
        } else {
            DispatchPolicy::Immediate
        };
        let queue = Arc::new(DispatchQueue::new(policy, in_flight, Arc::new(router)));

        let cancel = CancellationToken::new();
        let mut tasks = vec![queue.spawn_pump(dispatch_rx, cancel.child_token())];
        if policy == DispatchPolicy::DeferWhileRestInFlight {
            tasks.push(queue.spawn_drain(config.dispatch.drain_interval, cancel.child_token()));
        }

        tracing::info!(
            app = %config.app.name,
            intents = ?config.gateway.intents,
            policy = ?policy,
            gateway = %gateway.bootstrap_url(),
            "Client ready"
        );

        Ok(Client {
            config,
            rest,
            gateway,
            queue,
            supervisor,
            supervisor_rx: Mutex::new(supervisor_rx),
            cancel,
            tasks: Mutex::new(tasks),
        })
    }
}

/// A connected-or-connectable client
pub struct Client {
    config: ClientConfig,
    rest: RestClient,
    gateway: GatewaySession,
    queue: Arc<DispatchQueue>,
    supervisor: Supervisor,
    supervisor_rx: Mutex<Option<SupervisorReceiver>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Client {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn gateway(&self) -> &GatewaySession {
        &self.gateway
    }

    pub fn dispatch(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// The receiver for supervisor signals, if the client created it
    ///
    /// Returns `None` after the first call or when a supervisor was supplied.
    pub fn take_supervisor_receiver(&self) -> Option<SupervisorReceiver> {
        self.supervisor_rx.lock().take()
    }

    /// Connect the gateway session
    pub async fn connect(&self) -> ClientResult<()> {
        self.gateway.connect().await.map_err(ClientError::from)
    }

    /// Run until the supervisor is signalled or Ctrl+C is pressed
    ///
    /// Ctrl+C terminates the session, which produces the `Exit` signal.
    pub async fn run_until_signal(&self, signals: &mut SupervisorReceiver) -> SupervisorSignal {
        let interrupted = tokio::select! {
            signal = signals.recv() => match signal {
                Some(signal) => return signal,
                None => false,
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
                }
                true
            }
        };

        if interrupted {
            tracing::info!("Interrupted, shutting down");
        }
        self.shutdown().await;
        signals.recv().await.unwrap_or_else(|| SupervisorSignal::Exit {
            reason: "supervisor channel closed".to_string(),
        })
    }

    /// Disconnect without ending the client; the session can be resumed
    pub async fn disconnect(&self) {
        self.gateway.disconnect(ClientCloseReason::Reconnecting).await;
    }

    /// Terminate the session and stop the dispatch tasks
    pub async fn shutdown(&self) {
        self.gateway.terminate().await;
        self.cancel.cancel();

        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, task).await.is_err() {
                tracing::warn!("Dispatch task did not stop in time");
            }
        }
        tracing::info!(pending = self.queue.len(), "Client shut down");
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("gateway", &self.gateway)
            .field("rest", &self.rest)
            .field("dispatch", &self.queue)
            .finish()
    }
}
