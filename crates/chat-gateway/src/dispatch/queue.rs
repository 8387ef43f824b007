//! Dispatch queue
//!
//! Delivers events to the router in receive order. With the deferring policy,
//! events that arrive while REST requests are in flight are parked and a
//! periodic drain step delivers them once the client is idle again.

use super::{DispatchEvent, EventRouter};
use chat_core::InFlight;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Delivery policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Deliver as soon as an event arrives
    #[default]
    Immediate,
    /// Park events while any REST request is in flight
    DeferWhileRestInFlight,
}

/// Ordered event delivery with optional deferral
pub struct DispatchQueue {
    policy: DispatchPolicy,
    in_flight: InFlight,
    pending: Mutex<VecDeque<DispatchEvent>>,
    /// Held while delivering so inline delivery never overtakes the drain
    delivery: tokio::sync::Mutex<()>,
    router: Arc<EventRouter>,
}

impl DispatchQueue {
    pub fn new(policy: DispatchPolicy, in_flight: InFlight, router: Arc<EventRouter>) -> Self {
        Self {
            policy,
            in_flight,
            pending: Mutex::new(VecDeque::new()),
            delivery: tokio::sync::Mutex::new(()),
            router,
        }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Events waiting for delivery
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    fn should_defer(&self) -> bool {
        match self.policy {
            DispatchPolicy::Immediate => false,
            DispatchPolicy::DeferWhileRestInFlight => {
                !self.in_flight.is_idle() || !self.pending.lock().is_empty()
            }
        }
    }

    /// Accept one event from the gateway
    pub async fn push(&self, event: DispatchEvent) {
        if self.should_defer() {
            let depth = {
                let mut pending = self.pending.lock();
                pending.push_back(event);
                pending.len()
            };
            tracing::trace!(depth, in_flight = self.in_flight.count(), "Deferred dispatch event");
            return;
        }

        let _delivery = self.delivery.lock().await;
        // Events parked while we waited for the lock go first
        {
            let mut pending = self.pending.lock();
            if !pending.is_empty() {
                pending.push_back(event);
                return;
            }
        }
        self.router.route(&event).await;
    }

    /// Deliver parked events while no REST request is in flight
    ///
    /// Returns the number of events delivered.
    pub async fn drain_once(&self) -> usize {
        let _delivery = self.delivery.lock().await;
        let mut delivered = 0;
        while self.in_flight.is_idle() {
            let Some(event) = self.pending.lock().pop_front() else {
                break;
            };
            self.router.route(&event).await;
            delivered += 1;
        }
        if delivered > 0 {
            tracing::trace!(delivered, remaining = self.len(), "Drained dispatch queue");
        }
        delivered
    }

    /// Run the drain step every `interval` until cancelled
    pub fn spawn_drain(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if !queue.is_empty() {
                    queue.drain_once().await;
                }
            }
        })
    }

    /// Pump events from the gateway into the queue until the channel closes
    pub fn spawn_pump(
        self: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<DispatchEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                queue.push(event).await;
            }
            tracing::debug!(pending = queue.len(), "Dispatch pump stopped");
        })
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("policy", &self.policy)
            .field("pending", &self.len())
            .field("in_flight", &self.in_flight.count())
            .finish()
    }
}
