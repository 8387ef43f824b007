//! Intent-checked event router
//!
//! Handlers are registered per event name. Registration fails when the
//! session's intents can never deliver the event, so a misconfigured handler
//! is caught once at startup instead of silently never firing.

use super::{DispatchEvent, GatewayEventType};
use async_trait::async_trait;
use chat_core::Intents;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Something that consumes dispatch events
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: &DispatchEvent);
}

/// Adapter turning an async closure into an [`EventHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(DispatchEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    async fn handle(&self, event: &DispatchEvent) {
        (self.0)(event.clone()).await;
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(DispatchEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Registration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("{event} requires one of {required:?}, enabled intents are {enabled:?}")]
    IntentDisabled {
        event: GatewayEventType,
        required: Intents,
        enabled: Intents,
    },
}

/// Routes dispatch events to registered handlers by event name
pub struct EventRouter {
    intents: Intents,
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    catch_all: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventRouter {
    /// Create a router for a session identified with `intents`
    pub fn new(intents: Intents) -> Self {
        Self {
            intents,
            handlers: RwLock::new(HashMap::new()),
            catch_all: RwLock::new(Vec::new()),
        }
    }

    pub fn intents(&self) -> Intents {
        self.intents
    }

    /// Register a handler for one event type
    pub fn register(
        &self,
        event: GatewayEventType,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), RouterError> {
        let required = event.required_intents();
        if !self.intents.satisfies(required) {
            return Err(RouterError::IntentDisabled {
                event,
                required,
                enabled: self.intents,
            });
        }

        tracing::debug!(event = %event, "Registered event handler");
        self.handlers
            .write()
            .entry(event.as_str().to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    /// Register a handler by raw event name
    ///
    /// Known names are checked like [`register`](Self::register); unknown
    /// names are accepted as-is.
    pub fn register_named(
        &self,
        name: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), RouterError> {
        match GatewayEventType::from_str(name) {
            Some(event) => self.register(event, handler),
            None => {
                tracing::debug!(event = name, "Registered handler for unknown event");
                self.handlers
                    .write()
                    .entry(name.to_string())
                    .or_default()
                    .push(handler);
                Ok(())
            }
        }
    }

    /// Register a handler that receives every event
    pub fn register_all(&self, handler: Arc<dyn EventHandler>) {
        self.catch_all.write().push(handler);
    }

    /// Number of handlers that would receive an event named `name`
    pub fn handler_count(&self, name: &str) -> usize {
        let specific = self.handlers.read().get(name).map_or(0, Vec::len);
        specific + self.catch_all.read().len()
    }

    /// Deliver an event to its handlers, then to the catch-all handlers
    pub async fn route(&self, event: &DispatchEvent) {
        let targets: Vec<Arc<dyn EventHandler>> = {
            let handlers = self.handlers.read();
            let catch_all = self.catch_all.read();
            handlers
                .get(&event.name)
                .into_iter()
                .flatten()
                .chain(catch_all.iter())
                .cloned()
                .collect()
        };

        if targets.is_empty() {
            tracing::trace!(event = %event.name, "No handler for event");
            return;
        }

        for handler in targets {
            handler.handle(event).await;
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(Intents::DEFAULT)
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("intents", &self.intents)
            .field("events", &self.handlers.read().len())
            .field("catch_all", &self.catch_all.read().len())
            .finish()
    }
}
