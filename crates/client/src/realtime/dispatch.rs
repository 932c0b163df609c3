//! Typed fan-out of inbound events to registered handlers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use cribz_shared::{EventKind, RealtimeEvent};
use serde_json::Value;
use tokio::sync::broadcast;

use super::lifecycle::LifecycleEvent;
use crate::notify::BannerCenter;

pub type Handler = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;

/// One handler per event kind. Events without a handler are dropped.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<EventKind, Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`. Returns `true` if it replaced an
    /// earlier one.
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(&RealtimeEvent) + Send + Sync + 'static,
    ) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, Arc::new(handler))
            .is_some()
    }

    pub fn unsubscribe(&self, kind: EventKind) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind)
            .is_some()
    }

    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&kind)
    }

    /// Call the handler for this event's kind. Returns whether one ran.
    pub fn dispatch(&self, event: &RealtimeEvent) -> bool {
        // Clone out so a handler may (un)subscribe without deadlocking
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.kind())
            .cloned();
        match handler {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }
}

/// Receives everything the connection task produces.
pub(crate) struct Dispatcher {
    pub(crate) handlers: HandlerRegistry,
    pub(crate) banners: BannerCenter,
    pub(crate) lifecycle: broadcast::Sender<LifecycleEvent>,
}

impl Dispatcher {
    pub(crate) fn inbound(&self, name: &str, data: Value) {
        match RealtimeEvent::from_wire(name, data) {
            Some(event) => {
                if !self.handlers.dispatch(&event) {
                    tracing::debug!("No handler for '{}', dropping", name);
                }
            }
            None => tracing::debug!("Ignoring unknown realtime event '{}'", name),
        }
    }

    pub(crate) fn lifecycle(&self, event: LifecycleEvent) {
        match &event {
            LifecycleEvent::Connected => tracing::info!("Connected to notification system"),
            LifecycleEvent::ConnectError { message, .. } => {
                tracing::error!("Socket connection error: {}", message)
            }
            LifecycleEvent::ConnectRejected { message } => {
                tracing::error!("Socket connection rejected: {}", message)
            }
            LifecycleEvent::Disconnected { reason } => tracing::info!("Disconnected: {}", reason),
            LifecycleEvent::Reconnected { attempts } => {
                tracing::info!("Reconnected after {} attempts", attempts)
            }
            LifecycleEvent::ReconnectError { attempt, message } => {
                tracing::error!("Reconnection attempt {} failed: {}", attempt, message)
            }
            LifecycleEvent::ReconnectFailed { attempts } => {
                tracing::error!("Giving up after {} reconnection attempts", attempts)
            }
        }
        self.banners.show(event.banner());
        let _ = self.lifecycle.send(event);
    }
}
