//! Realtime push channel.
//!
//! One authenticated, auto-reconnecting connection per [`RealtimeChannel`].
//! Inbound events fan out to at most one handler per [`EventKind`];
//! connection lifecycle changes become banners and [`LifecycleEvent`]s.
//!
//! # Usage
//!
//! ```rust,ignore
//! channel.subscribe(EventKind::NewMessage, |event| {
//!     if let RealtimeEvent::NewMessage(message) = event {
//!         render(message);
//!     }
//! });
//! channel.open(&token);
//! channel.send_typing_start("user-42");
//! ```

mod connection;
mod dispatch;
mod lifecycle;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cribz_shared::{BookingNotice, ChatMessage, ClientAction, EventKind, RealtimeEvent};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use url::Url;

pub use connection::{ChannelHandle, ConnectionState, ReconnectConfig};
pub use dispatch::{Handler, HandlerRegistry};
pub use lifecycle::{is_auth_rejection, LifecycleEvent};

use crate::notify::{Banner, BannerCenter};
use dispatch::Dispatcher;

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Socket.IO WebSocket endpoint, or why one could not be built.
    pub endpoint: Result<Url, String>,
    pub reconnect: ReconnectConfig,
    /// Only `wss://` endpoints are accepted when set.
    pub require_secure: bool,
}

pub struct RealtimeChannel {
    config: RealtimeConfig,
    dispatcher: Arc<Dispatcher>,
    connection: Mutex<Option<ChannelHandle>>,
}

impl RealtimeChannel {
    pub fn new(config: RealtimeConfig, banners: BannerCenter) -> Self {
        let (lifecycle, _) = broadcast::channel(32);
        Self {
            config,
            dispatcher: Arc::new(Dispatcher {
                handlers: HandlerRegistry::new(),
                banners,
                lifecycle,
            }),
            connection: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ChannelHandle>> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the connection with `token` as the handshake credential.
    ///
    /// Does nothing if a connection already exists. Must be called from
    /// within a tokio runtime.
    pub fn open(&self, token: &str) {
        let mut slot = self.slot();
        if slot.is_some() {
            tracing::info!("Realtime connection already exists");
            return;
        }

        let url = match &self.config.endpoint {
            Ok(url) => url.clone(),
            Err(e) => {
                tracing::error!("Invalid realtime endpoint: {}", e);
                return;
            }
        };
        if self.config.require_secure && url.scheme() != "wss" {
            tracing::error!("Refusing insecure realtime endpoint {}", url);
            self.dispatcher
                .banners
                .show(Banner::error("Connection error: secure connection required"));
            return;
        }

        tracing::info!("Opening realtime connection to {}", url);
        *slot = Some(connection::spawn(
            url,
            token.to_string(),
            self.config.reconnect.clone(),
            self.dispatcher.clone(),
        ));
    }

    /// The current connection handle, if `open` has been called.
    pub fn connection(&self) -> Option<ChannelHandle> {
        self.slot().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.slot()
            .as_ref()
            .map(ChannelHandle::state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn watch_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.slot().as_ref().map(ChannelHandle::watch)
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Stop the connection task and forget the handle.
    pub fn close(&self) {
        if let Some(handle) = self.slot().take() {
            tracing::info!("Closing realtime connection");
            handle.shutdown();
        }
    }

    // --- Handlers ---

    /// Register the handler for `kind`, replacing any earlier one.
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(&RealtimeEvent) + Send + Sync + 'static,
    ) -> bool {
        self.dispatcher.handlers.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, kind: EventKind) -> bool {
        self.dispatcher.handlers.unsubscribe(kind)
    }

    pub fn on_new_message(&self, handler: impl Fn(&ChatMessage) + Send + Sync + 'static) -> bool {
        self.subscribe(EventKind::NewMessage, move |event| {
            if let RealtimeEvent::NewMessage(message) = event {
                handler(message);
            }
        })
    }

    pub fn on_new_booking(&self, handler: impl Fn(&BookingNotice) + Send + Sync + 'static) -> bool {
        self.subscribe(EventKind::NewBooking, move |event| {
            if let RealtimeEvent::NewBooking(booking) = event {
                handler(booking);
            }
        })
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.dispatcher.lifecycle.subscribe()
    }

    // --- Outbound ---

    fn emit(&self, action: ClientAction) -> bool {
        let Some(handle) = self.connection().filter(ChannelHandle::is_connected) else {
            tracing::debug!("Not connected, dropping '{}'", action.event_name());
            return false;
        };
        match handle.send(&action) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }

    /// Fire-and-forget. Returns `false` without sending when disconnected.
    pub fn send_message(&self, receiver_id: &str, message: Value) -> bool {
        self.emit(ClientAction::SendMessage {
            receiver_id: receiver_id.to_string(),
            message,
        })
    }

    pub fn mark_read(&self, conversation_id: &str, message_id: &str) {
        self.emit(ClientAction::MarkRead {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
        });
    }

    pub fn send_typing_start(&self, receiver_id: &str) {
        self.emit(ClientAction::TypingStart {
            receiver_id: receiver_id.to_string(),
        });
    }

    pub fn send_typing_end(&self, receiver_id: &str) {
        self.emit(ClientAction::TypingEnd {
            receiver_id: receiver_id.to_string(),
        });
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(endpoint: &str, require_secure: bool) -> (RealtimeChannel, BannerCenter) {
        let banners = BannerCenter::new();
        let config = RealtimeConfig {
            endpoint: Url::parse(endpoint).map_err(|e| e.to_string()),
            reconnect: ReconnectConfig::default(),
            require_secure,
        };
        (RealtimeChannel::new(config, banners.clone()), banners)
    }

    #[test]
    fn outbound_actions_are_noops_before_open() {
        let (channel, _) = channel("wss://push.cribz.test/socket.io/", true);
        assert!(channel.connection().is_none());
        assert!(!channel.send_message("u2", serde_json::json!({"content": "hi"})));
        channel.mark_read("c1", "m1");
        channel.send_typing_start("u2");
        channel.send_typing_end("u2");
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn insecure_endpoint_is_refused_when_secure_required() {
        let (channel, banners) = channel("ws://127.0.0.1:9/socket.io/", true);
        channel.open("tok");
        assert!(channel.connection().is_none());
        assert_eq!(
            banners.active()[0].message,
            "Connection error: secure connection required"
        );
    }

    #[test]
    fn typed_helpers_register_under_their_kind() {
        let (channel, _) = channel("wss://push.cribz.test/socket.io/", true);
        assert!(!channel.on_new_message(|_| {}));
        assert!(!channel.on_new_booking(|_| {}));
        assert!(channel.unsubscribe(EventKind::NewMessage));
        assert!(channel.unsubscribe(EventKind::NewBooking));
        assert!(!channel.unsubscribe(EventKind::UserOnline));
    }
}
