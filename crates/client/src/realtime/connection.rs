//! Realtime connection with state management and auto-reconnect.

use std::sync::Arc;
use std::time::Duration;

use cribz_shared::{ClientAction, Frame, Handshake};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::dispatch::Dispatcher;
use super::lifecycle::LifecycleEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state for the realtime channel
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff (1.0 = fixed delay)
    pub backoff_multiplier: f32,
    /// Time allowed for the socket upgrade plus namespace handshake
    pub connect_timeout_ms: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_multiplier: 1.0,
            connect_timeout_ms: 20000,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }

    fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(u64::from(self.delay_for_attempt(attempt)))
    }
}

/// Handle for sending actions through the realtime connection
#[derive(Clone)]
pub struct ChannelHandle {
    sender: UnboundedSender<Frame>,
    state: watch::Receiver<ConnectionState>,
    abort: AbortHandle,
    pub url: String,
}

impl ChannelHandle {
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Receiver that observes every state transition.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Queue an action for the server
    pub fn send(&self, action: &ClientAction) -> Result<(), String> {
        tracing::debug!("Emitting '{}'", action.event_name());
        self.sender
            .unbounded_send(Frame::event(action.event_name(), action.payload()))
            .map_err(|e| format!("Failed to send: {}", e))
    }

    pub(crate) fn shutdown(&self) {
        self.abort.abort();
    }
}

enum ConnectFailure {
    /// The server refused the namespace connect. Never retried.
    Rejected(String),
    Transport(String),
}

enum DisconnectReason {
    ServerDisconnect,
    ClientDisconnect,
    TransportClose,
    TransportError(String),
    PingTimeout,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ServerDisconnect => f.write_str("io server disconnect"),
            DisconnectReason::ClientDisconnect => f.write_str("io client disconnect"),
            DisconnectReason::TransportClose => f.write_str("transport close"),
            DisconnectReason::TransportError(e) => write!(f, "transport error: {}", e),
            DisconnectReason::PingTimeout => f.write_str("ping timeout"),
        }
    }
}

/// Start the connection task. The dispatcher is wired before the first
/// frame is read.
pub(crate) fn spawn(
    url: Url,
    token: String,
    config: ReconnectConfig,
    dispatcher: Arc<Dispatcher>,
) -> ChannelHandle {
    let (sender, receiver) = unbounded();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let task = tokio::spawn(run(url.clone(), token, config, dispatcher, state_tx, receiver));

    ChannelHandle {
        sender,
        state: state_rx,
        abort: task.abort_handle(),
        url: url.to_string(),
    }
}

async fn run(
    url: Url,
    token: String,
    config: ReconnectConfig,
    dispatcher: Arc<Dispatcher>,
    state: watch::Sender<ConnectionState>,
    mut outbound: UnboundedReceiver<Frame>,
) {
    let host = url.host_str().unwrap_or_default().to_string();
    let mut attempt = 0u32;

    loop {
        if attempt == 0 {
            state.send_replace(ConnectionState::Connecting);
        } else {
            state.send_replace(ConnectionState::Reconnecting { attempt });
        }

        match handshake(&url, &token, &config).await {
            Ok((ws, open)) => {
                state.send_replace(ConnectionState::Connected);
                tracing::info!("Realtime connected to {} (sid {})", host, open.sid);
                dispatcher.lifecycle(LifecycleEvent::Connected);
                if attempt > 0 {
                    dispatcher.lifecycle(LifecycleEvent::Reconnected { attempts: attempt });
                }
                attempt = 0;

                let reason = pump(ws, &open, &mut outbound, &dispatcher).await;
                state.send_replace(ConnectionState::Disconnected);
                dispatcher.lifecycle(LifecycleEvent::Disconnected {
                    reason: reason.to_string(),
                });

                if matches!(
                    reason,
                    DisconnectReason::ServerDisconnect | DisconnectReason::ClientDisconnect
                ) {
                    break;
                }
                tokio::time::sleep(config.delay(0)).await;
                attempt = 1;
            }
            Err(ConnectFailure::Rejected(message)) => {
                dispatcher.lifecycle(LifecycleEvent::rejected(message.clone()));
                state.send_replace(ConnectionState::Failed { reason: message });
                break;
            }
            Err(ConnectFailure::Transport(message)) => {
                if attempt == 0 {
                    dispatcher.lifecycle(LifecycleEvent::connect_error(message));
                } else {
                    dispatcher.lifecycle(LifecycleEvent::ReconnectError { attempt, message });
                }

                if config.max_attempts > 0 && attempt >= config.max_attempts {
                    dispatcher.lifecycle(LifecycleEvent::ReconnectFailed { attempts: attempt });
                    state.send_replace(ConnectionState::Failed {
                        reason: format!(
                            "Max reconnect attempts ({}) exceeded",
                            config.max_attempts
                        ),
                    });
                    break;
                }

                let delay = config.delay(attempt);
                tracing::info!(
                    "Reconnecting to {} in {:?} (attempt {})",
                    host,
                    delay,
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

async fn handshake(
    url: &Url,
    token: &str,
    config: &ReconnectConfig,
) -> Result<(WsStream, Handshake), ConnectFailure> {
    let limit = Duration::from_millis(u64::from(config.connect_timeout_ms));
    match tokio::time::timeout(limit, open_namespace(url, token)).await {
        Ok(result) => result,
        Err(_) => Err(ConnectFailure::Transport("connection timed out".to_string())),
    }
}

/// WebSocket upgrade, engine open, then namespace connect carrying the token.
async fn open_namespace(url: &Url, token: &str) -> Result<(WsStream, Handshake), ConnectFailure> {
    let (mut ws, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| ConnectFailure::Transport(e.to_string()))?;

    let open = match next_frame(&mut ws).await? {
        Frame::Open(open) => open,
        other => {
            return Err(ConnectFailure::Transport(format!(
                "expected open packet, got {:?}",
                other
            )))
        }
    };

    send_frame(&mut ws, &Frame::connect_with_token(token)).await?;

    loop {
        match next_frame(&mut ws).await? {
            Frame::Connect(_) => return Ok((ws, open)),
            Frame::ConnectError(message) => return Err(ConnectFailure::Rejected(message)),
            Frame::Ping => send_frame(&mut ws, &Frame::Pong).await?,
            Frame::Close => {
                return Err(ConnectFailure::Transport(
                    "connection closed during handshake".to_string(),
                ))
            }
            _ => {}
        }
    }
}

async fn send_frame(ws: &mut WsStream, frame: &Frame) -> Result<(), ConnectFailure> {
    ws.send(Message::text(frame.encode()))
        .await
        .map_err(|e| ConnectFailure::Transport(e.to_string()))
}

async fn next_frame(ws: &mut WsStream) -> Result<Frame, ConnectFailure> {
    while let Some(msg) = ws.next().await {
        match msg.map_err(|e| ConnectFailure::Transport(e.to_string()))? {
            Message::Text(text) => match Frame::parse(text.as_str()) {
                Ok(frame) => return Ok(frame),
                Err(e) => tracing::warn!("Skipping malformed frame: {}", e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(ConnectFailure::Transport(
        "connection closed during handshake".to_string(),
    ))
}

/// When silence means the link is dead: the server pings every
/// `ping_interval`, so nothing heard for interval + timeout is fatal.
/// `None` when the server advertised no heartbeat or the window is too
/// large to represent.
fn liveness_deadline(open: &Handshake, last_seen: Instant) -> Option<Instant> {
    match open.ping_interval.saturating_add(open.ping_timeout) {
        0 => None,
        ms => last_seen.checked_add(Duration::from_millis(ms)),
    }
}

/// Shuttle frames until the connection ends.
async fn pump(
    ws: WsStream,
    open: &Handshake,
    outbound: &mut UnboundedReceiver<Frame>,
    dispatcher: &Dispatcher,
) -> DisconnectReason {
    let (mut write, mut read) = ws.split();

    let mut last_seen = Instant::now();

    loop {
        let deadline = liveness_deadline(open, last_seen);
        tokio::select! {
            msg = read.next() => {
                last_seen = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => match Frame::parse(text.as_str()) {
                        Ok(Frame::Ping) => {
                            if let Err(e) = write.send(Message::text(Frame::Pong.encode())).await {
                                return DisconnectReason::TransportError(e.to_string());
                            }
                        }
                        Ok(Frame::Event { name, data }) => dispatcher.inbound(&name, data),
                        Ok(Frame::Disconnect) => return DisconnectReason::ServerDisconnect,
                        Ok(Frame::Close) => return DisconnectReason::TransportClose,
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Skipping malformed frame: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => return DisconnectReason::TransportClose,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return DisconnectReason::TransportError(e.to_string()),
                }
            }
            frame = outbound.next() => match frame {
                Some(frame) => {
                    let text = frame.encode();
                    tracing::debug!("Sending {}", text);
                    if let Err(e) = write.send(Message::text(text)).await {
                        return DisconnectReason::TransportError(e.to_string());
                    }
                }
                None => {
                    let _ = write.send(Message::text(Frame::Disconnect.encode())).await;
                    return DisconnectReason::ClientDisconnect;
                }
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or(last_seen)), if deadline.is_some() => {
                return DisconnectReason::PingTimeout;
            }
        }
    }
}
