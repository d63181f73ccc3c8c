//! ---
//! trk_section: "03-live-tracking"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Client-side tracking core for live delivery views."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_common::config::ChannelConfig;
use courier_proto::{AgentLocationUpdate, ClientCommand, Order, OrderStatusUpdate, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

/// Connection lifecycle as observed by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect attempts exhausted; stays here until the consumer tears
    /// the client down and re-creates it.
    Offline,
}

/// Handlers invoked by the channel read loop. Register once, before
/// `connect`. For every inbound order update the full projection handler
/// fires first, then the location derivation (only when the payload
/// carries one), then the status derivation — location before status, so
/// consumers can move the marker before reacting to a status that might
/// hide it.
#[derive(Default)]
pub struct ChannelHandlers {
    on_connect: Option<Box<dyn Fn() + Send + Sync>>,
    on_disconnect: Option<Box<dyn Fn() + Send + Sync>>,
    on_offline: Option<Box<dyn Fn() + Send + Sync>>,
    on_order_update: Option<Box<dyn Fn(Order) + Send + Sync>>,
    on_agent_location_update: Option<Box<dyn Fn(AgentLocationUpdate) + Send + Sync>>,
    on_order_status_update: Option<Box<dyn Fn(OrderStatusUpdate) + Send + Sync>>,
}

impl ChannelHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Box::new(f));
        self
    }

    pub fn on_disconnect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Box::new(f));
        self
    }

    /// Fired once when automatic reconnection gives up.
    pub fn on_offline(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_offline = Some(Box::new(f));
        self
    }

    pub fn on_order_update(mut self, f: impl Fn(Order) + Send + Sync + 'static) -> Self {
        self.on_order_update = Some(Box::new(f));
        self
    }

    pub fn on_agent_location_update(
        mut self,
        f: impl Fn(AgentLocationUpdate) + Send + Sync + 'static,
    ) -> Self {
        self.on_agent_location_update = Some(Box::new(f));
        self
    }

    pub fn on_order_status_update(
        mut self,
        f: impl Fn(OrderStatusUpdate) + Send + Sync + 'static,
    ) -> Self {
        self.on_order_status_update = Some(Box::new(f));
        self
    }

    fn dispatch(&self, event: &ServerEvent) {
        let location = event.agent_location_update();
        let status = event.order_status_update();
        if let Some(handler) = &self.on_order_update {
            let ServerEvent::OrderUpdate { data } = event;
            handler(data.clone());
        }
        if let Some(update) = location {
            if let Some(handler) = &self.on_agent_location_update {
                handler(update);
            }
        }
        if let Some(handler) = &self.on_order_status_update {
            handler(status);
        }
    }
}

struct Connection {
    shutdown: watch::Sender<bool>,
    outbound: mpsc::UnboundedSender<ClientCommand>,
    task: JoinHandle<()>,
}

/// Maintains one logical push-channel connection per mounted tracking view,
/// scoped to a single order room, with bounded reconnection.
pub struct ChannelClient {
    config: ChannelConfig,
    order_id: String,
    handlers: Arc<ChannelHandlers>,
    connection: Mutex<Option<Connection>>,
    status_tx: watch::Sender<ConnectionStatus>,
}

/// Delay before reconnect attempt `attempt` (zero-based): the initial
/// backoff doubled per attempt. With the default 1 s base the schedule is
/// 1s, 2s, 4s, 8s, 16s.
pub fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    initial.saturating_mul(2u32.saturating_pow(attempt))
}

impl ChannelClient {
    pub fn new(config: ChannelConfig, order_id: impl Into<String>, handlers: ChannelHandlers) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            config,
            order_id: order_id.into(),
            handlers: Arc::new(handlers),
            connection: Mutex::new(None),
            status_tx,
        }
    }

    /// Watch the connection lifecycle.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Open the connection and join the order's room. Calling `connect`
    /// while a connection is live is a no-op: exactly one join request is
    /// issued per logical connection.
    pub fn connect(&self) {
        let mut connection = self.connection.lock().expect("channel state poisoned");
        if let Some(existing) = connection.as_ref() {
            if !existing.task.is_finished() {
                debug!(order = %self.order_id, "channel already connected; connect ignored");
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_channel(
            self.config.clone(),
            self.order_id.clone(),
            self.handlers.clone(),
            self.status_tx.clone(),
            outbound_rx,
            shutdown_rx,
        ));
        *connection = Some(Connection {
            shutdown: shutdown_tx,
            outbound: outbound_tx,
            task,
        });
    }

    /// Queue a command for the server. Returns false when no connection is
    /// live, mirroring a closed socket's send result.
    pub fn send(&self, command: ClientCommand) -> bool {
        let connection = self.connection.lock().expect("channel state poisoned");
        match connection.as_ref() {
            Some(conn) if !conn.task.is_finished() => conn.outbound.send(command).is_ok(),
            _ => false,
        }
    }

    /// Cancel any pending reconnect timer and close the connection. Safe to
    /// call when already disconnected.
    pub async fn disconnect(&self) {
        let connection = self
            .connection
            .lock()
            .expect("channel state poisoned")
            .take();
        if let Some(connection) = connection {
            let _ = connection.shutdown.send(true);
            if let Err(err) = connection.task.await {
                if !err.is_cancelled() {
                    warn!(order = %self.order_id, error = %err, "channel task ended abnormally");
                }
            }
        }
        self.status_tx.send_replace(ConnectionStatus::Disconnected);
    }
}

async fn run_channel(
    config: ChannelConfig,
    order_id: String,
    handlers: Arc<ChannelHandlers>,
    status_tx: watch::Sender<ConnectionStatus>,
    mut outbound: mpsc::UnboundedReceiver<ClientCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut reconnect_attempts: u32 = 0;

    loop {
        status_tx.send_replace(ConnectionStatus::Connecting);
        let stream = tokio::select! {
            _ = shutdown.changed() => return,
            result = connect_async(config.url.as_str()) => result,
        };

        match stream {
            Ok((mut socket, _response)) => {
                reconnect_attempts = 0;
                status_tx.send_replace(ConnectionStatus::Connected);
                info!(order = %order_id, url = %config.url, "channel connected");

                // Join the order room immediately so the server scopes
                // relayed events to this order.
                let join = ClientCommand::Subscribe {
                    order_id: order_id.clone(),
                };
                if let Ok(text) = serde_json::to_string(&join) {
                    if socket.send(Message::Text(text)).await.is_err() {
                        warn!(order = %order_id, "failed to send join request");
                    }
                }
                if let Some(handler) = &handlers.on_connect {
                    handler();
                }

                let clean_shutdown =
                    read_loop(&mut socket, &handlers, &mut outbound, &mut shutdown).await;
                let _ = socket.close(None).await;
                if clean_shutdown {
                    status_tx.send_replace(ConnectionStatus::Disconnected);
                    return;
                }
                if let Some(handler) = &handlers.on_disconnect {
                    handler();
                }
            }
            Err(err) => {
                debug!(order = %order_id, error = %err, "channel connect failed");
                if let Some(handler) = &handlers.on_disconnect {
                    handler();
                }
            }
        }

        // Unexpected disconnect: exponential backoff, bounded attempts.
        if reconnect_attempts >= config.max_reconnect_attempts {
            warn!(order = %order_id, attempts = reconnect_attempts, "reconnect attempts exhausted; channel offline");
            status_tx.send_replace(ConnectionStatus::Offline);
            if let Some(handler) = &handlers.on_offline {
                handler();
            }
            return;
        }
        let delay = backoff_delay(config.initial_backoff, reconnect_attempts);
        reconnect_attempts += 1;
        debug!(order = %order_id, attempt = reconnect_attempts, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Pump the socket until it closes. Returns true when the consumer asked
/// for teardown (no reconnect wanted).
async fn read_loop(
    socket: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
              + SinkExt<Message>
              + Unpin),
    handlers: &ChannelHandlers,
    outbound: &mut mpsc::UnboundedReceiver<ClientCommand>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return true,
            command = outbound.recv() => {
                let Some(command) = command else { return true };
                let Ok(text) = serde_json::to_string(&command) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    return false;
                }
            }
            message = socket.next() => {
                let Some(Ok(message)) = message else { return false };
                match message {
                    Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => handlers.dispatch(&event),
                        Err(err) => warn!(error = %err, "unparseable channel event dropped"),
                    },
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            return false;
                        }
                    }
                    Message::Close(_) => return false,
                    Message::Binary(_) | Message::Pong(_) | Message::Frame(_) => {}
                }
            }
        }
    }
}
