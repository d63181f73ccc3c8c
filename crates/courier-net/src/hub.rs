//! ---
//! trk_section: "04-backend-of-record"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Backend of record for orders and live updates."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use courier_proto::{ClientCommand, ServerEvent};
use prometheus::{IntCounter, IntGauge, Registry};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Channel-hub health counters exposed at `/metrics`.
pub struct HubMetrics {
    pub active_connections: IntGauge,
    pub broadcast_events: IntCounter,
}

impl HubMetrics {
    /// Create the counters and register them with `registry`.
    pub fn register(registry: &Registry) -> anyhow::Result<Self> {
        let active_connections = IntGauge::new(
            "courier_channel_connections",
            "Number of live websocket channel connections",
        )?;
        let broadcast_events = IntCounter::new(
            "courier_broadcast_events_total",
            "Order update events published to the channel hub",
        )?;
        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(broadcast_events.clone()))?;
        Ok(Self {
            active_connections,
            broadcast_events,
        })
    }
}

/// Fans order update events out to connected clients. One broadcast feed;
/// each connection filters by its subscribed rooms before writing to the
/// socket, so lagging clients drop frames rather than block the feed.
#[derive(Clone)]
pub struct UpdateHub {
    tx: broadcast::Sender<ServerEvent>,
    metrics: Arc<HubMetrics>,
}

impl UpdateHub {
    pub fn new(capacity: usize, metrics: Arc<HubMetrics>) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, metrics }
    }

    /// Publish an event into its room. Returns the number of connections
    /// that will see it before filtering; zero subscribers is not an error.
    pub fn publish(&self, event: ServerEvent) -> usize {
        self.metrics.broadcast_events.inc();
        self.tx.send(event).unwrap_or(0)
    }

    fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Serve one upgraded channel connection until it closes.
    pub async fn client_loop(&self, mut socket: WebSocket) {
        let mut feed = self.subscribe();
        let mut rooms: HashSet<String> = HashSet::new();
        self.metrics.active_connections.inc();

        loop {
            tokio::select! {
                event = feed.recv() => {
                    let event = match event {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "channel client lagged behind; dropping frames");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };

                    if !rooms.contains(event.room()) {
                        continue;
                    }
                    let Ok(text) = serde_json::to_string(&event) else {
                        warn!("failed to serialise order update event");
                        continue;
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                message = socket.recv() => {
                    let Some(Ok(message)) = message else {
                        break;
                    };
                    match message {
                        Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(command) => handle_command(command, &mut rooms),
                            Err(err) => {
                                warn!(error = %err, "invalid channel command payload");
                                let _ = socket
                                    .send(Message::Text("{\"message\":\"invalid command\"}".into()))
                                    .await;
                            }
                        },
                        Message::Binary(_) => {
                            let _ = socket
                                .send(Message::Text("{\"message\":\"binary unsupported\"}".into()))
                                .await;
                        }
                        Message::Ping(payload) => {
                            if socket.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Message::Pong(_) => {}
                        Message::Close(_) => break,
                    }
                }
            }
        }

        self.metrics.active_connections.dec();
    }
}

fn handle_command(command: ClientCommand, rooms: &mut HashSet<String>) {
    match command {
        ClientCommand::Subscribe { order_id } => {
            debug!(order = %order_id, "channel client joined room");
            rooms.insert(order_id);
        }
        ClientCommand::Unsubscribe { order_id } => {
            debug!(order = %order_id, "channel client left room");
            rooms.remove(&order_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> UpdateHub {
        let registry = Registry::new();
        let metrics = HubMetrics::register(&registry).expect("metrics");
        UpdateHub::new(16, Arc::new(metrics))
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let hub = hub();
        let event = ServerEvent::OrderUpdate {
            data: sample_order("task-1"),
        };
        assert_eq!(hub.publish(event), 0);
        assert_eq!(hub.metrics.broadcast_events.get(), 1);
    }

    #[test]
    fn subscribe_and_unsubscribe_track_rooms() {
        let mut rooms = HashSet::new();
        handle_command(
            ClientCommand::Subscribe {
                order_id: "task-1".into(),
            },
            &mut rooms,
        );
        handle_command(
            ClientCommand::Subscribe {
                order_id: "task-1".into(),
            },
            &mut rooms,
        );
        assert_eq!(rooms.len(), 1, "repeated subscribe is idempotent");

        handle_command(
            ClientCommand::Unsubscribe {
                order_id: "task-1".into(),
            },
            &mut rooms,
        );
        assert!(rooms.is_empty());
    }

    fn sample_order(task_id: &str) -> courier_proto::Order {
        use chrono::Utc;
        courier_proto::Order {
            id: uuid::Uuid::nil(),
            task_id: task_id.into(),
            customer_info: courier_proto::CustomerInfo {
                name: "Asha".into(),
                email: "asha@example.com".into(),
                phone: "+91-000".into(),
                address: "Bhubaneswar".into(),
                latitude: 20.2961,
                longitude: 85.8245,
            },
            delivery_item: "Parcel".into(),
            preferred_time: Utc::now(),
            status: courier_proto::OrderStatus::Scheduled,
            location: None,
            agent_info: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
