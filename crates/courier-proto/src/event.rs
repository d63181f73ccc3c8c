//! ---
//! trk_section: "02-data-model-protocol"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Order schema, status transitions, and channel codecs."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use courier_common::geo::GeoPoint;
use serde::{Deserialize, Serialize};

use crate::order::Order;
use crate::status::OrderStatus;

/// Commands a viewer sends to the push channel after connecting.
/// Joining a room is idempotent; the server tolerates repeated subscribes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientCommand {
    #[serde(rename_all = "camelCase")]
    Subscribe { order_id: String },
    #[serde(rename_all = "camelCase")]
    Unsubscribe { order_id: String },
}

/// Events the server emits into an order's room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full order projection, emitted on every status or location change.
    OrderUpdate { data: Order },
}

impl ServerEvent {
    /// Room this event belongs to.
    pub fn room(&self) -> &str {
        match self {
            ServerEvent::OrderUpdate { data } => &data.task_id,
        }
    }

    /// Location derivation: present only when the payload carries one.
    pub fn agent_location_update(&self) -> Option<AgentLocationUpdate> {
        let ServerEvent::OrderUpdate { data } = self;
        data.location.map(|location| AgentLocationUpdate {
            order_id: data.task_id.clone(),
            location,
            observed_at: data.updated_at,
        })
    }

    /// Status derivation: always present.
    pub fn order_status_update(&self) -> OrderStatusUpdate {
        let ServerEvent::OrderUpdate { data } = self;
        OrderStatusUpdate {
            order_id: data.task_id.clone(),
            status: data.status,
            observed_at: data.updated_at,
        }
    }
}

/// Derived event delivered to location handlers before any status handler
/// sees the same inbound update.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentLocationUpdate {
    pub order_id: String,
    pub location: GeoPoint,
    pub observed_at: DateTime<Utc>,
}

/// Derived event delivered to status handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusUpdate {
    pub order_id: String,
    pub status: OrderStatus,
    pub observed_at: DateTime<Utc>,
}
