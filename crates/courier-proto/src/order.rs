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
use uuid::Uuid;

use crate::status::OrderStatus;

/// Customer contact and drop-off location attached to an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
    /// Free-text address as entered or reverse-geocoded.
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl CustomerInfo {
    /// Drop-off coordinates as a validated point.
    pub fn location(&self) -> Result<GeoPoint, courier_common::GeoError> {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Courier assigned to an order, when one has been.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub name: String,
    pub phone: String,
}

/// Authoritative order projection, as owned by the backend of record and
/// pushed over the channel on every status or location change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Internal identifier.
    pub id: Uuid,
    /// Stable public identifier assigned at creation; used in URLs and as
    /// the channel room name.
    pub task_id: String,
    pub customer_info: CustomerInfo,
    pub delivery_item: String,
    pub preferred_time: DateTime<Utc>,
    pub status: OrderStatus,
    /// Last known agent position. Present only once an agent has reported
    /// at least one position for this order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_info: Option<AgentInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_info: CustomerInfo,
    pub delivery_item: String,
    pub preferred_time: DateTime<Utc>,
}

/// Body of `PATCH /orders/{taskId}/location` and of the simulation path
/// `PATCH /orders/{taskId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationPatch {
    pub location: GeoPoint,
}

/// Body of `PATCH /orders/{taskId}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPatch {
    pub status: OrderStatus,
}

/// Successful response envelope; mirrors the backend's `{ "data": ... }`
/// wrapping that clients have always unwrapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Error response body; `message` is surfaced verbatim to users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order {
            id: Uuid::nil(),
            task_id: "d8a6f7b1-4c1e-4b8a-9a9c-0c6a5d4e1f7c".into(),
            customer_info: CustomerInfo {
                name: "Asha".into(),
                email: "asha@example.com".into(),
                phone: "+91-000".into(),
                address: "Bhubaneswar, Odisha".into(),
                latitude: 20.2961,
                longitude: 85.8245,
            },
            delivery_item: "Parcel".into(),
            preferred_time: Utc::now(),
            status: OrderStatus::Scheduled,
            location: None,
            agent_info: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn order_serializes_camel_case_without_empty_location() {
        let order = sample_order();
        let value = serde_json::to_value(&order).expect("serialize");
        assert_eq!(value["taskId"], order.task_id);
        assert_eq!(value["customerInfo"]["latitude"], 20.2961);
        assert_eq!(value["status"], "Scheduled");
        assert!(value.get("location").is_none());
        assert!(value.get("agentInfo").is_none());
    }

    #[test]
    fn location_appears_once_reported() {
        let mut order = sample_order();
        order.location = Some(GeoPoint::new(20.3, 85.82).expect("valid"));
        let value = serde_json::to_value(&order).expect("serialize");
        assert_eq!(value["location"]["latitude"], 20.3);
    }

    #[test]
    fn customer_location_validates_ranges() {
        let mut order = sample_order();
        assert!(order.customer_info.location().is_ok());
        order.customer_info.latitude = 120.0;
        assert!(order.customer_info.location().is_err());
    }
}
