//! ---
//! trk_section: "04-backend-of-record"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Backend of record for orders and live updates."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use std::collections::HashMap;

use chrono::Utc;
use courier_common::geo::GeoPoint;
use courier_proto::{next_status, ActorRole, CreateOrderRequest, Order, OrderStatus};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Mutation failures. Display text is the `message` clients surface
/// verbatim, so each variant reads as a complete sentence fragment.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(String),
    #[error("cannot move order from {from} to {to} as {role:?}")]
    IllegalTransition {
        from: OrderStatus,
        to: OrderStatus,
        role: ActorRole,
    },
    #[error("invalid location: {0}")]
    InvalidLocation(#[from] courier_common::GeoError),
}

/// Authoritative in-memory order state, keyed by public task id.
#[derive(Default)]
pub struct OrderStore {
    orders: RwLock<HashMap<String, Order>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an order in `Scheduled` with a freshly assigned task id.
    pub async fn create(&self, request: CreateOrderRequest) -> Order {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4().to_string(),
            customer_info: request.customer_info,
            delivery_item: request.delivery_item,
            preferred_time: request.preferred_time,
            status: OrderStatus::Scheduled,
            location: None,
            agent_info: None,
            created_at: now,
            updated_at: now,
        };
        info!(task_id = %order.task_id, "order created");
        self.orders
            .write()
            .await
            .insert(order.task_id.clone(), order.clone());
        order
    }

    pub async fn get(&self, task_id: &str) -> Result<Order, StoreError> {
        self.orders
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(task_id.to_owned()))
    }

    pub async fn list(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        orders
    }

    /// Record a reported agent position. Coordinates are re-validated so a
    /// hand-crafted payload cannot store an out-of-range point.
    pub async fn update_location(
        &self,
        task_id: &str,
        point: GeoPoint,
    ) -> Result<Order, StoreError> {
        let point = GeoPoint::new(point.latitude, point.longitude)?;
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_owned()))?;
        order.location = Some(point);
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    /// Advance the order's status, gated by the transition table for the
    /// acting role. The requested status must be exactly the legal next
    /// step; anything else leaves the order untouched.
    pub async fn update_status(
        &self,
        task_id: &str,
        requested: OrderStatus,
        role: ActorRole,
    ) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_owned()))?;
        if next_status(order.status, role) != Some(requested) {
            return Err(StoreError::IllegalTransition {
                from: order.status,
                to: requested,
                role,
            });
        }
        info!(task_id = %task_id, from = %order.status, to = %requested, "order status advanced");
        order.status = requested;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_proto::CustomerInfo;

    fn create_request() -> CreateOrderRequest {
        CreateOrderRequest {
            customer_info: CustomerInfo {
                name: "Asha".into(),
                email: "asha@example.com".into(),
                phone: "+91-000".into(),
                address: "Bhubaneswar".into(),
                latitude: 20.2961,
                longitude: 85.8245,
            },
            delivery_item: "Parcel".into(),
            preferred_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_assigns_task_id_and_scheduled_status() {
        let store = OrderStore::new();
        let order = store.create(create_request()).await;
        assert_eq!(order.status, OrderStatus::Scheduled);
        assert!(order.location.is_none());

        let fetched = store.get(&order.task_id).await.expect("fetch");
        assert_eq!(fetched, order);
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_order_reports_not_found_message() {
        let store = OrderStore::new();
        let err = store.get("missing").await.expect_err("not found");
        assert_eq!(err.to_string(), "order missing not found");
    }

    #[tokio::test]
    async fn location_updates_are_validated_and_timestamped() {
        let store = OrderStore::new();
        let order = store.create(create_request()).await;

        let point = GeoPoint::new(20.32, 85.81).expect("valid");
        let updated = store
            .update_location(&order.task_id, point)
            .await
            .expect("update");
        assert_eq!(updated.location, Some(point));
        assert!(updated.updated_at >= order.updated_at);

        let bogus = GeoPoint {
            latitude: 120.0,
            longitude: 85.81,
        };
        let err = store
            .update_location(&order.task_id, bogus)
            .await
            .expect_err("rejected");
        assert!(matches!(err, StoreError::InvalidLocation(_)));
    }

    #[tokio::test]
    async fn status_advances_only_along_role_table() {
        let store = OrderStore::new();
        let order = store.create(create_request()).await;
        let id = order.task_id.as_str();

        // Agent cannot touch a scheduled order.
        let err = store
            .update_status(id, OrderStatus::ReachedStore, ActorRole::Agent)
            .await
            .expect_err("agent blocked");
        assert!(err.to_string().contains("cannot move order"));

        // Dispatcher walks it to PickedUp, agent takes it from there.
        store
            .update_status(id, OrderStatus::ReachedStore, ActorRole::Dispatcher)
            .await
            .expect("dispatcher step");
        store
            .update_status(id, OrderStatus::PickedUp, ActorRole::Dispatcher)
            .await
            .expect("dispatcher step");
        store
            .update_status(id, OrderStatus::OutForDelivery, ActorRole::Agent)
            .await
            .expect("agent step");
        let delivered = store
            .update_status(id, OrderStatus::Delivered, ActorRole::Agent)
            .await
            .expect("agent step");
        assert_eq!(delivered.status, OrderStatus::Delivered);

        // Terminal: nothing moves a delivered order.
        let err = store
            .update_status(id, OrderStatus::Delivered, ActorRole::Agent)
            .await
            .expect_err("terminal");
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn skipping_a_step_is_rejected() {
        let store = OrderStore::new();
        let order = store.create(create_request()).await;
        let err = store
            .update_status(&order.task_id, OrderStatus::Delivered, ActorRole::Dispatcher)
            .await
            .expect_err("no skipping");
        assert!(matches!(
            err,
            StoreError::IllegalTransition {
                from: OrderStatus::Scheduled,
                to: OrderStatus::Delivered,
                ..
            }
        ));
    }
}
