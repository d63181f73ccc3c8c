//! ---
//! trk_section: "02-data-model-protocol"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Order schema, status transitions, and channel codecs."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Lifecycle status of an order. The declaration order is the canonical
/// forward progression; `Ord` reflects it so callers can compare stages.
/// Wire labels are the human-readable strings the backend has always used.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum OrderStatus {
    #[default]
    Scheduled,
    #[serde(rename = "Reached Store")]
    ReachedStore,
    #[serde(rename = "Picked Up")]
    PickedUp,
    #[serde(rename = "Out for Delivery")]
    OutForDelivery,
    Delivered,
}

impl OrderStatus {
    /// All statuses in canonical order.
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Scheduled,
        OrderStatus::ReachedStore,
        OrderStatus::PickedUp,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
    ];

    /// Terminal status: no transition is legal from here for any role.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// The next status in the canonical flow, ignoring role permissions.
    pub fn canonical_next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Scheduled => Some(OrderStatus::ReachedStore),
            OrderStatus::ReachedStore => Some(OrderStatus::PickedUp),
            OrderStatus::PickedUp => Some(OrderStatus::OutForDelivery),
            OrderStatus::OutForDelivery => Some(OrderStatus::Delivered),
            OrderStatus::Delivered => None,
        }
    }

    /// Wire label, identical to the serde representation.
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Scheduled => "Scheduled",
            OrderStatus::ReachedStore => "Reached Store",
            OrderStatus::PickedUp => "Picked Up",
            OrderStatus::OutForDelivery => "Out for Delivery",
            OrderStatus::Delivered => "Delivered",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Actor attempting a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Customer,
    Agent,
    Dispatcher,
}

/// The single legal next status for `(current, role)`, or `None` when the
/// status is terminal or the role is not permitted to advance it.
///
/// Agents own the hand-off to the customer: `Picked Up → Out for Delivery`
/// and `Out for Delivery → Delivered`. The earlier steps are dispatched by
/// the back office; customers never advance status.
pub fn next_status(current: OrderStatus, role: ActorRole) -> Option<OrderStatus> {
    match (current, role) {
        (OrderStatus::PickedUp, ActorRole::Agent) => Some(OrderStatus::OutForDelivery),
        (OrderStatus::OutForDelivery, ActorRole::Agent) => Some(OrderStatus::Delivered),
        (OrderStatus::Scheduled, ActorRole::Dispatcher) => Some(OrderStatus::ReachedStore),
        (OrderStatus::ReachedStore, ActorRole::Dispatcher) => Some(OrderStatus::PickedUp),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_table_matches_contract() {
        assert_eq!(
            next_status(OrderStatus::PickedUp, ActorRole::Agent),
            Some(OrderStatus::OutForDelivery)
        );
        assert_eq!(
            next_status(OrderStatus::OutForDelivery, ActorRole::Agent),
            Some(OrderStatus::Delivered)
        );
        assert_eq!(next_status(OrderStatus::Scheduled, ActorRole::Agent), None);
        assert_eq!(next_status(OrderStatus::ReachedStore, ActorRole::Agent), None);
    }

    #[test]
    fn delivered_is_terminal_for_every_role() {
        for role in [ActorRole::Customer, ActorRole::Agent, ActorRole::Dispatcher] {
            assert_eq!(next_status(OrderStatus::Delivered, role), None);
        }
        assert!(OrderStatus::Delivered.is_terminal());
    }

    #[test]
    fn customers_never_advance_status() {
        for status in OrderStatus::ALL {
            assert_eq!(next_status(status, ActorRole::Customer), None);
        }
    }

    #[test]
    fn canonical_flow_skips_nothing() {
        let mut status = OrderStatus::Scheduled;
        let mut seen = vec![status];
        while let Some(next) = status.canonical_next() {
            assert!(next > status, "flow must move forward");
            seen.push(next);
            status = next;
        }
        assert_eq!(seen, OrderStatus::ALL.to_vec());
    }

    #[test]
    fn wire_labels_round_trip() {
        for status in OrderStatus::ALL {
            let json = serde_json::to_string(&status).expect("serialize");
            assert_eq!(json, format!("\"{}\"", status.label()));
            let back: OrderStatus = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, status);
        }
    }
}
