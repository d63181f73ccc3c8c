//! ---
//! trk_section: "02-data-model-protocol"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Order schema, status transitions, and channel codecs."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
//! Shared data model and wire protocol for the CourierLive workspace:
//! the order projection, the status state machine, and the JSON events
//! exchanged over the per-order push channel.

pub mod event;
pub mod order;
pub mod status;

pub use event::{
    AgentLocationUpdate, ClientCommand, OrderStatusUpdate, ServerEvent,
};
pub use order::{
    AgentInfo, ApiResponse, CreateOrderRequest, CustomerInfo, ErrorBody, LocationPatch, Order,
    StatusPatch,
};
pub use status::{next_status, ActorRole, OrderStatus};
