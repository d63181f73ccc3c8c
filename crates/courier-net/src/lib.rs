//! ---
//! trk_section: "04-backend-of-record"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Backend of record for orders and live updates."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
//! Backend of record for CourierLive.
//!
//! The [`store`] owns authoritative order state, the [`rest`] surface
//! mutates it, and every successful mutation is rebroadcast through the
//! [`hub`] into the order's room so tracking views converge without
//! polling.

pub mod hub;
pub mod rest;
pub mod store;

pub use hub::{HubMetrics, UpdateHub};
pub use rest::{ApiServerBuilder, ApiServerHandle};
pub use store::{OrderStore, StoreError};
