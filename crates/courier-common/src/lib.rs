//! ---
//! trk_section: "01-core-functionality"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Shared primitives and utilities for the tracking runtime."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
//! Core shared primitives for the CourierLive workspace.
//! This crate exposes configuration loading, tracing initialisation, the
//! explicit session context, and the geographic math used by the tracking
//! pipeline.

pub mod config;
pub mod geo;
pub mod logging;
pub mod session;

pub use config::{
    AppConfig, ApiConfig, ChannelConfig, DirectionsConfig, GatewayConfig, LoggingConfig,
    MetricsConfig, TrackingConfig,
};
pub use geo::{haversine_meters, GeoError, GeoPoint};
pub use logging::{init_tracing, LogFormat};
pub use session::SessionContext;
