//! ---
//! trk_section: "03-live-tracking"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Client-side tracking core for live delivery views."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
//! Client-side tracking core for CourierLive.
//!
//! Four cooperating pieces feed a single rendered tracking state:
//! the [`sampler`] produces throttled position fixes, the [`gateway`]
//! submits them to the backend of record, the [`channel`] delivers
//! authoritative pushes per order, and [`reconcile`] merges all three
//! into marker, route, and viewport decisions. The [`sim`] module drives
//! the same pipeline with synthetic movement for testing.

pub mod channel;
pub mod gateway;
pub mod reconcile;
pub mod route;
pub mod sampler;
pub mod sim;

pub use channel::{ChannelClient, ChannelHandlers, ConnectionStatus};
pub use gateway::{GatewayError, LocationGateway};
pub use reconcile::{
    MarkerSet, Reconciler, RenderObserver, TrackingProps, Viewport,
};
pub use route::{DirectionsError, DirectionsProvider, HttpDirections, RouteInfo};
pub use sampler::{
    AcquisitionError, AcquisitionOptions, PositionFix, PositionSampler, PositionSource,
    SampleObserver,
};
pub use sim::RouteSimulator;

/// Errors surfaced by the one-shot tracking operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error(transparent)]
    Acquisition(#[from] sampler::AcquisitionError),
    #[error(transparent)]
    Gateway(#[from] gateway::GatewayError),
}
