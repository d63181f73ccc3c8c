//! ---
//! trk_section: "03-live-tracking"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Client-side tracking core for live delivery views."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use courier_common::geo::{GeoPoint, RENDER_AXIS_EPSILON_DEG};
use courier_proto::{AgentLocationUpdate, OrderStatus, OrderStatusUpdate};
use tracing::debug;

use crate::route::{DirectionsError, RouteInfo};

/// Padding added on each side when fitting the viewport to markers.
pub const BOUNDS_PADDING_DEG: f64 = 0.01;
/// Zoom ceiling so a single-point fit never zooms into building level.
pub const MAX_ZOOM: f64 = 15.0;

/// Initial inputs for one tracking view, captured at mount time.
#[derive(Debug, Clone)]
pub struct TrackingProps {
    pub customer_location: GeoPoint,
    pub store_location: GeoPoint,
    /// Last known agent position at mount, when the caller has one.
    pub agent_location: Option<GeoPoint>,
    pub order_status: OrderStatus,
    pub enable_real_time_tracking: bool,
    pub show_route: bool,
}

/// Provenance of the current effective agent location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    InitialProp,
    LocalSample,
    ChannelPush,
}

/// Markers currently visible on the map. Customer is always present;
/// agent and store come and go with the order status.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSet {
    pub agent: Option<GeoPoint>,
    pub store: Option<GeoPoint>,
    pub customer: GeoPoint,
}

impl MarkerSet {
    fn visible_points(&self) -> Vec<GeoPoint> {
        let mut points = Vec::with_capacity(3);
        if let Some(agent) = self.agent {
            points.push(agent);
        }
        if let Some(store) = self.store {
            points.push(store);
        }
        points.push(self.customer);
        points
    }
}

/// Camera state derived from the visible markers.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub center: GeoPoint,
    pub zoom: f64,
}

impl Viewport {
    /// Fit exactly the given points with fixed padding and a zoom ceiling.
    fn fit(points: &[GeoPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut min_lat = first.latitude;
        let mut max_lat = first.latitude;
        let mut min_lon = first.longitude;
        let mut max_lon = first.longitude;
        for point in points {
            min_lat = min_lat.min(point.latitude);
            max_lat = max_lat.max(point.latitude);
            min_lon = min_lon.min(point.longitude);
            max_lon = max_lon.max(point.longitude);
        }
        let span = (max_lat - min_lat).max(max_lon - min_lon);
        // Coincident points have no span to fit; pin those at the ceiling
        // instead of letting the padding pick an arbitrary zoom.
        let zoom = if span <= 0.0 {
            MAX_ZOOM
        } else {
            (360.0 / (span + 2.0 * BOUNDS_PADDING_DEG))
                .log2()
                .min(MAX_ZOOM)
        };
        let center = GeoPoint {
            latitude: (min_lat + max_lat) / 2.0,
            longitude: (min_lon + max_lon) / 2.0,
        };
        Some(Viewport { center, zoom })
    }
}

/// A directions fetch the consumer should run. Produced by the reconciler,
/// executed by the caller so the fetch never blocks marker updates.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
}

/// Render-side hooks. Registered once at mount; every method has a
/// default no-op so consumers implement only what they draw.
pub trait RenderObserver: Send {
    fn on_location_changed(&self, _location: GeoPoint, _source: LocationSource) {}
    fn on_status_changed(&self, _status: OrderStatus) {}
    fn on_markers_changed(&self, _markers: &MarkerSet, _viewport: Option<&Viewport>) {}
    fn on_route_changed(&self, _route: Option<&RouteInfo>) {}
}

/// Merges the three position sources and the status stream into marker,
/// route, and viewport decisions. Callers wrap it in a mutex; only this
/// type mutates effective location and status.
pub struct Reconciler {
    props: TrackingProps,
    status: OrderStatus,
    effective: Option<(GeoPoint, LocationSource)>,
    channel_connected: bool,
    markers: MarkerSet,
    viewport: Option<Viewport>,
    route: Option<RouteInfo>,
    pending_route: Option<RouteRequest>,
    observers: Vec<Box<dyn RenderObserver>>,
}

impl Reconciler {
    pub fn new(props: TrackingProps) -> Self {
        let status = props.order_status;
        let effective = props
            .agent_location
            .map(|point| (point, LocationSource::InitialProp));
        let mut reconciler = Self {
            props,
            status,
            effective,
            channel_connected: false,
            markers: MarkerSet {
                agent: None,
                store: None,
                customer: GeoPoint {
                    latitude: 0.0,
                    longitude: 0.0,
                },
            },
            viewport: None,
            route: None,
            pending_route: None,
            observers: Vec::new(),
        };
        reconciler.markers = reconciler.compute_markers();
        reconciler.viewport = Viewport::fit(&reconciler.markers.visible_points());
        if reconciler.props.show_route {
            reconciler.pending_route = reconciler.route_request();
        }
        reconciler
    }

    /// Register a render observer. Registration is explicit and happens
    /// once at mount; there is no ambient re-render trigger.
    pub fn observe(&mut self, observer: Box<dyn RenderObserver>) {
        self.observers.push(observer);
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Latest of initial prop, local sample, and channel push.
    pub fn effective_location(&self) -> Option<GeoPoint> {
        self.effective.map(|(point, _)| point)
    }

    pub fn location_source(&self) -> Option<LocationSource> {
        self.effective.map(|(_, source)| source)
    }

    pub fn markers(&self) -> &MarkerSet {
        &self.markers
    }

    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    pub fn route(&self) -> Option<&RouteInfo> {
        self.route.as_ref()
    }

    /// Whether the live channel subscription should be held open: the
    /// caller opted in AND the agent marker rule holds.
    pub fn realtime_engaged(&self) -> bool {
        self.props.enable_real_time_tracking
            && self.status != OrderStatus::Delivered
            && self.effective.is_some()
    }

    /// Channel connectivity, wired to the channel's connect/disconnect
    /// handlers. While connected, channel pushes supersede the mount-time
    /// prop even when within the movement epsilon.
    pub fn set_channel_connected(&mut self, connected: bool) {
        self.channel_connected = connected;
    }

    /// Feed a locally sampled position.
    pub fn apply_local_sample(&mut self, point: GeoPoint) {
        self.apply_location(point, LocationSource::LocalSample);
    }

    /// Feed a channel-pushed position.
    pub fn apply_channel_location(&mut self, update: &AgentLocationUpdate) {
        self.apply_location(update.location, LocationSource::ChannelPush);
    }

    /// Feed a channel-pushed status.
    pub fn apply_status_update(&mut self, update: &OrderStatusUpdate) {
        self.apply_status(update.status);
    }

    pub fn apply_status(&mut self, status: OrderStatus) {
        if status == self.status {
            return;
        }
        self.status = status;
        for observer in &self.observers {
            observer.on_status_changed(status);
        }
        self.refresh_markers();
        // Delivered drops the agent marker and with it any route.
        if status == OrderStatus::Delivered && self.route.is_some() {
            self.route = None;
            self.pending_route = None;
            for observer in &self.observers {
                observer.on_route_changed(None);
            }
        }
    }

    fn apply_location(&mut self, point: GeoPoint, source: LocationSource) {
        let accept = match self.effective {
            None => true,
            Some((current, current_source)) => {
                if current.moved_beyond_axis_epsilon(&point, RENDER_AXIS_EPSILON_DEG) {
                    true
                } else {
                    // Within the epsilon: still let a connected channel
                    // take over from the mount-time prop so later pushes
                    // are judged against live data.
                    self.channel_connected
                        && source == LocationSource::ChannelPush
                        && current_source == LocationSource::InitialProp
                }
            }
        };
        if !accept {
            debug!(
                lat = point.latitude,
                lon = point.longitude,
                "location within render epsilon; dropped"
            );
            return;
        }

        self.effective = Some((point, source));
        for observer in &self.observers {
            observer.on_location_changed(point, source);
        }
        self.refresh_markers();
        if self.props.show_route && self.realtime_engaged() {
            self.pending_route = self.route_request();
        }
    }

    /// Take the directions fetch the consumer should run now, if any.
    pub fn take_route_request(&mut self) -> Option<RouteRequest> {
        self.pending_route.take()
    }

    /// Apply the outcome of a directions fetch. Failures clear the route
    /// without surfacing an error; markers are unaffected.
    pub fn apply_route(&mut self, outcome: Result<RouteInfo, DirectionsError>) {
        match outcome {
            Ok(route) => {
                self.route = Some(route);
            }
            Err(err) => {
                debug!(error = %err, "directions fetch failed; clearing route");
                self.route = None;
            }
        }
        for observer in &self.observers {
            observer.on_route_changed(self.route.as_ref());
        }
    }

    fn route_request(&self) -> Option<RouteRequest> {
        let origin = self
            .effective_location()
            .unwrap_or(self.props.store_location);
        Some(RouteRequest {
            origin,
            destination: self.props.customer_location,
        })
    }

    fn compute_markers(&self) -> MarkerSet {
        let agent = if self.status == OrderStatus::Delivered {
            None
        } else {
            self.effective_location()
        };
        let store = if self.status < OrderStatus::OutForDelivery {
            Some(self.props.store_location)
        } else {
            None
        };
        MarkerSet {
            agent,
            store,
            customer: self.props.customer_location,
        }
    }

    fn refresh_markers(&mut self) {
        let markers = self.compute_markers();
        if markers == self.markers {
            return;
        }
        self.markers = markers;
        self.viewport = Viewport::fit(&self.markers.visible_points());
        for observer in &self.observers {
            observer.on_markers_changed(&self.markers, self.viewport.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).expect("valid point")
    }

    fn props(status: OrderStatus, agent: Option<GeoPoint>) -> TrackingProps {
        TrackingProps {
            customer_location: point(20.2961, 85.8245),
            store_location: point(20.3500, 85.8000),
            agent_location: agent,
            order_status: status,
            enable_real_time_tracking: true,
            show_route: true,
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl RenderObserver for Recorder {
        fn on_location_changed(&self, _location: GeoPoint, _source: LocationSource) {
            self.events.lock().expect("events").push("location".into());
        }
        fn on_status_changed(&self, status: OrderStatus) {
            self.events
                .lock()
                .expect("events")
                .push(format!("status:{status}"));
        }
        fn on_markers_changed(&self, _markers: &MarkerSet, _viewport: Option<&Viewport>) {
            self.events.lock().expect("events").push("markers".into());
        }
        fn on_route_changed(&self, route: Option<&RouteInfo>) {
            self.events
                .lock()
                .expect("events")
                .push(format!("route:{}", route.is_some()));
        }
    }

    #[test]
    fn marker_visibility_follows_status() {
        let agent = point(20.32, 85.81);
        let mut reconciler = Reconciler::new(props(OrderStatus::PickedUp, Some(agent)));
        let markers = reconciler.markers();
        assert_eq!(markers.agent, Some(agent));
        assert!(markers.store.is_some(), "store visible before OutForDelivery");

        reconciler.apply_status(OrderStatus::OutForDelivery);
        assert!(reconciler.markers().store.is_none(), "store hidden once out");
        assert!(reconciler.markers().agent.is_some());

        reconciler.apply_status(OrderStatus::Delivered);
        assert!(reconciler.markers().agent.is_none(), "agent removed on delivery");
        assert_eq!(reconciler.markers().customer, point(20.2961, 85.8245));
    }

    #[test]
    fn sub_epsilon_movement_is_dropped() {
        let agent = point(20.320000, 85.810000);
        let mut reconciler = Reconciler::new(props(OrderStatus::OutForDelivery, Some(agent)));
        let recorder = Recorder::default();
        let events = recorder.events.clone();
        reconciler.observe(Box::new(recorder));

        reconciler.apply_local_sample(point(20.320049, 85.810049));
        assert!(events.lock().expect("events").is_empty());
        assert_eq!(reconciler.effective_location(), Some(agent));

        reconciler.apply_local_sample(point(20.320200, 85.810000));
        assert_eq!(reconciler.effective_location(), Some(point(20.320200, 85.810000)));
        assert!(events
            .lock()
            .expect("events")
            .contains(&"location".to_string()));
    }

    #[test]
    fn connected_channel_push_supersedes_initial_prop() {
        let agent = point(20.32, 85.81);
        let mut reconciler = Reconciler::new(props(OrderStatus::OutForDelivery, Some(agent)));
        reconciler.set_channel_connected(true);

        // Same coordinates pushed over the channel: source flips even
        // though the point did not move.
        let update = AgentLocationUpdate {
            order_id: "task-1".into(),
            location: agent,
            observed_at: Utc::now(),
        };
        reconciler.apply_channel_location(&update);
        assert_eq!(reconciler.location_source(), Some(LocationSource::ChannelPush));
    }

    #[test]
    fn disconnected_channel_push_within_epsilon_is_dropped() {
        let agent = point(20.32, 85.81);
        let mut reconciler = Reconciler::new(props(OrderStatus::OutForDelivery, Some(agent)));
        let update = AgentLocationUpdate {
            order_id: "task-1".into(),
            location: agent,
            observed_at: Utc::now(),
        };
        reconciler.apply_channel_location(&update);
        assert_eq!(reconciler.location_source(), Some(LocationSource::InitialProp));
    }

    #[test]
    fn route_origin_prefers_agent_then_store() {
        let mut without_agent = Reconciler::new(props(OrderStatus::Scheduled, None));
        let request = without_agent.take_route_request().expect("initial request");
        assert_eq!(request.origin, point(20.3500, 85.8000));
        assert_eq!(request.destination, point(20.2961, 85.8245));

        let agent = point(20.32, 85.81);
        let mut with_agent = Reconciler::new(props(OrderStatus::OutForDelivery, Some(agent)));
        let request = with_agent.take_route_request().expect("initial request");
        assert_eq!(request.origin, agent);
    }

    #[test]
    fn failed_route_fetch_clears_silently() {
        let mut reconciler =
            Reconciler::new(props(OrderStatus::OutForDelivery, Some(point(20.32, 85.81))));
        reconciler.apply_route(Ok(RouteInfo {
            geometry: vec![point(20.32, 85.81), point(20.2961, 85.8245)],
            distance_m: 4200.0,
            duration_s: 600.0,
        }));
        assert!(reconciler.route().is_some());

        reconciler.apply_route(Err(DirectionsError::NoRoute));
        assert!(reconciler.route().is_none(), "failure clears the route");
    }

    #[test]
    fn location_change_while_tracking_queues_route_refetch() {
        let mut reconciler =
            Reconciler::new(props(OrderStatus::OutForDelivery, Some(point(20.32, 85.81))));
        reconciler.take_route_request();
        reconciler.apply_local_sample(point(20.31, 85.81));
        let request = reconciler.take_route_request().expect("refetch queued");
        assert_eq!(request.origin, point(20.31, 85.81));
    }

    #[test]
    fn realtime_requires_flag_and_agent_marker_rule() {
        let agent = Some(point(20.32, 85.81));
        let mut engaged = Reconciler::new(props(OrderStatus::OutForDelivery, agent));
        assert!(engaged.realtime_engaged());

        engaged.apply_status(OrderStatus::Delivered);
        assert!(!engaged.realtime_engaged(), "delivered disengages tracking");

        let no_location = Reconciler::new(props(OrderStatus::Scheduled, None));
        assert!(!no_location.realtime_engaged(), "no known location, no tracking");

        let mut opted_out = props(OrderStatus::OutForDelivery, agent);
        opted_out.enable_real_time_tracking = false;
        assert!(!Reconciler::new(opted_out).realtime_engaged());
    }

    #[test]
    fn viewport_fits_visible_markers_with_zoom_ceiling() {
        let reconciler =
            Reconciler::new(props(OrderStatus::PickedUp, Some(point(20.32, 85.81))));
        let viewport = reconciler.viewport().expect("viewport");
        assert!(viewport.zoom <= MAX_ZOOM);
        assert!(viewport.center.latitude > 20.29 && viewport.center.latitude < 20.36);

        // Single visible marker (delivered): still capped.
        let mut delivered = Reconciler::new(props(OrderStatus::Delivered, None));
        delivered.apply_status(OrderStatus::Delivered);
        let viewport = delivered.viewport().expect("viewport");
        assert_eq!(viewport.center, point(20.2961, 85.8245));
        assert_eq!(viewport.zoom, MAX_ZOOM);
    }
}
