//! ---
//! trk_section: "03-live-tracking"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Client-side tracking core for live delivery views."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use async_trait::async_trait;
use courier_common::config::DirectionsConfig;
use courier_common::geo::GeoPoint;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Driving route between two markers, as drawn on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteInfo {
    /// Route polyline, ordered origin to destination.
    pub geometry: Vec<GeoPoint>,
    pub distance_m: f64,
    pub duration_s: f64,
}

impl RouteInfo {
    /// Rough ETA in whole minutes, rounded up.
    pub fn eta_minutes(&self) -> u64 {
        (self.duration_s / 60.0).ceil().max(0.0) as u64
    }
}

/// Directions fetch failures. Callers clear the drawn route on any of
/// these; none is surfaced to the viewer.
#[derive(Debug, thiserror::Error)]
pub enum DirectionsError {
    /// No access token configured; directions are disabled.
    #[error("directions provider not configured")]
    Unconfigured,
    #[error("directions request failed: {0}")]
    Transport(#[source] reqwest::Error),
    /// Provider answered but found no drivable route.
    #[error("no route between the given points")]
    NoRoute,
    #[error("invalid directions url: {0}")]
    InvalidUrl(String),
}

/// Source of driving routes between two points.
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    async fn fetch_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteInfo, DirectionsError>;
}

/// Directions client for the Mapbox HTTP API.
pub struct HttpDirections {
    client: reqwest::Client,
    base_url: Url,
    profile: String,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    routes: Vec<RawRoute>,
}

#[derive(Deserialize)]
struct RawRoute {
    geometry: RawGeometry,
    distance: f64,
    duration: f64,
}

#[derive(Deserialize)]
struct RawGeometry {
    /// GeoJSON order: `[longitude, latitude]` pairs.
    coordinates: Vec<[f64; 2]>,
}

impl HttpDirections {
    pub fn new(config: &DirectionsConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            profile: config.profile.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn request_url(&self, origin: GeoPoint, destination: GeoPoint) -> Result<Url, DirectionsError> {
        let token = self
            .access_token
            .as_deref()
            .ok_or(DirectionsError::Unconfigured)?;
        let path = format!(
            "directions/v5/mapbox/{}/{},{};{},{}",
            self.profile,
            origin.longitude,
            origin.latitude,
            destination.longitude,
            destination.latitude
        );
        let mut url = self
            .base_url
            .join(&path)
            .map_err(|err| DirectionsError::InvalidUrl(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("geometries", "geojson")
            .append_pair("overview", "full")
            .append_pair("access_token", token);
        Ok(url)
    }
}

#[async_trait]
impl DirectionsProvider for HttpDirections {
    async fn fetch_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteInfo, DirectionsError> {
        let url = self.request_url(origin, destination)?;
        debug!(profile = %self.profile, "fetching directions");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(DirectionsError::Transport)?;
        if !response.status().is_success() {
            return Err(DirectionsError::NoRoute);
        }
        let body: DirectionsResponse = response
            .json()
            .await
            .map_err(DirectionsError::Transport)?;
        let route = body.routes.into_iter().next().ok_or(DirectionsError::NoRoute)?;
        let geometry = route
            .geometry
            .coordinates
            .into_iter()
            .filter_map(|[lon, lat]| GeoPoint::new(lat, lon).ok())
            .collect::<Vec<_>>();
        if geometry.is_empty() {
            return Err(DirectionsError::NoRoute);
        }
        Ok(RouteInfo {
            geometry,
            distance_m: route.distance,
            duration_s: route.duration,
        })
    }
}
