//! ---
//! trk_section: "03-live-tracking"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Client-side tracking core for live delivery views."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use courier_common::geo::GeoPoint;
use rand::Rng;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::gateway::{GatewayError, LocationGateway};

/// Random per-step offset applied to each simulated position so the track
/// does not render as a perfectly straight line.
pub const JITTER_DEG: f64 = 0.0001;
/// Auto-drive step per tick: 2% of the route.
pub const AUTO_DRIVE_STEP: f64 = 0.02;
pub const AUTO_DRIVE_INTERVAL: Duration = Duration::from_secs(2);

/// Position on the straight line origin → destination at `progress`.
pub fn lerp(origin: GeoPoint, destination: GeoPoint, progress: f64) -> GeoPoint {
    let t = progress.clamp(0.0, 1.0);
    GeoPoint {
        latitude: origin.latitude + (destination.latitude - origin.latitude) * t,
        longitude: origin.longitude + (destination.longitude - origin.longitude) * t,
    }
}

struct Drive {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Drives a synthetic courier along the store → customer line, pushing
/// each position through the order-patch path so channel subscribers see
/// it as authoritative movement.
pub struct RouteSimulator {
    gateway: Arc<LocationGateway>,
    order_id: String,
    origin: GeoPoint,
    destination: GeoPoint,
    progress: Arc<Mutex<f64>>,
    drive: Mutex<Option<Drive>>,
}

impl RouteSimulator {
    pub fn new(
        gateway: Arc<LocationGateway>,
        order_id: impl Into<String>,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Self {
        Self {
            gateway,
            order_id: order_id.into(),
            origin,
            destination,
            progress: Arc::new(Mutex::new(0.0)),
            drive: Mutex::new(None),
        }
    }

    pub async fn progress(&self) -> f64 {
        *self.progress.lock().await
    }

    /// Move forward along the route and submit the new position.
    pub async fn advance(&self, step: f64) -> Result<GeoPoint, GatewayError> {
        self.shift(step).await
    }

    /// Move backward along the route and submit the new position.
    pub async fn retreat(&self, step: f64) -> Result<GeoPoint, GatewayError> {
        self.shift(-step).await
    }

    /// Jump straight to `progress` and submit the position there.
    pub async fn jump_to(&self, progress: f64) -> Result<GeoPoint, GatewayError> {
        let point = {
            let mut current = self.progress.lock().await;
            *current = progress.clamp(0.0, 1.0);
            jittered(lerp(self.origin, self.destination, *current))
        };
        self.submit(point).await?;
        Ok(point)
    }

    async fn shift(&self, delta: f64) -> Result<GeoPoint, GatewayError> {
        let point = {
            let mut current = self.progress.lock().await;
            *current = (*current + delta).clamp(0.0, 1.0);
            jittered(lerp(self.origin, self.destination, *current))
        };
        self.submit(point).await?;
        Ok(point)
    }

    async fn submit(&self, point: GeoPoint) -> Result<(), GatewayError> {
        debug!(order = %self.order_id, lat = point.latitude, lon = point.longitude, "simulated position");
        self.gateway
            .submit_via_order_patch(&self.order_id, point)
            .await
    }

    /// Step 2% of the route every two seconds until the destination is
    /// reached or `stop_auto_drive` is called. Starting while a drive is
    /// running is a no-op.
    pub async fn start_auto_drive(self: &Arc<Self>) {
        let mut drive = self.drive.lock().await;
        if let Some(existing) = drive.as_ref() {
            if !existing.task.is_finished() {
                return;
            }
        }
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let simulator = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(AUTO_DRIVE_INTERVAL);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticks.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => return,
                    _ = ticks.tick() => {}
                }
                if let Err(err) = simulator.advance(AUTO_DRIVE_STEP).await {
                    warn!(order = %simulator.order_id, error = %err, "simulated submission failed");
                }
                if *simulator.progress.lock().await >= 1.0 {
                    debug!(order = %simulator.order_id, "auto-drive reached destination");
                    return;
                }
            }
        });
        *drive = Some(Drive {
            shutdown: shutdown_tx,
            task,
        });
    }

    /// Idempotent.
    pub async fn stop_auto_drive(&self) {
        if let Some(drive) = self.drive.lock().await.take() {
            let _ = drive.shutdown.send(true);
            drive.task.abort();
        }
    }
}

/// Apply ±[`JITTER_DEG`] noise per axis, keeping coordinates in range.
fn jittered(point: GeoPoint) -> GeoPoint {
    let mut rng = rand::thread_rng();
    GeoPoint {
        latitude: (point.latitude + rng.gen_range(-JITTER_DEG..=JITTER_DEG)).clamp(-90.0, 90.0),
        longitude: (point.longitude + rng.gen_range(-JITTER_DEG..=JITTER_DEG))
            .clamp(-180.0, 180.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::config::GatewayConfig;
    use courier_common::session::SessionContext;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).expect("valid point")
    }

    fn simulator() -> Arc<RouteSimulator> {
        let gateway = Arc::new(
            LocationGateway::new(&GatewayConfig::default(), &SessionContext::anonymous())
                .expect("gateway"),
        );
        Arc::new(RouteSimulator::new(
            gateway,
            "task-1",
            point(20.3500, 85.8000),
            point(20.2961, 85.8245),
        ))
    }

    #[test]
    fn lerp_endpoints_and_midpoint() {
        let origin = point(20.3500, 85.8000);
        let destination = point(20.2961, 85.8245);
        assert_eq!(lerp(origin, destination, 0.0), origin);
        assert_eq!(lerp(origin, destination, 1.0), destination);
        let mid = lerp(origin, destination, 0.5);
        assert!((mid.latitude - 20.32305).abs() < 1e-9);
        assert!((mid.longitude - 85.81225).abs() < 1e-9);
        // Out-of-range progress clamps.
        assert_eq!(lerp(origin, destination, 1.7), destination);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let base = point(20.32, 85.81);
        for _ in 0..200 {
            let noisy = jittered(base);
            assert!((noisy.latitude - base.latitude).abs() <= JITTER_DEG);
            assert!((noisy.longitude - base.longitude).abs() <= JITTER_DEG);
        }
    }

    #[tokio::test]
    async fn progress_clamps_and_moves_both_ways() {
        let sim = simulator();
        // Submissions hit nothing; only the progress bookkeeping matters.
        let _ = sim.advance(0.3).await;
        assert!((sim.progress().await - 0.3).abs() < 1e-9);
        let _ = sim.retreat(0.5).await;
        assert_eq!(sim.progress().await, 0.0);
        let _ = sim.jump_to(2.0).await;
        assert_eq!(sim.progress().await, 1.0);
    }

    #[tokio::test]
    async fn stop_auto_drive_without_start_is_safe() {
        let sim = simulator();
        sim.stop_auto_drive().await;
        sim.start_auto_drive().await;
        sim.start_auto_drive().await;
        sim.stop_auto_drive().await;
        sim.stop_auto_drive().await;
    }
}
