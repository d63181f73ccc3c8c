//! ---
//! trk_section: "03-live-tracking"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Client-side tracking core for live delivery views."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_common::config::TrackingConfig;
use courier_common::geo::GeoPoint;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::gateway::LocationGateway;
use crate::TrackError;

/// Failures while acquiring a position fix.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquisitionError {
    /// The platform exposes no geolocation capability at all. Fatal to
    /// tracking, surfaced once, never retried.
    #[error("geolocation is not supported on this device")]
    Unsupported,
    /// Access denied by the user. Fatal for the current session and
    /// surfaced distinctly from transient failures.
    #[error("location access denied by user")]
    PermissionDenied,
    /// The request ran out of time. Transient: retried on the next tick.
    #[error("location request timed out")]
    Timeout,
    /// Position could not be determined. Transient.
    #[error("location information unavailable: {0}")]
    Unavailable(String),
}

impl AcquisitionError {
    /// Transient errors are logged and retried; the rest end the session.
    pub fn is_transient(&self) -> bool {
        matches!(self, AcquisitionError::Timeout | AcquisitionError::Unavailable(_))
    }
}

/// Tuning knobs for a single acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionOptions {
    /// Low-accuracy mode is the default: faster and good enough for a
    /// moving courier marker.
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// How stale a cached fix may be and still be returned.
    pub max_age: Duration,
}

/// A single position sample. Ephemeral: only the latest accepted fix is
/// retained, for displacement diffing and display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub point: GeoPoint,
    pub accuracy_m: f64,
    pub timestamp: DateTime<Utc>,
}

/// Source of device position fixes. Production wires a platform adapter;
/// tests and the simulator script fixes.
#[async_trait]
pub trait PositionSource: Send + Sync + 'static {
    async fn acquire(&self, options: AcquisitionOptions) -> Result<PositionFix, AcquisitionError>;
}

/// Receives accepted samples and session-level notices. Registered once at
/// construction; there is no ambient re-render machinery behind this.
pub trait SampleObserver: Send + Sync + 'static {
    /// An accepted fix, already forwarded to the gateway.
    fn on_sample(&self, order_id: &str, fix: &PositionFix);
    /// Access was revoked mid-session; tracking has stopped.
    fn on_permission_denied(&self, order_id: &str) {
        let _ = order_id;
    }
    /// A submission failed; tracking continues, the next tick supersedes.
    fn on_submission_error(&self, order_id: &str, message: &str) {
        let _ = (order_id, message);
    }
}

struct Running {
    order_id: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Acquires device position on a fixed interval, drops insignificant
/// movement, and forwards accepted samples to the gateway and observer.
pub struct PositionSampler {
    config: TrackingConfig,
    source: Arc<dyn PositionSource>,
    gateway: Arc<LocationGateway>,
    observer: Arc<dyn SampleObserver>,
    last_accepted: Arc<Mutex<Option<PositionFix>>>,
    running: Mutex<Option<Running>>,
}

impl PositionSampler {
    pub fn new(
        config: TrackingConfig,
        source: Arc<dyn PositionSource>,
        gateway: Arc<LocationGateway>,
        observer: Arc<dyn SampleObserver>,
    ) -> Self {
        Self {
            config,
            source,
            gateway,
            observer,
            last_accepted: Arc::new(Mutex::new(None)),
            running: Mutex::new(None),
        }
    }

    fn primary_options(&self) -> AcquisitionOptions {
        AcquisitionOptions {
            high_accuracy: false,
            timeout: self.config.primary_timeout,
            max_age: self.config.primary_max_age,
        }
    }

    fn fallback_options(&self) -> AcquisitionOptions {
        AcquisitionOptions {
            high_accuracy: false,
            timeout: self.config.fallback_timeout,
            max_age: self.config.fallback_max_age,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.running
            .lock()
            .expect("sampler state poisoned")
            .as_ref()
            .map(|running| !running.task.is_finished())
            .unwrap_or(false)
    }

    /// Begin periodic tracking for `order_id`.
    ///
    /// Acquires an initial fix first (primary options, then one relaxed
    /// fallback attempt); when both fail the error is returned and the
    /// sampler does not enter tracking state. Calling `start` while already
    /// tracking is a no-op.
    pub async fn start(&self, order_id: &str) -> Result<(), AcquisitionError> {
        if self.is_tracking() {
            debug!(order = %order_id, "sampler already tracking; start ignored");
            return Ok(());
        }

        let initial = match self.source.acquire(self.primary_options()).await {
            Ok(fix) => fix,
            Err(AcquisitionError::Unsupported) => return Err(AcquisitionError::Unsupported),
            Err(AcquisitionError::PermissionDenied) => {
                return Err(AcquisitionError::PermissionDenied)
            }
            Err(primary_err) => {
                warn!(order = %order_id, error = %primary_err, "initial fix failed; retrying relaxed");
                self.source.acquire(self.fallback_options()).await?
            }
        };

        *self.last_accepted.lock().expect("sampler state poisoned") = Some(initial);
        self.observer.on_sample(order_id, &initial);
        self.forward(order_id, initial.point);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(sample_loop(
            order_id.to_owned(),
            self.config.clone(),
            self.primary_options(),
            self.source.clone(),
            self.gateway.clone(),
            self.observer.clone(),
            self.last_accepted.clone(),
            shutdown_rx,
        ));

        *self.running.lock().expect("sampler state poisoned") = Some(Running {
            order_id: order_id.to_owned(),
            shutdown: shutdown_tx,
            task,
        });
        info!(order = %order_id, interval_ms = self.config.sample_interval.as_millis() as u64, "location tracking started");
        Ok(())
    }

    /// Cancel the interval and any outstanding acquisition. Idempotent.
    pub fn stop(&self) {
        let running = self
            .running
            .lock()
            .expect("sampler state poisoned")
            .take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            running.task.abort();
            info!(order = %running.order_id, "location tracking stopped");
        }
    }

    /// Acquire and submit a single fix immediately, bypassing the
    /// displacement filter. Usable whether or not periodic tracking runs.
    pub async fn request_one_shot(&self, order_id: &str) -> Result<PositionFix, TrackError> {
        let fix = self.source.acquire(self.primary_options()).await?;
        *self.last_accepted.lock().expect("sampler state poisoned") = Some(fix);
        self.observer.on_sample(order_id, &fix);
        self.gateway.submit(order_id, fix.point).await?;
        Ok(fix)
    }

    /// Fire-and-forget submission; failures become observer notices.
    fn forward(&self, order_id: &str, point: GeoPoint) {
        let gateway = self.gateway.clone();
        let observer = self.observer.clone();
        let order_id = order_id.to_owned();
        tokio::spawn(async move {
            if let Err(err) = gateway.submit(&order_id, point).await {
                warn!(order = %order_id, error = %err, "location submission failed");
                observer.on_submission_error(&order_id, &err.to_string());
            }
        });
    }
}

impl Drop for PositionSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
async fn sample_loop(
    order_id: String,
    config: TrackingConfig,
    options: AcquisitionOptions,
    source: Arc<dyn PositionSource>,
    gateway: Arc<LocationGateway>,
    observer: Arc<dyn SampleObserver>,
    last_accepted: Arc<Mutex<Option<PositionFix>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.sample_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The interval fires immediately; the initial fix already covered that.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let fix = match source.acquire(options).await {
                    Ok(fix) => fix,
                    Err(err) if err.is_transient() => {
                        debug!(order = %order_id, error = %err, "transient acquisition failure; retrying next tick");
                        continue;
                    }
                    Err(AcquisitionError::PermissionDenied) => {
                        warn!(order = %order_id, "location permission revoked; tracking halted");
                        observer.on_permission_denied(&order_id);
                        break;
                    }
                    Err(err) => {
                        warn!(order = %order_id, error = %err, "acquisition failed; tracking halted");
                        break;
                    }
                };

                let displacement = {
                    let last = last_accepted.lock().expect("sampler state poisoned");
                    last.map(|prev| prev.point.distance_meters(&fix.point))
                };
                if let Some(moved) = displacement {
                    if moved < config.min_displacement_m {
                        debug!(order = %order_id, moved_m = moved, "displacement below threshold; sample dropped");
                        continue;
                    }
                }

                *last_accepted.lock().expect("sampler state poisoned") = Some(fix);
                observer.on_sample(&order_id, &fix);
                let gateway = gateway.clone();
                let observer = observer.clone();
                let order = order_id.clone();
                tokio::spawn(async move {
                    if let Err(err) = gateway.submit(&order, fix.point).await {
                        warn!(order = %order, error = %err, "location submission failed");
                        observer.on_submission_error(&order, &err.to_string());
                    }
                });
            }
        }
    }
}
