//! ---
//! trk_section: "01-core-functionality"
//! trk_subsection: "binary"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Binary entrypoint for the courier-agent CLI."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use courier_common::config::AppConfig;
use courier_common::geo::GeoPoint;
use courier_common::logging::init_tracing;
use courier_common::session::SessionContext;
use courier_proto::{
    ApiResponse, CreateOrderRequest, CustomerInfo, ErrorBody, Order, OrderStatus, StatusPatch,
};
use courier_track::sampler::{
    AcquisitionError, AcquisitionOptions, PositionFix, PositionSampler, PositionSource,
    SampleObserver,
};
use courier_track::sim::{lerp, RouteSimulator};
use courier_track::{ChannelClient, ChannelHandlers, LocationGateway};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "CourierLive agent CLI", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "TOKEN", help = "Bearer token for backend requests")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create an order and print its task id")]
    Create {
        #[arg(long, default_value = "Walk-in customer")]
        name: String,
        #[arg(long, default_value = "customer@example.com")]
        email: String,
        #[arg(long, default_value = "n/a")]
        phone: String,
        #[arg(long, default_value = "n/a")]
        address: String,
        #[arg(long, value_parser = parse_point, value_name = "LAT,LON")]
        dropoff: GeoPoint,
        #[arg(long, default_value = "Parcel")]
        item: String,
    },
    #[command(about = "Watch an order's live update channel")]
    Watch {
        #[arg(long, value_name = "TASK_ID")]
        order: String,
    },
    #[command(about = "Submit a single position for an order")]
    Locate {
        #[arg(long, value_name = "TASK_ID")]
        order: String,
        #[arg(long, value_parser = parse_point, value_name = "LAT,LON")]
        at: GeoPoint,
    },
    #[command(about = "Request a status transition for an order")]
    Status {
        #[arg(long, value_name = "TASK_ID")]
        order: String,
        #[arg(long, value_enum)]
        to: CliStatus,
        #[arg(long, value_enum, default_value = "agent")]
        role: CliRole,
    },
    #[command(about = "Drive a simulated courier along the route")]
    Drive {
        #[arg(long, value_name = "TASK_ID")]
        order: String,
        #[arg(long, value_parser = parse_point, value_name = "LAT,LON")]
        from: GeoPoint,
        #[arg(long, value_parser = parse_point, value_name = "LAT,LON")]
        to: GeoPoint,
        #[arg(long, help = "Jump to this progress instead of auto-driving", value_name = "0..1")]
        jump: Option<f64>,
    },
    #[command(about = "Track a simulated walk through the position sampler")]
    Track {
        #[arg(long, value_name = "TASK_ID")]
        order: String,
        #[arg(long, value_parser = parse_point, value_name = "LAT,LON")]
        from: GeoPoint,
        #[arg(long, value_parser = parse_point, value_name = "LAT,LON")]
        to: GeoPoint,
        #[arg(long, default_value_t = 0.05, help = "Route fraction walked per sample")]
        step: f64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliStatus {
    ReachedStore,
    PickedUp,
    OutForDelivery,
    Delivered,
}

impl From<CliStatus> for OrderStatus {
    fn from(value: CliStatus) -> Self {
        match value {
            CliStatus::ReachedStore => OrderStatus::ReachedStore,
            CliStatus::PickedUp => OrderStatus::PickedUp,
            CliStatus::OutForDelivery => OrderStatus::OutForDelivery,
            CliStatus::Delivered => OrderStatus::Delivered,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliRole {
    Agent,
    Dispatcher,
}

impl CliRole {
    fn header_value(self) -> &'static str {
        match self {
            CliRole::Agent => "agent",
            CliRole::Dispatcher => "dispatcher",
        }
    }
}

fn parse_point(raw: &str) -> Result<GeoPoint> {
    let (lat, lon) = raw
        .split_once(',')
        .ok_or_else(|| anyhow!("expected LAT,LON, got {raw}"))?;
    let latitude: f64 = lat.trim().parse().context("latitude is not a number")?;
    let longitude: f64 = lon.trim().parse().context("longitude is not a number")?;
    Ok(GeoPoint::new(latitude, longitude)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/courier.toml"));
    candidates.push(PathBuf::from("configs/courier.dev.toml"));
    let config = AppConfig::load(&candidates)?;
    init_tracing("courier-agent", &config.logging)?;

    let session = match &cli.token {
        Some(token) => SessionContext::with_token(token.clone()),
        None => SessionContext::anonymous(),
    };

    match cli.command {
        Commands::Create {
            name,
            email,
            phone,
            address,
            dropoff,
            item,
        } => {
            let request = CreateOrderRequest {
                customer_info: CustomerInfo {
                    name,
                    email,
                    phone,
                    address,
                    latitude: dropoff.latitude,
                    longitude: dropoff.longitude,
                },
                delivery_item: item,
                preferred_time: Utc::now(),
            };
            let order = create_order(&config, &session, &request).await?;
            println!("{}", order.task_id);
        }
        Commands::Watch { order } => watch_order(&config, order).await?,
        Commands::Locate { order, at } => {
            let gateway = LocationGateway::new(&config.gateway, &session)?;
            gateway
                .submit(&order, at)
                .await
                .map_err(|err| anyhow!("{err}"))?;
            info!(order = %order, lat = at.latitude, lon = at.longitude, "position submitted");
        }
        Commands::Status { order, to, role } => {
            let updated = request_status(&config, &session, &order, to.into(), role).await?;
            println!("{} -> {}", updated.task_id, updated.status);
        }
        Commands::Drive {
            order,
            from,
            to,
            jump,
        } => drive_order(&config, &session, order, from, to, jump).await?,
        Commands::Track {
            order,
            from,
            to,
            step,
        } => track_order(&config, &session, order, from, to, step).await?,
    }

    Ok(())
}

async fn create_order(
    config: &AppConfig,
    session: &SessionContext,
    request: &CreateOrderRequest,
) -> Result<Order> {
    let client = reqwest::Client::builder()
        .timeout(config.gateway.timeout)
        .build()?;
    let url = config.gateway.base_url.join("api/v1/orders")?;
    let mut builder = client.post(url).json(request);
    if let Some(bearer) = session.bearer_header() {
        builder = builder.header(reqwest::header::AUTHORIZATION, bearer);
    }
    let response = builder.send().await.context("order creation failed")?;
    decode_order(response).await
}

async fn request_status(
    config: &AppConfig,
    session: &SessionContext,
    order: &str,
    status: OrderStatus,
    role: CliRole,
) -> Result<Order> {
    let client = reqwest::Client::builder()
        .timeout(config.gateway.timeout)
        .build()?;
    let url = config
        .gateway
        .base_url
        .join(&format!("api/v1/orders/{order}/status"))?;
    let mut builder = client
        .patch(url)
        .header("x-actor-role", role.header_value())
        .json(&StatusPatch { status });
    if let Some(bearer) = session.bearer_header() {
        builder = builder.header(reqwest::header::AUTHORIZATION, bearer);
    }
    let response = builder.send().await.context("status request failed")?;
    decode_order(response).await
}

/// Unwrap `{data}` on success; surface the backend's `{message}` verbatim
/// otherwise.
async fn decode_order(response: reqwest::Response) -> Result<Order> {
    let status = response.status();
    if status.is_success() {
        let body: ApiResponse<Order> = response.json().await?;
        return Ok(body.data);
    }
    match response.json::<ErrorBody>().await {
        Ok(body) if !body.message.is_empty() => bail!("{}", body.message),
        _ => bail!("request failed ({status})"),
    }
}

async fn watch_order(config: &AppConfig, order: String) -> Result<()> {
    let handlers = ChannelHandlers::new()
        .on_connect(|| info!("channel connected"))
        .on_disconnect(|| warn!("channel disconnected"))
        .on_offline(|| warn!("reconnect attempts exhausted; channel offline"))
        .on_order_update(|order: Order| {
            let location = order
                .location
                .map(|point| format!("{:.5},{:.5}", point.latitude, point.longitude))
                .unwrap_or_else(|| "unknown".to_owned());
            println!("{} status={} location={}", order.task_id, order.status, location);
        });
    let client = ChannelClient::new(config.channel.clone(), order, handlers);
    client.connect();
    signal::ctrl_c().await?;
    client.disconnect().await;
    Ok(())
}

async fn drive_order(
    config: &AppConfig,
    session: &SessionContext,
    order: String,
    from: GeoPoint,
    to: GeoPoint,
    jump: Option<f64>,
) -> Result<()> {
    let gateway = Arc::new(LocationGateway::new(&config.gateway, session)?);
    let simulator = Arc::new(RouteSimulator::new(gateway, order, from, to));
    if let Some(progress) = jump {
        let point = simulator
            .jump_to(progress)
            .await
            .map_err(|err| anyhow!("{err}"))?;
        info!(lat = point.latitude, lon = point.longitude, "position submitted");
        return Ok(());
    }

    simulator.start_auto_drive().await;
    info!("auto-drive engaged; ctrl-c to stop");
    signal::ctrl_c().await?;
    simulator.stop_auto_drive().await;
    Ok(())
}

/// Position source that walks the straight line between two points, one
/// step per acquisition. Stands in for a device geolocation adapter.
struct WalkingSource {
    origin: GeoPoint,
    destination: GeoPoint,
    step: f64,
    progress: std::sync::Mutex<f64>,
}

#[async_trait]
impl PositionSource for WalkingSource {
    async fn acquire(&self, _options: AcquisitionOptions) -> Result<PositionFix, AcquisitionError> {
        let mut progress = self.progress.lock().expect("walk state poisoned");
        let point = lerp(self.origin, self.destination, *progress);
        *progress = (*progress + self.step).min(1.0);
        Ok(PositionFix {
            point,
            accuracy_m: 5.0,
            timestamp: Utc::now(),
        })
    }
}

struct LoggingObserver;

impl SampleObserver for LoggingObserver {
    fn on_sample(&self, order_id: &str, fix: &PositionFix) {
        println!(
            "{} sample {:.5},{:.5}",
            order_id, fix.point.latitude, fix.point.longitude
        );
    }
    fn on_submission_error(&self, order_id: &str, message: &str) {
        warn!(order = %order_id, message, "submission failed");
    }
}

async fn track_order(
    config: &AppConfig,
    session: &SessionContext,
    order: String,
    from: GeoPoint,
    to: GeoPoint,
    step: f64,
) -> Result<()> {
    if !(0.0..=1.0).contains(&step) {
        bail!("step must be within 0..1, got {step}");
    }
    let gateway = Arc::new(LocationGateway::new(&config.gateway, session)?);
    let source = Arc::new(WalkingSource {
        origin: from,
        destination: to,
        step,
        progress: std::sync::Mutex::new(0.0),
    });
    let sampler = PositionSampler::new(
        config.tracking.clone(),
        source,
        gateway,
        Arc::new(LoggingObserver),
    );
    sampler.start(&order).await?;
    info!(order = %order, "sampling engaged; ctrl-c to stop");
    signal::ctrl_c().await?;
    sampler.stop();
    Ok(())
}
