//! ---
//! trk_section: "04-backend-of-record"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Backend of record for orders and live updates."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use courier_proto::{
    ActorRole, ApiResponse, CreateOrderRequest, ErrorBody, LocationPatch, Order, ServerEvent,
    StatusPatch,
};
use prometheus::{Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::hub::UpdateHub;
use crate::store::{OrderStore, StoreError};

/// Header carrying the acting role for status transitions. Absent or
/// unknown values fall back to the dispatcher role.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

struct ApiState {
    store: Arc<OrderStore>,
    hub: UpdateHub,
    metrics: Option<Arc<Registry>>,
}

impl ApiState {
    /// Rebroadcast the updated projection into the order's room.
    fn publish(&self, order: &Order) {
        self.hub.publish(ServerEvent::OrderUpdate {
            data: order.clone(),
        });
    }
}

/// Builder for the combined REST + channel server.
pub struct ApiServerBuilder {
    listen: SocketAddr,
    store: Arc<OrderStore>,
    hub: UpdateHub,
    metrics: Option<Arc<Registry>>,
}

impl ApiServerBuilder {
    pub fn new(listen: SocketAddr, store: Arc<OrderStore>, hub: UpdateHub) -> Self {
        Self {
            listen,
            store,
            hub,
            metrics: None,
        }
    }

    /// Attach a Prometheus registry exposed at `/metrics`.
    pub fn with_metrics_registry(mut self, registry: Arc<Registry>) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Spawn the server and return a shutdown handle.
    pub async fn spawn(self) -> anyhow::Result<ApiServerHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "api server listening");

        let state = Arc::new(ApiState {
            store: self.store,
            hub: self.hub,
            metrics: self.metrics,
        });
        let router = Router::new()
            .route("/api/v1/orders", post(create_order).get(list_orders))
            .route("/api/v1/orders/:task_id", get(get_order).patch(patch_order))
            .route("/api/v1/orders/:task_id/location", patch(patch_location))
            .route("/api/v1/orders/:task_id/status", patch(patch_status))
            .route("/ws", get(upgrade_channel))
            .route("/metrics", get(get_metrics))
            .with_state(state);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "api server exited with error");
            }
        });

        Ok(ApiServerHandle {
            address: local_addr,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Handle for the running server.
pub struct ApiServerHandle {
    address: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ApiServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Trigger graceful shutdown and await completion.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(()) => Ok(()),
            Err(err) => Err(anyhow::anyhow!(err)),
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::IllegalTransition { .. } => StatusCode::CONFLICT,
            StoreError::InvalidLocation(_) => StatusCode::BAD_REQUEST,
        };
        (
            status,
            Json(ErrorBody {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

async fn create_order(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateOrderRequest>,
) -> Response {
    let order = state.store.create(request).await;
    state.publish(&order);
    (StatusCode::CREATED, Json(ApiResponse { data: order })).into_response()
}

async fn list_orders(State(state): State<Arc<ApiState>>) -> Response {
    let orders = state.store.list().await;
    Json(ApiResponse { data: orders }).into_response()
}

async fn get_order(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<String>,
) -> Response {
    match state.store.get(&task_id).await {
        Ok(order) => Json(ApiResponse { data: order }).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn patch_location(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<String>,
    Json(patch): Json<LocationPatch>,
) -> Response {
    apply_location(&state, &task_id, patch).await
}

/// Simulation path: `PATCH /orders/{taskId}` with a location body has the
/// same semantic effect as the dedicated location endpoint.
async fn patch_order(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<String>,
    Json(patch): Json<LocationPatch>,
) -> Response {
    apply_location(&state, &task_id, patch).await
}

async fn apply_location(state: &ApiState, task_id: &str, patch: LocationPatch) -> Response {
    match state.store.update_location(task_id, patch.location).await {
        Ok(order) => {
            state.publish(&order);
            Json(ApiResponse { data: order }).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn patch_status(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<StatusPatch>,
) -> Response {
    let role = actor_role(&headers);
    match state.store.update_status(&task_id, patch.status, role).await {
        Ok(order) => {
            state.publish(&order);
            Json(ApiResponse { data: order }).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn upgrade_channel(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> Response {
    ws.on_upgrade(move |socket| async move { state.hub.client_loop(socket).await })
}

async fn get_metrics(State(state): State<Arc<ApiState>>) -> Response {
    let Some(registry) = &state.metrics else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics registry unavailable",
        )
            .into_response();
    };
    let encoder = TextEncoder::new();
    let families = registry.gather();
    match encoder.encode_to_string(&families) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn actor_role(headers: &HeaderMap) -> ActorRole {
    match headers
        .get(ACTOR_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("agent") => ActorRole::Agent,
        Some("customer") => ActorRole::Customer,
        _ => ActorRole::Dispatcher,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn actor_role_header_parses_case_insensitively() {
        let mut headers = HeaderMap::new();
        assert_eq!(actor_role(&headers), ActorRole::Dispatcher);

        headers.insert(ACTOR_ROLE_HEADER, HeaderValue::from_static("Agent"));
        assert_eq!(actor_role(&headers), ActorRole::Agent);

        headers.insert(ACTOR_ROLE_HEADER, HeaderValue::from_static("customer"));
        assert_eq!(actor_role(&headers), ActorRole::Customer);

        headers.insert(ACTOR_ROLE_HEADER, HeaderValue::from_static("robot"));
        assert_eq!(actor_role(&headers), ActorRole::Dispatcher);
    }

    #[test]
    fn store_errors_map_to_http_statuses() {
        let not_found = StoreError::NotFound("task-1".into()).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict = StoreError::IllegalTransition {
            from: courier_proto::OrderStatus::Scheduled,
            to: courier_proto::OrderStatus::Delivered,
            role: ActorRole::Agent,
        }
        .into_response();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
    }
}
