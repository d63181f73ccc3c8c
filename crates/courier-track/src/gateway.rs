//! ---
//! trk_section: "03-live-tracking"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Client-side tracking core for live delivery views."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use courier_common::config::GatewayConfig;
use courier_common::geo::GeoPoint;
use courier_common::session::SessionContext;
use courier_proto::{ErrorBody, LocationPatch};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

/// Submission failures. The display text is what reaches the user, so it
/// prefers the backend-provided message and falls back to a generic
/// status-code or network message.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Backend rejected the submission with an explicit message.
    #[error("{0}")]
    Rejected(String),
    /// Backend answered with a non-success status and no message body.
    #[error("failed to update location ({0})")]
    Status(StatusCode),
    /// The request never produced a response.
    #[error("failed to update location (network error)")]
    Network(#[source] reqwest::Error),
    #[error("invalid gateway url: {0}")]
    InvalidUrl(String),
}

/// Pushes accepted position samples to the backend of record over HTTP,
/// independent of the live channel. One request per sample, no queue and
/// no retry: a dropped update is superseded by the next interval tick.
pub struct LocationGateway {
    client: reqwest::Client,
    base_url: Url,
}

impl LocationGateway {
    /// Build a gateway bound to the configured backend, attaching the
    /// session's bearer token to every request.
    pub fn new(config: &GatewayConfig, session: &SessionContext) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(bearer) = session.bearer_header() {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&bearer)?);
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Submit a sample via `PATCH /orders/{id}/location`.
    pub async fn submit(&self, order_id: &str, point: GeoPoint) -> Result<(), GatewayError> {
        let url = self.endpoint(&format!("api/v1/orders/{order_id}/location"))?;
        self.patch_location(url, order_id, point).await
    }

    /// Submit a sample via the alternate `PATCH /orders/{id}` endpoint.
    /// Same semantic effect; used by the route simulator.
    pub async fn submit_via_order_patch(
        &self,
        order_id: &str,
        point: GeoPoint,
    ) -> Result<(), GatewayError> {
        let url = self.endpoint(&format!("api/v1/orders/{order_id}"))?;
        self.patch_location(url, order_id, point).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|err| GatewayError::InvalidUrl(err.to_string()))
    }

    async fn patch_location(
        &self,
        url: Url,
        order_id: &str,
        point: GeoPoint,
    ) -> Result<(), GatewayError> {
        debug!(order = %order_id, lat = point.latitude, lon = point.longitude, "submitting location");
        let response = self
            .client
            .patch(url)
            .json(&LocationPatch { location: point })
            .send()
            .await
            .map_err(GatewayError::Network)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match response.json::<ErrorBody>().await {
            Ok(body) if !body.message.is_empty() => Err(GatewayError::Rejected(body.message)),
            _ => Err(GatewayError::Status(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_text_prefers_backend_message() {
        let rejected = GatewayError::Rejected("order not found".into());
        assert_eq!(rejected.to_string(), "order not found");

        let status = GatewayError::Status(StatusCode::NOT_FOUND);
        assert_eq!(status.to_string(), "failed to update location (404 Not Found)");
    }

    #[test]
    fn builds_location_endpoint_from_base_url() {
        let config = GatewayConfig::default();
        let gateway =
            LocationGateway::new(&config, &SessionContext::anonymous()).expect("gateway");
        let url = gateway
            .endpoint("api/v1/orders/task-1/location")
            .expect("endpoint");
        assert!(url.as_str().ends_with("/api/v1/orders/task-1/location"));
    }
}
