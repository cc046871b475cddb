//! # Sync Client
//!
//! Stateless HTTP façade over the FindMy device API.
//!
//! ## Request Flow
//! ```text
//! ┌──────────────┐   JSON + Bearer token   ┌──────────────────────────────┐
//! │  SyncClient  │ ──────────────────────► │  FindMy server               │
//! │  (reqwest)   │ ◄────────────────────── │  {status, message, data, ..} │
//! └──────────────┘      ApiEnvelope        └──────────────────────────────┘
//!        │
//!        └── non-2xx or status ∉ {ok, success}  ──►  SyncError::ServerRejected
//! ```
//!
//! Every request uses the fixed connect/read timeout from config. Nothing is
//! retried here: callers log the failure and move on to their next cycle.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::validate_server_url;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    AckRequest, ApiEnvelope, LocationUpload, RegisterRequest, RemoteCommand, SimChangeReport,
};

/// Path prefix for per-device endpoints.
const DEVICES: &str = "devices";

// =============================================================================
// Remote API Trait
// =============================================================================

/// Operations the engine needs from the server.
///
/// [`SyncClient`] is the HTTP implementation; tests substitute recorders.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Registers the device and returns the token to persist.
    async fn register(&self, request: &RegisterRequest) -> SyncResult<String>;

    async fn upload_location(
        &self,
        device_id: &str,
        auth_token: &str,
        location: &LocationUpload,
    ) -> SyncResult<()>;

    /// Fetches commands with an id greater than `since_id`.
    async fn poll_commands(
        &self,
        device_id: &str,
        auth_token: &str,
        since_id: i64,
    ) -> SyncResult<Vec<RemoteCommand>>;

    async fn ack_command(
        &self,
        device_id: &str,
        auth_token: &str,
        command_id: i64,
        ack: &AckRequest,
    ) -> SyncResult<()>;

    async fn report_sim_change(
        &self,
        device_id: &str,
        auth_token: &str,
        report: &SimChangeReport,
    ) -> SyncResult<()>;
}

// =============================================================================
// HTTP Client
// =============================================================================

/// reqwest-backed [`RemoteApi`].
#[derive(Debug, Clone)]
pub struct SyncClient {
    http: Client,
    base_url: Url,
}

impl SyncClient {
    /// Creates a client for `base_url` with a fixed per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let base_url = validate_server_url(base_url)?;
        let http = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("findmy-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(SyncClient { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/api/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> SyncResult<ApiEnvelope> {
        let response = request.send().await?;
        read_envelope(response).await
    }
}

/// Decodes the envelope and applies the success rule.
async fn read_envelope(response: Response) -> SyncResult<ApiEnvelope> {
    let status = response.status();
    let body = response.text().await?;
    let envelope = serde_json::from_str::<ApiEnvelope>(&body);

    if !status.is_success() {
        let message = match &envelope {
            Ok(envelope) => envelope.failure_message(),
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        };
        return Err(SyncError::ServerRejected {
            status: status.as_u16(),
            message,
        });
    }

    let envelope = envelope?;
    if !envelope.is_success() {
        return Err(SyncError::ServerRejected {
            status: status.as_u16(),
            message: envelope.failure_message(),
        });
    }
    Ok(envelope)
}

#[async_trait]
impl RemoteApi for SyncClient {
    async fn register(&self, request: &RegisterRequest) -> SyncResult<String> {
        let url = self.endpoint(&["register_device"])?;
        debug!(device_id = %request.device_id, "Registering device");

        let envelope = self.send(self.http.post(url).json(request)).await?;
        match envelope.device_token.filter(|t| !t.is_empty()) {
            Some(token) => Ok(token),
            None => {
                // Servers that accept the offered token do not echo it back
                warn!("Registration response carried no device_token, keeping offered token");
                Ok(request.auth_token.clone())
            }
        }
    }

    async fn upload_location(
        &self,
        device_id: &str,
        auth_token: &str,
        location: &LocationUpload,
    ) -> SyncResult<()> {
        let url = self.endpoint(&[DEVICES, device_id, "location"])?;
        self.send(self.http.post(url).bearer_auth(auth_token).json(location))
            .await?;
        Ok(())
    }

    async fn poll_commands(
        &self,
        device_id: &str,
        auth_token: &str,
        since_id: i64,
    ) -> SyncResult<Vec<RemoteCommand>> {
        let mut url = self.endpoint(&[DEVICES, device_id, "commands", "poll"])?;
        url.query_pairs_mut()
            .append_pair("since_id", &since_id.to_string());

        let envelope = self.send(self.http.get(url).bearer_auth(auth_token)).await?;
        envelope.into_commands()
    }

    async fn ack_command(
        &self,
        device_id: &str,
        auth_token: &str,
        command_id: i64,
        ack: &AckRequest,
    ) -> SyncResult<()> {
        let command_id = command_id.to_string();
        let url = self.endpoint(&[DEVICES, device_id, "commands", &command_id, "ack"])?;
        self.send(self.http.post(url).bearer_auth(auth_token).json(ack))
            .await?;
        Ok(())
    }

    async fn report_sim_change(
        &self,
        device_id: &str,
        auth_token: &str,
        report: &SimChangeReport,
    ) -> SyncResult<()> {
        let url = self.endpoint(&[DEVICES, device_id, "sim_change"])?;
        self.send(self.http.post(url).bearer_auth(auth_token).json(report))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SimInfo;
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Seen {
        bearer: Vec<Option<String>>,
        bodies: Vec<(String, Value)>,
        since_ids: Vec<String>,
    }

    type Shared = Arc<Mutex<Seen>>;

    fn bearer(headers: &HeaderMap) -> Option<String> {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    async fn register(State(seen): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        let echo = body["device_id"] == "echo-less";
        seen.lock().unwrap().bodies.push(("register".into(), body));
        if echo {
            Json(json!({"status": "ok"}))
        } else {
            Json(json!({"status": "ok", "device_token": "server-token"}))
        }
    }

    async fn poll(
        State(seen): State<Shared>,
        Path(id): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> (StatusCode, Json<Value>) {
        let mut seen = seen.lock().unwrap();
        seen.bearer.push(bearer(&headers));
        seen.since_ids
            .push(query.get("since_id").cloned().unwrap_or_default());

        if id == "unauthorized" {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"status": "error", "message": "Unauthorized"})),
            );
        }
        if id == "soft-error" {
            return (
                StatusCode::OK,
                Json(json!({"status": "error", "message": "Device not found"})),
            );
        }
        (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "data": [
                    {"id": "5", "type": "LOCK", "payload": {}, "created_at": "2024-05-01 10:00:00"},
                    {"id": "6", "type": "RING", "payload": null}
                ]
            })),
        )
    }

    async fn ack(
        State(seen): State<Shared>,
        Path((id, command_id)): Path<(String, String)>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let mut seen = seen.lock().unwrap();
        seen.bearer.push(bearer(&headers));
        seen.bodies.push((format!("ack:{}:{}", id, command_id), body));
        Json(json!({"status": "success"}))
    }

    async fn record(
        State(seen): State<Shared>,
        Path(id): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let mut seen = seen.lock().unwrap();
        seen.bearer.push(bearer(&headers));
        seen.bodies.push((format!("device:{}", id), body));
        Json(json!({"status": "ok"}))
    }

    async fn spawn_server() -> (SyncClient, Shared) {
        let seen = Shared::default();
        let app = Router::new()
            .route("/api/register_device", post(register))
            .route("/api/devices/{id}/commands/poll", get(poll))
            .route("/api/devices/{id}/commands/{command_id}/ack", post(ack))
            .route("/api/devices/{id}/location", post(record))
            .route("/api/devices/{id}/sim_change", post(record))
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client =
            SyncClient::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        (client, seen)
    }

    fn register_request(device_id: &str) -> RegisterRequest {
        RegisterRequest {
            device_id: device_id.into(),
            device_name: "Pixel 7".into(),
            auth_token: "0123456789abcdef0123456789abcdef".into(),
            model: "Pixel 7".into(),
            os_version: "14".into(),
            fcm_token: None,
        }
    }

    #[tokio::test]
    async fn test_register_returns_server_token() {
        let (client, seen) = spawn_server().await;

        let token = client.register(&register_request("dev123")).await.unwrap();
        assert_eq!(token, "server-token");

        let seen = seen.lock().unwrap();
        let (_, body) = &seen.bodies[0];
        assert_eq!(body["device_id"], "dev123");
        assert_eq!(body["auth_token"], "0123456789abcdef0123456789abcdef");
        assert_eq!(body["fcm_token"], Value::Null);
    }

    #[tokio::test]
    async fn test_register_keeps_offered_token_without_echo() {
        let (client, _) = spawn_server().await;
        let token = client.register(&register_request("echo-less")).await.unwrap();
        assert_eq!(token, "0123456789abcdef0123456789abcdef");
    }

    #[tokio::test]
    async fn test_poll_sends_bearer_and_cursor() {
        let (client, seen) = spawn_server().await;

        let commands = client.poll_commands("dev123", "tok", 4).await.unwrap();
        assert_eq!(
            commands.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![5, 6]
        );
        assert_eq!(commands[1].command_type.as_deref(), Some("RING"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.bearer[0].as_deref(), Some("Bearer tok"));
        assert_eq!(seen.since_ids[0], "4");
    }

    #[tokio::test]
    async fn test_http_error_is_rejected() {
        let (client, _) = spawn_server().await;

        let err = client
            .poll_commands("unauthorized", "bad", 0)
            .await
            .unwrap_err();
        match &err {
            SyncError::ServerRejected { status, message } => {
                assert_eq!(*status, 401);
                assert_eq!(message, "Unauthorized");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!err.is_retryable());
        assert!(err.is_network_failure());
    }

    #[tokio::test]
    async fn test_error_envelope_with_200_is_rejected() {
        let (client, _) = spawn_server().await;
        let err = client.poll_commands("soft-error", "tok", 0).await.unwrap_err();
        assert!(matches!(err, SyncError::ServerRejected { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_ack_location_and_sim_change_paths() {
        let (client, seen) = spawn_server().await;

        let ack = AckRequest {
            status: "acked".into(),
            message: "Device locked".into(),
            executed_at: 1_714_558_272,
        };
        client.ack_command("dev123", "tok", 42, &ack).await.unwrap();

        let location = LocationUpload {
            lat: 52.5,
            lng: 13.4,
            accuracy: -1.0,
            timestamp: 1_714_558_272_000,
            provider: "gps".into(),
        };
        client
            .upload_location("dev123", "tok", &location)
            .await
            .unwrap();

        let report = SimChangeReport {
            old_sim: None,
            new_sim: SimInfo {
                serial: "8901".into(),
                operator: Some("Carrier".into()),
                number: None,
            },
            location: None,
        };
        client
            .report_sim_change("dev123", "tok", &report)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.bodies[0].0, "ack:dev123:42");
        assert_eq!(seen.bodies[0].1["status"], "acked");
        assert_eq!(seen.bodies[1].1["accuracy"], json!(-1.0));
        assert_eq!(seen.bodies[2].1["new_sim"]["serial"], "8901");
        assert!(seen.bearer.iter().all(|b| b.as_deref() == Some("Bearer tok")));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            SyncClient::new(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
        let err = client.poll_commands("dev123", "tok", 0).await.unwrap_err();
        assert!(err.is_network_failure());
        assert_eq!(err.kind(), "network_failure");
    }

    #[test]
    fn test_endpoint_encodes_segments_under_base_path() {
        let client =
            SyncClient::new("https://example.com/findmy/", Duration::from_secs(1)).unwrap();
        let url = client.endpoint(&[DEVICES, "dev 1", "location"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/findmy/api/devices/dev%201/location"
        );
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        assert!(SyncClient::new("ftp://example.com", Duration::from_secs(1)).is_err());
    }
}
