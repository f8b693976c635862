//! HTTP transport for Slack's Events API, slash commands and interactivity.
//!
//! Provides routes for:
//! - `POST /slack/events` - Events API callbacks (including `url_verification`)
//! - `POST /slack/commands` - Slash commands (form encoded)
//! - `POST /slack/actions` - Interactive payloads (form field `payload`)
//! - `GET /health` - Liveness check
//!
//! Every Slack request is checked against the signing secret before it is
//! decoded. Requests are acknowledged with an empty 200 right away and the
//! handler runs in its own task.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{SlackError, SlackResult};
use crate::events::{EventPayload, Inbound, parse_event, parse_interactive};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-slack-signature";
/// Header carrying the request timestamp.
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
/// Header Slack sets when it redelivers an event.
pub const RETRY_NUM_HEADER: &str = "x-slack-retry-num";
/// Requests older than this are rejected as replays.
pub const MAX_REQUEST_AGE_SECS: i64 = 60 * 5;

const SIGNATURE_VERSION: &str = "v0";

/// Verifies Slack request signatures.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> SlackResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| SlackError::Internal(format!("Invalid signing key: {}", e)))?;
        mac.update(SIGNATURE_VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Ok(mac)
    }

    /// Compute the `v0=...` signature for a request.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> SlackResult<String> {
        let mac = self.mac(timestamp, body)?;
        Ok(format!(
            "{}={}",
            SIGNATURE_VERSION,
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    /// Check a request's timestamp and signature against `now` (unix seconds).
    pub fn verify(&self, timestamp: &str, signature: &str, body: &[u8], now: i64) -> SlackResult<()> {
        let ts: i64 = timestamp.trim().parse().map_err(|_| {
            SlackError::SignatureVerification(format!("Invalid timestamp: {}", timestamp))
        })?;
        if now.abs_diff(ts) > MAX_REQUEST_AGE_SECS.unsigned_abs() {
            return Err(SlackError::SignatureVerification(
                "Request timestamp too old".to_string(),
            ));
        }

        let hex_sig = signature
            .strip_prefix("v0=")
            .ok_or_else(|| SlackError::SignatureVerification("Unknown signature version".to_string()))?;
        let expected = hex::decode(hex_sig)
            .map_err(|_| SlackError::SignatureVerification("Malformed signature".to_string()))?;

        self.mac(timestamp, body)?
            .verify_slice(&expected)
            .map_err(|_| SlackError::SignatureVerification("Signature mismatch".to_string()))
    }

    /// Verify using the signature headers of a request.
    pub fn verify_headers(&self, headers: &HeaderMap, body: &[u8]) -> SlackResult<()> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| SlackError::SignatureVerification(format!("Missing {} header", name)))
        };

        let timestamp = header(TIMESTAMP_HEADER)?;
        let signature = header(SIGNATURE_HEADER)?;
        self.verify(timestamp, signature, body, chrono::Utc::now().timestamp())
    }
}

/// Shared state for the HTTP routes.
#[derive(Clone)]
pub struct HttpState {
    pub dispatcher: Arc<Dispatcher>,
    pub verifier: SignatureVerifier,
}

/// Create the Slack routes.
pub fn slack_routes(state: HttpState) -> Router {
    Router::new()
        .route("/slack/events", post(events))
        .route("/slack/commands", post(commands))
        .route("/slack/actions", post(actions))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve the Slack routes until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: HttpState, shutdown: F) -> SlackResult<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SlackError::Network(format!("Failed to bind {}: {}", addr, e)))?;

    info!("Listening for Slack requests on {}", addr);

    axum::serve(listener, slack_routes(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| SlackError::Network(format!("HTTP server error: {}", e)))
}

async fn health() -> &'static str {
    "ok"
}

fn spawn_dispatch(dispatcher: Arc<Dispatcher>, inbound: Inbound) {
    tokio::spawn(async move {
        let handled = dispatcher.dispatch(inbound).await;
        debug!("Dispatched HTTP request: {:?}", handled);
    });
}

fn reject(status: StatusCode, err: &SlackError) -> Response {
    warn!("Rejecting Slack request: {}", err);
    (status, err.to_string()).into_response()
}

async fn events(State(state): State<HttpState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(e) = state.verifier.verify_headers(&headers, &body) {
        return reject(StatusCode::UNAUTHORIZED, &e);
    }

    let payload: EventPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => return reject(StatusCode::BAD_REQUEST, &e.into()),
    };

    if payload.payload_type.as_deref() == Some("url_verification") {
        let challenge = payload.challenge.unwrap_or_default();
        return Json(serde_json::json!({ "challenge": challenge })).into_response();
    }

    if let Some(retry) = headers.get(RETRY_NUM_HEADER).and_then(|v| v.to_str().ok()) {
        debug!(
            retry,
            event_id = payload.event_id.as_deref().unwrap_or(""),
            "Skipping redelivered event"
        );
        return StatusCode::OK.into_response();
    }

    match parse_event(&payload) {
        Ok(event) => {
            spawn_dispatch(state.dispatcher.clone(), Inbound::Event(event));
            StatusCode::OK.into_response()
        }
        Err(e) => reject(StatusCode::BAD_REQUEST, &e),
    }
}

async fn commands(State(state): State<HttpState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(e) = state.verifier.verify_headers(&headers, &body) {
        return reject(StatusCode::UNAUTHORIZED, &e);
    }

    let fields: serde_json::Map<String, serde_json::Value> = url::form_urlencoded::parse(&body)
        .into_owned()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();

    match serde_json::from_value(serde_json::Value::Object(fields)) {
        Ok(command) => {
            spawn_dispatch(state.dispatcher.clone(), Inbound::Command(command));
            StatusCode::OK.into_response()
        }
        Err(e) => reject(StatusCode::BAD_REQUEST, &e.into()),
    }
}

async fn actions(State(state): State<HttpState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(e) = state.verifier.verify_headers(&headers, &body) {
        return reject(StatusCode::UNAUTHORIZED, &e);
    }

    let Some(raw) = url::form_urlencoded::parse(&body)
        .into_owned()
        .find(|(k, _)| k == "payload")
        .map(|(_, v)| v)
    else {
        return reject(
            StatusCode::BAD_REQUEST,
            &SlackError::InvalidPayload("Missing payload field".to_string()),
        );
    };

    let decoded = serde_json::from_str::<serde_json::Value>(&raw)
        .map_err(SlackError::from)
        .and_then(parse_interactive);

    match decoded {
        Ok(Some(action)) => {
            spawn_dispatch(state.dispatcher.clone(), Inbound::Action(action));
            StatusCode::OK.into_response()
        }
        Ok(None) => StatusCode::OK.into_response(),
        Err(e) => {
            error!("Failed to decode interactive payload: {}", e);
            reject(StatusCode::BAD_REQUEST, &e)
        }
    }
}
