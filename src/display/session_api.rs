//! HTTP client for the session server, as consumed by kiosk displays.
//!
//! The trait keeps the display client testable with a scripted double;
//! the HTTP implementation maps response status codes back into the
//! error taxonomy the client branches on.

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::session_machine::SessionStatus;

/// Result alias for session server calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Failures surfaced by the session server API.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The server could not be reached or the response was malformed.
    #[error("session server unreachable: {0}")]
    Network(String),
    /// The request was rejected as invalid.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Credential missing or mismatched.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Session, card, or kiosk not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Duplicate active session or transition not valid right now.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The server failed or is degraded.
    #[error("server error: {0}")]
    Server(String),
}

/// Session as seen over the wire by a display.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSession {
    /// Session identifier.
    pub id: Uuid,
    /// Short human-readable recovery code.
    pub code: String,
    /// Current lifecycle stage.
    pub status: SessionStatus,
    /// Pack bound to the session.
    pub pack_code: String,
    /// Countdown deadline, when armed.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub countdown_ends_at: Option<OffsetDateTime>,
    /// Live-window deadline, when armed.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub live_ends_at: Option<OffsetDateTime>,
    /// Reveal deadline, when armed.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub reveal_ends_at: Option<OffsetDateTime>,
    /// Attached reveal payload, once resolved.
    pub reveal: Option<RemoteReveal>,
}

/// Reveal payload as seen over the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteReveal {
    /// Card name.
    pub name: String,
    /// Set the card belongs to.
    pub set_name: String,
    /// Collector number within the set.
    pub number: String,
    /// Image asset shown during the reveal.
    pub image_url: String,
}

/// Kiosk location as seen over the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteLocation {
    /// Stable identifier for the kiosk.
    pub id: Uuid,
    /// Display name of the kiosk.
    pub name: String,
    /// URL-safe identifier.
    pub slug: String,
}

/// Response of a successful session start.
#[derive(Debug, Clone, Deserialize)]
pub struct StartedSession {
    /// The freshly created session.
    pub session: RemoteSession,
    /// Capability secret for subsequent mutating calls.
    pub control_token: String,
}

/// Polled display snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct DisplaySnapshot {
    /// The kiosk the snapshot describes.
    pub location: RemoteLocation,
    /// Active session, or `None` for standby.
    pub session: Option<RemoteSession>,
}

/// Resolved card reference.
#[derive(Debug, Clone, Deserialize)]
pub struct CardRef {
    /// Inventory item identifier.
    pub item_id: Uuid,
    /// Card name.
    pub name: String,
}

/// Session server operations a display consumes.
pub trait SessionApi: Send + Sync {
    /// Start a session for a scanned pack.
    fn start_session(
        &self,
        pack_code: String,
        location_id: Uuid,
    ) -> BoxFuture<'static, ApiResult<StartedSession>>;
    /// Fetch a session by id (recovery path).
    fn get_session(&self, id: Uuid) -> BoxFuture<'static, ApiResult<RemoteSession>>;
    /// Poll the display snapshot for a kiosk.
    fn get_display_snapshot(&self, slug: String) -> BoxFuture<'static, ApiResult<DisplaySnapshot>>;
    /// Request a stage advance with the session credential.
    fn advance_stage(
        &self,
        id: Uuid,
        stage: SessionStatus,
        credential: String,
    ) -> BoxFuture<'static, ApiResult<RemoteSession>>;
    /// Attach a resolved card with the session credential.
    fn attach_reveal(
        &self,
        id: Uuid,
        item_id: Uuid,
        credential: String,
    ) -> BoxFuture<'static, ApiResult<RemoteSession>>;
    /// Resolve a scanned card code.
    fn lookup_card(&self, code: String) -> BoxFuture<'static, ApiResult<CardRef>>;
}

/// Production [`SessionApi`] over `reqwest`.
#[derive(Clone)]
pub struct HttpSessionApi {
    client: Client,
    base_url: Arc<str>,
}

impl HttpSessionApi {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: impl AsRef<str>) -> ApiResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|err| ApiError::Network(err.to_string()))?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url.as_ref().trim_end_matches('/')),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Best-effort extraction of the server's `{"message": ...}` error body.
async fn error_message(response: reqwest::Response) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    match response.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => "no error detail".to_string(),
    }
}

async fn handle<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|err| ApiError::Network(format!("malformed response: {err}")));
    }

    let message = error_message(response).await;
    Err(match status {
        StatusCode::BAD_REQUEST => ApiError::BadRequest(message),
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        StatusCode::CONFLICT => ApiError::Conflict(message),
        _ => ApiError::Server(message),
    })
}

impl SessionApi for HttpSessionApi {
    fn start_session(
        &self,
        pack_code: String,
        location_id: Uuid,
    ) -> BoxFuture<'static, ApiResult<StartedSession>> {
        let api = self.clone();
        Box::pin(async move {
            let response = api
                .client
                .post(api.url("/sessions"))
                .json(&json!({ "pack_code": pack_code, "location_id": location_id }))
                .send()
                .await
                .map_err(|err| ApiError::Network(err.to_string()))?;
            handle(response).await
        })
    }

    fn get_session(&self, id: Uuid) -> BoxFuture<'static, ApiResult<RemoteSession>> {
        let api = self.clone();
        Box::pin(async move {
            let response = api
                .client
                .get(api.url(&format!("/sessions/{id}")))
                .send()
                .await
                .map_err(|err| ApiError::Network(err.to_string()))?;
            handle(response).await
        })
    }

    fn get_display_snapshot(&self, slug: String) -> BoxFuture<'static, ApiResult<DisplaySnapshot>> {
        let api = self.clone();
        Box::pin(async move {
            let response = api
                .client
                .get(api.url(&format!("/display/{slug}")))
                .send()
                .await
                .map_err(|err| ApiError::Network(err.to_string()))?;
            handle(response).await
        })
    }

    fn advance_stage(
        &self,
        id: Uuid,
        stage: SessionStatus,
        credential: String,
    ) -> BoxFuture<'static, ApiResult<RemoteSession>> {
        let api = self.clone();
        Box::pin(async move {
            let response = api
                .client
                .post(api.url(&format!("/sessions/{id}/advance")))
                .bearer_auth(credential)
                .json(&json!({ "stage": stage }))
                .send()
                .await
                .map_err(|err| ApiError::Network(err.to_string()))?;
            handle(response).await
        })
    }

    fn attach_reveal(
        &self,
        id: Uuid,
        item_id: Uuid,
        credential: String,
    ) -> BoxFuture<'static, ApiResult<RemoteSession>> {
        let api = self.clone();
        Box::pin(async move {
            let response = api
                .client
                .post(api.url(&format!("/sessions/{id}/reveal")))
                .bearer_auth(credential)
                .json(&json!({ "item_id": item_id }))
                .send()
                .await
                .map_err(|err| ApiError::Network(err.to_string()))?;
            handle(response).await
        })
    }

    fn lookup_card(&self, code: String) -> BoxFuture<'static, ApiResult<CardRef>> {
        let api = self.clone();
        Box::pin(async move {
            let response = api
                .client
                .get(api.url(&format!("/cards/{code}")))
                .send()
                .await
                .map_err(|err| ApiError::Network(err.to_string()))?;
            handle(response).await
        })
    }
}
