// HTTP surface: session lifecycle routes and the session gate

pub mod auth;
pub mod session_gate;

pub use auth::create_auth_router;
pub use session_gate::{require_session, AccessToken};

use crate::config::{AppConfig, SessionSettings};
use crate::credentials::TokenVault;
use crate::oauth::OAuthClient;
use crate::session::SharedSessionStore;
use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub vault: TokenVault,
    pub sessions: SharedSessionStore,
    pub oauth: OAuthClient,
    /// Frontend origin, without trailing slash
    pub frontend_url: String,
    pub session_settings: SessionSettings,
}

impl AppState {
    pub fn from_config(config: &AppConfig, sessions: SharedSessionStore) -> Result<Self> {
        let oauth = OAuthClient::new(
            config.settings.provider.clone(),
            config.credentials.clone(),
            Duration::from_secs(config.settings.http.timeout_seconds),
        )?;

        Ok(Self {
            vault: TokenVault::new(config.token_key.clone()),
            sessions,
            oauth,
            frontend_url: config.frontend_url.clone(),
            session_settings: config.settings.session.clone(),
        })
    }
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

/// Application error types for HTTP endpoints
///
/// Crypto and store detail is logged where it happens, never rendered.
#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    SessionExpired,
    BadGateway(String),
    ServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::SessionExpired => (StatusCode::UNAUTHORIZED, "Session expired".to_string()),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { message })).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

/// GET /api/healthcheck
async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Server is running",
    })
}

/// Create the full API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/api/healthcheck", get(healthcheck))
        .nest("/api/auth", create_auth_router(state))
}

/// CORS for the browser frontend: single origin, cookies allowed
pub fn cors_layer(frontend_url: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(frontend_url).context("Frontend URL is not a valid origin")?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}
