//! Session lifecycle routes.
//!
//! Login is the authorization code flow:
//! 1. Browser hits GET /api/auth/login → 302 to the provider
//! 2. User authorizes on the provider's site
//! 3. Provider redirects to GET /api/auth/callback?code=...
//! 4. Code is exchanged, both tokens sealed into a fresh session
//! 5. Browser lands on the dashboard holding only the session cookie

use super::{require_session, AccessToken, AppError, AppState};
use crate::credentials::OAuthTokenSet;
use crate::session::cookie::{clear_session_cookie, session_cookie, session_id_from_headers};
use crate::session::{Session, SessionId};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Generic markers placed in the login error redirect
const ERROR_AUTH_FAILED: &str = "auth_failed";
const ERROR_MISSING_CODE: &str = "missing_code";

/// Authorization callback query parameters
#[derive(Debug, Deserialize)]
pub struct AuthCallback {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(rename = "isAuthenticated")]
    is_authenticated: bool,
}

/// Create the session lifecycle router, mounted at /api/auth
pub fn create_auth_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/account", get(account))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/logout", get(logout))
        .route("/status", get(status))
        .merge(protected)
        .with_state(state)
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn login_error_redirect(state: &AppState, marker: &str) -> Response {
    found(format!("{}/login?error={}", state.frontend_url, marker))
}

/// GET /api/auth/login
async fn login(State(state): State<Arc<AppState>>) -> Response {
    debug!("Redirecting to OAuth provider");
    found(state.oauth.authorize_url())
}

/// GET /api/auth/callback
///
/// Every failure lands on the frontend login page with a generic marker;
/// the detail stays in the server log.
async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<AuthCallback>, QueryRejection>,
) -> Response {
    let params = match query {
        Ok(Query(params)) => params,
        Err(e) => {
            warn!(error = %e, "Unreadable OAuth callback query");
            return login_error_redirect(&state, ERROR_AUTH_FAILED);
        }
    };

    if let Some(error) = params.error {
        warn!(
            error = %error,
            description = %params.error_description.as_deref().unwrap_or("none"),
            "OAuth authorization denied"
        );
        return login_error_redirect(&state, ERROR_AUTH_FAILED);
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        warn!("OAuth callback without authorization code");
        return login_error_redirect(&state, ERROR_MISSING_CODE);
    };

    let tokens = match state.oauth.exchange_code(&code).await {
        Ok(tokens) => tokens,
        Err(e) => {
            error!(error = %e, "Authorization code exchange failed");
            return login_error_redirect(&state, ERROR_AUTH_FAILED);
        }
    };

    // Never carry a pre-login session id across authentication
    if let Some(previous) = session_id_from_headers(&headers, &state.session_settings.cookie_name) {
        if let Err(e) = state.sessions.delete(&previous) {
            warn!(session = %previous.log_prefix(), error = %e, "Failed to drop previous session");
        }
    }

    let id = match create_session(&state, &tokens) {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "Failed to create session");
            return login_error_redirect(&state, ERROR_AUTH_FAILED);
        }
    };

    info!(
        session = %id.log_prefix(),
        has_refresh_token = tokens.refresh_token.is_some(),
        "Login complete"
    );

    (
        StatusCode::FOUND,
        [
            (header::LOCATION, format!("{}/dashboard", state.frontend_url)),
            (header::SET_COOKIE, session_cookie(&state.session_settings, &id)),
        ],
    )
        .into_response()
}

/// Seal both tokens into a new session and persist it
fn create_session(state: &AppState, tokens: &OAuthTokenSet) -> Result<SessionId> {
    let access_record = state
        .vault
        .seal(&tokens.access_token)
        .context("Failed to seal access token")?;

    let refresh_record = tokens
        .refresh_token
        .as_deref()
        .map(|token| state.vault.seal(token))
        .transpose()
        .context("Failed to seal refresh token")?;

    let id = SessionId::generate();
    state
        .sessions
        .put(&id, &Session::new(access_record, refresh_record))?;

    Ok(id)
}

/// GET /api/auth/logout
///
/// Idempotent: a missing or already-destroyed session still logs out.
async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response, AppError> {
    if let Some(id) = session_id_from_headers(&headers, &state.session_settings.cookie_name) {
        state.sessions.delete(&id).map_err(|e| {
            error!(session = %id.log_prefix(), error = %e, "Failed to destroy session on logout");
            AppError::ServerError("Logout failed".to_string())
        })?;
        info!(session = %id.log_prefix(), "Logged out");
    }

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie(&state.session_settings))],
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    )
        .into_response())
}

/// GET /api/auth/status
///
/// Only checks that a session holds an access token record; nothing is
/// decrypted and the provider is not called.
async fn status(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<StatusResponse> {
    let is_authenticated = match session_id_from_headers(&headers, &state.session_settings.cookie_name) {
        Some(id) => match state.sessions.get(&id) {
            Ok(session) => session.is_some_and(|s| s.is_authenticated()),
            Err(e) => {
                warn!(session = %id.log_prefix(), error = %e, "Session lookup failed");
                false
            }
        },
        None => false,
    };

    Json(StatusResponse { is_authenticated })
}

/// GET /api/auth/account
async fn account(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<AccessToken>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.oauth.fetch_account(token.secret()).await.map(Json).map_err(|e| {
        warn!(error = %e, "Account request failed");
        AppError::BadGateway("Failed to fetch account".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_query_with_code() {
        let params: AuthCallback = serde_urlencoded::from_str("code=abc123&state=ignored").unwrap();
        assert_eq!(params.code.as_deref(), Some("abc123"));
        assert!(params.error.is_none());
    }

    #[test]
    fn test_callback_query_with_provider_error() {
        let params: AuthCallback =
            serde_urlencoded::from_str("error=access_denied&error_description=User%20denied").unwrap();
        assert!(params.code.is_none());
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("User denied"));
    }

    #[test]
    fn test_callback_query_with_repeated_code_is_rejected() {
        assert!(serde_urlencoded::from_str::<AuthCallback>("code=a&code=b").is_err());
    }

    #[test]
    fn test_status_response_field_name() {
        let json = serde_json::to_value(StatusResponse { is_authenticated: true }).unwrap();
        assert_eq!(json, serde_json::json!({"isAuthenticated": true}));
    }
}
