//! Per-request session gate.
//!
//! Opens the sealed provider tokens held in the session, probes the provider,
//! refreshes on expiry, and hands the live access token to downstream
//! handlers as an [`AccessToken`] request extension.
//!
//! # States
//!
//! ```text
//! NoSession ───────────────────────────────────────────────► 401
//! SessionPresent ──open fails──────────────────────────────► Invalid
//!        │ open ok
//!        ▼
//! TokenDecrypted ──probe 2xx / transient error─────────────► Valid
//!        │ probe 401
//!        ├──no refresh record──────────────────────────────► Invalid
//!        ▼
//! Refreshing ──open or refresh fails───────────────────────► Invalid
//!        │ refresh ok: reseal, persist
//!        ▼
//! Valid ───────────────────────────────────────────────────► next handler
//! Invalid ──destroy session (errors logged)────────────────► 401
//! ```
//!
//! Two requests on the same session may both see the probe fail and both
//! refresh. With single-use refresh tokens the second refresh fails and the
//! session is destroyed. There is no per-session lock around refresh.

use super::{AppError, AppState};
use crate::credentials::CryptoError;
use crate::oauth::ProbeOutcome;
use crate::session::cookie::{clear_session_cookie, session_id_from_headers};
use crate::session::{Session, SessionId};
use anyhow::Result;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};


/// Live provider access token, attached to the request by the gate.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Why a session was invalidated
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InvalidReason {
    /// A sealed record was missing, malformed, or failed authentication
    Crypto(CryptoError),
    /// Provider rejected the access token and there is no refresh token
    TokenRejected,
    /// Provider refused the refresh token
    RefreshFailed,
}

/// Gate state for one request
#[derive(Debug)]
pub(crate) enum GateState {
    NoSession,
    SessionPresent {
        id: SessionId,
        session: Session,
    },
    TokenDecrypted {
        id: SessionId,
        session: Session,
        access_token: AccessToken,
    },
    Refreshing {
        id: SessionId,
        session: Session,
    },
    Valid {
        access_token: AccessToken,
    },
    Invalid {
        id: SessionId,
        reason: InvalidReason,
    },
}

/// Terminal result of running the gate
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum GateDecision {
    Proceed(AccessToken),
    NoSession,
    Invalidated(InvalidReason),
}

impl GateState {
    /// Load the session named by the cookie.
    ///
    /// A store read error is returned as-is; it is neither a valid nor an
    /// invalid session.
    pub(crate) fn load(state: &AppState, id: Option<SessionId>) -> Result<Self> {
        let Some(id) = id else {
            return Ok(GateState::NoSession);
        };

        Ok(match state.sessions.get(&id)? {
            Some(session) => GateState::SessionPresent { id, session },
            None => GateState::NoSession,
        })
    }

    /// Advance one transition. Terminal states are returned unchanged.
    pub(crate) async fn step(self, state: &AppState) -> GateState {
        match self {
            GateState::SessionPresent { id, session } => open_access_token(state, id, session),
            GateState::TokenDecrypted {
                id,
                session,
                access_token,
            } => probe_access_token(state, id, session, access_token).await,
            GateState::Refreshing { id, session } => refresh_tokens(state, id, session).await,
            terminal => terminal,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            GateState::NoSession | GateState::Valid { .. } | GateState::Invalid { .. }
        )
    }
}

/// SessionPresent: open the access token record
fn open_access_token(state: &AppState, id: SessionId, session: Session) -> GateState {
    match state.vault.open(session.access_token_record.as_ref()) {
        Ok(token) => GateState::TokenDecrypted {
            id,
            session,
            access_token: AccessToken(token),
        },
        Err(e) => GateState::Invalid {
            id,
            reason: InvalidReason::Crypto(e),
        },
    }
}

/// TokenDecrypted: ask the provider whether the token is still accepted
async fn probe_access_token(
    state: &AppState,
    id: SessionId,
    session: Session,
    access_token: AccessToken,
) -> GateState {
    match state.oauth.probe(access_token.secret()).await {
        ProbeOutcome::Valid => GateState::Valid { access_token },
        ProbeOutcome::Unauthorized if session.refresh_token_record.is_some() => {
            debug!(session = %id.log_prefix(), "Access token rejected, refreshing");
            GateState::Refreshing { id, session }
        }
        ProbeOutcome::Unauthorized => GateState::Invalid {
            id,
            reason: InvalidReason::TokenRejected,
        },
        ProbeOutcome::Transient(detail) => {
            // A revoked token will fail again at the real call site
            warn!(
                session = %id.log_prefix(),
                detail = %detail,
                "Token probe inconclusive, proceeding with current token"
            );
            GateState::Valid { access_token }
        }
    }
}

/// Refreshing: trade the refresh token for new tokens and reseal them
async fn refresh_tokens(state: &AppState, id: SessionId, mut session: Session) -> GateState {
    let refresh_token = match state.vault.open(session.refresh_token_record.as_ref()) {
        Ok(token) => token,
        Err(e) => {
            return GateState::Invalid {
                id,
                reason: InvalidReason::Crypto(e),
            }
        }
    };

    let tokens = match state.oauth.refresh(&refresh_token).await {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!(session = %id.log_prefix(), error = %e, "Token refresh failed");
            return GateState::Invalid {
                id,
                reason: InvalidReason::RefreshFailed,
            };
        }
    };

    let access_record = match state.vault.seal(&tokens.access_token) {
        Ok(record) => record,
        Err(e) => {
            return GateState::Invalid {
                id,
                reason: InvalidReason::Crypto(e),
            }
        }
    };

    // Keep the existing refresh record unless the provider rotated it
    let rotated = tokens.refresh_token.is_some();
    if let Some(new_refresh) = tokens.refresh_token.as_deref() {
        match state.vault.seal(new_refresh) {
            Ok(record) => session.refresh_token_record = Some(record),
            Err(e) => {
                return GateState::Invalid {
                    id,
                    reason: InvalidReason::Crypto(e),
                }
            }
        }
    }
    session.access_token_record = Some(access_record);
    session.updated_at = Utc::now();

    if let Err(e) = state.sessions.put(&id, &session) {
        // The new token is good for this request even if the write was lost
        error!(session = %id.log_prefix(), error = %e, "Failed to persist refreshed session");
    }

    info!(
        session = %id.log_prefix(),
        rotated_refresh_token = rotated,
        "Access token refreshed"
    );

    GateState::Valid {
        access_token: AccessToken(tokens.access_token),
    }
}

/// Destroy an invalidated session. Store errors are logged, never surfaced.
fn destroy_session(state: &AppState, id: &SessionId, reason: &InvalidReason) {
    warn!(session = %id.log_prefix(), reason = ?reason, "Invalidating session");

    if let Err(e) = state.sessions.delete(id) {
        error!(session = %id.log_prefix(), error = %e, "Session destruction failed");
    }
}

/// Load the session and run the gate to a terminal state.
pub(crate) async fn evaluate(state: &AppState, id: Option<SessionId>) -> Result<GateDecision> {
    let loaded = GateState::load(state, id)?;
    Ok(settle(state, loaded).await)
}

/// Drive an already-loaded state to the end, applying the Invalid side effect.
pub(crate) async fn settle(state: &AppState, mut current: GateState) -> GateDecision {
    while !current.is_terminal() {
        current = current.step(state).await;
    }

    match current {
        GateState::Valid { access_token } => GateDecision::Proceed(access_token),
        GateState::Invalid { id, reason } => {
            destroy_session(state, &id, &reason);
            GateDecision::Invalidated(reason)
        }
        _ => GateDecision::NoSession,
    }
}

/// Middleware guarding routes that need the provider access token.
///
/// # Responses
/// - No session: 401, no upstream calls
/// - Invalidated session: 401 with the cookie cleared
/// - Session store unreadable: 500
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let id = session_id_from_headers(request.headers(), &state.session_settings.cookie_name);

    match evaluate(&state, id).await {
        Ok(GateDecision::Proceed(token)) => {
            request.extensions_mut().insert(token);
            next.run(request).await
        }
        Ok(GateDecision::NoSession) => AppError::Unauthorized.into_response(),
        Ok(GateDecision::Invalidated(reason)) => {
            let error = match reason {
                InvalidReason::RefreshFailed => AppError::SessionExpired,
                _ => AppError::Unauthorized,
            };

            let mut response = error.into_response();
            if let Ok(cookie) = HeaderValue::from_str(&clear_session_cookie(&state.session_settings)) {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to read session");
            AppError::ServerError("Session store unavailable".to_string()).into_response()
        }
    }
}
