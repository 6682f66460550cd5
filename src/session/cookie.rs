//! Session cookie parsing and `Set-Cookie` construction.

use super::SessionId;
use crate::config::SessionSettings;
use axum::http::{header, HeaderMap};

/// Extract the session id from the request's `Cookie` headers.
///
/// Returns `None` when the cookie is absent or its value is not a
/// well-formed session id.
pub fn session_id_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .and_then(|(_, value)| SessionId::parse(value.trim_matches('"')))
}

/// `Set-Cookie` value binding the browser to a session.
pub fn session_cookie(settings: &SessionSettings, id: &SessionId) -> String {
    build_cookie(settings, id.as_str(), settings.max_age_seconds())
}

/// `Set-Cookie` value that makes the browser drop the session cookie.
pub fn clear_session_cookie(settings: &SessionSettings) -> String {
    build_cookie(settings, "", 0)
}

fn build_cookie(settings: &SessionSettings, value: &str, max_age: i64) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; Max-Age={}; HttpOnly; Secure; SameSite=None",
        settings.cookie_name, value, settings.cookie_path, max_age
    );

    if let Some(domain) = &settings.cookie_domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }

    cookie
}
