//! API key authentication middleware (spec §4.1).
//!
//! Browser WebSocket clients cannot set an `Authorization` header on the
//! handshake request, so a URL query parameter (`?api_key=...`) is checked
//! as a fallback whenever the header is absent.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::state::AppState;

static AUTH_DISABLED_WARNED: AtomicBool = AtomicBool::new(false);

const QUERY_KEY_PARAM: &str = "api_key";

enum AuthCheck {
    Disabled,
    PublicPath,
    ConfigError(&'static str),
    CheckKey(String),
}

fn check_auth_config(state: &AppState, path: &str) -> AuthCheck {
    let auth = &state.settings.server.auth;

    if !auth.enabled {
        if !AUTH_DISABLED_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "API authentication is disabled; set WS_TTS__SERVER__AUTH__ENABLED=true for production"
            );
        }
        return AuthCheck::Disabled;
    }

    if auth.public_paths.iter().any(|p| path.starts_with(p)) {
        return AuthCheck::PublicPath;
    }

    match &auth.api_key {
        Some(key) if !key.is_empty() => AuthCheck::CheckKey(key.clone()),
        _ => AuthCheck::ConfigError("auth is enabled but no API key is configured"),
    }
}

/// Extracts a candidate key from either the `Authorization: Bearer ...`
/// header or the `api_key` query parameter, in that order (spec §4.1).
/// Shared by the middleware below and the WebSocket front door, which
/// needs the same key for per-API-key admission accounting regardless of
/// whether auth enforcement is enabled.
pub(crate) fn extract_candidate_key(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(header) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    query.and_then(|query| {
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == QUERY_KEY_PARAM).then(|| value.to_string())
        })
    })
}

/// Axum middleware enforcing `server.auth` (spec §4.1). Public paths
/// (`/healthz`, `/metrics` by default) always bypass this check.
pub async fn auth_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    match check_auth_config(&state, &path) {
        AuthCheck::Disabled | AuthCheck::PublicPath => next.run(request).await,
        AuthCheck::ConfigError(msg) => {
            tracing::error!("{}", msg);
            (StatusCode::INTERNAL_SERVER_ERROR, "server authentication not configured").into_response()
        }
        AuthCheck::CheckKey(expected) => match extract_candidate_key(request.headers(), request.uri().query()) {
            Some(candidate) if constant_time_compare(candidate.as_bytes(), expected.as_bytes()) => {
                next.run(request).await
            }
            Some(_) => {
                tracing::warn!(path = %path, "rejected request with invalid API key");
                (StatusCode::UNAUTHORIZED, "invalid API key").into_response()
            }
            None => (StatusCode::UNAUTHORIZED, "missing API key").into_response(),
        },
    }
}

/// Constant-time comparison to avoid leaking key length/prefix via timing.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_compare_matches_equal_keys() {
        assert!(constant_time_compare(b"secret", b"secret"));
    }

    #[test]
    fn constant_time_compare_rejects_different_length() {
        assert!(!constant_time_compare(b"secret", b"secre"));
    }

    #[test]
    fn constant_time_compare_rejects_different_content() {
        assert!(!constant_time_compare(b"secret", b"secreT"));
    }
}
