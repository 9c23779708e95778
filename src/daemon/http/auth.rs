//! API key authentication
//!
//! When keys are configured, protected routes require an `Authorization`
//! header holding either `Bearer <key>` or the bare key.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::types::ErrorResponse;

#[derive(Clone, Default)]
pub struct AuthState {
    /// Accepted keys; empty disables authentication
    api_keys: Arc<HashSet<String>>,
}

impl AuthState {
    pub fn new(api_keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            api_keys: Arc::new(api_keys.into_iter().filter(|k| !k.is_empty()).collect()),
        }
    }

    pub fn auth_required(&self) -> bool {
        !self.api_keys.is_empty()
    }

    pub fn validate_key(&self, key: &str) -> bool {
        !self.auth_required() || self.api_keys.contains(key)
    }
}

/// Key presented in the `Authorization` header, if any
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let key = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!key.is_empty()).then_some(key)
}

pub async fn auth_middleware(
    State(auth): State<AuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth.auth_required() {
        return next.run(request).await;
    }

    let authorized = presented_key(request.headers()).is_some_and(|key| auth.validate_key(key));
    if authorized {
        return next.run(request).await;
    }

    debug!("Rejected unauthenticated request to {}", request.uri().path());
    (StatusCode::UNAUTHORIZED, Json(ErrorResponse::unauthorized())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_no_keys_allows_everything() {
        let auth = AuthState::new(Vec::new());
        assert!(!auth.auth_required());
        assert!(auth.validate_key("anything"));

        // Blank entries from config do not switch auth on
        assert!(!AuthState::new(vec![String::new()]).auth_required());
    }

    #[test]
    fn test_configured_keys() {
        let auth = AuthState::new(vec!["secret123".to_string(), "key456".to_string()]);
        assert!(auth.auth_required());
        assert!(auth.validate_key("secret123"));
        assert!(auth.validate_key("key456"));
        assert!(!auth.validate_key("wrong"));
    }

    #[test]
    fn test_presented_key_forms() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(presented_key(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(" abc "));
        assert_eq!(presented_key(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(presented_key(&headers), None);
    }
}
