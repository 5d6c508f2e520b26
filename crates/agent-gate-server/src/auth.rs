// crates/agent-gate-server/src/auth.rs
// ============================================================================
// Module: Authenticator
// Description: API-key and signed-bearer admission with replay defense.
// Purpose: Provide strict, fail-closed caller authentication.
// Dependencies: axum, subtle
// ============================================================================

//! ## Overview
//! Two credential modes, checked in order. An API key presented via
//! `x-api-key` or `x-agent-key` is compared to the configured key in
//! constant time; a match authenticates as the literal `api-key`
//! principal. Otherwise the `authorization` header must carry a signed
//! bearer token, which is verified (signature, expiry, skew, subject,
//! audience, jti grammar) and then consumed against the replay store —
//! a token authenticates at most once, ever. All failures are deny.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::replay::ReplayStore;
use crate::token;
use crate::token::TokenError;

/// Header names accepted for API-key authentication.
const API_KEY_HEADERS: [&str; 2] = ["x-api-key", "x-agent-key"];

/// Principal label for API-key callers.
pub const API_KEY_PRINCIPAL: &str = "api-key";

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Authentication denial reasons. Display values are audit labels.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credentials were presented.
    #[error("missing_credentials")]
    MissingCredentials,
    /// Presented API key does not match.
    #[error("invalid_api_key")]
    InvalidApiKey,
    /// Bearer token failed verification.
    #[error("{0}")]
    Token(#[from] TokenError),
    /// Token was valid but already consumed.
    #[error("replay_detected")]
    ReplayDetected,
    /// Replay store unavailable; fail closed.
    #[error("replay_store_unavailable")]
    ReplayUnavailable,
}

/// Compares two secrets in constant time, tolerating unequal lengths.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

// ============================================================================
// SECTION: Authenticator
// ============================================================================

/// Caller authenticator over the configured credentials.
pub struct Authenticator {
    /// Configured API key.
    api_key: String,
    /// Current token signing key.
    current_key: String,
    /// Previous signing key accepted during rotation.
    previous_key: String,
    /// Replay marker store.
    replay: Arc<ReplayStore>,
}

impl Authenticator {
    /// Builds an authenticator.
    #[must_use]
    pub fn new(
        api_key: String,
        current_key: String,
        previous_key: String,
        replay: Arc<ReplayStore>,
    ) -> Self {
        Self {
            api_key,
            current_key,
            previous_key,
            replay,
        }
    }

    /// Checks whether the headers carry the configured API key.
    ///
    /// Returns `None` when no API-key header is present at all.
    #[must_use]
    pub fn check_api_key(&self, headers: &HeaderMap) -> Option<bool> {
        let presented = API_KEY_HEADERS
            .iter()
            .find_map(|name| headers.get(*name).and_then(|value| value.to_str().ok()))?;
        Some(constant_time_eq(presented.as_bytes(), self.api_key.as_bytes()))
    }

    /// Authenticates a request, returning the acting principal.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when no credential mode succeeds.
    pub fn authenticate(&self, headers: &HeaderMap, now_unix: i64) -> Result<String, AuthError> {
        if let Some(matched) = self.check_api_key(headers) {
            if matched {
                return Ok(API_KEY_PRINCIPAL.to_string());
            }
            return Err(AuthError::InvalidApiKey);
        }

        let header = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;
        let bearer = header.strip_prefix("Bearer ").ok_or(AuthError::MissingCredentials)?;

        let claims = token::verify(bearer, &self.current_key, &self.previous_key, now_unix)?;
        match self.replay.install(&claims.jti, claims.exp) {
            Ok(true) => Ok(claims.sub),
            Ok(false) => Err(AuthError::ReplayDetected),
            Err(_) => Err(AuthError::ReplayUnavailable),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::HeaderMap;
    use axum::http::HeaderValue;
    use tempfile::TempDir;

    use super::API_KEY_PRINCIPAL;
    use super::AuthError;
    use super::Authenticator;
    use super::constant_time_eq;
    use crate::replay::ReplayStore;
    use crate::token;

    const NOW: i64 = 1_767_225_600;

    fn authenticator(dir: &TempDir) -> Authenticator {
        let replay = Arc::new(ReplayStore::open(dir.path()).expect("replay store"));
        Authenticator::new("k123".to_string(), "signing".to_string(), String::new(), replay)
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).expect("name"),
                HeaderValue::from_str(value).expect("value"),
            );
        }
        map
    }

    #[test]
    fn constant_time_compare_tolerates_unequal_lengths() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"", b"abc"));
        assert!(!constant_time_eq(b"abd", b"abc"));
    }

    #[test]
    fn api_key_headers_authenticate_as_api_key_principal() {
        let dir = TempDir::new().expect("tempdir");
        let auth = authenticator(&dir);
        for header in ["x-api-key", "x-agent-key"] {
            let principal =
                auth.authenticate(&headers(&[(header, "k123")]), NOW).expect("authenticate");
            assert_eq!(principal, API_KEY_PRINCIPAL);
        }
    }

    #[test]
    fn wrong_api_key_denies_without_bearer_fallback() {
        let dir = TempDir::new().expect("tempdir");
        let auth = authenticator(&dir);
        let token = token::issue("agent-1", 600, "signing", NOW);
        let result = auth.authenticate(
            &headers(&[("x-api-key", "nope"), ("authorization", &format!("Bearer {token}"))]),
            NOW,
        );
        assert!(matches!(result, Err(AuthError::InvalidApiKey)));
    }

    #[test]
    fn bearer_tokens_authenticate_once() {
        let dir = TempDir::new().expect("tempdir");
        let auth = authenticator(&dir);
        let token = token::issue("agent-1", 600, "signing", NOW);
        let map = headers(&[("authorization", &format!("Bearer {token}"))]);
        assert_eq!(auth.authenticate(&map, NOW).expect("first use"), "agent-1");
        assert!(matches!(auth.authenticate(&map, NOW), Err(AuthError::ReplayDetected)));
    }

    #[test]
    fn missing_credentials_and_bad_prefix_deny() {
        let dir = TempDir::new().expect("tempdir");
        let auth = authenticator(&dir);
        assert!(matches!(
            auth.authenticate(&HeaderMap::new(), NOW),
            Err(AuthError::MissingCredentials)
        ));
        assert!(matches!(
            auth.authenticate(&headers(&[("authorization", "Basic abc")]), NOW),
            Err(AuthError::MissingCredentials)
        ));
    }
}
