// crates/agent-gate-server/src/token.rs
// ============================================================================
// Module: Signed Bearer Tokens
// Description: HMAC-SHA256 token issuance and verification with rotation.
// Purpose: Mint and verify short-lived bearer credentials for the agent.
// Dependencies: base64, hmac, serde, sha2, subtle, uuid
// ============================================================================

//! ## Overview
//! Tokens are three-part signed bearers (`header.payload.signature`, each
//! segment base64url without padding). The verifier is always HMAC-SHA256 —
//! the algorithm declared inside the header is never consulted, which
//! forecloses algorithm-confusion downgrades. Verification accepts the
//! current or the previous signing key so keys can rotate without
//! invalidating outstanding tokens, and compares signatures in constant
//! time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::Hmac;
use hmac::Mac;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Audience constant embedded in every token and checked on every verify.
pub const AUDIENCE: &str = "agent-gate";

/// Allowed clock skew for issued-at claims, in seconds.
const MAX_IAT_SKEW_SECONDS: i64 = 10;

/// Fixed token header (the verifier never reads it back).
const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Safe-name grammar for jti claims; also the replay marker filename guard.
static SAFE_JTI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9-]{16,64}$").expect("jti pattern"));

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Claims
// ============================================================================

/// Claims carried by a signed bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Token subject (the caller's principal on success).
    pub sub: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Unique token identifier; the replay key.
    pub jti: String,
    /// Audience constant.
    pub aud: String,
}

/// Returns true when a jti passes the safe-name check.
#[must_use]
pub fn jti_is_safe(jti: &str) -> bool {
    SAFE_JTI.is_match(jti)
}

// ============================================================================
// SECTION: Issuance
// ============================================================================

/// Mints a signed token for `sub` with the given TTL.
#[must_use]
pub fn issue(sub: &str, ttl_seconds: u64, signing_key: &str, now_unix: i64) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        iat: now_unix,
        exp: now_unix.saturating_add(ttl_seconds.min(i64::MAX as u64) as i64),
        jti: Uuid::new_v4().to_string(),
        aud: AUDIENCE.to_string(),
    };
    let header = URL_SAFE_NO_PAD.encode(TOKEN_HEADER);
    let payload = URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&claims).unwrap_or_default());
    let signature = sign(&format!("{header}.{payload}"), signing_key);
    format!("{header}.{payload}.{signature}")
}

/// Computes the base64url HMAC-SHA256 signature over a signing input.
fn sign(signing_input: &str, key: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("hmac accepts any key length");
    mac.update(signing_input.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Token verification errors. Messages are audit labels, not user output.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Token does not split into three segments.
    #[error("malformed_token")]
    Malformed,
    /// Signature matches no accepted signing key.
    #[error("bad_signature")]
    BadSignature,
    /// Payload is not valid claims JSON.
    #[error("bad_claims")]
    BadClaims,
    /// Expiry is missing or in the past.
    #[error("token_expired")]
    Expired,
    /// Issued-at is unacceptably far in the future.
    #[error("issued_in_future")]
    IssuedInFuture,
    /// Subject is empty.
    #[error("bad_subject")]
    BadSubject,
    /// Audience does not match.
    #[error("bad_audience")]
    BadAudience,
    /// jti fails the safe-name check.
    #[error("bad_jti")]
    BadJti,
}

/// Verifies a bearer token against the accepted signing keys.
///
/// Keys are tried in order [current, previous]; empty keys are skipped.
/// The signature compare is constant time and independent of where the
/// first mismatch falls.
///
/// # Errors
///
/// Returns [`TokenError`] describing the first failed check.
pub fn verify(
    token: &str,
    current_key: &str,
    previous_key: &str,
    now_unix: i64,
) -> Result<Claims, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    let &[header, payload, signature] = segments.as_slice() else {
        return Err(TokenError::Malformed);
    };

    let signing_input = format!("{header}.{payload}");
    let verified = [current_key, previous_key]
        .iter()
        .filter(|key| !key.is_empty())
        .any(|key| {
            let expected = sign(&signing_input, key);
            bool::from(expected.as_bytes().ct_eq(signature.as_bytes()))
        });
    if !verified {
        return Err(TokenError::BadSignature);
    }

    let payload_bytes =
        URL_SAFE_NO_PAD.decode(payload).map_err(|_| TokenError::BadClaims)?;
    let claims: Claims =
        serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::BadClaims)?;

    if claims.exp <= now_unix {
        return Err(TokenError::Expired);
    }
    if claims.iat > now_unix + MAX_IAT_SKEW_SECONDS {
        return Err(TokenError::IssuedInFuture);
    }
    if claims.sub.trim().is_empty() {
        return Err(TokenError::BadSubject);
    }
    if claims.aud != AUDIENCE {
        return Err(TokenError::BadAudience);
    }
    if !jti_is_safe(&claims.jti) {
        return Err(TokenError::BadJti);
    }
    Ok(claims)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
