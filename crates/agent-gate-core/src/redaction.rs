// crates/agent-gate-core/src/redaction.rs
// ============================================================================
// Module: Redaction Classifier
// Description: Auth-sensitive content detection for email payloads.
// Purpose: Keep authentication artifacts out of agent-visible responses.
// Dependencies: regex
// ============================================================================

//! ## Overview
//! A message is auth-sensitive when any pattern in the corpus matches the
//! concatenation of its subject, snippet, and body. The corpus covers three
//! families: one-time codes and 2FA phrasing, password-reset and sign-in
//! prompts, and magic-link / passkey / device-verification phrasing.
//! Matching is case-insensitive. The classifier is deliberately a blunt
//! instrument — a false positive hides one email, a false negative leaks a
//! credential to the agent.

use std::sync::LazyLock;

use regex::RegexSet;

use crate::model::Sensitivity;

/// Auth-artifact corpus, compiled once per process.
static AUTH_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        // One-time codes, verification codes, 2FA.
        r"(?i)\b(one[\s-]?time|verification|security|login|sign[\s-]?in|auth(?:entication)?)\s+(code|pin|passcode)\b",
        r"(?i)\b(otp|2fa|mfa|two[\s-]?factor)\b",
        r"(?i)\bcode\s*(is|:)?\s*\d{4,8}\b",
        r"(?i)\b\d{4,8}\s+is\s+your\b",
        // Password resets and sign-in prompts.
        r"(?i)\b(reset|change)\s+your\s+password\b",
        r"(?i)\bpassword\s+reset\b",
        r"(?i)\b(new|suspicious|unrecognized)\s+sign[\s-]?in\b",
        r"(?i)\bsign[\s-]?in\s+attempt\b",
        r"(?i)\bapprove\s+(this\s+)?sign[\s-]?in\b",
        // Magic links, account verification, passkeys, device checks.
        r"(?i)\bmagic\s+link\b",
        r"(?i)\b(login|sign[\s-]?in)\s+link\b",
        r"(?i)\bverify\s+your\s+(email|account|identity)\b",
        r"(?i)\bconfirm\s+your\s+(email|account)\b",
        r"(?i)\bpasskey\b",
        r"(?i)\bdevice\s+(verification|confirmation)\b",
    ])
    .expect("auth pattern corpus")
});

/// Returns true when the text matches any pattern in the auth corpus.
#[must_use]
pub fn is_auth_sensitive(text: &str) -> bool {
    AUTH_PATTERNS.is_match(text)
}

/// Classifies a message from its subject, snippet, and body.
#[must_use]
pub fn classify_sensitivity(subject: &str, snippet: &str, body: &str) -> Sensitivity {
    let combined = format!("{subject}\n{snippet}\n{body}");
    if is_auth_sensitive(&combined) { Sensitivity::AuthSensitive } else { Sensitivity::Normal }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::classify_sensitivity;
    use super::is_auth_sensitive;
    use crate::model::Sensitivity;

    #[test]
    fn otp_phrasing_is_sensitive() {
        assert!(is_auth_sensitive("Your verification code is 482913"));
        assert!(is_auth_sensitive("OTP 999999"));
        assert!(is_auth_sensitive("login code 999999"));
        assert!(is_auth_sensitive("482913 is your Acme code"));
    }

    #[test]
    fn reset_and_sign_in_phrasing_is_sensitive() {
        assert!(is_auth_sensitive("Reset your password now"));
        assert!(is_auth_sensitive("New sign-in to your account"));
        assert!(is_auth_sensitive("Approve this sign-in"));
    }

    #[test]
    fn link_and_passkey_phrasing_is_sensitive() {
        assert!(is_auth_sensitive("Here is your magic link"));
        assert!(is_auth_sensitive("Verify your email to continue"));
        assert!(is_auth_sensitive("A passkey was added to your account"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(is_auth_sensitive("PASSWORD RESET requested"));
    }

    #[test]
    fn ordinary_mail_is_normal() {
        assert!(!is_auth_sensitive("Lunch on Thursday?"));
        assert_eq!(
            classify_sensitivity("hello", "normal", "full body"),
            Sensitivity::Normal
        );
    }

    #[test]
    fn classification_spans_all_three_fields() {
        assert_eq!(
            classify_sensitivity("hello", "", "your one-time code: 123456"),
            Sensitivity::AuthSensitive
        );
    }
}
