// crates/agent-gate-core/src/recipients.rs
// ============================================================================
// Module: Recipient Allowlist
// Description: Outbound recipient normalization and allowlist membership.
// Purpose: Provide fail-closed recipient admission for outbound email.
// Dependencies: regex
// ============================================================================

//! ## Overview
//! Outbound mail is the highest-risk surface the proxy exposes, so the
//! recipient check is strict and fail-closed: a candidate that does not
//! normalize to exactly one local part and one domain is rejected before
//! any list membership is consulted. This refuses addresses like
//! `victim@good.com@attacker.com` that can slip past naive domain checks.

use std::sync::LazyLock;

use regex::Regex;

/// Local-part grammar accepted after lowercasing.
static LOCAL_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._%+-]+$").expect("local part pattern"));

/// Domain grammar accepted after lowercasing.
static DOMAIN_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9.-]+\.[a-z]{2,}$").expect("domain pattern"));

/// Normalizes a candidate recipient address.
///
/// Lowercases and trims, rejects embedded whitespace, and requires exactly
/// one `@` separating a non-empty local part and domain, each matching the
/// accepted grammar. Returns `None` when any check fails.
#[must_use]
pub fn normalize_recipient(raw: &str) -> Option<String> {
    let candidate = raw.trim().to_ascii_lowercase();
    if candidate.is_empty() || candidate.chars().any(char::is_whitespace) {
        return None;
    }
    let mut parts = candidate.split('@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    if parts.next().is_some() || local.is_empty() || domain.is_empty() {
        return None;
    }
    if !LOCAL_PART.is_match(local) || !DOMAIN_PART.is_match(domain) {
        return None;
    }
    Some(format!("{local}@{domain}"))
}

/// Decides whether an outbound recipient is allowed.
///
/// Decision order: normalization failure rejects; `allow_all` accepts;
/// empty email and domain lists reject (fail closed); exact address match
/// accepts; domain match accepts; otherwise reject. List entries are
/// compared case-insensitively.
#[must_use]
pub fn recipient_allowed(
    raw: &str,
    allow_all: bool,
    allowed_emails: &[String],
    allowed_domains: &[String],
) -> bool {
    let Some(normalized) = normalize_recipient(raw) else {
        return false;
    };
    if allow_all {
        return true;
    }
    if allowed_emails.is_empty() && allowed_domains.is_empty() {
        return false;
    }
    if allowed_emails.iter().any(|entry| entry.trim().eq_ignore_ascii_case(&normalized)) {
        return true;
    }
    let domain = normalized.rsplit('@').next().unwrap_or_default();
    allowed_domains.iter().any(|entry| entry.trim().eq_ignore_ascii_case(domain))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::normalize_recipient;
    use super::recipient_allowed;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    #[test]
    fn normalization_lowercases_and_trims() {
        assert_eq!(normalize_recipient("  Alice@Example.COM "), Some("alice@example.com".into()));
    }

    #[test]
    fn normalization_rejects_double_at() {
        assert_eq!(normalize_recipient("victim@good.com@attacker.com"), None);
    }

    #[test]
    fn normalization_rejects_spaces_and_empty_parts() {
        assert_eq!(normalize_recipient("a b@example.com"), None);
        assert_eq!(normalize_recipient("@example.com"), None);
        assert_eq!(normalize_recipient("alice@"), None);
        assert_eq!(normalize_recipient("alice@localhost"), None);
    }

    #[test]
    fn empty_lists_fail_closed() {
        assert!(!recipient_allowed("x@y.com", false, &[], &[]));
    }

    #[test]
    fn allow_all_accepts_valid_addresses_only() {
        assert!(recipient_allowed("x@y.com", true, &[], &[]));
        assert!(!recipient_allowed("a@b@c", true, &[], &[]));
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let emails = strings(&["OK@example.com"]);
        assert!(recipient_allowed("ok@EXAMPLE.com", false, &emails, &[]));
        assert!(!recipient_allowed("bad@example.com", false, &emails, &[]));
    }

    #[test]
    fn domain_match_accepts_any_local_part() {
        let domains = strings(&["example.com"]);
        assert!(recipient_allowed("anyone@example.com", false, &[], &domains));
        assert!(!recipient_allowed("anyone@example.org", false, &[], &domains));
    }
}
