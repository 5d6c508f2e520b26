// crates/agent-gate-core/src/clamp.rs
// ============================================================================
// Module: Policy Clamps
// Description: Range and identifier clamping to policy-bound values.
// Purpose: Normalize caller-supplied query inputs before provider access.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Callers never reach the provider with the ranges they asked for; they
//! reach it with the ranges policy allows. Day counts clamp into
//! `[1, max]`, calendar ranges clamp into a policy window anchored on the
//! current UTC day, and calendar identifiers resolve against configured
//! allowlists. All functions take `now` explicitly.

use time::Duration;
use time::OffsetDateTime;
use time::Time;
use time::UtcOffset;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Email Days
// ============================================================================

/// Clamps a requested unread-window day count to `[1, max_recent_days]`.
///
/// Non-numeric or absent values clamp to the configured maximum.
#[must_use]
pub fn clamp_email_days(raw: Option<&str>, max_recent_days: u32) -> u32 {
    let max = i64::from(max_recent_days.max(1));
    let requested = raw.and_then(|value| value.trim().parse::<i64>().ok()).unwrap_or(max);
    requested.clamp(1, max) as u32
}

// ============================================================================
// SECTION: Calendar Range
// ============================================================================

/// Result of clamping a requested calendar range into the policy window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedRange {
    /// Effective range start.
    pub start: OffsetDateTime,
    /// Effective range end.
    pub end: OffsetDateTime,
    /// Policy window minimum (start of UTC day, `now - max_past_days`).
    pub min: OffsetDateTime,
    /// Policy window maximum (end of UTC day, `now + max_future_days`).
    pub max: OffsetDateTime,
}

/// Clamps a requested start/end pair into the policy window.
///
/// When either bound is missing or unparseable, both fall back to the
/// current UTC week (Monday 00:00:00 through Sunday 23:59:59) if
/// `default_this_week` is set, else to the full policy window. After
/// clamping, an inverted range collapses to `end = start`.
#[must_use]
pub fn clamp_calendar_range(
    now: OffsetDateTime,
    max_past_days: u32,
    max_future_days: u32,
    default_this_week: bool,
    start_raw: Option<&str>,
    end_raw: Option<&str>,
) -> ClampedRange {
    let now = now.to_offset(UtcOffset::UTC);
    let min = start_of_utc_day(now - Duration::days(i64::from(max_past_days)));
    let max = end_of_utc_day(now + Duration::days(i64::from(max_future_days)));

    let requested_start = start_raw.and_then(parse_rfc3339);
    let requested_end = end_raw.and_then(parse_rfc3339);
    let (mut start, mut end) = match (requested_start, requested_end) {
        (Some(start), Some(end)) => (start, end),
        _ if default_this_week => this_week_bounds(now),
        _ => (min, max),
    };

    if start < min {
        start = min;
    }
    if end > max {
        end = max;
    }
    if end < start {
        end = start;
    }
    ClampedRange {
        start,
        end,
        min,
        max,
    }
}

/// Parses an RFC 3339 timestamp, normalizing to UTC.
fn parse_rfc3339(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).ok().map(|value| value.to_offset(UtcOffset::UTC))
}

/// Floors a timestamp to the start of its UTC day.
fn start_of_utc_day(value: OffsetDateTime) -> OffsetDateTime {
    value.to_offset(UtcOffset::UTC).date().midnight().assume_utc()
}

/// Ceilings a timestamp to the last whole second of its UTC day.
fn end_of_utc_day(value: OffsetDateTime) -> OffsetDateTime {
    value
        .to_offset(UtcOffset::UTC)
        .date()
        .with_time(Time::from_hms(23, 59, 59).expect("end of day"))
        .assume_utc()
}

/// Returns the Monday-through-Sunday bounds of the UTC week containing `now`.
fn this_week_bounds(now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
    let today = now.to_offset(UtcOffset::UTC).date();
    let monday = today - Duration::days(i64::from(today.weekday().number_days_from_monday()));
    let sunday = monday + Duration::days(6);
    (
        monday.midnight().assume_utc(),
        sunday.with_time(Time::from_hms(23, 59, 59).expect("end of day")).assume_utc(),
    )
}

// ============================================================================
// SECTION: Calendar Identifiers
// ============================================================================

/// Resolves the calendar-id set for a read request.
///
/// Parses a comma-separated query value (trimming whitespace, dropping
/// empties, de-duplicating while preserving order); an empty or absent
/// value resolves to the configured list.
#[must_use]
pub fn resolve_read_calendars(query: Option<&str>, configured: &[String]) -> Vec<String> {
    let mut resolved = Vec::new();
    if let Some(raw) = query {
        for entry in raw.split(',') {
            let trimmed = entry.trim();
            if !trimmed.is_empty() && !resolved.iter().any(|seen: &String| seen == trimmed) {
                resolved.push(trimmed.to_string());
            }
        }
    }
    if resolved.is_empty() {
        return configured.to_vec();
    }
    resolved
}

/// Decides whether a calendar id may be written to.
///
/// Membership is checked against the write allowlist when it is non-empty,
/// otherwise against the configured read list.
#[must_use]
pub fn write_calendar_allowed(id: &str, write_allowlist: &[String], read_list: &[String]) -> bool {
    let effective = if write_allowlist.is_empty() { read_list } else { write_allowlist };
    effective.iter().any(|entry| entry == id)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use time::Date;
    use time::Month;
    use time::OffsetDateTime;
    use time::Time;
    use time::format_description::well_known::Rfc3339;

    use super::clamp_calendar_range;
    use super::clamp_email_days;
    use super::resolve_read_calendars;
    use super::write_calendar_allowed;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    // Wednesday 2026-03-04 12:00:00 UTC.
    fn wednesday_noon() -> OffsetDateTime {
        Date::from_calendar_date(2026, Month::March, 4)
            .expect("date")
            .with_time(Time::from_hms(12, 0, 0).expect("time"))
            .assume_utc()
    }

    fn rfc3339(value: OffsetDateTime) -> String {
        value.format(&Rfc3339).expect("format")
    }

    #[test]
    fn days_clamp_to_policy_bounds() {
        assert_eq!(clamp_email_days(Some("10"), 2), 2);
        assert_eq!(clamp_email_days(Some("0"), 2), 1);
        assert_eq!(clamp_email_days(Some("-3"), 2), 1);
        assert_eq!(clamp_email_days(Some("abc"), 2), 2);
        assert_eq!(clamp_email_days(None, 2), 2);
        assert_eq!(clamp_email_days(Some("1"), 2), 1);
    }

    #[test]
    fn range_clamps_into_policy_window() {
        let range = clamp_calendar_range(
            wednesday_noon(),
            1,
            1,
            false,
            Some("2026-01-01T00:00:00Z"),
            Some("2026-12-01T00:00:00Z"),
        );
        assert_eq!(range.start, range.min);
        assert_eq!(range.end, range.max);
        assert_eq!(rfc3339(range.min), "2026-03-03T00:00:00Z");
        assert_eq!(rfc3339(range.max), "2026-03-05T23:59:59Z");
    }

    #[test]
    fn missing_bounds_default_to_this_week() {
        let range = clamp_calendar_range(wednesday_noon(), 30, 30, true, None, None);
        assert_eq!(rfc3339(range.start), "2026-03-02T00:00:00Z");
        assert_eq!(rfc3339(range.end), "2026-03-08T23:59:59Z");
    }

    #[test]
    fn missing_bounds_default_to_window_when_week_disabled() {
        let range = clamp_calendar_range(wednesday_noon(), 2, 2, false, None, None);
        assert_eq!(range.start, range.min);
        assert_eq!(range.end, range.max);
    }

    #[test]
    fn unparseable_bound_falls_back() {
        let range = clamp_calendar_range(
            wednesday_noon(),
            30,
            30,
            true,
            Some("not-a-date"),
            Some("2026-03-05T00:00:00Z"),
        );
        assert_eq!(rfc3339(range.start), "2026-03-02T00:00:00Z");
    }

    #[test]
    fn inverted_range_collapses() {
        let range = clamp_calendar_range(
            wednesday_noon(),
            30,
            30,
            false,
            Some("2026-03-06T00:00:00Z"),
            Some("2026-03-05T00:00:00Z"),
        );
        assert_eq!(range.start, range.end);
    }

    #[test]
    fn calendar_query_parses_and_dedupes() {
        let configured = strings(&["primary"]);
        assert_eq!(
            resolve_read_calendars(Some(" work, personal ,,work"), &configured),
            strings(&["work", "personal"])
        );
        assert_eq!(resolve_read_calendars(Some(" , "), &configured), configured);
        assert_eq!(resolve_read_calendars(None, &configured), configured);
    }

    #[test]
    fn write_membership_prefers_write_allowlist() {
        let write = strings(&["team"]);
        let read = strings(&["primary", "team"]);
        assert!(write_calendar_allowed("team", &write, &read));
        assert!(!write_calendar_allowed("primary", &write, &read));
        assert!(write_calendar_allowed("primary", &[], &read));
        assert!(!write_calendar_allowed("other", &[], &read));
    }
}
