// crates/agent-gate-core/src/timekeys.rs
// ============================================================================
// Module: UTC Bucket Keys
// Description: Rolling-window key derivation for counters and rate buckets.
// Purpose: Provide stable UTC keys shared by quota and rate limiting.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Quota counters roll over on UTC hour and day boundaries; the in-process
//! rate limiter rolls on UTC minutes. All three derive their keys here so
//! the window semantics stay in one place. Hour and day keys are
//! zero-padded (they are persisted); the minute key keeps the historical
//! unpadded form used by the in-memory bucket map.

use time::OffsetDateTime;
use time::UtcOffset;

/// Returns the UTC day key, `YYYY-MM-DD`.
#[must_use]
pub fn day_key(now: OffsetDateTime) -> String {
    let utc = now.to_offset(UtcOffset::UTC);
    format!("{:04}-{:02}-{:02}", utc.year(), u8::from(utc.month()), utc.day())
}

/// Returns the UTC hour key, `YYYY-MM-DD-HH`.
#[must_use]
pub fn hour_key(now: OffsetDateTime) -> String {
    let utc = now.to_offset(UtcOffset::UTC);
    format!("{:04}-{:02}-{:02}-{:02}", utc.year(), u8::from(utc.month()), utc.day(), utc.hour())
}

/// Returns the UTC minute bucket key, `YYYY-M-D-H-min` (unpadded).
#[must_use]
pub fn minute_key(now: OffsetDateTime) -> String {
    let utc = now.to_offset(UtcOffset::UTC);
    format!(
        "{}-{}-{}-{}-{}",
        utc.year(),
        u8::from(utc.month()),
        utc.day(),
        utc.hour(),
        utc.minute()
    )
}
