// crates/agent-gate-core/src/lib.rs
// ============================================================================
// Module: Agent Gate Core
// Description: Pure policy primitives for the agent-gate security proxy.
// Purpose: Provide deterministic, side-effect-free policy decisions.
// Dependencies: regex, serde, serde_json, time
// ============================================================================

//! ## Overview
//! agent-gate-core holds the policy logic the proxy applies to every
//! admitted request: range and day clamps, recipient allowlisting, the
//! auth-sensitive content classifier, quoted-context stripping, and the
//! normalized email/calendar wire model. Everything here is pure — no
//! filesystem, no clock reads, no network. Hosts supply `now` explicitly so
//! decisions stay replayable in tests.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod clamp;
pub mod model;
pub mod recipients;
pub mod redaction;
pub mod thread;
pub mod timekeys;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use clamp::ClampedRange;
pub use clamp::clamp_email_days;
pub use clamp::clamp_calendar_range;
pub use clamp::resolve_read_calendars;
pub use clamp::write_calendar_allowed;
pub use model::Attendee;
pub use model::AuthHandlingMode;
pub use model::CalendarEvent;
pub use model::ContextMode;
pub use model::EmailItem;
pub use model::EmailWarning;
pub use model::EventGates;
pub use model::SendUpdatesMode;
pub use model::Sensitivity;
pub use recipients::normalize_recipient;
pub use recipients::recipient_allowed;
pub use redaction::classify_sensitivity;
pub use redaction::is_auth_sensitive;
pub use thread::strip_quoted_context;
pub use timekeys::day_key;
pub use timekeys::hour_key;
pub use timekeys::minute_key;
