// crates/agent-gate-core/src/model.rs
// ============================================================================
// Module: Normalized Wire Model
// Description: Normalized email and calendar records returned to callers.
// Purpose: Provide policy-projected, serializable response shapes.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The proxy never forwards provider payloads verbatim. Upstream messages
//! and events are normalized into the records defined here, and calendar
//! events pass through a field-gating projection so that attendee emails,
//! locations, and meeting URLs appear only when policy allows them. Gated
//! fields are absent from the serialized output, not null.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Policy Modes
// ============================================================================

/// Handling applied to auth-sensitive email content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthHandlingMode {
    /// Drop auth-sensitive messages from responses entirely.
    Block,
    /// Include auth-sensitive messages and attach warnings.
    Warn,
}

/// Thread context returned for unread email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// Full message bodies including quoted history.
    FullThread,
    /// Quoted history stripped; only the latest content survives.
    LatestOnly,
}

impl ContextMode {
    /// Parses a query-string override, returning `None` for unknown values.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "full_thread" => Some(Self::FullThread),
            "latest_only" => Some(Self::LatestOnly),
            _ => None,
        }
    }
}

/// Calendar mutation notification policy forwarded to the provider.
///
/// # Invariants
/// - The value sent upstream is always the configured one; request payloads
///   cannot override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SendUpdatesMode {
    /// Never notify attendees.
    None,
    /// Notify all attendees.
    All,
    /// Notify only attendees outside the organizer's domain.
    ExternalOnly,
}

impl SendUpdatesMode {
    /// Returns the provider wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::All => "all",
            Self::ExternalOnly => "externalOnly",
        }
    }
}

// ============================================================================
// SECTION: Email Model
// ============================================================================

/// Content classification for a normalized email item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    /// No auth artifacts detected.
    Normal,
    /// Carries authentication artifacts (OTP, reset link, sign-in prompt).
    AuthSensitive,
}

/// Normalized unread email item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailItem {
    /// Provider message identifier.
    pub id: String,
    /// Provider thread identifier.
    pub thread_id: String,
    /// Sender address header.
    pub from: String,
    /// Recipient address header.
    pub to: String,
    /// Message subject.
    pub subject: String,
    /// Short snippet.
    pub snippet: String,
    /// Message body text.
    pub body: String,
    /// Provider-internal receive timestamp (epoch milliseconds).
    pub internal_date: Option<i64>,
    /// Content classification against the auth-pattern corpus.
    pub sensitivity: Sensitivity,
}

/// Warning attached when auth-sensitive content is surfaced in warn mode.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailWarning {
    /// Flagged message identifier.
    pub id: String,
    /// Flagged thread identifier.
    pub thread_id: String,
    /// True when block mode would have removed this message.
    pub would_block: bool,
    /// Stable reason label.
    pub reason: &'static str,
    /// Stable category label.
    pub category: &'static str,
}

impl EmailWarning {
    /// Builds the warning record for a flagged message.
    #[must_use]
    pub fn for_item(item: &EmailItem) -> Self {
        Self {
            id: item.id.clone(),
            thread_id: item.thread_id.clone(),
            would_block: true,
            reason: "auth_artifact_detected",
            category: "auth_sensitive",
        }
    }
}

// ============================================================================
// SECTION: Calendar Model
// ============================================================================

/// Field-exposure gates applied when projecting calendar events.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventGates {
    /// Expose attendee records.
    pub attendees: bool,
    /// Expose the event location.
    pub location: bool,
    /// Expose meeting URLs.
    pub meeting_urls: bool,
}

/// Projected calendar attendee.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    /// Attendee email address.
    pub email: String,
    /// Display name when provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// True when the attendee is the calendar owner.
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub is_self: Option<bool>,
    /// RSVP status when provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
}

/// Normalized, policy-projected calendar event.
///
/// # Invariants
/// - `location`, `hangout_link`, and `attendees` are present only when the
///   corresponding [`EventGates`] flag was set at projection time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    /// Provider event identifier.
    pub id: String,
    /// Event summary line.
    pub summary: String,
    /// Event start (provider shape, passed through).
    pub start: serde_json::Value,
    /// Event end (provider shape, passed through).
    pub end: serde_json::Value,
    /// Event location, gated by policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Meeting URL, gated by policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hangout_link: Option<String>,
    /// Attendees, gated by policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<Attendee>>,
}

impl CalendarEvent {
    /// Projects a raw provider event through the configured field gates.
    ///
    /// Returns `None` when the value is not an object carrying an `id`,
    /// which keeps fabricated or malformed provider output out of
    /// responses.
    #[must_use]
    pub fn project(raw: &serde_json::Value, gates: EventGates) -> Option<Self> {
        let object = raw.as_object()?;
        let id = object.get("id")?.as_str()?.to_string();
        let summary =
            object.get("summary").and_then(|value| value.as_str()).unwrap_or_default().to_string();
        let start = object.get("start").cloned().unwrap_or(serde_json::Value::Null);
        let end = object.get("end").cloned().unwrap_or(serde_json::Value::Null);
        let location = if gates.location {
            object.get("location").and_then(|value| value.as_str()).map(str::to_string)
        } else {
            None
        };
        let hangout_link = if gates.meeting_urls {
            object.get("hangoutLink").and_then(|value| value.as_str()).map(str::to_string)
        } else {
            None
        };
        let attendees = if gates.attendees {
            object.get("attendees").and_then(|value| value.as_array()).map(|entries| {
                entries.iter().filter_map(project_attendee).collect::<Vec<_>>()
            })
        } else {
            None
        };
        Some(Self {
            id,
            summary,
            start,
            end,
            location,
            hangout_link,
            attendees,
        })
    }
}

/// Projects a single attendee record, dropping entries without an email.
fn project_attendee(raw: &serde_json::Value) -> Option<Attendee> {
    let object = raw.as_object()?;
    let email = object.get("email")?.as_str()?.to_string();
    Some(Attendee {
        email,
        display_name: object.get("displayName").and_then(|value| value.as_str()).map(str::to_string),
        is_self: object.get("self").and_then(serde_json::Value::as_bool),
        response_status: object
            .get("responseStatus")
            .and_then(|value| value.as_str())
            .map(str::to_string),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
