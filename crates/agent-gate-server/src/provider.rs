// crates/agent-gate-server/src/provider.rs
// ============================================================================
// Module: Provider Adapter
// Description: Subprocess adapter for the Gmail/Calendar provider tool.
// Purpose: Shape upstream invocations and parse their output defensively.
// Dependencies: async-trait, serde_json, tokio
// ============================================================================

//! ## Overview
//! The upstream provider is an opaque command-line tool invoked with
//! explicit argv (never a shell). Its only contract is the shape of its
//! stdout: read calls print JSON (a bare array, `{"messages": […]}`, or
//! `{"items": […]}`), write calls print an identifier. Parsing is
//! defensive — only objects carrying an `id` become items, and bare text
//! is treated as empty rather than fabricated into records. Failures stay
//! inside the adapter as [`ProviderError`]; stderr content never leaves
//! this module.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::process::Command;

// ============================================================================
// SECTION: Call Shapes
// ============================================================================

/// Calendar event creation call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarCreateCall {
    /// Target calendar identifier.
    pub calendar_id: String,
    /// Event summary.
    pub summary: String,
    /// Event start (RFC 3339 or provider date shape).
    pub start: String,
    /// Event end.
    pub end: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Attendees; omitted entirely when policy drops them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<Value>>,
    /// Notification policy; always the configured value.
    pub send_updates: String,
}

/// Calendar event update call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarUpdateCall {
    /// Target calendar identifier.
    pub calendar_id: String,
    /// Event being updated.
    pub event_id: String,
    /// Replacement summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Replacement start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Replacement end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    /// Replacement description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Replacement location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Attendees to add; omitted entirely when policy drops them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_attendees: Option<Vec<Value>>,
    /// Notification policy; always the configured value.
    pub send_updates: String,
}

/// In-thread reply call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailReplyCall {
    /// Acting Gmail account.
    pub account: String,
    /// Thread being replied to.
    pub thread_id: String,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
}

/// New outbound message call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSendCall {
    /// Acting Gmail account.
    pub account: String,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Provider adapter errors. Audit code labels only — no upstream output.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Subprocess could not be spawned.
    #[error("provider_spawn_failed")]
    Spawn(String),
    /// Subprocess did not finish within the wait bound.
    #[error("provider_timeout")]
    Timeout,
    /// Subprocess exited non-zero.
    #[error("provider_exit")]
    Exit(Option<i32>),
    /// Serialization of the call payload failed.
    #[error("provider_payload")]
    Payload,
}

impl ProviderError {
    /// Stable audit code for the failure.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::Spawn(_) => "provider_spawn_failed".to_string(),
            Self::Timeout => "provider_timeout".to_string(),
            Self::Exit(code) => {
                code.map_or_else(|| "provider_exit_signal".to_string(), |c| {
                    format!("provider_exit_{c}")
                })
            }
            Self::Payload => "provider_payload".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Upstream provider interface.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Lists unread messages for the account within the day window.
    async fn unread_messages(&self, account: &str, days: u32) -> Result<Vec<Value>, ProviderError>;

    /// Lists events on one calendar within the clamped range.
    async fn calendar_events(
        &self,
        calendar_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<Value>, ProviderError>;

    /// Creates a calendar event; returns the created event id.
    async fn create_event(&self, call: CalendarCreateCall) -> Result<String, ProviderError>;

    /// Updates a calendar event; returns the updated event id.
    async fn update_event(&self, call: CalendarUpdateCall) -> Result<String, ProviderError>;

    /// Sends an in-thread reply; returns the sent message id.
    async fn reply_email(&self, call: EmailReplyCall) -> Result<String, ProviderError>;

    /// Sends a new message; returns the sent message id.
    async fn send_email(&self, call: EmailSendCall) -> Result<String, ProviderError>;
}

// ============================================================================
// SECTION: Command Provider
// ============================================================================

/// Provider implementation that shells out to the configured tool.
pub struct CommandProvider {
    /// Executable and leading arguments.
    command: Vec<String>,
    /// Subprocess wait bound.
    timeout: Duration,
}

impl CommandProvider {
    /// Creates a command provider.
    #[must_use]
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self {
            command,
            timeout,
        }
    }

    /// Runs the tool with extra arguments and returns trimmed stdout.
    async fn run(&self, args: &[String]) -> Result<String, ProviderError> {
        let mut command = self.command.iter();
        let program = command.next().cloned().unwrap_or_default();
        let child = Command::new(program)
            .args(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ProviderError::Spawn(err.to_string()))?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ProviderError::Timeout)?
            .map_err(|err| ProviderError::Spawn(err.to_string()))?;
        if !output.status.success() {
            return Err(ProviderError::Exit(output.status.code()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Runs a write call whose payload travels as one JSON argument.
    async fn run_write(
        &self,
        kind: &str,
        subcommand: [&str; 2],
        payload: &impl Serialize,
    ) -> Result<String, ProviderError> {
        let encoded = serde_json::to_string(payload).map_err(|_| ProviderError::Payload)?;
        let args = vec![
            subcommand[0].to_string(),
            subcommand[1].to_string(),
            "--payload".to_string(),
            encoded,
        ];
        let stdout = self.run(&args).await?;
        Ok(write_identifier(&stdout, kind))
    }
}

#[async_trait]
impl Provider for CommandProvider {
    async fn unread_messages(&self, account: &str, days: u32) -> Result<Vec<Value>, ProviderError> {
        let args = vec![
            "gmail".to_string(),
            "unread".to_string(),
            "--account".to_string(),
            account.to_string(),
            "--days".to_string(),
            days.to_string(),
        ];
        let stdout = self.run(&args).await?;
        Ok(parse_items(&stdout))
    }

    async fn calendar_events(
        &self,
        calendar_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<Value>, ProviderError> {
        let args = vec![
            "calendar".to_string(),
            "events".to_string(),
            "--calendar".to_string(),
            calendar_id.to_string(),
            "--start".to_string(),
            start.to_string(),
            "--end".to_string(),
            end.to_string(),
        ];
        let stdout = self.run(&args).await?;
        Ok(parse_items(&stdout))
    }

    async fn create_event(&self, call: CalendarCreateCall) -> Result<String, ProviderError> {
        self.run_write("event", ["calendar", "create"], &call).await
    }

    async fn update_event(&self, call: CalendarUpdateCall) -> Result<String, ProviderError> {
        self.run_write("event", ["calendar", "update"], &call).await
    }

    async fn reply_email(&self, call: EmailReplyCall) -> Result<String, ProviderError> {
        self.run_write("message", ["gmail", "reply"], &call).await
    }

    async fn send_email(&self, call: EmailSendCall) -> Result<String, ProviderError> {
        self.run_write("message", ["gmail", "send"], &call).await
    }
}

// ============================================================================
// SECTION: Output Parsing
// ============================================================================

/// Parses read-call stdout into items.
///
/// Accepts a bare array, `{"messages": […]}`, or `{"items": […]}`, and
/// keeps only objects carrying a string `id`. Anything else — including
/// non-JSON text — yields no items.
#[must_use]
pub fn parse_items(stdout: &str) -> Vec<Value> {
    let Ok(value) = serde_json::from_str::<Value>(stdout) else {
        return Vec::new();
    };
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut object) => {
            match object.remove("messages").or_else(|| object.remove("items")) {
                Some(Value::Array(entries)) => entries,
                _ => return Vec::new(),
            }
        }
        _ => return Vec::new(),
    };
    entries
        .into_iter()
        .filter(|entry| entry.get("id").and_then(Value::as_str).is_some())
        .collect()
}

/// Extracts a write-call identifier, falling back to `<kind>-<epochMs>`.
#[must_use]
pub fn write_identifier(stdout: &str, kind: &str) -> String {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        let epoch_ms = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        return format!("{kind}-{epoch_ms}");
    }
    trimmed.to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_items;
    use super::write_identifier;

    #[test]
    fn parse_accepts_array_and_wrapped_shapes() {
        let array = json!([{"id": "1"}, {"id": "2"}]).to_string();
        assert_eq!(parse_items(&array).len(), 2);

        let messages = json!({"messages": [{"id": "1"}]}).to_string();
        assert_eq!(parse_items(&messages).len(), 1);

        let items = json!({"items": [{"id": "e1"}]}).to_string();
        assert_eq!(parse_items(&items).len(), 1);
    }

    #[test]
    fn parse_drops_entries_without_an_id() {
        let mixed = json!([{"id": "1"}, {"subject": "no id"}, "bare string", 7]).to_string();
        let items = parse_items(&mixed);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "1");
    }

    #[test]
    fn parse_treats_bare_text_as_empty() {
        assert!(parse_items("done").is_empty());
        assert!(parse_items("").is_empty());
        assert!(parse_items("{\"status\": \"ok\"}").is_empty());
    }

    #[test]
    fn write_identifier_trims_and_falls_back() {
        assert_eq!(write_identifier("  msg-42 \n", "message"), "msg-42");
        let fallback = write_identifier("   ", "message");
        assert!(fallback.starts_with("message-"));
    }
}
