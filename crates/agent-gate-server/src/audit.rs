// crates/agent-gate-server/src/audit.rs
// ============================================================================
// Module: Audit Logging
// Description: Append-only JSON-lines audit trail for admitted requests.
// Purpose: Record every policy decision with timestamp and principal.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! Every admission outcome and provider side-effect appends one JSON object
//! to the audit log. Entries always lead with `ts` (RFC 3339 UTC) and carry
//! the action label and acting principal; action-specific fields follow.
//! The log is write-only from the proxy's perspective — nothing in the
//! system reads it back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Entries
// ============================================================================

/// One audit record. Serializes with `ts` leading.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// Event timestamp, RFC 3339 UTC.
    pub ts: String,
    /// Action label.
    pub action: &'static str,
    /// Acting principal (`api-key`, a token subject, or `unknown`).
    pub principal: String,
    /// Action-specific fields.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl AuditEntry {
    /// Creates an entry stamped with the current UTC time.
    #[must_use]
    pub fn new(action: &'static str, principal: &str) -> Self {
        let ts = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"));
        Self {
            ts,
            action,
            principal: principal.to_string(),
            fields: serde_json::Map::new(),
        }
    }

    /// Returns the entry with an additional field set.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for admission and side-effect events.
pub trait AuditSink: Send + Sync {
    /// Records an audit entry.
    fn record(&self, entry: &AuditEntry);
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log in append mode, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, entry: &AuditEntry) {
        if let Ok(payload) = serde_json::to_string(entry)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, entry: &AuditEntry) {
        if let Ok(payload) = serde_json::to_string(entry) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// No-op audit sink for tests.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _entry: &AuditEntry) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::AuditEntry;

    #[test]
    fn entries_lead_with_ts_and_flatten_fields() {
        let entry = AuditEntry::new("email_unread", "agent-1").with("days", 2).with("count", 1);
        let payload = serde_json::to_string(&entry).expect("encode");
        assert!(payload.starts_with("{\"ts\":"));
        let value: serde_json::Value = serde_json::from_str(&payload).expect("decode");
        assert_eq!(value["action"], "email_unread");
        assert_eq!(value["principal"], "agent-1");
        assert_eq!(value["days"], 2);
        assert_eq!(value["count"], 1);
    }
}
