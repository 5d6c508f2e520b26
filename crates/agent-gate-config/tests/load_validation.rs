// crates/agent-gate-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load Validation Tests
// Description: File-backed loading and fail-closed validation checks.
// Purpose: Pin size limits, parse failures, and secret requirements.
// Dependencies: agent-gate-config, tempfile
// ============================================================================

//! Config loading integration tests.

use std::fs;

use agent_gate_config::ConfigError;
use agent_gate_config::GateConfig;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("wrapper-config.json");
    fs::write(&path, content).expect("write config");
    path
}

#[test]
fn load_round_trips_a_full_config() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_config(
        &dir,
        r#"{
            "server": {"host": "127.0.0.1", "port": 9000, "maxPayloadBytes": 32768, "requestsPerMinute": 30},
            "auth": {"apiKey": "k123", "tokenSigningKey": "current", "previousTokenSigningKey": "previous", "tokenTtlSeconds": 300},
            "gmailAccount": "user@example.com",
            "calendars": ["primary", "team"],
            "email": {"maxRecentDays": 2, "authHandlingMode": "warn", "threadContextMode": "full_thread"},
            "calendarRead": {"defaultThisWeek": false, "maxPastDays": 3, "maxFutureDays": 14, "allowAttendeeEmails": true, "allowLocation": false, "allowMeetingUrls": false},
            "calendarWrite": {"enabled": true, "allowedCalendarIds": ["team"], "allowAttendees": false, "sendUpdates": "externalOnly", "maxEventsPerHour": 2, "maxEventsPerDay": 8},
            "outbound": {"replyOnlyDefault": true, "allowAllRecipients": false, "allowReplyToAnyone": false, "recipientAllowlist": ["ok@example.com"], "domainAllowlist": ["example.org"], "maxEmailsPerHour": 4, "maxEmailsPerDay": 10}
        }"#,
    );

    let config = GateConfig::load(&path).expect("load");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.auth.previous_token_signing_key, "previous");
    assert_eq!(config.email.max_recent_days, 2);
    assert_eq!(config.calendar_write.allowed_calendar_ids, vec!["team".to_string()]);
    assert_eq!(config.outbound.recipient_allowlist, vec!["ok@example.com".to_string()]);
}

#[test]
fn load_rejects_missing_file() {
    let dir = TempDir::new().expect("tempdir");
    let missing = dir.path().join("absent.json");
    assert!(matches!(GateConfig::load(&missing), Err(ConfigError::Io(_))));
}

#[test]
fn load_rejects_malformed_json() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_config(&dir, "{not json");
    assert!(matches!(GateConfig::load(&path), Err(ConfigError::Parse(_))));
}

#[test]
fn load_rejects_empty_secrets() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_config(
        &dir,
        r#"{"auth": {"apiKey": "", "tokenSigningKey": "s"}, "gmailAccount": "u@example.com"}"#,
    );
    assert!(matches!(GateConfig::load(&path), Err(ConfigError::Invalid(_))));
}

#[test]
fn load_rejects_oversize_file() {
    let dir = TempDir::new().expect("tempdir");
    let mut content = String::from(r#"{"auth": {"apiKey": "k", "tokenSigningKey": "s"}, "gmailAccount": "u@example.com""#);
    content.push_str(&" ".repeat(1024 * 1024 + 1));
    content.push('}');
    let path = write_config(&dir, &content);
    assert!(matches!(GateConfig::load(&path), Err(ConfigError::Invalid(_))));
}
