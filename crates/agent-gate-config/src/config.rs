// crates/agent-gate-config/src/config.rs
// ============================================================================
// Module: Gate Configuration
// Description: On-disk policy record, defaults, and validation.
// Purpose: Fail fast on missing secrets; supply conservative defaults.
// Dependencies: agent-gate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! `GateConfig` is the canonical policy record, immutable at runtime. The
//! wire form is camelCase JSON (`config/wrapper-config.json`). Defaults are
//! conservative: reply-only outbound posture, calendar writes disabled,
//! attendee/location/meeting-URL exposure off, auth-sensitive mail blocked.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use agent_gate_core::AuthHandlingMode;
use agent_gate_core::ContextMode;
use agent_gate_core::SendUpdatesMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Hard ceiling for the request payload limit.
pub(crate) const MAX_PAYLOAD_CEILING: usize = 8 * 1024 * 1024;

const fn default_host() -> String {
    String::new()
}

const fn default_port() -> u16 {
    8377
}

const fn default_max_payload_bytes() -> usize {
    64 * 1024
}

const fn default_requests_per_minute() -> u32 {
    60
}

const fn default_token_ttl_seconds() -> u64 {
    600
}

fn default_calendars() -> Vec<String> {
    vec!["primary".to_string()]
}

const fn default_max_recent_days() -> u32 {
    7
}

const fn default_true() -> bool {
    true
}

const fn default_max_past_days() -> u32 {
    7
}

const fn default_max_future_days() -> u32 {
    60
}

const fn default_events_per_hour() -> u32 {
    5
}

const fn default_events_per_day() -> u32 {
    20
}

const fn default_emails_per_hour() -> u32 {
    5
}

const fn default_emails_per_day() -> u32 {
    20
}

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Canonical agent-gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GateConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Caller authentication settings.
    pub auth: AuthConfig,
    /// Gmail account the provider tool acts on.
    pub gmail_account: String,
    /// Calendar identifiers readable by default.
    #[serde(default = "default_calendars")]
    pub calendars: Vec<String>,
    /// Email read policy.
    #[serde(default)]
    pub email: EmailConfig,
    /// Calendar read policy.
    #[serde(default)]
    pub calendar_read: CalendarReadConfig,
    /// Calendar write policy.
    #[serde(default)]
    pub calendar_write: CalendarWriteConfig,
    /// Outbound email policy.
    #[serde(default)]
    pub outbound: OutboundConfig,
    /// Upstream provider tool invocation.
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address; empty means loopback.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    /// Per-principal admitted requests per UTC minute.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_payload_bytes: default_max_payload_bytes(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

impl ServerConfig {
    /// Returns the effective bind address.
    #[must_use]
    pub fn bind_host(&self) -> &str {
        if self.host.is_empty() { "127.0.0.1" } else { &self.host }
    }
}

/// Caller authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthConfig {
    /// Shared API key presented via `x-api-key` / `x-agent-key`.
    pub api_key: String,
    /// Current token signing key.
    pub token_signing_key: String,
    /// Previous signing key accepted during rotation.
    #[serde(default)]
    pub previous_token_signing_key: String,
    /// Minted token lifetime in seconds.
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
}

/// Email read policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmailConfig {
    /// Maximum unread window in days.
    #[serde(default = "default_max_recent_days")]
    pub max_recent_days: u32,
    /// Handling for auth-sensitive content.
    #[serde(default = "default_auth_handling")]
    pub auth_handling_mode: AuthHandlingMode,
    /// Thread context returned to callers.
    #[serde(default = "default_context_mode")]
    pub thread_context_mode: ContextMode,
}

const fn default_auth_handling() -> AuthHandlingMode {
    AuthHandlingMode::Block
}

const fn default_context_mode() -> ContextMode {
    ContextMode::LatestOnly
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            max_recent_days: default_max_recent_days(),
            auth_handling_mode: default_auth_handling(),
            thread_context_mode: default_context_mode(),
        }
    }
}

/// Calendar read policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CalendarReadConfig {
    /// Default missing ranges to the current UTC week.
    #[serde(default = "default_true")]
    pub default_this_week: bool,
    /// Maximum days into the past.
    #[serde(default = "default_max_past_days")]
    pub max_past_days: u32,
    /// Maximum days into the future.
    #[serde(default = "default_max_future_days")]
    pub max_future_days: u32,
    /// Expose attendee emails in responses.
    #[serde(default)]
    pub allow_attendee_emails: bool,
    /// Expose event locations in responses.
    #[serde(default)]
    pub allow_location: bool,
    /// Expose meeting URLs in responses.
    #[serde(default)]
    pub allow_meeting_urls: bool,
}

impl Default for CalendarReadConfig {
    fn default() -> Self {
        Self {
            default_this_week: true,
            max_past_days: default_max_past_days(),
            max_future_days: default_max_future_days(),
            allow_attendee_emails: false,
            allow_location: false,
            allow_meeting_urls: false,
        }
    }
}

/// Calendar write policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CalendarWriteConfig {
    /// Master gate for the write surface.
    #[serde(default)]
    pub enabled: bool,
    /// Calendar ids writable when non-empty; falls back to the read list.
    #[serde(default)]
    pub allowed_calendar_ids: Vec<String>,
    /// Forward attendee mutations to the provider.
    #[serde(default)]
    pub allow_attendees: bool,
    /// Notification policy sent upstream on every mutation.
    #[serde(default = "default_send_updates")]
    pub send_updates: SendUpdatesMode,
    /// Rolling hour cap on mutations.
    #[serde(default = "default_events_per_hour")]
    pub max_events_per_hour: u32,
    /// Rolling day cap on mutations.
    #[serde(default = "default_events_per_day")]
    pub max_events_per_day: u32,
}

const fn default_send_updates() -> SendUpdatesMode {
    SendUpdatesMode::None
}

impl Default for CalendarWriteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_calendar_ids: Vec::new(),
            allow_attendees: false,
            send_updates: default_send_updates(),
            max_events_per_hour: default_events_per_hour(),
            max_events_per_day: default_events_per_day(),
        }
    }
}

/// Outbound email policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OutboundConfig {
    /// Reject the new-send route outright.
    #[serde(default = "default_true")]
    pub reply_only_default: bool,
    /// Disable recipient checks entirely.
    #[serde(default)]
    pub allow_all_recipients: bool,
    /// Skip recipient checks for in-thread replies.
    #[serde(default)]
    pub allow_reply_to_anyone: bool,
    /// Exact-address allowlist.
    #[serde(default)]
    pub recipient_allowlist: Vec<String>,
    /// Domain allowlist.
    #[serde(default)]
    pub domain_allowlist: Vec<String>,
    /// Rolling hour cap on sends.
    #[serde(default = "default_emails_per_hour")]
    pub max_emails_per_hour: u32,
    /// Rolling day cap on sends.
    #[serde(default = "default_emails_per_day")]
    pub max_emails_per_day: u32,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            reply_only_default: true,
            allow_all_recipients: false,
            allow_reply_to_anyone: false,
            recipient_allowlist: Vec::new(),
            domain_allowlist: Vec::new(),
            max_emails_per_hour: default_emails_per_hour(),
            max_emails_per_day: default_emails_per_day(),
        }
    }
}

/// Upstream provider tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProviderConfig {
    /// Provider executable and leading arguments.
    #[serde(default = "default_provider_command")]
    pub command: Vec<String>,
    /// Subprocess wait bound in milliseconds.
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_provider_command() -> Vec<String> {
    vec!["gmail-calendar-cli".to_string()]
}

const fn default_provider_timeout_ms() -> u64 {
    30_000
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            command: default_provider_command(),
            timeout_ms: default_provider_timeout_ms(),
        }
    }
}

// ============================================================================
// SECTION: Loading & Validation
// ============================================================================

impl GateConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, exceeds the
    /// size limit, is not UTF-8, fails to parse, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            serde_json::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required secret is empty or a limit
    /// is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("auth.apiKey must not be empty".to_string()));
        }
        if self.auth.token_signing_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "auth.tokenSigningKey must not be empty".to_string(),
            ));
        }
        if self.auth.token_ttl_seconds == 0 {
            return Err(ConfigError::Invalid("auth.tokenTtlSeconds must be >= 1".to_string()));
        }
        if self.gmail_account.trim().is_empty() {
            return Err(ConfigError::Invalid("gmailAccount must not be empty".to_string()));
        }
        if self.server.max_payload_bytes == 0
            || self.server.max_payload_bytes > MAX_PAYLOAD_CEILING
        {
            return Err(ConfigError::Invalid(
                "server.maxPayloadBytes out of range".to_string(),
            ));
        }
        if self.server.requests_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "server.requestsPerMinute must be >= 1".to_string(),
            ));
        }
        if self.email.max_recent_days == 0 {
            return Err(ConfigError::Invalid("email.maxRecentDays must be >= 1".to_string()));
        }
        if self.calendars.is_empty() {
            return Err(ConfigError::Invalid("calendars must not be empty".to_string()));
        }
        if self.provider.command.is_empty() {
            return Err(ConfigError::Invalid("provider.command must not be empty".to_string()));
        }
        if self.provider.timeout_ms == 0 {
            return Err(ConfigError::Invalid("provider.timeoutMs must be >= 1".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File read failures.
    #[error("config io error: {0}")]
    Io(String),
    /// JSON parse failures.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Validation failures.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
