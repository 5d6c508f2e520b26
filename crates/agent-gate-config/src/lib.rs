// crates/agent-gate-config/src/lib.rs
// ============================================================================
// Module: Agent Gate Configuration
// Description: Configuration loading and validation for agent-gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: agent-gate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Configuration is loaded from a JSON file with strict size limits and
//! unknown-field rejection. Missing or empty secrets fail closed at
//! startup: a proxy that cannot authenticate callers must not serve
//! requests. Path resolution honors the `SECURE_WRAPPER_*` environment
//! overrides so tests can redirect persistent state.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod paths;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuthConfig;
pub use config::CalendarReadConfig;
pub use config::CalendarWriteConfig;
pub use config::ConfigError;
pub use config::EmailConfig;
pub use config::GateConfig;
pub use config::OutboundConfig;
pub use config::ProviderConfig;
pub use config::ServerConfig;
pub use paths::DataPaths;
