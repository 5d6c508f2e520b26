// crates/agent-gate-config/src/paths.rs
// ============================================================================
// Module: Data Paths
// Description: Persistent-state path resolution with environment overrides.
// Purpose: Keep the on-disk layout and its test redirections in one place.
// Dependencies: std
// ============================================================================

//! ## Overview
//! All persistent state lives under one writable data directory:
//! configuration, the append-only audit log, replay markers, and the two
//! quota counter files. Each path can be redirected individually through a
//! `SECURE_WRAPPER_*` environment variable, principally so tests can pin
//! state to a temporary directory.

use std::env;
use std::path::Path;
use std::path::PathBuf;

/// Environment override for the config file path.
pub const CONFIG_ENV_VAR: &str = "SECURE_WRAPPER_CONFIG";
/// Environment override for the audit log path.
pub const AUDIT_ENV_VAR: &str = "SECURE_WRAPPER_AUDIT";
/// Environment override for the replay marker directory.
pub const REPLAY_DIR_ENV_VAR: &str = "SECURE_WRAPPER_REPLAY_DIR";
/// Environment override for the send counter file.
pub const SEND_COUNTERS_ENV_VAR: &str = "SECURE_WRAPPER_RATE";
/// Environment override for the calendar counter file.
pub const CALENDAR_COUNTERS_ENV_VAR: &str = "SECURE_WRAPPER_CALENDAR_RATE";

/// Resolved locations of all persistent state.
#[derive(Debug, Clone)]
pub struct DataPaths {
    /// Canonical configuration file.
    pub config: PathBuf,
    /// Append-only audit log (JSON lines).
    pub audit_log: PathBuf,
    /// Replay marker directory.
    pub replay_dir: PathBuf,
    /// Send quota counter file.
    pub send_counters: PathBuf,
    /// Calendar mutation quota counter file.
    pub calendar_counters: PathBuf,
}

impl DataPaths {
    /// Resolves the state layout under `data_dir`, applying environment
    /// overrides.
    #[must_use]
    pub fn resolve(data_dir: &Path) -> Self {
        Self {
            config: env_path(CONFIG_ENV_VAR)
                .unwrap_or_else(|| data_dir.join("config").join("wrapper-config.json")),
            audit_log: env_path(AUDIT_ENV_VAR)
                .unwrap_or_else(|| data_dir.join("logs").join("audit.jsonl")),
            replay_dir: env_path(REPLAY_DIR_ENV_VAR)
                .unwrap_or_else(|| data_dir.join("logs").join("token-replay")),
            send_counters: env_path(SEND_COUNTERS_ENV_VAR)
                .unwrap_or_else(|| data_dir.join("logs").join("send-counters.json")),
            calendar_counters: env_path(CALENDAR_COUNTERS_ENV_VAR)
                .unwrap_or_else(|| data_dir.join("logs").join("calendar-counters.json")),
        }
    }
}

/// Reads a non-empty path from the environment.
fn env_path(var: &str) -> Option<PathBuf> {
    env::var_os(var).filter(|value| !value.is_empty()).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::DataPaths;

    #[test]
    fn layout_follows_data_dir() {
        let paths = DataPaths::resolve(Path::new("/var/lib/agent-gate"));
        assert_eq!(
            paths.config,
            Path::new("/var/lib/agent-gate/config/wrapper-config.json")
        );
        assert_eq!(paths.audit_log, Path::new("/var/lib/agent-gate/logs/audit.jsonl"));
        assert_eq!(paths.replay_dir, Path::new("/var/lib/agent-gate/logs/token-replay"));
        assert_eq!(
            paths.send_counters,
            Path::new("/var/lib/agent-gate/logs/send-counters.json")
        );
        assert_eq!(
            paths.calendar_counters,
            Path::new("/var/lib/agent-gate/logs/calendar-counters.json")
        );
    }
}
