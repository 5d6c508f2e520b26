// crates/agent-gate-server/src/replay.rs
// ============================================================================
// Module: Replay Store
// Description: Persistent one-time-use marker set keyed by token jti.
// Purpose: Guarantee single-winner token admission across processes.
// Dependencies: serde_json, time
// ============================================================================

//! ## Overview
//! Each verified token installs a marker file `<jti>.json` in the replay
//! directory via exclusive-create. The filesystem is the only source of
//! mutual exclusion: exactly one create wins per jti, across restarts and
//! across concurrent processes sharing the directory. A cooperative sweeper
//! runs at most once per minute per process and deletes markers whose
//! expiry has passed, along with any it cannot parse. jti values reaching
//! this module have already passed the safe-name check, so marker
//! filenames cannot escape the directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::token::jti_is_safe;

/// Minimum interval between sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Store
// ============================================================================

/// Marker payload: the consumed token's expiry.
#[derive(Debug, Serialize, Deserialize)]
struct Marker {
    /// Token expiry, unix seconds.
    exp: i64,
}

/// Replay store errors.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// jti failed the safe-name check at the store boundary.
    #[error("unsafe jti")]
    UnsafeJti,
    /// Filesystem failures other than already-exists.
    #[error("replay store io error: {0}")]
    Io(String),
}

/// Persistent one-time-use marker set.
pub struct ReplayStore {
    /// Marker directory.
    dir: PathBuf,
    /// Last sweep time for this process.
    last_sweep: Mutex<Option<Instant>>,
}

impl ReplayStore {
    /// Opens the store, creating the marker directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Io`] when the directory cannot be created.
    pub fn open(dir: &Path) -> Result<Self, ReplayError> {
        fs::create_dir_all(dir).map_err(|err| ReplayError::Io(err.to_string()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            last_sweep: Mutex::new(None),
        })
    }

    /// Installs the marker for a jti.
    ///
    /// Returns `true` when this call created the marker (first use) and
    /// `false` when the marker already exists (replay).
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError`] on unsafe jti values or filesystem failures.
    pub fn install(&self, jti: &str, exp_unix: i64) -> Result<bool, ReplayError> {
        if !jti_is_safe(jti) {
            return Err(ReplayError::UnsafeJti);
        }
        self.sweep_if_due(unix_now());
        let path = self.dir.join(format!("{jti}.json"));
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                let marker = Marker {
                    exp: exp_unix,
                };
                serde_json::to_writer(&file, &marker)
                    .map_err(|err| ReplayError::Io(err.to_string()))?;
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(ReplayError::Io(err.to_string())),
        }
    }

    /// Sweeps expired and malformed markers, at most once per minute.
    pub fn sweep_if_due(&self, now_unix: i64) {
        {
            let Ok(mut last) = self.last_sweep.lock() else {
                return;
            };
            if let Some(at) = *last
                && at.elapsed() < SWEEP_INTERVAL
            {
                return;
            }
            *last = Some(Instant::now());
        }
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let expired = fs::read(&path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<Marker>(&bytes).ok())
                .is_none_or(|marker| marker.exp <= now_unix);
            if expired {
                let _ = fs::remove_file(&path);
            }
        }
    }
}

/// Current unix time in seconds.
fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
