// crates/agent-gate-server/src/quota.rs
// ============================================================================
// Module: Quota Counters
// Description: Rolling hour/day counters with cross-process file locking.
// Purpose: Atomically meter outbound sends and calendar mutations.
// Dependencies: agent-gate-core, serde, serde_json, time
// ============================================================================

//! ## Overview
//! Each counter kind is one JSON record on disk, mutated only while the
//! sibling `.lock` file is held. The lock primitive is exclusive-create
//! with a bounded spin (~1 second), so contention resolves across processes
//! without a database. Counters roll when the current UTC hour or day key
//! differs from the stored one, and a consume either increments both counts
//! and persists, or denies without consuming anything. Unparseable counter
//! files fail closed — the consume errors rather than resetting state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use agent_gate_core::day_key;
use agent_gate_core::hour_key;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Lock acquisition attempts before giving up.
const LOCK_ATTEMPTS: u32 = 50;
/// Sleep between lock attempts.
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(20);

// ============================================================================
// SECTION: Record
// ============================================================================

/// Persisted counter record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CounterRecord {
    /// UTC hour key, `YYYY-MM-DD-HH`.
    hour_key: String,
    /// UTC day key, `YYYY-MM-DD`.
    day_key: String,
    /// Mutations in the current hour window.
    hour_count: u32,
    /// Mutations in the current day window.
    day_count: u32,
}

impl CounterRecord {
    fn fresh(now: OffsetDateTime) -> Self {
        Self {
            hour_key: hour_key(now),
            day_key: day_key(now),
            hour_count: 0,
            day_count: 0,
        }
    }

    /// Rolls either window when its key has moved on.
    fn roll(&mut self, now: OffsetDateTime) {
        let hour = hour_key(now);
        if self.hour_key != hour {
            self.hour_key = hour;
            self.hour_count = 0;
        }
        let day = day_key(now);
        if self.day_key != day {
            self.day_key = day;
            self.day_count = 0;
        }
    }
}

// ============================================================================
// SECTION: Decisions & Errors
// ============================================================================

/// Reason a consume was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaReason {
    /// The rolling hour window is exhausted.
    HourLimitExceeded,
    /// The rolling day window is exhausted.
    DayLimitExceeded,
}

impl QuotaReason {
    /// Stable wire token for the denial.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HourLimitExceeded => "hour_limit_exceeded",
            Self::DayLimitExceeded => "day_limit_exceeded",
        }
    }
}

/// Outcome of a consume attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// One unit was consumed.
    Ok,
    /// Nothing was consumed.
    Denied(QuotaReason),
}

/// Quota counter errors. These surface as upstream failures, never as
/// silent resets.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// Lock not acquired within the bounded spin.
    #[error("quota lock timeout")]
    LockTimeout,
    /// Counter file unreadable or unparseable.
    #[error("quota state error: {0}")]
    State(String),
    /// Other filesystem failures.
    #[error("quota io error: {0}")]
    Io(String),
}

impl QuotaError {
    /// Stable audit code for the failure.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::LockTimeout => "quota_lock_timeout",
            Self::State(_) => "quota_state_invalid",
            Self::Io(_) => "quota_io_error",
        }
    }
}

// ============================================================================
// SECTION: Lock Guard
// ============================================================================

/// Holds the sibling lock file; removes it on drop.
struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Acquires the lock by exclusive-create, spinning up to ~1 second.
    fn acquire(path: &Path) -> Result<Self, QuotaError> {
        for attempt in 0..LOCK_ATTEMPTS {
            match fs::OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if attempt + 1 == LOCK_ATTEMPTS {
                        break;
                    }
                    thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(err) => return Err(QuotaError::Io(err.to_string())),
            }
        }
        Err(QuotaError::LockTimeout)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

// ============================================================================
// SECTION: Counter
// ============================================================================

/// One rolling hour/day quota counter backed by a single file.
pub struct QuotaCounter {
    /// Counter record path.
    path: PathBuf,
    /// Sibling lock file path.
    lock_path: PathBuf,
    /// Hour window cap.
    hour_max: u32,
    /// Day window cap.
    day_max: u32,
}

impl QuotaCounter {
    /// Creates a counter over the given record path.
    #[must_use]
    pub fn new(path: PathBuf, hour_max: u32, day_max: u32) -> Self {
        let lock_path = lock_path_for(&path);
        Self {
            path,
            lock_path,
            hour_max,
            day_max,
        }
    }

    /// Atomically consumes one unit from both rolling windows.
    ///
    /// Either the decision is [`QuotaDecision::Ok`] and the persisted
    /// counts were incremented, or nothing changed on disk. Blocks up to
    /// ~1 second on lock contention; call from a blocking context.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError`] on lock timeout or unusable counter state.
    pub fn consume(&self, now: OffsetDateTime) -> Result<QuotaDecision, QuotaError> {
        let _guard = LockGuard::acquire(&self.lock_path)?;
        let mut record = self.load(now)?;
        record.roll(now);
        if record.hour_count >= self.hour_max {
            return Ok(QuotaDecision::Denied(QuotaReason::HourLimitExceeded));
        }
        if record.day_count >= self.day_max {
            return Ok(QuotaDecision::Denied(QuotaReason::DayLimitExceeded));
        }
        record.hour_count += 1;
        record.day_count += 1;
        self.persist(&record)?;
        Ok(QuotaDecision::Ok)
    }

    /// Loads the record, defaulting only when the file does not exist.
    fn load(&self, now: OffsetDateTime) -> Result<CounterRecord, QuotaError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(CounterRecord::fresh(now));
            }
            Err(err) => return Err(QuotaError::Io(err.to_string())),
        };
        serde_json::from_slice(&bytes).map_err(|err| QuotaError::State(err.to_string()))
    }

    fn persist(&self, record: &CounterRecord) -> Result<(), QuotaError> {
        let payload =
            serde_json::to_vec(record).map_err(|err| QuotaError::State(err.to_string()))?;
        fs::write(&self.path, payload).map_err(|err| QuotaError::Io(err.to_string()))
    }
}

/// Returns the sibling lock path for a counter file.
fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use tempfile::TempDir;
    use time::OffsetDateTime;

    use super::QuotaCounter;
    use super::QuotaDecision;
    use super::QuotaError;
    use super::QuotaReason;

    fn counter(dir: &TempDir, hour_max: u32, day_max: u32) -> QuotaCounter {
        QuotaCounter::new(dir.path().join("counters.json"), hour_max, day_max)
    }

    #[test]
    fn consume_increments_until_hour_cap() {
        let dir = TempDir::new().expect("tempdir");
        let counter = counter(&dir, 2, 10);
        let now = OffsetDateTime::now_utc();
        assert_eq!(counter.consume(now).expect("consume"), QuotaDecision::Ok);
        assert_eq!(counter.consume(now).expect("consume"), QuotaDecision::Ok);
        assert_eq!(
            counter.consume(now).expect("consume"),
            QuotaDecision::Denied(QuotaReason::HourLimitExceeded)
        );
    }

    #[test]
    fn day_cap_denies_independently() {
        let dir = TempDir::new().expect("tempdir");
        let counter = counter(&dir, 10, 1);
        let now = OffsetDateTime::now_utc();
        assert_eq!(counter.consume(now).expect("consume"), QuotaDecision::Ok);
        assert_eq!(
            counter.consume(now).expect("consume"),
            QuotaDecision::Denied(QuotaReason::DayLimitExceeded)
        );
    }

    #[test]
    fn windows_roll_when_keys_change() {
        let dir = TempDir::new().expect("tempdir");
        let counter = counter(&dir, 1, 5);
        let now = OffsetDateTime::now_utc();
        assert_eq!(counter.consume(now).expect("consume"), QuotaDecision::Ok);
        assert_eq!(
            counter.consume(now).expect("consume"),
            QuotaDecision::Denied(QuotaReason::HourLimitExceeded)
        );
        let next_hour = now + time::Duration::hours(1);
        assert_eq!(counter.consume(next_hour).expect("consume"), QuotaDecision::Ok);
    }

    #[test]
    fn corrupt_counter_state_fails_closed() {
        let dir = TempDir::new().expect("tempdir");
        let counter = counter(&dir, 5, 5);
        fs::write(dir.path().join("counters.json"), "not json").expect("write");
        assert!(matches!(
            counter.consume(OffsetDateTime::now_utc()),
            Err(QuotaError::State(_))
        ));
    }

    #[test]
    fn stale_lock_file_times_out() {
        let dir = TempDir::new().expect("tempdir");
        let counter = counter(&dir, 5, 5);
        fs::write(dir.path().join("counters.json.lock"), "").expect("write");
        assert!(matches!(
            counter.consume(OffsetDateTime::now_utc()),
            Err(QuotaError::LockTimeout)
        ));
    }

    #[test]
    fn concurrent_consumes_respect_the_cap() {
        let dir = TempDir::new().expect("tempdir");
        let counter = Arc::new(counter(&dir, 3, 100));
        let now = OffsetDateTime::now_utc();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || counter.consume(now).expect("consume"))
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .filter(|decision| *decision == QuotaDecision::Ok)
            .count();
        assert_eq!(granted, 3);
    }
}
