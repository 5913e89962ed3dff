//! Deterministic service stubs.

use chrono::{DateTime, Duration, TimeZone, Utc};
use dorm_core::{Clock, EntityKey, KeyGenerator, UserRecord, UserRecordProvider};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out `<prefix>0001`, `<prefix>0002`, ...
#[derive(Debug)]
pub struct SequentialKeys {
    prefix: String,
    next: AtomicU64,
}

impl SequentialKeys {
    /// Starts counting at 1.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    /// Number of keys handed out so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst) - 1
    }
}

impl KeyGenerator for SequentialKeys {
    fn generate_key(&self) -> EntityKey {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        EntityKey::from(format!("{}{n:04}", self.prefix))
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Stops the clock at `at`.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    /// Stops the clock at 2020-01-01 12:00:00 UTC.
    pub fn fixed() -> Self {
        Self::new(Self::epoch())
    }

    /// The time [`ManualClock::fixed`] starts at.
    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0)
            .single()
            .unwrap_or_default()
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Sets the clock.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Always reports the same user.
#[derive(Debug, Clone)]
pub struct FixedUser(pub UserRecord);

impl FixedUser {
    /// The user every fixture session runs as.
    pub fn tester() -> Self {
        Self(
            UserRecord::new("tester")
                .user_id("user-1")
                .ip("127.0.0.1")
                .user_agent("dorm-testkit"),
        )
    }
}

impl UserRecordProvider for FixedUser {
    fn user_record(&self) -> UserRecord {
        self.0.clone()
    }
}
