//! Time source for the scheduling engine.
//!
//! RULE: Nothing in the engine calls `Utc::now()` directly.
//! Every operation reads its `Clock` exactly once and threads the
//! resulting instant through the scheduling functions it calls.

use crate::types::{CalendarDate, Instant};
use chrono::{DateTime, Duration, Utc};
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Server-side "today": the UTC calendar date of `now()`.
    fn today(&self) -> CalendarDate {
        self.now().date_naive()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Utc::now()
    }
}

/// A manually driven clock. Clones share the same underlying instant,
/// so a test can keep one handle and move time under a running engine.
#[derive(Debug, Clone)]
pub struct FixedClock {
    micros: Arc<AtomicI64>,
}

impl FixedClock {
    pub fn new(at: Instant) -> Self {
        Self {
            micros: Arc::new(AtomicI64::new(at.timestamp_micros())),
        }
    }

    pub fn set(&self, at: Instant) {
        self.micros.store(at.timestamp_micros(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.set(self.now() + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Instant {
        let micros = self.micros.load(Ordering::SeqCst);
        DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::UNIX_EPOCH)
    }
}
