//! Deadline calculator: local wall-clock deadlines to UTC instants.
//!
//! Morning steps are due at the configured morning time (12:00 by default)
//! local time on the scheduled date, evening steps at the evening time
//! (23:59:59). The grace period ends a fixed span after the on-time
//! deadline. Offsets are resolved for the scheduled date itself, so a
//! date on the far side of a DST change gets that date's offset.
//!
//! One calculator is built per generation run and memoises by
//! `(date, time_of_day)`. It is never shared across runs: a user's zone
//! may change between calls.

use crate::{
    config::SchedulerConfig,
    error::{ScheduleError, ScheduleResult},
    model::TimeOfDay,
    types::{CalendarDate, Instant},
};
use chrono::{Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deadlines {
    pub on_time_deadline: Instant,
    pub grace_period_end: Instant,
}

/// Parse an IANA zone name, failing fast on anything chrono-tz does not know.
pub fn parse_timezone(name: &str) -> ScheduleResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))
}

pub struct DeadlineCalculator {
    tz:          Tz,
    morning:     NaiveTime,
    evening:     NaiveTime,
    grace:       Duration,
    cache:       HashMap<(CalendarDate, TimeOfDay), Deadlines>,
    cache_hits:  u64,
}

impl DeadlineCalculator {
    pub fn new(timezone: &str, config: &SchedulerConfig) -> ScheduleResult<Self> {
        Ok(Self {
            tz:         parse_timezone(timezone)?,
            morning:    config.morning_deadline,
            evening:    config.evening_deadline,
            grace:      config.grace_period(),
            cache:      HashMap::new(),
            cache_hits: 0,
        })
    }

    /// Deadlines for one scheduled instance. Repeated calls with the same
    /// key return the cached value.
    pub fn deadlines(&mut self, date: CalendarDate, time_of_day: TimeOfDay) -> Deadlines {
        if let Some(hit) = self.cache.get(&(date, time_of_day)) {
            self.cache_hits += 1;
            return *hit;
        }
        let local_time = match time_of_day {
            TimeOfDay::Morning => self.morning,
            TimeOfDay::Evening => self.evening,
        };
        let on_time_deadline = local_to_utc(self.tz, date.and_time(local_time));
        let computed = Deadlines {
            on_time_deadline,
            grace_period_end: on_time_deadline + self.grace,
        };
        self.cache.insert((date, time_of_day), computed);
        computed
    }

    /// Number of distinct `(date, time_of_day)` keys computed so far.
    pub fn computed_count(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }
}

/// Resolve a local wall-clock time in `tz` to UTC.
///
/// Ambiguous times (clocks going back) take the earlier instant. Times that
/// fall into a spring-forward gap move forward to the first valid minute.
fn local_to_utc(tz: Tz, local: NaiveDateTime) -> Instant {
    let mut candidate = local;
    for _ in 0..=180 {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => candidate += Duration::minutes(1),
        }
    }
    // No real zone has a gap longer than three hours.
    Utc.from_utc_datetime(&local)
}
