//! Window calculator: which contiguous date range gets materialised.
//!
//! effective_start = max(routine_start, today)
//! effective_end   = min(effective_start + horizon - 1, routine_end)
//!
//! Nothing is ever scheduled before "today". A window whose start lies
//! after its end is empty, which is not an error.

use crate::types::CalendarDate;
use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationWindow {
    pub start: CalendarDate,
    pub end:   CalendarDate,
}

impl GenerationWindow {
    pub fn new(start: CalendarDate, end: CalendarDate) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Inclusive day count; zero for an empty window.
    pub fn len_days(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start).num_days() + 1
        }
    }

    pub fn contains(&self, date: CalendarDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every date in the window, in order.
    pub fn days(&self) -> impl Iterator<Item = CalendarDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// Narrow the window to end no later than `bound`.
    pub fn end_at_most(self, bound: CalendarDate) -> Self {
        Self { start: self.start, end: self.end.min(bound) }
    }

    /// Narrow the window to start no earlier than `bound`.
    pub fn start_at_least(self, bound: CalendarDate) -> Self {
        Self { start: self.start.max(bound), end: self.end }
    }
}

/// Add (or subtract) whole days, saturating at the calendar's limits.
pub fn shift_days(date: CalendarDate, days: i64) -> CalendarDate {
    date.checked_add_signed(Duration::days(days)).unwrap_or(if days < 0 {
        CalendarDate::MIN
    } else {
        CalendarDate::MAX
    })
}

pub fn effective_start(routine_start: CalendarDate, today: CalendarDate) -> CalendarDate {
    routine_start.max(today)
}

/// Last day of an uncapped window starting at `start`.
pub fn horizon_end(start: CalendarDate, max_horizon_days: u32) -> CalendarDate {
    shift_days(start, i64::from(max_horizon_days.max(1)) - 1)
}

pub fn compute_window(
    routine_start: CalendarDate,
    routine_end: Option<CalendarDate>,
    today: CalendarDate,
    max_horizon_days: u32,
) -> GenerationWindow {
    let start = effective_start(routine_start, today);
    let default_end = horizon_end(start, max_horizon_days);
    let end = match routine_end {
        Some(explicit) => default_end.min(explicit),
        None => default_end,
    };
    GenerationWindow { start, end }
}
