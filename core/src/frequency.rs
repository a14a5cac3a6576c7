//! Frequency predicate: does a step fire on a given calendar date?
//!
//! `daily` always fires. Every other frequency fires iff the date's weekday
//! is in the step's `days` set. The count in `2x-per-week` / `3x-per-week`
//! is a label only; the `days` set is authoritative and its size is not
//! checked here. An empty set for a day-dependent frequency fires never.

use crate::{
    error::{ScheduleError, ScheduleResult},
    model::{Frequency, RoutineStep},
    types::CalendarDate,
};
use chrono::{Datelike, Weekday};

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, Copy)]
pub struct FrequencyRule<'a> {
    pub frequency: Frequency,
    pub days:      &'a [String],
}

impl RoutineStep {
    pub fn rule(&self) -> FrequencyRule<'_> {
        FrequencyRule {
            frequency: self.frequency,
            days:      &self.days,
        }
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Full weekday name, any case.
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    let trimmed = name.trim();
    WEEK.into_iter()
        .find(|day| weekday_name(*day).eq_ignore_ascii_case(trimmed))
}

pub fn should_generate(rule: FrequencyRule<'_>, date: CalendarDate) -> bool {
    match rule.frequency {
        Frequency::Daily => true,
        Frequency::TwicePerWeek | Frequency::ThreeTimesPerWeek | Frequency::SpecificDays => {
            let today = weekday_name(date.weekday());
            rule.days.iter().any(|d| d.trim().eq_ignore_ascii_case(today))
        }
    }
}

/// Validate a step's `days` against its frequency and return the set in
/// canonical form: lower-case, de-duplicated, Monday-first.
///
/// `daily` ignores its days and stores none. An empty set is accepted for
/// every frequency; a day-dependent step with no days schedules nothing.
pub fn normalize_days(frequency: Frequency, days: &[String]) -> ScheduleResult<Vec<String>> {
    let mut parsed = Vec::with_capacity(days.len());
    for name in days {
        let day = parse_weekday(name)
            .ok_or_else(|| ScheduleError::Validation(format!("'{name}' is not a weekday name")))?;
        parsed.push(day);
    }
    if !frequency.is_day_dependent() {
        return Ok(Vec::new());
    }
    Ok(WEEK
        .into_iter()
        .filter(|day| parsed.contains(day))
        .map(|day| weekday_name(day).to_string())
        .collect())
}
