//! Records owned by the scheduling engine: routines, their steps, and the
//! materialised step completions. Descriptive step fields are carried
//! through untouched; only `frequency`, `days` and `time_of_day` drive
//! scheduling.

use crate::types::{CalendarDate, CompletionId, Instant, RoutineId, StepId, UserId};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Implements `as_str`, `Display` and `FromStr` for a unit enum using the
/// same kebab-case names serde uses, so the SQL columns and JSON agree.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(
                        "unknown {} '{other}'",
                        stringify!($ty)
                    )),
                }
            }
        }
    };
}

// ── Routine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RoutineStatus {
    Draft,
    Published,
}

text_enum!(RoutineStatus {
    Draft     => "draft",
    Published => "published",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Routine {
    pub id:                RoutineId,
    pub user_id:           UserId,
    pub name:              String,
    pub start_date:        CalendarDate,
    /// `None` means the routine runs indefinitely.
    pub end_date:          Option<CalendarDate>,
    pub status:            RoutineStatus,
    pub saved_as_template: bool,
}

impl Routine {
    pub fn is_published(&self) -> bool {
        self.status == RoutineStatus::Published
    }
}

// ── Routine step ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum TimeOfDay {
    Morning,
    Evening,
}

text_enum!(TimeOfDay {
    Morning => "morning",
    Evening => "evening",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Frequency {
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "2x-per-week")]
    TwicePerWeek,
    #[serde(rename = "3x-per-week")]
    ThreeTimesPerWeek,
    #[serde(rename = "specific-days")]
    SpecificDays,
}

text_enum!(Frequency {
    Daily             => "daily",
    TwicePerWeek      => "2x-per-week",
    ThreeTimesPerWeek => "3x-per-week",
    SpecificDays      => "specific-days",
});

impl Frequency {
    /// Whether this frequency consults the step's `days` set at all.
    pub fn is_day_dependent(&self) -> bool {
        !matches!(self, Self::Daily)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutineStep {
    pub id:           StepId,
    pub routine_id:   RoutineId,
    pub order_index:  i64,
    pub time_of_day:  TimeOfDay,
    pub frequency:    Frequency,
    /// Lower-case weekday names, e.g. `["monday", "friday"]`.
    pub days:         Vec<String>,
    pub name:         String,
    pub instructions: Option<String>,
    pub product_url:  Option<String>,
}

/// Fields for a step that does not exist yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewStep {
    pub name:         String,
    pub time_of_day:  TimeOfDay,
    pub frequency:    Frequency,
    #[serde(default)]
    pub days:         Vec<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub product_url:  Option<String>,
}

// ── Step completion ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionStatus {
    Pending,
    OnTime,
    Late,
    Missed,
}

text_enum!(CompletionStatus {
    Pending => "pending",
    OnTime  => "on-time",
    Late    => "late",
    Missed  => "missed",
});

impl CompletionStatus {
    /// Completed and missed rows are historical fact.
    pub fn is_history(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepCompletion {
    pub id:                    CompletionId,
    pub step_id:               StepId,
    pub user_id:               UserId,
    pub scheduled_date:        CalendarDate,
    pub scheduled_time_of_day: TimeOfDay,
    pub on_time_deadline:      Instant,
    pub grace_period_end:      Instant,
    pub status:                CompletionStatus,
    pub completed_at:          Option<Instant>,
}

// ── User profile (referenced, not owned) ───────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id:       UserId,
    /// IANA zone name, e.g. `Africa/Nairobi`.
    pub timezone: String,
}

// ── Requests ───────────────────────────────────────────────────

/// Distinguishes "field absent" (`None`) from "field set to null"
/// (`Some(None)`) when deserialising partial updates.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewRoutine {
    pub user_id:           UserId,
    pub name:              String,
    pub start_date:        CalendarDate,
    #[serde(default)]
    pub end_date:          Option<CalendarDate>,
    #[serde(default)]
    pub saved_as_template: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoutineUpdate {
    #[serde(default)]
    pub name:       Option<String>,
    #[serde(default)]
    pub start_date: Option<CalendarDate>,
    /// `Some(None)` removes the end date, making the routine indefinite.
    #[serde(default, deserialize_with = "double_option")]
    pub end_date:   Option<Option<CalendarDate>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StepUpdate {
    #[serde(default)]
    pub frequency:    Option<Frequency>,
    #[serde(default)]
    pub days:         Option<Vec<String>>,
    #[serde(default)]
    pub time_of_day:  Option<TimeOfDay>,
    #[serde(default)]
    pub name:         Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub instructions: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub product_url:  Option<Option<String>>,
    #[serde(default)]
    pub order_index:  Option<i64>,
}

impl StepUpdate {
    /// Whether this update touches a field that drives scheduling.
    pub fn touches_schedule(&self) -> bool {
        self.frequency.is_some() || self.days.is_some() || self.time_of_day.is_some()
    }
}
