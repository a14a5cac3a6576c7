//! Audit events: every change the engine makes to routines, steps and
//! completions is described by one of these and appended to the
//! `schedule_event` table in the same transaction as the change.
//!
//! Variants are added over time, never removed or reordered.

use crate::{
    model::{CompletionStatus, Frequency, TimeOfDay},
    types::{CalendarDate, CompletionId, Instant, RoutineId, StepId, UserId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleEvent {
    // ── Routine lifecycle ──────────────────────────
    RoutineCreated {
        routine_id: RoutineId,
        user_id:    UserId,
    },
    RoutinePublished {
        routine_id: RoutineId,
        window_start: CalendarDate,
        window_end:   CalendarDate,
    },
    RoutineUpdated {
        routine_id: RoutineId,
        start_date: CalendarDate,
        end_date:   Option<CalendarDate>,
    },

    // ── Step lifecycle ─────────────────────────────
    StepAdded {
        routine_id: RoutineId,
        step_id:    StepId,
    },
    StepUpdated {
        step_id:     StepId,
        frequency:   Frequency,
        time_of_day: TimeOfDay,
        rescheduled: bool,
    },
    StepRemoved {
        routine_id: RoutineId,
        step_id:    StepId,
    },

    // ── Completion table writes ────────────────────
    CompletionsGenerated {
        routine_id: RoutineId,
        count:      usize,
        from:       CalendarDate,
        to:         CalendarDate,
    },
    PendingCompletionsDeleted {
        routine_id: RoutineId,
        count:      usize,
        reason:     String,
    },
    CompletionMarked {
        completion_id: CompletionId,
        status:        CompletionStatus,
        completed_at:  Option<Instant>,
    },
    OverdueSwept {
        user_id: Option<UserId>,
        count:   usize,
    },
}

impl ScheduleEvent {
    /// Stable string name, stored in the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RoutineCreated { .. }            => "routine_created",
            Self::RoutinePublished { .. }          => "routine_published",
            Self::RoutineUpdated { .. }            => "routine_updated",
            Self::StepAdded { .. }                 => "step_added",
            Self::StepUpdated { .. }               => "step_updated",
            Self::StepRemoved { .. }               => "step_removed",
            Self::CompletionsGenerated { .. }      => "completions_generated",
            Self::PendingCompletionsDeleted { .. } => "pending_completions_deleted",
            Self::CompletionMarked { .. }          => "completion_marked",
            Self::OverdueSwept { .. }              => "overdue_swept",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:          Option<i64>,
    pub recorded_at: Instant,
    pub event_type:  String,
    pub payload:     String, // JSON-serialized ScheduleEvent
}
