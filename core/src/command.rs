use crate::{
    engine::ScheduleEngine,
    error::ScheduleResult,
    model::{NewRoutine, NewStep, RoutineUpdate, StepUpdate},
    types::{CompletionId, RoutineId, StepId, UserId},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Administrative commands accepted by the schedule runner, one JSON
/// object per line. Variants are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    // ── Users ─────────────────────────────────────
    CreateUser {
        user_id:  UserId,
        timezone: String,
    },
    SetTimezone {
        user_id:  UserId,
        timezone: String,
    },

    // ── Routines ──────────────────────────────────
    CreateRoutine(NewRoutine),
    PublishRoutine {
        routine_id: RoutineId,
    },
    UpdateRoutine {
        routine_id: RoutineId,
        #[serde(flatten)]
        update:     RoutineUpdate,
    },

    // ── Steps ─────────────────────────────────────
    AddStep {
        routine_id: RoutineId,
        #[serde(flatten)]
        step:       NewStep,
    },
    UpdateStep {
        step_id: StepId,
        #[serde(flatten)]
        update:  StepUpdate,
    },
    RemoveStep {
        step_id: StepId,
    },

    // ── Completions ───────────────────────────────
    MarkCompletion {
        completion_id: CompletionId,
        #[serde(default = "default_completed")]
        completed:     bool,
    },
    SweepOverdue {
        #[serde(default)]
        user_id: Option<UserId>,
    },

    // ── Queries ───────────────────────────────────
    Completions {
        routine_id: RoutineId,
    },
    Summary {
        routine_id: RoutineId,
    },

    Quit,
}

fn default_completed() -> bool {
    true
}

impl AdminCommand {
    /// Run the command and return its JSON result. `Quit` is handled by the
    /// caller and returns `null` here.
    pub fn apply(self, engine: &mut ScheduleEngine) -> ScheduleResult<Value> {
        let value = match self {
            Self::CreateUser { user_id, timezone } => {
                serde_json::to_value(engine.create_user_profile(&user_id, &timezone)?)?
            }
            Self::SetTimezone { user_id, timezone } => {
                serde_json::to_value(engine.update_user_timezone(&user_id, &timezone)?)?
            }
            Self::CreateRoutine(new) => serde_json::to_value(engine.create_routine(new)?)?,
            Self::PublishRoutine { routine_id } => {
                serde_json::to_value(engine.publish_routine(&routine_id)?)?
            }
            Self::UpdateRoutine { routine_id, update } => {
                serde_json::to_value(engine.update_routine(&routine_id, update)?)?
            }
            Self::AddStep { routine_id, step } => {
                serde_json::to_value(engine.add_routine_step(&routine_id, step)?)?
            }
            Self::UpdateStep { step_id, update } => {
                serde_json::to_value(engine.update_routine_step(&step_id, update)?)?
            }
            Self::RemoveStep { step_id } => {
                engine.remove_routine_step(&step_id)?;
                json!({ "removed": step_id })
            }
            Self::MarkCompletion { completion_id, completed } => {
                serde_json::to_value(engine.mark_step_completion(&completion_id, completed)?)?
            }
            Self::SweepOverdue { user_id } => {
                let swept = match user_id {
                    Some(user_id) => engine.sweep_overdue(&user_id)?,
                    None => engine.sweep_all_overdue()?,
                };
                json!({ "missed": swept })
            }
            Self::Completions { routine_id } => serde_json::to_value(engine.completions(&routine_id)?)?,
            Self::Summary { routine_id } => serde_json::to_value(engine.compliance_summary(&routine_id)?)?,
            Self::Quit => Value::Null,
        };
        Ok(value)
    }
}
