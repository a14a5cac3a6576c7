//! Compliance status resolver: what happens when a user ticks (or
//! un-ticks) a scheduled step.
//!
//! RULES:
//!   - Un-ticking always resets to `pending` with no completion time.
//!   - A `missed` row cannot be completed.
//!   - Completing an already-completed row is a no-op.
//!   - Completion after the grace period is rejected; the overdue sweep
//!     is what turns such rows into `missed`.
//!   - At or before the on-time deadline is `on-time`, after it is `late`.

use crate::{
    model::{CompletionStatus, StepCompletion},
    types::Instant,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    AlreadyMissed,
    PastGracePeriod,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyMissed   => f.write_str("a missed step cannot be completed"),
            Self::PastGracePeriod => f.write_str("the grace period for this step has ended"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The row changed and must be written back.
    Updated(StepCompletion),
    /// Idempotent repeat; nothing to write.
    Unchanged(StepCompletion),
}

impl Resolution {
    pub fn completion(&self) -> &StepCompletion {
        match self {
            Self::Updated(c) | Self::Unchanged(c) => c,
        }
    }

    pub fn into_completion(self) -> StepCompletion {
        match self {
            Self::Updated(c) | Self::Unchanged(c) => c,
        }
    }
}

pub fn resolve_completion(
    existing: &StepCompletion,
    attempted_at: Instant,
    marking_complete: bool,
) -> Result<Resolution, Rejection> {
    if !marking_complete {
        let mut reset = existing.clone();
        reset.status = CompletionStatus::Pending;
        reset.completed_at = None;
        return Ok(Resolution::Updated(reset));
    }

    match existing.status {
        CompletionStatus::Missed => return Err(Rejection::AlreadyMissed),
        CompletionStatus::OnTime | CompletionStatus::Late => {
            return Ok(Resolution::Unchanged(existing.clone()));
        }
        CompletionStatus::Pending => {}
    }

    if attempted_at > existing.grace_period_end {
        return Err(Rejection::PastGracePeriod);
    }

    let mut done = existing.clone();
    done.status = if attempted_at <= existing.on_time_deadline {
        CompletionStatus::OnTime
    } else {
        CompletionStatus::Late
    };
    done.completed_at = Some(attempted_at);
    Ok(Resolution::Updated(done))
}

/// Whether the overdue sweep should turn this row into `missed`.
pub fn is_overdue(completion: &StepCompletion, now: Instant) -> bool {
    completion.status == CompletionStatus::Pending && completion.grace_period_end < now
}
