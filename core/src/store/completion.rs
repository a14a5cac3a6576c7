use super::{instant_col, opt_instant_col, placeholders, text_col, Repository};
use crate::{
    error::ScheduleResult,
    generator::InstanceKey,
    model::{CompletionStatus, StepCompletion},
    types::{CalendarDate, Instant, StepId},
    window::shift_days,
};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const COMPLETION_COLUMNS: &str =
    "completion_id, step_id, user_id, scheduled_date, scheduled_time_of_day,
     on_time_deadline, grace_period_end, status, completed_at";

/// Inclusive bounds on `scheduled_date`. `None` leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<CalendarDate>,
    pub to:   Option<CalendarDate>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    /// Every date strictly before `date`.
    pub fn before(date: CalendarDate) -> Self {
        Self { from: None, to: Some(shift_days(date, -1)) }
    }

    /// Every date strictly after `date`.
    pub fn after(date: CalendarDate) -> Self {
        Self { from: Some(shift_days(date, 1)), to: None }
    }

    pub fn between(from: CalendarDate, to: CalendarDate) -> Self {
        Self { from: Some(from), to: Some(to) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extreme {
    Min,
    Max,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCount {
    pub status: CompletionStatus,
    pub count:  i64,
}

/// `step_id IN (...) AND scheduled_date >= ? AND scheduled_date <= ?`
/// plus the values for its placeholders.
fn scope_clause(step_ids: &[StepId], range: DateRange) -> (String, Vec<Value>) {
    let mut clause = format!("step_id IN ({})", placeholders(step_ids.len()));
    let mut values: Vec<Value> = step_ids.iter().map(|id| Value::Text(id.clone())).collect();
    if let Some(from) = range.from {
        clause.push_str(" AND scheduled_date >= ?");
        values.push(Value::Text(from.to_string()));
    }
    if let Some(to) = range.to {
        clause.push_str(" AND scheduled_date <= ?");
        values.push(Value::Text(to.to_string()));
    }
    (clause, values)
}

impl Repository<'_> {
    // ── Step completion: writes ────────────────────────────────

    /// Insert a batch of completions. An instance that already has a row
    /// (same step, same date) is left alone. Returns the rows written.
    pub fn insert_completions(&self, rows: &[StepCompletion]) -> ScheduleResult<usize> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO step_completion (
                completion_id, step_id, user_id, scheduled_date, scheduled_time_of_day,
                on_time_deadline, grace_period_end, status, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (step_id, scheduled_date) DO NOTHING",
        )?;
        let mut written = 0;
        for c in rows {
            written += stmt.execute(params![
                c.id,
                c.step_id,
                c.user_id,
                c.scheduled_date,
                c.scheduled_time_of_day.as_str(),
                c.on_time_deadline.timestamp(),
                c.grace_period_end.timestamp(),
                c.status.as_str(),
                c.completed_at.map(|t| t.timestamp()),
            ])?;
        }
        Ok(written)
    }

    /// Delete `pending` completions of the given steps within `range`.
    /// Rows in any other status are history and are never matched.
    pub fn delete_pending_completions(&self, step_ids: &[StepId], range: DateRange) -> ScheduleResult<usize> {
        if step_ids.is_empty() {
            return Ok(0);
        }
        let (scope, mut values) = scope_clause(step_ids, range);
        values.push(Value::Text(CompletionStatus::Pending.as_str().to_string()));
        let deleted = self.conn.execute(
            &format!("DELETE FROM step_completion WHERE {scope} AND status = ?"),
            params_from_iter(values.iter()),
        )?;
        Ok(deleted)
    }

    pub fn update_completion_status(
        &self,
        completion_id: &str,
        status: CompletionStatus,
        completed_at: Option<Instant>,
    ) -> ScheduleResult<()> {
        self.conn.execute(
            "UPDATE step_completion SET status = ?1, completed_at = ?2 WHERE completion_id = ?3",
            params![status.as_str(), completed_at.map(|t| t.timestamp()), completion_id],
        )?;
        Ok(())
    }

    /// Turn every `pending` row whose grace period ended before `now`
    /// into `missed`. Scoped to one user, or every user when `None`.
    pub fn mark_overdue_missed(&self, user_id: Option<&str>, now: Instant) -> ScheduleResult<usize> {
        let changed = match user_id {
            Some(user_id) => self.conn.execute(
                "UPDATE step_completion SET status = 'missed', completed_at = NULL
                 WHERE user_id = ?1 AND status = 'pending' AND grace_period_end < ?2",
                params![user_id, now.timestamp()],
            )?,
            None => self.conn.execute(
                "UPDATE step_completion SET status = 'missed', completed_at = NULL
                 WHERE status = 'pending' AND grace_period_end < ?1",
                params![now.timestamp()],
            )?,
        };
        Ok(changed)
    }

    // ── Step completion: reads ─────────────────────────────────

    /// Earliest or latest scheduled date across the given steps, any status.
    pub fn find_extreme_completion_date(
        &self,
        step_ids: &[StepId],
        direction: Extreme,
    ) -> ScheduleResult<Option<CalendarDate>> {
        if step_ids.is_empty() {
            return Ok(None);
        }
        let aggregate = match direction {
            Extreme::Min => "MIN",
            Extreme::Max => "MAX",
        };
        let (scope, values) = scope_clause(step_ids, DateRange::all());
        let date: Option<CalendarDate> = self.conn.query_row(
            &format!("SELECT {aggregate}(scheduled_date) FROM step_completion WHERE {scope}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(date)
    }

    /// `(step, date)` keys that already have a row, any status.
    pub fn existing_instance_keys(
        &self,
        step_ids: &[StepId],
        range: DateRange,
    ) -> ScheduleResult<HashSet<InstanceKey>> {
        if step_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let (scope, values) = scope_clause(step_ids, range);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT step_id, scheduled_date FROM step_completion WHERE {scope}"
        ))?;
        let keys = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, CalendarDate>(1)?))
            })?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(keys)
    }

    pub fn find_completion(&self, completion_id: &str) -> ScheduleResult<Option<StepCompletion>> {
        let completion = self
            .conn
            .query_row(
                &format!("SELECT {COMPLETION_COLUMNS} FROM step_completion WHERE completion_id = ?1"),
                params![completion_id],
                map_completion_row,
            )
            .optional()?;
        Ok(completion)
    }

    /// All completions of the given steps, by date, then time of day.
    pub fn completions_for_steps(&self, step_ids: &[StepId]) -> ScheduleResult<Vec<StepCompletion>> {
        if step_ids.is_empty() {
            return Ok(Vec::new());
        }
        let (scope, values) = scope_clause(step_ids, DateRange::all());
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COMPLETION_COLUMNS} FROM step_completion
             WHERE {scope}
             ORDER BY scheduled_date ASC, scheduled_time_of_day DESC, step_id ASC"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), map_completion_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn completion_status_counts(&self, step_ids: &[StepId]) -> ScheduleResult<Vec<StatusCount>> {
        if step_ids.is_empty() {
            return Ok(Vec::new());
        }
        let (scope, values) = scope_clause(step_ids, DateRange::all());
        let mut stmt = self.conn.prepare(&format!(
            "SELECT status, COUNT(*) FROM step_completion
             WHERE {scope}
             GROUP BY status
             ORDER BY status ASC"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok(StatusCount {
                    status: text_col(row, 0)?,
                    count:  row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Number of non-pending rows a step has.
    pub fn count_step_history(&self, step_id: &str) -> ScheduleResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM step_completion WHERE step_id = ?1 AND status != 'pending'",
            params![step_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_completion_row(row: &Row<'_>) -> rusqlite::Result<StepCompletion> {
    Ok(StepCompletion {
        id:                    row.get(0)?,
        step_id:               row.get(1)?,
        user_id:               row.get(2)?,
        scheduled_date:        row.get(3)?,
        scheduled_time_of_day: text_col(row, 4)?,
        on_time_deadline:      instant_col(row, 5)?,
        grace_period_end:      instant_col(row, 6)?,
        status:                text_col(row, 7)?,
        completed_at:          opt_instant_col(row, 8)?,
    })
}
