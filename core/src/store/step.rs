use super::{text_col, Repository};
use crate::{error::ScheduleResult, model::RoutineStep};
use rusqlite::{params, types::Type, OptionalExtension, Row};

const STEP_COLUMNS: &str =
    "step_id, routine_id, order_index, time_of_day, frequency, days, name, instructions, product_url";

impl Repository<'_> {
    // ── Routine step ───────────────────────────────────────────

    pub fn insert_step(&self, s: &RoutineStep) -> ScheduleResult<()> {
        self.conn.execute(
            "INSERT INTO routine_step (
                step_id, routine_id, order_index, time_of_day, frequency, days,
                name, instructions, product_url
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                s.id,
                s.routine_id,
                s.order_index,
                s.time_of_day.as_str(),
                s.frequency.as_str(),
                serde_json::to_string(&s.days)?,
                s.name,
                s.instructions,
                s.product_url,
            ],
        )?;
        Ok(())
    }

    pub fn find_step(&self, step_id: &str) -> ScheduleResult<Option<RoutineStep>> {
        let step = self
            .conn
            .query_row(
                &format!("SELECT {STEP_COLUMNS} FROM routine_step WHERE step_id = ?1"),
                params![step_id],
                map_step_row,
            )
            .optional()?;
        Ok(step)
    }

    /// Steps of a routine in display order.
    pub fn find_steps_by_routine(&self, routine_id: &str) -> ScheduleResult<Vec<RoutineStep>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STEP_COLUMNS} FROM routine_step
             WHERE routine_id = ?1
             ORDER BY order_index ASC, step_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![routine_id], map_step_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn next_step_order_index(&self, routine_id: &str) -> ScheduleResult<i64> {
        let next: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(order_index) + 1, 0) FROM routine_step WHERE routine_id = ?1",
            params![routine_id],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    /// Overwrite every mutable field of a step.
    pub fn update_step_fields(&self, s: &RoutineStep) -> ScheduleResult<()> {
        self.conn.execute(
            "UPDATE routine_step
             SET order_index = ?1, time_of_day = ?2, frequency = ?3, days = ?4,
                 name = ?5, instructions = ?6, product_url = ?7
             WHERE step_id = ?8",
            params![
                s.order_index,
                s.time_of_day.as_str(),
                s.frequency.as_str(),
                serde_json::to_string(&s.days)?,
                s.name,
                s.instructions,
                s.product_url,
                s.id,
            ],
        )?;
        Ok(())
    }

    pub fn delete_step(&self, step_id: &str) -> ScheduleResult<()> {
        self.conn.execute(
            "DELETE FROM routine_step WHERE step_id = ?1",
            params![step_id],
        )?;
        Ok(())
    }
}

fn map_step_row(row: &Row<'_>) -> rusqlite::Result<RoutineStep> {
    let days_json: String = row.get(5)?;
    let days: Vec<String> = serde_json::from_str(&days_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(RoutineStep {
        id:           row.get(0)?,
        routine_id:   row.get(1)?,
        order_index:  row.get(2)?,
        time_of_day:  text_col(row, 3)?,
        frequency:    text_col(row, 4)?,
        days,
        name:         row.get(6)?,
        instructions: row.get(7)?,
        product_url:  row.get(8)?,
    })
}
