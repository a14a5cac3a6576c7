use super::{text_col, Repository};
use crate::{
    error::ScheduleResult,
    model::{Routine, RoutineStatus},
    types::CalendarDate,
};
use rusqlite::{params, OptionalExtension, Row};

const ROUTINE_COLUMNS: &str =
    "routine_id, user_id, name, start_date, end_date, status, saved_as_template";

impl Repository<'_> {
    // ── Routine ────────────────────────────────────────────────

    pub fn insert_routine(&self, r: &Routine) -> ScheduleResult<()> {
        self.conn.execute(
            "INSERT INTO routine (
                routine_id, user_id, name, start_date, end_date, status, saved_as_template
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                r.id,
                r.user_id,
                r.name,
                r.start_date,
                r.end_date,
                r.status.as_str(),
                r.saved_as_template,
            ],
        )?;
        Ok(())
    }

    pub fn find_routine(&self, routine_id: &str) -> ScheduleResult<Option<Routine>> {
        let routine = self
            .conn
            .query_row(
                &format!("SELECT {ROUTINE_COLUMNS} FROM routine WHERE routine_id = ?1"),
                params![routine_id],
                map_routine_row,
            )
            .optional()?;
        Ok(routine)
    }

    pub fn find_routine_by_user(&self, user_id: &str) -> ScheduleResult<Option<Routine>> {
        let routine = self
            .conn
            .query_row(
                &format!("SELECT {ROUTINE_COLUMNS} FROM routine WHERE user_id = ?1"),
                params![user_id],
                map_routine_row,
            )
            .optional()?;
        Ok(routine)
    }

    pub fn all_routines(&self) -> ScheduleResult<Vec<Routine>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ROUTINE_COLUMNS} FROM routine ORDER BY routine_id ASC"
        ))?;
        let rows = stmt
            .query_map([], map_routine_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_routine_status(&self, routine_id: &str, status: RoutineStatus) -> ScheduleResult<()> {
        self.conn.execute(
            "UPDATE routine SET status = ?1 WHERE routine_id = ?2",
            params![status.as_str(), routine_id],
        )?;
        Ok(())
    }

    pub fn update_routine_dates(
        &self,
        routine_id: &str,
        start_date: CalendarDate,
        end_date: Option<CalendarDate>,
    ) -> ScheduleResult<()> {
        self.conn.execute(
            "UPDATE routine SET start_date = ?1, end_date = ?2 WHERE routine_id = ?3",
            params![start_date, end_date, routine_id],
        )?;
        Ok(())
    }

    pub fn update_routine_name(&self, routine_id: &str, name: &str) -> ScheduleResult<()> {
        self.conn.execute(
            "UPDATE routine SET name = ?1 WHERE routine_id = ?2",
            params![name, routine_id],
        )?;
        Ok(())
    }
}

fn map_routine_row(row: &Row<'_>) -> rusqlite::Result<Routine> {
    Ok(Routine {
        id:                row.get(0)?,
        user_id:           row.get(1)?,
        name:              row.get(2)?,
        start_date:        row.get(3)?,
        end_date:          row.get(4)?,
        status:            text_col(row, 5)?,
        saved_as_template: row.get(6)?,
    })
}
