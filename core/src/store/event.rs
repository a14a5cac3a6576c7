use super::{instant_col, Repository};
use crate::{
    error::ScheduleResult,
    event::{EventLogEntry, ScheduleEvent},
    types::Instant,
};
use rusqlite::params;

impl Repository<'_> {
    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, recorded_at: Instant, event: &ScheduleEvent) -> ScheduleResult<()> {
        self.conn.execute(
            "INSERT INTO schedule_event (recorded_at, event_type, payload) VALUES (?1, ?2, ?3)",
            params![
                recorded_at.timestamp(),
                event.type_name(),
                serde_json::to_string(event)?,
            ],
        )?;
        Ok(())
    }

    pub fn append_events(&self, recorded_at: Instant, events: &[ScheduleEvent]) -> ScheduleResult<()> {
        for event in events {
            self.append_event(recorded_at, event)?;
        }
        Ok(())
    }

    pub fn events_of_type(&self, event_type: &str) -> ScheduleResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, recorded_at, event_type, payload
             FROM schedule_event WHERE event_type = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![event_type], |row| {
                Ok(EventLogEntry {
                    id:          Some(row.get(0)?),
                    recorded_at: instant_col(row, 1)?,
                    event_type:  row.get(2)?,
                    payload:     row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self) -> ScheduleResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM schedule_event", [], |row| row.get(0))?;
        Ok(count)
    }
}
