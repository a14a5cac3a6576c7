use super::Repository;
use crate::{error::ScheduleResult, model::UserProfile};
use rusqlite::{params, OptionalExtension};

impl Repository<'_> {
    // ── User profile ───────────────────────────────────────────

    pub fn insert_user_profile(&self, profile: &UserProfile) -> ScheduleResult<()> {
        self.conn.execute(
            "INSERT INTO user_profile (user_id, timezone) VALUES (?1, ?2)",
            params![profile.id, profile.timezone],
        )?;
        Ok(())
    }

    pub fn update_user_timezone(&self, user_id: &str, timezone: &str) -> ScheduleResult<bool> {
        let changed = self.conn.execute(
            "UPDATE user_profile SET timezone = ?1 WHERE user_id = ?2",
            params![timezone, user_id],
        )?;
        Ok(changed > 0)
    }

    pub fn find_user_profile(&self, user_id: &str) -> ScheduleResult<Option<UserProfile>> {
        let profile = self
            .conn
            .query_row(
                "SELECT user_id, timezone FROM user_profile WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserProfile {
                        id:       row.get(0)?,
                        timezone: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    pub fn find_user_timezone(&self, user_id: &str) -> ScheduleResult<Option<String>> {
        Ok(self.find_user_profile(user_id)?.map(|p| p.timezone))
    }
}
