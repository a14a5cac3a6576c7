//! Shared primitive types used across the scheduling engine.

use chrono::{DateTime, NaiveDate, Utc};

/// A calendar date with no time component. Every scheduled date is
/// normalised to this before comparison or storage.
pub type CalendarDate = NaiveDate;

/// A point on the UTC timeline.
pub type Instant = DateTime<Utc>;

/// A stable, unique identifier for any persisted entity.
pub type EntityId = String;

pub type RoutineId = EntityId;
pub type StepId = EntityId;
pub type UserId = EntityId;
pub type CompletionId = EntityId;

/// Default length of the materialised completion window, in days.
pub const MAX_HORIZON_DAYS: u32 = 60;

/// Mint a fresh entity id with a readable prefix, e.g. `cmp-…`.
pub fn new_id(prefix: &str) -> EntityId {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}
