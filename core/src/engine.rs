//! The scheduling engine: the only entry point callers use.
//!
//! Every mutating operation:
//!   1. validates its input before touching the database,
//!   2. reads the clock once,
//!   3. runs all reads and writes in one IMMEDIATE transaction,
//!   4. appends its audit events in that same transaction.
//!
//! A failure anywhere in step 3 or 4 rolls back everything, so a routine
//! is published if and only if its initial schedule exists.

use crate::{
    clock::{Clock, FixedClock},
    compliance::{resolve_completion, Resolution},
    config::SchedulerConfig,
    deadline::parse_timezone,
    error::{ScheduleError, ScheduleResult},
    event::ScheduleEvent,
    frequency::normalize_days,
    model::{
        CompletionStatus, NewRoutine, NewStep, Routine, RoutineStatus, RoutineStep, RoutineUpdate,
        StepCompletion, StepUpdate, UserProfile,
    },
    reconcile::Reconciler,
    store::{DateRange, Extreme, Repository, ScheduleStore, StatusCount},
    types::{new_id, CalendarDate, Instant, RoutineId, StepId},
};
use serde::{Deserialize, Serialize};

pub struct ScheduleEngine {
    store:  ScheduleStore,
    clock:  Box<dyn Clock>,
    config: SchedulerConfig,
}

/// Read-only roll-up of one routine's completions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceSummary {
    pub routine_id:   RoutineId,
    pub status:       RoutineStatus,
    pub step_count:   usize,
    pub counts:       Vec<StatusCount>,
    pub first_date:   Option<CalendarDate>,
    pub last_date:    Option<CalendarDate>,
    /// on-time / (on-time + late + missed); `None` before any step is resolved.
    pub on_time_rate: Option<f64>,
}

impl ComplianceSummary {
    pub fn count(&self, status: CompletionStatus) -> i64 {
        self.counts
            .iter()
            .find(|c| c.status == status)
            .map_or(0, |c| c.count)
    }

    pub fn total(&self) -> i64 {
        self.counts.iter().map(|c| c.count).sum()
    }
}

impl ScheduleEngine {
    pub fn new(store: ScheduleStore, clock: Box<dyn Clock>, config: SchedulerConfig) -> Self {
        Self { store, clock, config }
    }

    /// In-memory, migrated engine driven by `clock`. Used by tests and tooling.
    pub fn build_test(clock: FixedClock) -> ScheduleResult<Self> {
        let store = ScheduleStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, Box::new(clock), SchedulerConfig::default()))
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Repository over the engine's connection, for reads outside a transaction.
    pub fn repo(&self) -> Repository<'_> {
        self.store.repo()
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    // ── User profiles ──────────────────────────────────────────

    pub fn create_user_profile(&mut self, user_id: &str, timezone: &str) -> ScheduleResult<UserProfile> {
        require_id("user", user_id)?;
        parse_timezone(timezone)?;
        let profile = UserProfile {
            id:       user_id.to_string(),
            timezone: timezone.to_string(),
        };
        self.store.with_transaction(|repo| {
            if repo.find_user_profile(user_id)?.is_some() {
                return Err(ScheduleError::InvalidState(format!(
                    "user '{user_id}' already has a profile"
                )));
            }
            repo.insert_user_profile(&profile)
        })?;
        Ok(profile)
    }

    /// Changes apply to completions generated from now on; existing rows
    /// keep the deadlines they were created with.
    pub fn update_user_timezone(&mut self, user_id: &str, timezone: &str) -> ScheduleResult<UserProfile> {
        require_id("user", user_id)?;
        parse_timezone(timezone)?;
        self.store.with_transaction(|repo| {
            if !repo.update_user_timezone(user_id, timezone)? {
                return Err(ScheduleError::not_found("user", user_id));
            }
            Ok(UserProfile {
                id:       user_id.to_string(),
                timezone: timezone.to_string(),
            })
        })
    }

    // ── Routines ───────────────────────────────────────────────

    pub fn create_routine(&mut self, new: NewRoutine) -> ScheduleResult<Routine> {
        require_id("user", &new.user_id)?;
        require_name(&new.name)?;
        check_date_order(new.start_date, new.end_date)?;
        let now = self.clock.now();

        let routine = Routine {
            id:                new_id("rtn"),
            user_id:           new.user_id,
            name:              new.name.trim().to_string(),
            start_date:        new.start_date,
            end_date:          new.end_date,
            status:            RoutineStatus::Draft,
            saved_as_template: new.saved_as_template,
        };
        self.store.with_transaction(|repo| {
            if repo.find_routine_by_user(&routine.user_id)?.is_some() {
                return Err(ScheduleError::InvalidState(format!(
                    "user '{}' already has a routine",
                    routine.user_id
                )));
            }
            repo.insert_routine(&routine)?;
            repo.append_event(
                now,
                &ScheduleEvent::RoutineCreated {
                    routine_id: routine.id.clone(),
                    user_id:    routine.user_id.clone(),
                },
            )
        })?;
        log::info!("routine {} created for user {}", routine.id, routine.user_id);
        Ok(routine)
    }

    /// Draft → published, together with the initial completion window.
    pub fn publish_routine(&mut self, routine_id: &str) -> ScheduleResult<Routine> {
        require_id("routine", routine_id)?;
        let now = self.clock.now();
        let today = now.date_naive();
        let config = &self.config;

        let (routine, inserted) = self.store.with_transaction(|repo| {
            let mut routine = load_routine(repo, routine_id)?;
            if routine.is_published() {
                return Err(ScheduleError::InvalidState(format!(
                    "routine '{routine_id}' is already published"
                )));
            }
            let steps = repo.find_steps_by_routine(routine_id)?;
            if steps.is_empty() {
                return Err(ScheduleError::InvalidState(format!(
                    "routine '{routine_id}' has no steps"
                )));
            }
            if repo.find_user_profile(&routine.user_id)?.is_none() {
                return Err(ScheduleError::InvalidState(format!(
                    "user '{}' owning routine '{routine_id}' has no profile",
                    routine.user_id
                )));
            }

            repo.update_routine_status(routine_id, RoutineStatus::Published)?;
            routine.status = RoutineStatus::Published;

            let mut reconciler = Reconciler::new(*repo, config, today);
            let window = reconciler.schedule_initial_window(&routine, &steps)?;
            let report = reconciler.into_report();

            repo.append_event(
                now,
                &ScheduleEvent::RoutinePublished {
                    routine_id:   routine.id.clone(),
                    window_start: window.start,
                    window_end:   window.end,
                },
            )?;
            repo.append_events(now, &report.events)?;
            Ok((routine, report.inserted))
        })?;

        log::info!("routine {routine_id} published with {inserted} completions");
        Ok(routine)
    }

    /// Edit name and/or dates. Date edits on a published routine reconcile
    /// its completions in the same transaction.
    pub fn update_routine(&mut self, routine_id: &str, update: RoutineUpdate) -> ScheduleResult<Routine> {
        require_id("routine", routine_id)?;
        if let Some(name) = &update.name {
            require_name(name)?;
        }
        let now = self.clock.now();
        let today = now.date_naive();
        let config = &self.config;

        let (routine, inserted, deleted) = self.store.with_transaction(|repo| {
            let before = load_routine(repo, routine_id)?;
            let mut after = before.clone();
            if let Some(name) = &update.name {
                after.name = name.trim().to_string();
            }
            if let Some(start) = update.start_date {
                after.start_date = start;
            }
            if let Some(end) = update.end_date {
                after.end_date = end;
            }
            check_date_order(after.start_date, after.end_date)?;

            if after.name != before.name {
                repo.update_routine_name(routine_id, &after.name)?;
            }
            let dates_changed =
                after.start_date != before.start_date || after.end_date != before.end_date;
            if !dates_changed {
                return Ok((after, 0, 0));
            }
            repo.update_routine_dates(routine_id, after.start_date, after.end_date)?;

            let mut events = vec![ScheduleEvent::RoutineUpdated {
                routine_id: after.id.clone(),
                start_date: after.start_date,
                end_date:   after.end_date,
            }];
            let (mut inserted, mut deleted) = (0, 0);
            if before.is_published() {
                let mut reconciler = Reconciler::new(*repo, config, today);
                reconciler.routine_dates_changed(&before, &after)?;
                let report = reconciler.into_report();
                inserted = report.inserted;
                deleted = report.deleted;
                events.extend(report.events);
            }
            repo.append_events(now, &events)?;
            Ok((after, inserted, deleted))
        })?;

        log::info!("routine {routine_id} updated (+{inserted} / -{deleted} completions)");
        Ok(routine)
    }

    // ── Steps ──────────────────────────────────────────────────

    /// Append a step. On a published routine its completions are
    /// generated straight away.
    pub fn add_routine_step(&mut self, routine_id: &str, new: NewStep) -> ScheduleResult<RoutineStep> {
        require_id("routine", routine_id)?;
        require_name(&new.name)?;
        let days = normalize_days(new.frequency, &new.days)?;
        let now = self.clock.now();
        let today = now.date_naive();
        let config = &self.config;

        self.store.with_transaction(|repo| {
            let routine = load_routine(repo, routine_id)?;
            let step = RoutineStep {
                id:           new_id("stp"),
                routine_id:   routine.id.clone(),
                order_index:  repo.next_step_order_index(routine_id)?,
                time_of_day:  new.time_of_day,
                frequency:    new.frequency,
                days,
                name:         new.name.trim().to_string(),
                instructions: new.instructions,
                product_url:  new.product_url,
            };
            repo.insert_step(&step)?;

            let mut events = vec![ScheduleEvent::StepAdded {
                routine_id: routine.id.clone(),
                step_id:    step.id.clone(),
            }];
            if routine.is_published() {
                let mut reconciler = Reconciler::new(*repo, config, today);
                reconciler.step_changed(&routine, &step)?;
                events.extend(reconciler.into_report().events);
            }
            repo.append_events(now, &events)?;
            log::info!("step {} added to routine {}", step.id, routine.id);
            Ok(step)
        })
    }

    /// Edit a step. Scheduling fields on a published routine trigger a full
    /// recompute of that step's pending completions; everything else is a
    /// metadata write only.
    pub fn update_routine_step(&mut self, step_id: &str, update: StepUpdate) -> ScheduleResult<RoutineStep> {
        require_id("step", step_id)?;
        if let Some(name) = &update.name {
            require_name(name)?;
        }
        let now = self.clock.now();
        let today = now.date_naive();
        let config = &self.config;

        self.store.with_transaction(|repo| {
            let before = repo
                .find_step(step_id)?
                .ok_or_else(|| ScheduleError::not_found("step", step_id))?;
            let routine = load_routine(repo, &before.routine_id)?;

            let mut after = before.clone();
            if let Some(frequency) = update.frequency {
                after.frequency = frequency;
            }
            if let Some(days) = &update.days {
                after.days = days.clone();
            }
            if let Some(time_of_day) = update.time_of_day {
                after.time_of_day = time_of_day;
            }
            if let Some(name) = &update.name {
                after.name = name.trim().to_string();
            }
            if let Some(instructions) = &update.instructions {
                after.instructions = instructions.clone();
            }
            if let Some(product_url) = &update.product_url {
                after.product_url = product_url.clone();
            }
            if let Some(order_index) = update.order_index {
                after.order_index = order_index;
            }
            if update.touches_schedule() {
                after.days = normalize_days(after.frequency, &after.days)?;
            }

            let schedule_changed = after.frequency != before.frequency
                || after.days != before.days
                || after.time_of_day != before.time_of_day;
            let rescheduled = schedule_changed && routine.is_published();

            repo.update_step_fields(&after)?;
            let mut events = vec![ScheduleEvent::StepUpdated {
                step_id:     after.id.clone(),
                frequency:   after.frequency,
                time_of_day: after.time_of_day,
                rescheduled,
            }];
            if rescheduled {
                let mut reconciler = Reconciler::new(*repo, config, today);
                reconciler.step_changed(&routine, &after)?;
                events.extend(reconciler.into_report().events);
            }
            repo.append_events(now, &events)?;
            log::info!("step {step_id} updated (rescheduled: {rescheduled})");
            Ok(after)
        })
    }

    /// Delete a step and its pending completions. A step with any
    /// completed or missed history cannot be removed.
    pub fn remove_routine_step(&mut self, step_id: &str) -> ScheduleResult<()> {
        require_id("step", step_id)?;
        let now = self.clock.now();

        self.store.with_transaction(|repo| {
            let step = repo
                .find_step(step_id)?
                .ok_or_else(|| ScheduleError::not_found("step", step_id))?;
            let history = repo.count_step_history(step_id)?;
            if history > 0 {
                return Err(ScheduleError::InvalidState(format!(
                    "step '{step_id}' has {history} completed or missed entries and cannot be removed"
                )));
            }
            let ids = [step.id.clone()];
            let deleted = repo.delete_pending_completions(&ids, DateRange::all())?;
            repo.delete_step(step_id)?;

            let mut events = Vec::new();
            if deleted > 0 {
                events.push(ScheduleEvent::PendingCompletionsDeleted {
                    routine_id: step.routine_id.clone(),
                    count:      deleted,
                    reason:     "step removed".into(),
                });
            }
            events.push(ScheduleEvent::StepRemoved {
                routine_id: step.routine_id.clone(),
                step_id:    step.id.clone(),
            });
            repo.append_events(now, &events)?;
            log::info!("step {step_id} removed ({deleted} pending completions dropped)");
            Ok(())
        })
    }

    // ── Completions ────────────────────────────────────────────

    /// Tick (`completed = true`) or un-tick a scheduled step, timestamped now.
    pub fn mark_step_completion(&mut self, completion_id: &str, completed: bool) -> ScheduleResult<StepCompletion> {
        require_id("completion", completion_id)?;
        let now = self.clock.now();

        self.store.with_transaction(|repo| {
            let existing = repo
                .find_completion(completion_id)?
                .ok_or_else(|| ScheduleError::not_found("completion", completion_id))?;
            let resolution = resolve_completion(&existing, now, completed).map_err(|rejection| {
                log::warn!("completion {completion_id} rejected: {rejection}");
                ScheduleError::CompletionRejected(rejection)
            })?;
            match resolution {
                Resolution::Unchanged(c) => Ok(c),
                Resolution::Updated(c) => {
                    repo.update_completion_status(&c.id, c.status, c.completed_at)?;
                    repo.append_event(
                        now,
                        &ScheduleEvent::CompletionMarked {
                            completion_id: c.id.clone(),
                            status:        c.status,
                            completed_at:  c.completed_at,
                        },
                    )?;
                    Ok(c)
                }
            }
        })
    }

    /// Mark a user's stale pending completions as missed. Idempotent.
    pub fn sweep_overdue(&mut self, user_id: &str) -> ScheduleResult<usize> {
        require_id("user", user_id)?;
        let now = self.clock.now();
        let swept = self.store.with_transaction(|repo| {
            if repo.find_user_profile(user_id)?.is_none() {
                return Err(ScheduleError::not_found("user", user_id));
            }
            let swept = repo.mark_overdue_missed(Some(user_id), now)?;
            if swept > 0 {
                repo.append_event(
                    now,
                    &ScheduleEvent::OverdueSwept {
                        user_id: Some(user_id.to_string()),
                        count:   swept,
                    },
                )?;
            }
            Ok(swept)
        })?;
        log::info!("overdue sweep for user {user_id}: {swept} marked missed");
        Ok(swept)
    }

    /// Overdue sweep across every user, for a scheduled job.
    pub fn sweep_all_overdue(&mut self) -> ScheduleResult<usize> {
        let now = self.clock.now();
        let swept = self.store.with_transaction(|repo| {
            let swept = repo.mark_overdue_missed(None, now)?;
            if swept > 0 {
                repo.append_event(now, &ScheduleEvent::OverdueSwept { user_id: None, count: swept })?;
            }
            Ok(swept)
        })?;
        log::info!("overdue sweep: {swept} marked missed");
        Ok(swept)
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn routine(&self, routine_id: &str) -> ScheduleResult<Routine> {
        load_routine(&self.repo(), routine_id)
    }

    pub fn steps(&self, routine_id: &str) -> ScheduleResult<Vec<RoutineStep>> {
        self.repo().find_steps_by_routine(routine_id)
    }

    /// Every completion of every step of a routine, in schedule order.
    pub fn completions(&self, routine_id: &str) -> ScheduleResult<Vec<StepCompletion>> {
        let repo = self.repo();
        let ids = step_ids(&repo, routine_id)?;
        repo.completions_for_steps(&ids)
    }

    pub fn compliance_summary(&self, routine_id: &str) -> ScheduleResult<ComplianceSummary> {
        let repo = self.repo();
        let routine = load_routine(&repo, routine_id)?;
        let ids = step_ids(&repo, routine_id)?;
        let counts = repo.completion_status_counts(&ids)?;

        let resolved: i64 = counts
            .iter()
            .filter(|c| c.status.is_history())
            .map(|c| c.count)
            .sum();
        let on_time: i64 = counts
            .iter()
            .filter(|c| c.status == CompletionStatus::OnTime)
            .map(|c| c.count)
            .sum();
        let on_time_rate = (resolved > 0).then(|| on_time as f64 / resolved as f64);

        Ok(ComplianceSummary {
            routine_id: routine.id,
            status: routine.status,
            step_count: ids.len(),
            first_date: repo.find_extreme_completion_date(&ids, Extreme::Min)?,
            last_date: repo.find_extreme_completion_date(&ids, Extreme::Max)?,
            counts,
            on_time_rate,
        })
    }
}

fn load_routine(repo: &Repository<'_>, routine_id: &str) -> ScheduleResult<Routine> {
    repo.find_routine(routine_id)?
        .ok_or_else(|| ScheduleError::not_found("routine", routine_id))
}

fn step_ids(repo: &Repository<'_>, routine_id: &str) -> ScheduleResult<Vec<StepId>> {
    Ok(repo
        .find_steps_by_routine(routine_id)?
        .into_iter()
        .map(|s| s.id)
        .collect())
}

// ── Input validation ───────────────────────────────────────────

fn require_id(entity: &str, id: &str) -> ScheduleResult<()> {
    if id.is_empty() || id.len() > 128 || id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ScheduleError::Validation(format!("malformed {entity} id '{id}'")));
    }
    Ok(())
}

fn require_name(name: &str) -> ScheduleResult<()> {
    if name.trim().is_empty() {
        return Err(ScheduleError::Validation("name must not be empty".into()));
    }
    Ok(())
}

fn check_date_order(start: CalendarDate, end: Option<CalendarDate>) -> ScheduleResult<()> {
    match end {
        Some(end) if end < start => Err(ScheduleError::Validation(format!(
            "end date {end} is before start date {start}"
        ))),
        _ => Ok(()),
    }
}
