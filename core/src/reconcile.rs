//! Reconciliation: bring materialised completions in line with a
//! routine or step definition that just changed.
//!
//! RULES (every branch):
//!   - Never delete a row that is not `pending`.
//!   - Never insert a row for a `(step, date)` that already has one,
//!     whatever its status.
//!   - Never schedule before today.
//!
//! A `Reconciler` runs inside the caller's transaction. It reads and
//! writes only through the `Repository` it was given and records what
//! it did as `ScheduleEvent`s for the caller to persist.

use crate::{
    config::SchedulerConfig,
    deadline::DeadlineCalculator,
    error::{ScheduleError, ScheduleResult},
    event::ScheduleEvent,
    generator::CompletionGenerator,
    model::{Routine, RoutineStep},
    store::{DateRange, Extreme, Repository},
    types::{CalendarDate, StepId},
    window::{compute_window, effective_start, horizon_end, shift_days, GenerationWindow},
};
use std::cmp::Ordering;

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub inserted: usize,
    pub deleted:  usize,
    pub events:   Vec<ScheduleEvent>,
}

pub struct Reconciler<'r> {
    repo:       Repository<'r>,
    config:     &'r SchedulerConfig,
    today:      CalendarDate,
    calculator: Option<DeadlineCalculator>,
    report:     ReconcileReport,
}

impl<'r> Reconciler<'r> {
    pub fn new(repo: Repository<'r>, config: &'r SchedulerConfig, today: CalendarDate) -> Self {
        Self {
            repo,
            config,
            today,
            calculator: None,
            report: ReconcileReport::default(),
        }
    }

    pub fn into_report(self) -> ReconcileReport {
        self.report
    }

    // ── Publish ────────────────────────────────────────────────

    /// Materialise the initial window for every step of a routine that is
    /// being published. Returns the window used.
    pub fn schedule_initial_window(
        &mut self,
        routine: &Routine,
        steps: &[RoutineStep],
    ) -> ScheduleResult<GenerationWindow> {
        let window = compute_window(
            routine.start_date,
            routine.end_date,
            self.today,
            self.config.max_horizon_days,
        );
        self.fill(routine, steps, window)?;
        Ok(window)
    }

    // ── Routine date changes ───────────────────────────────────

    /// `before` and `after` are the same routine either side of a date edit.
    pub fn routine_dates_changed(&mut self, before: &Routine, after: &Routine) -> ScheduleResult<()> {
        let steps = self.repo.find_steps_by_routine(&after.id)?;
        if steps.is_empty() {
            return Ok(());
        }
        let step_ids: Vec<StepId> = steps.iter().map(|s| s.id.clone()).collect();
        let window = compute_window(
            after.start_date,
            after.end_date,
            self.today,
            self.config.max_horizon_days,
        );

        match after.start_date.cmp(&before.start_date) {
            Ordering::Greater => {
                self.delete_pending(
                    after,
                    &step_ids,
                    DateRange::before(after.start_date),
                    "start date moved forward",
                )?;
            }
            Ordering::Less => {
                self.start_moved_back(before, after, &steps, &step_ids, window)?;
            }
            Ordering::Equal => {}
        }

        match compare_end_dates(before.end_date, after.end_date) {
            Ordering::Less => {
                // Only a concrete date can be earlier than anything.
                if let Some(new_end) = after.end_date {
                    self.delete_pending(
                        after,
                        &step_ids,
                        DateRange::after(new_end),
                        "end date moved earlier",
                    )?;
                }
            }
            Ordering::Greater => {
                let latest = self.repo.find_extreme_completion_date(&step_ids, Extreme::Max)?;
                let gap = match latest {
                    Some(latest) => window.start_at_least(shift_days(latest, 1)),
                    None => window,
                };
                log::debug!(
                    "routine {}: end date extended, latest existing {:?}, gap {}..={}",
                    after.id,
                    latest,
                    gap.start,
                    gap.end
                );
                self.fill(after, &steps, gap)?;
            }
            Ordering::Equal => {}
        }
        Ok(())
    }

    fn start_moved_back(
        &mut self,
        before: &Routine,
        after: &Routine,
        steps: &[RoutineStep],
        step_ids: &[StepId],
        window: GenerationWindow,
    ) -> ScheduleResult<()> {
        let old_effective = effective_start(before.start_date, self.today);
        let new_effective = effective_start(after.start_date, self.today);
        if new_effective >= old_effective || after.start_date < self.today {
            log::debug!(
                "routine {}: start moved back to {} but effective start stays {}; nothing to backfill",
                after.id,
                after.start_date,
                old_effective
            );
            return Ok(());
        }

        self.delete_pending(
            after,
            step_ids,
            DateRange::after(window.end),
            "window end moved with earlier start",
        )?;

        let earliest = self.repo.find_extreme_completion_date(step_ids, Extreme::Min)?;
        let gap = match earliest {
            Some(earliest) => window.end_at_most(shift_days(earliest, -1)),
            None => window,
        };
        log::debug!(
            "routine {}: start moved back, earliest existing {:?}, gap {}..={}",
            after.id,
            earliest,
            gap.start,
            gap.end
        );
        self.fill(after, steps, gap)?;
        Ok(())
    }

    // ── Step changes ───────────────────────────────────────────

    /// Recompute one step's schedule from scratch. Its `pending` rows are
    /// dropped; history stays and is never duplicated.
    ///
    /// The window runs from max(routine start, today) to the routine's end
    /// date, or failing that the latest date any step of the routine
    /// already has, or failing that the default horizon. Always capped at
    /// the horizon.
    pub fn step_changed(&mut self, routine: &Routine, step: &RoutineStep) -> ScheduleResult<()> {
        let routine_step_ids: Vec<StepId> = self
            .repo
            .find_steps_by_routine(&routine.id)?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let existing_max = self
            .repo
            .find_extreme_completion_date(&routine_step_ids, Extreme::Max)?;

        self.delete_pending(
            routine,
            std::slice::from_ref(&step.id),
            DateRange::all(),
            "step schedule changed",
        )?;

        let start = effective_start(routine.start_date, self.today);
        let cap = horizon_end(start, self.config.max_horizon_days);
        let end = routine.end_date.or(existing_max).unwrap_or(cap).min(cap);
        self.fill(routine, std::slice::from_ref(step), GenerationWindow::new(start, end))?;
        Ok(())
    }

    // ── Primitives ─────────────────────────────────────────────

    fn delete_pending(
        &mut self,
        routine: &Routine,
        step_ids: &[StepId],
        range: DateRange,
        reason: &str,
    ) -> ScheduleResult<usize> {
        let deleted = self.repo.delete_pending_completions(step_ids, range)?;
        log::debug!("routine {}: deleted {deleted} pending completions ({reason})", routine.id);
        if deleted > 0 {
            self.report.deleted += deleted;
            self.report.events.push(ScheduleEvent::PendingCompletionsDeleted {
                routine_id: routine.id.clone(),
                count:      deleted,
                reason:     reason.to_string(),
            });
        }
        Ok(deleted)
    }

    /// Generate and insert every missing instance of `steps` in `window`.
    fn fill(
        &mut self,
        routine: &Routine,
        steps: &[RoutineStep],
        window: GenerationWindow,
    ) -> ScheduleResult<usize> {
        // Never before today, whatever the caller computed.
        let window = window.start_at_least(self.today);
        if window.is_empty() || steps.is_empty() {
            return Ok(0);
        }
        let step_ids: Vec<StepId> = steps.iter().map(|s| s.id.clone()).collect();
        let existing = self
            .repo
            .existing_instance_keys(&step_ids, DateRange::between(window.start, window.end))?;

        let rows = {
            let calculator = self.calculator_for(routine)?;
            CompletionGenerator::new(calculator, &routine.user_id)
                .generate_excluding(steps, window, &existing)
        };
        let inserted = self.repo.insert_completions(&rows)?;
        log::debug!(
            "routine {}: inserted {inserted} completions over {}..={}",
            routine.id,
            window.start,
            window.end
        );
        if inserted > 0 {
            self.report.inserted += inserted;
            self.report.events.push(ScheduleEvent::CompletionsGenerated {
                routine_id: routine.id.clone(),
                count:      inserted,
                from:       window.start,
                to:         window.end,
            });
        }
        Ok(inserted)
    }

    /// One calculator per pass, keyed by the owner's zone.
    fn calculator_for(&mut self, routine: &Routine) -> ScheduleResult<&mut DeadlineCalculator> {
        if self.calculator.is_none() {
            let timezone = self
                .repo
                .find_user_timezone(&routine.user_id)?
                .ok_or_else(|| {
                    ScheduleError::InvalidState(format!(
                        "user '{}' owning routine '{}' has no profile",
                        routine.user_id, routine.id
                    ))
                })?;
            self.calculator = Some(DeadlineCalculator::new(&timezone, self.config)?);
        }
        self.calculator
            .as_mut()
            .ok_or_else(|| ScheduleError::Other(anyhow::anyhow!("deadline calculator unavailable")))
    }
}

/// Order end dates with `None` (indefinite) as the latest possible value.
fn compare_end_dates(before: Option<CalendarDate>, after: Option<CalendarDate>) -> Ordering {
    match (before, after) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (Some(b), Some(a)) => a.cmp(&b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(d: u32) -> CalendarDate {
        NaiveDate::from_ymd_opt(2025, 11, d).unwrap()
    }

    #[test]
    fn indefinite_end_is_later_than_any_date() {
        assert_eq!(compare_end_dates(Some(date(1)), None), Ordering::Greater);
        assert_eq!(compare_end_dates(None, Some(date(1))), Ordering::Less);
        assert_eq!(compare_end_dates(None, None), Ordering::Equal);
        assert_eq!(compare_end_dates(Some(date(5)), Some(date(3))), Ordering::Less);
        assert_eq!(compare_end_dates(Some(date(3)), Some(date(5))), Ordering::Greater);
    }
}
