//! Completion generator: expands steps over a window into pending rows.
//!
//! Steps are grouped by time of day before the walk, so each
//! `(date, time_of_day)` deadline is computed once and shared by every
//! step in that group. Output is ordered by date, then time of day, then
//! step order. No side effects: the caller persists the batch.

use crate::{
    deadline::DeadlineCalculator,
    frequency::should_generate,
    model::{CompletionStatus, RoutineStep, StepCompletion, TimeOfDay},
    types::{new_id, CalendarDate, StepId, UserId},
    window::GenerationWindow,
};
use std::collections::{BTreeMap, HashSet};

/// `(step, scheduled_date)`: the identity of one scheduled instance.
pub type InstanceKey = (StepId, CalendarDate);

pub struct CompletionGenerator<'a> {
    calculator: &'a mut DeadlineCalculator,
    user_id:    UserId,
}

impl<'a> CompletionGenerator<'a> {
    pub fn new(calculator: &'a mut DeadlineCalculator, user_id: &str) -> Self {
        Self {
            calculator,
            user_id: user_id.to_string(),
        }
    }

    pub fn generate(&mut self, steps: &[RoutineStep], window: GenerationWindow) -> Vec<StepCompletion> {
        self.generate_excluding(steps, window, &HashSet::new())
    }

    /// Like `generate`, but skips any instance already present in `existing`.
    pub fn generate_excluding(
        &mut self,
        steps: &[RoutineStep],
        window: GenerationWindow,
        existing: &HashSet<InstanceKey>,
    ) -> Vec<StepCompletion> {
        let mut out = Vec::new();
        if window.is_empty() || steps.is_empty() {
            return out;
        }

        let mut groups: BTreeMap<TimeOfDay, Vec<&RoutineStep>> = BTreeMap::new();
        for step in steps {
            groups.entry(step.time_of_day).or_default().push(step);
        }
        for group in groups.values_mut() {
            group.sort_by_key(|s| s.order_index);
        }

        for date in window.days() {
            for (time_of_day, group) in &groups {
                let firing: Vec<&&RoutineStep> = group
                    .iter()
                    .filter(|s| should_generate(s.rule(), date))
                    .filter(|s| !existing.contains(&(s.id.clone(), date)))
                    .collect();
                if firing.is_empty() {
                    continue;
                }
                let deadlines = self.calculator.deadlines(date, *time_of_day);
                for step in firing {
                    out.push(StepCompletion {
                        id:                    new_id("cmp"),
                        step_id:               step.id.clone(),
                        user_id:               self.user_id.clone(),
                        scheduled_date:        date,
                        scheduled_time_of_day: *time_of_day,
                        on_time_deadline:      deadlines.on_time_deadline,
                        grace_period_end:      deadlines.grace_period_end,
                        status:                CompletionStatus::Pending,
                        completed_at:          None,
                    });
                }
            }
        }

        log::debug!(
            "generated {} completions over {}..={} ({} deadline keys, {} cache hits)",
            out.len(),
            window.start,
            window.end,
            self.calculator.computed_count(),
            self.calculator.cache_hits()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SchedulerConfig, model::Frequency};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> CalendarDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn step(id: &str, order: i64, time_of_day: TimeOfDay, frequency: Frequency, days: &[&str]) -> RoutineStep {
        RoutineStep {
            id:           id.into(),
            routine_id:   "rtn-1".into(),
            order_index:  order,
            time_of_day,
            frequency,
            days:         days.iter().map(|d| d.to_string()).collect(),
            name:         format!("step {id}"),
            instructions: None,
            product_url:  None,
        }
    }

    fn calculator() -> DeadlineCalculator {
        DeadlineCalculator::new("UTC", &SchedulerConfig::default()).unwrap()
    }

    #[test]
    fn daily_step_fills_every_day_as_pending() {
        let mut calc = calculator();
        let steps = vec![step("s1", 0, TimeOfDay::Morning, Frequency::Daily, &[])];
        let window = GenerationWindow::new(date(2025, 11, 1), date(2025, 11, 7));

        let rows = CompletionGenerator::new(&mut calc, "usr-1").generate(&steps, window);

        assert_eq!(rows.len(), 7);
        assert!(rows.iter().all(|r| r.status == CompletionStatus::Pending && r.completed_at.is_none()));
        assert!(rows.iter().all(|r| r.user_id == "usr-1"));
        assert_eq!(rows.first().unwrap().scheduled_date, date(2025, 11, 1));
        assert_eq!(rows.last().unwrap().scheduled_date, date(2025, 11, 7));
    }

    #[test]
    fn deadline_keys_scale_with_time_of_day_not_steps() {
        let mut calc = calculator();
        let steps = vec![
            step("s1", 0, TimeOfDay::Morning, Frequency::Daily, &[]),
            step("s2", 1, TimeOfDay::Morning, Frequency::Daily, &[]),
            step("s3", 2, TimeOfDay::Morning, Frequency::Daily, &[]),
            step("s4", 3, TimeOfDay::Evening, Frequency::Daily, &[]),
        ];
        let window = GenerationWindow::new(date(2025, 11, 1), date(2025, 11, 10));

        let rows = CompletionGenerator::new(&mut calc, "usr-1").generate(&steps, window);

        assert_eq!(rows.len(), 40);
        assert_eq!(calc.computed_count(), 20);
        assert_eq!(calc.cache_hits(), 0);
    }

    #[test]
    fn existing_instances_are_skipped() {
        let mut calc = calculator();
        let steps = vec![step("s1", 0, TimeOfDay::Evening, Frequency::Daily, &[])];
        let window = GenerationWindow::new(date(2025, 11, 1), date(2025, 11, 5));
        let existing: HashSet<InstanceKey> =
            [("s1".to_string(), date(2025, 11, 3))].into_iter().collect();

        let rows = CompletionGenerator::new(&mut calc, "usr-1").generate_excluding(&steps, window, &existing);

        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.scheduled_date != date(2025, 11, 3)));
    }

    #[test]
    fn no_duplicate_instances_in_one_batch() {
        let mut calc = calculator();
        let steps = vec![
            step("s1", 0, TimeOfDay::Morning, Frequency::SpecificDays, &["monday", "thursday"]),
            step("s2", 1, TimeOfDay::Evening, Frequency::Daily, &[]),
        ];
        let window = GenerationWindow::new(date(2025, 11, 1), date(2025, 12, 30));

        let rows = CompletionGenerator::new(&mut calc, "usr-1").generate(&steps, window);

        let keys: HashSet<_> = rows.iter().map(|r| (r.step_id.clone(), r.scheduled_date)).collect();
        assert_eq!(keys.len(), rows.len());
    }

    #[test]
    fn empty_window_generates_nothing() {
        let mut calc = calculator();
        let steps = vec![step("s1", 0, TimeOfDay::Morning, Frequency::Daily, &[])];
        let window = GenerationWindow::new(date(2025, 11, 2), date(2025, 11, 1));
        assert!(CompletionGenerator::new(&mut calc, "usr-1").generate(&steps, window).is_empty());
    }
}
