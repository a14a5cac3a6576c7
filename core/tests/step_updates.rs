//! Integration tests for step edits on live routines.
//!
//! 1. Changing a step's schedule replaces its pending rows, keeps history
//! 2. Re-running the same reconciliation converges to the same rows
//! 3. Metadata edits never touch completions
//! 4. Adding and removing steps on a published routine
//! 5. Zone changes apply to newly generated rows only

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use routine_core::{
    clock::FixedClock,
    config::SchedulerConfig,
    engine::ScheduleEngine,
    error::ScheduleError,
    model::{
        CompletionStatus, Frequency, NewRoutine, NewStep, Routine, RoutineStatus, RoutineStep,
        StepUpdate, TimeOfDay, UserProfile,
    },
    reconcile::Reconciler,
    store::ScheduleStore,
    types::CalendarDate,
};
use std::collections::BTreeSet;

const USER: &str = "user-1";

/// 2025-11-03 (a Monday), 08:00 UTC.
fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 3, 8, 0, 0).unwrap()
}

fn today() -> CalendarDate {
    NaiveDate::from_ymd_opt(2025, 11, 3).unwrap()
}

fn day(offset: i64) -> CalendarDate {
    today() + Duration::days(offset)
}

fn daily(name: &str, time_of_day: TimeOfDay) -> NewStep {
    NewStep {
        name: name.to_string(),
        time_of_day,
        frequency: Frequency::Daily,
        days: vec![],
        instructions: None,
        product_url: None,
    }
}

fn mwf() -> Vec<String> {
    vec!["Monday".to_string(), "Wednesday".to_string(), "Friday".to_string()]
}

/// Published routine from today with the given steps, owned by `timezone`.
fn published(engine: &mut ScheduleEngine, timezone: &str, steps: Vec<NewStep>) -> (Routine, Vec<RoutineStep>) {
    engine.create_user_profile(USER, timezone).unwrap();
    let r = engine
        .create_routine(NewRoutine {
            user_id: USER.to_string(),
            name: "Daily".to_string(),
            start_date: today(),
            end_date: None,
            saved_as_template: false,
        })
        .unwrap();
    let steps = steps
        .into_iter()
        .map(|s| engine.add_routine_step(&r.id, s).unwrap())
        .collect();
    let r = engine.publish_routine(&r.id).unwrap();
    (r, steps)
}

fn step_dates(engine: &ScheduleEngine, routine_id: &str, step_id: &str) -> BTreeSet<CalendarDate> {
    engine
        .completions(routine_id)
        .unwrap()
        .into_iter()
        .filter(|c| c.step_id == step_id)
        .map(|c| c.scheduled_date)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: daily → Mon/Wed/Fri mid-window
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn frequency_change_replaces_pending_and_keeps_history() {
    let clock = FixedClock::new(monday_morning());
    let mut engine = ScheduleEngine::build_test(clock.clone()).unwrap();
    let (r, steps) = published(&mut engine, "UTC", vec![daily("Serum", TimeOfDay::Morning)]);
    let step = &steps[0];

    // Tuesday: tick off Tuesday's row, which is not a Mon/Wed/Fri date.
    clock.set(Utc.with_ymd_and_hms(2025, 11, 4, 9, 0, 0).unwrap());
    let tuesday = engine
        .completions(&r.id)
        .unwrap()
        .into_iter()
        .find(|c| c.scheduled_date == day(1))
        .unwrap();
    engine.mark_step_completion(&tuesday.id, true).unwrap();

    let updated = engine
        .update_routine_step(
            &step.id,
            StepUpdate {
                frequency: Some(Frequency::SpecificDays),
                days: Some(mwf()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.frequency, Frequency::SpecificDays);
    assert_eq!(updated.days, vec!["monday", "wednesday", "friday"]);

    let rows = engine.completions(&r.id).unwrap();
    let kept = rows.iter().find(|c| c.id == tuesday.id).unwrap();
    assert_eq!(kept.status, CompletionStatus::OnTime);

    let pending: Vec<_> = rows.iter().filter(|c| c.status == CompletionStatus::Pending).collect();
    assert!(!pending.is_empty());
    for c in &pending {
        assert!(c.scheduled_date >= day(1), "pending row in the past: {}", c.scheduled_date);
        assert!(matches!(c.scheduled_date.weekday(), Weekday::Mon | Weekday::Wed | Weekday::Fri));
    }

    // The window ends where the routine's rows already ended.
    let expected: usize = (1..=59)
        .map(day)
        .filter(|d| matches!(d.weekday(), Weekday::Mon | Weekday::Wed | Weekday::Fri))
        .count();
    assert_eq!(pending.len(), expected);
    assert_eq!(rows.len(), expected + 1);
}

#[test]
fn step_edit_does_not_extend_past_other_steps() {
    let mut engine = ScheduleEngine::build_test(FixedClock::new(monday_morning())).unwrap();
    let (r, steps) = published(
        &mut engine,
        "UTC",
        vec![daily("Cleanser", TimeOfDay::Morning), daily("Toner", TimeOfDay::Evening)],
    );
    let latest = *step_dates(&engine, &r.id, &steps[0].id).iter().max().unwrap();
    assert_eq!(latest, day(59));

    engine
        .update_routine_step(
            &steps[1].id,
            StepUpdate { time_of_day: Some(TimeOfDay::Morning), ..Default::default() },
        )
        .unwrap();

    let toner = step_dates(&engine, &r.id, &steps[1].id);
    assert_eq!(toner.len(), 60);
    assert_eq!(*toner.iter().max().unwrap(), latest);
    let rows = engine.completions(&r.id).unwrap();
    assert!(rows.iter().all(|c| c.scheduled_time_of_day == TimeOfDay::Morning));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: convergence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn repeated_schedule_changes_converge() {
    let mut engine = ScheduleEngine::build_test(FixedClock::new(monday_morning())).unwrap();
    let (r, steps) = published(&mut engine, "UTC", vec![daily("Serum", TimeOfDay::Evening)]);
    let id = &steps[0].id;

    let to_mwf = StepUpdate {
        frequency: Some(Frequency::SpecificDays),
        days: Some(mwf()),
        ..Default::default()
    };
    engine.update_routine_step(id, to_mwf.clone()).unwrap();
    let first = step_dates(&engine, &r.id, id);

    engine
        .update_routine_step(id, StepUpdate { frequency: Some(Frequency::Daily), ..Default::default() })
        .unwrap();
    engine.update_routine_step(id, to_mwf).unwrap();
    assert_eq!(step_dates(&engine, &r.id, id), first);
}

#[test]
fn first_rows_for_a_routine_use_the_default_horizon() {
    let mut engine = ScheduleEngine::build_test(FixedClock::new(monday_morning())).unwrap();
    let empty = NewStep {
        frequency: Frequency::SpecificDays,
        ..daily("Mask", TimeOfDay::Evening)
    };
    let (r, steps) = published(&mut engine, "UTC", vec![empty]);
    assert!(engine.completions(&r.id).unwrap().is_empty());

    // No end date and no existing rows: the window falls back to 60 days.
    engine
        .update_routine_step(&steps[0].id, StepUpdate { frequency: Some(Frequency::Daily), ..Default::default() })
        .unwrap();

    let dates = step_dates(&engine, &r.id, &steps[0].id);
    assert_eq!(dates.len(), 60);
    assert_eq!(*dates.iter().next().unwrap(), today());
    assert_eq!(*dates.iter().next_back().unwrap(), day(59));
}

#[test]
fn same_schedule_written_again_is_not_a_reschedule() {
    let mut engine = ScheduleEngine::build_test(FixedClock::new(monday_morning())).unwrap();
    let (r, steps) = published(&mut engine, "UTC", vec![daily("Serum", TimeOfDay::Evening)]);
    let before = engine.completions(&r.id).unwrap();

    engine
        .update_routine_step(
            &steps[0].id,
            StepUpdate {
                frequency: Some(Frequency::Daily),
                time_of_day: Some(TimeOfDay::Evening),
                ..Default::default()
            },
        )
        .unwrap();

    // Same ids: nothing was deleted and regenerated.
    assert_eq!(engine.completions(&r.id).unwrap(), before);
}

#[test]
fn reconciling_a_step_twice_is_idempotent() {
    let mut store = ScheduleStore::in_memory().unwrap();
    store.migrate().unwrap();
    let config = SchedulerConfig::default();

    let routine = Routine {
        id: "rtn-1".to_string(),
        user_id: USER.to_string(),
        name: "Direct".to_string(),
        start_date: today(),
        end_date: Some(day(20)),
        status: RoutineStatus::Published,
        saved_as_template: false,
    };
    let step = RoutineStep {
        id: "stp-1".to_string(),
        routine_id: routine.id.clone(),
        order_index: 0,
        time_of_day: TimeOfDay::Morning,
        frequency: Frequency::ThreeTimesPerWeek,
        days: vec!["tuesday".into(), "thursday".into(), "saturday".into()],
        name: "Acid".to_string(),
        instructions: None,
        product_url: None,
    };
    {
        let repo = store.repo();
        repo.insert_user_profile(&UserProfile { id: USER.to_string(), timezone: "Asia/Tokyo".to_string() })
            .unwrap();
        repo.insert_routine(&routine).unwrap();
        repo.insert_step(&step).unwrap();
    }

    let mut counts = Vec::new();
    for _ in 0..2 {
        let report = store
            .with_transaction(|repo| {
                let mut reconciler = Reconciler::new(*repo, &config, today());
                reconciler.step_changed(&routine, &step)?;
                Ok(reconciler.into_report())
            })
            .unwrap();
        let rows = store.repo().completions_for_steps(&[step.id.clone()]).unwrap();
        counts.push((report.inserted, rows.len()));
    }

    // 21 days from a Monday: three Tue/Thu/Sat each.
    assert_eq!(counts, vec![(9, 9), (9, 9)]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: metadata edits
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn metadata_edit_writes_no_completions() {
    let mut engine = ScheduleEngine::build_test(FixedClock::new(monday_morning())).unwrap();
    let (r, steps) = published(&mut engine, "UTC", vec![daily("Serum", TimeOfDay::Evening)]);
    let before = engine.completions(&r.id).unwrap();

    let updated = engine
        .update_routine_step(
            &steps[0].id,
            StepUpdate {
                name: Some("Vitamin C".to_string()),
                instructions: Some(Some("Two drops".to_string())),
                product_url: Some(Some("https://example.com/vc".to_string())),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.name, "Vitamin C");
    assert_eq!(updated.instructions.as_deref(), Some("Two drops"));
    assert_eq!(engine.repo().find_step(&steps[0].id).unwrap().unwrap(), updated);
    assert_eq!(engine.completions(&r.id).unwrap(), before);

    // Explicit null clears an optional field.
    let cleared = engine
        .update_routine_step(&steps[0].id, StepUpdate { instructions: Some(None), ..Default::default() })
        .unwrap();
    assert_eq!(cleared.instructions, None);
    assert_eq!(cleared.product_url.as_deref(), Some("https://example.com/vc"));
}

#[test]
fn draft_step_edit_is_metadata_only() {
    let mut engine = ScheduleEngine::build_test(FixedClock::new(monday_morning())).unwrap();
    engine.create_user_profile(USER, "UTC").unwrap();
    let r = engine
        .create_routine(NewRoutine {
            user_id: USER.to_string(),
            name: "Draft".to_string(),
            start_date: today(),
            end_date: None,
            saved_as_template: false,
        })
        .unwrap();
    let s = engine.add_routine_step(&r.id, daily("Serum", TimeOfDay::Evening)).unwrap();

    let updated = engine
        .update_routine_step(
            &s.id,
            StepUpdate { frequency: Some(Frequency::SpecificDays), days: Some(mwf()), ..Default::default() },
        )
        .unwrap();
    assert_eq!(updated.frequency, Frequency::SpecificDays);
    assert!(engine.completions(&r.id).unwrap().is_empty());
}

#[test]
fn bad_weekday_is_rejected() {
    let mut engine = ScheduleEngine::build_test(FixedClock::new(monday_morning())).unwrap();
    let (r, steps) = published(&mut engine, "UTC", vec![daily("Serum", TimeOfDay::Evening)]);
    let before = engine.completions(&r.id).unwrap();

    let err = engine
        .update_routine_step(
            &steps[0].id,
            StepUpdate {
                frequency: Some(Frequency::SpecificDays),
                days: Some(vec!["Caturday".to_string()]),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Validation(_)));
    assert_eq!(engine.completions(&r.id).unwrap(), before);
    assert_eq!(engine.repo().find_step(&steps[0].id).unwrap().unwrap().frequency, Frequency::Daily);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: add and remove
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn step_added_to_published_routine_is_scheduled() {
    let mut engine = ScheduleEngine::build_test(FixedClock::new(monday_morning())).unwrap();
    let (r, steps) = published(&mut engine, "UTC", vec![daily("Cleanser", TimeOfDay::Morning)]);

    let added = engine.add_routine_step(&r.id, daily("SPF", TimeOfDay::Morning)).unwrap();
    assert_eq!(added.order_index, steps[0].order_index + 1);

    let dates = step_dates(&engine, &r.id, &added.id);
    assert_eq!(dates.len(), 60);
    assert_eq!(*dates.iter().next().unwrap(), today());
    assert_eq!(*dates.iter().next_back().unwrap(), day(59));
}

#[test]
fn removing_a_step_drops_its_pending_rows() {
    let mut engine = ScheduleEngine::build_test(FixedClock::new(monday_morning())).unwrap();
    let (r, steps) = published(
        &mut engine,
        "UTC",
        vec![daily("Cleanser", TimeOfDay::Morning), daily("Toner", TimeOfDay::Evening)],
    );

    engine.remove_routine_step(&steps[1].id).unwrap();

    assert_eq!(engine.steps(&r.id).unwrap().len(), 1);
    assert!(step_dates(&engine, &r.id, &steps[1].id).is_empty());
    assert_eq!(engine.completions(&r.id).unwrap().len(), 60);
    assert_eq!(engine.repo().events_of_type("step_removed").unwrap().len(), 1);

    assert!(matches!(
        engine.remove_routine_step(&steps[1].id),
        Err(ScheduleError::NotFound { entity: "step", .. })
    ));
}

#[test]
fn step_with_history_cannot_be_removed() {
    let mut engine = ScheduleEngine::build_test(FixedClock::new(monday_morning())).unwrap();
    let (r, steps) = published(&mut engine, "UTC", vec![daily("Cleanser", TimeOfDay::Morning)]);
    let first = engine.completions(&r.id).unwrap()[0].clone();
    engine.mark_step_completion(&first.id, true).unwrap();

    let err = engine.remove_routine_step(&steps[0].id).unwrap_err();
    assert!(matches!(err, ScheduleError::InvalidState(_)));
    assert_eq!(engine.completions(&r.id).unwrap().len(), 60);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: zone change
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn timezone_change_applies_to_new_rows_only() {
    let mut engine = ScheduleEngine::build_test(FixedClock::new(monday_morning())).unwrap();
    let (r, _) = published(&mut engine, "UTC", vec![daily("Cleanser", TimeOfDay::Morning)]);

    engine.update_user_timezone(USER, "Asia/Tokyo").unwrap();
    let added = engine.add_routine_step(&r.id, daily("SPF", TimeOfDay::Morning)).unwrap();

    let rows = engine.completions(&r.id).unwrap();
    let (new, old): (Vec<_>, Vec<_>) = rows
        .iter()
        .filter(|c| c.scheduled_date == today())
        .partition(|c| c.step_id == added.id);
    assert_eq!(old[0].on_time_deadline, Utc.with_ymd_and_hms(2025, 11, 3, 12, 0, 0).unwrap());
    assert_eq!(new[0].on_time_deadline, Utc.with_ymd_and_hms(2025, 11, 3, 3, 0, 0).unwrap());

    assert!(matches!(
        engine.update_user_timezone(USER, "Not/AZone"),
        Err(ScheduleError::InvalidTimezone(_))
    ));
}
