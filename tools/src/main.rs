//! schedule-runner: headless command runner for the routine scheduler.
//!
//! Usage:
//!   schedule-runner --db routines.db < commands.jsonl
//!   schedule-runner --db routines.db --config scheduler.json
//!   schedule-runner --db routines.db --summary
//!
//! Each stdin line is one JSON command, e.g.
//!   {"cmd":"publish_routine","routine_id":"rtn-..."}
//! and produces exactly one response line: `{"ok": ...}` or
//! `{"error": {"kind": ..., "message": ...}}`.

use anyhow::Result;
use routine_core::{
    clock::SystemClock,
    command::AdminCommand,
    config::SchedulerConfig,
    engine::ScheduleEngine,
    error::ScheduleError,
    store::ScheduleStore,
};
use serde_json::{json, Value};
use std::env;
use std::io::{self, BufRead, Write};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let summary_only = args.iter().any(|a| a == "--summary");
    let config = match arg_value(&args, "--config") {
        Some(path) => SchedulerConfig::load(path)?,
        None => SchedulerConfig::default(),
    };
    log::info!(
        "schedule-runner starting (db: {db}, horizon: {} days)",
        config.max_horizon_days
    );

    let store = if db == ":memory:" {
        ScheduleStore::in_memory()?
    } else {
        ScheduleStore::open(db)?
    };
    store.migrate()?;

    let mut engine = ScheduleEngine::new(store, Box::new(SystemClock), config);

    if summary_only {
        print_summary(&engine)?;
    } else {
        run_command_loop(&mut engine)?;
    }
    Ok(())
}

fn run_command_loop(engine: &mut ScheduleEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: AdminCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", error_json("parse", &e.to_string()))?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, AdminCommand::Quit) {
            break;
        }

        let response = match cmd.apply(engine) {
            Ok(value) => json!({ "ok": value }),
            Err(e) => {
                log::warn!("command failed: {e}");
                error_response(&e)
            }
        };
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn error_response(err: &ScheduleError) -> Value {
    error_json(err.kind(), &err.to_string())
}

fn error_json(kind: &str, message: &str) -> Value {
    json!({ "error": { "kind": kind, "message": message } })
}

fn print_summary(engine: &ScheduleEngine) -> Result<()> {
    let routines = engine.repo().all_routines()?;
    println!("=== ROUTINE SUMMARY ===");
    if routines.is_empty() {
        println!("  (no routines)");
        return Ok(());
    }
    for routine in routines {
        let summary = engine.compliance_summary(&routine.id)?;
        let window = match (summary.first_date, summary.last_date) {
            (Some(first), Some(last)) => format!("{first} .. {last}"),
            _ => "-".to_string(),
        };
        let rate = summary
            .on_time_rate
            .map(|r| format!("{:.1}%", r * 100.0))
            .unwrap_or_else(|| "-".to_string());
        println!("  {} ({}) | user {} | {}", routine.id, routine.name, routine.user_id, routine.status);
        println!("    steps:     {}", summary.step_count);
        println!("    scheduled: {window}");
        for count in &summary.counts {
            println!("    {:<10} {}", format!("{}:", count.status), count.count);
        }
        println!("    on time:   {rate}");
    }
    Ok(())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
