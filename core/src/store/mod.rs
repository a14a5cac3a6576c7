//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine calls `Repository` methods; it never executes SQL directly.
//!
//! Every repository method takes its connection from the `Repository` it
//! is called on. `ScheduleStore::repo()` hands out one over the plain
//! connection; `ScheduleStore::with_transaction()` hands out one over an
//! open transaction. The methods themselves do not know the difference.

use crate::{
    error::{ScheduleError, ScheduleResult},
    types::Instant,
};
use chrono::DateTime;
use rusqlite::{types::Type, Connection, Row, TransactionBehavior};
use std::str::FromStr;

mod completion;
mod event;
mod routine;
mod step;
mod user;

pub use completion::{DateRange, Extreme, StatusCount};

pub struct ScheduleStore {
    conn: Connection,
}

impl ScheduleStore {
    pub fn open(path: &str) -> ScheduleResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ScheduleResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order. Safe to run repeatedly.
    pub fn migrate(&self) -> ScheduleResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_schedule_event.sql"))?;
        Ok(())
    }

    /// Repository over the bare connection, for standalone reads and writes.
    pub fn repo(&self) -> Repository<'_> {
        Repository::new(&self.conn)
    }

    /// Run `f` inside one IMMEDIATE transaction.
    ///
    /// The write lock is taken before `f` reads anything, so two callers
    /// reconciling the same routine cannot both observe the same gap.
    /// Any error rolls back everything `f` wrote. Domain errors come back
    /// unchanged; infrastructure errors come back as `TransactionFailed`.
    pub fn with_transaction<T, F>(&mut self, f: F) -> ScheduleResult<T>
    where
        F: FnOnce(&Repository<'_>) -> ScheduleResult<T>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| transaction_failed(e.into()))?;

        let result = {
            let repo = Repository::new(&tx);
            f(&repo)
        };

        match result {
            Ok(value) => {
                tx.commit().map_err(|e| transaction_failed(e.into()))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    log::error!("rollback failed: {rollback_err}");
                }
                if err.is_domain() {
                    log::warn!("transaction rolled back: {err}");
                    Err(err)
                } else {
                    log::error!("transaction rolled back: {err}");
                    Err(transaction_failed(err))
                }
            }
        }
    }
}

fn transaction_failed(source: ScheduleError) -> ScheduleError {
    match source {
        already @ ScheduleError::TransactionFailed { .. } => already,
        other => ScheduleError::TransactionFailed {
            source: Box::new(other),
        },
    }
}

/// Repository over a borrowed connection or transaction.
#[derive(Clone, Copy)]
pub struct Repository<'c> {
    conn: &'c Connection,
}

impl<'c> Repository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

// ── Column helpers ─────────────────────────────────────────────

/// Read a text column into one of the model's text enums.
fn text_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn instant_from_secs(idx: usize, secs: i64) -> rusqlite::Result<Instant> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {secs} out of range").into(),
        )
    })
}

fn instant_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Instant> {
    instant_from_secs(idx, row.get(idx)?)
}

fn opt_instant_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Instant>> {
    row.get::<_, Option<i64>>(idx)?
        .map(|secs| instant_from_secs(idx, secs))
        .transpose()
}

/// `?,?,?` for an `IN (...)` list of `n` parameters.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}
