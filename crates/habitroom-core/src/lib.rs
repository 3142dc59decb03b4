//! # Habitroom Core Library
//!
//! Habit completion ledger and streak recalculation engine. Every operation is
//! available through the standalone `habitroom-cli` binary, which is a thin
//! layer over this crate.
//!
//! ## Architecture
//!
//! - **Habits**: periodicity rules decide which days are obligated
//! - **Ledger**: one record per habit per day, stored in SQLite
//! - **Streaks**: current and longest runs derived from the ledger, either by
//!   incremental extension or by full replay
//! - **Audit**: append-only log of every streak transition
//!
//! ## Key Components
//!
//! - [`HabitEngine`]: Entry point for marks, progress, queries and rule changes
//! - [`StreakCalculator`]: Pure streak computation over a record slice
//! - [`Scheduler`]: Obligation predicate for a habit and a date
//! - [`HabitDb`]: SQLite persistence
//! - [`Config`]: Application configuration management

pub mod audit;
pub mod clock;
pub mod engine;
pub mod error;
pub mod habit;
pub mod history;
pub mod storage;
pub mod streak;

pub use audit::{AuditEntry, AuditKind, RecordRef};
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{HabitEngine, LedgerUpdate, RetroactiveUpdate};
pub use error::{ConfigError, DatabaseError, HabitError, Result, ValidationError};
pub use habit::{
    CustomRule, EveryNDays, Habit, HabitId, HabitRecord, HabitType, MonthlyOverflow, NewHabit,
    Periodicity, RuleChange, RuleRegistry, Scheduler, StreakSnapshot, StreakState, WeekDays,
};
pub use history::{HistoryCursor, HistoryIter, HistoryPage};
pub use storage::{Config, HabitDb};
pub use streak::{ReplayMode, StreakCalculator};
