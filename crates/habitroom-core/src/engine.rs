//! Habit engine: the single entry point for every ledger mutation.
//!
//! Each mutation runs as one IMMEDIATE transaction on the habit's store:
//!
//! 1. load the habit and validate the request against its rules
//! 2. write the ledger record (upsert, or atomic increment for progress)
//! 3. fold the change into the cached streak, incrementally when the edit
//!    lands after the evaluated tail, otherwise by full replay
//! 4. write the new streak through the write gate
//! 5. append one audit entry
//!
//! Any failure drops the transaction, so no partial state is ever committed.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditKind, RecordRef};
use crate::clock::{Clock, SystemClock};
use crate::error::{DatabaseError, HabitError, Result, ValidationError};
use crate::habit::{
    Habit, HabitRecord, HabitType, NewHabit, RuleChange, RuleRegistry, Scheduler, StreakSnapshot,
    StreakState,
};
use crate::history::{HistoryCursor, HistoryIter, HistoryPage};
use crate::storage::ledger::{AuditTrail, HabitRepository, RecordLedger, StreakWriter};
use crate::storage::{Config, HabitDb};
use crate::streak::{ReplayMode, StreakCalculator};

/// Result of a mark or progress call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerUpdate {
    pub record: HabitRecord,
    pub streak: StreakSnapshot,
}

/// Result of a retroactive mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetroactiveUpdate {
    pub record: HabitRecord,
    pub streak: StreakSnapshot,
    pub audit_entry: AuditEntry,
}

/// Everything a committed mutation produced.
struct Committed {
    record: Option<HabitRecord>,
    state: StreakState,
    audit_entry: AuditEntry,
}

/// Orchestrates ledger writes, streak recalculation and auditing.
pub struct HabitEngine {
    db: HabitDb,
    clock: Arc<dyn Clock>,
    rules: RuleRegistry,
    config: Config,
}

impl HabitEngine {
    /// Engine over `db` with default configuration and the system clock.
    pub fn new(db: HabitDb) -> Self {
        Self {
            db,
            clock: Arc::new(SystemClock),
            rules: RuleRegistry::default(),
            config: Config::default(),
        }
    }

    /// Open the default database described by `config`.
    pub fn open(config: Config) -> Result<Self> {
        let db = HabitDb::open(&config.storage)?;
        Ok(Self::new(db).with_config(config))
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_rules(mut self, rules: RuleRegistry) -> Self {
        self.rules = rules;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    fn scheduler(&self, today: NaiveDate) -> Scheduler<'_> {
        Scheduler::new(&self.rules, self.config.schedule.monthly_overflow, today)
    }

    // === Habits ===

    /// Register a new habit with an empty streak.
    pub fn create_habit(&self, new: NewHabit) -> Result<Habit> {
        let today = self.ensure_not_future(new.creation_date)?;
        let habit = Habit::new(Uuid::new_v4().to_string(), new);
        habit.validate(&self.rules)?;

        let now = self.clock.now();
        self.db.write(|tx| -> Result<()> {
            tx.insert_habit(&habit, now)?;
            Ok(())
        })?;
        tracing::info!(habit_id = %habit.id, owner = %habit.owner_id, %today, "habit created");
        Ok(habit)
    }

    pub fn get_habit(&self, habit_id: &str) -> Result<Habit> {
        self.db.read(|conn| load(conn, habit_id))
    }

    /// Like [`HabitEngine::get_habit`], but habits of other owners are
    /// reported as missing.
    pub fn get_owned_habit(&self, owner_id: &str, habit_id: &str) -> Result<Habit> {
        let habit = self.get_habit(habit_id)?;
        if habit.owner_id != owner_id {
            return Err(HabitError::HabitNotFound(habit_id.to_string()));
        }
        Ok(habit)
    }

    pub fn list_habits(&self, owner_id: Option<&str>) -> Result<Vec<Habit>> {
        Ok(self.db.read(|conn| conn.list_habits(owner_id))?)
    }

    /// Change the habit's obligation rules and replay its whole ledger.
    pub fn update_rules(&self, habit_id: &str, change: RuleChange) -> Result<Habit> {
        if change.is_empty() {
            return Err(ValidationError::invalid("rules", "no changes requested").into());
        }
        let today = self.clock.today();
        let now = self.clock.now();

        let habit = self
            .db
            .write(|tx| -> Result<Habit> {
                let mut habit = load(tx, habit_id)?;
                let previous = habit.streak;
                let target_changed = habit.apply_rule_change(&change)?;
                habit.validate(&self.rules)?;

                tx.update_rules(&habit)?;
                if target_changed {
                    if let HabitType::Numeric { target_value } = habit.habit_type {
                        tx.rederive_completion(habit_id, target_value)
                            .map_err(|e| HabitError::replay(habit_id, e))?;
                    }
                }

                let committed =
                    self.recalculate(tx, &habit, today, None, true, AuditKind::RuleChange, now, previous)?;
                habit.streak = committed.state;
                Ok(habit)
            })
            .map_err(|e| e.for_habit(habit_id))?;

        tracing::info!(
            habit_id,
            periodicity = habit.periodicity.label(),
            current = habit.streak.current_streak,
            longest = habit.streak.longest_streak,
            "habit rules changed"
        );
        Ok(habit)
    }

    /// Stop obligations after `date`.
    pub fn deactivate(&self, habit_id: &str, date: NaiveDate) -> Result<Habit> {
        self.update_rules(
            habit_id,
            RuleChange {
                deactivated_at: Some(Some(date)),
                ..Default::default()
            },
        )
    }

    // === Ledger mutations ===

    /// Mark a CHECK habit's day as done or not done.
    ///
    /// Uses the incremental path when `date` lies after the last evaluated
    /// day, otherwise a full replay. A mark before the evaluated day is
    /// audited as a retroactive mark.
    pub fn mark_day(&self, habit_id: &str, date: NaiveDate, completed: bool) -> Result<LedgerUpdate> {
        self.mark_day_inner(habit_id, date, completed, None)
    }

    /// [`HabitEngine::mark_day`], attaching `notes` in the same transaction.
    pub fn mark_day_with_notes(
        &self,
        habit_id: &str,
        date: NaiveDate,
        completed: bool,
        notes: &str,
    ) -> Result<LedgerUpdate> {
        self.mark_day_inner(habit_id, date, completed, Some(notes))
    }

    /// Correct a past day's mark. Always replays the full ledger.
    pub fn mark_retroactively(
        &self,
        habit_id: &str,
        date: NaiveDate,
        completed: bool,
    ) -> Result<RetroactiveUpdate> {
        self.mark_retroactively_inner(habit_id, date, completed, None)
    }

    /// [`HabitEngine::mark_retroactively`], attaching `notes` in the same
    /// transaction.
    pub fn mark_retroactively_with_notes(
        &self,
        habit_id: &str,
        date: NaiveDate,
        completed: bool,
        notes: &str,
    ) -> Result<RetroactiveUpdate> {
        self.mark_retroactively_inner(habit_id, date, completed, Some(notes))
    }

    /// Add `delta` units to a NUMERIC habit's day.
    ///
    /// The value is accumulated by a single increment statement, so
    /// concurrent deltas on the same day sum regardless of arrival order.
    pub fn update_progress(&self, habit_id: &str, date: NaiveDate, delta: i64) -> Result<LedgerUpdate> {
        if delta == 0 {
            return Err(ValidationError::ZeroDelta.into());
        }
        let today = self.ensure_not_future(date)?;
        let now = self.clock.now();

        let committed = self
            .db
            .write(|tx| -> Result<Committed> {
                let habit = load(tx, habit_id)?;
                let target = match habit.habit_type {
                    HabitType::Numeric { target_value } => target_value,
                    HabitType::Check => return Err(wrong_type(habit_id, "NUMERIC")),
                };
                self.ensure_obligated(&habit, today, date)?;

                let record = tx.increment_value(habit_id, date, delta, target, now)?;
                let previous = habit.streak;
                let mut committed = self.recalculate(
                    tx,
                    &habit,
                    today,
                    Some(&record),
                    false,
                    AuditKind::ProgressUpdate,
                    now,
                    previous,
                )?;
                committed.record = Some(record);
                Ok(committed)
            })
            .map_err(|e| e.for_habit(habit_id))?;

        tracing::info!(
            habit_id,
            %date,
            delta,
            current = committed.state.current_streak,
            longest = committed.state.longest_streak,
            "progress recorded"
        );
        Ok(LedgerUpdate {
            record: committed.record.ok_or_else(|| record_missing(habit_id, date))?,
            streak: committed.state.snapshot(),
        })
    }

    /// Attach or clear free-form notes on an existing record.
    ///
    /// Notes never affect the streak, so no recalculation or audit entry
    /// follows.
    pub fn set_notes(&self, habit_id: &str, date: NaiveDate, notes: Option<&str>) -> Result<HabitRecord> {
        let now = self.clock.now();
        self.db
            .write(|tx| -> Result<HabitRecord> {
                load(tx, habit_id)?;
                if !tx.set_notes(habit_id, date, notes, now)? {
                    return Err(record_missing(habit_id, date));
                }
                tx.get_record(habit_id, date)?
                    .ok_or_else(|| record_missing(habit_id, date))
            })
            .map_err(|e| e.for_habit(habit_id))
    }

    /// Roll the stored streak forward to the current as-of day.
    ///
    /// Nothing in the ledger changes, so no audit entry is written. Lets a
    /// habit that has not been touched for days report its lapsed streak.
    pub fn refresh_streak(&self, habit_id: &str) -> Result<StreakSnapshot> {
        let today = self.clock.today();
        self.db
            .write(|tx| -> Result<StreakSnapshot> {
                let habit = load(tx, habit_id)?;
                let scheduler = self.scheduler(today);
                let calc = StreakCalculator::new(&scheduler);
                let today_record = tx
                    .get_record(habit_id, today)
                    .map_err(|e| HabitError::replay(habit_id, e))?;
                let as_of = calc.as_of(&habit, today_record.as_ref());
                let mode = ReplayMode::select(&habit.streak, None, as_of);

                let state = replay(tx, &habit, &calc, mode, as_of)
                    .map_err(|e| HabitError::replay(habit_id, e))?;
                if state != habit.streak {
                    tx.write_streak(habit_id, &state)
                        .map_err(|e| HabitError::replay(habit_id, e))?;
                    tracing::debug!(habit_id, ?mode, %as_of, "streak refreshed");
                }
                Ok(state.snapshot())
            })
            .map_err(|e| e.for_habit(habit_id))
    }

    // === Queries ===

    /// The committed streak for `habit_id`.
    pub fn get_streak_snapshot(&self, habit_id: &str) -> Result<StreakSnapshot> {
        Ok(self.get_habit(habit_id)?.streak())
    }

    /// Audit entries in append order.
    pub fn get_audit_history(&self, habit_id: &str) -> Result<Vec<AuditEntry>> {
        self.db.read(|conn| -> Result<Vec<AuditEntry>> {
            load(conn, habit_id)?;
            Ok(conn.audit_history(habit_id)?)
        })
    }

    pub fn get_record(&self, habit_id: &str, date: NaiveDate) -> Result<HabitRecord> {
        self.db.read(|conn| -> Result<HabitRecord> {
            load(conn, habit_id)?;
            conn.get_record(habit_id, date)?
                .ok_or_else(|| record_missing(habit_id, date))
        })
    }

    /// One page of records, newest first, starting strictly before `cursor`.
    pub fn get_historical_records(
        &self,
        habit_id: &str,
        cursor: Option<HistoryCursor>,
        page_size: usize,
    ) -> Result<HistoryPage> {
        let max = self.config.history.max_page_size;
        if page_size == 0 || page_size > max {
            return Err(ValidationError::InvalidPageSize { size: page_size, max }.into());
        }

        self.db.read(|conn| -> Result<HistoryPage> {
            load(conn, habit_id)?;
            let before = cursor.map(|c| c.date());
            let mut records = conn.records_before(habit_id, before, page_size.saturating_add(1))?;
            let has_more = records.len() > page_size;
            records.truncate(page_size);
            let next_cursor = if has_more {
                records.last().map(|r| HistoryCursor::before(r.date))
            } else {
                None
            };
            Ok(HistoryPage {
                records,
                next_cursor,
            })
        })
    }

    /// Lazily walk every record, newest first, using the configured page size.
    pub fn history_iter(&self, habit_id: &str) -> HistoryIter<'_> {
        HistoryIter::new(self, habit_id, self.config.history.default_page_size, None)
    }

    /// Resume a walk after `cursor` with an explicit page size.
    pub fn history_iter_from(
        &self,
        habit_id: &str,
        cursor: Option<HistoryCursor>,
        page_size: usize,
    ) -> HistoryIter<'_> {
        HistoryIter::new(self, habit_id, page_size, cursor)
    }

    // === Internals ===

    fn mark_day_inner(
        &self,
        habit_id: &str,
        date: NaiveDate,
        completed: bool,
        notes: Option<&str>,
    ) -> Result<LedgerUpdate> {
        let committed = self.mark(habit_id, date, completed, notes, AuditKind::Mark)?;
        Ok(LedgerUpdate {
            record: committed.record.ok_or_else(|| record_missing(habit_id, date))?,
            streak: committed.state.snapshot(),
        })
    }

    fn mark_retroactively_inner(
        &self,
        habit_id: &str,
        date: NaiveDate,
        completed: bool,
        notes: Option<&str>,
    ) -> Result<RetroactiveUpdate> {
        let committed = self.mark(habit_id, date, completed, notes, AuditKind::RetroactiveMark)?;
        Ok(RetroactiveUpdate {
            record: committed.record.ok_or_else(|| record_missing(habit_id, date))?,
            streak: committed.state.snapshot(),
            audit_entry: committed.audit_entry,
        })
    }

    fn mark(
        &self,
        habit_id: &str,
        date: NaiveDate,
        completed: bool,
        notes: Option<&str>,
        kind: AuditKind,
    ) -> Result<Committed> {
        let today = self.ensure_not_future(date)?;
        let now = self.clock.now();
        let force_full = kind == AuditKind::RetroactiveMark;

        let committed = self
            .db
            .write(|tx| -> Result<Committed> {
                let habit = load(tx, habit_id)?;
                if habit.habit_type != HabitType::Check {
                    return Err(wrong_type(habit_id, "CHECK"));
                }
                self.ensure_obligated(&habit, today, date)?;

                let mut record = HabitRecord::check(habit_id, date, completed, now);
                record.notes = notes.map(str::to_string);
                let record = tx.upsert_record(&record)?;
                let previous = habit.streak;
                let mut committed =
                    self.recalculate(tx, &habit, today, Some(&record), force_full, kind, now, previous)?;
                committed.record = Some(record);
                Ok(committed)
            })
            .map_err(|e| e.for_habit(habit_id))?;

        tracing::info!(
            habit_id,
            %date,
            completed,
            kind = committed.audit_entry.kind.as_str(),
            current = committed.state.current_streak,
            longest = committed.state.longest_streak,
            "day marked"
        );
        Ok(committed)
    }

    /// Steps 3-5 of every mutation: replay, write gate, audit.
    #[allow(clippy::too_many_arguments)]
    fn recalculate(
        &self,
        tx: &Transaction<'_>,
        habit: &Habit,
        today: NaiveDate,
        edited: Option<&HabitRecord>,
        force_full: bool,
        kind: AuditKind,
        now: DateTime<Utc>,
        previous: StreakState,
    ) -> Result<Committed> {
        let habit_id = habit.id.as_str();
        let scheduler = self.scheduler(today);
        let calc = StreakCalculator::new(&scheduler);

        let today_record = match edited {
            Some(record) if record.date == today => Some(record.clone()),
            _ => tx
                .get_record(habit_id, today)
                .map_err(|e| HabitError::replay(habit_id, e))?,
        };
        let as_of = calc.as_of(habit, today_record.as_ref());
        let mode = if force_full {
            ReplayMode::Full
        } else {
            ReplayMode::select(&habit.streak, edited.map(|r| r.date), as_of)
        };

        let state = replay(tx, habit, &calc, mode, as_of).map_err(|e| HabitError::replay(habit_id, e))?;
        tx.write_streak(habit_id, &state)
            .map_err(|e| HabitError::replay(habit_id, e))?;
        tracing::debug!(habit_id, ?mode, %as_of, "streak recalculated");

        // A mark landing before the evaluated tail is a retroactive edit.
        let kind = match (kind, edited, habit.streak.evaluated_through) {
            (AuditKind::Mark, Some(record), Some(tail)) if record.date < tail => {
                AuditKind::RetroactiveMark
            }
            _ => kind,
        };
        let mut audit_entry = AuditEntry::new(
            habit_id,
            kind,
            previous.snapshot(),
            state.snapshot(),
            edited.map(RecordRef::from),
            now,
        );
        audit_entry.sequence = tx.append_audit(&audit_entry)?;

        Ok(Committed {
            record: None,
            state,
            audit_entry,
        })
    }

    fn ensure_not_future(&self, date: NaiveDate) -> Result<NaiveDate> {
        let today = self.clock.today();
        if date > today {
            return Err(ValidationError::FutureDate { date, today }.into());
        }
        Ok(today)
    }

    fn ensure_obligated(&self, habit: &Habit, today: NaiveDate, date: NaiveDate) -> Result<()> {
        if self.scheduler(today).is_obligated(habit, date) {
            return Ok(());
        }
        tracing::warn!(habit_id = %habit.id, %date, "rejected mark on a non-obligated day");
        Err(HabitError::ObligationMismatch {
            habit_id: habit.id.clone(),
            date,
        })
    }
}

impl fmt::Debug for HabitEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HabitEngine")
            .field("db", &self.db)
            .field("rules", &self.rules)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn load(conn: &Connection, habit_id: &str) -> Result<Habit> {
    conn.load_habit(habit_id)?
        .ok_or_else(|| HabitError::HabitNotFound(habit_id.to_string()))
}

/// Compute the streak for `mode`, reading only the records that mode needs.
fn replay(
    conn: &Connection,
    habit: &Habit,
    calc: &StreakCalculator<'_>,
    mode: ReplayMode,
    as_of: NaiveDate,
) -> std::result::Result<StreakState, DatabaseError> {
    match mode {
        ReplayMode::Full => {
            if as_of < habit.creation_date {
                return Ok(StreakState::default());
            }
            let records = conn.records_in_range(&habit.id, habit.creation_date, as_of)?;
            Ok(calc.full_replay(habit, &records, as_of))
        }
        ReplayMode::Incremental { resume_from } => {
            let records = if resume_from <= as_of {
                conn.records_in_range(&habit.id, resume_from, as_of)?
            } else {
                Vec::new()
            };
            Ok(calc.extend(habit, &habit.streak, &records, as_of))
        }
    }
}

fn wrong_type(habit_id: &str, expected: &'static str) -> HabitError {
    ValidationError::WrongHabitType {
        habit_id: habit_id.to_string(),
        expected,
    }
    .into()
}

fn record_missing(habit_id: &str, date: NaiveDate) -> HabitError {
    HabitError::RecordNotFound {
        habit_id: habit_id.to_string(),
        date,
    }
}
