//! Persistence contracts for habits, ledger records and audit entries.
//!
//! The traits are implemented for [`rusqlite::Connection`], so the same
//! calls work on a plain connection and, through deref, inside a
//! [`rusqlite::Transaction`]. The engine runs every mutation inside one
//! transaction and calls these methods on it.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::audit::{AuditEntry, AuditKind, RecordRef};
use crate::error::DatabaseError;
use crate::habit::{Habit, HabitRecord, HabitType, Periodicity, StreakSnapshot, StreakState, WeekDays};

// === Helper Functions ===

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

/// Parse a `YYYY-MM-DD` column.
fn parse_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .map_err(|e| conversion_error(idx, format!("bad date '{text}': {e}")))
}

fn parse_optional_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => parse_date(row, idx).map(Some),
        None => Ok(None),
    }
}

/// Parse an RFC 3339 timestamp column.
fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp '{text}': {e}")))
}

/// Parse habit type from its database columns
fn parse_habit_type(kind: &str, target_value: Option<i64>) -> Result<HabitType, String> {
    match (kind, target_value) {
        ("CHECK", _) => Ok(HabitType::Check),
        ("NUMERIC", Some(target_value)) => Ok(HabitType::Numeric { target_value }),
        ("NUMERIC", None) => Err("numeric habit without target_value".into()),
        (other, _) => Err(format!("unknown habit type '{other}'")),
    }
}

/// Parse periodicity from its database columns
fn parse_periodicity(
    kind: &str,
    week_days: Option<u8>,
    anchor_day: Option<u32>,
    custom_rule: Option<String>,
) -> Result<Periodicity, String> {
    match kind {
        "DAILY" => Ok(Periodicity::Daily),
        "WEEKLY" => week_days
            .map(|bits| Periodicity::Weekly {
                week_days: WeekDays::from_bits(bits),
            })
            .ok_or_else(|| "weekly habit without week_days".into()),
        "MONTHLY" => anchor_day
            .map(|anchor_day| Periodicity::Monthly { anchor_day })
            .ok_or_else(|| "monthly habit without anchor_day".into()),
        "CUSTOM" => custom_rule
            .map(|rule| Periodicity::Custom { rule })
            .ok_or_else(|| "custom habit without custom_rule".into()),
        other => Err(format!("unknown periodicity '{other}'")),
    }
}

/// Split periodicity into its (week_days, anchor_day, custom_rule) columns
fn format_periodicity(periodicity: &Periodicity) -> (Option<u8>, Option<u32>, Option<&str>) {
    match periodicity {
        Periodicity::Daily => (None, None, None),
        Periodicity::Weekly { week_days } => (Some(week_days.bits()), None, None),
        Periodicity::Monthly { anchor_day } => (None, Some(*anchor_day), None),
        Periodicity::Custom { rule } => (None, None, Some(rule.as_str())),
    }
}

const HABIT_COLUMNS: &str = "id, owner_id, name, habit_type, target_value, periodicity, week_days,
    anchor_day, custom_rule, creation_date, deactivated_at, current_streak, longest_streak,
    evaluated_through";

/// Build a Habit from a database row
fn row_to_habit(row: &Row<'_>) -> rusqlite::Result<Habit> {
    let habit_type = parse_habit_type(&row.get::<_, String>(3)?, row.get(4)?)
        .map_err(|e| conversion_error(3, e))?;
    let periodicity = parse_periodicity(&row.get::<_, String>(5)?, row.get(6)?, row.get(7)?, row.get(8)?)
        .map_err(|e| conversion_error(5, e))?;

    Ok(Habit {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        habit_type,
        periodicity,
        creation_date: parse_date(row, 9)?,
        deactivated_at: parse_optional_date(row, 10)?,
        streak: StreakState {
            current_streak: row.get(11)?,
            longest_streak: row.get(12)?,
            evaluated_through: parse_optional_date(row, 13)?,
        },
    })
}

const RECORD_COLUMNS: &str = "habit_id, date, completed, value, notes, updated_at";

/// Build a HabitRecord from a database row
fn row_to_record(row: &Row<'_>) -> rusqlite::Result<HabitRecord> {
    Ok(HabitRecord {
        habit_id: row.get(0)?,
        date: parse_date(row, 1)?,
        completed: row.get(2)?,
        value: row.get(3)?,
        notes: row.get(4)?,
        updated_at: parse_timestamp(row, 5)?,
    })
}

/// Build an AuditEntry from a database row
fn row_to_audit(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let kind_str: String = row.get(3)?;
    let kind = AuditKind::parse(&kind_str)
        .ok_or_else(|| conversion_error(3, format!("unknown audit kind '{kind_str}'")))?;
    let record = match parse_optional_date(row, 9)? {
        Some(date) => Some(RecordRef {
            date,
            completed: row.get::<_, Option<bool>>(10)?.unwrap_or(false),
            value: row.get(11)?,
        }),
        None => None,
    };

    Ok(AuditEntry {
        sequence: row.get(0)?,
        id: row.get(1)?,
        habit_id: row.get(2)?,
        kind,
        timestamp: parse_timestamp(row, 4)?,
        previous: StreakSnapshot {
            current_streak: row.get(5)?,
            longest_streak: row.get(6)?,
        },
        current: StreakSnapshot {
            current_streak: row.get(7)?,
            longest_streak: row.get(8)?,
        },
        record,
    })
}

/// Map a row-decoding failure to a corruption error naming the table.
fn decode_error(table: &'static str) -> impl Fn(rusqlite::Error) -> DatabaseError {
    move |err| match err {
        rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
            DatabaseError::Corrupt {
                table,
                message: err.to_string(),
            }
        }
        other => DatabaseError::from(other),
    }
}

// === Contracts ===

/// Per-day record store keyed by (habit, date).
pub trait RecordLedger {
    /// Insert or replace the day's `completed`/`value` and return the stored
    /// row. Existing notes survive an upsert whose `notes` is `None`.
    fn upsert_record(&self, record: &HabitRecord) -> Result<HabitRecord, DatabaseError>;

    fn get_record(&self, habit_id: &str, date: NaiveDate) -> Result<Option<HabitRecord>, DatabaseError>;

    /// Records in `[from, to]`, ascending by date.
    fn records_in_range(
        &self,
        habit_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<HabitRecord>, DatabaseError>;

    /// Add `delta` to the day's running total in a single statement. The
    /// stored value is the total floored at zero; `completed` is derived
    /// against `target`.
    fn increment_value(
        &self,
        habit_id: &str,
        date: NaiveDate,
        delta: i64,
        target: i64,
        at: DateTime<Utc>,
    ) -> Result<HabitRecord, DatabaseError>;

    /// Re-derive `completed` for every numeric record after a target change.
    fn rederive_completion(&self, habit_id: &str, target: i64) -> Result<usize, DatabaseError>;

    /// Up to `limit` records strictly before `before`, newest first.
    fn records_before(
        &self,
        habit_id: &str,
        before: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<HabitRecord>, DatabaseError>;

    fn set_notes(
        &self,
        habit_id: &str,
        date: NaiveDate,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;
}

/// Habit definitions and their cached streak.
pub trait HabitRepository {
    fn insert_habit(&self, habit: &Habit, at: DateTime<Utc>) -> Result<(), DatabaseError>;

    fn load_habit(&self, habit_id: &str) -> Result<Option<Habit>, DatabaseError>;

    /// All habits, optionally restricted to one owner, oldest first.
    fn list_habits(&self, owner_id: Option<&str>) -> Result<Vec<Habit>, DatabaseError>;

    /// Persist periodicity, type and deactivation fields. Never touches the
    /// streak columns.
    fn update_rules(&self, habit: &Habit) -> Result<(), DatabaseError>;
}

/// The single write path for a habit's derived streak columns.
pub(crate) trait StreakWriter {
    fn write_streak(&self, habit_id: &str, state: &StreakState) -> Result<(), DatabaseError>;
}

/// Append-only log of streak transitions.
pub trait AuditTrail {
    /// Append `entry` and return its store-assigned sequence number.
    fn append_audit(&self, entry: &AuditEntry) -> Result<i64, DatabaseError>;

    /// Entries for `habit_id` in append order.
    fn audit_history(&self, habit_id: &str) -> Result<Vec<AuditEntry>, DatabaseError>;
}

// === SQLite implementation ===

impl RecordLedger for Connection {
    fn upsert_record(&self, record: &HabitRecord) -> Result<HabitRecord, DatabaseError> {
        self.query_row(
            &format!(
                "INSERT INTO habit_records (habit_id, date, completed, value, progress, notes, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)
                 ON CONFLICT(habit_id, date) DO UPDATE SET
                    completed = excluded.completed,
                    value = excluded.value,
                    progress = excluded.progress,
                    notes = COALESCE(excluded.notes, habit_records.notes),
                    updated_at = excluded.updated_at
                 RETURNING {RECORD_COLUMNS}"
            ),
            params![
                record.habit_id,
                format_date(record.date),
                record.completed,
                record.value,
                record.notes,
                record.updated_at.to_rfc3339(),
            ],
            row_to_record,
        )
        .map_err(decode_error("habit_records"))
    }

    fn get_record(&self, habit_id: &str, date: NaiveDate) -> Result<Option<HabitRecord>, DatabaseError> {
        self.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM habit_records WHERE habit_id = ?1 AND date = ?2"),
            params![habit_id, format_date(date)],
            row_to_record,
        )
        .optional()
        .map_err(decode_error("habit_records"))
    }

    fn records_in_range(
        &self,
        habit_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<HabitRecord>, DatabaseError> {
        let mut stmt = self.prepare_cached(&format!(
            "SELECT {RECORD_COLUMNS} FROM habit_records
             WHERE habit_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC"
        ))?;
        let rows = stmt.query_map(params![habit_id, format_date(from), format_date(to)], row_to_record)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(decode_error("habit_records"))
    }

    fn increment_value(
        &self,
        habit_id: &str,
        date: NaiveDate,
        delta: i64,
        target: i64,
        at: DateTime<Utc>,
    ) -> Result<HabitRecord, DatabaseError> {
        // The floor applies to the running total, not to each step, so deltas
        // commute. All SET expressions read the pre-update row.
        self.query_row(
            &format!(
                "INSERT INTO habit_records (habit_id, date, completed, value, progress, notes, updated_at)
                 VALUES (?1, ?2, MAX(0, ?3) >= ?4, MAX(0, ?3), ?3, NULL, ?5)
                 ON CONFLICT(habit_id, date) DO UPDATE SET
                    progress = COALESCE(habit_records.progress, habit_records.value, 0) + ?3,
                    value = MAX(0, COALESCE(habit_records.progress, habit_records.value, 0) + ?3),
                    completed = MAX(0, COALESCE(habit_records.progress, habit_records.value, 0) + ?3) >= ?4,
                    updated_at = ?5
                 RETURNING {RECORD_COLUMNS}"
            ),
            params![habit_id, format_date(date), delta, target, at.to_rfc3339()],
            row_to_record,
        )
        .map_err(decode_error("habit_records"))
    }

    fn rederive_completion(&self, habit_id: &str, target: i64) -> Result<usize, DatabaseError> {
        let changed = self.execute(
            "UPDATE habit_records SET completed = (COALESCE(value, 0) >= ?2)
             WHERE habit_id = ?1 AND value IS NOT NULL",
            params![habit_id, target],
        )?;
        Ok(changed)
    }

    fn records_before(
        &self,
        habit_id: &str,
        before: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<HabitRecord>, DatabaseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.prepare_cached(&format!(
            "SELECT {RECORD_COLUMNS} FROM habit_records
             WHERE habit_id = ?1 AND (?2 IS NULL OR date < ?2)
             ORDER BY date DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![habit_id, before.map(format_date), limit], row_to_record)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(decode_error("habit_records"))
    }

    fn set_notes(
        &self,
        habit_id: &str,
        date: NaiveDate,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let changed = self.execute(
            "UPDATE habit_records SET notes = ?3, updated_at = ?4 WHERE habit_id = ?1 AND date = ?2",
            params![habit_id, format_date(date), notes, at.to_rfc3339()],
        )?;
        Ok(changed > 0)
    }
}

impl HabitRepository for Connection {
    fn insert_habit(&self, habit: &Habit, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let (week_days, anchor_day, custom_rule) = format_periodicity(&habit.periodicity);
        self.execute(
            "INSERT INTO habits (id, owner_id, name, habit_type, target_value, periodicity, week_days,
                                 anchor_day, custom_rule, creation_date, deactivated_at,
                                 current_streak, longest_streak, evaluated_through, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                habit.id,
                habit.owner_id,
                habit.name,
                habit.habit_type.label(),
                habit.habit_type.target_value(),
                habit.periodicity.label(),
                week_days,
                anchor_day,
                custom_rule,
                format_date(habit.creation_date),
                habit.deactivated_at.map(format_date),
                habit.streak.current_streak,
                habit.streak.longest_streak,
                habit.streak.evaluated_through.map(format_date),
                at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn load_habit(&self, habit_id: &str) -> Result<Option<Habit>, DatabaseError> {
        self.query_row(
            &format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1"),
            params![habit_id],
            row_to_habit,
        )
        .optional()
        .map_err(decode_error("habits"))
    }

    fn list_habits(&self, owner_id: Option<&str>) -> Result<Vec<Habit>, DatabaseError> {
        let mut stmt = self.prepare(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits
             WHERE ?1 IS NULL OR owner_id = ?1
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![owner_id], row_to_habit)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(decode_error("habits"))
    }

    fn update_rules(&self, habit: &Habit) -> Result<(), DatabaseError> {
        let (week_days, anchor_day, custom_rule) = format_periodicity(&habit.periodicity);
        self.execute(
            "UPDATE habits SET
                habit_type = ?2, target_value = ?3, periodicity = ?4, week_days = ?5,
                anchor_day = ?6, custom_rule = ?7, deactivated_at = ?8
             WHERE id = ?1",
            params![
                habit.id,
                habit.habit_type.label(),
                habit.habit_type.target_value(),
                habit.periodicity.label(),
                week_days,
                anchor_day,
                custom_rule,
                habit.deactivated_at.map(format_date),
            ],
        )?;
        Ok(())
    }
}

impl StreakWriter for Connection {
    fn write_streak(&self, habit_id: &str, state: &StreakState) -> Result<(), DatabaseError> {
        self.execute(
            "UPDATE habits SET current_streak = ?2, longest_streak = ?3, evaluated_through = ?4
             WHERE id = ?1",
            params![
                habit_id,
                state.current_streak,
                state.longest_streak,
                state.evaluated_through.map(format_date),
            ],
        )?;
        Ok(())
    }
}

impl AuditTrail for Connection {
    fn append_audit(&self, entry: &AuditEntry) -> Result<i64, DatabaseError> {
        let record = entry.record.as_ref();
        self.execute(
            "INSERT INTO audit_entries (id, habit_id, kind, created_at, prev_current, prev_longest,
                                        new_current, new_longest, record_date, record_completed,
                                        record_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry.id,
                entry.habit_id,
                entry.kind.as_str(),
                entry.timestamp.to_rfc3339(),
                entry.previous.current_streak,
                entry.previous.longest_streak,
                entry.current.current_streak,
                entry.current.longest_streak,
                record.map(|r| format_date(r.date)),
                record.map(|r| r.completed),
                record.and_then(|r| r.value),
            ],
        )?;
        Ok(self.last_insert_rowid())
    }

    fn audit_history(&self, habit_id: &str) -> Result<Vec<AuditEntry>, DatabaseError> {
        let mut stmt = self.prepare_cached(
            "SELECT sequence, id, habit_id, kind, created_at, prev_current, prev_longest,
                    new_current, new_longest, record_date, record_completed, record_value
             FROM audit_entries WHERE habit_id = ?1 ORDER BY sequence ASC",
        )?;
        let rows = stmt.query_map(params![habit_id], row_to_audit)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(decode_error("audit_entries"))
    }
}
