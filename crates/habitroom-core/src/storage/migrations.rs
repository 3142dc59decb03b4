//! Database schema migrations for habitroom.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 1;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get::<_, i32>(0),
    )
}

/// Replace the recorded schema version inside `conn`'s current transaction.
fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: habits, the per-day record ledger and the audit trail.
///
/// - `habits` caches the derived streak next to the obligation rule; the
///   CHECK constraint backs the `longest >= current >= 0` invariant.
/// - `habit_records` holds one row per (habit, day). `progress` is the signed
///   sum of every numeric delta; `value` is that sum floored at zero.
/// - `audit_entries` is append-only; triggers abort any UPDATE or DELETE.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS habits (
            id                TEXT PRIMARY KEY,
            owner_id          TEXT NOT NULL,
            name              TEXT NOT NULL,
            habit_type        TEXT NOT NULL,
            target_value      INTEGER,
            periodicity       TEXT NOT NULL,
            week_days         INTEGER,
            anchor_day        INTEGER,
            custom_rule       TEXT,
            creation_date     TEXT NOT NULL,
            deactivated_at    TEXT,
            current_streak    INTEGER NOT NULL DEFAULT 0,
            longest_streak    INTEGER NOT NULL DEFAULT 0,
            evaluated_through TEXT,
            created_at        TEXT NOT NULL,
            CHECK (current_streak >= 0 AND longest_streak >= current_streak)
        );

        CREATE TABLE IF NOT EXISTS habit_records (
            habit_id   TEXT NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
            date       TEXT NOT NULL,
            completed  INTEGER NOT NULL DEFAULT 0,
            value      INTEGER,
            progress   INTEGER,
            notes      TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (habit_id, date)
        );

        CREATE TABLE IF NOT EXISTS audit_entries (
            sequence         INTEGER PRIMARY KEY AUTOINCREMENT,
            id               TEXT NOT NULL UNIQUE,
            habit_id         TEXT NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
            kind             TEXT NOT NULL,
            created_at       TEXT NOT NULL,
            prev_current     INTEGER NOT NULL,
            prev_longest     INTEGER NOT NULL,
            new_current      INTEGER NOT NULL,
            new_longest      INTEGER NOT NULL,
            record_date      TEXT,
            record_completed INTEGER,
            record_value     INTEGER
        );

        CREATE TRIGGER IF NOT EXISTS audit_entries_no_update
        BEFORE UPDATE ON audit_entries
        BEGIN
            SELECT RAISE(ABORT, 'audit entries are append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS audit_entries_no_delete
        BEFORE DELETE ON audit_entries
        BEGIN
            SELECT RAISE(ABORT, 'audit entries are append-only');
        END;

        CREATE INDEX IF NOT EXISTS idx_habits_owner ON habits(owner_id);
        CREATE INDEX IF NOT EXISTS idx_audit_entries_habit ON audit_entries(habit_id, sequence);",
    )?;

    set_schema_version(&tx, 1)?;

    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn audit_rows_cannot_be_changed() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO habits (id, owner_id, name, habit_type, periodicity, creation_date, created_at)
             VALUES ('h', 'me', 'Read', 'CHECK', 'DAILY', '2024-01-01', '2024-01-01T00:00:00+00:00');
             INSERT INTO audit_entries (id, habit_id, kind, created_at, prev_current, prev_longest, new_current, new_longest)
             VALUES ('a', 'h', 'mark', '2024-01-01T00:00:00+00:00', 0, 0, 1, 1);",
        )
        .unwrap();

        assert!(conn.execute("UPDATE audit_entries SET new_current = 5", []).is_err());
        assert!(conn.execute("DELETE FROM audit_entries", []).is_err());
    }

    #[test]
    fn streak_invariant_is_enforced_by_schema() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO habits (id, owner_id, name, habit_type, periodicity, creation_date, created_at,
                                 current_streak, longest_streak)
             VALUES ('h', 'me', 'Read', 'CHECK', 'DAILY', '2024-01-01', '2024-01-01T00:00:00+00:00', 3, 2)",
            [],
        );
        assert!(result.is_err());
    }
}
