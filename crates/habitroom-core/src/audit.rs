//! Append-only audit trail of streak transitions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::habit::{HabitId, HabitRecord, StreakSnapshot};

/// What kind of mutation produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditKind {
    Mark,
    RetroactiveMark,
    ProgressUpdate,
    RuleChange,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Mark => "mark",
            AuditKind::RetroactiveMark => "retroactive-mark",
            AuditKind::ProgressUpdate => "progress-update",
            AuditKind::RuleChange => "rule-change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mark" => Some(AuditKind::Mark),
            "retroactive-mark" => Some(AuditKind::RetroactiveMark),
            "progress-update" => Some(AuditKind::ProgressUpdate),
            "rule-change" => Some(AuditKind::RuleChange),
            _ => None,
        }
    }
}

/// The ledger record a mutation wrote, as it was after the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    pub date: NaiveDate,
    pub completed: bool,
    pub value: Option<i64>,
}

impl From<&HabitRecord> for RecordRef {
    fn from(record: &HabitRecord) -> Self {
        Self {
            date: record.date,
            completed: record.completed,
            value: record.value,
        }
    }
}

/// One derived-state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    /// Store-assigned ordering key; 0 until appended.
    pub sequence: i64,
    pub habit_id: HabitId,
    pub kind: AuditKind,
    pub timestamp: DateTime<Utc>,
    pub previous: StreakSnapshot,
    pub current: StreakSnapshot,
    /// `None` for rule changes, which touch no single record.
    pub record: Option<RecordRef>,
}

impl AuditEntry {
    pub fn new(
        habit_id: &str,
        kind: AuditKind,
        previous: StreakSnapshot,
        current: StreakSnapshot,
        record: Option<RecordRef>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sequence: 0,
            habit_id: habit_id.to_string(),
            kind,
            timestamp,
            previous,
            current,
            record,
        }
    }

    /// Whether the transition moved either streak figure.
    pub fn changed_streak(&self) -> bool {
        self.previous != self.current
    }

    pub fn description(&self) -> String {
        let target = self
            .record
            .map(|r| r.date.to_string())
            .unwrap_or_else(|| "rules".to_string());
        format!(
            "{} {}: streak {}/{} -> {}/{}",
            self.kind.as_str(),
            target,
            self.previous.current_streak,
            self.previous.longest_streak,
            self.current.current_streak,
            self.current.longest_streak,
        )
    }
}
