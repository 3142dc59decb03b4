//! Reverse-chronological paging over a habit's ledger.
//!
//! Pages are keyed by date: a [`HistoryCursor`] holds the date of the last
//! record already seen, and the next page starts strictly before it. Cursors
//! are plain dates, so a caller can persist one and resume later.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine::HabitEngine;
use crate::error::{Result, ValidationError};
use crate::habit::{HabitId, HabitRecord};

/// Exclusive upper bound for the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryCursor(NaiveDate);

impl HistoryCursor {
    pub fn before(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for HistoryCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for HistoryCursor {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|e| ValidationError::invalid("cursor", e.to_string()))
    }
}

/// One page of records, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub records: Vec<HabitRecord>,
    /// Cursor for the following page; `None` once the ledger is exhausted.
    pub next_cursor: Option<HistoryCursor>,
}

/// Lazy iterator over a habit's records, newest first.
///
/// Fetches one page at a time. [`HistoryIter::resume_cursor`] returns a cursor
/// that restarts the sequence right after the last yielded record.
pub struct HistoryIter<'a> {
    engine: &'a HabitEngine,
    habit_id: HabitId,
    page_size: usize,
    next: Option<HistoryCursor>,
    last_yielded: Option<HistoryCursor>,
    buffer: VecDeque<HabitRecord>,
    exhausted: bool,
}

impl<'a> HistoryIter<'a> {
    pub(crate) fn new(
        engine: &'a HabitEngine,
        habit_id: &str,
        page_size: usize,
        cursor: Option<HistoryCursor>,
    ) -> Self {
        Self {
            engine,
            habit_id: habit_id.to_string(),
            page_size,
            next: cursor,
            last_yielded: cursor,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn resume_cursor(&self) -> Option<HistoryCursor> {
        self.last_yielded
    }

    fn fill(&mut self) -> Result<()> {
        let page = self
            .engine
            .get_historical_records(&self.habit_id, self.next, self.page_size)?;
        self.exhausted = page.next_cursor.is_none();
        self.next = page.next_cursor;
        self.buffer.extend(page.records);
        Ok(())
    }
}

impl Iterator for HistoryIter<'_> {
    type Item = Result<HabitRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        let record = self.buffer.pop_front()?;
        self.last_yielded = Some(HistoryCursor::before(record.date));
        Some(Ok(record))
    }
}

impl fmt::Debug for HistoryIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryIter")
            .field("habit_id", &self.habit_id)
            .field("page_size", &self.page_size)
            .field("next", &self.next)
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
