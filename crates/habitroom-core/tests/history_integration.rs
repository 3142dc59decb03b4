//! Integration tests for paged, reverse-chronological history reads.

use std::sync::Arc;

use chrono::NaiveDate;
use habitroom_core::{
    Config, FixedClock, HabitDb, HabitEngine, HabitError, HistoryCursor, NewHabit, ValidationError,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Daily habit with records on January 1st through 25th.
fn engine_with_history() -> (HabitEngine, String) {
    let mut config = Config::default();
    config.history.default_page_size = 7;
    config.history.max_page_size = 20;
    let engine = HabitEngine::new(HabitDb::open_memory().unwrap())
        .with_config(config)
        .with_clock(Arc::new(FixedClock::new(date(2024, 1, 25))));
    let habit = engine
        .create_habit(NewHabit::daily("alice", "Journal", date(2024, 1, 1)))
        .unwrap();
    for day in 1..=25 {
        engine.mark_retroactively(&habit.id, date(2024, 1, day), day % 4 != 0).unwrap();
    }
    (engine, habit.id)
}

#[test]
fn test_pages_walk_backwards_without_overlap() {
    let (engine, id) = engine_with_history();

    let first = engine.get_historical_records(&id, None, 10).unwrap();
    assert_eq!(first.records.len(), 10);
    assert_eq!(first.records[0].date, date(2024, 1, 25));
    assert_eq!(first.records[9].date, date(2024, 1, 16));
    let cursor = first.next_cursor.unwrap();
    assert_eq!(cursor.date(), date(2024, 1, 16));

    let second = engine.get_historical_records(&id, Some(cursor), 10).unwrap();
    assert_eq!(second.records[0].date, date(2024, 1, 15));
    let third = engine
        .get_historical_records(&id, second.next_cursor, 10)
        .unwrap();
    assert_eq!(third.records.len(), 5);
    assert_eq!(third.records[4].date, date(2024, 1, 1));
    assert!(third.next_cursor.is_none());
}

#[test]
fn test_exact_final_page_has_no_cursor() {
    let (engine, id) = engine_with_history();
    let page = engine
        .get_historical_records(&id, Some(HistoryCursor::before(date(2024, 1, 6))), 5)
        .unwrap();
    assert_eq!(page.records.len(), 5);
    assert!(page.next_cursor.is_none());
}

#[test]
fn test_history_is_read_only() {
    let (engine, id) = engine_with_history();
    let streak = engine.get_streak_snapshot(&id).unwrap();
    let audit = engine.get_audit_history(&id).unwrap().len();

    let all: Vec<_> = engine.history_iter(&id).collect::<Result<_, _>>().unwrap();
    assert_eq!(all.len(), 25);

    assert_eq!(engine.get_streak_snapshot(&id).unwrap(), streak);
    assert_eq!(engine.get_audit_history(&id).unwrap().len(), audit);
}

#[test]
fn test_iterator_is_lazy_and_restartable() {
    let (engine, id) = engine_with_history();

    let mut iter = engine.history_iter(&id);
    let head: Vec<_> = iter.by_ref().take(9).map(Result::unwrap).collect();
    assert_eq!(head.last().unwrap().date, date(2024, 1, 17));
    let cursor = iter.resume_cursor();
    drop(iter);

    let rest: Vec<_> = engine
        .history_iter_from(&id, cursor, 4)
        .map(Result::unwrap)
        .collect();
    assert_eq!(rest.len(), 16);
    assert_eq!(rest[0].date, date(2024, 1, 16));
    assert_eq!(rest[15].date, date(2024, 1, 1));
}

#[test]
fn test_invalid_page_sizes_and_unknown_habits() {
    let (engine, id) = engine_with_history();

    for size in [0, 21] {
        let err = engine.get_historical_records(&id, None, size).unwrap_err();
        assert!(matches!(
            err,
            HabitError::Validation(ValidationError::InvalidPageSize { max: 20, .. })
        ));
    }

    let err = engine.get_historical_records("nope", None, 5).unwrap_err();
    assert!(matches!(err, HabitError::HabitNotFound(_)));

    let mut iter = engine.history_iter("nope");
    assert!(matches!(iter.next(), Some(Err(HabitError::HabitNotFound(_)))));
    assert!(iter.next().is_none());
}

#[test]
fn test_unbounded_page_size_returns_everything() {
    let (engine, id) = engine_with_history();
    let mut config = engine.config().clone();
    config.history.max_page_size = usize::MAX;
    let engine = engine.with_config(config);

    let page = engine.get_historical_records(&id, None, usize::MAX).unwrap();
    assert_eq!(page.records.len(), 25);
    assert!(page.next_cursor.is_none());
}
