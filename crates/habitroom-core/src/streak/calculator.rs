//! Streak computation over a habit's record ledger.
//!
//! The calculator walks calendar days in ascending order, keeping a running
//! count of consecutive fulfilled obligations and the best run seen so far.
//! Days that are not obligated leave the running count untouched; an
//! obligated day without a fulfilling record resets it.
//!
//! Two entry points share one scan:
//! - [`StreakCalculator::full_replay`] starts from the creation date.
//! - [`StreakCalculator::extend`] resumes after a cached state's
//!   `evaluated_through` date. Valid only when no record at or before that
//!   date changed since the state was computed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::habit::{Habit, HabitRecord, Scheduler, StreakState};

/// How a mutation is folded into the cached streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReplayMode {
    /// Resume from the cached state, scanning `resume_from..=as_of`.
    Incremental { resume_from: NaiveDate },
    /// Rescan from the creation date.
    Full,
}

impl ReplayMode {
    /// Pick the cheapest path that still yields the full-replay result.
    ///
    /// `edited` is the ledger date the mutation touched, if any. Incremental
    /// extension needs a cached tail strictly before the edit and an as-of
    /// date that has not moved backwards.
    pub fn select(cached: &StreakState, edited: Option<NaiveDate>, as_of: NaiveDate) -> Self {
        match cached.evaluated_through {
            Some(tail) if as_of >= tail && edited.map_or(true, |date| date > tail) => tail
                .succ_opt()
                .map_or(ReplayMode::Full, |resume_from| ReplayMode::Incremental { resume_from }),
            _ => ReplayMode::Full,
        }
    }
}

/// Computes current and longest streaks for one evaluation day.
#[derive(Debug, Clone, Copy)]
pub struct StreakCalculator<'a> {
    scheduler: &'a Scheduler<'a>,
}

impl<'a> StreakCalculator<'a> {
    pub fn new(scheduler: &'a Scheduler<'a>) -> Self {
        Self { scheduler }
    }

    /// The last day that counts towards the streak.
    ///
    /// Today is included only once it is resolved: either not obligated, or
    /// already fulfilled by `today_record`. An unmarked today never breaks the
    /// running streak.
    pub fn as_of(&self, habit: &Habit, today_record: Option<&HabitRecord>) -> NaiveDate {
        let today = self.scheduler.today();
        let resolved = !self.scheduler.is_obligated(habit, today)
            || today_record.is_some_and(|record| habit.habit_type.is_fulfilled(record));
        if resolved {
            today
        } else {
            today.pred_opt().unwrap_or(today)
        }
    }

    /// Scan `[creation_date, as_of]` from scratch.
    ///
    /// `records` must be sorted ascending by date; records outside the range
    /// are ignored.
    pub fn full_replay(&self, habit: &Habit, records: &[HabitRecord], as_of: NaiveDate) -> StreakState {
        if as_of < habit.creation_date {
            return StreakState::default();
        }
        let (running, best) = self.scan(habit, records, habit.creation_date, as_of, 0, 0);
        tracing::debug!(
            habit_id = %habit.id,
            %as_of,
            current = running,
            longest = best,
            "full streak replay"
        );
        StreakState {
            current_streak: running,
            longest_streak: best,
            evaluated_through: Some(as_of),
        }
    }

    /// Continue `cached` through `as_of`, scanning only days after its tail.
    ///
    /// Falls back to a full replay when `cached` was never evaluated, in
    /// which case `records` must cover the whole range.
    pub fn extend(
        &self,
        habit: &Habit,
        cached: &StreakState,
        records: &[HabitRecord],
        as_of: NaiveDate,
    ) -> StreakState {
        let Some(tail) = cached.evaluated_through else {
            return self.full_replay(habit, records, as_of);
        };
        let Some(from) = tail.succ_opt() else {
            return *cached;
        };
        if as_of < from {
            return *cached;
        }
        let (running, best) = self.scan(
            habit,
            records,
            from,
            as_of,
            cached.current_streak,
            cached.longest_streak,
        );
        tracing::debug!(
            habit_id = %habit.id,
            %from,
            %as_of,
            current = running,
            longest = best,
            "incremental streak extension"
        );
        StreakState {
            current_streak: running,
            longest_streak: best,
            evaluated_through: Some(as_of),
        }
    }

    fn scan(
        &self,
        habit: &Habit,
        records: &[HabitRecord],
        from: NaiveDate,
        to: NaiveDate,
        mut running: u32,
        mut best: u32,
    ) -> (u32, u32) {
        let mut pending = records
            .iter()
            .skip_while(|record| record.date < from)
            .peekable();

        for date in from.iter_days().take_while(|date| *date <= to) {
            let mut today = None;
            while let Some(record) = pending.next_if(|record| record.date <= date) {
                if record.date == date {
                    today = Some(record);
                }
            }
            if !self.scheduler.is_obligated(habit, date) {
                continue;
            }
            if today.is_some_and(|record| habit.habit_type.is_fulfilled(record)) {
                running += 1;
                best = best.max(running);
            } else {
                running = 0;
            }
        }
        (running, best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::{HabitType, MonthlyOverflow, NewHabit, Periodicity, RuleRegistry, WeekDays};
    use chrono::{Utc, Weekday};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn done(days: impl IntoIterator<Item = u32>) -> Vec<HabitRecord> {
        days.into_iter()
            .map(|d| HabitRecord::check("h", date(2024, 1, d), true, Utc::now()))
            .collect()
    }

    fn new_daily() -> NewHabit {
        NewHabit::daily("me", "Read", date(2024, 1, 1))
    }

    fn daily() -> Habit {
        Habit::new("h", new_daily())
    }

    #[test]
    fn daily_run_broken_by_a_missed_day() {
        let rules = RuleRegistry::default();
        let scheduler = Scheduler::new(&rules, MonthlyOverflow::Clamp, date(2024, 1, 10));
        let calc = StreakCalculator::new(&scheduler);
        let records = done((1..=5).chain(7..=10));

        let state = calc.full_replay(&daily(), &records, date(2024, 1, 10));
        assert_eq!(state.current_streak, 4);
        assert_eq!(state.longest_streak, 5);
        assert_eq!(state.evaluated_through, Some(date(2024, 1, 10)));
    }

    #[test]
    fn uncompleted_record_counts_as_missed() {
        let rules = RuleRegistry::default();
        let scheduler = Scheduler::new(&rules, MonthlyOverflow::Clamp, date(2024, 1, 3));
        let calc = StreakCalculator::new(&scheduler);
        let mut records = done([1, 3]);
        records.insert(1, HabitRecord::check("h", date(2024, 1, 2), false, Utc::now()));

        let state = calc.full_replay(&daily(), &records, date(2024, 1, 3));
        assert_eq!(state.current_streak, 1);
        assert_eq!(state.longest_streak, 1);
    }

    #[test]
    fn as_of_before_creation_is_empty() {
        let rules = RuleRegistry::default();
        let scheduler = Scheduler::new(&rules, MonthlyOverflow::Clamp, date(2024, 1, 1));
        let calc = StreakCalculator::new(&scheduler);

        let state = calc.full_replay(&daily(), &[], date(2023, 12, 31));
        assert_eq!(state, StreakState::default());
    }

    #[test]
    fn non_obligated_days_are_skipped() {
        let rules = RuleRegistry::default();
        let scheduler = Scheduler::new(&rules, MonthlyOverflow::Clamp, date(2024, 1, 12));
        let calc = StreakCalculator::new(&scheduler);
        let week_days: WeekDays = [Weekday::Mon, Weekday::Wed, Weekday::Fri].into_iter().collect();
        let habit = Habit::new("h", new_daily().with_periodicity(Periodicity::Weekly { week_days }));

        // Mon 1, Wed 3, Fri 5, Mon 8, Wed 10, Fri 12; Tuesday 2 is extra.
        let baseline = done([1, 3, 5, 8, 10, 12]);
        let with_tuesday = done([1, 2, 3, 5, 8, 10, 12]);

        let a = calc.full_replay(&habit, &baseline, date(2024, 1, 12));
        let b = calc.full_replay(&habit, &with_tuesday, date(2024, 1, 12));
        assert_eq!(a.snapshot(), b.snapshot());
        assert_eq!(a.current_streak, 6);
    }

    #[test]
    fn numeric_habit_needs_target() {
        let rules = RuleRegistry::default();
        let scheduler = Scheduler::new(&rules, MonthlyOverflow::Clamp, date(2024, 1, 3));
        let calc = StreakCalculator::new(&scheduler);
        let habit = Habit::new("h", new_daily().with_type(HabitType::Numeric { target_value: 100 }));
        let records = vec![
            HabitRecord::numeric("h", date(2024, 1, 1), 120, 100, Utc::now()),
            HabitRecord::numeric("h", date(2024, 1, 2), 100, 100, Utc::now()),
            HabitRecord::numeric("h", date(2024, 1, 3), 99, 100, Utc::now()),
        ];

        let state = calc.full_replay(&habit, &records, date(2024, 1, 3));
        assert_eq!(state.current_streak, 0);
        assert_eq!(state.longest_streak, 2);
    }

    #[test]
    fn extend_matches_full_replay() {
        let rules = RuleRegistry::default();
        let scheduler = Scheduler::new(&rules, MonthlyOverflow::Clamp, date(2024, 1, 10));
        let calc = StreakCalculator::new(&scheduler);
        let habit = daily();
        let records = done((1..=5).chain(7..=10));

        let cached = calc.full_replay(&habit, &records[..4], date(2024, 1, 4));
        let tail: Vec<_> = records.iter().filter(|r| r.date > date(2024, 1, 4)).cloned().collect();
        let extended = calc.extend(&habit, &cached, &tail, date(2024, 1, 10));

        assert_eq!(extended, calc.full_replay(&habit, &records, date(2024, 1, 10)));
    }

    #[test]
    fn as_of_excludes_unresolved_today() {
        let rules = RuleRegistry::default();
        let scheduler = Scheduler::new(&rules, MonthlyOverflow::Clamp, date(2024, 1, 10));
        let calc = StreakCalculator::new(&scheduler);
        let habit = daily();

        assert_eq!(calc.as_of(&habit, None), date(2024, 1, 9));
        let pending = HabitRecord::check("h", date(2024, 1, 10), false, Utc::now());
        assert_eq!(calc.as_of(&habit, Some(&pending)), date(2024, 1, 9));
        let marked = HabitRecord::check("h", date(2024, 1, 10), true, Utc::now());
        assert_eq!(calc.as_of(&habit, Some(&marked)), date(2024, 1, 10));
    }

    #[test]
    fn replay_mode_selection() {
        let cached = StreakState {
            current_streak: 3,
            longest_streak: 5,
            evaluated_through: Some(date(2024, 1, 9)),
        };
        assert_eq!(
            ReplayMode::select(&cached, Some(date(2024, 1, 10)), date(2024, 1, 10)),
            ReplayMode::Incremental { resume_from: date(2024, 1, 10) }
        );
        assert_eq!(ReplayMode::select(&cached, Some(date(2024, 1, 9)), date(2024, 1, 10)), ReplayMode::Full);
        assert_eq!(ReplayMode::select(&cached, Some(date(2024, 1, 10)), date(2024, 1, 8)), ReplayMode::Full);
        assert_eq!(
            ReplayMode::select(&StreakState::default(), Some(date(2024, 1, 10)), date(2024, 1, 10)),
            ReplayMode::Full
        );
        assert_eq!(
            ReplayMode::select(&cached, None, date(2024, 1, 12)),
            ReplayMode::Incremental { resume_from: date(2024, 1, 10) }
        );
    }
}
