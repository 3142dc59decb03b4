//! Scheduling predicate: is a calendar date an obligated day for a habit.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{days_in_month, Habit, Periodicity, RuleRegistry};

/// What a MONTHLY habit does in months shorter than its anchor day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthlyOverflow {
    /// Fall on the month's last day (anchor 31 -> Feb 28/29, Apr 30).
    #[default]
    Clamp,
    /// No obligation in that month.
    Skip,
}

/// Evaluates obligations relative to a fixed "today".
#[derive(Debug, Clone, Copy)]
pub struct Scheduler<'a> {
    rules: &'a RuleRegistry,
    overflow: MonthlyOverflow,
    today: NaiveDate,
}

impl<'a> Scheduler<'a> {
    pub fn new(rules: &'a RuleRegistry, overflow: MonthlyOverflow, today: NaiveDate) -> Self {
        Self {
            rules,
            overflow,
            today,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Whether `habit` requires an action on `date`.
    ///
    /// Dates before the creation date, after deactivation, or after today are
    /// never obligated.
    pub fn is_obligated(&self, habit: &Habit, date: NaiveDate) -> bool {
        if date > self.today || !habit.is_active_on(date) {
            return false;
        }
        match &habit.periodicity {
            Periodicity::Daily => true,
            Periodicity::Weekly { week_days } => week_days.contains(date.weekday()),
            Periodicity::Monthly { anchor_day } => self.is_anchor_day(*anchor_day, date),
            Periodicity::Custom { rule } => self.rules.evaluate(rule, habit, date).unwrap_or(false),
        }
    }

    fn is_anchor_day(&self, anchor_day: u32, date: NaiveDate) -> bool {
        let last = days_in_month(date);
        if anchor_day <= last {
            return date.day() == anchor_day;
        }
        match self.overflow {
            MonthlyOverflow::Clamp => date.day() == last,
            MonthlyOverflow::Skip => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::{NewHabit, WeekDays};
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn habit(periodicity: Periodicity) -> Habit {
        Habit::new(
            "h",
            NewHabit::daily("me", "Run", date(2024, 1, 1)).with_periodicity(periodicity),
        )
    }

    #[test]
    fn daily_is_bounded_by_creation_today_and_deactivation() {
        let rules = RuleRegistry::default();
        let scheduler = Scheduler::new(&rules, MonthlyOverflow::Clamp, date(2024, 3, 1));
        let mut h = habit(Periodicity::Daily);

        assert!(!scheduler.is_obligated(&h, date(2023, 12, 31)));
        assert!(scheduler.is_obligated(&h, date(2024, 1, 1)));
        assert!(scheduler.is_obligated(&h, date(2024, 3, 1)));
        assert!(!scheduler.is_obligated(&h, date(2024, 3, 2)));

        h.deactivated_at = Some(date(2024, 2, 10));
        assert!(scheduler.is_obligated(&h, date(2024, 2, 10)));
        assert!(!scheduler.is_obligated(&h, date(2024, 2, 11)));
    }

    #[test]
    fn weekly_matches_week_days() {
        let rules = RuleRegistry::default();
        let scheduler = Scheduler::new(&rules, MonthlyOverflow::Clamp, date(2024, 12, 31));
        let week_days: WeekDays = [Weekday::Mon, Weekday::Wed, Weekday::Fri].into_iter().collect();
        let h = habit(Periodicity::Weekly { week_days });

        // 2024-01-01 is a Monday.
        assert!(scheduler.is_obligated(&h, date(2024, 1, 1)));
        assert!(!scheduler.is_obligated(&h, date(2024, 1, 2)));
        assert!(scheduler.is_obligated(&h, date(2024, 1, 3)));
        assert!(scheduler.is_obligated(&h, date(2024, 1, 5)));
        assert!(!scheduler.is_obligated(&h, date(2024, 1, 6)));
    }

    #[test]
    fn monthly_anchor_clamps_to_month_end() {
        let rules = RuleRegistry::default();
        let scheduler = Scheduler::new(&rules, MonthlyOverflow::Clamp, date(2024, 12, 31));
        let h = habit(Periodicity::Monthly { anchor_day: 31 });

        assert!(scheduler.is_obligated(&h, date(2024, 1, 31)));
        assert!(scheduler.is_obligated(&h, date(2024, 2, 29)));
        assert!(!scheduler.is_obligated(&h, date(2024, 2, 28)));
        assert!(scheduler.is_obligated(&h, date(2024, 4, 30)));
    }

    #[test]
    fn monthly_anchor_skip_policy() {
        let rules = RuleRegistry::default();
        let scheduler = Scheduler::new(&rules, MonthlyOverflow::Skip, date(2024, 12, 31));
        let h = habit(Periodicity::Monthly { anchor_day: 30 });

        assert!(scheduler.is_obligated(&h, date(2024, 1, 30)));
        assert!(!scheduler.is_obligated(&h, date(2024, 2, 29)));
        assert!(scheduler.is_obligated(&h, date(2024, 3, 30)));
    }

    #[test]
    fn unknown_custom_rule_is_never_obligated() {
        let rules = RuleRegistry::default();
        let scheduler = Scheduler::new(&rules, MonthlyOverflow::Clamp, date(2024, 12, 31));
        let h = habit(Periodicity::Custom { rule: "nope".into() });
        assert!(!scheduler.is_obligated(&h, date(2024, 1, 1)));

        let h = habit(Periodicity::Custom { rule: "every:2".into() });
        assert!(scheduler.is_obligated(&h, date(2024, 1, 3)));
        assert!(!scheduler.is_obligated(&h, date(2024, 1, 4)));
    }
}
