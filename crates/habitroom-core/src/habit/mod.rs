//! Habit and ledger record model.
//!
//! A [`Habit`] owns its periodicity rule and the cached streak derived from its
//! records. The cached [`StreakState`] is crate-private: outside code can read
//! it, but only the engine's write gate replaces it.

mod rules;
mod schedule;

pub use rules::{CustomRule, EveryNDays, RuleRegistry};
pub use schedule::{MonthlyOverflow, Scheduler};

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Unique identifier for a habit.
pub type HabitId = String;

/// Kind of record a habit expects each obligated day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HabitType {
    /// Done / not done.
    Check,
    /// Progress counted in integral units (steps, ml, minutes).
    Numeric { target_value: i64 },
}

impl HabitType {
    /// Whether `record` fulfils the day's obligation.
    pub fn is_fulfilled(&self, record: &HabitRecord) -> bool {
        match self {
            HabitType::Check => record.completed,
            HabitType::Numeric { target_value } => {
                record.value.unwrap_or(0) >= *target_value
            }
        }
    }

    pub fn target_value(&self) -> Option<i64> {
        match self {
            HabitType::Check => None,
            HabitType::Numeric { target_value } => Some(*target_value),
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            HabitType::Check => "CHECK",
            HabitType::Numeric { .. } => "NUMERIC",
        }
    }
}

/// Set of weekdays, stored as a bitmask with Monday in bit 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Weekday>", into = "Vec<Weekday>")]
pub struct WeekDays(u8);

impl WeekDays {
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x7f)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        (0..7u8)
            .filter(move |bit| self.0 & (1 << bit) != 0)
            .filter_map(|bit| Weekday::try_from(bit).ok())
    }
}

impl FromIterator<Weekday> for WeekDays {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut days = WeekDays::default();
        for day in iter {
            days.insert(day);
        }
        days
    }
}

impl From<Vec<Weekday>> for WeekDays {
    fn from(days: Vec<Weekday>) -> Self {
        days.into_iter().collect()
    }
}

impl From<WeekDays> for Vec<Weekday> {
    fn from(days: WeekDays) -> Self {
        days.iter().collect()
    }
}

/// Rule deciding which days are obligated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Periodicity {
    Daily,
    Weekly { week_days: WeekDays },
    /// Anchor day of month, `1..=31`.
    Monthly { anchor_day: u32 },
    /// Key of an evaluator in the [`RuleRegistry`].
    Custom { rule: String },
}

impl Periodicity {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Periodicity::Daily => "DAILY",
            Periodicity::Weekly { .. } => "WEEKLY",
            Periodicity::Monthly { .. } => "MONTHLY",
            Periodicity::Custom { .. } => "CUSTOM",
        }
    }

    fn validate(&self, rules: &RuleRegistry) -> Result<(), ValidationError> {
        match self {
            Periodicity::Daily => Ok(()),
            Periodicity::Weekly { week_days } if week_days.is_empty() => Err(
                ValidationError::InvalidRule("weekly habits need at least one week day".into()),
            ),
            Periodicity::Weekly { .. } => Ok(()),
            Periodicity::Monthly { anchor_day } if !(1..=31).contains(anchor_day) => Err(
                ValidationError::InvalidRule(format!("anchor day {anchor_day} is not in 1..=31")),
            ),
            Periodicity::Monthly { .. } => Ok(()),
            Periodicity::Custom { rule } if !rules.contains(rule) => Err(
                ValidationError::InvalidRule(format!("unknown custom rule '{rule}'")),
            ),
            Periodicity::Custom { .. } => Ok(()),
        }
    }
}

/// Derived streak figures exposed to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSnapshot {
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// Cached calculator state stored on the habit.
///
/// `evaluated_through` is the as-of date the figures were computed for;
/// `None` means nothing has been evaluated yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub evaluated_through: Option<NaiveDate>,
}

impl StreakState {
    pub fn snapshot(&self) -> StreakSnapshot {
        StreakSnapshot {
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
        }
    }
}

/// Parameters for a new habit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHabit {
    pub owner_id: String,
    pub name: String,
    pub habit_type: HabitType,
    pub periodicity: Periodicity,
    pub creation_date: NaiveDate,
}

impl NewHabit {
    pub fn daily(owner_id: &str, name: &str, creation_date: NaiveDate) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            habit_type: HabitType::Check,
            periodicity: Periodicity::Daily,
            creation_date,
        }
    }

    pub fn with_type(mut self, habit_type: HabitType) -> Self {
        self.habit_type = habit_type;
        self
    }

    pub fn with_periodicity(mut self, periodicity: Periodicity) -> Self {
        self.periodicity = periodicity;
        self
    }
}

/// Edit to a habit's obligation rules. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleChange {
    pub periodicity: Option<Periodicity>,
    pub target_value: Option<i64>,
    /// `Some(None)` reactivates the habit.
    pub deactivated_at: Option<Option<NaiveDate>>,
}

impl RuleChange {
    pub fn is_empty(&self) -> bool {
        self.periodicity.is_none() && self.target_value.is_none() && self.deactivated_at.is_none()
    }
}

/// A tracked habit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    pub owner_id: String,
    pub name: String,
    pub habit_type: HabitType,
    pub periodicity: Periodicity,
    pub creation_date: NaiveDate,
    pub deactivated_at: Option<NaiveDate>,
    #[serde(flatten)]
    pub(crate) streak: StreakState,
}

impl Habit {
    /// Build a habit with an empty streak.
    pub fn new(id: impl Into<HabitId>, new: NewHabit) -> Self {
        Self {
            id: id.into(),
            owner_id: new.owner_id,
            name: new.name,
            habit_type: new.habit_type,
            periodicity: new.periodicity,
            creation_date: new.creation_date,
            deactivated_at: None,
            streak: StreakState::default(),
        }
    }

    pub fn streak(&self) -> StreakSnapshot {
        self.streak.snapshot()
    }

    pub fn streak_state(&self) -> &StreakState {
        &self.streak
    }

    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        date >= self.creation_date && self.deactivated_at.map_or(true, |end| date <= end)
    }

    /// Check the type and periodicity combination.
    pub fn validate(&self, rules: &RuleRegistry) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::invalid("name", "must not be empty"));
        }
        if let HabitType::Numeric { target_value } = self.habit_type {
            if target_value <= 0 {
                return Err(ValidationError::invalid(
                    "target_value",
                    format!("{target_value} must be positive"),
                ));
            }
        }
        if let Some(end) = self.deactivated_at {
            if end < self.creation_date {
                return Err(ValidationError::invalid(
                    "deactivated_at",
                    format!("{end} precedes creation date {}", self.creation_date),
                ));
            }
        }
        self.periodicity.validate(rules)
    }

    /// Apply `change` and report whether the numeric target moved.
    pub(crate) fn apply_rule_change(&mut self, change: &RuleChange) -> Result<bool, ValidationError> {
        let mut target_changed = false;
        if let Some(periodicity) = &change.periodicity {
            self.periodicity = periodicity.clone();
        }
        if let Some(target) = change.target_value {
            match &mut self.habit_type {
                HabitType::Numeric { target_value } => {
                    target_changed = *target_value != target;
                    *target_value = target;
                }
                HabitType::Check => {
                    return Err(ValidationError::WrongHabitType {
                        habit_id: self.id.clone(),
                        expected: "NUMERIC",
                    })
                }
            }
        }
        if let Some(deactivated_at) = change.deactivated_at {
            self.deactivated_at = deactivated_at;
        }
        Ok(target_changed)
    }
}

/// One ledger entry: the state of a habit on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitRecord {
    pub habit_id: HabitId,
    pub date: NaiveDate,
    pub completed: bool,
    /// Accumulated progress; `None` for CHECK habits.
    pub value: Option<i64>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl HabitRecord {
    pub fn check(habit_id: &str, date: NaiveDate, completed: bool, at: DateTime<Utc>) -> Self {
        Self {
            habit_id: habit_id.to_string(),
            date,
            completed,
            value: None,
            notes: None,
            updated_at: at,
        }
    }

    pub fn numeric(habit_id: &str, date: NaiveDate, value: i64, target: i64, at: DateTime<Utc>) -> Self {
        Self {
            habit_id: habit_id.to_string(),
            date,
            completed: value >= target,
            value: Some(value),
            notes: None,
            updated_at: at,
        }
    }
}

/// Number of days in the month containing `date`.
pub(crate) fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = (date.year(), date.month());
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn week_days_bitmask() {
        let days: WeekDays = [Weekday::Mon, Weekday::Wed, Weekday::Fri].into_iter().collect();
        assert_eq!(days.bits(), 0b0010101);
        assert!(days.contains(Weekday::Wed));
        assert!(!days.contains(Weekday::Tue));
        assert_eq!(
            days.iter().collect::<Vec<_>>(),
            vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]
        );
    }

    #[test]
    fn week_days_serialize_as_names() {
        let days: WeekDays = [Weekday::Sun, Weekday::Mon].into_iter().collect();
        let json = serde_json::to_string(&days).unwrap();
        assert_eq!(json, r#"["Mon","Sun"]"#);
        let back: WeekDays = serde_json::from_str(&json).unwrap();
        assert_eq!(back, days);
    }

    #[test]
    fn numeric_criterion_uses_target() {
        let kind = HabitType::Numeric { target_value: 10_000 };
        let at = Utc::now();
        assert!(!kind.is_fulfilled(&HabitRecord::numeric("h", date(2024, 1, 1), 9_999, 10_000, at)));
        assert!(kind.is_fulfilled(&HabitRecord::numeric("h", date(2024, 1, 1), 10_000, 10_000, at)));
    }

    #[test]
    fn validate_rejects_bad_combinations() {
        let rules = RuleRegistry::default();
        let base = NewHabit::daily("me", "Read", date(2024, 1, 1));

        let weekly = Habit::new("a", base.clone().with_periodicity(Periodicity::Weekly {
            week_days: WeekDays::default(),
        }));
        assert!(weekly.validate(&rules).is_err());

        let monthly = Habit::new("b", base.clone().with_periodicity(Periodicity::Monthly { anchor_day: 32 }));
        assert!(monthly.validate(&rules).is_err());

        let numeric = Habit::new("c", base.clone().with_type(HabitType::Numeric { target_value: 0 }));
        assert!(numeric.validate(&rules).is_err());

        let custom = Habit::new("d", base.clone().with_periodicity(Periodicity::Custom {
            rule: "lunar".into(),
        }));
        assert!(custom.validate(&rules).is_err());

        assert!(Habit::new("e", base).validate(&rules).is_ok());
    }

    #[test]
    fn target_change_on_check_habit_is_rejected() {
        let mut habit = Habit::new("a", NewHabit::daily("me", "Read", date(2024, 1, 1)));
        let change = RuleChange {
            target_value: Some(5),
            ..Default::default()
        };
        assert!(habit.apply_rule_change(&change).is_err());
    }

    #[test]
    fn month_lengths() {
        assert_eq!(days_in_month(date(2024, 2, 10)), 29);
        assert_eq!(days_in_month(date(2023, 2, 10)), 28);
        assert_eq!(days_in_month(date(2024, 4, 1)), 30);
        assert_eq!(days_in_month(date(2024, 12, 31)), 31);
    }
}
