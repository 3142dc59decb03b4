//! Evaluators for CUSTOM periodicity.
//!
//! A CUSTOM habit names its rule by key. Keys are resolved against a
//! [`RuleRegistry`]; the `every:N` family is built in and needs no
//! registration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;

use super::Habit;

const EVERY_PREFIX: &str = "every:";

/// Externally supplied obligation rule.
pub trait CustomRule: Send + Sync {
    /// Whether `date` is obligated for `habit`. Range checks against the
    /// creation and deactivation dates happen before this is called.
    fn is_obligated(&self, habit: &Habit, date: NaiveDate) -> bool;
}

impl<F> CustomRule for F
where
    F: Fn(&Habit, NaiveDate) -> bool + Send + Sync,
{
    fn is_obligated(&self, habit: &Habit, date: NaiveDate) -> bool {
        self(habit, date)
    }
}

/// Obligated every `N` days, counting from the creation date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EveryNDays(pub u32);

impl EveryNDays {
    /// Parse an `every:N` key.
    pub fn parse(key: &str) -> Option<Self> {
        let n: u32 = key.strip_prefix(EVERY_PREFIX)?.trim().parse().ok()?;
        (n > 0).then_some(Self(n))
    }
}

impl CustomRule for EveryNDays {
    fn is_obligated(&self, habit: &Habit, date: NaiveDate) -> bool {
        let offset = (date - habit.creation_date).num_days();
        offset >= 0 && offset % i64::from(self.0) == 0
    }
}

/// Named custom rules available to the scheduler.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<String, Arc<dyn CustomRule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `rule` under `key`, replacing any previous rule with that key.
    pub fn register(&mut self, key: impl Into<String>, rule: impl CustomRule + 'static) {
        self.rules.insert(key.into(), Arc::new(rule));
    }

    pub fn with_rule(mut self, key: impl Into<String>, rule: impl CustomRule + 'static) -> Self {
        self.register(key, rule);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.rules.contains_key(key) || EveryNDays::parse(key).is_some()
    }

    /// Evaluate the rule named `key`; `None` when the key is unknown.
    pub fn evaluate(&self, key: &str, habit: &Habit, date: NaiveDate) -> Option<bool> {
        if let Some(rule) = self.rules.get(key) {
            return Some(rule.is_obligated(habit, date));
        }
        EveryNDays::parse(key).map(|rule| rule.is_obligated(habit, date))
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.rules.keys().collect();
        keys.sort();
        f.debug_struct("RuleRegistry").field("rules", &keys).finish()
    }
}
