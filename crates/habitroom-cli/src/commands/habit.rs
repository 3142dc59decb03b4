//! Habit management commands for CLI.

use chrono::{Datelike, Weekday};
use clap::{Subcommand, ValueEnum};
use habitroom_core::{HabitType, NewHabit, Periodicity, RuleChange, WeekDays};

use super::{date_or_today, open_engine, print_json, CliResult};

#[derive(Clone, Copy, ValueEnum)]
pub enum Kind {
    Check,
    Numeric,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Every {
    Daily,
    Weekly,
    Monthly,
    Custom,
}

#[derive(Subcommand)]
pub enum HabitAction {
    /// Create a new habit
    Create {
        /// Display name
        name: String,
        /// Owner ID
        #[arg(long, default_value = "local")]
        owner: String,
        /// Habit type
        #[arg(long = "type", value_enum, default_value = "check")]
        kind: Kind,
        /// Daily target for numeric habits
        #[arg(long)]
        target: Option<i64>,
        /// Periodicity rule
        #[arg(long, value_enum, default_value = "daily")]
        every: Every,
        /// Comma-separated week days for weekly habits (e.g. "mon,wed,fri")
        #[arg(long)]
        days: Option<String>,
        /// Day of month for monthly habits (default: creation day)
        #[arg(long)]
        anchor_day: Option<u32>,
        /// Rule key for custom habits (e.g. "every:3")
        #[arg(long)]
        rule: Option<String>,
        /// Creation date (default: today)
        #[arg(long)]
        created: Option<String>,
    },
    /// List habits
    List {
        /// Filter by owner ID
        #[arg(long)]
        owner: Option<String>,
    },
    /// Get habit details
    Get {
        /// Habit ID
        id: String,
        /// Fail unless the habit belongs to this owner
        #[arg(long)]
        owner: Option<String>,
    },
    /// Stop obligations after a date
    Deactivate {
        /// Habit ID
        id: String,
        /// Last active day (default: today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Change obligation rules and replay the ledger
    Rules {
        /// Habit ID
        id: String,
        /// New periodicity rule
        #[arg(long, value_enum)]
        every: Option<Every>,
        /// Comma-separated week days for weekly habits
        #[arg(long)]
        days: Option<String>,
        /// Day of month for monthly habits
        #[arg(long)]
        anchor_day: Option<u32>,
        /// Rule key for custom habits
        #[arg(long)]
        rule: Option<String>,
        /// New target for numeric habits
        #[arg(long)]
        target: Option<i64>,
        /// Clear the deactivation date
        #[arg(long)]
        reactivate: bool,
    },
}

fn parse_days(days: &str) -> Result<WeekDays, Box<dyn std::error::Error>> {
    days.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Weekday>()
                .map_err(|_| Box::<dyn std::error::Error>::from(format!("invalid week day: {s}")))
        })
        .collect()
}

fn periodicity(
    every: Every,
    days: Option<String>,
    anchor_day: Option<u32>,
    rule: Option<String>,
    default_anchor: u32,
) -> Result<Periodicity, Box<dyn std::error::Error>> {
    Ok(match every {
        Every::Daily => Periodicity::Daily,
        Every::Weekly => Periodicity::Weekly {
            week_days: parse_days(&days.ok_or("--days is required for weekly habits")?)?,
        },
        Every::Monthly => Periodicity::Monthly {
            anchor_day: anchor_day.unwrap_or(default_anchor),
        },
        Every::Custom => Periodicity::Custom {
            rule: rule.ok_or("--rule is required for custom habits")?,
        },
    })
}

pub fn run(action: HabitAction, today: Option<&str>) -> CliResult {
    let engine = open_engine(today)?;

    match action {
        HabitAction::Create {
            name,
            owner,
            kind,
            target,
            every,
            days,
            anchor_day,
            rule,
            created,
        } => {
            let creation_date = date_or_today(&engine, created.as_deref())?;
            let habit_type = match kind {
                Kind::Check => HabitType::Check,
                Kind::Numeric => HabitType::Numeric {
                    target_value: target.ok_or("--target is required for numeric habits")?,
                },
            };
            let periodicity = periodicity(every, days, anchor_day, rule, creation_date.day())?;
            let habit = engine.create_habit(
                NewHabit::daily(&owner, &name, creation_date)
                    .with_type(habit_type)
                    .with_periodicity(periodicity),
            )?;
            eprintln!("Habit created: {}", habit.id);
            print_json(&habit)?;
        }
        HabitAction::List { owner } => {
            let habits = engine.list_habits(owner.as_deref())?;
            print_json(&habits)?;
        }
        HabitAction::Get { id, owner } => {
            let habit = match owner {
                Some(owner) => engine.get_owned_habit(&owner, &id)?,
                None => engine.get_habit(&id)?,
            };
            print_json(&habit)?;
        }
        HabitAction::Deactivate { id, date } => {
            let date = date_or_today(&engine, date.as_deref())?;
            let habit = engine.deactivate(&id, date)?;
            print_json(&habit)?;
        }
        HabitAction::Rules {
            id,
            every,
            days,
            anchor_day,
            rule,
            target,
            reactivate,
        } => {
            let periodicity = match every {
                Some(every) => {
                    let current = engine.get_habit(&id)?;
                    Some(periodicity(every, days, anchor_day, rule, current.creation_date.day())?)
                }
                None => None,
            };
            let change = RuleChange {
                periodicity,
                target_value: target,
                deactivated_at: reactivate.then_some(None),
            };
            let habit = engine.update_rules(&id, change)?;
            print_json(&habit)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_days_parse_from_short_and_long_names() {
        let days = parse_days("mon, Wednesday,fri").unwrap();
        assert!(days.contains(Weekday::Mon));
        assert!(days.contains(Weekday::Wed));
        assert!(days.contains(Weekday::Fri));
        assert!(!days.contains(Weekday::Tue));
        assert!(parse_days("mon,someday").is_err());
    }

    #[test]
    fn monthly_anchor_defaults_to_creation_day() {
        let p = periodicity(Every::Monthly, None, None, None, 17).unwrap();
        assert_eq!(p, Periodicity::Monthly { anchor_day: 17 });
        assert!(periodicity(Every::Weekly, None, None, None, 1).is_err());
    }
}
