pub mod config;
pub mod habit;
pub mod history;
pub mod mark;
pub mod streak;

use std::sync::Arc;

use chrono::NaiveDate;
use habitroom_core::{Config, FixedClock, HabitEngine};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Parse a `YYYY-MM-DD` argument.
pub fn parse_date(value: &str) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{value}' (expected YYYY-MM-DD): {e}").into())
}

/// Open the engine on the default database, pinning the clock when `--today`
/// was given.
pub fn open_engine(today: Option<&str>) -> Result<HabitEngine, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let engine = HabitEngine::open(config)?;
    Ok(match today {
        Some(date) => engine.with_clock(Arc::new(FixedClock::new(parse_date(date)?))),
        None => engine,
    })
}

/// Resolve an optional date argument against the engine's today.
pub fn date_or_today(engine: &HabitEngine, date: Option<&str>) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    match date {
        Some(date) => parse_date(date),
        None => Ok(engine.today()),
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
