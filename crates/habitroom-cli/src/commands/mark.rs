//! Ledger mutation commands: mark, retro and progress.

use clap::Args;

use super::{date_or_today, open_engine, parse_date, print_json, CliResult};

#[derive(Args)]
pub struct MarkArgs {
    /// Habit ID
    pub habit_id: String,
    /// Day to mark (default: today)
    #[arg(long)]
    pub date: Option<String>,
    /// Record the day as not done
    #[arg(long)]
    pub undone: bool,
    /// Attach a note to the day
    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Args)]
pub struct ProgressArgs {
    /// Habit ID
    pub habit_id: String,
    /// Units to add; negative values subtract
    #[arg(allow_hyphen_values = true)]
    pub delta: i64,
    /// Day to update (default: today)
    #[arg(long)]
    pub date: Option<String>,
}

pub fn run_mark(args: MarkArgs, today: Option<&str>) -> CliResult {
    let engine = open_engine(today)?;
    let date = date_or_today(&engine, args.date.as_deref())?;
    let update = match args.note.as_deref() {
        Some(note) => engine.mark_day_with_notes(&args.habit_id, date, !args.undone, note)?,
        None => engine.mark_day(&args.habit_id, date, !args.undone)?,
    };
    print_json(&update)
}

pub fn run_retro(args: MarkArgs, today: Option<&str>) -> CliResult {
    let engine = open_engine(today)?;
    let date = match args.date.as_deref() {
        Some(date) => parse_date(date)?,
        None => return Err("--date is required for retroactive marks".into()),
    };
    let update = match args.note.as_deref() {
        Some(note) => {
            engine.mark_retroactively_with_notes(&args.habit_id, date, !args.undone, note)?
        }
        None => engine.mark_retroactively(&args.habit_id, date, !args.undone)?,
    };
    print_json(&update)
}

pub fn run_progress(args: ProgressArgs, today: Option<&str>) -> CliResult {
    let engine = open_engine(today)?;
    let date = date_or_today(&engine, args.date.as_deref())?;
    let update = engine.update_progress(&args.habit_id, date, args.delta)?;
    print_json(&update)
}
