//! Read-only ledger and audit commands.

use clap::Args;
use habitroom_core::{HabitRecord, HistoryCursor};

use super::{open_engine, print_json, CliResult};

#[derive(Args)]
pub struct HistoryArgs {
    /// Habit ID
    pub habit_id: String,
    /// Resume before this date (the `next_cursor` of a previous page)
    #[arg(long)]
    pub cursor: Option<String>,
    /// Page size (default: history.default_page_size)
    #[arg(long)]
    pub limit: Option<usize>,
    /// Print every record instead of one page
    #[arg(long)]
    pub all: bool,
}

pub fn run(args: HistoryArgs, today: Option<&str>) -> CliResult {
    let engine = open_engine(today)?;
    let cursor = args
        .cursor
        .as_deref()
        .map(str::parse::<HistoryCursor>)
        .transpose()?;
    let limit = args
        .limit
        .unwrap_or(engine.config().history.default_page_size);

    if args.all {
        let records = engine
            .history_iter_from(&args.habit_id, cursor, limit)
            .collect::<Result<Vec<HabitRecord>, _>>()?;
        return print_json(&records);
    }

    let page = engine.get_historical_records(&args.habit_id, cursor, limit)?;
    print_json(&page)
}

pub fn run_audit(habit_id: &str, today: Option<&str>) -> CliResult {
    let engine = open_engine(today)?;
    let entries = engine.get_audit_history(habit_id)?;
    for entry in &entries {
        tracing::debug!(sequence = entry.sequence, "{}", entry.description());
    }
    print_json(&entries)
}
