use clap::Subcommand;

use super::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum StreakAction {
    /// Show the stored streak
    Show {
        /// Habit ID
        habit_id: String,
    },
    /// Roll the streak forward to today without marking anything
    Refresh {
        /// Habit ID
        habit_id: String,
    },
}

pub fn run(action: StreakAction, today: Option<&str>) -> CliResult {
    let engine = open_engine(today)?;

    match action {
        StreakAction::Show { habit_id } => print_json(&engine.get_streak_snapshot(&habit_id)?),
        StreakAction::Refresh { habit_id } => print_json(&engine.refresh_streak(&habit_id)?),
    }
}
