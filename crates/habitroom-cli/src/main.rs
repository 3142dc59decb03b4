use clap::{Parser, Subcommand};
use habitroom_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "habitroom-cli", version, about = "Habitroom CLI")]
struct Cli {
    /// Treat this date (YYYY-MM-DD) as today instead of the system date
    #[arg(long, global = true)]
    today: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Habit management
    Habit {
        #[command(subcommand)]
        action: commands::habit::HabitAction,
    },
    /// Mark a day as done (or not done)
    Mark(commands::mark::MarkArgs),
    /// Correct a past day and replay the whole ledger
    Retro(commands::mark::MarkArgs),
    /// Add progress to a numeric habit
    Progress(commands::mark::ProgressArgs),
    /// Streak snapshots
    Streak {
        #[command(subcommand)]
        action: commands::streak::StreakAction,
    },
    /// Browse records, newest first
    History(commands::history::HistoryArgs),
    /// Show the audit trail of streak changes
    Audit {
        /// Habit ID
        habit_id: String,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Log to stderr so JSON on stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("HABITROOM_LOG")
        .unwrap_or_else(|_| EnvFilter::new(Config::load_or_default().log.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let today = cli.today.as_deref();
    let result = match cli.command {
        Commands::Habit { action } => commands::habit::run(action, today),
        Commands::Mark(args) => commands::mark::run_mark(args, today),
        Commands::Retro(args) => commands::mark::run_retro(args, today),
        Commands::Progress(args) => commands::mark::run_progress(args, today),
        Commands::Streak { action } => commands::streak::run(action, today),
        Commands::History(args) => commands::history::run(args, today),
        Commands::Audit { habit_id } => commands::history::run_audit(&habit_id, today),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
