mod calculator;

pub use calculator::{ReplayMode, StreakCalculator};
