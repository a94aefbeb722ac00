//! Progression and rollover engine.
//! Pure functions compute the next [`PlayerState`] from the current one;
//! [`Game`] ties them to storage and a clock, and the scheduler runs the
//! periodic jobs against a single owned `Game`.

pub mod achievement;
pub mod actions;
pub mod calendar;
pub mod coerce;
pub mod discipline;
pub mod errors;
pub mod history;
pub mod leveling;
pub mod report;
pub mod rollover;
pub mod scheduler;
pub mod state;
pub mod transaction;
pub mod types;

pub use achievement::{
    achievement_list, evaluate_unlocks, latest_unlock, AchievementStatus, UnlockMap, ACHIEVEMENTS,
};
pub use actions::{ActionOutcome, ActionRecord, GameAction, LastAction, FOCUS_BONUS_RATE};
pub use calendar::{Clock, DateKey, FixedClock, SystemClock};
pub use discipline::{
    get_discipline_metrics, sync_history_and_discipline, DisciplineMetrics, DisciplineSync,
};
pub use errors::EngineError;
pub use history::{build_daily_history, merge_daily_history, HistoryRow, HistorySources};
pub use leveling::{
    apply_xp_change, rank_from_level, xp_for_next_level, Rank, XpProgress, MAX_LEVEL,
};
pub use report::{
    build_today_snapshot, build_weekly_performance, upsert_daily_grade, DailyGrade, Grade,
    GradingHistory, TodaySnapshot, WeeklyPerformance,
};
pub use rollover::{run_rollover, RolloverOutcome, RolloverReport};
pub use scheduler::{start_scheduler, SchedulerConfig, SchedulerHandle, SchedulerStats};
pub use state::{normalize_state, Game};
pub use transaction::{
    apply_gold_transaction, apply_xp_transaction, PenaltySource, TxOptions, TxOutcome,
};
pub use types::{
    DailyRecord, Difficulty, Habit, HistoryPatch, PenaltySeverity, PlayerState, Profile, Quest,
    QuestStatus, RewardLogEntry, Settings,
};
