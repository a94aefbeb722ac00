//! Discipline / Streak Analyzer
//!
//! A day *passes* when it has no missed habit (or tracks no habits) and no
//! failed quest. Streaks are runs of passing days; rows dated after the end
//! date are never looked at.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use super::calendar::DateKey;
use super::history::{
    build_daily_history, history_window_days, resolve_first_use, HistoryRow, HistorySources,
};
use super::types::PlayerState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisciplineMetrics {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub days_missed_total: u32,
    pub perfect_days_count: u32,
    pub at_risk: bool,
}

/// Compute metrics over `rows` restricted to `[start, end]`.
pub fn get_discipline_metrics(
    rows: &[HistoryRow],
    end: DateKey,
    start: Option<DateKey>,
) -> DisciplineMetrics {
    let mut window: Vec<&HistoryRow> = rows
        .iter()
        .filter(|row| row.date <= end)
        .filter(|row| start.map_or(true, |first| row.date >= first))
        .collect();
    window.sort_by_key(|row| row.date);

    let mut metrics = DisciplineMetrics::default();
    let mut running = 0u32;
    for row in &window {
        if row.record.passes() {
            running += 1;
            metrics.longest_streak = metrics.longest_streak.max(running);
        } else {
            running = 0;
            metrics.days_missed_total += 1;
        }
        if row.record.perfect_day {
            metrics.perfect_days_count += 1;
        }
    }

    metrics.current_streak = window
        .iter()
        .rev()
        .take_while(|row| row.record.passes())
        .count() as u32;

    metrics.at_risk = window
        .last()
        .filter(|row| row.date == end)
        .map_or(false, |row| row.record.shows_miss());

    metrics
}

/// Result of a discipline refresh.
#[derive(Debug, Clone)]
pub struct DisciplineSync {
    pub state: PlayerState,
    /// Live metrics including today.
    pub metrics: DisciplineMetrics,
    /// The lifetime window, newest first.
    pub rows: Vec<HistoryRow>,
}

/// Rebuild the lifetime history window and fold it into the lifetime
/// counters.
///
/// Only finalized days (before today) feed the stored counters, and each
/// counter takes the max of its stored and computed value, so a day that is
/// provisionally missed this morning cannot inflate `daysMissedTotal` for
/// good.
pub fn sync_history_and_discipline(
    state: &PlayerState,
    sources: &HistorySources<'_>,
    now: DateTime<Utc>,
    max_window_days: u32,
) -> DisciplineSync {
    let today = DateKey::from_datetime(now);
    let first_use_at = state.first_use_at;
    let first_day = DateKey::from_datetime(first_use_at);
    let days = history_window_days(first_use_at, now, max_window_days);
    let rows = build_daily_history(&state.daily_history, sources, days, today);

    let metrics = get_discipline_metrics(&rows, today, Some(first_day));
    let finalized = if first_day < today {
        get_discipline_metrics(&rows, today.pred(), Some(first_day))
    } else {
        DisciplineMetrics::default()
    };

    let mut next = state.clone();
    next.longest_streak = next
        .longest_streak
        .max(next.streak)
        .max(finalized.longest_streak);
    next.days_missed_total = next.days_missed_total.max(finalized.days_missed_total);
    next.perfect_days_count = next.perfect_days_count.max(finalized.perfect_days_count);

    debug!(
        "discipline refresh over {} days: streak {} longest {} missed {} perfect {}",
        days,
        metrics.current_streak,
        next.longest_streak,
        next.days_missed_total,
        next.perfect_days_count
    );

    DisciplineSync {
        state: next,
        metrics,
        rows,
    }
}

/// `first_use_at` for a state that lost it: the earliest record, else `now`.
pub fn backfill_first_use(
    state: &PlayerState,
    sources: &HistorySources<'_>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    resolve_first_use(&state.daily_history, sources, now).min(state.first_use_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::DailyRecord;

    fn key(s: &str) -> DateKey {
        s.parse().expect("date key")
    }

    fn row(date: &str, total: u64, missed: u64, failed: u64) -> HistoryRow {
        let mut record = DailyRecord {
            total_habits: total,
            habits_done: total - missed,
            habits_missed: missed,
            quests_failed: failed,
            ..Default::default()
        };
        record.refresh_perfect_day();
        HistoryRow {
            date: key(date),
            record,
        }
    }

    #[test]
    fn streaks_and_misses() {
        let rows = vec![
            row("2024-01-01", 2, 0, 0),
            row("2024-01-02", 2, 0, 0),
            row("2024-01-03", 2, 0, 0),
            row("2024-01-04", 2, 1, 0),
            row("2024-01-05", 0, 0, 0),
            row("2024-01-06", 2, 0, 0),
        ];
        let m = get_discipline_metrics(&rows, key("2024-01-06"), None);
        assert_eq!(m.current_streak, 2);
        assert_eq!(m.longest_streak, 3);
        assert_eq!(m.days_missed_total, 1);
        assert_eq!(m.perfect_days_count, 4);
        assert!(!m.at_risk);
    }

    #[test]
    fn quest_failure_breaks_habitless_day() {
        let rows = vec![row("2024-01-01", 0, 0, 1)];
        let m = get_discipline_metrics(&rows, key("2024-01-01"), None);
        assert_eq!(m.current_streak, 0);
        assert_eq!(m.days_missed_total, 1);
        assert!(m.at_risk);
    }

    #[test]
    fn future_and_pre_start_rows_are_ignored() {
        let rows = vec![
            row("2023-12-31", 1, 1, 0),
            row("2024-01-01", 1, 0, 0),
            row("2024-01-09", 1, 1, 0),
        ];
        let m = get_discipline_metrics(&rows, key("2024-01-02"), Some(key("2024-01-01")));
        assert_eq!(m.days_missed_total, 0);
        assert_eq!(m.current_streak, 1);
    }

    #[test]
    fn fold_never_regresses_counters() {
        let now = key("2024-01-05").start_of_day() + chrono::Duration::hours(8);
        let mut state = PlayerState::new(key("2024-01-01").start_of_day());
        state.longest_streak = 40;
        state.days_missed_total = 9;
        let sync = sync_history_and_discipline(&state, &HistorySources::default(), now, 3650);
        assert_eq!(sync.state.longest_streak, 40);
        assert_eq!(sync.state.days_missed_total, 9);
        assert_eq!(sync.rows.len(), 5);
        // no habits, no quests: every day passes
        assert_eq!(sync.metrics.current_streak, 5);
    }
}
