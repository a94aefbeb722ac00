//! Daily History Store
//!
//! The ledger is a date-keyed map of [`DailyRecord`]s written by transactions.
//! Reading a window of days goes through two layers:
//!
//! 1. an explicit ledger row for the date is authoritative, and
//! 2. only dates with no row are synthesized from raw habit, quest and
//!    reward-log records.
//!
//! Both layers are permanent; synthesis never overwrites a ledger row.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::calendar::DateKey;
use super::types::{DailyRecord, Habit, HistoryPatch, Quest, RewardLogEntry};

/// Upper bound on the lifetime window scanned by the discipline analyzer.
pub const MAX_HISTORY_WINDOW_DAYS: u32 = 3650;

pub type DailyLedger = BTreeMap<DateKey, DailyRecord>;

/// Add a patch's deltas into `record`.
pub fn apply_patch(record: &mut DailyRecord, patch: &HistoryPatch) {
    record.xp_gained = record.xp_gained.saturating_add(patch.xp_gained_delta);
    record.xp_lost = record.xp_lost.saturating_add(patch.xp_lost_delta);
    record.gold_gained = record.gold_gained.saturating_add(patch.gold_gained_delta);
    record.gold_spent = record.gold_spent.saturating_add(patch.gold_spent_delta);
    record.habits_done = record.habits_done.saturating_add(patch.habits_done_delta);
    record.habits_missed = record.habits_missed.saturating_add(patch.habits_missed_delta);
    record.quests_done = record.quests_done.saturating_add(patch.quests_done_delta);
    record.quests_failed = record.quests_failed.saturating_add(patch.quests_failed_delta);
    if let Some(total) = patch.total_habits {
        record.total_habits = total;
    }
    record.refresh_perfect_day();
}

/// Return a copy of `ledger` with the row for `date` merged with `patch`.
/// Other dates are untouched; a missing row starts from zero.
pub fn merge_daily_history(
    ledger: &DailyLedger,
    date: DateKey,
    patch: &HistoryPatch,
) -> DailyLedger {
    let mut next = ledger.clone();
    merge_in_place(&mut next, date, patch);
    next
}

pub fn merge_in_place(ledger: &mut DailyLedger, date: DateKey, patch: &HistoryPatch) {
    apply_patch(ledger.entry(date).or_default(), patch);
}

/// Raw records that history synthesis and first-use backfill scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistorySources<'a> {
    pub habits: &'a [Habit],
    pub quests: &'a [Quest],
    pub reward_log: &'a [RewardLogEntry],
}

/// One day in a built history window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRow {
    pub date: DateKey,
    #[serde(flatten)]
    pub record: DailyRecord,
}

/// Build one row per day in `[end - days + 1, end]`, newest first.
///
/// Ledger rows are used as stored, except that `totalHabits` is raised to
/// the current habit count. Every row then has `habitsMissed` derived as
/// `totalHabits - habitsDone` and `perfectDay` recomputed.
pub fn build_daily_history(
    ledger: &DailyLedger,
    sources: &HistorySources<'_>,
    days: usize,
    end: DateKey,
) -> Vec<HistoryRow> {
    let keys = DateKey::range_ending(end, days);
    let habit_count = sources.habits.len() as u64;

    let mut window: BTreeMap<DateKey, DailyRecord> = keys
        .iter()
        .map(|key| {
            let record = match ledger.get(key) {
                Some(row) => {
                    let mut row = row.clone();
                    row.total_habits = row.total_habits.max(habit_count);
                    row
                }
                None => DailyRecord {
                    total_habits: habit_count,
                    ..Default::default()
                },
            };
            (*key, record)
        })
        .collect();

    let synthesizable: HashSet<DateKey> = keys
        .iter()
        .filter(|key| !ledger.contains_key(key))
        .copied()
        .collect();

    for habit in sources.habits {
        let reward = habit.reward();
        for (date, count) in &habit.history {
            if *count == 0 {
                continue;
            }
            if let Some(row) = synth_slot(&mut window, &synthesizable, Some(*date)) {
                row.habits_done += 1;
                row.xp_gained = row.xp_gained.saturating_add(reward);
            }
        }
    }

    for quest in sources.quests {
        if let Some(row) = synth_slot(&mut window, &synthesizable, quest.completed_on()) {
            row.quests_done += 1;
            row.xp_gained = row.xp_gained.saturating_add(quest.xp);
            row.gold_gained = row.gold_gained.saturating_add(quest.gold);
        }
        if let Some(row) = synth_slot(&mut window, &synthesizable, quest.failed_on()) {
            row.quests_failed += 1;
            row.xp_lost = row.xp_lost.saturating_add(quest.xp);
        }
    }

    for entry in sources.reward_log {
        let at = entry.at.map(DateKey::from_datetime);
        if let Some(row) = synth_slot(&mut window, &synthesizable, at) {
            row.gold_spent = row.gold_spent.saturating_add(entry.cost);
        }
    }

    window
        .into_iter()
        .rev()
        .map(|(date, mut record)| {
            record.habits_missed = record.total_habits.saturating_sub(record.habits_done);
            record.refresh_perfect_day();
            HistoryRow { date, record }
        })
        .collect()
}

fn synth_slot<'w>(
    window: &'w mut BTreeMap<DateKey, DailyRecord>,
    synthesizable: &HashSet<DateKey>,
    date: Option<DateKey>,
) -> Option<&'w mut DailyRecord> {
    let date = date.filter(|d| synthesizable.contains(d))?;
    window.get_mut(&date)
}

/// Earliest timestamp found anywhere in the player's data, or `fallback`.
pub fn resolve_first_use(
    ledger: &DailyLedger,
    sources: &HistorySources<'_>,
    fallback: DateTime<Utc>,
) -> DateTime<Utc> {
    let ledger_days = ledger.keys().map(DateKey::start_of_day);
    let quest_times = sources
        .quests
        .iter()
        .flat_map(|q| [q.created_at, q.completed_at, q.failed_at])
        .flatten();
    let habit_times = sources.habits.iter().flat_map(|h| {
        let fixed = [h.created_at, h.last_completed.map(|d| d.start_of_day())];
        fixed
            .into_iter()
            .flatten()
            .chain(h.history.keys().map(DateKey::start_of_day))
    });
    let reward_times = sources.reward_log.iter().filter_map(|entry| entry.at);

    ledger_days
        .chain(quest_times)
        .chain(habit_times)
        .chain(reward_times)
        .min()
        .unwrap_or(fallback)
}

/// Number of days the lifetime window spans, in `[1, max_days]`.
pub fn history_window_days(
    first_use_at: DateTime<Utc>,
    now: DateTime<Utc>,
    max_days: u32,
) -> usize {
    let age = super::calendar::account_age_days(first_use_at, now);
    age.clamp(1, max_days.max(1)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> DateKey {
        s.parse().expect("date key")
    }

    #[test]
    fn merge_adds_and_leaves_other_days() {
        let mut ledger = DailyLedger::new();
        ledger.insert(
            key("2024-01-01"),
            DailyRecord {
                xp_gained: 10,
                ..Default::default()
            },
        );
        let patch = HistoryPatch {
            xp_gained_delta: 5,
            habits_done_delta: 1,
            ..Default::default()
        };
        let next = merge_daily_history(&ledger, key("2024-01-02"), &patch);
        let next = merge_daily_history(&next, key("2024-01-02"), &patch);
        assert_eq!(next[&key("2024-01-01")].xp_gained, 10);
        assert_eq!(next[&key("2024-01-02")].xp_gained, 10);
        assert_eq!(next[&key("2024-01-02")].habits_done, 2);
        assert!(!ledger.contains_key(&key("2024-01-02")));
    }

    #[test]
    fn total_habits_in_patch_replaces() {
        let mut ledger = DailyLedger::new();
        let patch = HistoryPatch {
            total_habits: Some(4),
            ..Default::default()
        };
        merge_in_place(&mut ledger, key("2024-01-01"), &patch);
        merge_in_place(&mut ledger, key("2024-01-01"), &patch);
        assert_eq!(ledger[&key("2024-01-01")].total_habits, 4);
    }

    #[test]
    fn explicit_rows_win_over_synthesis() {
        let mut habit = Habit::new("h1", "Read", 30);
        habit.history.insert(key("2024-01-02"), 1);
        habit.history.insert(key("2024-01-03"), 1);

        let mut ledger = DailyLedger::new();
        ledger.insert(
            key("2024-01-03"),
            DailyRecord {
                xp_gained: 999,
                habits_done: 1,
                total_habits: 1,
                ..Default::default()
            },
        );

        let habits = [habit];
        let sources = HistorySources {
            habits: &habits,
            ..Default::default()
        };
        let rows = build_daily_history(&ledger, &sources, 3, key("2024-01-03"));
        let dates: Vec<String> = rows.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-01-03", "2024-01-02", "2024-01-01"]);

        assert_eq!(rows[0].record.xp_gained, 999);
        assert_eq!(rows[1].record.xp_gained, 30);
        assert!(rows[1].record.perfect_day);
        assert_eq!(rows[2].record.habits_missed, 1);
        assert!(!rows[2].record.perfect_day);
    }

    #[test]
    fn first_use_scans_every_source() {
        let fallback = key("2030-01-01").start_of_day();
        let mut habit = Habit::new("h1", "Walk", 0);
        habit.history.insert(key("2023-05-01"), 1);
        let habits = [habit];
        let sources = HistorySources {
            habits: &habits,
            ..Default::default()
        };
        let first = resolve_first_use(&DailyLedger::new(), &sources, fallback);
        assert_eq!(DateKey::from_datetime(first), key("2023-05-01"));
        let none = resolve_first_use(&DailyLedger::new(), &HistorySources::default(), fallback);
        assert_eq!(none, fallback);
    }
}
