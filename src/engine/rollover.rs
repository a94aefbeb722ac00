//! Rollover Job
//!
//! Once per calendar day:
//!
//! 1. overdue active quests are failed (`autoFailOverdueQuests`),
//! 2. habits whose last completion is more than a day old lose their streak
//!    (`streakResetOnMiss`),
//! 3. the failed quests' XP is removed in one unscaled transaction
//!    (`questPenalties`), and
//! 4. the day is marked done.
//!
//! The discipline refresh that follows is run by the caller, which owns
//! storage. Records that do not parse are left exactly as they were.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;

use super::calendar::DateKey;
use super::history::merge_in_place;
use super::transaction::{apply_xp_transaction, TxOptions};
use super::types::{Habit, HistoryPatch, PlayerState, Quest, QuestStatus};

/// What one rollover invocation did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloverReport {
    pub date: Option<DateKey>,
    /// True when the marker showed the job already ran today.
    pub skipped: bool,
    pub quests_failed: u32,
    pub habits_reset: u32,
    /// Sum of the failed quests' XP.
    pub xp_penalty: u64,
    /// XP actually removed (never more than the penalty).
    pub xp_removed: u64,
    pub skipped_records: u32,
}

/// Next state plus any rewritten lists. A list is `Some` only when at least
/// one record in it changed.
#[derive(Debug, Clone)]
pub struct RolloverOutcome {
    pub state: PlayerState,
    pub quests: Option<Vec<Value>>,
    pub habits: Option<Vec<Value>>,
    pub marker: DateKey,
    pub report: RolloverReport,
}

pub fn run_rollover(
    state: &PlayerState,
    quests: &[Value],
    habits: &[Value],
    last_run: Option<DateKey>,
    now: DateTime<Utc>,
) -> RolloverOutcome {
    let today = DateKey::from_datetime(now);
    let mut report = RolloverReport {
        date: Some(today),
        ..Default::default()
    };

    if last_run == Some(today) {
        debug!("rollover already ran for {}", today);
        report.skipped = true;
        return RolloverOutcome {
            state: state.clone(),
            quests: None,
            habits: None,
            marker: today,
            report,
        };
    }

    let settings = &state.settings;

    let quests = if settings.auto_fail_overdue_quests {
        fail_overdue_quests(quests, today, now, &mut report)
    } else {
        None
    };

    let habits = if settings.streak_reset_on_miss {
        reset_broken_streaks(habits, today, now, &mut report)
    } else {
        None
    };

    let mut next = state.clone();
    let mut failures_recorded = false;
    if report.xp_penalty > 0 && settings.quest_penalties {
        let options = TxOptions::tracked(HistoryPatch {
            quests_failed_delta: u64::from(report.quests_failed),
            ..Default::default()
        })
        .bypass_policy()
        .on(today);
        let outcome = apply_xp_transaction(&next, -(report.xp_penalty as f64), &options, today);
        report.xp_removed = outcome.applied.unsigned_abs();
        failures_recorded = !outcome.is_noop();
        next = outcome.state;
    }
    if report.quests_failed > 0 && !failures_recorded {
        merge_in_place(
            &mut next.daily_history,
            today,
            &HistoryPatch {
                quests_failed_delta: u64::from(report.quests_failed),
                ..Default::default()
            },
        );
    }

    info!(
        "rollover {}: {} quests failed, {} habit streaks reset, {} xp removed",
        today, report.quests_failed, report.habits_reset, report.xp_removed
    );

    RolloverOutcome {
        state: next,
        quests,
        habits,
        marker: today,
        report,
    }
}

fn fail_overdue_quests(
    raw: &[Value],
    today: DateKey,
    now: DateTime<Utc>,
    report: &mut RolloverReport,
) -> Option<Vec<Value>> {
    let mut changed = false;
    let updated = raw
        .iter()
        .map(|record| {
            let mut quest = match serde_json::from_value::<Quest>(record.clone()) {
                Ok(quest) => quest,
                Err(e) => {
                    debug!("rollover skipping unreadable quest: {}", e);
                    report.skipped_records += 1;
                    return record.clone();
                }
            };
            let overdue = quest.is_active() && quest.deadline.map_or(false, |d| d < today);
            if !overdue {
                return record.clone();
            }
            quest.status = QuestStatus::Failed;
            quest.failed_at = Some(now);
            quest.updated_at = Some(now);
            match serde_json::to_value(&quest) {
                Ok(value) => {
                    changed = true;
                    report.quests_failed += 1;
                    report.xp_penalty = report.xp_penalty.saturating_add(quest.xp);
                    debug!("quest {} overdue since {:?}, failing", quest.id, quest.deadline);
                    value
                }
                Err(_) => record.clone(),
            }
        })
        .collect();
    changed.then_some(updated)
}

fn reset_broken_streaks(
    raw: &[Value],
    today: DateKey,
    now: DateTime<Utc>,
    report: &mut RolloverReport,
) -> Option<Vec<Value>> {
    let mut changed = false;
    let updated = raw
        .iter()
        .map(|record| {
            let mut habit = match serde_json::from_value::<Habit>(record.clone()) {
                Ok(habit) => habit,
                Err(e) => {
                    debug!("rollover skipping unreadable habit: {}", e);
                    report.skipped_records += 1;
                    return record.clone();
                }
            };
            let Some(last) = habit.last_completed else {
                return record.clone();
            };
            if last.days_until(today) <= 1 {
                return record.clone();
            }
            habit.streak = 0;
            habit.updated_at = Some(now);
            match serde_json::to_value(&habit) {
                Ok(value) => {
                    changed = true;
                    report.habits_reset += 1;
                    value
                }
                Err(_) => record.clone(),
            }
        })
        .collect();
    changed.then_some(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(s: &str) -> DateKey {
        s.parse().expect("date key")
    }

    fn noon(s: &str) -> DateTime<Utc> {
        key(s).start_of_day() + chrono::Duration::hours(12)
    }

    #[test]
    fn marker_skips_second_run() {
        let state = PlayerState::new(noon("2024-01-01"));
        let quests = vec![json!({
            "id": "q", "xp": 10, "status": "active", "deadline": "2024-01-01"
        })];
        let out = run_rollover(&state, &quests, &[], Some(key("2024-01-03")), noon("2024-01-03"));
        assert!(out.report.skipped);
        assert!(out.quests.is_none());
        assert_eq!(out.state, state);
    }

    #[test]
    fn unreadable_records_survive() {
        let mut state = PlayerState::new(noon("2024-01-01"));
        state.level = 2;
        let quests = vec![
            json!("garbage"),
            json!({"id": "q", "xp": 30, "status": "active", "deadline": "2024-01-02"}),
        ];
        let out = run_rollover(&state, &quests, &[json!(42)], None, noon("2024-01-03"));
        let rewritten = out.quests.expect("quests rewritten");
        assert_eq!(rewritten[0], json!("garbage"));
        assert_eq!(rewritten[1]["status"], "failed");
        assert_eq!(out.report.skipped_records, 2);
        assert_eq!(out.report.xp_removed, 30);
    }

    #[test]
    fn failures_are_recorded_without_penalties() {
        let mut state = PlayerState::new(noon("2024-01-01"));
        state.settings.quest_penalties = false;
        state.xp = 50;
        let quests = vec![json!({
            "id": "q", "xp": 30, "status": "active", "deadline": "2024-01-01"
        })];
        let out = run_rollover(&state, &quests, &[], None, noon("2024-01-03"));
        assert_eq!(out.state.xp, 50);
        assert_eq!(out.state.daily_history[&key("2024-01-03")].quests_failed, 1);
    }

    #[test]
    fn disabled_auto_fail_leaves_quests() {
        let mut state = PlayerState::new(noon("2024-01-01"));
        state.settings.auto_fail_overdue_quests = false;
        let quests = vec![json!({
            "id": "q", "xp": 30, "status": "active", "deadline": "2024-01-01"
        })];
        let out = run_rollover(&state, &quests, &[], None, noon("2024-01-03"));
        assert!(out.quests.is_none());
        assert_eq!(out.report.quests_failed, 0);
        assert_eq!(out.marker, key("2024-01-03"));
    }
}
