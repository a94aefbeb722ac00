/// Daily rollover: overdue quests, habit streak resets and the once-a-day marker.
mod common;

use serde_json::json;

use common::{game_on, key, seeded_storage};
use hunterlog::engine::{PenaltySeverity, QuestStatus, TxOptions};
use hunterlog::storage::{keys, Storage};

fn overdue_quest_storage() -> Storage {
    seeded_storage(
        json!([{
            "id": "q1",
            "title": "Ship the release",
            "xp": 80,
            "gold": 5,
            "difficulty": "Hard",
            "status": "active",
            "deadline": "2024-01-01",
            "color": "violet"
        }]),
        json!([]),
    )
}

#[test]
fn test_overdue_quest_fails_with_unscaled_penalty() {
    let (mut game, _clock) = game_on(overdue_quest_storage(), "2024-01-03");
    // severity would turn 80 into 120 if it applied
    game.update_settings(|s| s.penalty_severity = PenaltySeverity::High);
    game.add_xp(90.0, &TxOptions::default());
    assert_eq!(game.state().xp, 90);

    let report = game.run_rollover();
    assert!(!report.skipped);
    assert_eq!(report.quests_failed, 1);
    assert_eq!(report.xp_penalty, 80);
    assert_eq!(report.xp_removed, 80);

    let state = game.state();
    assert_eq!(state.xp, 10);
    assert_eq!(state.level, 1);
    assert_eq!(state.total_xp_lost, 80);
    let today = state.history_for(key("2024-01-03"));
    assert_eq!(today.quests_failed, 1);
    assert_eq!(today.xp_lost, 80);

    let quests = game.quests();
    assert_eq!(quests[0].status, QuestStatus::Failed);
    assert!(quests[0].failed_at.is_some());
    // fields the engine does not know survive the rewrite
    assert_eq!(quests[0].extra.get("color"), Some(&json!("violet")));
    assert_eq!(game.last_rollover(), Some(key("2024-01-03")));
}

#[test]
fn test_rollover_is_idempotent_within_a_day() {
    let storage = overdue_quest_storage();
    let (mut game, _clock) = game_on(storage.clone(), "2024-01-03");
    game.add_xp(200.0, &TxOptions::default());
    game.run_rollover();

    let after_first = game.state().clone();
    let quests_after_first = storage.read_raw_list(keys::QUESTS);

    let second = game.run_rollover();
    assert!(second.skipped);
    assert_eq!(second.quests_failed, 0);
    assert_eq!(game.state(), &after_first);
    assert_eq!(storage.read_raw_list(keys::QUESTS), quests_after_first);
}

#[test]
fn test_next_day_rollover_does_not_refail() {
    let (mut game, clock) = game_on(overdue_quest_storage(), "2024-01-03");
    game.add_xp(200.0, &TxOptions::default());
    assert_eq!(game.run_rollover().quests_failed, 1);

    clock.advance_days(1);
    let report = game.run_rollover();
    assert!(!report.skipped);
    assert_eq!(report.quests_failed, 0);
    assert_eq!(report.xp_removed, 0);
    // 200 - 80 absolute: level 2 with 20 into it
    assert_eq!(game.state().level, 2);
    assert_eq!(game.state().xp, 20);
}

#[test]
fn test_streak_reset_boundary() {
    let storage = seeded_storage(
        json!([]),
        json!([
            {"id": "yesterday", "title": "Read", "streak": 4, "lastCompleted": "2024-01-02"},
            {"id": "two-days", "title": "Run", "streak": 6, "lastCompleted": "2024-01-01"},
            {"id": "never", "title": "Stretch", "streak": 0}
        ]),
    );
    let (mut game, _clock) = game_on(storage, "2024-01-03");
    let report = game.run_rollover();
    assert_eq!(report.habits_reset, 1);

    let habits = game.habits();
    let streak = |id: &str| {
        habits
            .iter()
            .find(|h| h.id == id)
            .map(|h| h.streak)
            .expect("habit")
    };
    assert_eq!(streak("yesterday"), 4);
    assert_eq!(streak("two-days"), 0);
    assert_eq!(streak("never"), 0);
}

#[test]
fn test_disabled_rules_leave_records_alone() {
    let storage = seeded_storage(
        json!([{"id": "q1", "xp": 80, "status": "active", "deadline": "2024-01-01"}]),
        json!([{"id": "h1", "streak": 6, "lastCompleted": "2023-12-01"}]),
    );
    let (mut game, _clock) = game_on(storage.clone(), "2024-01-03");
    game.update_settings(|s| {
        s.auto_fail_overdue_quests = false;
        s.streak_reset_on_miss = false;
    });
    let report = game.run_rollover();
    assert_eq!(report.quests_failed, 0);
    assert_eq!(report.habits_reset, 0);
    assert_eq!(game.quests()[0].status, QuestStatus::Active);
    assert_eq!(game.habits()[0].streak, 6);
    // the day is still marked done
    assert!(game.run_rollover().skipped);
}

#[test]
fn test_quest_without_deadline_is_never_overdue() {
    let storage = seeded_storage(
        json!([
            {"id": "open", "xp": 50, "status": "active"},
            {"id": "bad-date", "xp": 50, "status": "active", "deadline": "someday"},
            {"id": "today", "xp": 50, "status": "active", "deadline": "2024-01-03"}
        ]),
        json!([]),
    );
    let (mut game, _clock) = game_on(storage, "2024-01-03");
    let report = game.run_rollover();
    assert_eq!(report.quests_failed, 0);
    assert!(game.quests().iter().all(|q| q.status == QuestStatus::Active));
}
