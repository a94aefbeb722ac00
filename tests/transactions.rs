/// XP and gold transactions through the Game controller.
mod common;

use common::{game_on, key};
use hunterlog::engine::leveling::total_absolute_xp;
use hunterlog::engine::{HistoryPatch, PenaltySeverity, PenaltySource, Rank, TxOptions};
use hunterlog::storage::Storage;

fn tracked() -> TxOptions {
    TxOptions::tracked(HistoryPatch::default())
}

#[test]
fn test_level_up_crossing() {
    let (mut game, _clock) = game_on(Storage::in_memory(), "2024-01-03");
    game.add_xp(90.0, &tracked());
    let applied = game.add_xp(50.0, &tracked());
    assert_eq!(applied, 50);
    assert_eq!(game.state().level, 2);
    assert_eq!(game.state().xp, 40);
    assert_eq!(game.state().total_xp_earned, 140);
    assert_eq!(game.state().history_for(key("2024-01-03")).xp_gained, 140);
}

#[test]
fn test_daily_cap_clamps_the_gain() {
    let (mut game, _clock) = game_on(Storage::in_memory(), "2024-01-03");
    game.update_settings(|s| {
        s.daily_xp_cap_enabled = true;
        s.daily_xp_cap = 100;
    });
    assert_eq!(game.add_xp(80.0, &tracked()), 80);
    assert_eq!(game.add_xp(50.0, &tracked()), 20);
    assert_eq!(game.add_xp(10.0, &tracked()), 0);
    assert_eq!(game.state().history_for(key("2024-01-03")).xp_gained, 100);

    // bypass ignores the cap but still records
    let applied = game.add_xp(10.0, &tracked().bypass_policy());
    assert_eq!(applied, 10);
}

#[test]
fn test_cap_is_per_target_date() {
    let (mut game, clock) = game_on(Storage::in_memory(), "2024-01-03");
    game.update_settings(|s| {
        s.daily_xp_cap_enabled = true;
        s.daily_xp_cap = 100;
    });
    assert_eq!(game.add_xp(100.0, &tracked()), 100);
    clock.advance_days(1);
    assert_eq!(game.add_xp(100.0, &tracked()), 100);
}

#[test]
fn test_multiplier_and_severity_round() {
    let (mut game, _clock) = game_on(Storage::in_memory(), "2024-01-03");
    game.update_settings(|s| {
        s.xp_multiplier = 1.5;
        s.penalty_severity = PenaltySeverity::Low;
    });
    assert_eq!(game.add_xp(33.0, &tracked()), 50);
    assert_eq!(game.remove_xp(30.0, PenaltySource::Manual, &tracked()), -15);
    assert_eq!(game.state().xp, 35);
    assert_eq!(game.state().total_xp_lost, 15);
    let today = game.state().history_for(key("2024-01-03"));
    assert_eq!(today.xp_gained, 50);
    assert_eq!(today.xp_lost, 15);
}

#[test]
fn test_out_of_range_settings_are_clamped() {
    let (mut game, _clock) = game_on(Storage::in_memory(), "2024-01-03");
    game.update_settings(|s| {
        s.xp_multiplier = 9.0;
        s.daily_xp_cap = 90_000;
    });
    assert_eq!(game.state().settings.xp_multiplier, 2.0);
    assert_eq!(game.state().settings.daily_xp_cap, 5000);
}

#[test]
fn test_penalty_sources_respect_settings() {
    let (mut game, _clock) = game_on(Storage::in_memory(), "2024-01-03");
    game.add_xp(50.0, &tracked());
    game.update_settings(|s| {
        s.habit_penalties = false;
        s.quest_penalties = false;
    });
    assert_eq!(game.remove_xp(10.0, PenaltySource::Habit, &tracked()), 0);
    assert_eq!(game.remove_xp(10.0, PenaltySource::Quest, &tracked()), 0);
    assert_eq!(game.remove_xp(10.0, PenaltySource::Manual, &tracked()), -10);
    assert_eq!(game.state().xp, 40);
}

#[test]
fn test_level_down_and_floor() {
    let (mut game, _clock) = game_on(Storage::in_memory(), "2024-01-03");
    game.add_xp(110.0, &tracked());
    assert_eq!((game.state().level, game.state().xp), (2, 10));

    assert_eq!(game.remove_xp(50.0, PenaltySource::Manual, &tracked()), -50);
    assert_eq!((game.state().level, game.state().xp), (1, 60));

    // only what exists can be lost
    assert_eq!(game.remove_xp(500.0, PenaltySource::Manual, &tracked()), -60);
    assert_eq!((game.state().level, game.state().xp), (1, 0));
    assert_eq!(game.remove_xp(5.0, PenaltySource::Manual, &tracked()), 0);
    assert_eq!(game.state().total_xp_lost, 110);
}

#[test]
fn test_rank_follows_level() {
    let (mut game, _clock) = game_on(Storage::in_memory(), "2024-01-03");
    // 100 * (1 + 4 + 9 + 16) reaches level 5
    game.add_xp(3000.0, &tracked());
    assert_eq!(game.state().level, 5);
    assert_eq!(game.state().rank, Rank::D);
    assert_eq!(
        total_absolute_xp(game.state().level, game.state().xp),
        i128::from(game.state().total_xp_earned)
    );

    game.remove_xp(1.0, PenaltySource::Manual, &tracked());
    assert_eq!(game.state().level, 4);
    assert_eq!(game.state().rank, Rank::E);
}

#[test]
fn test_untotaled_gain_leaves_lifetime_counters() {
    let (mut game, _clock) = game_on(Storage::in_memory(), "2024-01-03");
    game.add_xp(40.0, &TxOptions::default().untotaled());
    assert_eq!(game.state().xp, 40);
    assert_eq!(game.state().total_xp_earned, 0);
    // not recorded either
    assert!(game.state().daily_history.is_empty());
}

#[test]
fn test_non_finite_and_negative_requests_are_ignored() {
    let (mut game, _clock) = game_on(Storage::in_memory(), "2024-01-03");
    assert_eq!(game.add_xp(f64::NAN, &tracked()), 0);
    assert_eq!(game.add_xp(f64::INFINITY, &tracked()), 0);
    assert_eq!(game.add_xp(-20.0, &tracked()), 0);
    assert_eq!(game.add_gold(f64::NAN, &tracked()), 0);
    assert_eq!(game.state().xp, 0);
    assert!(game.state().daily_history.is_empty());
}

#[test]
fn test_gold_spend_is_clamped_to_balance() {
    let (mut game, _clock) = game_on(Storage::in_memory(), "2024-01-03");
    assert_eq!(game.add_gold(30.0, &tracked()), 30);
    assert_eq!(game.spend_gold(100.0, &tracked()), -30);
    assert_eq!(game.state().gold, 0);
    assert_eq!(game.state().total_gold_spent, 30);
    assert_eq!(game.state().total_gold_earned, 30);
    assert_eq!(game.spend_gold(10.0, &tracked()), 0);

    let today = game.state().history_for(key("2024-01-03"));
    assert_eq!(today.gold_gained, 30);
    assert_eq!(today.gold_spent, 30);
}

#[test]
fn test_target_date_charges_another_day() {
    let (mut game, _clock) = game_on(Storage::in_memory(), "2024-01-03");
    let yesterday = key("2024-01-02");
    game.add_xp(
        25.0,
        &TxOptions::tracked(HistoryPatch {
            habits_done_delta: 1,
            ..Default::default()
        })
        .on(yesterday),
    );
    let row = game.state().history_for(yesterday);
    assert_eq!(row.xp_gained, 25);
    assert_eq!(row.habits_done, 1);
    assert!(!game.state().daily_history.contains_key(&key("2024-01-03")));
}
