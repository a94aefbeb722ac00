//! Player State Store
//!
//! [`Game`] owns the single [`PlayerState`] together with its storage and
//! clock. Every change goes through [`Game::replace`], which persists the
//! whole blob (last write wins).

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::Value;

use crate::storage::{keys, Storage};

use super::calendar::{Clock, DateKey};
use super::coerce::{field, field_clamped, field_timestamp, field_u64};
use super::discipline::{sync_history_and_discipline, DisciplineSync};
use super::history::{resolve_first_use, DailyLedger, HistorySources, MAX_HISTORY_WINDOW_DAYS};
use super::leveling::{apply_xp_change, rank_from_level, total_absolute_xp, MAX_LEVEL};
use super::rollover::{run_rollover, RolloverReport};
use super::transaction::{
    apply_gold_transaction, apply_xp_transaction, PenaltySource, TxOptions, TxOutcome,
};
use super::types::{
    DailyRecord, Habit, PlayerState, Profile, Quest, RewardLogEntry, Settings, HISTORY_VERSION,
};

/// Upper bound for stored streak-like counters.
pub const MAX_STREAK: i64 = 100_000;

/// Rebuild a [`PlayerState`] from a stored blob of unknown quality.
pub fn normalize_state(
    raw: &Value,
    sources: &HistorySources<'_>,
    now: DateTime<Utc>,
) -> PlayerState {
    let level = field_clamped(raw, "level", 1, i64::from(MAX_LEVEL)) as u32;
    let stored_xp = field_u64(raw, "xp", 0);
    let progress = apply_xp_change(stored_xp, level, 0);
    let gold = field_u64(raw, "gold", 0);
    let streak = field_clamped(raw, "streak", 0, MAX_STREAK) as u32;
    let absolute_xp =
        total_absolute_xp(progress.level, progress.xp).clamp(0, u64::MAX as i128) as u64;

    let history_version = field_clamped(raw, "historyVersion", 0, 99);
    let daily_history = if history_version >= i64::from(HISTORY_VERSION) {
        parse_ledger(field(raw, "dailyHistory"))
    } else {
        if field(raw, "dailyHistory").is_some() {
            warn!("discarding daily history from schema version {}", history_version);
        }
        DailyLedger::new()
    };

    let first_use_at = match field_timestamp(raw, "firstUseAt") {
        Some(at) => at,
        None => {
            let scanned = resolve_first_use(&daily_history, sources, now);
            match field_timestamp(raw, "createdAt") {
                Some(created) => created.min(scanned),
                None => scanned,
            }
        }
    };

    PlayerState {
        history_version: HISTORY_VERSION,
        xp: progress.xp,
        level: progress.level,
        gold,
        streak,
        rank: rank_from_level(progress.level),
        first_use_at,
        total_xp_earned: absolute_xp.max(field_u64(raw, "totalXPEarned", absolute_xp)),
        total_xp_lost: field_u64(raw, "totalXPLost", 0),
        total_gold_earned: gold.max(field_u64(raw, "totalGoldEarned", gold)),
        total_gold_spent: field_u64(raw, "totalGoldSpent", 0),
        longest_streak: streak.max(field_clamped(raw, "longestStreak", 0, MAX_STREAK) as u32),
        days_missed_total: field_clamped(raw, "daysMissedTotal", 0, MAX_STREAK) as u32,
        perfect_days_count: field_clamped(raw, "perfectDaysCount", 0, MAX_STREAK) as u32,
        daily_history,
        profile: Profile::from_value(raw.get("profile").unwrap_or(&Value::Null)),
        settings: Settings::from_value(raw.get("settings").unwrap_or(&Value::Null)),
    }
}

fn parse_ledger(raw: Option<&Value>) -> DailyLedger {
    let Some(Value::Object(rows)) = raw else {
        return DailyLedger::new();
    };
    let mut ledger = BTreeMap::new();
    for (raw_key, row) in rows {
        match DateKey::parse_lenient(raw_key) {
            Some(date) => {
                ledger.insert(date, DailyRecord::from_value(row));
            }
            None => debug!("dropping ledger row with unreadable date {:?}", raw_key),
        }
    }
    ledger
}

/// The engine controller: state, storage and clock.
pub struct Game {
    storage: Storage,
    clock: Arc<dyn Clock>,
    state: PlayerState,
    max_window_days: u32,
}

impl Game {
    /// Load the player from storage, normalizing whatever is there.
    pub fn load(storage: Storage, clock: Arc<dyn Clock>) -> Self {
        let state = Self::read_state(&storage, clock.now());
        let game = Self {
            storage,
            clock,
            state,
            max_window_days: MAX_HISTORY_WINDOW_DAYS,
        };
        game.persist();
        game
    }

    fn read_state(storage: &Storage, now: DateTime<Utc>) -> PlayerState {
        match storage.read_value(keys::PLAYER_STATE) {
            Some(raw) if raw.is_object() => {
                let quests: Vec<Quest> = storage.read_list(keys::QUESTS);
                let habits: Vec<Habit> = storage.read_list(keys::HABITS);
                let reward_log: Vec<RewardLogEntry> = storage.read_list(keys::REWARD_LOG);
                let sources = HistorySources {
                    habits: &habits,
                    quests: &quests,
                    reward_log: &reward_log,
                };
                normalize_state(&raw, &sources, now)
            }
            Some(_) => {
                warn!("stored player state is not an object, starting fresh");
                PlayerState::new(now)
            }
            None => PlayerState::new(now),
        }
    }

    /// Limit the lifetime history window (clamped to `[1, 3650]`).
    pub fn with_history_window(mut self, days: u32) -> Self {
        self.max_window_days = days.clamp(1, MAX_HISTORY_WINDOW_DAYS);
        self
    }

    /// Re-read everything from storage, e.g. after an import.
    pub fn reload(&mut self) {
        self.state = Self::read_state(&self.storage, self.clock.now());
        self.persist();
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> DateKey {
        self.clock.today()
    }

    /// The single state-replacement entry point.
    pub fn replace(&mut self, next: PlayerState) {
        let mut next = next;
        next.sync_rank();
        self.state = next;
        self.persist();
    }

    fn persist(&self) {
        self.storage.write_json(keys::PLAYER_STATE, &self.state);
    }

    pub fn quests(&self) -> Vec<Quest> {
        self.storage.read_list(keys::QUESTS)
    }

    pub fn habits(&self) -> Vec<Habit> {
        self.storage.read_list(keys::HABITS)
    }

    pub fn reward_log(&self) -> Vec<RewardLogEntry> {
        self.storage.read_list(keys::REWARD_LOG)
    }

    /// Apply a finished transaction; no-ops are not persisted.
    pub(crate) fn commit(&mut self, outcome: TxOutcome) -> i64 {
        if outcome.is_noop() {
            return 0;
        }
        if outcome.leveled_up() {
            info!(
                "level up: {} -> {} (rank {})",
                outcome.level_before, outcome.state.level, outcome.state.rank
            );
        } else if outcome.leveled_down() {
            info!("level down: {} -> {}", outcome.level_before, outcome.state.level);
        }
        let applied = outcome.applied;
        self.replace(outcome.state);
        applied
    }

    /// Grant XP. Non-positive or non-finite amounts are ignored.
    pub fn add_xp(&mut self, amount: f64, options: &TxOptions) -> i64 {
        if !(amount.is_finite() && amount > 0.0) {
            return 0;
        }
        let outcome = apply_xp_transaction(&self.state, amount, options, self.today());
        self.commit(outcome)
    }

    /// Remove XP unless the source's penalty setting is off. Returns the
    /// (negative) applied amount.
    pub fn remove_xp(&mut self, amount: f64, source: PenaltySource, options: &TxOptions) -> i64 {
        if !(amount.is_finite() && amount > 0.0) {
            return 0;
        }
        if !source.allowed(&self.state.settings) {
            debug!("{:?} penalty of {} skipped by settings", source, amount);
            return 0;
        }
        let outcome = apply_xp_transaction(&self.state, -amount, options, self.today());
        self.commit(outcome)
    }

    pub fn add_gold(&mut self, amount: f64, options: &TxOptions) -> i64 {
        if !(amount.is_finite() && amount > 0.0) {
            return 0;
        }
        let outcome = apply_gold_transaction(&self.state, amount, options, self.today());
        self.commit(outcome)
    }

    /// Spend gold, clamped to the balance. Returns the (negative) amount spent.
    pub fn spend_gold(&mut self, amount: f64, options: &TxOptions) -> i64 {
        if !(amount.is_finite() && amount > 0.0) {
            return 0;
        }
        let outcome = apply_gold_transaction(&self.state, -amount, options, self.today());
        self.commit(outcome)
    }

    pub fn set_streak(&mut self, value: i64) {
        let streak = value.clamp(0, MAX_STREAK) as u32;
        let mut next = self.state.clone();
        next.streak = streak;
        next.longest_streak = next.longest_streak.max(streak);
        self.replace(next);
    }

    pub fn increment_streak(&mut self) {
        let value = i64::from(self.state.streak) + 1;
        self.set_streak(value);
    }

    pub fn reset_streak(&mut self) {
        let mut next = self.state.clone();
        next.streak = 0;
        self.replace(next);
    }

    pub fn update_profile(&mut self, edit: impl FnOnce(&mut Profile)) {
        let mut next = self.state.clone();
        edit(&mut next.profile);
        next.profile = next.profile.normalized();
        self.replace(next);
    }

    pub fn update_settings(&mut self, edit: impl FnOnce(&mut Settings)) {
        let mut next = self.state.clone();
        edit(&mut next.settings);
        next.settings = next.settings.normalized();
        info!("settings updated: {:?}", next.settings);
        self.replace(next);
    }

    /// Hard reset: fresh state, empty lists, rollover already done today.
    pub fn reset_all_data(&mut self) {
        let now = self.now();
        self.storage.write_json(keys::QUESTS, &Vec::<Value>::new());
        self.storage.write_json(keys::HABITS, &Vec::<Value>::new());
        self.storage.remove(keys::REWARD_LOG);
        self.storage.write_string(keys::FOCUS_QUEST, "");
        self.storage
            .write_string(keys::LAST_ROLLOVER, &DateKey::from_datetime(now).to_string());
        info!("all player data reset");
        self.replace(PlayerState::new(now));
    }

    /// Rebuild the lifetime history window and fold it into the counters.
    pub fn sync_discipline(&mut self) -> DisciplineSync {
        let quests = self.quests();
        let habits = self.habits();
        let reward_log = self.reward_log();
        let sources = HistorySources {
            habits: &habits,
            quests: &quests,
            reward_log: &reward_log,
        };
        let sync =
            sync_history_and_discipline(&self.state, &sources, self.now(), self.max_window_days);
        if sync.state != self.state {
            self.replace(sync.state.clone());
        }
        sync
    }

    /// Date of the last completed rollover, if any.
    pub fn last_rollover(&self) -> Option<DateKey> {
        DateKey::parse_lenient(&self.storage.read_string(keys::LAST_ROLLOVER, ""))
    }

    /// Run the daily rollover unless it already ran today, then refresh
    /// discipline.
    pub fn run_rollover(&mut self) -> RolloverReport {
        let quests = self.storage.read_raw_list(keys::QUESTS);
        let habits = self.storage.read_raw_list(keys::HABITS);
        let outcome = run_rollover(&self.state, &quests, &habits, self.last_rollover(), self.now());
        if outcome.report.skipped {
            return outcome.report;
        }

        if let Some(quests) = &outcome.quests {
            self.storage.write_json(keys::QUESTS, quests);
        }
        if let Some(habits) = &outcome.habits {
            self.storage.write_json(keys::HABITS, habits);
        }
        if outcome.state != self.state {
            self.replace(outcome.state);
        }
        self.storage
            .write_string(keys::LAST_ROLLOVER, &outcome.marker.to_string());
        self.sync_discipline();
        outcome.report
    }
}
