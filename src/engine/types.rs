use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::calendar::DateKey;
use super::coerce::{
    de_amount, de_count, de_date, de_date_counts, de_id, de_text, de_timestamp, field,
    field_bool, field_clamped, field_f64, field_str, field_u64,
};
use super::leveling::{rank_from_level, Rank};

/// Schema revision of the persisted player blob. Blobs older than 2 predate
/// the daily ledger and their `dailyHistory` is discarded on load.
pub const HISTORY_VERSION: u8 = 2;

pub const DEFAULT_PLAYER_NAME: &str = "Hunter";
pub const DEFAULT_TITLE: &str = "Shadow Trainee";

/// XP granted by a habit whose own reward is unset.
pub const DEFAULT_HABIT_REWARD: u64 = 25;

// ============================================================================
// Player state (aggregate root)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub history_version: u8,
    pub xp: u64,
    pub level: u32,
    pub gold: u64,
    /// Manually synced global consistency counter. Independent from the
    /// computed discipline streak.
    pub streak: u32,
    /// Always `rank_from_level(level)`.
    pub rank: Rank,
    pub first_use_at: DateTime<Utc>,
    #[serde(rename = "totalXPEarned")]
    pub total_xp_earned: u64,
    #[serde(rename = "totalXPLost")]
    pub total_xp_lost: u64,
    pub total_gold_earned: u64,
    pub total_gold_spent: u64,
    pub longest_streak: u32,
    pub days_missed_total: u32,
    pub perfect_days_count: u32,
    pub daily_history: BTreeMap<DateKey, DailyRecord>,
    pub profile: Profile,
    pub settings: Settings,
}

impl PlayerState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            history_version: HISTORY_VERSION,
            xp: 0,
            level: 1,
            gold: 0,
            streak: 0,
            rank: Rank::E,
            first_use_at: now,
            total_xp_earned: 0,
            total_xp_lost: 0,
            total_gold_earned: 0,
            total_gold_spent: 0,
            longest_streak: 0,
            days_missed_total: 0,
            perfect_days_count: 0,
            daily_history: BTreeMap::new(),
            profile: Profile::default(),
            settings: Settings::default(),
        }
    }

    /// Re-derive `rank` from `level`.
    pub fn sync_rank(&mut self) {
        self.rank = rank_from_level(self.level);
    }

    /// Ledger row for `date`, zero-valued when absent.
    pub fn history_for(&self, date: DateKey) -> DailyRecord {
        self.daily_history.get(&date).cloned().unwrap_or_default()
    }
}

// ============================================================================
// Daily ledger
// ============================================================================

/// One calendar day's aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecord {
    pub xp_gained: u64,
    pub xp_lost: u64,
    pub gold_gained: u64,
    pub gold_spent: u64,
    pub habits_done: u64,
    pub habits_missed: u64,
    pub quests_done: u64,
    pub quests_failed: u64,
    pub total_habits: u64,
    pub perfect_day: bool,
}

impl DailyRecord {
    /// Read a stored row, clamping every counter to be non-negative.
    /// `perfectDay` is derived, so the stored flag is not trusted.
    pub fn from_value(row: &Value) -> Self {
        let mut record = Self {
            xp_gained: field_u64(row, "xpGained", 0),
            xp_lost: field_u64(row, "xpLost", 0),
            gold_gained: field_u64(row, "goldGained", 0),
            gold_spent: field_u64(row, "goldSpent", 0),
            habits_done: field_u64(row, "habitsDone", 0),
            habits_missed: field_u64(row, "habitsMissed", 0),
            quests_done: field_u64(row, "questsDone", 0),
            quests_failed: field_u64(row, "questsFailed", 0),
            total_habits: field_u64(row, "totalHabits", 0),
            perfect_day: false,
        };
        record.refresh_perfect_day();
        record
    }

    /// At least one tracked habit, none missed, no quest failed.
    pub fn is_perfect(&self) -> bool {
        self.total_habits > 0 && self.habits_missed == 0 && self.quests_failed == 0
    }

    pub fn refresh_perfect_day(&mut self) {
        self.perfect_day = self.is_perfect();
    }

    /// A day with no tracked habits can only be broken by a failed quest.
    pub fn passes(&self) -> bool {
        (self.total_habits == 0 || self.habits_missed == 0) && self.quests_failed == 0
    }

    pub fn shows_miss(&self) -> bool {
        self.habits_missed > 0 || self.quests_failed > 0
    }
}

/// Additive update to a ledger row. `total_habits`, when set, replaces the
/// row's habit count instead of adding to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryPatch {
    pub xp_gained_delta: u64,
    pub xp_lost_delta: u64,
    pub gold_gained_delta: u64,
    pub gold_spent_delta: u64,
    pub habits_done_delta: u64,
    pub habits_missed_delta: u64,
    pub quests_done_delta: u64,
    pub quests_failed_delta: u64,
    pub total_habits: Option<u64>,
}

impl HistoryPatch {
    pub fn is_empty(&self) -> bool {
        *self == HistoryPatch::default()
    }

    /// Combine two patches; counters add, a later `total_habits` wins.
    pub fn merged(mut self, other: &HistoryPatch) -> Self {
        self.xp_gained_delta = self.xp_gained_delta.saturating_add(other.xp_gained_delta);
        self.xp_lost_delta = self.xp_lost_delta.saturating_add(other.xp_lost_delta);
        self.gold_gained_delta = self.gold_gained_delta.saturating_add(other.gold_gained_delta);
        self.gold_spent_delta = self.gold_spent_delta.saturating_add(other.gold_spent_delta);
        self.habits_done_delta = self.habits_done_delta.saturating_add(other.habits_done_delta);
        self.habits_missed_delta = self
            .habits_missed_delta
            .saturating_add(other.habits_missed_delta);
        self.quests_done_delta = self.quests_done_delta.saturating_add(other.quests_done_delta);
        self.quests_failed_delta = self
            .quests_failed_delta
            .saturating_add(other.quests_failed_delta);
        if other.total_habits.is_some() {
            self.total_habits = other.total_habits;
        }
        self
    }
}

// ============================================================================
// Profile and settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub player_name: String,
    pub title: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            player_name: DEFAULT_PLAYER_NAME.to_string(),
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

impl Profile {
    pub fn from_value(raw: &Value) -> Self {
        Self {
            player_name: field_str(raw, "playerName").unwrap_or_default().to_string(),
            title: field_str(raw, "title").unwrap_or_default().to_string(),
        }
        .normalized()
    }

    /// Trim both fields, substituting defaults for blanks.
    pub fn normalized(self) -> Self {
        let pick = |value: String, fallback: &str| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                fallback.to_string()
            } else {
                trimmed.to_string()
            }
        };
        Self {
            player_name: pick(self.player_name, DEFAULT_PLAYER_NAME),
            title: pick(self.title, DEFAULT_TITLE),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenaltySeverity {
    Low,
    #[default]
    Medium,
    High,
}

impl PenaltySeverity {
    /// Multiplier applied to the magnitude of an XP loss.
    pub fn factor(&self) -> f64 {
        match self {
            PenaltySeverity::Low => 0.5,
            PenaltySeverity::Medium => 1.0,
            PenaltySeverity::High => 1.5,
        }
    }

    /// Exact labels only; anything else is Medium.
    pub fn from_label(label: &str) -> Self {
        match label {
            "Low" => PenaltySeverity::Low,
            "High" => PenaltySeverity::High,
            _ => PenaltySeverity::Medium,
        }
    }
}

pub const MIN_XP_MULTIPLIER: f64 = 0.5;
pub const MAX_XP_MULTIPLIER: f64 = 2.0;
pub const MAX_DAILY_XP_CAP: u32 = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub xp_multiplier: f64,
    pub penalty_severity: PenaltySeverity,
    pub daily_xp_cap_enabled: bool,
    pub daily_xp_cap: u32,
    pub habit_penalties: bool,
    pub streak_reset_on_miss: bool,
    pub habit_reminder: bool,
    pub quest_penalties: bool,
    pub auto_fail_overdue_quests: bool,
    // Display-only toggles, carried for the client.
    pub dark_mode: bool,
    pub glow_intensity: u8,
    pub reduce_animations: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            xp_multiplier: 1.0,
            penalty_severity: PenaltySeverity::Medium,
            daily_xp_cap_enabled: false,
            daily_xp_cap: 500,
            habit_penalties: true,
            streak_reset_on_miss: true,
            habit_reminder: false,
            quest_penalties: true,
            auto_fail_overdue_quests: true,
            dark_mode: true,
            glow_intensity: 70,
            reduce_animations: false,
        }
    }
}

impl Settings {
    pub fn from_value(raw: &Value) -> Self {
        let defaults = Settings::default();
        let daily_xp_cap = if field(raw, "dailyXpCap").is_some() {
            field_clamped(raw, "dailyXpCap", 0, i64::from(MAX_DAILY_XP_CAP)) as u32
        } else {
            defaults.daily_xp_cap
        };
        let glow_intensity = if field(raw, "glowIntensity").is_some() {
            field_clamped(raw, "glowIntensity", 0, 100) as u8
        } else {
            defaults.glow_intensity
        };
        Self {
            xp_multiplier: field_f64(raw, "xpMultiplier").unwrap_or(defaults.xp_multiplier),
            penalty_severity: field_str(raw, "penaltySeverity")
                .map(PenaltySeverity::from_label)
                .unwrap_or_default(),
            daily_xp_cap_enabled: field_bool(raw, "dailyXpCapEnabled", false),
            daily_xp_cap,
            habit_penalties: field_bool(raw, "habitPenalties", defaults.habit_penalties),
            streak_reset_on_miss: field_bool(
                raw,
                "streakResetOnMiss",
                defaults.streak_reset_on_miss,
            ),
            habit_reminder: field_bool(raw, "habitReminder", defaults.habit_reminder),
            quest_penalties: field_bool(raw, "questPenalties", defaults.quest_penalties),
            auto_fail_overdue_quests: field_bool(
                raw,
                "autoFailOverdueQuests",
                defaults.auto_fail_overdue_quests,
            ),
            dark_mode: field_bool(raw, "darkMode", defaults.dark_mode),
            glow_intensity,
            reduce_animations: field_bool(raw, "reduceAnimations", defaults.reduce_animations),
        }
        .normalized()
    }

    /// Clamp numeric settings into their allowed ranges.
    pub fn normalized(mut self) -> Self {
        self.xp_multiplier = if self.xp_multiplier.is_finite() {
            self.xp_multiplier.clamp(MIN_XP_MULTIPLIER, MAX_XP_MULTIPLIER)
        } else {
            1.0
        };
        self.daily_xp_cap = self.daily_xp_cap.min(MAX_DAILY_XP_CAP);
        self.glow_intensity = self.glow_intensity.min(100);
        self
    }
}

// ============================================================================
// Externally-owned records (quests, habits, reward log)
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {}", other)),
        }
    }
}

fn de_difficulty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Difficulty, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value.as_str().map(str::to_ascii_lowercase).as_deref() {
        Some("easy") => Difficulty::Easy,
        Some("hard") => Difficulty::Hard,
        _ => Difficulty::Normal,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestStatus {
    Active,
    Completed,
    Failed,
}

/// A quest as stored by the quest list. Fields the engine does not use are
/// kept in `extra` so a rewrite never loses them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_text")]
    pub title: String,
    #[serde(default, deserialize_with = "de_amount")]
    pub xp: u64,
    #[serde(default, deserialize_with = "de_amount")]
    pub gold: u64,
    #[serde(default, deserialize_with = "de_difficulty")]
    pub difficulty: Difficulty,
    #[serde(default, deserialize_with = "de_date", skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateKey>,
    pub status: QuestStatus,
    #[serde(default, deserialize_with = "de_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_timestamp", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_timestamp", skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Quest {
    pub fn new(id: &str, title: &str, difficulty: Difficulty, xp: u64, gold: u64) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            xp,
            gold,
            difficulty,
            deadline: None,
            status: QuestStatus::Active,
            created_at: None,
            completed_at: None,
            failed_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: DateKey) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == QuestStatus::Active
    }

    /// Day the quest was completed, falling back to its last update.
    pub fn completed_on(&self) -> Option<DateKey> {
        if self.status != QuestStatus::Completed {
            return None;
        }
        self.completed_at
            .or(self.updated_at)
            .or(self.created_at)
            .map(DateKey::from_datetime)
    }

    /// Day the quest failed, falling back to its last update.
    pub fn failed_on(&self) -> Option<DateKey> {
        if self.status != QuestStatus::Failed {
            return None;
        }
        self.failed_at
            .or(self.updated_at)
            .or(self.created_at)
            .map(DateKey::from_datetime)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_text")]
    pub title: String,
    #[serde(default, deserialize_with = "de_amount")]
    pub xp_reward: u64,
    #[serde(default, deserialize_with = "de_count")]
    pub streak: u32,
    #[serde(default, deserialize_with = "de_date", skip_serializing_if = "Option::is_none")]
    pub last_completed: Option<DateKey>,
    #[serde(default, deserialize_with = "de_date_counts")]
    pub history: BTreeMap<DateKey, u32>,
    #[serde(default, deserialize_with = "de_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Habit {
    pub fn new(id: &str, title: &str, xp_reward: u64) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            xp_reward,
            streak: 0,
            last_completed: None,
            history: BTreeMap::new(),
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// XP granted per completion.
    pub fn reward(&self) -> u64 {
        if self.xp_reward == 0 {
            DEFAULT_HABIT_REWARD
        } else {
            self.xp_reward
        }
    }

    pub fn done_on(&self, date: DateKey) -> bool {
        self.history.get(&date).copied().unwrap_or(0) > 0
    }
}

/// A reward redemption. The engine reads only `at` and `cost`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardLogEntry {
    #[serde(default, deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_text")]
    pub title: String,
    #[serde(default, deserialize_with = "de_amount")]
    pub cost: u64,
    #[serde(default, deserialize_with = "de_timestamp", skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
