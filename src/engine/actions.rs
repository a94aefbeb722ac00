//! Player-facing operations.
//!
//! Each action edits the externally-owned list it concerns, routes any XP or
//! gold through the transaction pipeline and records itself in the
//! last-action slot. The slot is informational; nothing here undoes it.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::storage::keys;

use super::calendar::DateKey;
use super::discipline::DisciplineMetrics;
use super::rollover::RolloverReport;
use super::state::Game;
use super::transaction::{PenaltySource, TxOptions};
use super::types::{Difficulty, Habit, HistoryPatch, Quest, QuestStatus, RewardLogEntry};

/// Focus quests earn this share of their XP on top.
pub const FOCUS_BONUS_RATE: f64 = 0.1;

/// What the last action did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ActionRecord {
    HabitComplete {
        habit_id: String,
        previous_habit: Value,
        xp: i64,
    },
    QuestComplete {
        quest_id: String,
        xp: i64,
        gold: i64,
    },
    QuestFail {
        quest_id: String,
        xp: i64,
    },
    QuestAdd {
        quest: Value,
    },
    HabitAdd {
        habit: Value,
    },
    RewardRedeem {
        title: String,
        cost: u64,
    },
    XpGain {
        amount: i64,
        source: String,
    },
    XpLoss {
        amount: i64,
        source: String,
    },
    GoldChange {
        amount: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastAction {
    #[serde(flatten)]
    pub action: ActionRecord,
    pub timestamp: DateTime<Utc>,
}

/// A command the scheduler can run against the game.
#[derive(Debug, Clone, PartialEq)]
pub enum GameAction {
    AddXp { amount: f64 },
    RemoveXp { amount: f64, source: PenaltySource },
    EarnGold { amount: f64 },
    SpendGold { amount: f64 },
    AddHabit { title: String, xp_reward: u64 },
    AddQuest {
        title: String,
        difficulty: Difficulty,
        xp: u64,
        gold: u64,
        deadline: Option<DateKey>,
    },
    CompleteHabit { id: String },
    CompleteQuest { id: String },
    FailQuest { id: String },
    SetFocus { id: Option<String> },
    RedeemReward { title: String, cost: u64 },
    FocusSession { xp: u64 },
    SyncHabitStreak,
    SetStreak { value: i64 },
    IncrementStreak,
    ResetStreak,
    Rollover,
    SyncDiscipline,
    ResetAll,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Signed amounts actually applied.
    Applied { xp: i64, gold: i64 },
    Created { id: String },
    /// Nothing changed, with the reason.
    Ignored(String),
    RolledOver(RolloverReport),
    Refreshed(DisciplineMetrics),
    Done,
}

impl ActionOutcome {
    fn applied(xp: i64, gold: i64) -> Self {
        ActionOutcome::Applied { xp, gold }
    }

    fn ignored(reason: impl Into<String>) -> Self {
        ActionOutcome::Ignored(reason.into())
    }
}

impl Game {
    /// Run one command.
    pub fn dispatch(&mut self, action: GameAction) -> ActionOutcome {
        debug!("dispatch {:?}", action);
        match action {
            GameAction::AddXp { amount } => {
                let xp = self.add_xp(amount, &TxOptions::tracked(HistoryPatch::default()));
                if xp != 0 {
                    self.set_last_action(ActionRecord::XpGain {
                        amount: xp,
                        source: "manual".into(),
                    });
                }
                ActionOutcome::applied(xp, 0)
            }
            GameAction::RemoveXp { amount, source } => {
                let options = TxOptions::tracked(HistoryPatch::default());
                let xp = self.remove_xp(amount, source, &options);
                if xp != 0 {
                    self.set_last_action(ActionRecord::XpLoss {
                        amount: xp,
                        source: format!("{:?}", source).to_lowercase(),
                    });
                }
                ActionOutcome::applied(xp, 0)
            }
            GameAction::EarnGold { amount } => {
                let gold = self.add_gold(amount, &TxOptions::tracked(HistoryPatch::default()));
                if gold != 0 {
                    self.set_last_action(ActionRecord::GoldChange { amount: gold });
                }
                ActionOutcome::applied(0, gold)
            }
            GameAction::SpendGold { amount } => {
                let gold = self.spend_gold(amount, &TxOptions::tracked(HistoryPatch::default()));
                if gold != 0 {
                    self.set_last_action(ActionRecord::GoldChange { amount: gold });
                }
                ActionOutcome::applied(0, gold)
            }
            GameAction::AddHabit { title, xp_reward } => self.add_habit(&title, xp_reward),
            GameAction::AddQuest {
                title,
                difficulty,
                xp,
                gold,
                deadline,
            } => self.add_quest(&title, difficulty, xp, gold, deadline),
            GameAction::CompleteHabit { id } => self.complete_habit(&id),
            GameAction::CompleteQuest { id } => self.complete_quest(&id),
            GameAction::FailQuest { id } => self.fail_quest(&id),
            GameAction::SetFocus { id } => {
                self.set_focus_quest(id.as_deref());
                ActionOutcome::Done
            }
            GameAction::RedeemReward { title, cost } => self.redeem_reward(&title, cost),
            GameAction::FocusSession { xp } => self.complete_focus_session(xp),
            GameAction::SyncHabitStreak => {
                self.sync_habit_streak();
                ActionOutcome::Done
            }
            GameAction::SetStreak { value } => {
                self.set_streak(value);
                ActionOutcome::Done
            }
            GameAction::IncrementStreak => {
                self.increment_streak();
                ActionOutcome::Done
            }
            GameAction::ResetStreak => {
                self.reset_streak();
                ActionOutcome::Done
            }
            GameAction::Rollover => ActionOutcome::RolledOver(self.run_rollover()),
            GameAction::SyncDiscipline => ActionOutcome::Refreshed(self.discipline_tick()),
            GameAction::ResetAll => {
                self.reset_all_data();
                self.clear_last_action();
                ActionOutcome::Done
            }
        }
    }

    pub fn add_habit(&mut self, title: &str, xp_reward: u64) -> ActionOutcome {
        let title = title.trim();
        if title.is_empty() {
            return ActionOutcome::ignored("habit title is empty");
        }
        let mut habit = Habit::new(&Uuid::new_v4().to_string(), title, xp_reward);
        habit.created_at = Some(self.now());
        habit.updated_at = habit.created_at;
        let Ok(value) = serde_json::to_value(&habit) else {
            return ActionOutcome::ignored("habit could not be encoded");
        };
        let mut habits = self.storage().read_raw_list(keys::HABITS);
        habits.push(value.clone());
        self.storage().write_json(keys::HABITS, &habits);
        self.set_last_action(ActionRecord::HabitAdd { habit: value });
        ActionOutcome::Created { id: habit.id }
    }

    pub fn add_quest(
        &mut self,
        title: &str,
        difficulty: Difficulty,
        xp: u64,
        gold: u64,
        deadline: Option<DateKey>,
    ) -> ActionOutcome {
        let title = title.trim();
        if title.is_empty() {
            return ActionOutcome::ignored("quest title is empty");
        }
        let mut quest = Quest::new(&Uuid::new_v4().to_string(), title, difficulty, xp, gold);
        quest.deadline = deadline;
        quest.created_at = Some(self.now());
        quest.updated_at = quest.created_at;
        let Ok(value) = serde_json::to_value(&quest) else {
            return ActionOutcome::ignored("quest could not be encoded");
        };
        let mut quests = self.storage().read_raw_list(keys::QUESTS);
        quests.insert(0, value.clone());
        self.storage().write_json(keys::QUESTS, &quests);
        self.set_last_action(ActionRecord::QuestAdd { quest: value });
        ActionOutcome::Created { id: quest.id }
    }

    /// Mark a habit done today. A second completion on the same day is
    /// ignored.
    pub fn complete_habit(&mut self, id: &str) -> ActionOutcome {
        let today = self.today();
        let now = self.now();
        let mut raw = self.storage().read_raw_list(keys::HABITS);
        let habit_count = raw
            .iter()
            .filter(|item| serde_json::from_value::<Habit>((*item).clone()).is_ok())
            .count() as u64;

        let Some(index) = find_index::<Habit>(&raw, id) else {
            return ActionOutcome::ignored(format!("no habit {}", id));
        };
        let previous = raw[index].clone();
        let Ok(mut habit) = serde_json::from_value::<Habit>(previous.clone()) else {
            return ActionOutcome::ignored(format!("habit {} is unreadable", id));
        };
        if habit.last_completed == Some(today) {
            return ActionOutcome::ignored(format!("habit {} already done today", id));
        }

        habit.streak = match habit.last_completed {
            Some(last) if last.days_until(today) == 1 => habit.streak.saturating_add(1),
            _ => 1,
        };
        habit.history.insert(today, 1);
        habit.last_completed = Some(today);
        habit.updated_at = Some(now);
        let reward = habit.reward();
        let Ok(value) = serde_json::to_value(&habit) else {
            return ActionOutcome::ignored(format!("habit {} could not be encoded", id));
        };
        raw[index] = value;
        self.storage().write_json(keys::HABITS, &raw);

        let patch = HistoryPatch {
            habits_done_delta: 1,
            total_habits: Some(habit_count),
            ..Default::default()
        };
        let xp = self.add_xp(reward as f64, &TxOptions::tracked(patch.clone()).on(today));
        if xp == 0 {
            // the habit still counts when the cap swallowed the XP
            self.record_history(today, patch);
        }
        self.set_last_action(ActionRecord::HabitComplete {
            habit_id: habit.id.clone(),
            previous_habit: previous,
            xp,
        });
        info!("habit {} done, streak {}", habit.id, habit.streak);
        ActionOutcome::applied(xp, 0)
    }

    /// Complete an active quest; the focus quest earns a bonus.
    pub fn complete_quest(&mut self, id: &str) -> ActionOutcome {
        let now = self.now();
        let today = self.today();
        let mut raw = self.storage().read_raw_list(keys::QUESTS);
        let Some((index, mut quest)) = find_active_quest(&raw, id) else {
            return ActionOutcome::ignored(format!("no active quest {}", id));
        };

        quest.status = QuestStatus::Completed;
        quest.completed_at = Some(now);
        quest.updated_at = Some(now);
        let Ok(value) = serde_json::to_value(&quest) else {
            return ActionOutcome::ignored(format!("quest {} could not be encoded", id));
        };
        raw[index] = value;
        self.storage().write_json(keys::QUESTS, &raw);

        let focused = self.focus_quest().as_deref() == Some(quest.id.as_str());
        let bonus = if focused {
            (quest.xp as f64 * FOCUS_BONUS_RATE).ceil() as u64
        } else {
            0
        };
        let xp_options = TxOptions::tracked(HistoryPatch {
            quests_done_delta: 1,
            ..Default::default()
        })
        .on(today);
        let xp = self.add_xp((quest.xp + bonus) as f64, &xp_options);
        let gold_options = TxOptions::tracked(HistoryPatch::default()).on(today);
        let gold = self.add_gold(quest.gold as f64, &gold_options);
        if xp == 0 {
            // the completion still counts when the cap swallowed the XP
            self.record_history(today, HistoryPatch {
                quests_done_delta: 1,
                ..Default::default()
            });
        }
        if focused {
            self.set_focus_quest(None);
        }
        self.set_last_action(ActionRecord::QuestComplete {
            quest_id: quest.id.clone(),
            xp,
            gold,
        });
        info!("quest {} completed: +{} xp (bonus {}), +{} gold", quest.id, xp, bonus, gold);
        ActionOutcome::applied(xp, gold)
    }

    /// Fail an active quest, removing its XP as a quest penalty.
    pub fn fail_quest(&mut self, id: &str) -> ActionOutcome {
        let now = self.now();
        let today = self.today();
        let mut raw = self.storage().read_raw_list(keys::QUESTS);
        let Some((index, mut quest)) = find_active_quest(&raw, id) else {
            return ActionOutcome::ignored(format!("no active quest {}", id));
        };

        quest.status = QuestStatus::Failed;
        quest.failed_at = Some(now);
        quest.updated_at = Some(now);
        let Ok(value) = serde_json::to_value(&quest) else {
            return ActionOutcome::ignored(format!("quest {} could not be encoded", id));
        };
        raw[index] = value;
        self.storage().write_json(keys::QUESTS, &raw);

        let patch = HistoryPatch {
            quests_failed_delta: 1,
            ..Default::default()
        };
        let xp = self.remove_xp(
            quest.xp as f64,
            PenaltySource::Quest,
            &TxOptions::tracked(patch.clone()).on(today),
        );
        if xp == 0 {
            self.record_history(today, patch);
        }
        if self.focus_quest().as_deref() == Some(quest.id.as_str()) {
            self.set_focus_quest(None);
        }
        self.set_last_action(ActionRecord::QuestFail {
            quest_id: quest.id.clone(),
            xp,
        });
        info!("quest {} failed: {} xp", quest.id, xp);
        ActionOutcome::applied(xp, 0)
    }

    /// Spend `cost` gold on a reward. Refused outright when the balance is
    /// short.
    pub fn redeem_reward(&mut self, title: &str, cost: u64) -> ActionOutcome {
        if self.state().gold < cost {
            return ActionOutcome::ignored(format!(
                "not enough gold: have {}, need {}",
                self.state().gold,
                cost
            ));
        }
        let now = self.now();
        let gold = self.spend_gold(cost as f64, &TxOptions::tracked(HistoryPatch::default()));

        let entry = RewardLogEntry {
            id: format!("reward-log-{}", Uuid::new_v4()),
            title: title.to_string(),
            cost,
            at: Some(now),
            extra: Default::default(),
        };
        let mut log = self.storage().read_raw_list(keys::REWARD_LOG);
        if let Ok(value) = serde_json::to_value(&entry) {
            log.insert(0, value);
            self.storage().write_json(keys::REWARD_LOG, &log);
        }
        self.set_last_action(ActionRecord::RewardRedeem {
            title: title.to_string(),
            cost,
        });
        ActionOutcome::applied(0, gold)
    }

    /// XP for a finished focus-timer session.
    pub fn complete_focus_session(&mut self, xp: u64) -> ActionOutcome {
        let applied = self.add_xp(xp as f64, &TxOptions::tracked(HistoryPatch::default()));
        if applied != 0 {
            self.set_last_action(ActionRecord::XpGain {
                amount: applied,
                source: "pomodoro".into(),
            });
        }
        ActionOutcome::applied(applied, 0)
    }

    /// Set the global streak scalar to the sum of habit streaks.
    pub fn sync_habit_streak(&mut self) {
        let combined: u64 = self.habits().iter().map(|h| u64::from(h.streak)).sum();
        self.set_streak(combined.min(i64::MAX as u64) as i64);
    }

    pub fn focus_quest(&self) -> Option<String> {
        let id = self.storage().read_string(keys::FOCUS_QUEST, "");
        (!id.is_empty()).then_some(id)
    }

    pub fn set_focus_quest(&mut self, id: Option<&str>) {
        self.storage()
            .write_string(keys::FOCUS_QUEST, id.unwrap_or_default());
    }

    pub fn last_action(&self) -> Option<LastAction> {
        self.storage().read_json(keys::LAST_ACTION, None)
    }

    pub fn clear_last_action(&mut self) {
        self.storage().write_json(keys::LAST_ACTION, &Value::Null);
    }

    fn set_last_action(&mut self, action: ActionRecord) {
        let record = LastAction {
            action,
            timestamp: self.now(),
        };
        self.storage().write_json(keys::LAST_ACTION, &record);
    }

    fn record_history(&mut self, date: DateKey, patch: HistoryPatch) {
        let mut next = self.state().clone();
        super::history::merge_in_place(&mut next.daily_history, date, &patch);
        self.replace(next);
    }
}

fn find_index<T: serde::de::DeserializeOwned + HasId>(raw: &[Value], id: &str) -> Option<usize> {
    raw.iter().position(|item| {
        serde_json::from_value::<T>(item.clone())
            .map(|parsed| parsed.id() == id)
            .unwrap_or(false)
    })
}

fn find_active_quest(raw: &[Value], id: &str) -> Option<(usize, Quest)> {
    let index = find_index::<Quest>(raw, id)?;
    let quest: Quest = serde_json::from_value(raw[index].clone()).ok()?;
    quest.is_active().then_some((index, quest))
}

trait HasId {
    fn id(&self) -> &str;
}

impl HasId for Habit {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for Quest {
    fn id(&self) -> &str {
        &self.id
    }
}
