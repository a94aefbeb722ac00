//! Transaction Pipeline
//!
//! Turns a requested XP or gold delta into an applied delta under the
//! player's settings:
//!
//! * XP gains are scaled by `xpMultiplier`, rounded, then clamped to what is
//!   left of the daily cap for the target date.
//! * XP losses are scaled by the penalty severity factor and rounded.
//! * Gold has no policy; spends are clamped to the balance.
//!
//! The applied XP amount is measured on the absolute XP curve, so totals
//! track real progress across level boundaries. A zero applied delta returns
//! the state unchanged with no history write.

use log::debug;

use super::calendar::DateKey;
use super::coerce::finite_or_zero;
use super::history::merge_in_place;
use super::leveling::{apply_xp_change, total_absolute_xp};
use super::types::{HistoryPatch, PlayerState, Settings};

/// Per-call policy switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOptions {
    pub bypass_multiplier: bool,
    pub bypass_cap: bool,
    pub bypass_penalty_scale: bool,
    pub record_history: bool,
    pub count_toward_lifetime_totals: bool,
    /// Ledger date to charge; today when unset.
    pub target_date: Option<DateKey>,
    /// Extra counters merged alongside the applied amount.
    pub history_patch: HistoryPatch,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            bypass_multiplier: false,
            bypass_cap: false,
            bypass_penalty_scale: false,
            record_history: false,
            count_toward_lifetime_totals: true,
            target_date: None,
            history_patch: HistoryPatch::default(),
        }
    }
}

impl TxOptions {
    /// Record into the ledger with the given extra counters.
    pub fn tracked(patch: HistoryPatch) -> Self {
        Self {
            record_history: true,
            history_patch: patch,
            ..Self::default()
        }
    }

    /// Skip multiplier, cap and severity scaling.
    pub fn bypass_policy(mut self) -> Self {
        self.bypass_multiplier = true;
        self.bypass_cap = true;
        self.bypass_penalty_scale = true;
        self
    }

    pub fn on(mut self, date: DateKey) -> Self {
        self.target_date = Some(date);
        self
    }

    /// Leave lifetime totals alone.
    pub fn untotaled(mut self) -> Self {
        self.count_toward_lifetime_totals = false;
        self
    }
}

/// Result of a transaction. `applied` is signed: positive for gains.
#[derive(Debug, Clone, PartialEq)]
pub struct TxOutcome {
    pub state: PlayerState,
    pub applied: i64,
    pub level_before: u32,
}

impl TxOutcome {
    fn unchanged(state: &PlayerState) -> Self {
        Self {
            state: state.clone(),
            applied: 0,
            level_before: state.level,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.applied == 0
    }

    pub fn leveled_up(&self) -> bool {
        self.state.level > self.level_before
    }

    pub fn leveled_down(&self) -> bool {
        self.state.level < self.level_before
    }
}

/// Where a penalty comes from; decides which setting may veto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltySource {
    Habit,
    Quest,
    Manual,
}

impl PenaltySource {
    pub fn allowed(&self, settings: &Settings) -> bool {
        match self {
            PenaltySource::Habit => settings.habit_penalties,
            PenaltySource::Quest => settings.quest_penalties,
            PenaltySource::Manual => true,
        }
    }
}

/// Policy-adjust a requested XP delta for `date`. Returns a whole number.
pub fn adjust_xp_delta(
    state: &PlayerState,
    requested: f64,
    options: &TxOptions,
    date: DateKey,
) -> i64 {
    let settings = &state.settings;
    let mut delta = finite_or_zero(requested);

    if delta > 0.0 {
        if !options.bypass_multiplier {
            delta *= settings.xp_multiplier;
        }
        delta = delta.round().max(0.0);
        if !options.bypass_cap && settings.daily_xp_cap_enabled {
            let gained = state
                .daily_history
                .get(&date)
                .map(|row| row.xp_gained)
                .unwrap_or(0);
            let remaining = u64::from(settings.daily_xp_cap).saturating_sub(gained);
            delta = delta.min(remaining as f64);
        }
    } else if delta < 0.0 {
        let mut loss = delta.abs();
        if !options.bypass_penalty_scale {
            loss *= settings.penalty_severity.factor();
        }
        delta = -loss.round().max(0.0);
    }

    delta as i64
}

pub fn apply_xp_transaction(
    state: &PlayerState,
    requested: f64,
    options: &TxOptions,
    today: DateKey,
) -> TxOutcome {
    let date = options.target_date.unwrap_or(today);
    let delta = adjust_xp_delta(state, requested, options, date);
    if delta == 0 {
        debug!("xp transaction of {} adjusted to zero, nothing applied", requested);
        return TxOutcome::unchanged(state);
    }

    let before = total_absolute_xp(state.level, state.xp);
    let progress = apply_xp_change(state.xp, state.level, delta);
    let after = total_absolute_xp(progress.level, progress.xp);
    let applied = (after - before).clamp(i64::MIN as i128, i64::MAX as i128) as i64;
    if applied == 0 {
        debug!("xp transaction of {} hit a curve limit, nothing applied", requested);
        return TxOutcome::unchanged(state);
    }

    let mut next = state.clone();
    next.xp = progress.xp;
    next.level = progress.level;
    next.sync_rank();
    if options.count_toward_lifetime_totals {
        if applied > 0 {
            next.total_xp_earned = next.total_xp_earned.saturating_add(applied.unsigned_abs());
        } else {
            next.total_xp_lost = next.total_xp_lost.saturating_add(applied.unsigned_abs());
        }
    }
    next.longest_streak = next.longest_streak.max(next.streak);

    if options.record_history {
        let amounts = if applied > 0 {
            HistoryPatch {
                xp_gained_delta: applied.unsigned_abs(),
                ..Default::default()
            }
        } else {
            HistoryPatch {
                xp_lost_delta: applied.unsigned_abs(),
                ..Default::default()
            }
        };
        merge_in_place(
            &mut next.daily_history,
            date,
            &amounts.merged(&options.history_patch),
        );
    }

    TxOutcome {
        state: next,
        applied,
        level_before: state.level,
    }
}

pub fn apply_gold_transaction(
    state: &PlayerState,
    requested: f64,
    options: &TxOptions,
    today: DateKey,
) -> TxOutcome {
    let date = options.target_date.unwrap_or(today);
    let delta = finite_or_zero(requested).round();
    let applied: i64 = if delta < 0.0 {
        let spend = (delta.abs() as u64).min(state.gold);
        -(spend.min(i64::MAX as u64) as i64)
    } else {
        delta.min(i64::MAX as f64) as i64
    };
    if applied == 0 {
        return TxOutcome::unchanged(state);
    }

    let mut next = state.clone();
    let amount = applied.unsigned_abs();
    if applied > 0 {
        next.gold = next.gold.saturating_add(amount);
    } else {
        next.gold = next.gold.saturating_sub(amount);
    }
    if options.count_toward_lifetime_totals {
        if applied > 0 {
            next.total_gold_earned = next.total_gold_earned.saturating_add(amount);
        } else {
            next.total_gold_spent = next.total_gold_spent.saturating_add(amount);
        }
    }

    if options.record_history {
        let amounts = if applied > 0 {
            HistoryPatch {
                gold_gained_delta: amount,
                ..Default::default()
            }
        } else {
            HistoryPatch {
                gold_spent_delta: amount,
                ..Default::default()
            }
        };
        merge_in_place(
            &mut next.daily_history,
            date,
            &amounts.merged(&options.history_patch),
        );
    }

    TxOutcome {
        state: next,
        applied,
        level_before: state.level,
    }
}
