//! XP curve, level crossing and rank tiers.
//!
//! The threshold to leave level `n` is `n² × 100` XP. Progress inside a level
//! is stored as `xp`, so after any change `0 ≤ xp < xp_for_next_level(level)`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Highest level a stored state may claim.
pub const MAX_LEVEL: u32 = 100_000;

/// XP needed to advance from `level` to `level + 1`.
pub fn xp_for_next_level(level: u32) -> i64 {
    let level = i64::from(level.max(1));
    level.saturating_mul(level).saturating_mul(100)
}

/// Position on the XP curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpProgress {
    pub xp: u64,
    pub level: u32,
}

/// Apply a signed, already policy-adjusted delta.
///
/// Gains roll over as many level thresholds as they cover; losses walk back
/// down, refilling from each lower threshold. Level 1 is the floor and xp is
/// clamped at 0 there. `MAX_LEVEL` is the ceiling and xp stops just short of
/// its threshold.
pub fn apply_xp_change(xp: u64, level: u32, delta: i64) -> XpProgress {
    let mut next_level = level.clamp(1, MAX_LEVEL);
    let mut next_xp = (xp.min(i64::MAX as u64) as i64).saturating_add(delta);

    while next_xp >= xp_for_next_level(next_level) && next_level < MAX_LEVEL {
        next_xp -= xp_for_next_level(next_level);
        next_level += 1;
    }
    if next_level == MAX_LEVEL {
        next_xp = next_xp.min(xp_for_next_level(MAX_LEVEL) - 1);
    }

    while next_xp < 0 && next_level > 1 {
        next_level -= 1;
        next_xp = next_xp.saturating_add(xp_for_next_level(next_level));
    }

    XpProgress {
        xp: next_xp.max(0) as u64,
        level: next_level,
    }
}

/// Total XP ever needed to stand at `(level, xp)`.
pub fn total_absolute_xp(level: u32, xp: u64) -> i128 {
    let below = i128::from(level.clamp(1, MAX_LEVEL)) - 1;
    // sum of n² for n in 1..=below, times 100
    let curve = 100 * below * (below + 1) * (2 * below + 1) / 6;
    curve + i128::from(xp)
}

/// Display tier derived purely from level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    E,
    D,
    C,
    B,
    A,
    S,
}

impl Rank {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::E => "E",
            Rank::D => "D",
            Rank::C => "C",
            Rank::B => "B",
            Rank::A => "A",
            Rank::S => "S",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn rank_from_level(level: u32) -> Rank {
    match level {
        0..=4 => Rank::E,
        5..=9 => Rank::D,
        10..=19 => Rank::C,
        20..=34 => Rank::B,
        35..=49 => Rank::A,
        _ => Rank::S,
    }
}

/// Whole-number progress through the current level, capped at 100.
pub fn level_progress_percent(xp: u64, level: u32) -> u8 {
    let needed = xp_for_next_level(level);
    if needed <= 0 {
        return 0;
    }
    let pct = (xp as f64 / needed as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}
