//! Achievement definitions and unlock evaluation.
//!
//! Unlocks are stored as `id -> unlock timestamp` and are never revoked or
//! re-stamped.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::calendar::DateKey;
use super::discipline::DisciplineMetrics;
use super::history::HistoryRow;
use super::report::{Grade, GradingHistory, WeeklyPerformance};

pub type UnlockMap = BTreeMap<String, DateTime<Utc>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AchievementDef {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

pub const ACHIEVEMENTS: [AchievementDef; 6] = [
    AchievementDef {
        id: "streak-7",
        title: "Streak Initiate",
        description: "Reach a 7-day streak.",
    },
    AchievementDef {
        id: "flawless-week",
        title: "Flawless Week",
        description: "Complete 100% of tasks for 7 days.",
    },
    AchievementDef {
        id: "focus-consistent",
        title: "Consistency Core",
        description: "Maintain 80%+ average completion this week.",
    },
    AchievementDef {
        id: "zero-fails-week",
        title: "No-Fail Guard",
        description: "Finish a full week without failed quests.",
    },
    AchievementDef {
        id: "s-rank-day",
        title: "S-Rank Day",
        description: "Earn at least one S daily grade.",
    },
    AchievementDef {
        id: "xp-500-week",
        title: "XP Hunter",
        description: "Gain 500+ XP in a week.",
    },
];

pub struct AchievementInputs<'a> {
    pub discipline: &'a DisciplineMetrics,
    pub weekly: &'a WeeklyPerformance,
    pub grading: &'a GradingHistory,
    pub rows: &'a [HistoryRow],
    pub now: DateTime<Utc>,
}

fn qualifies(id: &str, inputs: &AchievementInputs<'_>) -> bool {
    let week = DateKey::range_ending(DateKey::from_datetime(inputs.now), 7);
    match id {
        "streak-7" => inputs.discipline.current_streak >= 7,
        "flawless-week" => week.iter().all(|date| {
            inputs
                .grading
                .get(date)
                .is_some_and(|grade| grade.completion_percent == 100)
        }),
        "focus-consistent" => inputs.weekly.average_completion >= 80,
        "zero-fails-week" => {
            let days: HashSet<DateKey> = week.into_iter().collect();
            let recent: Vec<&HistoryRow> =
                inputs.rows.iter().filter(|row| days.contains(&row.date)).collect();
            recent.len() == 7 && recent.iter().all(|row| row.record.quests_failed == 0)
        }
        "s-rank-day" => inputs.grading.values().any(|grade| grade.grade == Grade::S),
        "xp-500-week" => inputs.weekly.weekly_xp >= 500,
        _ => false,
    }
}

/// Stamp every newly qualifying achievement with `inputs.now`. Returns the
/// updated map and the ids unlocked by this call.
pub fn evaluate_unlocks(
    unlocked: &UnlockMap,
    inputs: &AchievementInputs<'_>,
) -> (UnlockMap, Vec<String>) {
    let mut next = unlocked.clone();
    let mut newly = Vec::new();
    for def in ACHIEVEMENTS.iter() {
        if next.contains_key(def.id) || !qualifies(def.id, inputs) {
            continue;
        }
        next.insert(def.id.to_string(), inputs.now);
        newly.push(def.id.to_string());
    }
    (next, newly)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementStatus {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

/// Every definition in display order, with its unlock state.
pub fn achievement_list(unlocked: &UnlockMap) -> Vec<AchievementStatus> {
    ACHIEVEMENTS
        .iter()
        .map(|def| {
            let unlocked_at = unlocked.get(def.id).copied();
            AchievementStatus {
                id: def.id,
                title: def.title,
                description: def.description,
                unlocked: unlocked_at.is_some(),
                unlocked_at,
            }
        })
        .collect()
}

/// The most recent unlock, if any.
pub fn latest_unlock(unlocked: &UnlockMap) -> Option<AchievementStatus> {
    let (id, at) = unlocked.iter().max_by_key(|(_, at)| **at)?;
    achievement_list(unlocked)
        .into_iter()
        .find(|status| status.id == id.as_str())
        .map(|status| AchievementStatus {
            unlocked_at: Some(*at),
            ..status
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::report::DailyGrade;
    use crate::engine::types::DailyRecord;

    fn weekly(xp: u64, average: u8) -> WeeklyPerformance {
        WeeklyPerformance {
            daily: Vec::new(),
            total_tasks_completed: 0,
            weekly_xp: xp,
            average_completion: average,
            best_day: None,
            worst_day: None,
        }
    }

    fn metrics(current_streak: u32) -> DisciplineMetrics {
        DisciplineMetrics {
            current_streak,
            longest_streak: current_streak,
            days_missed_total: 0,
            perfect_days_count: 0,
            at_risk: false,
        }
    }

    #[test]
    fn unlocks_are_stamped_once() {
        let now: DateTime<Utc> = "2024-01-07T12:00:00Z".parse().expect("ts");
        let discipline = metrics(7);
        let perf = weekly(600, 10);
        let grading = GradingHistory::new();
        let inputs = AchievementInputs {
            discipline: &discipline,
            weekly: &perf,
            grading: &grading,
            rows: &[],
            now,
        };
        let (map, newly) = evaluate_unlocks(&UnlockMap::new(), &inputs);
        assert_eq!(newly, vec!["streak-7".to_string(), "xp-500-week".to_string()]);

        let later = AchievementInputs {
            now: now + chrono::Duration::days(1),
            ..inputs
        };
        let (again, newly) = evaluate_unlocks(&map, &later);
        assert!(newly.is_empty());
        assert_eq!(again["streak-7"], now);
    }

    #[test]
    fn week_based_unlocks_need_seven_days() {
        let end: DateKey = "2024-01-07".parse().expect("date");
        let now = end.start_of_day();
        let mut grading = GradingHistory::new();
        let mut rows = Vec::new();
        for date in DateKey::range_ending(end, 7) {
            grading.insert(
                date,
                DailyGrade {
                    grade: Grade::S,
                    completion_percent: 100,
                    tasks_completed: 1,
                    tasks_total: 1,
                    xp_gained: 0,
                    gold_gained: 0,
                    at_risk: false,
                    updated_at: now,
                },
            );
            rows.push(HistoryRow {
                date,
                record: DailyRecord::default(),
            });
        }
        let discipline = metrics(0);
        let perf = weekly(0, 100);
        let inputs = AchievementInputs {
            discipline: &discipline,
            weekly: &perf,
            grading: &grading,
            rows: &rows[1..],
            now,
        };
        let (_, newly) = evaluate_unlocks(&UnlockMap::new(), &inputs);
        assert!(newly.contains(&"flawless-week".to_string()));
        assert!(newly.contains(&"s-rank-day".to_string()));
        assert!(newly.contains(&"focus-consistent".to_string()));
        assert!(!newly.contains(&"zero-fails-week".to_string()));

        let full = AchievementInputs { rows: &rows, ..inputs };
        let (map, _) = evaluate_unlocks(&UnlockMap::new(), &full);
        assert!(map.contains_key("zero-fails-week"));
        assert_eq!(achievement_list(&map).iter().filter(|a| a.unlocked).count(), 4);
        assert!(latest_unlock(&map).is_some());
    }
}
