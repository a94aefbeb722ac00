//! Daily grades, the today snapshot and weekly performance.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::storage::keys;

use super::achievement::{evaluate_unlocks, AchievementInputs, UnlockMap};
use super::calendar::DateKey;
use super::discipline::DisciplineMetrics;
use super::history::{DailyLedger, HistoryRow};
use super::state::Game;
use super::types::{Difficulty, Habit, Quest, QuestStatus};

/// UTC hour after which unfinished tasks put the day at risk.
pub const AT_RISK_HOUR: u32 = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    F,
    C,
    B,
    A,
    S,
}

impl Grade {
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            100.. => Grade::S,
            80..=99 => Grade::A,
            60..=79 => Grade::B,
            40..=59 => Grade::C,
            _ => Grade::F,
        }
    }

    /// 1 (F) through 5 (S).
    pub fn score(&self) -> u8 {
        match self {
            Grade::S => 5,
            Grade::A => 4,
            Grade::B => 3,
            Grade::C => 2,
            Grade::F => 1,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Grade::S => "S",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::F => "F",
        };
        f.write_str(label)
    }
}

/// `part / whole` as a whole percentage in `[0, 100]`; 0 when `whole` is 0.
pub fn percent(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Habit,
    Quest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Failed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEntry {
    pub id: String,
    pub kind: TaskKind,
    pub title: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    pub xp_reward: u64,
    pub gold_reward: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodaySnapshot {
    pub date: DateKey,
    pub tasks: Vec<TaskEntry>,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// Tasks not completed, failed ones included.
    pub pending_tasks: u64,
    pub completion_percent: u8,
    pub grade: Grade,
    pub xp_gained: u64,
    pub xp_lost: u64,
    pub gold_gained: u64,
    pub gold_spent: u64,
    pub at_risk: bool,
}

/// Today's tasks: every habit, plus active quests and quests that finished
/// today. Quests finished on earlier days are not today's work.
pub fn build_today_snapshot(
    habits: &[Habit],
    quests: &[Quest],
    ledger: &DailyLedger,
    now: DateTime<Utc>,
) -> TodaySnapshot {
    let today = DateKey::from_datetime(now);

    let habit_tasks = habits.iter().map(|habit| TaskEntry {
        id: habit.id.clone(),
        kind: TaskKind::Habit,
        title: habit.title.clone(),
        status: if habit.done_on(today) {
            TaskStatus::Completed
        } else {
            TaskStatus::Pending
        },
        difficulty: None,
        xp_reward: habit.reward(),
        gold_reward: 0,
    });

    let quest_tasks = quests.iter().filter_map(|quest| {
        let status = if quest.completed_on() == Some(today) {
            TaskStatus::Completed
        } else if quest.failed_on() == Some(today) {
            TaskStatus::Failed
        } else if quest.status == QuestStatus::Active {
            TaskStatus::Pending
        } else {
            return None;
        };
        Some(TaskEntry {
            id: quest.id.clone(),
            kind: TaskKind::Quest,
            title: quest.title.clone(),
            status,
            difficulty: Some(quest.difficulty),
            xp_reward: quest.xp,
            gold_reward: quest.gold,
        })
    });

    let tasks: Vec<TaskEntry> = habit_tasks.chain(quest_tasks).collect();
    let total_tasks = tasks.len() as u64;
    let completed_tasks = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count() as u64;
    let failed_tasks = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .count() as u64;
    let pending_tasks = total_tasks - completed_tasks;
    let completion_percent = percent(completed_tasks, total_tasks);
    let row = ledger.get(&today).cloned().unwrap_or_default();

    TodaySnapshot {
        date: today,
        tasks,
        total_tasks,
        completed_tasks,
        failed_tasks,
        pending_tasks,
        completion_percent,
        grade: Grade::from_percent(completion_percent),
        xp_gained: row.xp_gained,
        xp_lost: row.xp_lost,
        gold_gained: row.gold_gained,
        gold_spent: row.gold_spent,
        at_risk: now.hour() >= AT_RISK_HOUR && pending_tasks > 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyGrade {
    pub grade: Grade,
    pub completion_percent: u8,
    pub tasks_completed: u64,
    pub tasks_total: u64,
    pub xp_gained: u64,
    pub gold_gained: u64,
    pub at_risk: bool,
    pub updated_at: DateTime<Utc>,
}

pub type GradingHistory = BTreeMap<DateKey, DailyGrade>;

/// Replace the grade for the snapshot's date.
pub fn upsert_daily_grade(
    history: &mut GradingHistory,
    snapshot: &TodaySnapshot,
    now: DateTime<Utc>,
) {
    history.insert(
        snapshot.date,
        DailyGrade {
            grade: snapshot.grade,
            completion_percent: snapshot.completion_percent,
            tasks_completed: snapshot.completed_tasks,
            tasks_total: snapshot.total_tasks,
            xp_gained: snapshot.xp_gained,
            gold_gained: snapshot.gold_gained,
            at_risk: snapshot.at_risk,
            updated_at: now,
        },
    );
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyDay {
    pub date: DateKey,
    pub tasks_completed: u64,
    pub tasks_total: u64,
    pub completion_percent: u8,
    pub grade: Grade,
    pub xp_gained: u64,
    pub gold_gained: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyPerformance {
    pub daily: Vec<WeeklyDay>,
    pub total_tasks_completed: u64,
    #[serde(rename = "weeklyXP")]
    pub weekly_xp: u64,
    pub average_completion: u8,
    pub best_day: Option<DateKey>,
    pub worst_day: Option<DateKey>,
}

/// The 7 days ending at `end`, oldest first. A stored grade wins; missing
/// figures fall back to the history row.
pub fn build_weekly_performance(
    rows: &[HistoryRow],
    grading: &GradingHistory,
    end: DateKey,
) -> WeeklyPerformance {
    let by_date: BTreeMap<DateKey, &HistoryRow> = rows.iter().map(|row| (row.date, row)).collect();

    let daily: Vec<WeeklyDay> = DateKey::range_ending(end, 7)
        .into_iter()
        .map(|date| {
            let record = by_date.get(&date).map(|row| row.record.clone()).unwrap_or_default();
            let stored = grading.get(&date);
            let nonzero = |value: Option<u64>| value.filter(|v| *v > 0);

            let tasks_completed = nonzero(stored.map(|g| g.tasks_completed))
                .unwrap_or(record.habits_done + record.quests_done);
            let tasks_total = nonzero(stored.map(|g| g.tasks_total))
                .unwrap_or(record.total_habits + record.quests_done + record.quests_failed);
            let completion_percent = stored
                .map(|g| g.completion_percent)
                .filter(|p| *p > 0)
                .unwrap_or_else(|| percent(tasks_completed, tasks_total));
            let grade = stored
                .map(|g| g.grade)
                .unwrap_or_else(|| Grade::from_percent(completion_percent));

            WeeklyDay {
                date,
                tasks_completed,
                tasks_total,
                completion_percent,
                grade,
                xp_gained: record.xp_gained,
                gold_gained: record.gold_gained,
            }
        })
        .collect();

    let total_tasks_completed = daily.iter().map(|d| d.tasks_completed).sum();
    let weekly_xp = daily.iter().map(|d| d.xp_gained).sum();
    let completion_sum: u64 = daily.iter().map(|d| u64::from(d.completion_percent)).sum();
    let average_completion = percent(completion_sum, daily.len() as u64 * 100);

    // first of the highest / first of the lowest
    let best_day = daily
        .iter()
        .fold(None::<&WeeklyDay>, |best, d| match best {
            Some(b) if b.completion_percent >= d.completion_percent => Some(b),
            _ => Some(d),
        })
        .map(|d| d.date);
    let worst_day = daily
        .iter()
        .fold(None::<&WeeklyDay>, |worst, d| match worst {
            Some(w) if w.completion_percent <= d.completion_percent => Some(w),
            _ => Some(d),
        })
        .map(|d| d.date);

    WeeklyPerformance {
        daily,
        total_tasks_completed,
        weekly_xp,
        average_completion,
        best_day,
        worst_day,
    }
}

impl Game {
    pub fn grading_history(&self) -> GradingHistory {
        self.storage().read_json(keys::GRADING_HISTORY, GradingHistory::new())
    }

    pub fn achievements(&self) -> UnlockMap {
        self.storage().read_json(keys::ACHIEVEMENTS, UnlockMap::new())
    }

    pub fn today_snapshot(&self) -> TodaySnapshot {
        build_today_snapshot(
            &self.habits(),
            &self.quests(),
            &self.state().daily_history,
            self.now(),
        )
    }

    /// The periodic discipline job: fold the analyzer into the state, then
    /// refresh today's grade and the achievement unlocks.
    pub fn discipline_tick(&mut self) -> DisciplineMetrics {
        let sync = self.sync_discipline();
        let now = self.now();

        let snapshot = self.today_snapshot();
        let mut grading = self.grading_history();
        upsert_daily_grade(&mut grading, &snapshot, now);
        self.storage().write_json(keys::GRADING_HISTORY, &grading);

        let weekly = build_weekly_performance(&sync.rows, &grading, snapshot.date);
        let unlocked = self.achievements();
        let inputs = AchievementInputs {
            discipline: &sync.metrics,
            weekly: &weekly,
            grading: &grading,
            rows: &sync.rows,
            now,
        };
        let (next, newly) = evaluate_unlocks(&unlocked, &inputs);
        if !newly.is_empty() {
            info!("achievements unlocked: {}", newly.join(", "));
            self.storage().write_json(keys::ACHIEVEMENTS, &next);
        }
        sync.metrics
    }

    pub fn weekly_performance(&mut self) -> WeeklyPerformance {
        let sync = self.sync_discipline();
        build_weekly_performance(&sync.rows, &self.grading_history(), self.today())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::DailyRecord;
    use chrono::Duration;

    fn key(s: &str) -> DateKey {
        s.parse().expect("date key")
    }

    #[test]
    fn grade_thresholds() {
        assert_eq!(Grade::from_percent(100), Grade::S);
        assert_eq!(Grade::from_percent(80), Grade::A);
        assert_eq!(Grade::from_percent(79), Grade::B);
        assert_eq!(Grade::from_percent(40), Grade::C);
        assert_eq!(Grade::from_percent(39), Grade::F);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(5, 0), 0);
    }

    #[test]
    fn evening_with_pending_tasks_is_at_risk() {
        let today = key("2024-01-03");
        let mut done = Habit::new("h1", "Read", 10);
        done.history.insert(today, 1);
        let pending = Habit::new("h2", "Walk", 10);
        let mut old = Quest::new("q-old", "Old", Difficulty::Easy, 10, 0);
        old.status = QuestStatus::Completed;
        old.completed_at = Some(key("2023-12-01").start_of_day());

        let evening = today.start_of_day() + Duration::hours(20);
        let snap = build_today_snapshot(
            &[done.clone(), pending.clone()],
            &[old.clone()],
            &DailyLedger::new(),
            evening,
        );
        assert_eq!(snap.total_tasks, 2);
        assert_eq!(snap.completion_percent, 50);
        assert_eq!(snap.grade, Grade::C);
        assert!(snap.at_risk);

        let morning = today.start_of_day() + Duration::hours(9);
        let snap = build_today_snapshot(&[done, pending], &[old], &DailyLedger::new(), morning);
        assert!(!snap.at_risk);
    }

    #[test]
    fn weekly_prefers_stored_grades() {
        let end = key("2024-01-07");
        let rows = vec![HistoryRow {
            date: key("2024-01-06"),
            record: DailyRecord {
                xp_gained: 120,
                habits_done: 1,
                total_habits: 2,
                ..Default::default()
            },
        }];
        let mut grading = GradingHistory::new();
        grading.insert(
            end,
            DailyGrade {
                grade: Grade::S,
                completion_percent: 100,
                tasks_completed: 3,
                tasks_total: 3,
                xp_gained: 0,
                gold_gained: 0,
                at_risk: false,
                updated_at: end.start_of_day(),
            },
        );
        let weekly = build_weekly_performance(&rows, &grading, end);
        assert_eq!(weekly.daily.len(), 7);
        assert_eq!(weekly.daily[5].completion_percent, 50);
        assert_eq!(weekly.daily[6].grade, Grade::S);
        assert_eq!(weekly.weekly_xp, 120);
        assert_eq!(weekly.total_tasks_completed, 4);
        // (50 + 100) / 700
        assert_eq!(weekly.average_completion, 21);
        assert_eq!(weekly.best_day, Some(end));
        assert_eq!(weekly.worst_day, Some(key("2024-01-01")));
    }
}
