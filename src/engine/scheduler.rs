//! Background job loop.
//!
//! One task owns the [`Game`]. It runs the rollover and the discipline job at
//! startup, then on fixed intervals, and serves commands sent through a
//! [`SchedulerHandle`] in between. Every mutation is serialized through this
//! task, so jobs and player actions never interleave.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::actions::{ActionOutcome, GameAction};
use super::errors::EngineError;
use super::state::Game;
use super::types::PlayerState;

pub const DEFAULT_DISCIPLINE_INTERVAL_MINUTES: u64 = 15;
pub const DEFAULT_ROLLOVER_INTERVAL_MINUTES: u64 = 60;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub discipline_interval: Duration,
    pub rollover_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            discipline_interval: Duration::from_secs(DEFAULT_DISCIPLINE_INTERVAL_MINUTES * 60),
            rollover_interval: Duration::from_secs(DEFAULT_ROLLOVER_INTERVAL_MINUTES * 60),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub actions_applied: u64,
    pub discipline_runs: u64,
    pub rollovers_run: u64,
    pub rollovers_skipped: u64,
}

enum Command {
    Apply(GameAction, oneshot::Sender<ActionOutcome>),
    Snapshot(oneshot::Sender<PlayerState>),
    Stats(oneshot::Sender<SchedulerStats>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

fn closed() -> EngineError {
    EngineError::Internal("scheduler is not running".into())
}

impl SchedulerHandle {
    /// Run one action on the scheduler task and wait for its outcome.
    pub async fn apply(&self, action: GameAction) -> Result<ActionOutcome, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Command::Apply(action, tx)).map_err(|_| closed())?;
        rx.await.map_err(|_| closed())
    }

    pub async fn snapshot(&self) -> Result<PlayerState, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Command::Snapshot(tx)).map_err(|_| closed())?;
        rx.await.map_err(|_| closed())
    }

    pub async fn stats(&self) -> Result<SchedulerStats, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Command::Stats(tx)).map_err(|_| closed())?;
        rx.await.map_err(|_| closed())
    }

    /// Stop the loop and wait for it to acknowledge.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

fn run_rollover_job(game: &mut Game, stats: &mut SchedulerStats) {
    let report = game.run_rollover();
    if report.skipped {
        stats.rollovers_skipped += 1;
    } else {
        stats.rollovers_run += 1;
    }
}

fn run_discipline_job(game: &mut Game, stats: &mut SchedulerStats) {
    let metrics = game.discipline_tick();
    stats.discipline_runs += 1;
    debug!(
        "discipline: streak {} (longest {}), at risk {}",
        metrics.current_streak, metrics.longest_streak, metrics.at_risk
    );
    if metrics.at_risk {
        warn!("today's habits are not done yet, streak at risk");
    }
}

/// Spawn the job loop. Must be called from within a tokio runtime.
pub fn start_scheduler(mut game: Game, cfg: SchedulerConfig) -> SchedulerHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
    let handle = SchedulerHandle { tx };

    tokio::spawn(async move {
        let mut stats = SchedulerStats::default();
        run_rollover_job(&mut game, &mut stats);
        run_discipline_job(&mut game, &mut stats);
        info!(
            "scheduler started (discipline every {:?}, rollover check every {:?})",
            cfg.discipline_interval, cfg.rollover_interval
        );

        let mut discipline =
            interval_at(Instant::now() + cfg.discipline_interval, cfg.discipline_interval);
        discipline.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut rollover =
            interval_at(Instant::now() + cfg.rollover_interval, cfg.rollover_interval);
        rollover.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(Command::Apply(action, resp)) => {
                            let outcome = game.dispatch(action);
                            stats.actions_applied += 1;
                            let _ = resp.send(outcome);
                        }
                        Some(Command::Snapshot(resp)) => {
                            let _ = resp.send(game.state().clone());
                        }
                        Some(Command::Stats(resp)) => {
                            let _ = resp.send(stats.clone());
                        }
                        Some(Command::Shutdown(done)) => {
                            let _ = done.send(());
                            break;
                        }
                        None => break,
                    }
                }
                _ = rollover.tick() => run_rollover_job(&mut game, &mut stats),
                _ = discipline.tick() => run_discipline_job(&mut game, &mut stats),
            }
        }
        info!(
            "scheduler stopped: {} actions, {} rollovers, {} discipline runs",
            stats.actions_applied, stats.rollovers_run, stats.discipline_runs
        );
    });

    handle
}
