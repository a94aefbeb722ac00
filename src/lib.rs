//! # Hunterlog - Progression & Rollover Engine
//!
//! Hunterlog turns habits and quests into an RPG-style progression: XP and
//! levels, an E-to-S rank, a gold balance, streaks and a day-by-day ledger.
//! This crate is the engine behind it plus a small CLI.
//!
//! ## Features
//!
//! - **Leveling**: a closed-form XP curve with multi-level carry in both directions
//! - **Transaction Pipeline**: multiplier, daily XP cap, penalty severity and floors
//! - **Daily History**: an append-only ledger with synthesis for pre-ledger days
//! - **Discipline**: streaks, misses and perfect days derived from the ledger
//! - **Rollover**: once-a-day overdue quest failure and habit streak resets
//! - **Reports**: daily grades, weekly performance and achievements
//! - **Storage**: memory, sled and one-JSON-file-per-key backends
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hunterlog::engine::{Game, GameAction, SystemClock};
//! use hunterlog::storage::Storage;
//!
//! let mut game = Game::load(Storage::in_memory(), Arc::new(SystemClock));
//! game.run_rollover();
//! game.dispatch(GameAction::AddXp { amount: 120.0 });
//! println!("level {} ({})", game.state().level, game.state().rank);
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - state, transactions, history, discipline, rollover and the job scheduler
//! - [`storage`] - key-value backends and snapshot export/import
//! - [`config`] - TOML configuration for the binary
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   CLI / Jobs    │ ← clap commands, tokio scheduler
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Game          │ ← single owner of PlayerState
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Storage       │ ← memory / sled / files
//! └─────────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod storage;
