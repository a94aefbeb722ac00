//! Test utilities & fixtures.
//! Games run on an in-memory store and a fixed clock pinned to noon UTC.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use hunterlog::engine::{DateKey, FixedClock, Game};
use hunterlog::storage::{keys, Storage};

pub fn key(s: &str) -> DateKey {
    s.parse().expect("date key")
}

#[allow(dead_code)]
pub fn at(date: &str, hour: i64) -> DateTime<Utc> {
    key(date).start_of_day() + Duration::hours(hour)
}

/// A store seeded with the given quest and habit lists.
#[allow(dead_code)]
pub fn seeded_storage(quests: Value, habits: Value) -> Storage {
    let storage = Storage::in_memory();
    storage.write_json(keys::QUESTS, &quests);
    storage.write_json(keys::HABITS, &habits);
    storage
}

/// Load a game over `storage` at noon on `date`. The clock is returned so
/// tests can move time forward.
pub fn game_on(storage: Storage, date: &str) -> (Game, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::at_date(key(date)));
    let game = Game::load(storage, clock.clone());
    (game, clock)
}
