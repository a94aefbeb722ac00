//! Whole-profile export and import.
//!
//! A snapshot is one JSON object:
//!
//! ```json
//! {
//!   "version": 1,
//!   "exportedAt": "2024-01-03T12:00:00Z",
//!   "state": { ... },
//!   "quests": [ ... ],
//!   "habits": [ ... ],
//!   "rewardLog": [ ... ],
//!   "gradingHistory": { ... },
//!   "achievements": { ... },
//!   "lastAction": { ... },
//!   "lastRollover": "2024-01-03",
//!   "focusId": "q1"
//! }
//! ```
//!
//! Import validates the whole document before writing any section.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::engine::errors::EngineError;

use super::{keys, Storage};

pub const SNAPSHOT_VERSION: u64 = 1;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Shape {
    Object,
    List,
    ObjectOrNull,
    Text,
}

/// (snapshot field, storage key, expected shape)
const SECTIONS: [(&str, &str, Shape); 9] = [
    ("state", keys::PLAYER_STATE, Shape::Object),
    ("quests", keys::QUESTS, Shape::List),
    ("habits", keys::HABITS, Shape::List),
    ("rewardLog", keys::REWARD_LOG, Shape::List),
    ("gradingHistory", keys::GRADING_HISTORY, Shape::Object),
    ("achievements", keys::ACHIEVEMENTS, Shape::Object),
    ("lastAction", keys::LAST_ACTION, Shape::ObjectOrNull),
    ("lastRollover", keys::LAST_ROLLOVER, Shape::Text),
    ("focusId", keys::FOCUS_QUEST, Shape::Text),
];

fn shape_matches(value: &Value, shape: Shape) -> bool {
    match shape {
        Shape::Object => value.is_object(),
        Shape::List => value.is_array(),
        Shape::ObjectOrNull => value.is_object() || value.is_null(),
        Shape::Text => value.is_string(),
    }
}

/// Gather every persisted key into one document.
pub fn export_snapshot(storage: &Storage, now: DateTime<Utc>) -> Value {
    let mut doc = Map::new();
    doc.insert("version".into(), json!(SNAPSHOT_VERSION));
    doc.insert("exportedAt".into(), json!(now.to_rfc3339()));
    for (field, key, shape) in SECTIONS {
        let value = match shape {
            Shape::Text => Value::String(storage.read_string(key, "")),
            Shape::List => Value::Array(storage.read_raw_list(key)),
            Shape::Object => storage
                .read_value(key)
                .filter(Value::is_object)
                .unwrap_or_else(|| json!({})),
            Shape::ObjectOrNull => storage.read_value(key).unwrap_or(Value::Null),
        };
        doc.insert(field.into(), value);
    }
    Value::Object(doc)
}

/// Write back each section present in `doc`. Returns how many sections were
/// written. A document with any mistyped section is rejected untouched.
pub fn import_snapshot(storage: &Storage, doc: &Value) -> Result<usize, EngineError> {
    let object = doc
        .as_object()
        .ok_or_else(|| EngineError::InvalidSnapshot("document is not an object".into()))?;

    if let Some(version) = object.get("version") {
        match version.as_u64() {
            Some(v) if v <= SNAPSHOT_VERSION => {}
            _ => {
                return Err(EngineError::InvalidSnapshot(format!(
                    "unsupported version {}",
                    version
                )))
            }
        }
    }

    for (field, _, shape) in SECTIONS {
        if let Some(value) = object.get(field) {
            if !shape_matches(value, shape) {
                return Err(EngineError::InvalidSnapshot(format!(
                    "section {} has the wrong type",
                    field
                )));
            }
        }
    }

    let mut written = 0;
    for (field, key, shape) in SECTIONS {
        let Some(value) = object.get(field) else {
            continue;
        };
        match (shape, value) {
            (Shape::Text, Value::String(text)) => storage.write_string(key, text),
            _ => storage.write_json(key, value),
        }
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_then_import_into_empty_store() {
        let source = Storage::in_memory();
        source.write_json(keys::QUESTS, &json!([{"id": "q1", "status": "active"}]));
        source.write_string(keys::FOCUS_QUEST, "q1");
        let doc = export_snapshot(&source, Utc::now());
        assert_eq!(doc["focusId"], "q1");
        assert_eq!(doc["habits"], json!([]));

        let target = Storage::in_memory();
        let written = import_snapshot(&target, &doc).expect("import");
        assert_eq!(written, SECTIONS.len());
        assert_eq!(target.read_string(keys::FOCUS_QUEST, ""), "q1");
        assert_eq!(target.read_raw_list(keys::QUESTS).len(), 1);
    }

    #[test]
    fn malformed_documents_write_nothing() {
        let target = Storage::in_memory();
        let doc = json!({"quests": [], "habits": "nope"});
        assert!(import_snapshot(&target, &doc).is_err());
        assert!(target.read_value(keys::QUESTS).is_none());
        assert!(import_snapshot(&target, &json!([1, 2])).is_err());
        assert!(import_snapshot(&target, &json!({"version": 9})).is_err());
    }
}
