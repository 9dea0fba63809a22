//! Persistable unit contract and registration table
//!
//! Game subsystems (character, world generation, calendar, quests,
//! discoveries) take part in the save pipeline through this contract and
//! nothing else. The core never learns a subsystem's concrete type: each
//! unit is addressed purely through `capture`/`restore` keyed by a stable
//! string. This is a registry of capabilities, not an inheritance
//! hierarchy.

use serde_json::Value;
use std::sync::Arc;

use crate::error::{Result, SaveError, UnitError};

/// Contract for a subsystem-owned block of saveable state
///
/// Implementations must be cheap to capture and must fail with a typed
/// [`UnitError`] on malformed input, never panic: a unit failure is
/// isolated and the rest of the save/load continues without it.
pub trait Persistable: Send + Sync {
    /// Stable key, unique per registration; used as the map key in the
    /// save document
    fn key(&self) -> &str;

    /// Schema version of this unit's block; informational
    fn schema_version(&self) -> u32;

    /// Produce an opaque block describing current state
    fn capture(&self) -> std::result::Result<Value, UnitError>;

    /// Apply a previously captured block
    fn restore(&self, block: &Value) -> std::result::Result<(), UnitError>;
}

/// Ordered registration table of persistable units
///
/// Iteration order is registration order, which in turn fixes the order of
/// unit blocks in the on-disk document. The registry is owned by the save
/// manager for its process lifetime and is never persisted itself.
#[derive(Default)]
pub struct UnitRegistry {
    units: Vec<Arc<dyn Persistable>>,
}

impl UnitRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit; fails on a duplicate key
    pub fn register(&mut self, unit: Arc<dyn Persistable>) -> Result<()> {
        if self.units.iter().any(|u| u.key() == unit.key()) {
            return Err(SaveError::DuplicateKey(unit.key().to_string()));
        }
        self.units.push(unit);
        Ok(())
    }

    /// Remove a unit by key; returns true if it was registered
    pub fn unregister(&mut self, key: &str) -> bool {
        let before = self.units.len();
        self.units.retain(|u| u.key() != key);
        self.units.len() != before
    }

    /// Iterate units in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Persistable>> {
        self.units.iter()
    }

    /// Number of registered units
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Look up a unit by key
    pub fn get(&self, key: &str) -> Option<&Arc<dyn Persistable>> {
        self.units.iter().find(|u| u.key() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct CounterUnit {
        key: String,
        value: Mutex<i64>,
    }

    impl CounterUnit {
        fn new(key: &str, value: i64) -> Arc<Self> {
            Arc::new(CounterUnit {
                key: key.to_string(),
                value: Mutex::new(value),
            })
        }
    }

    impl Persistable for CounterUnit {
        fn key(&self) -> &str {
            &self.key
        }

        fn schema_version(&self) -> u32 {
            1
        }

        fn capture(&self) -> std::result::Result<Value, UnitError> {
            Ok(json!({ "value": *self.value.lock().unwrap() }))
        }

        fn restore(&self, block: &Value) -> std::result::Result<(), UnitError> {
            let v = block
                .get("value")
                .and_then(Value::as_i64)
                .ok_or_else(|| UnitError::MalformedBlock("missing value".to_string()))?;
            *self.value.lock().unwrap() = v;
            Ok(())
        }
    }

    #[test]
    fn test_register_preserves_order() {
        let mut registry = UnitRegistry::new();
        registry.register(CounterUnit::new("c", 1)).unwrap();
        registry.register(CounterUnit::new("a", 2)).unwrap();
        registry.register(CounterUnit::new("b", 3)).unwrap();

        let keys: Vec<&str> = registry.iter().map(|u| u.key()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_register_duplicate_key_rejected() {
        let mut registry = UnitRegistry::new();
        registry.register(CounterUnit::new("character", 1)).unwrap();
        let err = registry
            .register(CounterUnit::new("character", 2))
            .unwrap_err();
        assert!(matches!(err, SaveError::DuplicateKey(k) if k == "character"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let mut registry = UnitRegistry::new();
        registry.register(CounterUnit::new("character", 1)).unwrap();
        assert!(registry.unregister("character"));
        assert!(!registry.unregister("character"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_capture_restore_roundtrip() {
        let unit = CounterUnit::new("counter", 7);
        let block = unit.capture().unwrap();

        let target = CounterUnit::new("counter", 0);
        target.restore(&block).unwrap();
        assert_eq!(*target.value.lock().unwrap(), 7);
    }

    #[test]
    fn test_restore_malformed_block_is_typed_error() {
        let unit = CounterUnit::new("counter", 7);
        let err = unit.restore(&json!({"wrong": true})).unwrap_err();
        assert!(matches!(err, UnitError::MalformedBlock(_)));
        // State untouched on failure
        assert_eq!(*unit.value.lock().unwrap(), 7);
    }

    #[test]
    fn test_get_by_key() {
        let mut registry = UnitRegistry::new();
        registry.register(CounterUnit::new("world", 1)).unwrap();
        assert!(registry.get("world").is_some());
        assert!(registry.get("quests").is_none());
    }
}
