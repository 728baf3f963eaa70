//! In-memory version store

use crate::error::StoreError;
use crate::traits::VersionStore;
use crate::types::{CorporateActionEvent, EventKey};
use std::collections::HashMap;
use std::sync::RwLock;

/// HashMap-backed [`VersionStore`].
///
/// Exists to make the logical store contract executable and testable; a real
/// deployment would put a database behind the same trait. The conflict check
/// and the write happen under one write lock, which is what gives
/// `upsert_many` its all-or-nothing compare-and-swap semantics.
#[derive(Debug, Default)]
pub struct InMemoryVersionStore {
    events: RwLock<HashMap<EventKey, CorporateActionEvent>>,
}

impl InMemoryVersionStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys with a current state
    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(_: impl std::fmt::Debug) -> StoreError {
    StoreError::Unavailable {
        reason: "store lock poisoned".to_string(),
    }
}

impl VersionStore for InMemoryVersionStore {
    fn get_many(
        &self,
        keys: &[EventKey],
    ) -> Result<HashMap<EventKey, CorporateActionEvent>, StoreError> {
        let events = self.events.read().map_err(poisoned)?;
        Ok(keys
            .iter()
            .filter_map(|key| events.get(key).map(|event| (key.clone(), event.clone())))
            .collect())
    }

    fn upsert_many(
        &self,
        states: Vec<CorporateActionEvent>,
    ) -> Result<Vec<CorporateActionEvent>, StoreError> {
        let mut events = self.events.write().map_err(poisoned)?;

        // Validate the whole batch before touching anything, so a conflict
        // leaves the store exactly as it was.
        for state in &states {
            let current = events.get(&state.key);
            let accepted = match current {
                None => state.version == 1,
                Some(existing) => state.version == existing.version + 1,
            };
            if !accepted {
                return Err(StoreError::Conflict {
                    key: state.key.clone(),
                    attempted: state.version,
                    current: current.map(|c| c.version),
                });
            }
        }

        for state in &states {
            events.insert(state.key.clone(), state.clone());
        }

        Ok(states)
    }
}
