//! Stable per-document identifiers.
//!
//! The [`IdentityRegistry`] hands out small integer ids in first-seen order,
//! starting at 1. Ids live for the lifetime of the process and are never
//! reused; the registry is not persisted.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::trace;

use crate::types::ResourceLocator;

/// First id handed out by a fresh registry.
const FIRST_ID: u64 = 1;

#[derive(Debug)]
struct RegistryState {
    ids: HashMap<ResourceLocator, u64>,
    next_id: u64,
}

/// Maps resource locators to monotonically assigned integer ids.
///
/// The check-then-insert runs under a single lock, so concurrent handlers
/// can never observe two different ids for the same locator.
#[derive(Debug)]
pub struct IdentityRegistry {
    state: Mutex<RegistryState>,
}

impl IdentityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                ids: HashMap::new(),
                next_id: FIRST_ID,
            }),
        }
    }

    /// Returns the id for `locator`, assigning the next id on first sight.
    pub fn resolve_id(&self, locator: &ResourceLocator) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(&id) = state.ids.get(locator) {
            return id;
        }

        let id = state.next_id;
        state.next_id += 1;
        state.ids.insert(locator.clone(), id);
        trace!(locator = %locator, id, "Assigned document id");
        id
    }

    /// Returns the id already assigned to `locator`, without assigning one.
    #[must_use]
    pub fn get(&self, locator: &ResourceLocator) -> Option<u64> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .get(locator)
            .copied()
    }

    /// Returns the number of locators seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .len()
    }

    /// Returns true if no locator has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
