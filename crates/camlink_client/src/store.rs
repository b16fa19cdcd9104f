//! Local cache of mirrored property values.
//!
//! The store is the single source of truth observers read from. It holds
//! owned copies only; callers always receive clones.
//!
//! ## Key Invariants
//!
//! - An update for a name the store does not know is a no-op: it never
//!   creates an entry.
//! - Merges are shallow: every key in the update overwrites the stored key,
//!   keys absent from the update keep their value, nested objects are
//!   replaced whole.
//! - Each update is one fetch-merge-replace under a single write lock, so no
//!   reader sees a half-merged value.

use camlink_protocol::{PropertyName, PropertyValue};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Authoritative local cache of property name to value.
#[derive(Debug, Default)]
pub struct PropertyStore {
    /// `None` marks a name that is tracked but has not received a value yet.
    entries: RwLock<HashMap<PropertyName, Option<PropertyValue>>>,
}

impl PropertyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value, or `None` if absent or not yet populated.
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        self.entries.read().get(name).cloned().flatten()
    }

    /// Returns true if updates for `name` are accepted.
    pub fn is_tracked(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Starts accepting updates for `name` without giving it a value.
    ///
    /// Returns true if the name was not tracked before. An existing value is
    /// left untouched.
    pub fn track(&self, name: &str) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            false
        } else {
            entries.insert(name.to_string(), None);
            true
        }
    }

    /// Stops accepting updates for `name` and drops its value.
    ///
    /// Returns true if the name was tracked.
    pub fn untrack(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    /// Creates or fully replaces an entry.
    pub fn seed(&self, name: &str, value: PropertyValue) {
        self.entries.write().insert(name.to_string(), Some(value));
    }

    /// Merges `partial` into the entry for `name`.
    ///
    /// Returns the merged value, or `None` (and changes nothing) when the name
    /// is not tracked. A tracked name without a value merges into an empty
    /// record.
    pub fn apply_update(&self, name: &str, partial: &PropertyValue) -> Option<PropertyValue> {
        let mut entries = self.entries.write();
        let slot = entries.get_mut(name)?;

        let mut merged = slot.clone().unwrap_or_default();
        shallow_merge(&mut merged, partial);
        *slot = Some(merged.clone());
        Some(merged)
    }

    /// Names currently tracked, sorted.
    pub fn names(&self) -> Vec<PropertyName> {
        let mut names: Vec<_> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Copies every populated entry.
    pub fn snapshot(&self) -> HashMap<PropertyName, PropertyValue> {
        self.entries
            .read()
            .iter()
            .filter_map(|(name, value)| value.clone().map(|v| (name.clone(), v)))
            .collect()
    }

    /// Number of tracked names.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Assigns every key of `partial` onto `target`.
pub fn shallow_merge(target: &mut PropertyValue, partial: &PropertyValue) {
    for (key, value) in partial {
        target.insert(key.clone(), value.clone());
    }
}
