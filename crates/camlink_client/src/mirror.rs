//! Property store and binding registry wired together.

use crate::bindings::{BindingHandle, BindingRegistry, NotifyReport};
use crate::error::CallbackError;
use crate::store::PropertyStore;
use camlink_protocol::{PropertyName, PropertyValue};
use parking_lot::ReentrantMutex;
use std::collections::HashMap;
use tracing::debug;

/// Local mirror of the device's properties.
///
/// Every accepted write to the store is followed by a `Changed(name, value)`
/// fan-out to the bindings for that name. A write and its fan-out, and a new
/// binding and its initial delivery, are serialized against each other so an
/// observer never sees values out of order. The lock is re-entrant: callbacks
/// may read, write, bind and unbind.
#[derive(Debug, Default)]
pub struct PropertyMirror {
    store: PropertyStore,
    bindings: BindingRegistry,
    dispatch: ReentrantMutex<()>,
}

impl PropertyMirror {
    /// Creates an empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value of `name`.
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        self.store.get(name)
    }

    /// Creates or replaces an entry and notifies its bindings.
    pub fn seed(&self, name: &str, value: PropertyValue) -> NotifyReport {
        let _guard = self.dispatch.lock();
        self.store.seed(name, value.clone());
        self.bindings.notify(name, &value)
    }

    /// Starts accepting updates for `name`. No notification is sent.
    pub fn track(&self, name: &str) -> bool {
        self.store.track(name)
    }

    /// Forgets `name`. Bindings stay registered but see no further updates
    /// until the name is tracked again.
    pub fn untrack(&self, name: &str) -> bool {
        self.store.untrack(name)
    }

    /// Merges a partial update.
    ///
    /// Returns `None` (without notifying) for an untracked name; otherwise the
    /// merged value after it has been delivered to every binding.
    pub fn apply_update(&self, name: &str, partial: &PropertyValue) -> Option<PropertyValue> {
        let _guard = self.dispatch.lock();
        let Some(merged) = self.store.apply_update(name, partial) else {
            debug!(property = %name, "ignoring update for untracked property");
            return None;
        };
        let report = self.bindings.notify(name, &merged);
        debug!(
            property = %name,
            delivered = report.delivered,
            failed = report.failed,
            "property changed"
        );
        Some(merged)
    }

    /// Binds a fallible callback.
    ///
    /// If `name` already has a value it is delivered to this callback before
    /// `bind` returns.
    pub fn bind<F>(&self, name: &str, callback: F) -> BindingHandle
    where
        F: Fn(&PropertyValue) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let _guard = self.dispatch.lock();
        let handle = self.bindings.bind(name, callback);
        if let Some(current) = self.store.get(name) {
            self.bindings.deliver_to(handle, &current);
        }
        handle
    }

    /// Binds a callback that cannot fail. Same delivery rules as [`bind`](Self::bind).
    pub fn on_change<F>(&self, name: &str, callback: F) -> BindingHandle
    where
        F: Fn(&PropertyValue) + Send + Sync + 'static,
    {
        self.bind(name, move |value| {
            callback(value);
            Ok(())
        })
    }

    /// Removes a binding. Safe to call more than once.
    pub fn unbind(&self, handle: BindingHandle) -> bool {
        self.bindings.unbind(handle)
    }

    /// Returns true if updates for `name` are accepted.
    pub fn is_tracked(&self, name: &str) -> bool {
        self.store.is_tracked(name)
    }

    /// Names currently tracked, sorted.
    pub fn names(&self) -> Vec<PropertyName> {
        self.store.names()
    }

    /// Copies every populated entry.
    pub fn snapshot(&self) -> HashMap<PropertyName, PropertyValue> {
        self.store.snapshot()
    }

    /// The underlying store.
    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    /// The underlying registry.
    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn value(v: Value) -> PropertyValue {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn bind_after_seed_delivers_synchronously() {
        let mirror = PropertyMirror::new();
        mirror.seed("/video/gain", value(json!({"gain": 10})));

        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            mirror.on_change("/video/gain", move |v| seen.lock().push(v.clone()));
        }

        assert_eq!(*seen.lock(), vec![value(json!({"gain": 10}))]);
    }

    #[test]
    fn bind_before_seed_fires_on_seed() {
        let mirror = PropertyMirror::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            mirror.on_change("/video/gain", move |v| seen.lock().push(v.clone()));
        }
        assert!(seen.lock().is_empty());

        mirror.seed("/video/gain", value(json!({"gain": 10})));
        assert_eq!(*seen.lock(), vec![value(json!({"gain": 10}))]);
    }

    #[test]
    fn bind_to_pending_entry_waits_for_first_update() {
        let mirror = PropertyMirror::new();
        mirror.track("/video/gain");

        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            mirror.on_change("/video/gain", move |v| seen.lock().push(v.clone()));
        }
        assert!(seen.lock().is_empty());

        mirror.apply_update("/video/gain", &value(json!({"gain": 3})));
        assert_eq!(*seen.lock(), vec![value(json!({"gain": 3}))]);
    }

    #[test]
    fn one_update_triggers_each_binding_once_in_order() {
        let mirror = PropertyMirror::new();
        mirror.seed("/video/whiteBalance", value(json!({"whiteBalance": 5600})));

        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b"] {
            let log = Arc::clone(&log);
            mirror.on_change("/video/whiteBalance", move |v| {
                log.lock().push((tag, v["whiteBalance"].clone()))
            });
        }
        log.lock().clear();
        assert_eq!(mirror.bindings().binding_count("/video/whiteBalance"), 2);

        mirror.apply_update("/video/whiteBalance", &value(json!({"whiteBalance": 3200})));
        assert_eq!(
            *log.lock(),
            vec![("a", json!(3200)), ("b", json!(3200))]
        );
    }

    #[test]
    fn untracked_update_notifies_nobody() {
        let mirror = PropertyMirror::new();
        let hits = Arc::new(Mutex::new(0));
        {
            let hits = Arc::clone(&hits);
            mirror.on_change("/video/shutter", move |_| *hits.lock() += 1);
        }

        assert!(mirror
            .apply_update("/video/shutter", &value(json!({"shutterSpeed": 500})))
            .is_none());
        assert_eq!(*hits.lock(), 0);
        assert_eq!(mirror.get("/video/shutter"), None);
    }

    #[test]
    fn callback_reads_merged_value_from_mirror() {
        let mirror = Arc::new(PropertyMirror::new());
        mirror.seed("/video/gain", value(json!({"gain": 1})));

        let observed = Arc::new(Mutex::new(None));
        {
            let weak = Arc::downgrade(&mirror);
            let observed = Arc::clone(&observed);
            mirror.on_change("/video/gain", move |_| {
                if let Some(mirror) = weak.upgrade() {
                    *observed.lock() = mirror.get("/video/gain");
                }
            });
        }

        mirror.apply_update("/video/gain", &value(json!({"gain": 2})));
        assert_eq!(*observed.lock(), Some(value(json!({"gain": 2}))));
    }
}
