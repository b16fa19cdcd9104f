//! Observer callbacks keyed by property name.
//!
//! Any number of callbacks can be bound to one name. Delivery is in
//! registration order; a failing or panicking callback is logged and does not
//! stop delivery to the callbacks after it.
//!
//! The registry holds only the callbacks and the names they target, never
//! the objects the callbacks update.

use crate::error::{CallbackError, ClientError};
use camlink_protocol::{PropertyName, PropertyValue};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// A change callback. Receives the now-current value of the property.
pub type Callback = Arc<dyn Fn(&PropertyValue) -> Result<(), CallbackError> + Send + Sync>;

/// Identifies one binding for [`BindingRegistry::unbind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingHandle(u64);

impl BindingHandle {
    /// Numeric id, unique within one registry.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Result of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Callbacks that returned `Ok`.
    pub delivered: usize,
    /// Callbacks that returned an error or panicked.
    pub failed: usize,
}

struct Binding {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct Bindings {
    by_name: HashMap<PropertyName, Vec<Binding>>,
    names: HashMap<u64, PropertyName>,
}

/// Registry of change callbacks.
#[derive(Default)]
pub struct BindingRegistry {
    bindings: RwLock<Bindings>,
    next_id: AtomicU64,
    faults: AtomicU64,
}

impl BindingRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fallible callback for `name`.
    pub fn bind<F>(&self, name: &str, callback: F) -> BindingHandle
    where
        F: Fn(&PropertyValue) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut bindings = self.bindings.write();
        bindings
            .by_name
            .entry(name.to_string())
            .or_default()
            .push(Binding {
                id,
                callback: Arc::new(callback),
            });
        bindings.names.insert(id, name.to_string());
        BindingHandle(id)
    }

    /// Registers a callback that cannot fail.
    pub fn on_change<F>(&self, name: &str, callback: F) -> BindingHandle
    where
        F: Fn(&PropertyValue) + Send + Sync + 'static,
    {
        self.bind(name, move |value| {
            callback(value);
            Ok(())
        })
    }

    /// Removes a binding. Returns false if it was already gone.
    pub fn unbind(&self, handle: BindingHandle) -> bool {
        let mut bindings = self.bindings.write();
        let Some(name) = bindings.names.remove(&handle.0) else {
            return false;
        };
        if let Some(list) = bindings.by_name.get_mut(&name) {
            list.retain(|b| b.id != handle.0);
            if list.is_empty() {
                bindings.by_name.remove(&name);
            }
        }
        true
    }

    /// Returns true while `handle` is registered.
    pub fn is_bound(&self, handle: BindingHandle) -> bool {
        self.bindings.read().names.contains_key(&handle.0)
    }

    /// Calls every live callback bound to `name`, in registration order.
    ///
    /// Callbacks run without any registry lock held, so they may bind or
    /// unbind. A callback unbound by an earlier one in the same fan-out is
    /// skipped.
    pub fn notify(&self, name: &str, value: &PropertyValue) -> NotifyReport {
        let targets: Vec<(u64, Callback)> = match self.bindings.read().by_name.get(name) {
            Some(list) => list
                .iter()
                .map(|b| (b.id, Arc::clone(&b.callback)))
                .collect(),
            None => return NotifyReport::default(),
        };

        let mut report = NotifyReport::default();
        for (id, callback) in targets {
            if !self.is_bound(BindingHandle(id)) {
                continue;
            }
            if self.invoke(name, &callback, value) {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    /// Calls a single binding, if it is still registered.
    ///
    /// Returns false if the binding is gone or its callback failed.
    pub fn deliver_to(&self, handle: BindingHandle, value: &PropertyValue) -> bool {
        let target = {
            let bindings = self.bindings.read();
            bindings.names.get(&handle.0).and_then(|name| {
                bindings.by_name.get(name).and_then(|list| {
                    list.iter()
                        .find(|b| b.id == handle.0)
                        .map(|b| (name.clone(), Arc::clone(&b.callback)))
                })
            })
        };

        match target {
            Some((name, callback)) => self.invoke(&name, &callback, value),
            None => false,
        }
    }

    /// Number of callbacks bound to `name`.
    pub fn binding_count(&self, name: &str) -> usize {
        self.bindings
            .read()
            .by_name
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Total number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.read().names.len()
    }

    /// Returns true if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Callback failures observed since creation.
    pub fn fault_count(&self) -> u64 {
        self.faults.load(Ordering::SeqCst)
    }

    fn invoke(&self, name: &str, callback: &Callback, value: &PropertyValue) -> bool {
        let message = match catch_unwind(AssertUnwindSafe(|| callback(value))) {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };

        self.faults.fetch_add(1, Ordering::SeqCst);
        let fault = ClientError::BindingCallback {
            property: name.to_string(),
            message,
        };
        warn!(property = %name, error = %fault, "binding callback failed");
        false
    }
}

impl std::fmt::Debug for BindingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingRegistry")
            .field("bindings", &self.len())
            .field("faults", &self.fault_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn value(v: serde_json::Value) -> PropertyValue {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn delivers_in_registration_order() {
        let registry = BindingRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            registry.on_change("/video/whiteBalance", move |_| log.lock().push(tag));
        }

        let report = registry.notify("/video/whiteBalance", &value(json!({"whiteBalance": 5600})));
        assert_eq!(report.delivered, 3);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failing_callback_does_not_stop_fanout() {
        let registry = BindingRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        registry.bind("/video/gain", |_| Err("widget gone".into()));
        registry.bind("/video/gain", |_| panic!("boom"));
        {
            let seen = Arc::clone(&seen);
            registry.on_change("/video/gain", move |v| seen.lock().push(v["gain"].clone()));
        }

        let report = registry.notify("/video/gain", &value(json!({"gain": 12})));
        assert_eq!(report, NotifyReport { delivered: 1, failed: 2 });
        assert_eq!(*seen.lock(), vec![json!(12)]);
        assert_eq!(registry.fault_count(), 2);
    }

    #[test]
    fn notify_only_targets_bound_name() {
        let registry = BindingRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));
        {
            let hits = Arc::clone(&hits);
            registry.on_change("/video/gain", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        let report = registry.notify("/video/shutter", &PropertyValue::new());
        assert_eq!(report, NotifyReport::default());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unbind_is_idempotent() {
        let registry = BindingRegistry::new();
        let handle = registry.on_change("/video/gain", |_| {});
        assert_eq!(registry.binding_count("/video/gain"), 1);

        assert!(registry.unbind(handle));
        assert!(!registry.unbind(handle));
        assert_eq!(registry.binding_count("/video/gain"), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn handles_are_unique_across_names() {
        let registry = BindingRegistry::new();
        let a = registry.on_change("/video/gain", |_| {});
        let b = registry.on_change("/video/gain", |_| {});
        let c = registry.on_change("/video/shutter", |_| {});
        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn callback_unbound_mid_fanout_is_skipped() {
        let registry = Arc::new(BindingRegistry::new());
        let later_hits = Arc::new(AtomicU64::new(0));
        let later = Arc::new(Mutex::new(None::<BindingHandle>));

        {
            let registry_ref = Arc::downgrade(&registry);
            let later = Arc::clone(&later);
            registry.on_change("/p", move |_| {
                if let (Some(registry), Some(handle)) = (registry_ref.upgrade(), *later.lock()) {
                    registry.unbind(handle);
                }
            });
        }
        {
            let later_hits = Arc::clone(&later_hits);
            let handle = registry.on_change("/p", move |_| {
                later_hits.fetch_add(1, Ordering::SeqCst);
            });
            *later.lock() = Some(handle);
        }

        let report = registry.notify("/p", &PropertyValue::new());
        assert_eq!(report.delivered, 1);
        assert_eq!(later_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callback_may_bind_during_fanout() {
        let registry = Arc::new(BindingRegistry::new());
        {
            let registry_ref = Arc::downgrade(&registry);
            registry.on_change("/p", move |_| {
                if let Some(registry) = registry_ref.upgrade() {
                    registry.on_change("/p", |_| {});
                }
            });
        }

        registry.notify("/p", &PropertyValue::new());
        assert_eq!(registry.binding_count("/p"), 2);
    }

    #[test]
    fn deliver_to_single_binding() {
        let registry = BindingRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));
        let other = Arc::new(AtomicU64::new(0));
        let handle = {
            let hits = Arc::clone(&hits);
            registry.on_change("/p", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        {
            let other = Arc::clone(&other);
            registry.on_change("/p", move |_| {
                other.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(registry.deliver_to(handle, &PropertyValue::new()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);

        registry.unbind(handle);
        assert!(!registry.deliver_to(handle, &PropertyValue::new()));
    }
}
