//! Subscriber registry and dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::hook::HookEvent;
use crate::notify::NotificationDefinition;

/// Callback invoked for each emitted event.
pub type HookCallback = Arc<dyn Fn(&HookEvent) -> Result<()> + Send + Sync>;

/// Filter applied to the notification definition map during boot.
///
/// Filters may add, replace, or remove definitions.
pub type DefinitionFilterFn =
    Arc<dyn Fn(&mut BTreeMap<String, NotificationDefinition>) + Send + Sync>;

struct Subscriber {
    name: String,
    weight: i32,
    callback: HookCallback,
}

struct DefinitionFilter {
    name: String,
    weight: i32,
    filter: DefinitionFilterFn,
}

/// Weight-ordered event bus.
///
/// Subscribers run synchronously in ascending weight order; ties run in
/// registration order. A failing subscriber is logged and skipped, never
/// aborting the emitting operation or later subscribers.
#[derive(Default)]
pub struct HookBus {
    subscribers: RwLock<Vec<Subscriber>>,
    filters: RwLock<Vec<DefinitionFilter>>,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event subscriber under a stable name.
    pub fn subscribe<F>(&self, name: &str, weight: i32, callback: F)
    where
        F: Fn(&HookEvent) -> Result<()> + Send + Sync + 'static,
    {
        let mut subscribers = self.subscribers.write();
        subscribers.push(Subscriber {
            name: name.to_string(),
            weight,
            callback: Arc::new(callback),
        });
        // Stable sort keeps registration order within equal weights.
        subscribers.sort_by_key(|s| s.weight);
        debug!(subscriber = %name, weight, "hook subscriber registered");
    }

    /// Remove every subscriber registered under `name`.
    pub fn unsubscribe(&self, name: &str) {
        self.subscribers.write().retain(|s| s.name != name);
        debug!(subscriber = %name, "hook subscriber removed");
    }

    /// Dispatch an event to all subscribers.
    pub fn emit(&self, event: &HookEvent) {
        // Snapshot the callbacks so subscribers can (un)register from
        // within a callback without deadlocking.
        let snapshot: Vec<(String, HookCallback)> = self
            .subscribers
            .read()
            .iter()
            .map(|s| (s.name.clone(), Arc::clone(&s.callback)))
            .collect();

        debug!(event = %event.name(), subscribers = snapshot.len(), "emitting hook event");

        for (name, callback) in snapshot {
            if let Err(e) = callback(event) {
                error!(
                    subscriber = %name,
                    event = %event.name(),
                    error = %e,
                    "hook subscriber failed, continuing"
                );
            }
        }
    }

    /// Register a notification definition filter.
    pub fn add_definition_filter<F>(&self, name: &str, weight: i32, filter: F)
    where
        F: Fn(&mut BTreeMap<String, NotificationDefinition>) + Send + Sync + 'static,
    {
        let mut filters = self.filters.write();
        filters.push(DefinitionFilter {
            name: name.to_string(),
            weight,
            filter: Arc::new(filter),
        });
        filters.sort_by_key(|f| f.weight);
    }

    /// Run all definition filters over a definition map, in weight order.
    pub fn apply_definition_filters(&self, defs: &mut BTreeMap<String, NotificationDefinition>) {
        let snapshot: Vec<(String, DefinitionFilterFn)> = self
            .filters
            .read()
            .iter()
            .map(|f| (f.name.clone(), Arc::clone(&f.filter)))
            .collect();

        for (name, filter) in snapshot {
            debug!(filter = %name, "applying notification definition filter");
            filter(defs);
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl std::fmt::Debug for HookBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recording_bus() -> (HookBus, Arc<Mutex<Vec<String>>>) {
        (HookBus::new(), Arc::new(Mutex::new(Vec::new())))
    }

    #[test]
    fn subscribers_run_in_weight_order() {
        let (bus, calls) = recording_bus();

        for (name, weight) in [("late", 10), ("early", -10), ("middle", 0)] {
            let calls = Arc::clone(&calls);
            bus.subscribe(name, weight, move |_| {
                calls.lock().unwrap().push(name.to_string());
                Ok(())
            });
        }

        bus.emit(&HookEvent::PluginActivated {
            slug: "blog".into(),
        });

        assert_eq!(*calls.lock().unwrap(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn equal_weights_keep_registration_order() {
        let (bus, calls) = recording_bus();

        for name in ["first", "second", "third"] {
            let calls = Arc::clone(&calls);
            bus.subscribe(name, 0, move |_| {
                calls.lock().unwrap().push(name.to_string());
                Ok(())
            });
        }

        bus.emit(&HookEvent::PluginDeleted {
            slug: "blog".into(),
        });

        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failing_subscriber_does_not_block_later_ones() {
        let (bus, calls) = recording_bus();

        bus.subscribe("broken", 0, |_| anyhow::bail!("subscriber exploded"));

        let recorder = Arc::clone(&calls);
        bus.subscribe("healthy", 1, move |event| {
            recorder.lock().unwrap().push(event.name().to_string());
            Ok(())
        });

        bus.emit(&HookEvent::PluginDeactivated {
            slug: "blog".into(),
        });

        assert_eq!(*calls.lock().unwrap(), vec!["plugin_deactivated"]);
    }

    #[test]
    fn unsubscribe_removes_all_entries_for_name() {
        let (bus, _) = recording_bus();

        bus.subscribe("dup", 0, |_| Ok(()));
        bus.subscribe("dup", 5, |_| Ok(()));
        bus.subscribe("other", 0, |_| Ok(()));
        assert_eq!(bus.subscriber_count(), 3);

        bus.unsubscribe("dup");
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn definition_filters_run_in_weight_order() {
        let bus = HookBus::new();

        bus.add_definition_filter("remove", 10, |defs| {
            defs.remove("system.update");
        });
        bus.add_definition_filter("add", 0, |defs| {
            defs.insert(
                "system.update".to_string(),
                NotificationDefinition::new("system.update", "Update available"),
            );
        });

        let mut defs = BTreeMap::new();
        bus.apply_definition_filters(&mut defs);

        // "add" (weight 0) runs before "remove" (weight 10).
        assert!(defs.is_empty());
    }
}
