//! Generic concurrent keyed store of runtime items.
//!
//! Backs the route, cluster and (nested) destination tables. Creation is
//! race-free: two concurrent `get_or_create` calls for the same id yield the
//! same instance with the initializer invoked exactly once, which `DashMap`'s
//! entry API guarantees by holding the shard lock across initialization.

use std::sync::Arc;

use dashmap::DashMap;

/// Concurrent registry of shared runtime items keyed by string id.
///
/// Items are handed out as `Arc<T>` so readers can keep using an item after
/// it has been removed from the registry. No ordering guarantee among items.
#[derive(Debug)]
pub struct ItemRegistry<T> {
    items: DashMap<String, Arc<T>>,
}

impl<T> Default for ItemRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ItemRegistry<T> {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }

    /// Return the item with the given id, creating it with `init` if absent.
    ///
    /// The initializer runs at most once per id even under concurrent
    /// callers. A panicking initializer propagates to the triggering caller
    /// and leaves no entry behind; the registry stays usable.
    pub fn get_or_create<F>(&self, id: &str, init: F) -> Arc<T>
    where
        F: FnOnce(&str) -> T,
    {
        self.items
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(init(id)))
            .value()
            .clone()
    }

    /// Look up an item by id.
    pub fn try_get(&self, id: &str) -> Option<Arc<T>> {
        self.items.get(id).map(|entry| entry.value().clone())
    }

    /// Remove an item by id. Returns whether an item was removed.
    pub fn try_remove(&self, id: &str) -> bool {
        self.items.remove(id).is_some()
    }

    /// Point-in-time snapshot of all items, safe to enumerate while the
    /// registry mutates concurrently.
    pub fn get_all(&self) -> Vec<Arc<T>> {
        self.items.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Ids currently present, as a snapshot.
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn creates_then_returns_existing() {
        let registry: ItemRegistry<String> = ItemRegistry::new();

        let first = registry.get_or_create("a", |id| format!("item-{id}"));
        let second = registry.get_or_create("a", |_| unreachable!("must not re-initialize"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, "item-a");
    }

    #[test]
    fn exactly_once_creation_under_concurrency() {
        let registry = Arc::new(ItemRegistry::<usize>::new());
        let init_calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let init_calls = init_calls.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.get_or_create("shared", |_| {
                        init_calls.fetch_add(1, Ordering::SeqCst);
                        42
                    })
                })
            })
            .collect();

        let items: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(init_calls.load(Ordering::SeqCst), 1);
        for item in &items {
            assert!(Arc::ptr_eq(item, &items[0]));
        }
    }

    #[test]
    fn remove_and_snapshot() {
        let registry: ItemRegistry<u32> = ItemRegistry::new();
        registry.get_or_create("a", |_| 1);
        registry.get_or_create("b", |_| 2);

        let snapshot = registry.get_all();
        assert_eq!(snapshot.len(), 2);

        assert!(registry.try_remove("a"));
        assert!(!registry.try_remove("a"));
        assert!(registry.try_get("a").is_none());

        // The earlier snapshot is unaffected by the removal.
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn usable_after_initializer_panic() {
        let registry = Arc::new(ItemRegistry::<u32>::new());

        let reg = registry.clone();
        let result = std::thread::spawn(move || {
            reg.get_or_create("a", |_| panic!("init failed"));
        })
        .join();
        assert!(result.is_err());

        // No half-constructed entry is left behind.
        assert!(registry.try_get("a").is_none());
        let item = registry.get_or_create("a", |_| 7);
        assert_eq!(*item, 7);
    }
}
