use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::kernel::component::ComponentStats;
use crate::kernel::constants;
use crate::storage::error::StorageError;

/// Identifier returned by `subscribe_changes`, used to unsubscribe.
pub type ChangeObserverId = u64;

/// Callback invoked with `(section, new_value)` after a key changes.
///
/// The section is the first segment of the dotted key: a write to
/// `"weather.units"` notifies with section `"weather"`.
pub type ChangeObserver = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// External configuration store the engine reads and writes through.
///
/// Keys are dotted paths (`"plugins.auto_activate"`). The persistence format
/// belongs to the surrounding application and is invisible here.
pub trait ConfigStore: Send + Sync {
    /// Get a raw value, or `None` if the key is absent.
    fn get(&self, key: &str) -> Option<Value>;

    /// Set a raw value, notifying change observers on success.
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Register a change observer; returns an id usable for removal.
    fn subscribe_changes(&self, observer: ChangeObserver) -> ChangeObserverId;

    /// Remove a previously registered observer.
    fn unsubscribe_changes(&self, id: ChangeObserverId) -> bool;
}

/// Derive the notification section from a dotted key.
pub fn section_of(key: &str) -> &str {
    key.split('.').next().unwrap_or(key)
}

/// In-memory `ConfigStore`, used by tests and as the default backing store.
#[derive(Default)]
pub struct MemoryConfigStore {
    values: RwLock<HashMap<String, Value>>,
    observers: Mutex<Vec<(ChangeObserverId, ChangeObserver)>>,
    next_observer: Mutex<ChangeObserverId>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with typed values, for test setup.
    pub fn with_values<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let store = Self::new();
        {
            let mut values = store.values.write().unwrap_or_else(|e| e.into_inner());
            for (key, value) in entries {
                values.insert(key.into(), value);
            }
        }
        store
    }
}

impl fmt::Debug for MemoryConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .values
            .read()
            .map(|v| v.len())
            .unwrap_or(0);
        f.debug_struct("MemoryConfigStore")
            .field("entries", &len)
            .finish_non_exhaustive()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        {
            let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
            values.insert(key.to_string(), value.clone());
        }
        let observers: Vec<ChangeObserver> = {
            let guard = self.observers.lock().unwrap_or_else(|e| e.into_inner());
            guard.iter().map(|(_, cb)| cb.clone()).collect()
        };
        let section = section_of(key);
        for observer in observers {
            observer(section, &value);
        }
        Ok(())
    }

    fn subscribe_changes(&self, observer: ChangeObserver) -> ChangeObserverId {
        let id = {
            let mut next = self.next_observer.lock().unwrap_or_else(|e| e.into_inner());
            *next += 1;
            *next
        };
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, observer));
        id
    }

    fn unsubscribe_changes(&self, id: ChangeObserverId) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        let before = observers.len();
        observers.retain(|(obs_id, _)| *obs_id != id);
        observers.len() < before
    }
}

struct CacheState {
    entries: HashMap<String, Value>,
    /// Access order, least-recently-used at the front.
    order: VecDeque<String>,
}

impl CacheState {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }

    fn evict_to(&mut self, capacity: usize) {
        while self.entries.len() > capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

/// Fixed-capacity read-through LRU cache in front of a [`ConfigStore`].
///
/// Lookups record hit/miss statistics; writes go through to the store and
/// refresh the cached entry. Invalidation is per config section so a change
/// notification drops every cached key of that section.
pub struct ConfigCache {
    store: Arc<dyn ConfigStore>,
    capacity: usize,
    state: Mutex<CacheState>,
    stats: Arc<ComponentStats>,
}

impl ConfigCache {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self::with_capacity(store, constants::DEFAULT_CONFIG_CACHE_CAPACITY)
    }

    pub fn with_capacity(store: Arc<dyn ConfigStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            stats: Arc::new(ComponentStats::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &Arc<ComponentStats> {
        &self.stats
    }

    /// Get a raw value, consulting the cache before the store.
    pub fn get(&self, key: &str) -> Option<Value> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(value) = state.entries.get(key).cloned() {
                state.touch(key);
                self.stats.record_cache_hit();
                return Some(value);
            }
        }
        self.stats.record_cache_miss();
        let value = self.store.get(key)?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.insert(key.to_string(), value.clone());
        state.touch(key);
        state.evict_to(self.capacity);
        Some(value)
    }

    /// Typed lookup with a fallback default.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or(default)
    }

    /// Write through to the store and refresh the cached entry.
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), StorageError> {
        let json = serde_json::to_value(value).map_err(|e| StorageError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set(key, json.clone())?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.insert(key.to_string(), json);
        state.touch(key);
        state.evict_to(self.capacity);
        Ok(())
    }

    /// Drop every cached key belonging to a config section.
    pub fn invalidate_section(&self, section: &str) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let doomed: Vec<String> = state
            .entries
            .keys()
            .filter(|key| section_of(key) == section)
            .cloned()
            .collect();
        for key in &doomed {
            state.entries.remove(key);
            if let Some(pos) = state.order.iter().position(|k| k == key) {
                state.order.remove(pos);
            }
        }
        doomed.len()
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.clear();
        state.order.clear();
    }
}

impl fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
