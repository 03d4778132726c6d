use std::collections::BTreeMap;
use std::sync::RwLock;

/// Process-wide name to handle map.
///
/// Handles are cloned out on every lookup; `T` is expected to be a cheap
/// shared handle such as an `Arc`.
pub struct Registry<T> {
    entries: RwLock<BTreeMap<String, T>>,
}

impl<T: Clone> Registry<T> {
    pub const fn new() -> Self {
        Self { entries: RwLock::new(BTreeMap::new()) }
    }

    pub fn get(&self, name: &str) -> Option<T> {
        self.entries.read().expect("registry lock poisoned").get(name).cloned()
    }

    /// Look up `name`, creating the entry with `create` if it is missing.
    /// Returns the handle and whether it was created by this call.
    pub fn get_or_create(&self, name: &str, create: impl FnOnce() -> T) -> (T, bool) {
        if let Some(existing) = self.get(name) {
            return (existing, false);
        }
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if let Some(existing) = entries.get(name) {
            return (existing.clone(), false);
        }
        let created = create();
        entries.insert(name.to_string(), created.clone());
        (created, true)
    }

    /// Insert or replace, returning the previous entry.
    pub fn insert(&self, name: &str, value: T) -> Option<T> {
        self.entries
            .write()
            .expect("registry lock poisoned")
            .insert(name.to_string(), value)
    }

    pub fn remove(&self, name: &str) -> Option<T> {
        self.entries.write().expect("registry lock poisoned").remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().expect("registry lock poisoned").contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().expect("registry lock poisoned").keys().cloned().collect()
    }

    /// Registered handles, in name order.
    pub fn values(&self) -> Vec<T> {
        self.entries.read().expect("registry lock poisoned").values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
