//! Bounded Expansion Caches
//!
//! Three LRU caches back the hot expansion paths: argument splitting,
//! executable PATH resolution, and parsed arithmetic ASTs. Each is capped
//! by `expansion.cacheLimits`; eviction drops the least recently used
//! entry. Built on `IndexMap` so recency is just move-to-back.

use std::hash::Hash;

use indexmap::IndexMap;

/// A bounded least-recently-used map.
#[derive(Debug)]
pub struct LruCache<K, V> {
    map: IndexMap<K, V>,
    capacity: usize,
}

impl<K: Hash + Eq, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self { map: IndexMap::new(), capacity }
    }

    /// Look up a key, refreshing its recency.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.map.contains_key(key) {
            // Move to the back (most recently used).
            if let Some(index) = self.map.get_index_of(key) {
                let last = self.map.len() - 1;
                self.map.move_index(index, last);
            }
            self.map.get(key)
        } else {
            None
        }
    }

    /// Insert a value, evicting the oldest entry when full.
    pub fn put(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if let Some(index) = self.map.get_index_of(&key) {
            self.map.insert(key, value);
            let last = self.map.len() - 1;
            self.map.move_index(index, last);
            return;
        }
        while self.map.len() >= self.capacity {
            self.map.shift_remove_index(0);
        }
        self.map.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// The three expansion caches, sized from `CacheLimits`.
#[derive(Debug)]
pub struct ExpansionCaches {
    /// IFS word-splitting results keyed by (text, ifs).
    pub args: LruCache<(String, String), Vec<String>>,
    /// PATH lookups keyed by (name, PATH value).
    pub exec: LruCache<(String, String), Option<std::path::PathBuf>>,
    /// Parsed arithmetic expressions keyed by source text.
    pub arithmetic: LruCache<String, crate::expansion::arithmetic::ArithExpr>,
}

impl ExpansionCaches {
    pub fn new(limits: &crate::config::CacheLimits) -> Self {
        Self {
            args: LruCache::new(limits.arg),
            exec: LruCache::new(limits.exec),
            arithmetic: LruCache::new(limits.arithmetic),
        }
    }
}

impl Default for ExpansionCaches {
    fn default() -> Self {
        Self::new(&crate::config::CacheLimits::default())
    }
}

/// Resolve a command name against PATH, consulting the exec cache.
/// Returns the absolute path of the first matching executable file.
pub fn resolve_executable(
    caches: &mut ExpansionCaches,
    name: &str,
    path_var: &str,
) -> Option<std::path::PathBuf> {
    if name.contains('/') {
        let candidate = std::path::PathBuf::from(name);
        return if is_executable(&candidate) { Some(candidate) } else { None };
    }
    let key = (name.to_string(), path_var.to_string());
    if let Some(cached) = caches.exec.get(&key) {
        return cached.clone();
    }
    let resolved = path_var
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| std::path::Path::new(dir).join(name))
        .find(|candidate| is_executable(candidate));
    caches.exec.put(key, resolved.clone());
    resolved
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}
