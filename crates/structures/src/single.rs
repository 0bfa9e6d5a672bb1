use crate::error::{ErrorKind, Result};
use crate::{KeyField, KeyedCache};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// A cache of values addressed by a single key.
pub struct SingleKeyCache<K, V> {
    name: String,
    key_field: Option<KeyField<V, K>>,
    cache: HashMap<K, V>,
    size: usize,
}

impl<K, V> SingleKeyCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache without auto-put support.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::debug!(cache = %name, "constructed cache, auto-put is not enabled");
        Self {
            name,
            key_field: None,
            cache: HashMap::new(),
            size: 0,
        }
    }

    /// Create a cache whose values can be inserted with [`KeyedCache::auto_put`].
    pub fn with_key_field(name: impl Into<String>, key_field: KeyField<V, K>) -> Self {
        let name = name.into();
        tracing::debug!(cache = %name, field = key_field.name(), "constructed cache, auto-put enabled");
        Self {
            name,
            key_field: Some(key_field),
            cache: HashMap::new(),
            size: 0,
        }
    }

    /// Store `value` under `key`, returning the value it replaced.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.cache.insert(key, value);
        if previous.is_none() {
            self.size += 1;
        }
        previous
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.cache.get(key)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.cache.get_mut(key)
    }

    pub fn is_cached<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.cache.contains_key(key)
    }

    /// Remove the value stored under `key` and return it.
    pub fn remove_key<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let removed = self.cache.remove(key)?;
        self.size -= 1;
        Some(removed)
    }

    /// Snapshot of every key currently in the cache.
    pub fn get_keys(&self) -> Vec<K> {
        self.cache.keys().cloned().collect()
    }

    /// Snapshot of every value currently in the cache.
    pub fn get_values(&self) -> Vec<&V> {
        self.cache.values().collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.cache.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.cache.values()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        self.cache.iter()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.size = 0;
    }
}

impl<K, V> KeyedCache<V> for SingleKeyCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.size
    }

    fn auto_put(&mut self, value: V) -> Result<Option<V>> {
        let Some(field) = self.key_field else {
            exn::bail!(ErrorKind::AutoPutDisabled(self.name.clone()));
        };
        let key = field.extract(&self.name, &value)?;
        Ok(self.put(key, value))
    }

    fn remove_value(&mut self, value: &V) -> bool
    where
        V: PartialEq,
    {
        let before = self.cache.len();
        self.cache.retain(|_, stored| stored != value);
        let removed = before - self.cache.len();
        self.size -= removed;
        removed > 0
    }

    fn leaves<'a>(&'a self) -> Box<dyn Iterator<Item = &'a V> + 'a>
    where
        V: 'a,
    {
        Box::new(self.cache.values())
    }
}

impl<K, V> std::fmt::Debug for SingleKeyCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleKeyCache")
            .field("name", &self.name)
            .field("key_field", &self.key_field)
            .field("size", &self.size)
            .finish()
    }
}
