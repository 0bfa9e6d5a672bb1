use crate::error::{ErrorKind, Result};
use crate::{KeyField, KeyedCache};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// A cache of values addressed by a pair of keys, stored as `K1 -> K2 -> V`.
pub struct TwinKeyCache<K1, K2, V> {
    name: String,
    key_fields: Option<(KeyField<V, K1>, KeyField<V, K2>)>,
    cache: HashMap<K1, HashMap<K2, V>>,
    size: usize,
}

impl<K1, K2, V> TwinKeyCache<K1, K2, V>
where
    K1: Eq + Hash + Clone,
    K2: Eq + Hash + Clone,
{
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::debug!(cache = %name, "constructed cache, auto-put is not enabled");
        Self {
            name,
            key_fields: None,
            cache: HashMap::new(),
            size: 0,
        }
    }

    pub fn with_key_fields(name: impl Into<String>, first: KeyField<V, K1>, second: KeyField<V, K2>) -> Self {
        let name = name.into();
        tracing::debug!(
            cache = %name,
            fields = format_args!("{}, {}", first.name(), second.name()),
            "constructed cache, auto-put enabled"
        );
        Self {
            name,
            key_fields: Some((first, second)),
            cache: HashMap::new(),
            size: 0,
        }
    }

    /// Store `value` under `(key, key2)`, returning the value it replaced.
    pub fn put(&mut self, key: K1, key2: K2, value: V) -> Option<V> {
        let previous = self.cache.entry(key).or_default().insert(key2, value);
        if previous.is_none() {
            self.size += 1;
        }
        previous
    }

    pub fn get<Q1, Q2>(&self, key: &Q1, key2: &Q2) -> Option<&V>
    where
        K1: Borrow<Q1>,
        K2: Borrow<Q2>,
        Q1: Eq + Hash + ?Sized,
        Q2: Eq + Hash + ?Sized,
    {
        self.cache.get(key)?.get(key2)
    }

    pub fn get_mut<Q1, Q2>(&mut self, key: &Q1, key2: &Q2) -> Option<&mut V>
    where
        K1: Borrow<Q1>,
        K2: Borrow<Q2>,
        Q1: Eq + Hash + ?Sized,
        Q2: Eq + Hash + ?Sized,
    {
        self.cache.get_mut(key)?.get_mut(key2)
    }

    /// First value found under `key2`, whatever the first key.
    ///
    /// When several first keys hold `key2`, which one wins is unspecified.
    pub fn get_by_sub_key<Q2>(&self, key2: &Q2) -> Option<&V>
    where
        K2: Borrow<Q2>,
        Q2: Eq + Hash + ?Sized,
    {
        self.cache.values().find_map(|sub| sub.get(key2))
    }

    pub fn is_cached<Q1, Q2>(&self, key: &Q1, key2: &Q2) -> bool
    where
        K1: Borrow<Q1>,
        K2: Borrow<Q2>,
        Q1: Eq + Hash + ?Sized,
        Q2: Eq + Hash + ?Sized,
    {
        self.get(key, key2).is_some()
    }

    /// Remove and return the value under `(key, key2)`.
    ///
    /// The first-level entry is dropped once its last value is removed.
    pub fn remove_key<Q1, Q2>(&mut self, key: &Q1, key2: &Q2) -> Option<V>
    where
        K1: Borrow<Q1>,
        K2: Borrow<Q2>,
        Q1: Eq + Hash + ?Sized,
        Q2: Eq + Hash + ?Sized,
    {
        let sub = self.cache.get_mut(key)?;
        let removed = sub.remove(key2)?;
        if sub.is_empty() {
            self.cache.remove(key);
        }
        self.size -= 1;
        Some(removed)
    }

    pub fn get_keys(&self) -> Vec<K1> {
        self.cache.keys().cloned().collect()
    }

    /// Second-level keys under `key`; empty if `key` is not cached.
    pub fn get_sub_keys<Q1>(&self, key: &Q1) -> Vec<K2>
    where
        K1: Borrow<Q1>,
        Q1: Eq + Hash + ?Sized,
    {
        self.cache
            .get(key)
            .map(|sub| sub.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_values(&self) -> Vec<&V> {
        self.values().collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = (&K1, &K2)> {
        self.entries().map(|(key, key2, _)| (key, key2))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.cache.values().flat_map(|sub| sub.values())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&K1, &K2, &V)> {
        self.cache
            .iter()
            .flat_map(|(key, sub)| sub.iter().map(move |(key2, value)| (key, key2, value)))
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.size = 0;
    }
}

impl<K1, K2, V> KeyedCache<V> for TwinKeyCache<K1, K2, V>
where
    K1: Eq + Hash + Clone,
    K2: Eq + Hash + Clone,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.size
    }

    fn auto_put(&mut self, value: V) -> Result<Option<V>> {
        let Some((first, second)) = self.key_fields else {
            exn::bail!(ErrorKind::AutoPutDisabled(self.name.clone()));
        };
        let key = first.extract(&self.name, &value)?;
        let key2 = second.extract(&self.name, &value)?;
        Ok(self.put(key, key2, value))
    }

    fn remove_value(&mut self, value: &V) -> bool
    where
        V: PartialEq,
    {
        let mut removed = 0;
        for sub in self.cache.values_mut() {
            let before = sub.len();
            sub.retain(|_, stored| stored != value);
            removed += before - sub.len();
        }
        if removed == 0 {
            return false;
        }
        self.cache.retain(|_, sub| !sub.is_empty());
        self.size -= removed;
        true
    }

    fn leaves<'a>(&'a self) -> Box<dyn Iterator<Item = &'a V> + 'a>
    where
        V: 'a,
    {
        Box::new(self.values())
    }
}

impl<K1, K2, V> std::fmt::Debug for TwinKeyCache<K1, K2, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwinKeyCache")
            .field("name", &self.name)
            .field("key_fields", &self.key_fields)
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sorted<T: Ord>(mut items: Vec<T>) -> Vec<T> {
        items.sort();
        items
    }

    #[test]
    fn test_sub_keys_are_pruned() {
        let mut cache = TwinKeyCache::new("pairs");
        cache.put("a", "x", "v1");
        cache.put("a", "y", "v2");
        assert_eq!(sorted(cache.get_sub_keys("a")), vec!["x", "y"]);

        assert_eq!(cache.remove_key("a", "x"), Some("v1"));
        assert_eq!(cache.get_sub_keys("a"), vec!["y"]);

        assert_eq!(cache.remove_key("a", "y"), Some("v2"));
        assert!(cache.get_keys().is_empty());
        assert!(cache.get_sub_keys("a").is_empty());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_remove_missing_key() {
        let mut cache = TwinKeyCache::new("pairs");
        cache.put("a", "x", 1);
        assert_eq!(cache.remove_key("a", "nope"), None);
        assert_eq!(cache.remove_key("nope", "x"), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_keys(), vec!["a"]);
    }

    #[test]
    fn test_replace_does_not_grow() {
        let mut cache = TwinKeyCache::new("pairs");
        assert_eq!(cache.put("a", "x", 1), None);
        assert_eq!(cache.put("a", "x", 2), Some(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a", "x"), Some(&2));
    }

    #[test]
    fn test_remove_value_prunes_first_level() {
        let mut cache = TwinKeyCache::new("pairs");
        cache.put("a", "x", 1);
        cache.put("b", "x", 1);
        cache.put("b", "y", 2);
        assert!(cache.remove_value(&1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_keys(), vec!["b"]);
        assert_eq!(cache.get_sub_keys("b"), vec!["y"]);
        assert!(!cache.remove_value(&1));
    }

    #[test]
    fn test_get_by_sub_key() {
        let mut cache = TwinKeyCache::new("pairs");
        cache.put("a", "x", 1);
        cache.put("b", "y", 2);
        assert_eq!(cache.get_by_sub_key("y"), Some(&2));
        assert_eq!(cache.get_by_sub_key("z"), None);
    }

    #[test]
    fn test_iterators_visit_every_leaf() {
        let mut cache = TwinKeyCache::new("pairs");
        cache.put("a", "x", 1);
        cache.put("a", "y", 2);
        cache.put("b", "x", 3);
        let entries: HashSet<_> = cache.entries().map(|(k, k2, v)| (*k, *k2, *v)).collect();
        assert_eq!(entries, HashSet::from([("a", "x", 1), ("a", "y", 2), ("b", "x", 3)]));
        assert_eq!(cache.keys().count(), 3);
        assert_eq!(sorted(cache.get_values()), vec![&1, &2, &3]);
        assert!(cache.is_cached("b", "x"));
        assert!(!cache.is_cached("b", "y"));
    }

    #[test]
    fn test_auto_put() {
        #[derive(Debug, PartialEq)]
        struct Seat {
            row: char,
            number: u8,
        }
        let mut cache = TwinKeyCache::with_key_fields(
            "seats",
            KeyField::new("row", |seat: &Seat| Some(seat.row)),
            KeyField::new("number", |seat: &Seat| Some(seat.number)),
        );
        cache.auto_put(Seat { row: 'A', number: 1 }).unwrap();
        cache.auto_put(Seat { row: 'A', number: 2 }).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&'A', &2u8), Some(&Seat { row: 'A', number: 2 }));

        let mut plain: TwinKeyCache<char, u8, Seat> = TwinKeyCache::new("seats");
        let err = plain.auto_put(Seat { row: 'B', number: 1 }).unwrap_err();
        assert_eq!(*err, ErrorKind::AutoPutDisabled("seats".to_string()));
    }
}
