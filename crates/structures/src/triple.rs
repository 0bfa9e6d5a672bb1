use crate::error::{ErrorKind, Result};
use crate::{KeyField, KeyedCache};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

type Level<K2, K3, V> = HashMap<K2, HashMap<K3, V>>;
type Fields<V, K1, K2, K3> = (KeyField<V, K1>, KeyField<V, K2>, KeyField<V, K3>);

/// A cache of values addressed by three keys, stored as `K1 -> K2 -> K3 -> V`.
///
/// # Compatibility
/// Removals prune empty levels all the way up: once the last value under a
/// first key goes, the first key disappears from [`get_keys`](Self::get_keys).
/// Earlier implementations of this structure leaked empty top-level keys
/// after value-based removal; code that relied on seeing those stale keys
/// will now see them gone.
pub struct TripleKeyCache<K1, K2, K3, V> {
    name: String,
    key_fields: Option<Fields<V, K1, K2, K3>>,
    cache: HashMap<K1, Level<K2, K3, V>>,
    size: usize,
}

impl<K1, K2, K3, V> TripleKeyCache<K1, K2, K3, V>
where
    K1: Eq + Hash + Clone,
    K2: Eq + Hash + Clone,
    K3: Eq + Hash + Clone,
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

    pub fn with_key_fields(
        name: impl Into<String>,
        first: KeyField<V, K1>,
        second: KeyField<V, K2>,
        third: KeyField<V, K3>,
    ) -> Self {
        let name = name.into();
        tracing::debug!(
            cache = %name,
            fields = format_args!("{}, {}, {}", first.name(), second.name(), third.name()),
            "constructed cache, auto-put enabled"
        );
        Self {
            name,
            key_fields: Some((first, second, third)),
            cache: HashMap::new(),
            size: 0,
        }
    }

    /// Store `value` under `(key, key2, key3)`, returning the value it replaced.
    pub fn put(&mut self, key: K1, key2: K2, key3: K3, value: V) -> Option<V> {
        let previous = self
            .cache
            .entry(key)
            .or_default()
            .entry(key2)
            .or_default()
            .insert(key3, value);
        if previous.is_none() {
            self.size += 1;
        }
        previous
    }

    pub fn get<Q1, Q2, Q3>(&self, key: &Q1, key2: &Q2, key3: &Q3) -> Option<&V>
    where
        K1: Borrow<Q1>,
        K2: Borrow<Q2>,
        K3: Borrow<Q3>,
        Q1: Eq + Hash + ?Sized,
        Q2: Eq + Hash + ?Sized,
        Q3: Eq + Hash + ?Sized,
    {
        self.cache.get(key)?.get(key2)?.get(key3)
    }

    pub fn get_mut<Q1, Q2, Q3>(&mut self, key: &Q1, key2: &Q2, key3: &Q3) -> Option<&mut V>
    where
        K1: Borrow<Q1>,
        K2: Borrow<Q2>,
        K3: Borrow<Q3>,
        Q1: Eq + Hash + ?Sized,
        Q2: Eq + Hash + ?Sized,
        Q3: Eq + Hash + ?Sized,
    {
        self.cache.get_mut(key)?.get_mut(key2)?.get_mut(key3)
    }

    /// First value found under any `(_, key2, _)` path.
    pub fn get_by_sub_key<Q2>(&self, key2: &Q2) -> Option<&V>
    where
        K2: Borrow<Q2>,
        Q2: Eq + Hash + ?Sized,
    {
        self.cache
            .values()
            .filter_map(|sub| sub.get(key2))
            .find_map(|leaves| leaves.values().next())
    }

    pub fn is_cached<Q1, Q2, Q3>(&self, key: &Q1, key2: &Q2, key3: &Q3) -> bool
    where
        K1: Borrow<Q1>,
        K2: Borrow<Q2>,
        K3: Borrow<Q3>,
        Q1: Eq + Hash + ?Sized,
        Q2: Eq + Hash + ?Sized,
        Q3: Eq + Hash + ?Sized,
    {
        self.get(key, key2, key3).is_some()
    }

    /// Remove and return the value under `(key, key2, key3)`, pruning any
    /// level left empty.
    pub fn remove_key<Q1, Q2, Q3>(&mut self, key: &Q1, key2: &Q2, key3: &Q3) -> Option<V>
    where
        K1: Borrow<Q1>,
        K2: Borrow<Q2>,
        K3: Borrow<Q3>,
        Q1: Eq + Hash + ?Sized,
        Q2: Eq + Hash + ?Sized,
        Q3: Eq + Hash + ?Sized,
    {
        let sub = self.cache.get_mut(key)?;
        let leaves = sub.get_mut(key2)?;
        let removed = leaves.remove(key3)?;
        if leaves.is_empty() {
            sub.remove(key2);
            if sub.is_empty() {
                self.cache.remove(key);
            }
        }
        self.size -= 1;
        Some(removed)
    }

    pub fn get_keys(&self) -> Vec<K1> {
        self.cache.keys().cloned().collect()
    }

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

    pub fn get_sub_sub_keys<Q1, Q2>(&self, key: &Q1, key2: &Q2) -> Vec<K3>
    where
        K1: Borrow<Q1>,
        K2: Borrow<Q2>,
        Q1: Eq + Hash + ?Sized,
        Q2: Eq + Hash + ?Sized,
    {
        self.cache
            .get(key)
            .and_then(|sub| sub.get(key2))
            .map(|leaves| leaves.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_values(&self) -> Vec<&V> {
        self.values().collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = (&K1, &K2, &K3)> {
        self.entries().map(|(key, key2, key3, _)| (key, key2, key3))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.cache
            .values()
            .flat_map(|sub| sub.values())
            .flat_map(|leaves| leaves.values())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&K1, &K2, &K3, &V)> {
        self.cache.iter().flat_map(|(key, sub)| {
            sub.iter().flat_map(move |(key2, leaves)| {
                leaves.iter().map(move |(key3, value)| (key, key2, key3, value))
            })
        })
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.size = 0;
    }
}

impl<K1, K2, K3, V> KeyedCache<V> for TripleKeyCache<K1, K2, K3, V>
where
    K1: Eq + Hash + Clone,
    K2: Eq + Hash + Clone,
    K3: Eq + Hash + Clone,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.size
    }

    fn auto_put(&mut self, value: V) -> Result<Option<V>> {
        let Some((first, second, third)) = self.key_fields else {
            exn::bail!(ErrorKind::AutoPutDisabled(self.name.clone()));
        };
        let key = first.extract(&self.name, &value)?;
        let key2 = second.extract(&self.name, &value)?;
        let key3 = third.extract(&self.name, &value)?;
        Ok(self.put(key, key2, key3, value))
    }

    fn remove_value(&mut self, value: &V) -> bool
    where
        V: PartialEq,
    {
        let mut removed = 0;
        for sub in self.cache.values_mut() {
            for leaves in sub.values_mut() {
                let before = leaves.len();
                leaves.retain(|_, stored| stored != value);
                removed += before - leaves.len();
            }
            sub.retain(|_, leaves| !leaves.is_empty());
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

impl<K1, K2, K3, V> std::fmt::Debug for TripleKeyCache<K1, K2, K3, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripleKeyCache")
            .field("name", &self.name)
            .field("key_fields", &self.key_fields)
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sorted<T: Ord>(mut items: Vec<T>) -> Vec<T> {
        items.sort();
        items
    }

    fn populated() -> TripleKeyCache<&'static str, &'static str, u32, &'static str> {
        let mut cache = TripleKeyCache::new("fragments");
        cache.put("owner", "video", 0, "a");
        cache.put("owner", "video", 1, "b");
        cache.put("owner", "audio", 0, "c");
        cache.put("other", "video", 0, "a");
        cache
    }

    /// Independent leaf count, used to cross-check the incremental size.
    fn traversal_count<K1, K2, K3, V>(cache: &TripleKeyCache<K1, K2, K3, V>) -> usize
    where
        K1: Eq + Hash + Clone,
        K2: Eq + Hash + Clone,
        K3: Eq + Hash + Clone,
    {
        cache
            .get_keys()
            .iter()
            .map(|key| {
                cache
                    .get_sub_keys(key)
                    .iter()
                    .map(|key2| cache.get_sub_sub_keys(key, key2).len())
                    .sum::<usize>()
            })
            .sum()
    }

    #[test]
    fn test_put_and_get() {
        let cache = populated();
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get(&"owner", &"video", &1u32), Some(&"b"));
        assert_eq!(cache.get(&"owner", &"video", &7u32), None);
        assert_eq!(cache.get(&"nobody", &"video", &1u32), None);
        assert_eq!(sorted(cache.get_keys()), vec!["other", "owner"]);
        assert_eq!(sorted(cache.get_sub_keys(&"owner")), vec!["audio", "video"]);
        assert_eq!(sorted(cache.get_sub_sub_keys(&"owner", &"video")), vec![0, 1]);
        assert!(cache.get_sub_sub_keys(&"owner", &"nothing").is_empty());
        assert_eq!(traversal_count(&cache), cache.len());
    }

    #[test]
    fn test_remove_key_prunes_every_level() {
        let mut cache = populated();
        assert_eq!(cache.remove_key(&"other", &"video", &0u32), Some("a"));
        assert_eq!(sorted(cache.get_keys()), vec!["owner"]);

        assert_eq!(cache.remove_key(&"owner", &"audio", &0u32), Some("c"));
        assert_eq!(cache.get_sub_keys(&"owner"), vec!["video"]);
        assert_eq!(cache.len(), 2);
        assert_eq!(traversal_count(&cache), cache.len());
    }

    #[rstest]
    #[case("a", 2, vec!["owner"])]
    #[case("b", 3, vec!["other", "owner"])]
    #[case("c", 3, vec!["other", "owner"])]
    #[case("z", 4, vec!["other", "owner"])]
    fn test_remove_value(#[case] value: &'static str, #[case] remaining: usize, #[case] keys: Vec<&'static str>) {
        let mut cache = populated();
        assert_eq!(cache.remove_value(&value), remaining < 4);
        assert_eq!(cache.len(), remaining);
        assert_eq!(sorted(cache.get_keys()), keys);
        assert_eq!(traversal_count(&cache), cache.len());
    }

    #[test]
    fn test_remove_value_prunes_top_level() {
        let mut cache = TripleKeyCache::new("fragments");
        cache.put("only", "video", 0u32, 42);
        assert!(cache.remove_value(&42));
        assert!(cache.get_keys().is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_by_sub_key() {
        let cache = populated();
        assert_eq!(cache.get_by_sub_key(&"audio"), Some(&"c"));
        assert_eq!(cache.get_by_sub_key(&"text"), None);
    }

    #[test]
    fn test_iterators() {
        let cache = populated();
        assert_eq!(cache.entries().count(), 4);
        assert_eq!(cache.keys().filter(|(_, key2, _)| **key2 == "video").count(), 3);
        assert_eq!(sorted(cache.get_values()), vec![&"a", &"a", &"b", &"c"]);
        assert_eq!(cache.leaves().count(), cache.len());
    }

    /// Pseudo-random put/remove sequence; the incremental size must match a
    /// full traversal after every step.
    #[test]
    fn test_size_matches_traversal() {
        let mut cache: TripleKeyCache<u8, u8, u8, u32> = TripleKeyCache::new("random");
        let mut seed: u32 = 0x2545_f491;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };
        for _ in 0..2_000 {
            let roll = next();
            let (key, key2, key3) = ((roll % 3) as u8, ((roll >> 4) % 3) as u8, ((roll >> 8) % 4) as u8);
            match roll % 5 {
                0 | 1 => {
                    cache.put(key, key2, key3, roll % 7);
                }
                2 => {
                    cache.remove_key(&key, &key2, &key3);
                }
                3 => {
                    cache.remove_value(&(roll % 7));
                }
                _ => {
                    let before = cache.len();
                    if let Some(existing) = cache.get(&key, &key2, &key3).copied() {
                        cache.put(key, key2, key3, existing);
                        assert_eq!(cache.len(), before);
                    }
                }
            }
            assert_eq!(traversal_count(&cache), cache.len());
            assert_eq!(cache.entries().count(), cache.len());
        }
    }

    #[test]
    fn test_auto_put_uses_all_three_fields() {
        #[derive(Debug, PartialEq)]
        struct Part {
            owner: String,
            key: String,
            number: u32,
        }
        let mut cache = TripleKeyCache::with_key_fields(
            "parts",
            KeyField::new("owner", |part: &Part| Some(part.owner.clone())),
            KeyField::new("key", |part: &Part| Some(part.key.clone())),
            KeyField::new("number", |part: &Part| Some(part.number)),
        );
        let part = Part {
            owner: "o".to_string(),
            key: "k".to_string(),
            number: 3,
        };
        cache.auto_put(part).unwrap();
        assert!(cache.is_cached("o", "k", &3u32));
        assert_eq!(cache.get_sub_sub_keys("o", "k"), vec![3]);
    }
}
