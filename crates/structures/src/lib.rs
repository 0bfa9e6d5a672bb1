//! Keyed in-memory caches.
//!
//! Three associative containers over one, two or three keys:
//!
//! - [`SingleKeyCache`]: `K -> V`
//! - [`TwinKeyCache`]: `K1 -> K2 -> V`
//! - [`TripleKeyCache`]: `K1 -> K2 -> K3 -> V`
//!
//! The multi-level caches are nested maps rather than maps over composite
//! keys, so partial-key queries ([`TwinKeyCache::get_sub_keys`],
//! [`TwinKeyCache::get_by_sub_key`], ...) need no secondary index. The price
//! is paid on the write path: removals prune every intermediate level that
//! becomes empty, so no empty sub-map is ever left behind.
//!
//! # Invariants
//! - A key tuple maps to at most one value; putting an existing tuple
//!   replaces the value and does not change the size.
//! - `len()` is maintained incrementally on every put/remove and always
//!   equals the number of leaves reachable by full-key traversal.
//!
//! # Auto-keying
//! A cache may be constructed with [`KeyField`]s that know how to read each
//! key out of a value. [`KeyedCache::auto_put`] then inserts a value under
//! its own keys. Calling `auto_put` on a cache built without key fields is a
//! configuration error ([`ErrorKind::AutoPutDisabled`]).
//!
//! # Iteration
//! The `keys()`, `values()` and `entries()` iterators borrow the cache, so
//! the borrow checker rules out mutating a cache while walking it. No
//! iteration order is guaranteed.
//!
//! None of the caches lock internally; they are meant to be owned by a single
//! task (or wrapped in a lock by the owner).

pub mod error;
mod key;
mod single;
mod triple;
mod twin;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::key::KeyField;
pub use crate::single::SingleKeyCache;
pub use crate::triple::TripleKeyCache;
pub use crate::twin::TwinKeyCache;

/// Behaviour shared by every keyed cache, regardless of how many keys it has.
pub trait KeyedCache<V> {
    /// Name given to the cache at construction (used for logging).
    fn name(&self) -> &str;

    /// Number of values currently stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a value under the keys extracted from the value itself.
    ///
    /// Returns the value previously stored under the same keys, if any.
    fn auto_put(&mut self, value: V) -> Result<Option<V>>;

    /// Remove every value equal to `value`, pruning emptied levels.
    ///
    /// Returns `true` if at least one value was removed.
    fn remove_value(&mut self, value: &V) -> bool
    where
        V: PartialEq;

    /// Iterate over every stored value (the leaves of the key tree).
    fn leaves<'a>(&'a self) -> Box<dyn Iterator<Item = &'a V> + 'a>
    where
        V: 'a;
}
