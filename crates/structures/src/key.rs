use crate::error::{ErrorKind, Result};
use exn::OptionExt;

/// A named accessor that reads one key out of a cached value.
///
/// The name is only used for logging and error reporting; the accessor does
/// the actual work. Returning `None` means the value has no usable key (an
/// empty identifier, for example) and makes `auto_put` fail.
pub struct KeyField<V, K> {
    name: &'static str,
    extract: fn(&V) -> Option<K>,
}

impl<V, K> KeyField<V, K> {
    pub fn new(name: &'static str, extract: fn(&V) -> Option<K>) -> Self {
        Self { name, extract }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn extract(&self, cache: &str, value: &V) -> Result<K> {
        (self.extract)(value).ok_or_raise(|| ErrorKind::MissingKey {
            cache: cache.to_string(),
            field: self.name,
        })
    }
}

impl<V, K> Clone for KeyField<V, K> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<V, K> Copy for KeyField<V, K> {}

impl<V, K> std::fmt::Debug for KeyField<V, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeyField").field(&self.name).finish()
    }
}
