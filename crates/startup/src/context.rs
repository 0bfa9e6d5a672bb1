use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use larder_config::Config;
use larder_persist::{Broadcast, CacheLocally, Database, Persistence};
use larder_structures::{KeyField, SingleKeyCache, TripleKeyCache};
use tokio::sync::{OnceCell, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory working set, filled from the database at startup.
#[derive(Debug)]
pub struct Caches {
    pub broadcast: SingleKeyCache<String, Broadcast>,
    pub cache_locally: TripleKeyCache<String, String, u32, CacheLocally>,
}

impl Caches {
    pub fn new() -> Self {
        Self {
            broadcast: SingleKeyCache::with_key_field(
                "broadcast",
                KeyField::new("id", |broadcast: &Broadcast| {
                    (!broadcast.id.is_empty()).then(|| broadcast.id.clone())
                }),
            ),
            cache_locally: TripleKeyCache::with_key_fields(
                "cacheLocally",
                KeyField::new("ownerId", |part: &CacheLocally| {
                    (!part.owner_id.is_empty()).then(|| part.owner_id.clone())
                }),
                KeyField::new("key", |part: &CacheLocally| (!part.key.is_empty()).then(|| part.key.clone())),
                KeyField::new("partNumber", |part: &CacheLocally| Some(part.part_number)),
            ),
        }
    }
}

impl Default for Caches {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the application shares, built once and passed explicitly.
///
/// Each slot is filled exactly once, by the startup task that owns it.
/// Accessors fail with [`ErrorKind::NotReady`] until then.
#[derive(Debug)]
pub struct Context {
    config: Config,
    pub(crate) database: OnceCell<Database>,
    pub(crate) persistence: OnceCell<Persistence>,
    pub(crate) caches: OnceCell<RwLock<Caches>>,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            database: OnceCell::new(),
            persistence: OnceCell::new(),
            caches: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> Result<&Database> {
        self.database.get().ok_or_raise(|| ErrorKind::NotReady("database"))
    }

    pub fn persistence(&self) -> Result<&Persistence> {
        self.persistence.get().ok_or_raise(|| ErrorKind::NotReady("persistence manager"))
    }

    pub async fn caches(&self) -> Result<RwLockReadGuard<'_, Caches>> {
        let caches = self.caches.get().ok_or_raise(|| ErrorKind::NotReady("data structures"))?;
        Ok(caches.read().await)
    }

    pub async fn caches_mut(&self) -> Result<RwLockWriteGuard<'_, Caches>> {
        let caches = self.caches.get().ok_or_raise(|| ErrorKind::NotReady("data structures"))?;
        Ok(caches.write().await)
    }

    /// Close the database pool, if one was opened.
    pub async fn close(&self) {
        if let Some(database) = self.database.get() {
            database.close().await;
        }
    }
}
