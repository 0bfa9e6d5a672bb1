//! Fill the in-memory caches from the database.
//!
//! Each record table is loaded in full. Rows become records and are
//! auto-put into their cache, except fragments that are already complete:
//! those are deleted from the database instead. Loading is reported done
//! only once every table has been loaded.

use crate::context::Caches;
use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use larder_persist::{Broadcast, CacheLocally, Record, Table, report};
use larder_structures::{KeyedCache, SingleKeyCache, TripleKeyCache};
use std::sync::Mutex;
use tracing::instrument;

/// A set of named flags that opens once every flag is set.
#[derive(Debug)]
pub struct LoadGate {
    flags: Vec<(&'static str, bool)>,
}

impl LoadGate {
    pub fn new(names: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            flags: names.into_iter().map(|name| (name, false)).collect(),
        }
    }

    /// Mark `name` as loaded and return whether the gate is now open.
    pub fn mark(&mut self, name: &str) -> bool {
        for (flag, loaded) in &mut self.flags {
            if *flag == name {
                *loaded = true;
            }
        }
        let outstanding = self.outstanding();
        if outstanding.is_empty() {
            tracing::info!("cache load complete");
            true
        } else {
            tracing::debug!(loaded = name, waiting = ?outstanding, "a table has loaded, still waiting");
            false
        }
    }

    pub fn outstanding(&self) -> Vec<&'static str> {
        self.flags.iter().filter(|(_, loaded)| !loaded).map(|(name, _)| *name).collect()
    }

    pub fn is_open(&self) -> bool {
        self.flags.iter().all(|(_, loaded)| *loaded)
    }
}

/// What happened to the rows of one table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TableLoad {
    /// Rows now held in the cache.
    pub cached: usize,
    /// Rows not cached: completed fragments deleted, or unreadable rows.
    pub discarded: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub broadcast: TableLoad,
    pub cache_locally: TableLoad,
}

/// Load every record table into `caches`.
#[instrument(skip_all)]
pub async fn load_caches(broadcasts: &Table, fragments: &Table, caches: &mut Caches) -> Result<LoadSummary> {
    let gate = Mutex::new(LoadGate::new([Broadcast::TABLE, CacheLocally::TABLE]));
    let mark = &|name: &str| {
        mark_loaded(&gate, name);
    };
    let Caches {
        broadcast: broadcast_cache,
        cache_locally: fragment_cache,
    } = caches;
    let (broadcast, cache_locally) = futures::join!(
        async move {
            let load = load_broadcasts(broadcasts, broadcast_cache).await?;
            mark(Broadcast::TABLE);
            Ok::<_, Error>(load)
        },
        async move {
            let load = load_fragments(fragments, fragment_cache).await?;
            mark(CacheLocally::TABLE);
            Ok::<_, Error>(load)
        },
    );
    Ok(LoadSummary {
        broadcast: broadcast?,
        cache_locally: cache_locally?,
    })
}

/// Mark `name` on a shared gate.
///
/// A poisoned lock still holds a usable gate: flags are only ever set, never
/// cleared, so the update goes through anyway.
fn mark_loaded(gate: &Mutex<LoadGate>, name: &str) -> bool {
    let mut gate = gate.lock().unwrap_or_else(|poisoned| {
        tracing::warn!(table = name, "cache load gate was poisoned, recovering");
        poisoned.into_inner()
    });
    gate.mark(name)
}

async fn load_broadcasts(table: &Table, cache: &mut SingleKeyCache<String, Broadcast>) -> Result<TableLoad> {
    tracing::debug!("requesting broadcasts");
    let rows = table.get_all().await.or_raise(|| ErrorKind::CacheLoad)?;
    tracing::info!(rows = rows.len(), "loading broadcasts into cache");
    let mut load = TableLoad::default();
    for row in rows {
        let cached = Broadcast::from_row(row)
            .or_raise(|| ErrorKind::CacheLoad)
            .and_then(|broadcast| {
                let id = broadcast.id.clone();
                cache.auto_put(broadcast).or_raise(|| ErrorKind::CacheLoad)?;
                Ok(id)
            });
        match cached {
            Ok(id) => {
                tracing::debug!(%id, "loaded broadcast");
                load.cached += 1;
            }
            Err(err) => {
                report(&err);
                load.discarded += 1;
            }
        }
    }
    Ok(load)
}

async fn load_fragments(
    table: &Table,
    cache: &mut TripleKeyCache<String, String, u32, CacheLocally>,
) -> Result<TableLoad> {
    tracing::debug!("requesting fragments");
    let rows = table.get_all().await.or_raise(|| ErrorKind::CacheLoad)?;
    tracing::info!(rows = rows.len(), "loading fragments into cache");
    let mut load = TableLoad::default();
    for row in rows {
        let fragment = match CacheLocally::from_row(row) {
            Ok(fragment) => fragment,
            Err(err) => {
                report(&err);
                load.discarded += 1;
                continue;
            }
        };
        let designation = fragment.designation();
        if fragment.is_complete() {
            // Deletion failures must not stop the rest of the load.
            match fragment.unpersist(table).await {
                Ok(_) => tracing::debug!(%designation, "removed obsolete fragment"),
                Err(err) => report(&err),
            }
            load.discarded += 1;
            continue;
        }
        match cache.auto_put(fragment) {
            Ok(_) => {
                tracing::debug!(%designation, "loaded fragment");
                load.cached += 1;
            }
            Err(err) => {
                report(&err);
                load.discarded += 1;
            }
        }
    }
    Ok(load)
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_persist::{Database, Persistence, Schema};
    use std::sync::Arc;

    async fn persistence() -> Persistence {
        let db = Database::connect_in_memory().await.unwrap();
        Schema::default().ensure(&db).await.unwrap();
        Persistence::new(Arc::new(db)).unwrap()
    }

    fn fragment(key: &str, part_number: u32, complete: bool) -> CacheLocally {
        CacheLocally {
            owner_id: "b1".to_string(),
            key: key.to_string(),
            part_number,
            downloaded: complete,
            unpacked: complete,
            stitched: complete,
            ..Default::default()
        }
    }

    #[test]
    fn test_gate_opens_after_every_flag() {
        let mut gate = LoadGate::new(["broadcast", "cacheLocally"]);
        assert!(!gate.is_open());
        assert!(!gate.mark("cacheLocally"));
        assert_eq!(gate.outstanding(), vec!["broadcast"]);
        // Marking twice changes nothing.
        assert!(!gate.mark("cacheLocally"));
        assert!(gate.mark("broadcast"));
        assert!(gate.is_open());
        assert!(gate.outstanding().is_empty());
    }

    #[test]
    fn test_poisoned_gate_still_records_loads() {
        let gate = Mutex::new(LoadGate::new(["broadcast", "cacheLocally"]));
        let poisoned: std::thread::Result<()> = std::panic::catch_unwind(|| {
            let _guard = gate.lock().unwrap();
            panic!("loader panicked while holding the gate");
        });
        assert!(poisoned.is_err());
        assert!(gate.is_poisoned());

        assert!(!mark_loaded(&gate, "broadcast"));
        assert!(mark_loaded(&gate, "cacheLocally"));
        let gate = gate.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        assert!(gate.is_open());
    }

    #[tokio::test]
    async fn test_complete_fragments_are_deleted_not_cached() {
        let persistence = persistence().await;
        let table = &persistence.cache_locally;
        for part in [fragment("video", 0, true), fragment("video", 1, false), fragment("audio", 0, false)] {
            table.add(&part.to_row().unwrap()).await.unwrap();
        }
        let broadcast = Broadcast {
            id: "b1".to_string(),
            ..Default::default()
        };
        persistence.broadcast.add(&broadcast.to_row().unwrap()).await.unwrap();

        let mut caches = Caches::new();
        let summary = load_caches(&persistence.broadcast, table, &mut caches).await.unwrap();

        assert_eq!(summary.broadcast, TableLoad { cached: 1, discarded: 0 });
        assert_eq!(summary.cache_locally, TableLoad { cached: 2, discarded: 1 });
        assert!(caches.broadcast.is_cached("b1"));
        assert!(!caches.cache_locally.is_cached("b1", "video", &0u32));
        assert!(caches.cache_locally.is_cached("b1", "video", &1u32));
        assert_eq!(caches.cache_locally.len(), 2);
        // The completed fragment is gone from the database too.
        assert_eq!(table.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_rows_are_discarded() {
        let persistence = persistence().await;
        let bad = serde_json::json!({"id": "b2", "parts": "many"});
        let serde_json::Value::Object(bad) = bad else { unreachable!() };
        persistence.broadcast.add(&bad).await.unwrap();

        let mut caches = Caches::new();
        let summary = load_caches(&persistence.broadcast, &persistence.cache_locally, &mut caches)
            .await
            .unwrap();
        assert_eq!(summary.broadcast, TableLoad { cached: 0, discarded: 1 });
        assert!(caches.broadcast.is_empty());
    }
}
