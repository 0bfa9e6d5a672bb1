//! SQLite persistence for larder records.
//!
//! # Architecture
//! - [`TableSpec`] describes a table declaratively; [`Bundle`] is the SQL
//!   synthesized from it once, at construction.
//! - [`Table`] runs the CRUD protocol (probe the key, then act) for one
//!   bundle through a [`TransactionalExecutor`].
//! - [`Database`] is the SQLite executor; [`Schema`] creates and upgrades
//!   the tables it holds.
//! - [`Persistence`] owns one [`Table`] per [`Record`] type.
//!
//! The database is a working store for a device-side cache: records are
//! written as downloads progress and read back in bulk at startup.

mod bundle;
mod db;
pub mod error;
mod executor;
pub mod records;
mod schema;
mod table;

pub use crate::bundle::{Bundle, Statement, TableSpec};
pub use crate::db::Database;
pub use crate::error::{Error, ErrorKind, Result, report};
pub use crate::executor::{ExecutorHandle, Row, TransactionHandle, TransactionalExecutor};
pub use crate::records::{Broadcast, CacheLocally, Record};
pub use crate::schema::{Schema, SchemaAction, SchemaStatus};
pub use crate::table::{Action, Table};

/// One [`Table`] per declared record type.
#[derive(Debug, Clone)]
pub struct Persistence {
    pub broadcast: Table,
    pub cache_locally: Table,
}

impl Persistence {
    pub fn new(executor: ExecutorHandle) -> Result<Self> {
        let persistence = Self {
            broadcast: Table::new(&Broadcast::table_spec(), executor.clone())?,
            cache_locally: Table::new(&CacheLocally::table_spec(), executor)?,
        };
        tracing::debug!(tables = ?persistence.tables().map(Table::name).collect::<Vec<_>>(), "persistence manager ready");
        Ok(persistence)
    }

    /// Look a table up by its SQL name.
    pub fn table(&self, name: &str) -> Result<&Table> {
        match self.tables().find(|table| table.name() == name) {
            Some(table) => Ok(table),
            None => exn::bail!(ErrorKind::UnknownTable(name.to_string())),
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        [&self.broadcast, &self.cache_locally].into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn persistence() -> Persistence {
        let db = Database::connect_in_memory().await.unwrap();
        Schema::default().ensure(&db).await.unwrap();
        Persistence::new(Arc::new(db)).unwrap()
    }

    #[tokio::test]
    async fn test_table_lookup() {
        let persistence = persistence().await;
        assert_eq!(persistence.table("broadcast").unwrap().name(), "broadcast");
        assert_eq!(persistence.table("cacheLocally").unwrap().name(), "cacheLocally");
        let err = persistence.table("Restaurant").unwrap_err();
        assert_eq!(*err, ErrorKind::UnknownTable("Restaurant".to_string()));
    }

    #[tokio::test]
    async fn test_broadcast_persist_round_trip() {
        let persistence = persistence().await;
        let mut broadcast = Broadcast {
            id: "b1".to_string(),
            title: "Morning".to_string(),
            parts: 2,
            ..Default::default()
        };
        let table = &persistence.broadcast;
        assert_eq!(table.persist(&broadcast.to_row().unwrap()).await.unwrap(), Action::Inserted);

        broadcast.title = "Evening".to_string();
        broadcast.favourite = true;
        assert_eq!(table.persist(&broadcast.to_row().unwrap()).await.unwrap(), Action::Updated);

        let stored = Broadcast::from_row(table.get(&broadcast.to_row().unwrap()).await.unwrap()).unwrap();
        assert_eq!(stored, broadcast);
    }

    #[tokio::test]
    async fn test_fragment_unpersist() {
        let persistence = persistence().await;
        let fragment = CacheLocally {
            owner_id: "b1".to_string(),
            key: "audio".to_string(),
            part_number: 0,
            ..Default::default()
        };
        let table = &persistence.cache_locally;
        table.add(&fragment.to_row().unwrap()).await.unwrap();
        assert_eq!(fragment.unpersist(table).await.unwrap(), Action::Deleted);
        let err = fragment.unpersist(table).await.unwrap_err();
        assert_eq!((*err).to_string(), "No such object cacheLocally: ownerId=b1 & key=audio & partNumber=0");
    }
}
