//! CRUD operations over one [`Bundle`].
//!
//! Every operation runs in a single transaction and, apart from
//! [`Table::get_all`], probes for the key before acting. The probe and the
//! act share the transaction, but nothing locks the key between two
//! *different* calls: two concurrent `add`s of the same key can both pass
//! the probe. Callers that need at-most-once semantics per key must
//! serialize externally.

use crate::bundle::{Bundle, Statement, TableSpec};
use crate::error::{ErrorKind, Result};
use crate::executor::{ExecutorHandle, Row, TransactionHandle};
use derive_more::Display;
use std::sync::Arc;
use tracing::instrument;

/// What a successful write did.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Inserted,
    Updated,
    Deleted,
}

#[derive(Clone)]
pub struct Table {
    bundle: Arc<Bundle>,
    executor: ExecutorHandle,
}

impl Table {
    pub fn new(spec: &TableSpec, executor: ExecutorHandle) -> Result<Self> {
        Ok(Self {
            bundle: Arc::new(Bundle::build(spec)?),
            executor,
        })
    }

    pub fn name(&self) -> &str {
        self.bundle.table()
    }

    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    async fn run(&self, tx: &mut Box<dyn TransactionHandle>, statement: &Statement, row: &Row) -> Result<Vec<Row>> {
        tx.execute(&statement.sql, &statement.bindings(row)).await
    }

    /// Number of rows matching the key of `row`.
    async fn probe(&self, tx: &mut Box<dyn TransactionHandle>, row: &Row) -> Result<usize> {
        Ok(self.run(tx, &self.bundle.exists, row).await?.len())
    }

    fn not_found(&self, row: &Row) -> ErrorKind {
        ErrorKind::NotFound {
            table: self.name().to_string(),
            key: self.bundle.describe_key(row),
        }
    }

    /// Fetch the single row whose key matches `key`.
    ///
    /// Zero or several matches are both reported as [`ErrorKind::NotFound`].
    #[instrument(skip_all, fields(table = %self.name(), key = %self.bundle.describe_key(key)))]
    pub async fn get(&self, key: &Row) -> Result<Row> {
        let mut tx = self.executor.begin().await?;
        let mut rows = self.run(&mut tx, &self.bundle.select_by_key, key).await?;
        tx.commit().await?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            _ => exn::bail!(self.not_found(key)),
        }
    }

    #[instrument(skip_all, fields(table = %self.name()))]
    pub async fn get_all(&self) -> Result<Vec<Row>> {
        let mut tx = self.executor.begin().await?;
        let rows = tx.execute(&self.bundle.select_all.sql, &[]).await?;
        tx.commit().await?;
        tracing::debug!(rows = rows.len(), "loaded all rows");
        Ok(rows)
    }

    /// Update the row if its key exists exactly once, insert it otherwise.
    #[instrument(skip_all, fields(table = %self.name(), key = %self.bundle.describe_key(row)))]
    pub async fn persist(&self, row: &Row) -> Result<Action> {
        let mut tx = self.executor.begin().await?;
        let action = if self.probe(&mut tx, row).await? == 1 {
            self.run(&mut tx, &self.bundle.update, row).await?;
            Action::Updated
        } else {
            self.run(&mut tx, &self.bundle.insert, row).await?;
            Action::Inserted
        };
        tx.commit().await?;
        tracing::debug!(%action, "persisted");
        Ok(action)
    }

    /// Insert a row whose key must not exist yet.
    #[instrument(skip_all, fields(table = %self.name(), key = %self.bundle.describe_key(row)))]
    pub async fn add(&self, row: &Row) -> Result<Action> {
        let mut tx = self.executor.begin().await?;
        if self.probe(&mut tx, row).await? > 0 {
            exn::bail!(ErrorKind::Duplicate {
                table: self.name().to_string(),
                key: self.bundle.describe_key(row),
            });
        }
        self.run(&mut tx, &self.bundle.insert, row).await?;
        tx.commit().await?;
        Ok(Action::Inserted)
    }

    /// Update a row whose key must exist exactly once.
    #[instrument(skip_all, fields(table = %self.name(), key = %self.bundle.describe_key(row)))]
    pub async fn update(&self, row: &Row) -> Result<Action> {
        let mut tx = self.executor.begin().await?;
        if self.probe(&mut tx, row).await? != 1 {
            exn::bail!(self.not_found(row));
        }
        self.run(&mut tx, &self.bundle.update, row).await?;
        tx.commit().await?;
        Ok(Action::Updated)
    }

    /// Delete a row whose key must exist exactly once.
    #[instrument(skip_all, fields(table = %self.name(), key = %self.bundle.describe_key(key)))]
    pub async fn remove(&self, key: &Row) -> Result<Action> {
        let mut tx = self.executor.begin().await?;
        if self.probe(&mut tx, key).await? != 1 {
            exn::bail!(self.not_found(key));
        }
        self.run(&mut tx, &self.bundle.delete, key).await?;
        tx.commit().await?;
        Ok(Action::Deleted)
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").field("bundle", &self.bundle).finish_non_exhaustive()
    }
}
