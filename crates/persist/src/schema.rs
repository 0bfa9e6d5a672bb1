//! Schema bootstrap and versioned upgrades.
//!
//! The applied version lives in the single-row `databaseVersion` table. A
//! fresh database gets the creation script plus every upgrade in one
//! transaction; an older database gets each pending upgrade in its own
//! transaction, together with the version bump for that step.

use crate::error::{ErrorKind, Result};
use crate::executor::{TransactionHandle, TransactionalExecutor};
use derive_more::Display;
use exn::ResultExt;
use serde_json::Value;
use tracing::instrument;

const VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS databaseVersion (version INTEGER)";
const SELECT_VERSION: &str = "SELECT version FROM databaseVersion";
const INSERT_VERSION: &str = "INSERT INTO databaseVersion (version) VALUES (?)";
const UPDATE_VERSION: &str = "UPDATE databaseVersion SET version = ?";
const CLEAR_VERSION: &str = "DELETE FROM databaseVersion";

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SchemaAction {
    #[display("created database")]
    Created,
    #[display("upgraded database from version {from}")]
    Upgraded { from: i64 },
    #[display("no action required")]
    UpToDate,
}

/// Outcome of [`Schema::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaStatus {
    pub action: SchemaAction,
    pub version: i64,
}

/// The creation script (version 1) followed by upgrade scripts.
///
/// Upgrade `n` (zero-based) moves the database from version `n + 1` to
/// `n + 2`. Scripts can only be appended, so versions cannot be skipped.
#[derive(Debug, Clone)]
pub struct Schema {
    create: &'static str,
    upgrades: Vec<&'static str>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new(include_str!("../schema/v1.sql"))
    }
}

impl Schema {
    pub fn new(create: &'static str) -> Self {
        Self {
            create,
            upgrades: Vec::new(),
        }
    }

    /// Append the script that upgrades the current latest version by one.
    pub fn with_upgrade(mut self, script: &'static str) -> Self {
        self.upgrades.push(script);
        self
    }

    pub fn latest(&self) -> i64 {
        1 + self.upgrades.len() as i64
    }

    async fn current_version(tx: &mut Box<dyn TransactionHandle>) -> Result<i64> {
        tx.execute(VERSION_TABLE, &[]).await?;
        let rows = tx.execute(SELECT_VERSION, &[]).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("version"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Create or upgrade the schema so that it is at [`latest`](Self::latest).
    #[instrument(skip_all, fields(latest = self.latest()))]
    pub async fn ensure(&self, executor: &dyn TransactionalExecutor) -> Result<SchemaStatus> {
        let latest = self.latest();
        let mut tx = executor.begin().await?;
        let found = Self::current_version(&mut tx).await?;

        // Anything below the first version means no tables were ever created.
        if found < 1 {
            tracing::info!(found, "creating initial database tables");
            tx.execute(self.create, &[]).await.or_raise(|| ErrorKind::Schema)?;
            for script in &self.upgrades {
                tx.execute(script, &[]).await.or_raise(|| ErrorKind::Schema)?;
            }
            tx.execute(CLEAR_VERSION, &[]).await?;
            tx.execute(INSERT_VERSION, &[Value::from(latest)]).await?;
            tx.commit().await?;
            tracing::info!(version = latest, "database created");
            return Ok(SchemaStatus {
                action: SchemaAction::Created,
                version: latest,
            });
        }
        if found > latest {
            exn::bail!(ErrorKind::SchemaVersion { found, latest });
        }
        tx.commit().await?;
        if found == latest {
            tracing::debug!(version = found, "database up to date, no changes required");
            return Ok(SchemaStatus {
                action: SchemaAction::UpToDate,
                version: found,
            });
        }

        tracing::info!(from = found, to = latest, "upgrading database");
        let applied = usize::try_from(found - 1).or_raise(|| ErrorKind::InvalidData("databaseVersion"))?;
        for (step, script) in self.upgrades.iter().enumerate().skip(applied) {
            let version = step as i64 + 2;
            let mut tx = executor.begin().await?;
            tx.execute(script, &[]).await.or_raise(|| ErrorKind::Schema)?;
            tx.execute(UPDATE_VERSION, &[Value::from(version)]).await?;
            tx.commit().await?;
            tracing::info!(version, "database upgraded");
        }
        Ok(SchemaStatus {
            action: SchemaAction::Upgraded { from: found },
            version: latest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use serde_json::json;

    async fn version(db: &Database) -> i64 {
        let mut tx = db.begin().await.unwrap();
        Schema::current_version(&mut tx).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_then_up_to_date() {
        let db = Database::connect_in_memory().await.unwrap();
        let schema = Schema::default();
        let status = schema.ensure(&db).await.unwrap();
        assert_eq!(
            status,
            SchemaStatus {
                action: SchemaAction::Created,
                version: 1
            }
        );
        let status = schema.ensure(&db).await.unwrap();
        assert_eq!(status.action, SchemaAction::UpToDate);
        assert_eq!(version(&db).await, 1);

        // Both record tables exist and are empty.
        let mut tx = db.begin().await.unwrap();
        assert!(tx.execute(r#"SELECT * FROM "broadcast""#, &[]).await.unwrap().is_empty());
        assert!(tx.execute(r#"SELECT * FROM "cacheLocally""#, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_database_runs_every_upgrade() {
        let db = Database::connect_in_memory().await.unwrap();
        let schema = Schema::new("CREATE TABLE t (a INTEGER)").with_upgrade("ALTER TABLE t ADD COLUMN b INTEGER");
        let status = schema.ensure(&db).await.unwrap();
        assert_eq!(status.action, SchemaAction::Created);
        assert_eq!(status.version, 2);

        let mut tx = db.begin().await.unwrap();
        tx.execute("INSERT INTO t (a, b) VALUES (?, ?)", &[json!(1), json!(2)])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upgrades_step_by_step() {
        let db = Database::connect_in_memory().await.unwrap();
        let v1 = Schema::new("CREATE TABLE t (a INTEGER)");
        v1.ensure(&db).await.unwrap();

        let v3 = v1
            .clone()
            .with_upgrade("ALTER TABLE t ADD COLUMN b INTEGER")
            .with_upgrade("ALTER TABLE t ADD COLUMN c INTEGER");
        let status = v3.ensure(&db).await.unwrap();
        assert_eq!(
            status,
            SchemaStatus {
                action: SchemaAction::Upgraded { from: 1 },
                version: 3
            }
        );
        assert_eq!(version(&db).await, 3);
        assert_eq!(v3.ensure(&db).await.unwrap().action, SchemaAction::UpToDate);
    }

    #[tokio::test]
    async fn test_failed_upgrade_keeps_previous_version() {
        let db = Database::connect_in_memory().await.unwrap();
        let v1 = Schema::new("CREATE TABLE t (a INTEGER)");
        v1.ensure(&db).await.unwrap();
        let broken = v1
            .clone()
            .with_upgrade("ALTER TABLE t ADD COLUMN b INTEGER")
            .with_upgrade("ALTER TABLE nowhere ADD COLUMN c INTEGER");
        let err = broken.ensure(&db).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Schema);
        // The first step committed on its own.
        assert_eq!(version(&db).await, 2);
    }

    #[tokio::test]
    async fn test_negative_version_creates_tables() {
        let db = Database::connect_in_memory().await.unwrap();
        let mut tx = db.begin().await.unwrap();
        tx.execute(VERSION_TABLE, &[]).await.unwrap();
        tx.execute(INSERT_VERSION, &[json!(-1)]).await.unwrap();
        tx.commit().await.unwrap();

        let status = Schema::default().ensure(&db).await.unwrap();
        assert_eq!(
            status,
            SchemaStatus {
                action: SchemaAction::Created,
                version: 1
            }
        );
        assert_eq!(version(&db).await, 1);

        let mut tx = db.begin().await.unwrap();
        let tables = tx
            .execute("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?", &[json!("broadcast")])
            .await
            .unwrap();
        assert_eq!(tables.len(), 1);
        // The stale row is replaced, not joined by a second one.
        assert_eq!(tx.execute(SELECT_VERSION, &[]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_newer_database_is_rejected() {
        let db = Database::connect_in_memory().await.unwrap();
        Schema::new("CREATE TABLE t (a INTEGER)")
            .with_upgrade("ALTER TABLE t ADD COLUMN b INTEGER")
            .ensure(&db)
            .await
            .unwrap();
        let err = Schema::new("CREATE TABLE t (a INTEGER)").ensure(&db).await.unwrap_err();
        assert_eq!(*err, ErrorKind::SchemaVersion { found: 2, latest: 1 });
    }
}
