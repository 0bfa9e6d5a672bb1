//! Phased application startup.
//!
//! Startup builds an explicit [`Context`] and fills it in four phases:
//!
//! | Phase | Tasks                              |
//! |-------|------------------------------------|
//! | 0     | Database, Data structures          |
//! | 1     | Data schema                        |
//! | 2     | Persistence manager                |
//! | 3     | Cache load                         |
//!
//! Every task is best-effort: a failure is reported and startup carries on,
//! so later tasks that depend on it fail with [`ErrorKind::NotReady`]
//! instead of hanging. The returned [`StartupReport`] says which tasks failed.

mod context;
pub mod error;
mod loader;
mod phases;

pub use crate::context::{Caches, Context};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::loader::{LoadGate, LoadSummary, TableLoad, load_caches};
pub use crate::phases::{PhaseScheduler, StartupReport, Task};
use exn::ResultExt;
use larder_config::{Config, Location};
use larder_persist::{Database, Persistence, Schema};
use std::sync::Arc;
use tokio::sync::RwLock;

async fn open_database(ctx: Arc<Context>) -> Result<()> {
    let config = &ctx.config().database;
    let database = match config.location().or_raise(|| ErrorKind::Database)? {
        Location::Memory => Database::connect_in_memory().await,
        Location::File(path) => {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Database)?;
            }
            tracing::info!(path = %path.display(), "opening database");
            Database::connect_with(&path, config.max_connections, config.busy_timeout()).await
        }
    }
    .or_raise(|| ErrorKind::Database)?;
    if ctx.database.set(database).is_err() {
        exn::bail!(ErrorKind::AlreadyInitialised("database"));
    }
    Ok(())
}

async fn build_data_structures(ctx: Arc<Context>) -> Result<()> {
    if ctx.caches.set(RwLock::new(Caches::new())).is_err() {
        exn::bail!(ErrorKind::AlreadyInitialised("data structures"));
    }
    Ok(())
}

async fn ensure_schema(ctx: Arc<Context>) -> Result<()> {
    let status = Schema::default().ensure(ctx.database()?).await.or_raise(|| ErrorKind::Schema)?;
    tracing::info!(action = %status.action, version = status.version, "database mounted");
    Ok(())
}

async fn build_persistence(ctx: Arc<Context>) -> Result<()> {
    let executor = Arc::new(ctx.database()?.clone());
    let persistence = Persistence::new(executor).or_raise(|| ErrorKind::Persistence)?;
    if ctx.persistence.set(persistence).is_err() {
        exn::bail!(ErrorKind::AlreadyInitialised("persistence manager"));
    }
    Ok(())
}

async fn load_cache(ctx: Arc<Context>) -> Result<()> {
    let persistence = ctx.persistence()?;
    let mut caches = ctx.caches_mut().await?;
    let summary = load_caches(&persistence.broadcast, &persistence.cache_locally, &mut caches).await?;
    tracing::info!(?summary, "caches loaded");
    Ok(())
}

/// The standard startup sequence.
pub fn default_phases() -> PhaseScheduler<Context> {
    PhaseScheduler::new()
        .phase([
            Task::new("Database", open_database),
            Task::new("Data structures", build_data_structures),
        ])
        .phase([Task::new("Data schema", ensure_schema)])
        .phase([Task::new("Persistence manager", build_persistence)])
        .phase([Task::new("Cache load", load_cache)])
}

/// Build a context from `config` and run the standard startup against it.
pub async fn start(config: Config) -> (Arc<Context>, StartupReport) {
    let ctx = Arc::new(Context::new(config));
    let report = default_phases().run(Arc::clone(&ctx)).await;
    (ctx, report)
}
