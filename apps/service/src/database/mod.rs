/// Storage layer.
///
/// LibSQL (SQLite) behind a connection pool. The `Database` trait in
/// `repository` is the only surface the engine sees; everything else here is
/// schema and row mapping.
pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

use crate::pool::{LibsqlManager, LibsqlPool};

/// Open a pooled connection to a local database file.
pub async fn open_pool(path: &str) -> Result<LibsqlPool> {
    let database = libsql::Builder::new_local(path).build().await?;
    let manager = LibsqlManager::new(database);
    let pool = LibsqlPool::builder(manager).build()?;
    Ok(pool)
}

/// Initialize database with schema.
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
