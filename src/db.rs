//! SQLite plumbing: file creation, connection pool and schema migrations.
//!
//! The chat history database is a single file. WAL journaling lets the pooled
//! readers run while the writer thread holds an immediate transaction, and
//! readers only ever see committed state.

use std::fs;
use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, error, info};

use crate::error::StoreError;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
struct ConnectionCustomizer;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute(
            "PRAGMA busy_timeout = 30000;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(r2d2::Error::QueryError)
    }
}

/// Create the database file (and its parent directory) if needed and switch it
/// to WAL mode.
pub fn init(db_path: &Path) -> Result<(), StoreError> {
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            info!("Creating database directory: {}", dir.display());
            fs::create_dir_all(dir)?;
        }
    }

    let mut conn = SqliteConnection::establish(&db_path.to_string_lossy())?;
    // busy_timeout first: switching to WAL takes a lock that a closing
    // connection may still hold.
    conn.batch_execute(
        "PRAGMA busy_timeout = 30000;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;
    debug!("Database ready at {}", db_path.display());

    Ok(())
}

pub fn create_pool(db_path: &Path, max_size: u32) -> Result<DbPool, StoreError> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
    let pool = r2d2::Pool::builder()
        .max_size(max_size)
        .min_idle(Some(1))
        .connection_timeout(Duration::from_secs(30))
        .connection_customizer(Box::new(ConnectionCustomizer))
        .build(manager)?;
    Ok(pool)
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection, StoreError> {
    Ok(pool.get()?)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), StoreError> {
    info!("Running chat history migrations");
    let mut connection = get_connection(pool)?;

    let applied = connection.run_pending_migrations(MIGRATIONS).map_err(|e| {
        error!("Chat history migration failed: {}", e);
        StoreError::Migration(e.to_string())
    })?;

    if applied.is_empty() {
        debug!("No pending migrations to apply.");
    } else {
        for version in &applied {
            info!("Applied migration {}", version);
        }
    }

    Ok(())
}
