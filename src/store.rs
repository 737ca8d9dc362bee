//! # Local chat history store
//!
//! [`ChatStore`] is the one handle to the on-device chat database. Open it once
//! at startup and hand clones to whoever needs it; clones share the same read
//! pool, writer thread and change feed.
//!
//! ## Reads and writes
//! - Writes go through the single writer thread ([`crate::write_actor`]).
//! - One-shot reads borrow a pooled connection on Tokio's blocking pool.
//! - Live reads ([`ChatStore::live`]) produce a [`MessageStream`]: a fresh
//!   snapshot on subscription, then a new snapshot each time a commit changes
//!   the query's result. Several commits in quick succession may collapse into
//!   one snapshot; snapshots always reflect commits in order.
//!
//! Only the data-access layer in [`crate::dao`] talks to this module.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::db::{self, DbPool};
use crate::error::StoreError;
use crate::models::{ChatMessage, ChatMessageRow};
use crate::write_actor::{self, WriteHandle};

/// File name of the database inside the config directory.
pub const DEFAULT_DB_FILE: &str = "expense_tracker_database.db";

/// Read connections kept by the pool, on top of the writer's own connection.
const READ_POOL_SIZE: u32 = 4;

/// A live, ordered result set. Each item is a full snapshot.
pub type MessageStream = BoxStream<'static, Result<Vec<ChatMessage>, StoreError>>;

/// Handle to the chat history database.
#[derive(Clone)]
pub struct ChatStore {
    pool: DbPool,
    writer: WriteHandle,
    changes: watch::Receiver<u64>,
    path: Arc<PathBuf>,
}

impl ChatStore {
    /// Open the database at `path`, creating the file and schema if needed.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the file cannot be created or opened, the
    /// schema migration fails, or the writer thread cannot be started.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        info!("Opening chat history store at {}", path.display());

        db::init(&path)?;
        let pool = db::create_pool(&path, READ_POOL_SIZE + 1)?;
        db::run_migrations(&pool)?;

        let (tx, changes) = watch::channel(0u64);
        let writer = write_actor::spawn_writer(db::get_connection(&pool)?, tx)?;

        Ok(Self {
            pool,
            writer,
            changes,
            path: Arc::new(path),
        })
    }

    /// Open `<config_dir>/expense_tracker_database.db`.
    pub fn open_default() -> Result<Self, Box<dyn Error>> {
        let path = crate::config_dir()?.join(DEFAULT_DB_FILE);
        Ok(Self::open(path)?)
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of committed writes that changed at least one row since open.
    pub fn change_version(&self) -> u64 {
        *self.changes.borrow()
    }

    /// Run a write job in its own transaction on the writer thread.
    pub(crate) async fn write<F>(&self, job: F) -> Result<usize, StoreError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<usize, StoreError> + Send + 'static,
    {
        self.writer.exec(job).await
    }

    /// Run a one-shot read on a pooled connection.
    pub(crate) async fn read<F, T>(&self, query: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        read_pooled(self.pool.clone(), query).await
    }

    /// Turn a row query into a live [`MessageStream`].
    ///
    /// `query` is re-run after every commit; a snapshot is emitted only when
    /// its result differs from the previous one.
    pub(crate) fn live<F>(&self, label: String, query: F) -> MessageStream
    where
        F: Fn(&mut SqliteConnection) -> QueryResult<Vec<ChatMessageRow>> + Send + Sync + 'static,
    {
        let state = LiveQuery {
            label,
            pool: self.pool.clone(),
            changes: self.changes.clone(),
            query: Arc::new(query),
            last: None,
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }

            loop {
                if state.last.is_some() {
                    if state.changes.changed().await.is_err() {
                        debug!("Live query {} closed: store shut down", state.label);
                        return None;
                    }
                } else {
                    // Anything committed after this point triggers a re-run.
                    let _ = state.changes.borrow_and_update();
                }

                let query = Arc::clone(&state.query);
                let result = read_pooled(state.pool.clone(), move |conn| Ok((*query)(conn)?))
                    .await
                    .map(|rows| rows.into_iter().map(ChatMessage::from).collect::<Vec<_>>());

                match result {
                    Ok(snapshot) => {
                        if state.last.as_ref() == Some(&snapshot) {
                            continue;
                        }
                        debug!("Live query {} emits {} messages", state.label, snapshot.len());
                        state.last = Some(snapshot.clone());
                        return Some((Ok(snapshot), state));
                    }
                    Err(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                }
            }
        })
        .boxed()
    }
}

struct LiveQuery<F> {
    label: String,
    pool: DbPool,
    changes: watch::Receiver<u64>,
    query: Arc<F>,
    last: Option<Vec<ChatMessage>>,
    finished: bool,
}

async fn read_pooled<F, T>(pool: DbPool, query: F) -> Result<T, StoreError>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = db::get_connection(&pool)?;
        query(&mut conn)
    })
    .await?
}
