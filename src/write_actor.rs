//! Single-writer actor for the chat history database.
//!
//! Every write job runs on one dedicated thread that owns one connection, each
//! job inside its own `BEGIN IMMEDIATE` transaction. Jobs are executed in the
//! order they were sent, so commits are totally ordered.
//!
//! After a commit that touched at least one row the actor bumps the change
//! version on a `watch` channel. Live queries wait on that channel and re-run.

use std::thread;

use diesel::SqliteConnection;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::db::DbConnection;
use crate::error::StoreError;

/// A write job. Returns the number of rows it affected.
type Job = Box<dyn FnOnce(&mut SqliteConnection) -> Result<usize, StoreError> + Send + 'static>;

type Request = (Job, oneshot::Sender<Result<usize, StoreError>>);

/// Handle for sending jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<Request>,
}

impl WriteHandle {
    /// Executes a write job on the writer's connection and waits for the
    /// transaction to commit or roll back.
    ///
    /// A job that returns an error rolls back everything it did.
    pub async fn exec<F>(&self, job: F) -> Result<usize, StoreError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<usize, StoreError> + Send + 'static,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((Box::new(job), ret_tx))
            .await
            .map_err(|_| StoreError::WriterClosed)?;

        ret_rx.await.map_err(|_| StoreError::WriterClosed)?
    }
}

/// Spawns the writer thread.
///
/// The thread runs until every [`WriteHandle`] clone has been dropped, then
/// drops `changes`, which ends all live queries.
pub fn spawn_writer(
    mut conn: DbConnection,
    changes: watch::Sender<u64>,
) -> Result<WriteHandle, StoreError> {
    let (tx, mut rx) = mpsc::channel::<Request>(1024);

    thread::Builder::new()
        .name("chat-db-writer".to_string())
        .spawn(move || {
            while let Some((job, reply_tx)) = rx.blocking_recv() {
                let result = conn.immediate_transaction::<_, StoreError, _>(|c| job(c));

                match &result {
                    Ok(0) => {}
                    Ok(affected) => {
                        changes.send_modify(|version| *version += 1);
                        debug!(
                            "Committed write ({} rows), change version {}",
                            affected,
                            *changes.borrow()
                        );
                    }
                    Err(err) => warn!("Write rolled back: {}", err),
                }

                // The caller may have given up waiting; the commit still stands.
                let _ = reply_tx.send(result);
            }
            debug!("Chat history writer stopped");
        })?;

    Ok(WriteHandle { tx })
}
