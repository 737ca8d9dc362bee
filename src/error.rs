//! Error types for the chat history store, the completion client and the
//! chat repository.
//!
//! Deletes of missing rows are not errors; they are no-ops.

use async_openai::error::OpenAIError;
use thiserror::Error;

/// Failures raised by the local store and its data-access layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Query execution failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed chat message: {0}")]
    MalformedRecord(String),

    #[error("The database writer has shut down")]
    WriterClosed,

    #[error("Background read task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Failures raised while asking the assistant for a reply.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Completion API error: {0}")]
    Api(#[from] OpenAIError),

    #[error("Invalid completion config: {0}")]
    InvalidConfig(String),
}

/// Failures surfaced by [`crate::repository::ChatRepository`].
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Cannot send an empty message")]
    EmptyMessage,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}
