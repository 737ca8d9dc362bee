//! # Chat message data-access layer
//!
//! [`ChatMessageDao`] is the only way the rest of the crate reads or writes
//! chat history. It exposes:
//!
//! - two live queries ([`get_by_session`](ChatMessageDao::get_by_session) and
//!   [`get_recent`](ChatMessageDao::get_recent)) that keep emitting snapshots
//!   while the caller holds the stream,
//! - upserts by `id` ([`insert_one`](ChatMessageDao::insert_one),
//!   [`insert_many`](ChatMessageDao::insert_many)),
//! - deletes by identity, by session, or of everything. Deleting something
//!   that does not exist is not an error.
//!
//! Timestamps are kept to the millisecond. Messages within the same
//! millisecond are ordered by `id`. A blank session id means
//! [`DEFAULT_SESSION_ID`](crate::models::DEFAULT_SESSION_ID) everywhere.
//!
//! ```no_run
//! use expense_chat::dao::{ChatMessageDao, SqliteChatMessageDao};
//! use expense_chat::models::ChatMessage;
//! use expense_chat::store::ChatStore;
//! use futures::StreamExt;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let dao = SqliteChatMessageDao::new(ChatStore::open("chat.db")?);
//! dao.insert_one(ChatMessage::user("hi", "s1")).await?;
//!
//! let mut messages = dao.get_by_session("s1");
//! while let Some(snapshot) = messages.next().await {
//!     println!("{} messages", snapshot?.len());
//! }
//! # Ok(()) }
//! ```

use async_trait::async_trait;
use diesel::prelude::*;
use tracing::debug;

use crate::error::StoreError;
use crate::models::{ChatMessage, ChatMessageRow, session_key};
use crate::schema::chat_messages;
use crate::store::{ChatStore, MessageStream};

/// Row ceiling used by [`ChatMessageDao::get_recent_default`].
pub const DEFAULT_RECENT_LIMIT: usize = 50;

/// Session-aware access to stored chat messages.
#[async_trait]
pub trait ChatMessageDao: Send + Sync {
    /// Messages of one session, oldest first, re-emitted on every change.
    fn get_by_session(&self, session_id: &str) -> MessageStream;

    /// The `limit` newest messages across all sessions, newest first.
    fn get_recent(&self, limit: usize) -> MessageStream;

    /// [`get_recent`](Self::get_recent) with [`DEFAULT_RECENT_LIMIT`].
    fn get_recent_default(&self) -> MessageStream {
        self.get_recent(DEFAULT_RECENT_LIMIT)
    }

    /// Insert `message`, replacing any stored message with the same `id`.
    async fn insert_one(&self, message: ChatMessage) -> Result<(), StoreError>;

    /// Upsert every message in one transaction. Either all become visible or
    /// none do.
    async fn insert_many(&self, messages: Vec<ChatMessage>) -> Result<(), StoreError>;

    /// Remove the stored message with `message.id`.
    async fn delete_one(&self, message: &ChatMessage) -> Result<(), StoreError>;

    /// Remove the stored message with this identifier.
    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError>;

    /// Remove every message of a session.
    async fn delete_by_session(&self, session_id: &str) -> Result<(), StoreError>;

    /// Remove every message.
    async fn delete_all(&self) -> Result<(), StoreError>;
}

/// [`ChatMessageDao`] backed by a [`ChatStore`].
#[derive(Clone)]
pub struct SqliteChatMessageDao {
    store: ChatStore,
}

impl SqliteChatMessageDao {
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }

    /// Look up a single message without subscribing.
    pub async fn find(&self, id: &str) -> Result<Option<ChatMessage>, StoreError> {
        let id = id.to_string();
        let row = self
            .store
            .read(move |conn| {
                Ok(chat_messages::table
                    .find(id.as_str())
                    .select(ChatMessageRow::as_select())
                    .first(conn)
                    .optional()?)
            })
            .await?;
        Ok(row.map(ChatMessage::from))
    }
}

#[async_trait]
impl ChatMessageDao for SqliteChatMessageDao {
    fn get_by_session(&self, session_id: &str) -> MessageStream {
        let session_id = session_key(session_id).to_string();
        self.store
            .live(format!("session:{session_id}"), move |conn| {
                chat_messages::table
                    .filter(chat_messages::session_id.eq(session_id.as_str()))
                    .order((chat_messages::timestamp.asc(), chat_messages::id.asc()))
                    .select(ChatMessageRow::as_select())
                    .load(conn)
            })
    }

    fn get_recent(&self, limit: usize) -> MessageStream {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.store.live(format!("recent:{limit}"), move |conn| {
            chat_messages::table
                .order((chat_messages::timestamp.desc(), chat_messages::id.desc()))
                .limit(limit)
                .select(ChatMessageRow::as_select())
                .load(conn)
        })
    }

    async fn insert_one(&self, message: ChatMessage) -> Result<(), StoreError> {
        message.validate()?;
        let row = ChatMessageRow::from(&message);
        debug!("Upserting chat message {} in {}", row.id, row.session_id);

        self.store
            .write(move |conn| {
                Ok(diesel::replace_into(chat_messages::table)
                    .values(&row)
                    .execute(conn)?)
            })
            .await?;
        Ok(())
    }

    async fn insert_many(&self, messages: Vec<ChatMessage>) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        // Reject the whole batch before anything reaches the writer.
        for message in &messages {
            message.validate()?;
        }
        let rows: Vec<ChatMessageRow> = messages.iter().map(ChatMessageRow::from).collect();
        debug!("Upserting {} chat messages", rows.len());

        self.store
            .write(move |conn| {
                let mut affected = 0;
                for row in &rows {
                    affected += diesel::replace_into(chat_messages::table)
                        .values(row)
                        .execute(conn)?;
                }
                Ok(affected)
            })
            .await?;
        Ok(())
    }

    async fn delete_one(&self, message: &ChatMessage) -> Result<(), StoreError> {
        self.delete_by_id(&message.id).await
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        let deleted = self
            .store
            .write(move |conn| {
                Ok(diesel::delete(chat_messages::table.find(id.as_str())).execute(conn)?)
            })
            .await?;
        debug!("Deleted {} chat message(s) by id", deleted);
        Ok(())
    }

    async fn delete_by_session(&self, session_id: &str) -> Result<(), StoreError> {
        let session_id = session_key(session_id).to_string();
        let deleted = self
            .store
            .write(move |conn| {
                Ok(diesel::delete(
                    chat_messages::table.filter(chat_messages::session_id.eq(session_id.as_str())),
                )
                .execute(conn)?)
            })
            .await?;
        debug!("Deleted {} chat message(s) by session", deleted);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        let deleted = self
            .store
            .write(|conn| Ok(diesel::delete(chat_messages::table).execute(conn)?))
            .await?;
        debug!("Deleted all {} chat message(s)", deleted);
        Ok(())
    }
}
