//! # Database models
//!
//! Data structures that map to the chat history SQLite schema via **Diesel**.
//!
//! Two layers live here:
//!
//! - [`ChatMessageRow`]: the raw row shape of the `chat_messages` table. The
//!   timestamp is stored as **milliseconds since the Unix epoch**.
//! - [`ChatMessage`]: the domain value handed to callers, with a
//!   [`chrono::DateTime<Utc>`] timestamp.
//!
//! Conversions between the two are lossless for millisecond-precision
//! timestamps; [`ChatMessage::new`] truncates "now" to milliseconds so that a
//! message read back from the store compares equal to the one inserted.
//!
//! ## Basic usage
//!
//! ```no_run
//! use expense_chat::models::{ChatMessage, DEFAULT_SESSION_ID};
//!
//! let question = ChatMessage::user("How much did I spend on food?", DEFAULT_SESSION_ID);
//! assert!(question.is_user);
//! assert_eq!(question.session_id, "default");
//! ```
use chrono::{DateTime, SubsecRound, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Session used when the caller does not pick one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// One row of the `chat_messages` table.
///
/// ### Table
/// - `chat_messages`
///
/// ### Notes
/// - `is_user` maps to the `isUser` column and `session_id` to `sessionId`.
/// - `timestamp` is epoch milliseconds.
#[derive(Queryable, Identifiable, Insertable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::chat_messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ChatMessageRow {
    pub id: String,
    pub content: String,
    pub is_user: bool,
    pub timestamp: i64,
    pub session_id: String,
}

/// A single turn in a conversation.
///
/// A message is either authored by the user (`is_user == true`) or by the
/// assistant. It belongs to exactly one session; sessions are a filtering key
/// only, nothing else ties messages of a session together.
///
/// Messages are never edited in place. Inserting a message whose `id` already
/// exists replaces the stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique identifier, stable for the message's lifetime.
    pub id: String,
    /// Raw message text.
    pub content: String,
    /// `true` if written by the human user, `false` if by the assistant.
    pub is_user: bool,
    /// Creation time, used for ordering. Stored at millisecond precision.
    pub timestamp: DateTime<Utc>,
    /// Conversation thread this message belongs to. Blank means the shared
    /// [`DEFAULT_SESSION_ID`] session.
    #[serde(default = "default_session_id")]
    pub session_id: String,
}

impl ChatMessage {
    /// Build a new message with a fresh UUID v4 identifier, stamped "now".
    ///
    /// The timestamp is truncated to millisecond precision, which is what the
    /// store persists.
    pub fn new(content: impl Into<String>, is_user: bool, session_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            is_user,
            timestamp: now_millis(),
            session_id: session_id.into(),
        }
    }

    /// A message written by the user.
    pub fn user(content: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::new(content, true, session_id)
    }

    /// A reply written by the assistant.
    pub fn assistant(content: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::new(content, false, session_id)
    }

    /// Replace the identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Replace the timestamp, truncated to milliseconds.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(3);
        self
    }

    /// Reject records that must never reach the store.
    ///
    /// A message needs a non-blank `id`, its primary key. A blank
    /// `session_id` is not an error; it is stored under [`DEFAULT_SESSION_ID`].
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.id.trim().is_empty() {
            return Err(StoreError::MalformedRecord(
                "chat message is missing an id".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<&ChatMessage> for ChatMessageRow {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id.clone(),
            content: message.content.clone(),
            is_user: message.is_user,
            timestamp: message.timestamp.timestamp_millis(),
            session_id: session_key(&message.session_id).to_string(),
        }
    }
}

impl From<ChatMessageRow> for ChatMessage {
    fn from(row: ChatMessageRow) -> Self {
        Self {
            id: row.id,
            content: row.content,
            is_user: row.is_user,
            // Out-of-range values only come from a foreign writer; clamp to the epoch.
            timestamp: DateTime::from_timestamp_millis(row.timestamp).unwrap_or_default(),
            session_id: row.session_id,
        }
    }
}

fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// The session a record is filed under: blank maps to [`DEFAULT_SESSION_ID`].
pub(crate) fn session_key(session_id: &str) -> &str {
    if session_id.trim().is_empty() {
        DEFAULT_SESSION_ID
    } else {
        session_id
    }
}

fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}
