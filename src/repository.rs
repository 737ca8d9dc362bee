//! # Chat repository
//!
//! Glues the chat history store to the completion service. A round trip
//! through [`ChatRepository::send_message`]:
//!
//! 1. stores the user's message,
//! 2. collects the last few finished question/answer pairs of the session,
//! 3. asks the [`CompletionService`] for a reply,
//! 4. stores the reply and hands its text back.
//!
//! If the completion fails the user's message stays stored and the error is
//! returned; nothing is retried here.

use std::sync::Arc;

use chrono::Duration;
use futures::StreamExt;
use tracing::{info, warn};

use crate::api::CompletionService;
use crate::config::DEFAULT_HISTORY_TURNS;
use crate::dao::ChatMessageDao;
use crate::error::{ChatError, StoreError};
use crate::models::ChatMessage;
use crate::store::MessageStream;

pub struct ChatRepository {
    dao: Arc<dyn ChatMessageDao>,
    completion: Arc<dyn CompletionService>,
    history_turns: usize,
}

impl ChatRepository {
    pub fn new(dao: Arc<dyn ChatMessageDao>, completion: Arc<dyn CompletionService>) -> Self {
        Self {
            dao,
            completion,
            history_turns: DEFAULT_HISTORY_TURNS,
        }
    }

    /// Cap on earlier question/answer pairs sent with each prompt.
    pub fn with_history_turns(mut self, history_turns: usize) -> Self {
        self.history_turns = history_turns;
        self
    }

    /// Live, oldest-first view of one session.
    pub fn chat_messages(&self, session_id: &str) -> MessageStream {
        self.dao.get_by_session(session_id)
    }

    /// Store `content` as a user turn, ask the assistant and store its reply.
    ///
    /// # Returns
    /// The assistant's reply text.
    ///
    /// # Errors
    /// - [`ChatError::EmptyMessage`] for blank input (nothing is stored).
    /// - [`ChatError::Store`] if either message cannot be persisted.
    /// - [`ChatError::Completion`] if the assistant could not answer.
    pub async fn send_message(&self, content: &str, session_id: &str) -> Result<String, ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let user_message = ChatMessage::user(content, session_id);
        self.dao.insert_one(user_message.clone()).await?;

        let earlier = self.snapshot(session_id).await?;
        let history = conversation_pairs(
            earlier.iter().filter(|m| m.id != user_message.id),
            self.history_turns,
        );

        let reply = match self.completion.generate_response(content, &history).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!("Assistant failed to answer in session {}: {}", session_id, err);
                return Err(err.into());
            }
        };

        // The reply must sort after the question even within the same millisecond.
        let mut assistant_message = ChatMessage::assistant(reply, session_id);
        let floor = user_message.timestamp + Duration::milliseconds(1);
        if assistant_message.timestamp < floor {
            assistant_message.timestamp = floor;
        }
        self.dao.insert_one(assistant_message.clone()).await?;

        info!(
            "Stored exchange {} -> {} in session {}",
            user_message.id, assistant_message.id, session_id
        );
        Ok(assistant_message.content)
    }

    /// Remove every message in a session.
    pub async fn clear_chat_history(&self, session_id: &str) -> Result<(), ChatError> {
        self.dao.delete_by_session(session_id).await?;
        Ok(())
    }

    /// Remove a single message by id. Unknown ids are ignored.
    pub async fn delete_message(&self, message_id: &str) -> Result<(), ChatError> {
        self.dao.delete_by_id(message_id).await?;
        Ok(())
    }

    async fn snapshot(&self, session_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let mut stream = self.dao.get_by_session(session_id);
        stream.next().await.unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Pair each user message with the assistant reply that follows it, keeping
/// only the last `max_turns` pairs. Unanswered questions are skipped.
pub fn conversation_pairs<'a>(
    messages: impl IntoIterator<Item = &'a ChatMessage>,
    max_turns: usize,
) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut pending: Option<&ChatMessage> = None;

    for message in messages {
        if message.is_user {
            pending = Some(message);
        } else if let Some(question) = pending.take() {
            pairs.push((question.content.clone(), message.content.clone()));
        }
    }

    let skip = pairs.len().saturating_sub(max_turns);
    pairs.split_off(skip)
}
