//! # API Module
//!
//! Talks to an OpenAI-compatible chat-completion endpoint on behalf of the
//! expense assistant.
//!
//! The [`CompletionService`] trait is what [`crate::repository::ChatRepository`]
//! depends on; [`OpenAiCompletionService`] is the production implementation.
//! Each request is built as:
//!
//! 1. the assistant's system prompt,
//! 2. prior `(user, assistant)` turns, oldest first,
//! 3. the new user prompt.
//!
//! # Example
//!
//! ```no_run
//! use expense_chat::api::{CompletionService, OpenAiCompletionService};
//! use expense_chat::config::load_config;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("config.yaml")?;
//! let service = OpenAiCompletionService::from_config(&config)?;
//! let reply = service.generate_response("How do I set a monthly budget?", &[]).await?;
//! println!("{reply}");
//! # Ok(()) }
//! ```
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{config::ExpenseChatConfig, error::CompletionError};

/// System prompt used when the config does not provide one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Nono, a friendly personal-finance assistant \
built into the NoNo Expense Tracker app. Users record expenses and income, sort them into \
categories (Food, Transport, Shopping, Health, Entertainment, Other), review reports and \
charts, and scan receipts. Help them use the app, analyse their spending trends, plan \
monthly budgets and find practical ways to save. Answer concisely, give concrete examples, \
and encourage them to use the app's features.";

/// Reply returned when the model answers with no text.
pub const FALLBACK_REPLY: &str = "Sorry, I can't generate a response right now.";

/// Produces assistant replies.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Answer `prompt` given the earlier `(user, assistant)` turns, oldest first.
    async fn generate_response(
        &self,
        prompt: &str,
        history: &[(String, String)],
    ) -> Result<String, CompletionError>;
}

/// [`CompletionService`] backed by `async-openai`.
pub struct OpenAiCompletionService {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    system_prompt: String,
}

/// Creates a new OpenAI API client from configuration.
fn create_client(config: &ExpenseChatConfig) -> Client<OpenAIConfig> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.api_key.clone())
        .with_api_base(config.api_base.clone());
    debug!("Client created for {}", config.api_base);
    Client::with_config(openai_config)
}

impl OpenAiCompletionService {
    /// Build the service from the application config.
    ///
    /// # Errors
    /// Returns [`CompletionError::InvalidConfig`] if no model is configured.
    pub fn from_config(config: &ExpenseChatConfig) -> Result<Self, CompletionError> {
        if config.model.trim().is_empty() {
            return Err(CompletionError::InvalidConfig(
                "no model configured".to_string(),
            ));
        }

        Ok(Self {
            client: create_client(config),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }

    fn build_messages(
        &self,
        prompt: &str,
        history: &[(String, String)],
    ) -> Vec<ChatCompletionRequestMessage> {
        let mut messages = Vec::with_capacity(history.len() * 2 + 2);
        messages.push(system_message(&self.system_prompt));
        for (user, assistant) in history {
            messages.push(user_message(user));
            messages.push(assistant_message(assistant));
        }
        messages.push(user_message(prompt));
        messages
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionService {
    #[allow(deprecated)]
    async fn generate_response(
        &self,
        prompt: &str,
        history: &[(String, String)],
    ) -> Result<String, CompletionError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone())
            .max_tokens(self.max_tokens)
            .messages(self.build_messages(prompt, history));
        if let Some(temperature) = self.temperature {
            args.temperature(temperature);
        }
        let request = args.build()?;

        debug!(
            "Sending completion request with {} history turns",
            history.len()
        );

        let response = self.client.chat().create(request).await?;

        let mut response_string = String::new();
        response.choices.iter().for_each(|chat_choice| {
            if let Some(message_text) = &chat_choice.message.content {
                response_string.push_str(message_text);
            }
        });

        if response_string.trim().is_empty() {
            warn!("Completion returned no text, using fallback reply");
            return Ok(FALLBACK_REPLY.to_string());
        }

        Ok(response_string)
    }
}

fn system_message(content: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: ChatCompletionRequestSystemMessageContent::Text(content.to_string()),
        name: None,
    })
}

fn user_message(content: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        content: ChatCompletionRequestUserMessageContent::Text(content.to_string()),
        name: None,
    })
}

#[allow(deprecated)]
fn assistant_message(content: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
        content: Some(ChatCompletionRequestAssistantMessageContent::Text(
            content.to_string(),
        )),
        name: None,
        refusal: None,
        audio: None,
        tool_calls: None,
        function_call: None,
    })
}
