//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the `ExpenseChatConfig` struct, which holds the configuration parameters,
//! and a `load_config` function to load the configuration from a YAML file.
//!
//! # Examples
//!
//! Loading the configuration from a file:
//!
//! ```no_run
//! use expense_chat::config::{ExpenseChatConfig, load_config};
//!
//! let config_file_path = "/path/to/config.yaml";
//! let config: ExpenseChatConfig = load_config(config_file_path).unwrap();
//! println!("{:?}", config);
//! ```

use serde::{Deserialize, Serialize};
use std::{error::Error, fs, path::Path};

use tracing::*;

use crate::dao::DEFAULT_RECENT_LIMIT;
use crate::models::DEFAULT_SESSION_ID;

/// Turns of prior conversation sent along with a new question.
pub const DEFAULT_HISTORY_TURNS: usize = 10;

/// Represents the application's configuration.
///
/// This struct holds the parameters needed to run the assistant: how to reach
/// the completion API, where the chat history database lives and which session
/// to use when none is given on the command line.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct ExpenseChatConfig {
    /// The API key used to authenticate requests to the API.
    pub api_key: String,

    /// The base URL of the API.
    pub api_base: String,

    /// The name of the model to be used for generating responses.
    pub model: String,

    /// Upper bound on tokens in a single reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature; the API default applies when unset.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Path of the chat history SQLite file.
    pub session_db_url: String,

    /// Session used when none is given.
    #[serde(default)]
    pub default_session: Option<String>,

    /// How many earlier question/answer pairs to send with a new question.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Row ceiling for the `recent` command.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Overrides the built-in assistant system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_history_turns() -> usize {
    DEFAULT_HISTORY_TURNS
}

fn default_recent_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

impl ExpenseChatConfig {
    /// The session to use when the caller did not name one.
    pub fn session_or_default(&self, session: Option<String>) -> String {
        session
            .or_else(|| self.default_session.clone())
            .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string())
    }
}

/// Loads the application's configuration from a YAML file.
///
/// # Returns
///
/// - `Ok(ExpenseChatConfig)`: The loaded configuration.
/// - `Err(Box<dyn Error>)`: An error occurred while reading the file or parsing the YAML.
pub fn load_config(file: impl AsRef<Path>) -> Result<ExpenseChatConfig, Box<dyn Error>> {
    let file = file.as_ref();
    debug!("Loading config from {}", file.display());
    let content = fs::read_to_string(file)?;
    let config: ExpenseChatConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}
