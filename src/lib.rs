//! # expense_chat (library root)
//!
//! Chat history storage and the AI assistant behind the expense tracker's chat
//! screen.
//!
//! - Local chat history database (`db`, `schema`, `models`, `write_actor`, `store`).
//! - Session-aware data access with live queries (`dao`).
//! - Completion client and the chat round trip (`api`, `repository`).
//! - CLI parsing and configuration (`commands`, `config`).
//!
//! ## Layers
//!
//! ```text
//! ChatStore (SQLite file, writer thread, change feed)
//!    └─ SqliteChatMessageDao (ChatMessageDao)
//!          └─ ChatRepository (+ CompletionService)
//!                └─ `ec` CLI
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use expense_chat::{
//!     api::OpenAiCompletionService, config::load_config, dao::SqliteChatMessageDao,
//!     repository::ChatRepository, store::ChatStore,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(expense_chat::config_dir()?.join("config.yaml"))?;
//! let store = ChatStore::open(&config.session_db_url)?;
//! let repository = ChatRepository::new(
//!     Arc::new(SqliteChatMessageDao::new(store)),
//!     Arc::new(OpenAiCompletionService::from_config(&config)?),
//! );
//! let reply = repository.send_message("How do I add an expense?", "default").await?;
//! println!("{reply}");
//! # Ok(()) }
//! ```

use directories::ProjectDirs;
use std::error::Error;

pub mod api;
pub mod commands;
pub mod config;
pub mod dao;
pub mod db;
pub mod error;
pub mod models;
pub mod repository;
pub mod schema;
pub mod store;
pub mod write_actor;

/// Return the per-platform configuration directory used by the assistant.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "nono", "expense-chat")`, so you get the right place on each OS
/// (e.g., `~/.config/expense-chat` on Linux).
///
/// The directory is **not** created by this function.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined.
pub fn config_dir() -> Result<std::path::PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "nono", "expense-chat")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
