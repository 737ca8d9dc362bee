//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use expense_chat::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! if let Commands::History { session, .. } = cli.command {
//!     println!("showing {:?}", session);
//! }
//! ```

use clap::{Parser, Subcommand};

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Ask the assistant a question and store the exchange.
    #[clap(name = "ask", alias = "a")]
    Ask {
        /// The question to be asked. If not provided, a default question is used.
        question: Option<String>,

        #[arg(name = "session", short = 's')]
        session: Option<String>,
    },

    /// Print a session's messages, oldest first.
    #[clap(name = "history", alias = "h")]
    History {
        #[arg(name = "session", short = 's')]
        session: Option<String>,

        /// Print the messages as JSON instead of colored text.
        #[arg(long)]
        json: bool,
    },

    /// Print the newest messages across all sessions.
    #[clap(name = "recent", alias = "r")]
    Recent {
        /// Maximum number of messages to print.
        #[arg(name = "limit", short = 'n')]
        limit: Option<usize>,

        /// Print the messages as JSON instead of colored text.
        #[arg(long)]
        json: bool,
    },

    /// Follow a session and reprint it whenever it changes, until Ctrl-C.
    #[clap(name = "watch", alias = "w")]
    Watch {
        #[arg(name = "session", short = 's')]
        session: Option<String>,
    },

    /// Delete a single message by id.
    Delete {
        /// Identifier of the message to delete.
        id: String,
    },

    /// Delete a session's messages, or every message with `--all`.
    Clear {
        #[arg(name = "session", short = 's', conflicts_with = "all")]
        session: Option<String>,

        #[arg(long)]
        all: bool,
    },

    /// Write a default configuration file.
    Init,
}
