//! Main module for the expense assistant CLI (`ec`).
//!
//! Loads the configuration, opens the chat history store and dispatches the
//! parsed subcommand.
//!
//! # Examples
//!
//! ```sh
//! ec init
//! ec ask "How much did I spend on transport this month?" -s march
//! ec history -s march --json
//! ec watch -s march
//! ec clear -s march
//! ```

use clap::Parser;
use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, Print, SetAttribute, SetForegroundColor},
};
use expense_chat::{
    api::OpenAiCompletionService,
    commands::{Cli, Commands},
    config::{self, ExpenseChatConfig},
    config_dir,
    dao::{ChatMessageDao, SqliteChatMessageDao},
    models::ChatMessage,
    repository::ChatRepository,
    store::{ChatStore, DEFAULT_DB_FILE},
};
use futures::StreamExt;
use once_cell::sync::OnceCell;
use std::{
    env,
    error::Error,
    fs,
    io::{Write, stdout},
    sync::Arc,
};
use tracing::{debug, info};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

/// Parses the command line, loads configuration and executes the command.
async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        debug!("Initializing configuration");
        return init();
    }

    let config_path = if env::var("IN_TEST_ENVIRONMENT").is_ok() {
        env::current_dir()?.join("config.yaml")
    } else {
        config_dir()?.join("config.yaml")
    };
    debug!("Loading config from: {}", config_path.display());
    let config = config::load_config(&config_path)?;

    let store = ChatStore::open(&config.session_db_url)?;
    let dao = Arc::new(SqliteChatMessageDao::new(store));

    match cli.command {
        Commands::Ask { question, session } => {
            let session = config.session_or_default(session);
            let question = question.unwrap_or_else(|| "How can I spend less this month?".to_string());
            let repository = ChatRepository::new(
                dao,
                Arc::new(OpenAiCompletionService::from_config(&config)?),
            )
            .with_history_turns(config.history_turns);

            repository.send_message(&question, &session).await?;
            if let Some(snapshot) = repository.chat_messages(&session).next().await {
                if let Some(reply) = snapshot?.last() {
                    print_turn(reply)?;
                }
            }
        }
        Commands::History { session, json } => {
            let session = config.session_or_default(session);
            if let Some(snapshot) = dao.get_by_session(&session).next().await {
                print_snapshot(&snapshot?, json)?;
            }
        }
        Commands::Recent { limit, json } => {
            let limit = limit.unwrap_or(config.recent_limit);
            if let Some(snapshot) = dao.get_recent(limit).next().await {
                print_snapshot(&snapshot?, json)?;
            }
        }
        Commands::Watch { session } => {
            let session = config.session_or_default(session);
            watch(&*dao, &session).await?;
        }
        Commands::Delete { id } => match dao.find(&id).await? {
            Some(message) => {
                dao.delete_by_id(&id).await?;
                info!("Deleted message {} from session {}", id, message.session_id);
            }
            None => println!("No message with id {id}"),
        },
        Commands::Clear { session, all } => {
            if all {
                dao.delete_all().await?;
                info!("Cleared all chat history");
            } else {
                let session = config.session_or_default(session);
                dao.delete_by_session(&session).await?;
                info!("Cleared session {}", session);
            }
        }
        // Handled before the config is loaded.
        Commands::Init => {}
    }

    Ok(())
}

/// Reprints the session every time it changes until Ctrl-C.
async fn watch(dao: &dyn ChatMessageDao, session: &str) -> Result<(), Box<dyn Error>> {
    let mut messages = dao.get_by_session(session);
    loop {
        tokio::select! {
            snapshot = messages.next() => match snapshot {
                Some(snapshot) => {
                    println!("--- {} ---", session);
                    print_messages(&snapshot?)?;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn print_snapshot(messages: &[ChatMessage], json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(messages)?);
        return Ok(());
    }
    print_messages(messages)
}

fn print_messages(messages: &[ChatMessage]) -> Result<(), Box<dyn Error>> {
    if messages.is_empty() {
        println!("(no messages)");
    }
    for message in messages {
        print_turn(message)?;
    }
    Ok(())
}

/// Prints one message: user turns in green, assistant turns in bold blue.
fn print_turn(message: &ChatMessage) -> Result<(), Box<dyn Error>> {
    let mut stdout = stdout();
    let (label, color) = if message.is_user {
        ("you", Color::Green)
    } else {
        ("nono", Color::Blue)
    };

    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    stdout.execute(Print(format!(
        "[{}] {} ",
        message.timestamp.format("%Y-%m-%d %H:%M"),
        message.id
    )))?;
    stdout.execute(SetForegroundColor(color))?;
    stdout.execute(SetAttribute(Attribute::Bold))?;
    stdout.execute(Print(format!("{label}: ")))?;
    stdout.execute(SetAttribute(Attribute::Reset))?;
    stdout.execute(SetForegroundColor(Color::Reset))?;
    writeln!(stdout, "{}", message.content)?;
    stdout.flush()?;
    Ok(())
}

/// Writes a default `config.yaml` into the configuration directory.
fn init() -> Result<(), Box<dyn Error>> {
    let config_dir = config_dir()?;
    info!("Creating config directory: {}", config_dir.display());
    fs::create_dir_all(&config_dir)?;

    let config_path = config_dir.join("config.yaml");
    info!("Creating config file: {}", config_path.display());
    let config = ExpenseChatConfig {
        api_base: "http://localhost:5001/v1".to_string(),
        api_key: "CHANGEME".to_string(),
        model: "gpt-4o-mini".to_string(),
        max_tokens: 1024,
        temperature: Some(0.7),
        session_db_url: config_dir.join(DEFAULT_DB_FILE).to_string_lossy().into_owned(),
        default_session: None,
        history_turns: config::DEFAULT_HISTORY_TURNS,
        recent_limit: expense_chat::dao::DEFAULT_RECENT_LIMIT,
        system_prompt: None,
    };
    let config_yaml = serde_yaml::to_string(&config)?;
    fs::write(config_path, config_yaml)?;

    Ok(())
}
