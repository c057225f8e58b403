//! Astra Companion - terminal chat front end
//!
//! Runs the state engine against a SQLite (or in-memory) store and drives it
//! from stdin.

use astra_companion::composer::Composer;
use astra_companion::config::{AppConfig, LogFormat, StorageKind};
use astra_companion::engine::{Engine, Hydration};
use astra_companion::haptics::NoHaptics;
use astra_companion::persistence::Persistence;
use astra_companion::provider::Provider;
use astra_companion::repl::{self, Flow, Session};
use astra_companion::storage::{KeyValueStore, MemoryStore, SqliteStore};
use astra_companion::voice::Unsupported;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// The engine is shared through `Rc`, so everything stays on one thread
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env();

    // Initialize logging; stdout belongs to the conversation
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "astra_companion=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    let store: Arc<dyn KeyValueStore> = match config.storage {
        StorageKind::Sqlite => {
            if let Some(parent) = config.db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            tracing::info!(path = %config.db_path.display(), "Opening database");
            Arc::new(SqliteStore::open(&config.db_path)?)
        }
        StorageKind::Memory => {
            tracing::info!("Using in-memory storage, nothing will be kept");
            Arc::new(MemoryStore::new())
        }
    };

    let (persistence, _writer) = Persistence::spawn(store, config.storage_key.clone());
    let mut engine = Engine::new(persistence.clone());
    if engine.hydrate().await == Hydration::Hydrated {
        tracing::info!(
            conversations = engine.state().conversations.len(),
            "Restored saved conversations"
        );
    }

    let mut provider = Provider::new();
    let shared = provider.init(engine);
    let mut session = Session::new(Composer::new(Unsupported, NoHaptics));

    {
        let mut out = std::io::stdout().lock();
        writeln!(out, "Astra Companion. Type /help for commands.")?;
        repl::show_active(&shared.borrow(), &mut out)?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        {
            let mut out = std::io::stdout().lock();
            session.poll_voice(&mut out)?;
            write!(out, "> ")?;
            out.flush()?;
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match repl::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        let engine = provider.app_state();
        let mut out = std::io::stdout().lock();
        let flow = session.execute(&mut engine.borrow_mut(), command, &mut out)?;
        if flow == Flow::Quit {
            break;
        }
    }

    persistence.flush().await;
    tracing::info!("Saved state, exiting");
    Ok(())
}
