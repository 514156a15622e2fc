pub mod anki;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod notes;
pub mod schedule;
pub mod sync;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::anki::AnkiClient;
use crate::config::BridgeConfig;
use crate::notes::NotesClient;
use crate::sync::{SyncEngine, Trigger};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BridgeConfig::from_env()?;
    tracing::info!(
        notes = %config.notes_url(),
        anki = %config.anki_url(),
        mode = ?config.sync_mode,
        dry_run = config.dry_run,
        "Starting deckbridge"
    );

    let notes = NotesClient::new(config.notes_url(), config.request_timeout())?;
    let anki = AnkiClient::new(config.anki_url(), config.request_timeout())?;
    let interval = config.interval();
    let engine = SyncEngine::new(config, Arc::new(notes), Arc::new(anki));

    match interval {
        None => {
            let report = engine.run(Trigger::Manual).await?;
            for line in &report.summary {
                tracing::info!("{}", line);
            }
        }
        Some(period) => {
            tracing::info!("Syncing every {} seconds", period.as_secs());
            let handle = schedule::spawn_interval(engine, period);
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
                res = handle => res?,
            }
        }
    }

    Ok(())
}
