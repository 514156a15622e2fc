//! Bridge configuration, read from the environment.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// How runs are triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Manual,
    Interval,
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "interval" => Ok(Self::Interval),
            other => Err(SyncError::Config(format!("unknown sync mode '{}'", other))),
        }
    }
}

/// Settings for both backends and the run itself.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeConfig {
    pub notes_host: String,
    pub notes_port: u16,
    pub anki_host: String,
    pub anki_port: u16,
    /// Note type used for synced cards.
    pub model_name: String,
    pub root_deck: String,
    pub sync_mode: SyncMode,
    pub interval_minutes: u64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub timeout_secs: u64,
    pub link_scheme: String,
    /// Decks cleanup never deletes.
    pub preserved_decks: Vec<String>,
    pub dry_run: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            notes_host: "127.0.0.1".to_string(),
            notes_port: 6806,
            anki_host: "127.0.0.1".to_string(),
            anki_port: 8765,
            model_name: "siyuan".to_string(),
            root_deck: "SiYuan".to_string(),
            sync_mode: SyncMode::Manual,
            interval_minutes: 10,
            last_sync_at: None,
            timeout_secs: 30,
            link_scheme: "siyuan".to_string(),
            preserved_decks: vec!["Default".to_string()],
            dry_run: false,
        }
    }
}

impl BridgeConfig {
    /// Load from the process environment, after reading any `.env` file.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DECKBRIDGE_NOTES_HOST") {
            config.notes_host = v;
        }
        if let Some(v) = get("DECKBRIDGE_NOTES_PORT") {
            config.notes_port = parse("DECKBRIDGE_NOTES_PORT", &v)?;
        }
        if let Some(v) = get("DECKBRIDGE_ANKI_HOST") {
            config.anki_host = v;
        }
        if let Some(v) = get("DECKBRIDGE_ANKI_PORT") {
            config.anki_port = parse("DECKBRIDGE_ANKI_PORT", &v)?;
        }
        if let Some(v) = get("DECKBRIDGE_MODEL") {
            config.model_name = v;
        }
        if let Some(v) = get("DECKBRIDGE_ROOT_DECK") {
            config.root_deck = v;
        }
        if let Some(v) = get("DECKBRIDGE_SYNC_MODE") {
            config.sync_mode = v.parse()?;
        }
        if let Some(v) = get("DECKBRIDGE_INTERVAL_MINUTES") {
            config.interval_minutes = parse("DECKBRIDGE_INTERVAL_MINUTES", &v)?;
            if config.interval_minutes == 0 {
                return Err(SyncError::Config(
                    "DECKBRIDGE_INTERVAL_MINUTES must be at least 1".to_string(),
                ));
            }
            if config.interval_minutes.checked_mul(60).is_none() {
                return Err(SyncError::Config(
                    "DECKBRIDGE_INTERVAL_MINUTES is too large".to_string(),
                ));
            }
        }
        if let Some(v) = get("DECKBRIDGE_LAST_SYNC") {
            let parsed = DateTime::parse_from_rfc3339(v.trim())
                .map_err(|e| SyncError::Config(format!("DECKBRIDGE_LAST_SYNC: {}", e)))?;
            config.last_sync_at = Some(parsed.with_timezone(&Utc));
        }
        if let Some(v) = get("DECKBRIDGE_TIMEOUT_SECS") {
            config.timeout_secs = parse("DECKBRIDGE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("DECKBRIDGE_LINK_SCHEME") {
            config.link_scheme = v;
        }
        if let Some(v) = lookup("DECKBRIDGE_PRESERVED_DECKS") {
            config.preserved_decks = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = get("DECKBRIDGE_DRY_RUN") {
            config.dry_run = parse("DECKBRIDGE_DRY_RUN", &v.to_ascii_lowercase())?;
        }

        Ok(config)
    }

    /// Base address of the notes backend.
    pub fn notes_url(&self) -> String {
        format!("http://{}:{}", self.notes_host, self.notes_port)
    }

    /// Endpoint of the flashcard backend.
    pub fn anki_url(&self) -> String {
        format!("http://{}:{}", self.anki_host, self.anki_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Period between timer-triggered runs, when interval mode is on.
    pub fn interval(&self) -> Option<Duration> {
        match self.sync_mode {
            SyncMode::Manual => None,
            SyncMode::Interval => Some(Duration::from_secs(self.interval_minutes.saturating_mul(60))),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| SyncError::Config(format!("{}: {}", key, e)))
}
