//! Client for the flashcard backend's RPC endpoint.
//!
//! A single URL accepts `{action, version, params}` and answers with
//! `{result, error}`. Heterogeneous work is batched through `multi`, which
//! answers with one entry per sub-action.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::error::{Result, SyncError};

pub mod model;

/// Protocol version sent with every request.
pub const API_VERSION: u8 = 6;

/// Per-item outcome of a batched call, in submission order.
pub type BatchResult = Vec<std::result::Result<(), String>>;

/// Note type definition used when the model is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub fields: Vec<String>,
    pub front_template: String,
    pub back_template: String,
}

/// One field of a card as reported by `cardsInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldValue {
    pub value: String,
    #[serde(default)]
    pub order: u32,
}

/// Card details as reported by `cardsInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInfo {
    pub card_id: i64,
    pub note: i64,
    pub deck_name: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

impl CardInfo {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|f| f.value.as_str())
    }
}

/// A note to be added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    pub deck_name: String,
    pub model_name: String,
    pub fields: BTreeMap<String, String>,
    options: NoteOptions,
    tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct NoteOptions {
    allow_duplicate: bool,
    duplicate_scope: String,
}

impl NewNote {
    /// Notes may share a front, so duplicates are allowed within a deck.
    pub fn new(deck_name: String, model_name: String, fields: BTreeMap<String, String>) -> Self {
        Self {
            deck_name,
            model_name,
            fields,
            options: NoteOptions {
                allow_duplicate: true,
                duplicate_scope: "deck".to_string(),
            },
            tags: Vec::new(),
        }
    }
}

/// New field values for an existing note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteFields {
    pub id: i64,
    pub fields: BTreeMap<String, String>,
}

/// Cards to move into a deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckMove {
    pub deck: String,
    pub cards: Vec<i64>,
}

/// Card count of one deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckStat {
    pub name: String,
    pub total_in_deck: usize,
}

/// Operations the bridge needs from the flashcard backend.
#[async_trait]
pub trait FlashcardBackend: Send + Sync {
    async fn model_names(&self) -> Result<Vec<String>>;
    async fn create_model(&self, model: &ModelSpec) -> Result<()>;
    async fn find_cards(&self, query: &str) -> Result<Vec<i64>>;
    async fn cards_info(&self, cards: &[i64]) -> Result<Vec<CardInfo>>;
    async fn deck_names(&self) -> Result<Vec<String>>;
    async fn create_decks(&self, decks: &[String]) -> Result<BatchResult>;
    /// Returns note ids in submission order, `None` where a note was refused.
    async fn add_notes(&self, notes: &[NewNote]) -> Result<Vec<Option<i64>>>;
    async fn update_notes(&self, notes: &[NoteFields]) -> Result<BatchResult>;
    async fn change_decks(&self, moves: &[DeckMove]) -> Result<BatchResult>;
    async fn delete_notes(&self, notes: &[i64]) -> Result<()>;
    /// Delete decks together with any cards still in them.
    async fn delete_decks(&self, decks: &[String]) -> Result<()>;
    async fn deck_stats(&self, decks: &[String]) -> Result<Vec<DeckStat>>;
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDeckStat {
    name: String,
    #[serde(default)]
    total_in_deck: usize,
}

/// HTTP client for the flashcard backend.
#[derive(Clone)]
pub struct AnkiClient {
    client: Client,
    url: String,
}

impl AnkiClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn invoke<T: DeserializeOwned>(&self, action: &str, params: Value) -> Result<T> {
        let request = json!({
            "action": action,
            "version": API_VERSION,
            "params": params,
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SyncError::Connectivity(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(SyncError::Backend {
                action: action.to_string(),
                message: format!("HTTP {}: {}", status, message),
            });
        }

        let response: Response = resp
            .json()
            .await
            .map_err(|e| SyncError::Data(format!("{}: {}", action, e)))?;

        if let Some(message) = response.error {
            return Err(SyncError::Backend {
                action: action.to_string(),
                message,
            });
        }

        serde_json::from_value(response.result)
            .map_err(|e| SyncError::Data(format!("{}: {}", action, e)))
    }

    /// Run sub-actions through `multi`, one result per action.
    async fn multi(&self, actions: Vec<Value>) -> Result<BatchResult> {
        if actions.is_empty() {
            return Ok(Vec::new());
        }
        let expected = actions.len();
        let results: Vec<Value> = self.invoke("multi", json!({ "actions": actions })).await?;

        if results.len() != expected {
            return Err(SyncError::Data(format!(
                "multi returned {} results for {} actions",
                results.len(),
                expected
            )));
        }

        Ok(results.into_iter().map(item_outcome).collect())
    }
}

/// Items come back either bare or wrapped as `{result, error}`.
fn item_outcome(item: Value) -> std::result::Result<(), String> {
    match item.get("error") {
        Some(Value::Null) | None => Ok(()),
        Some(Value::String(message)) => Err(message.clone()),
        Some(other) => Err(other.to_string()),
    }
}

fn sub_action(action: &str, params: Value) -> Value {
    json!({ "action": action, "version": API_VERSION, "params": params })
}

#[async_trait]
impl FlashcardBackend for AnkiClient {
    async fn model_names(&self) -> Result<Vec<String>> {
        self.invoke("modelNames", json!({})).await
    }

    async fn create_model(&self, model: &ModelSpec) -> Result<()> {
        let _: Value = self
            .invoke(
                "createModel",
                json!({
                    "modelName": model.name,
                    "inOrderFields": model.fields,
                    "cardTemplates": [{
                        "Name": "Card 1",
                        "Front": model.front_template,
                        "Back": model.back_template,
                    }],
                }),
            )
            .await?;
        Ok(())
    }

    async fn find_cards(&self, query: &str) -> Result<Vec<i64>> {
        self.invoke("findCards", json!({ "query": query })).await
    }

    async fn cards_info(&self, cards: &[i64]) -> Result<Vec<CardInfo>> {
        if cards.is_empty() {
            return Ok(Vec::new());
        }
        self.invoke("cardsInfo", json!({ "cards": cards })).await
    }

    async fn deck_names(&self) -> Result<Vec<String>> {
        self.invoke("deckNames", json!({})).await
    }

    async fn create_decks(&self, decks: &[String]) -> Result<BatchResult> {
        let actions = decks
            .iter()
            .map(|deck| sub_action("createDeck", json!({ "deck": deck })))
            .collect();
        self.multi(actions).await
    }

    async fn add_notes(&self, notes: &[NewNote]) -> Result<Vec<Option<i64>>> {
        if notes.is_empty() {
            return Ok(Vec::new());
        }
        self.invoke("addNotes", json!({ "notes": notes })).await
    }

    async fn update_notes(&self, notes: &[NoteFields]) -> Result<BatchResult> {
        let actions = notes
            .iter()
            .map(|note| sub_action("updateNoteFields", json!({ "note": note })))
            .collect();
        self.multi(actions).await
    }

    async fn change_decks(&self, moves: &[DeckMove]) -> Result<BatchResult> {
        let actions = moves
            .iter()
            .map(|m| sub_action("changeDeck", json!({ "cards": m.cards, "deck": m.deck })))
            .collect();
        self.multi(actions).await
    }

    async fn delete_notes(&self, notes: &[i64]) -> Result<()> {
        if notes.is_empty() {
            return Ok(());
        }
        let _: Value = self.invoke("deleteNotes", json!({ "notes": notes })).await?;
        Ok(())
    }

    async fn delete_decks(&self, decks: &[String]) -> Result<()> {
        if decks.is_empty() {
            return Ok(());
        }
        let _: Value = self
            .invoke("deleteDecks", json!({ "decks": decks, "cardsToo": true }))
            .await?;
        Ok(())
    }

    async fn deck_stats(&self, decks: &[String]) -> Result<Vec<DeckStat>> {
        if decks.is_empty() {
            return Ok(Vec::new());
        }
        let raw: HashMap<String, RawDeckStat> =
            self.invoke("getDeckStats", json!({ "decks": decks })).await?;
        let by_name: HashMap<String, usize> = raw
            .into_values()
            .map(|s| (s.name, s.total_in_deck))
            .collect();

        Ok(decks
            .iter()
            .filter_map(|name| {
                by_name.get(name).map(|&total| DeckStat {
                    name: name.clone(),
                    total_in_deck: total,
                })
            })
            .collect())
    }
}
