//! In-memory backends for driving the sync engine end to end.
//!
//! `FakeNotes` serves notebooks and blocks and records pushed messages.
//! `FakeAnki` keeps notes, cards and decks the way the flashcard app does,
//! logs every action it receives, and can be told to fail a given action.

#![allow(dead_code)]

pub mod fixtures;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use deckbridge::anki::{
    BatchResult, CardInfo, DeckMove, DeckStat, FieldValue, FlashcardBackend, ModelSpec, NewNote,
    NoteFields,
};
use deckbridge::config::BridgeConfig;
use deckbridge::error::{Result, SyncError};
use deckbridge::notes::{Block, Notebook, NotesBackend};
use deckbridge::sync::SyncEngine;
use deckbridge_core::is_ancestor_or_self;

/// Rows the notes store returns for a statement without its own `LIMIT`.
pub const DEFAULT_QUERY_LIMIT: usize = 64;

#[derive(Default)]
pub struct FakeNotes {
    pub notebooks: Mutex<Vec<Notebook>>,
    pub blocks: Mutex<Vec<Block>>,
    pub messages: Mutex<Vec<String>>,
    pub statements: Mutex<Vec<String>>,
}

impl FakeNotes {
    pub fn new(notebooks: Vec<Notebook>, blocks: Vec<Block>) -> Self {
        Self {
            notebooks: Mutex::new(notebooks),
            blocks: Mutex::new(blocks),
            messages: Mutex::new(Vec::new()),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn set_notebooks(&self, notebooks: Vec<Notebook>) {
        *self.notebooks.lock().unwrap() = notebooks;
    }

    pub fn set_blocks(&self, blocks: Vec<Block>) {
        *self.blocks.lock().unwrap() = blocks;
    }

    pub fn edit_block(&self, id: &str, edit: impl FnOnce(&mut Block)) {
        let mut blocks = self.blocks.lock().unwrap();
        let block = blocks.iter_mut().find(|b| b.id == id).expect("block exists");
        edit(block);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

/// The number following `keyword` in a statement, if any.
fn clause(stmt: &str, keyword: &str) -> Option<usize> {
    let mut words = stmt.split_whitespace();
    words.find(|w| w.eq_ignore_ascii_case(keyword))?;
    words.next()?.parse().ok()
}

#[async_trait]
impl NotesBackend for FakeNotes {
    async fn list_notebooks(&self) -> Result<Vec<Notebook>> {
        Ok(self.notebooks.lock().unwrap().clone())
    }

    /// Applies `ORDER BY id`, `LIMIT` and `OFFSET`, and caps statements
    /// without a `LIMIT` like the real store does.
    async fn query_blocks(&self, stmt: &str) -> Result<Vec<Block>> {
        self.statements.lock().unwrap().push(stmt.to_string());
        let mut blocks = self.blocks.lock().unwrap().clone();
        if stmt.contains("ORDER BY id") {
            blocks.sort_by(|a, b| a.id.cmp(&b.id));
        }
        let limit = clause(stmt, "LIMIT").unwrap_or(DEFAULT_QUERY_LIMIT);
        let offset = clause(stmt, "OFFSET").unwrap_or(0);
        Ok(blocks.into_iter().skip(offset).take(limit).collect())
    }

    async fn push_message(&self, msg: &str, _timeout_ms: u64) -> Result<()> {
        self.messages.lock().unwrap().push(msg.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StoredNote {
    pub model: String,
    pub deck: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Default)]
struct AnkiState {
    models: Vec<String>,
    decks: BTreeSet<String>,
    notes: BTreeMap<i64, StoredNote>,
    next_id: i64,
    calls: Vec<&'static str>,
}

pub struct FakeAnki {
    state: Mutex<AnkiState>,
    fail_on: Mutex<Option<&'static str>>,
    reject_ids: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl Default for FakeAnki {
    fn default() -> Self {
        let mut state = AnkiState {
            next_id: 1,
            ..AnkiState::default()
        };
        state.decks.insert("Default".to_string());
        state.models.push("Basic".to_string());
        Self {
            state: Mutex::new(state),
            fail_on: Mutex::new(None),
            reject_ids: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        }
    }
}

fn card_id(note: i64) -> i64 {
    note + 1000
}

impl FakeAnki {
    /// Make every call of `action` fail with a backend error.
    pub fn fail_on(&self, action: &'static str) {
        *self.fail_on.lock().unwrap() = Some(action);
    }

    /// Refuse to add notes carrying this block id.
    pub fn reject(&self, block_id: &str) {
        self.reject_ids.lock().unwrap().push(block_id.to_string());
    }

    /// Slow down `modelNames`, the first call of every run.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn add_deck(&self, deck: &str) {
        self.state.lock().unwrap().decks.insert(deck.to_string());
    }

    pub fn decks(&self) -> Vec<String> {
        self.state.lock().unwrap().decks.iter().cloned().collect()
    }

    pub fn models(&self) -> Vec<String> {
        self.state.lock().unwrap().models.clone()
    }

    pub fn notes(&self) -> Vec<StoredNote> {
        self.state.lock().unwrap().notes.values().cloned().collect()
    }

    /// The stored note for a block id.
    pub fn note_for(&self, block_id: &str) -> Option<StoredNote> {
        self.notes()
            .into_iter()
            .find(|n| n.fields.get("id").map(String::as_str) == Some(block_id))
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn call(&self, action: &'static str) -> Result<()> {
        self.state.lock().unwrap().calls.push(action);
        if *self.fail_on.lock().unwrap() == Some(action) {
            return Err(SyncError::Backend {
                action: action.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

fn insert_with_parents(decks: &mut BTreeSet<String>, deck: &str) {
    let parts: Vec<&str> = deck.split("::").collect();
    for i in 1..=parts.len() {
        decks.insert(parts[..i].join("::"));
    }
}

#[async_trait]
impl FlashcardBackend for FakeAnki {
    async fn model_names(&self) -> Result<Vec<String>> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.call("modelNames")?;
        Ok(self.models())
    }

    async fn create_model(&self, model: &ModelSpec) -> Result<()> {
        self.call("createModel")?;
        self.state.lock().unwrap().models.push(model.name.clone());
        Ok(())
    }

    async fn find_cards(&self, query: &str) -> Result<Vec<i64>> {
        self.call("findCards")?;
        let model = query.trim_matches('"').trim_start_matches("note:");
        let state = self.state.lock().unwrap();
        Ok(state
            .notes
            .iter()
            .filter(|(_, n)| n.model == model)
            .map(|(id, _)| card_id(*id))
            .collect())
    }

    async fn cards_info(&self, cards: &[i64]) -> Result<Vec<CardInfo>> {
        self.call("cardsInfo")?;
        let state = self.state.lock().unwrap();
        Ok(cards
            .iter()
            .filter_map(|card| {
                let note_id = card - 1000;
                state.notes.get(&note_id).map(|note| CardInfo {
                    card_id: *card,
                    note: note_id,
                    deck_name: note.deck.clone(),
                    model_name: note.model.clone(),
                    fields: note
                        .fields
                        .iter()
                        .map(|(k, v)| {
                            (
                                k.clone(),
                                FieldValue {
                                    value: v.clone(),
                                    order: 0,
                                },
                            )
                        })
                        .collect(),
                })
            })
            .collect())
    }

    async fn deck_names(&self) -> Result<Vec<String>> {
        self.call("deckNames")?;
        Ok(self.decks())
    }

    async fn create_decks(&self, decks: &[String]) -> Result<BatchResult> {
        self.call("createDeck")?;
        let mut state = self.state.lock().unwrap();
        Ok(decks
            .iter()
            .map(|deck| {
                insert_with_parents(&mut state.decks, deck);
                Ok(())
            })
            .collect())
    }

    async fn add_notes(&self, notes: &[NewNote]) -> Result<Vec<Option<i64>>> {
        self.call("addNotes")?;
        let rejected = self.reject_ids.lock().unwrap().clone();
        let mut state = self.state.lock().unwrap();
        let mut ids = Vec::new();
        for note in notes {
            let block = note.fields.get("id").cloned().unwrap_or_default();
            if rejected.contains(&block) || !state.decks.contains(&note.deck_name) {
                ids.push(None);
                continue;
            }
            let id = state.next_id;
            state.next_id += 1;
            state.notes.insert(
                id,
                StoredNote {
                    model: note.model_name.clone(),
                    deck: note.deck_name.clone(),
                    fields: note.fields.clone(),
                },
            );
            ids.push(Some(id));
        }
        Ok(ids)
    }

    async fn update_notes(&self, notes: &[NoteFields]) -> Result<BatchResult> {
        self.call("updateNoteFields")?;
        let mut state = self.state.lock().unwrap();
        Ok(notes
            .iter()
            .map(|update| match state.notes.get_mut(&update.id) {
                Some(note) => {
                    note.fields.extend(update.fields.clone());
                    Ok(())
                }
                None => Err("note was not found".to_string()),
            })
            .collect())
    }

    async fn change_decks(&self, moves: &[DeckMove]) -> Result<BatchResult> {
        self.call("changeDeck")?;
        let mut state = self.state.lock().unwrap();
        Ok(moves
            .iter()
            .map(|m| {
                insert_with_parents(&mut state.decks, &m.deck);
                for card in &m.cards {
                    if let Some(note) = state.notes.get_mut(&(card - 1000)) {
                        note.deck = m.deck.clone();
                    }
                }
                Ok(())
            })
            .collect())
    }

    async fn delete_notes(&self, notes: &[i64]) -> Result<()> {
        self.call("deleteNotes")?;
        let mut state = self.state.lock().unwrap();
        for id in notes {
            state.notes.remove(id);
        }
        Ok(())
    }

    async fn delete_decks(&self, decks: &[String]) -> Result<()> {
        self.call("deleteDecks")?;
        let mut state = self.state.lock().unwrap();
        let doomed = |d: &str| decks.iter().any(|deck| is_ancestor_or_self(deck, d));
        state.decks.retain(|d| !doomed(d.as_str()));
        state.notes.retain(|_, n| !doomed(n.deck.as_str()));
        Ok(())
    }

    async fn deck_stats(&self, decks: &[String]) -> Result<Vec<DeckStat>> {
        self.call("getDeckStats")?;
        let state = self.state.lock().unwrap();
        Ok(decks
            .iter()
            .filter(|d| state.decks.contains(*d))
            .map(|d| DeckStat {
                name: d.clone(),
                total_in_deck: state.notes.values().filter(|n| &n.deck == d).count(),
            })
            .collect())
    }
}

/// Engine wired to fresh fakes.
pub struct TestContext {
    pub notes: Arc<FakeNotes>,
    pub anki: Arc<FakeAnki>,
    pub engine: SyncEngine,
}

impl TestContext {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self::with_config(fixtures::config(), blocks)
    }

    pub fn with_config(config: BridgeConfig, blocks: Vec<Block>) -> Self {
        let notes = Arc::new(FakeNotes::new(fixtures::notebooks(), blocks));
        let anki = Arc::new(FakeAnki::default());
        let engine = SyncEngine::new(config, notes.clone(), anki.clone());
        Self { notes, anki, engine }
    }
}
