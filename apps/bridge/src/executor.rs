//! Mutation executor.
//!
//! A reconciliation is turned into an [`ActionBatch`] whose steps always run
//! in the same order:
//!
//! 1. create missing decks
//! 2. add new notes, assigning the returned ids back to their records
//! 3. rewrite fields of stale notes
//! 4. move cards whose deck changed
//! 5. delete obsolete notes
//!
//! A failed call aborts the remaining steps. Per-item failures inside a
//! batch are collected and the batch moves on.

use std::sync::Arc;

use deckbridge_core::{is_ancestor_or_self, prune_empty_decks, DeckPlan, Diff, FlashcardRecord};
use serde::Serialize;

use crate::anki::model::{model_spec, note_fields};
use crate::anki::{BatchResult, DeckMove, FlashcardBackend, NewNote, NoteFields};
use crate::error::{BatchFailure, Result, SyncError};

/// The remote work of one run, in execution order.
#[derive(Debug, Clone, Default)]
pub struct ActionBatch {
    pub create_decks: Vec<String>,
    pub add_notes: Vec<FlashcardRecord>,
    pub update_notes: Vec<FlashcardRecord>,
    pub move_cards: Vec<DeckMove>,
    /// Block id and note id of every note to delete.
    pub delete_notes: Vec<(String, i64)>,
}

impl ActionBatch {
    /// Build the batch from a transformed diff and its deck plan.
    pub fn new(diff: Diff, plan: &DeckPlan) -> Self {
        // One move per target deck, in first-seen order.
        let mut move_cards: Vec<DeckMove> = Vec::new();
        for update in diff.moved() {
            let record = &update.record;
            if record.destination_card_ids.is_empty() {
                continue;
            }
            match move_cards.iter_mut().find(|m| m.deck == record.deck_path) {
                Some(m) => m.cards.extend_from_slice(&record.destination_card_ids),
                None => move_cards.push(DeckMove {
                    deck: record.deck_path.clone(),
                    cards: record.destination_card_ids.clone(),
                }),
            }
        }

        let delete_notes = diff
            .delete
            .iter()
            .filter_map(|r| r.destination_note_id.map(|note| (r.id.clone(), note)))
            .collect();

        Self {
            create_decks: plan.to_create.clone(),
            add_notes: diff.create,
            update_notes: diff.update.into_iter().map(|u| u.record).collect(),
            move_cards,
            delete_notes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.create_decks.is_empty()
            && self.add_notes.is_empty()
            && self.update_notes.is_empty()
            && self.move_cards.is_empty()
            && self.delete_notes.is_empty()
    }
}

/// What an executed batch achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub decks_created: usize,
    pub notes_created: usize,
    pub notes_updated: usize,
    pub cards_moved: usize,
    pub notes_deleted: usize,
    /// Block id and new note id of every created note.
    pub assigned_ids: Vec<(String, i64)>,
    pub failures: Vec<BatchFailure>,
}

/// Runs batches against the flashcard backend.
#[derive(Clone)]
pub struct Executor {
    anki: Arc<dyn FlashcardBackend>,
    model_name: String,
    root_deck: String,
    preserved_decks: Vec<String>,
}

impl Executor {
    pub fn new(
        anki: Arc<dyn FlashcardBackend>,
        model_name: impl Into<String>,
        root_deck: impl Into<String>,
        preserved_decks: Vec<String>,
    ) -> Self {
        Self {
            anki,
            model_name: model_name.into(),
            root_deck: root_deck.into(),
            preserved_decks,
        }
    }

    pub async fn model_exists(&self) -> Result<bool> {
        let names = self.anki.model_names().await?;
        Ok(names.iter().any(|n| n == &self.model_name))
    }

    /// Create the note type unless it already exists.
    ///
    /// Returns `true` when it had to be created.
    pub async fn ensure_model(&self) -> Result<bool> {
        if self.model_exists().await? {
            return Ok(false);
        }

        tracing::info!(model = %self.model_name, "Creating note type");
        self.anki
            .create_model(&model_spec(&self.model_name))
            .await
            .map_err(|e| match e {
                SyncError::Connectivity(_) => e,
                other => SyncError::Schema(format!(
                    "could not create note type '{}': {}",
                    self.model_name, other
                )),
            })?;
        Ok(true)
    }

    /// Execute every step of the batch in order.
    pub async fn execute(&self, batch: ActionBatch) -> Result<ExecutionOutcome> {
        let mut outcome = ExecutionOutcome::default();

        if !batch.create_decks.is_empty() {
            tracing::info!(count = batch.create_decks.len(), "Creating decks");
            let results = self.anki.create_decks(&batch.create_decks).await?;
            outcome.decks_created = collect(
                "createDeck",
                batch.create_decks.iter().cloned(),
                results,
                &mut outcome.failures,
            );
        }

        if !batch.add_notes.is_empty() {
            tracing::info!(count = batch.add_notes.len(), "Adding notes");
            self.add_notes(batch.add_notes, &mut outcome).await?;
        }

        if !batch.update_notes.is_empty() {
            tracing::info!(count = batch.update_notes.len(), "Updating notes");
            let mut items = Vec::with_capacity(batch.update_notes.len());
            let mut updates = Vec::with_capacity(batch.update_notes.len());
            for record in &batch.update_notes {
                match record.destination_note_id {
                    Some(id) => {
                        items.push(record.id.clone());
                        updates.push(NoteFields {
                            id,
                            fields: note_fields(record),
                        });
                    }
                    None => fail(
                        &mut outcome.failures,
                        "updateNoteFields",
                        &record.id,
                        "no note id on record",
                    ),
                }
            }
            let results = self.anki.update_notes(&updates).await?;
            outcome.notes_updated =
                collect("updateNoteFields", items.into_iter(), results, &mut outcome.failures);
        }

        if !batch.move_cards.is_empty() {
            tracing::info!(count = batch.move_cards.len(), "Moving cards to new decks");
            let results = self.anki.change_decks(&batch.move_cards).await?;
            for (m, result) in batch.move_cards.iter().zip(results) {
                match result {
                    Ok(()) => outcome.cards_moved += m.cards.len(),
                    Err(message) => fail(&mut outcome.failures, "changeDeck", &m.deck, &message),
                }
            }
        }

        if !batch.delete_notes.is_empty() {
            tracing::info!(count = batch.delete_notes.len(), "Deleting notes");
            let ids: Vec<i64> = batch.delete_notes.iter().map(|(_, note)| *note).collect();
            self.anki.delete_notes(&ids).await?;
            outcome.notes_deleted = ids.len();
        }

        Ok(outcome)
    }

    /// Add notes and assign the returned ids, which arrive in request order.
    async fn add_notes(
        &self,
        mut records: Vec<FlashcardRecord>,
        outcome: &mut ExecutionOutcome,
    ) -> Result<()> {
        let notes: Vec<NewNote> = records
            .iter()
            .map(|r| NewNote::new(r.deck_path.clone(), self.model_name.clone(), note_fields(r)))
            .collect();

        let ids = self.anki.add_notes(&notes).await?;
        if ids.len() != records.len() {
            return Err(SyncError::Data(format!(
                "addNotes returned {} ids for {} notes",
                ids.len(),
                records.len()
            )));
        }

        for (record, id) in records.iter_mut().zip(ids) {
            match id {
                Some(id) => {
                    record.destination_note_id = Some(id);
                    outcome.assigned_ids.push((record.id.clone(), id));
                    outcome.notes_created += 1;
                }
                None => fail(&mut outcome.failures, "addNotes", &record.id, "note was not added"),
            }
        }
        Ok(())
    }

    /// Delete empty decks under the root deck.
    ///
    /// Card counts are re-read so that decks emptied by this run are seen.
    /// Returns the deleted deck names.
    pub async fn cleanup(&self) -> Result<Vec<String>> {
        let names: Vec<String> = self
            .anki
            .deck_names()
            .await?
            .into_iter()
            .filter(|d| is_ancestor_or_self(&self.root_deck, d))
            .collect();
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let counts: Vec<(String, usize)> = self
            .anki
            .deck_stats(&names)
            .await?
            .into_iter()
            .map(|s| (s.name, s.total_in_deck))
            .collect();

        let empty = prune_empty_decks(&counts, &self.root_deck, &self.preserved_decks);
        if !empty.is_empty() {
            tracing::info!(decks = ?empty, "Deleting empty decks");
            self.anki.delete_decks(&empty).await?;
        }
        Ok(empty)
    }
}

fn fail(failures: &mut Vec<BatchFailure>, step: &'static str, item: &str, message: &str) {
    tracing::warn!(step, item, "{}", message);
    failures.push(BatchFailure {
        step,
        item: item.to_string(),
        message: message.to_string(),
    });
}

/// Pair batch results with their items, recording failures. Returns the
/// number of successes.
fn collect(
    step: &'static str,
    items: impl Iterator<Item = String>,
    results: BatchResult,
    failures: &mut Vec<BatchFailure>,
) -> usize {
    let mut ok = 0;
    for (item, result) in items.zip(results) {
        match result {
            Ok(()) => ok += 1,
            Err(message) => fail(failures, step, &item, &message),
        }
    }
    ok
}
