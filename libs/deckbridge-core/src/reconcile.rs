//! Reconciliation of notes-side records against flashcard-side records.
//!
//! The notes store is the source of truth. Every id in either map lands in
//! exactly one bucket: `create`, `update`, `delete`, or none when the
//! destination copy is already current.

use crate::types::{FlashcardRecord, RecordMap};

/// A record whose destination copy is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    /// Source record carrying the destination note and card ids.
    pub record: FlashcardRecord,
    /// Deck the destination cards currently sit in.
    pub previous_deck: String,
}

impl Update {
    pub fn deck_changed(&self) -> bool {
        self.record.deck_path != self.previous_deck
    }
}

/// Result of comparing the two record sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub create: Vec<FlashcardRecord>,
    pub update: Vec<Update>,
    pub delete: Vec<FlashcardRecord>,
    /// Ids present on both sides that need no change.
    pub unchanged: Vec<String>,
}

impl Diff {
    /// True when no mutation is needed.
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Updated records whose deck membership has to move.
    pub fn moved(&self) -> impl Iterator<Item = &Update> {
        self.update.iter().filter(|u| u.deck_changed())
    }
}

/// Compare source and destination records.
///
/// Output order follows the insertion order of the input maps.
pub fn reconcile(source: &RecordMap, dest: &RecordMap) -> Diff {
    let mut diff = Diff::default();

    for record in source.iter() {
        match dest.get(&record.id) {
            None => diff.create.push(record.clone()),
            Some(existing) if needs_update(record, existing) => {
                let mut record = record.clone();
                record.destination_note_id = existing.destination_note_id;
                record.destination_card_ids = existing.destination_card_ids.clone();
                diff.update.push(Update {
                    record,
                    previous_deck: existing.deck_path.clone(),
                });
            }
            Some(_) => diff.unchanged.push(record.id.clone()),
        }
    }

    diff.delete = dest
        .iter()
        .filter(|r| !source.contains(&r.id))
        .cloned()
        .collect();

    diff
}

/// The destination copy is stale when the source was edited after it, when
/// the deck moved, or when the content hashes differ. A missing hash on
/// either side counts as a difference.
fn needs_update(source: &FlashcardRecord, dest: &FlashcardRecord) -> bool {
    let newer = match (source.updated_at, dest.updated_at) {
        (Some(s), Some(d)) => s > d,
        (Some(_), None) => true,
        (None, _) => false,
    };
    let content_changed = match (&source.content_hash, &dest.content_hash) {
        (Some(a), Some(b)) => a != b,
        _ => true,
    };

    newer || source.deck_path != dest.deck_path || content_changed
}
