//! Deck naming and deck lifecycle.
//!
//! Deck names are hierarchical: `Root::Notebook::Folder`. A deck is kept as
//! long as it, or any deck below it, is still referenced.

use std::collections::{BTreeSet, HashMap};

use crate::reconcile::Diff;
use crate::types::RecordMap;

/// Hierarchy separator used by the flashcard backend.
pub const DECK_SEPARATOR: &str = "::";

/// Derive a deck path from the root deck, the notebook name and the
/// document's hierarchical path (`/Folder/Sub/Document`).
///
/// The last path segment names the document itself and is not a deck.
pub fn deck_path(root: &str, notebook: &str, hpath: &str) -> String {
    let mut folders: Vec<&str> = hpath
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    folders.pop();

    [root, notebook]
        .into_iter()
        .chain(folders)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(DECK_SEPARATOR)
}

/// True when `deck` equals `other` or is one of its ancestors.
///
/// Matching is per segment: `A::B` is an ancestor of `A::B::C` but not of
/// `A::BC`.
pub fn is_ancestor_or_self(deck: &str, other: &str) -> bool {
    match other.strip_prefix(deck) {
        Some("") => true,
        Some(rest) => rest.starts_with(DECK_SEPARATOR),
        None => false,
    }
}

/// Deck changes implied by a reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckPlan {
    /// Decks referenced by created or updated records that the backend lacks.
    pub to_create: Vec<String>,
    /// Existing decks under the root that nothing will reference any more.
    pub to_delete: Vec<String>,
    /// Every deck the source record set uses after the run.
    pub referenced: BTreeSet<String>,
}

/// Work out which decks must be created and which become obsolete.
pub fn plan_decks(source: &RecordMap, diff: &Diff, existing: &[String], root: &str) -> DeckPlan {
    let existing_set: BTreeSet<&str> = existing.iter().map(String::as_str).collect();

    let mut to_create = Vec::new();
    let used = diff
        .create
        .iter()
        .map(|r| r.deck_path.as_str())
        .chain(diff.update.iter().map(|u| u.record.deck_path.as_str()));
    for deck in used {
        if !existing_set.contains(deck) && !to_create.iter().any(|d: &String| d == deck) {
            to_create.push(deck.to_string());
        }
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in source.iter() {
        *counts.entry(record.deck_path.as_str()).or_default() += 1;
    }
    let referenced: BTreeSet<String> = counts.keys().map(|d| d.to_string()).collect();

    let to_delete = existing
        .iter()
        .filter(|deck| is_ancestor_or_self(root, deck))
        .filter(|deck| counts.get(deck.as_str()).copied().unwrap_or(0) == 0)
        .filter(|deck| !referenced.iter().any(|used| is_ancestor_or_self(deck, used)))
        .cloned()
        .collect();

    DeckPlan {
        to_create,
        to_delete,
        referenced,
    }
}

/// Pick empty decks to remove after a run, given per-deck card counts.
///
/// Only the root deck and decks below it are considered. A deck with no
/// cards survives while any deck below it still holds cards, and decks in
/// `preserved` are never removed.
pub fn prune_empty_decks(counts: &[(String, usize)], root: &str, preserved: &[String]) -> Vec<String> {
    let valid: Vec<&str> = counts
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(deck, _)| deck.as_str())
        .collect();

    counts
        .iter()
        .filter(|(_, count)| *count == 0)
        .map(|(deck, _)| deck)
        .filter(|deck| is_ancestor_or_self(root, deck))
        .filter(|deck| !preserved.iter().any(|p| p == *deck))
        .filter(|deck| !valid.iter().any(|v| is_ancestor_or_self(deck, v)))
        .cloned()
        .collect()
}
