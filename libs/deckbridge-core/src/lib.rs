//! Core sync logic shared by the bridge application.
//!
//! Provides:
//! - Canonical flashcard records keyed by block id
//! - Markup transformation (asset links, block references, HTML rendering)
//! - Reconciliation of source and destination record sets
//! - Deck path derivation and deck lifecycle planning

pub mod deck;
pub mod error;
pub mod reconcile;
pub mod transform;
pub mod types;

pub use deck::{deck_path, is_ancestor_or_self, plan_decks, prune_empty_decks, DeckPlan, DECK_SEPARATOR};
pub use error::{RecordError, Result};
pub use reconcile::{reconcile, Diff, Update};
pub use transform::{CommonMarkRenderer, MarkupRenderer, TransformOptions, Transformer};
pub use types::{
    format_block_time, hash_content, parse_block_time, FlashcardRecord, RecordMap,
};
