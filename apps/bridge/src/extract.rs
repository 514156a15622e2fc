//! Record extraction from both sides of the bridge.

use std::collections::{HashMap, HashSet};

use deckbridge_core::{deck_path, FlashcardRecord, RecordMap};

use crate::anki::model::record_from_card;
use crate::anki::FlashcardBackend;
use crate::error::Result;
use crate::notes::{Block, NotesBackend};

/// Attribute that marks a block as a flashcard.
pub const MARKER_ATTRIBUTE: &str = "custom-riff-decks";

/// Every block carrying the marker attribute.
///
/// The notes backend caps any statement without its own `LIMIT`, so this is
/// only ever sent through [`card_query`].
pub const CARD_QUERY: &str = "SELECT * FROM blocks WHERE id IN \
     (SELECT block_id FROM attributes WHERE name = 'custom-riff-decks')";

/// Rows fetched per query.
pub const PAGE_SIZE: usize = 512;

/// One page of [`CARD_QUERY`], ordered by id so pages do not overlap.
pub fn card_query(limit: usize, offset: usize) -> String {
    format!("{} ORDER BY id LIMIT {} OFFSET {}", CARD_QUERY, limit, offset)
}

/// Fetch all flashcard blocks, one page at a time, until a short page.
pub async fn query_card_blocks(notes: &dyn NotesBackend, page_size: usize) -> Result<Vec<Block>> {
    let page_size = page_size.max(1);
    let mut blocks = Vec::new();
    loop {
        let page = notes.query_blocks(&card_query(page_size, blocks.len())).await?;
        let last = page.len() < page_size;
        blocks.extend(page);
        if last {
            return Ok(blocks);
        }
    }
}

/// Records read from one side, keyed by block id.
#[derive(Debug, Default)]
pub struct Extracted {
    pub records: RecordMap,
    /// Ids seen more than once. Only the first occurrence is kept.
    pub duplicates: Vec<String>,
    /// Rows that could not be turned into a record.
    pub skipped: usize,
}

/// Read flashcard blocks from the notes store.
///
/// Blocks of closed notebooks are left out. An empty result is not an error.
pub async fn extract_source(notes: &dyn NotesBackend, root_deck: &str) -> Result<Extracted> {
    let mut notebooks: HashMap<String, String> = HashMap::new();
    let mut closed: HashSet<String> = HashSet::new();
    for nb in notes.list_notebooks().await? {
        if nb.closed {
            closed.insert(nb.id);
        } else {
            notebooks.insert(nb.id, nb.name);
        }
    }

    let blocks = query_card_blocks(notes, PAGE_SIZE).await?;
    tracing::debug!(blocks = blocks.len(), notebooks = notebooks.len(), "Fetched flashcard blocks");

    let mut skipped = 0;
    let mut records = Vec::with_capacity(blocks.len());
    for block in blocks {
        if closed.contains(&block.notebook_id) {
            tracing::debug!(block = %block.id, "Skipping block in closed notebook");
            skipped += 1;
            continue;
        }
        let notebook = notebooks
            .get(&block.notebook_id)
            .map(String::as_str)
            .unwrap_or(block.notebook_id.as_str());
        match record_from_block(&block, notebook, root_deck) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(block = %block.id, "Skipping block: {}", e);
                skipped += 1;
            }
        }
    }

    let (records, duplicates) = RecordMap::from_records(records);
    for id in &duplicates {
        tracing::warn!(block = %id, "Duplicate block id, keeping the first occurrence");
    }

    Ok(Extracted {
        records,
        duplicates,
        skipped,
    })
}

/// Map one block row to a record with its content hash.
///
/// The front falls back to the full markdown when the block has no separate
/// first-child content.
pub fn record_from_block(
    block: &Block,
    notebook: &str,
    root_deck: &str,
) -> deckbridge_core::Result<FlashcardRecord> {
    let mut record = FlashcardRecord::new(block.id.trim())?
        .with_timestamps(&block.created, &block.updated)?;

    record.parent_id = block.parent_id.clone();
    record.root_id = block.root_id.clone();
    record.container_id = block.notebook_id.clone();
    record.deck_path = deck_path(root_deck, notebook, &block.hpath);
    record.front = if block.fcontent.trim().is_empty() {
        block.markdown.clone()
    } else {
        block.fcontent.clone()
    };
    record.back = block.markdown.clone();
    record.kind = block.kind.clone();
    record.sub_kind = block.subtype.clone();

    Ok(record.with_computed_hash())
}

/// Read the notes of the given model from the flashcard backend.
///
/// A note with several cards becomes one record carrying all card ids; its
/// deck is the deck of the first card.
pub async fn extract_destination(anki: &dyn FlashcardBackend, model_name: &str) -> Result<Extracted> {
    let card_ids = anki
        .find_cards(&format!("\"note:{}\"", model_name))
        .await?;
    let cards = anki.cards_info(&card_ids).await?;
    tracing::debug!(cards = cards.len(), "Fetched destination cards");

    let mut skipped = 0;
    let mut by_note: HashMap<i64, usize> = HashMap::new();
    let mut records: Vec<FlashcardRecord> = Vec::new();
    for card in &cards {
        if let Some(&i) = by_note.get(&card.note) {
            records[i].destination_card_ids.push(card.card_id);
            continue;
        }
        match record_from_card(card) {
            Some(record) => {
                by_note.insert(card.note, records.len());
                records.push(record);
            }
            None => {
                tracing::warn!(note = card.note, card = card.card_id, "Skipping card without block id");
                skipped += 1;
            }
        }
    }

    let (records, duplicates) = RecordMap::from_records(records);
    for id in &duplicates {
        tracing::warn!(block = %id, "Block id stored in more than one note");
    }

    Ok(Extracted {
        records,
        duplicates,
        skipped,
    })
}
