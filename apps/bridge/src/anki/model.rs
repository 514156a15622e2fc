//! The note type synced cards are stored under, and the mapping between its
//! fields and [`FlashcardRecord`].

use deckbridge_core::{format_block_time, parse_block_time, FlashcardRecord};
use std::collections::BTreeMap;

use super::{CardInfo, ModelSpec};

pub const FIELD_FRONT: &str = "front";
pub const FIELD_BACK: &str = "back";
pub const FIELD_ID: &str = "id";
pub const FIELD_PARENT_ID: &str = "parent_id";
pub const FIELD_ROOT_ID: &str = "root_id";
pub const FIELD_CONTAINER: &str = "box";
pub const FIELD_DECK: &str = "deck";
pub const FIELD_KIND: &str = "type";
pub const FIELD_SUB_KIND: &str = "subtype";
pub const FIELD_CREATED: &str = "created";
pub const FIELD_UPDATED: &str = "updated";
pub const FIELD_HASH: &str = "hash";

/// Field order of the note type. Templates refer to fields by name, but
/// older backends map fields by position, so the order is fixed and `hash`
/// is only ever appended.
pub const MODEL_FIELDS: [&str; 12] = [
    FIELD_FRONT,
    FIELD_BACK,
    FIELD_ID,
    FIELD_PARENT_ID,
    FIELD_ROOT_ID,
    FIELD_CONTAINER,
    FIELD_DECK,
    FIELD_KIND,
    FIELD_SUB_KIND,
    FIELD_CREATED,
    FIELD_UPDATED,
    FIELD_HASH,
];

pub const FRONT_TEMPLATE: &str = "{{front}}";
pub const BACK_TEMPLATE: &str = "{{FrontSide}}\n\n<hr id=answer>\n\n{{back}}";

/// Note type definition for the given model name.
pub fn model_spec(name: &str) -> ModelSpec {
    ModelSpec {
        name: name.to_string(),
        fields: MODEL_FIELDS.iter().map(|f| f.to_string()).collect(),
        front_template: FRONT_TEMPLATE.to_string(),
        back_template: BACK_TEMPLATE.to_string(),
    }
}

/// Field values written for a record.
pub fn note_fields(record: &FlashcardRecord) -> BTreeMap<String, String> {
    [
        (FIELD_FRONT, record.front.clone()),
        (FIELD_BACK, record.back.clone()),
        (FIELD_ID, record.id.clone()),
        (FIELD_PARENT_ID, record.parent_id.clone()),
        (FIELD_ROOT_ID, record.root_id.clone()),
        (FIELD_CONTAINER, record.container_id.clone()),
        (FIELD_DECK, record.deck_path.clone()),
        (FIELD_KIND, record.kind.clone()),
        (FIELD_SUB_KIND, record.sub_kind.clone()),
        (FIELD_CREATED, record.created_at.as_ref().map(format_block_time).unwrap_or_default()),
        (FIELD_UPDATED, record.updated_at.as_ref().map(format_block_time).unwrap_or_default()),
        (FIELD_HASH, record.content_hash.clone().unwrap_or_default()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Rebuild a record from a card. Returns `None` when the card carries no
/// block id.
///
/// The deck comes from where the card actually sits, not from the `deck`
/// field, so manual moves in the flashcard app are undone. Unparseable
/// timestamps read as absent, which makes the record look stale.
pub fn record_from_card(card: &CardInfo) -> Option<FlashcardRecord> {
    let field = |name: &str| card.field(name).unwrap_or_default().trim().to_string();

    let mut record = FlashcardRecord::new(field(FIELD_ID)).ok()?;
    record.parent_id = field(FIELD_PARENT_ID);
    record.root_id = field(FIELD_ROOT_ID);
    record.container_id = field(FIELD_CONTAINER);
    record.deck_path = card.deck_name.clone();
    record.front = card.field(FIELD_FRONT).unwrap_or_default().to_string();
    record.back = card.field(FIELD_BACK).unwrap_or_default().to_string();
    record.kind = field(FIELD_KIND);
    record.sub_kind = field(FIELD_SUB_KIND);
    record.created_at = parse_block_time(&field(FIELD_CREATED));
    record.updated_at = parse_block_time(&field(FIELD_UPDATED));
    record.content_hash = Some(field(FIELD_HASH)).filter(|h| !h.is_empty());
    record.destination_note_id = Some(card.note);
    record.destination_card_ids = vec![card.card_id];
    Some(record)
}
