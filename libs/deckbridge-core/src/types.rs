//! Core types for the notes-to-flashcards bridge.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::error::{RecordError, Result};

/// Timestamp layout used by the notes store (`20230101120000`).
pub const BLOCK_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// One flashcard, in the same shape whether it was read from the notes
/// store or from the flashcard backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardRecord {
    /// Block id assigned by the notes store. Join key between both sides.
    pub id: String,
    pub parent_id: String,
    pub root_id: String,
    /// Notebook the block lives in.
    pub container_id: String,
    /// `::`-joined deck name, recomputed on every run.
    pub deck_path: String,
    /// Raw markup before transformation, rich text afterwards.
    pub front: String,
    pub back: String,
    pub kind: String,
    pub sub_kind: String,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    /// SHA-256 of the raw front and back markup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Note id in the flashcard backend, once the record exists there.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_note_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destination_card_ids: Vec<i64>,
}

impl FlashcardRecord {
    /// Create an empty record for the given block id.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RecordError::MissingField { field: "id" });
        }

        Ok(Self {
            id,
            parent_id: String::new(),
            root_id: String::new(),
            container_id: String::new(),
            deck_path: String::new(),
            front: String::new(),
            back: String::new(),
            kind: String::new(),
            sub_kind: String::new(),
            created_at: None,
            updated_at: None,
            content_hash: None,
            destination_note_id: None,
            destination_card_ids: Vec::new(),
        })
    }

    /// Parse created/updated stamps. Empty strings are treated as absent.
    pub fn with_timestamps(mut self, created: &str, updated: &str) -> Result<Self> {
        self.created_at = self.parse_stamp(created)?;
        self.updated_at = self.parse_stamp(updated)?;
        Ok(self)
    }

    fn parse_stamp(&self, value: &str) -> Result<Option<NaiveDateTime>> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(None);
        }
        parse_block_time(value)
            .map(Some)
            .ok_or_else(|| RecordError::InvalidTimestamp {
                id: self.id.clone(),
                value: value.to_string(),
            })
    }

    /// Hash of the current front and back content.
    pub fn compute_hash(&self) -> String {
        hash_content(&format!("{}\u{1f}{}", self.front, self.back))
    }

    /// Store the hash of the current content on the record.
    pub fn with_computed_hash(mut self) -> Self {
        self.content_hash = Some(self.compute_hash());
        self
    }
}

/// Parse a notes-store timestamp.
pub fn parse_block_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), BLOCK_TIME_FORMAT).ok()
}

/// Format a timestamp the way the notes store writes it.
pub fn format_block_time(value: &NaiveDateTime) -> String {
    value.format(BLOCK_TIME_FORMAT).to_string()
}

/// Calculate SHA256 hash of content.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Records keyed by id, iterated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct RecordMap {
    records: Vec<FlashcardRecord>,
    index: HashMap<String, usize>,
}

impl RecordMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map, keeping the first record for each id.
    ///
    /// Returns the ids that were seen more than once.
    pub fn from_records(records: impl IntoIterator<Item = FlashcardRecord>) -> (Self, Vec<String>) {
        let mut map = Self::new();
        let mut duplicates = Vec::new();
        for record in records {
            let id = record.id.clone();
            if !map.insert(record) {
                duplicates.push(id);
            }
        }
        (map, duplicates)
    }

    /// Insert a record. Returns `false` (and keeps the existing entry) when
    /// the id is already present.
    pub fn insert(&mut self, record: FlashcardRecord) -> bool {
        if self.index.contains_key(&record.id) {
            return false;
        }
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
        true
    }

    pub fn get(&self, id: &str) -> Option<&FlashcardRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlashcardRecord> {
        self.records.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }
}
