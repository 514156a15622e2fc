//! Test fixtures for sync scenarios.

use deckbridge::config::BridgeConfig;
use deckbridge::notes::{Block, Notebook};

pub const NOTEBOOK_ID: &str = "20230101000000-nbaaaaa";

pub fn config() -> BridgeConfig {
    BridgeConfig {
        root_deck: "Root".to_string(),
        link_scheme: "app".to_string(),
        ..BridgeConfig::default()
    }
}

pub fn notebooks() -> Vec<Notebook> {
    vec![Notebook {
        id: NOTEBOOK_ID.to_string(),
        name: "NB".to_string(),
        closed: false,
    }]
}

/// A flashcard block in the fixture notebook.
pub fn block(id: &str, hpath: &str, markdown: &str, updated: &str) -> Block {
    Block {
        id: id.to_string(),
        parent_id: "20230101000000-parent0".to_string(),
        root_id: "20230101000000-rootdoc".to_string(),
        notebook_id: NOTEBOOK_ID.to_string(),
        hpath: hpath.to_string(),
        markdown: markdown.to_string(),
        kind: "NodeSuperBlock".to_string(),
        created: "20230101000000".to_string(),
        updated: updated.to_string(),
        ..Block::default()
    }
}

pub const BLOCK_A: &str = "20230101000000-aaaaaaa";
pub const BLOCK_B: &str = "20230101000000-bbbbbbb";

/// `count` cards in one folder, with distinct ids in ascending order.
pub fn many_blocks(count: usize) -> Vec<Block> {
    (0..count)
        .map(|i| {
            block(
                &format!("20230101000000-{:07}", i),
                "/Bulk/Doc",
                &format!("Card {i}\n\nAnswer {i}"),
                "20230102000000",
            )
        })
        .collect()
}

/// Two cards: A under a topic folder, B directly in the notebook.
pub fn two_blocks() -> Vec<Block> {
    vec![
        block(BLOCK_A, "/Topic/Doc", "What is **A**?\n\nIt is A.", "20230102000000"),
        block(BLOCK_B, "/Doc", "What is B?\n\nSee ((20230101000000-aaaaaaa 'A')).", "20230102000000"),
    ]
}
