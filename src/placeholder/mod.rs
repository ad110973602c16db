//! Inline image references embedded in note text.
//!
//! Current format: `[IMAGE:<id>]`. Legacy format: `[IMAGE:<url>|<description>]`,
//! migrated into id tokens on load. Nothing in here fails on malformed input;
//! broken tokens are plain text.

pub mod codec;
pub mod tokenizer;

pub use codec::{
    distinct_ids, extract_ids, insert_at, migrate_legacy, placeholder, remove_references,
    segments, strip_orphans, strip_unresolved, Segment,
};
pub use tokenizer::{tokenize, Token, TokenKind, Tokens};
