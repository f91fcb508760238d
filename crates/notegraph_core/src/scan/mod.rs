//! Content scanning for inline `#tags` and `[[wiki-links]]`.
//!
//! # Responsibility
//! - Turn free-text note content into tag names and link targets.
//!
//! # Invariants
//! - Scanning is pure and total: it never fails, malformed syntax just
//!   yields fewer matches.
//! - Code spans and URLs are not special-cased; a `#` inside them still
//!   matches.

pub mod content;

pub use content::{extract_link_targets, extract_tags, is_valid_tag_name};
