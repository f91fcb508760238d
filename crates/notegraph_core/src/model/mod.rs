//! Domain model for notes and the derived link/tag graph.
//!
//! # Responsibility
//! - Define the records shared by scanner, stores and services.
//! - Keep derived relations (`TagMembership`, `LinkEdge`) as plain id pairs.
//!
//! # Invariants
//! - Every note and tag is identified by a stable UUID.
//! - Note deletion is a soft-delete marker, not a row removal.

pub mod link;
pub mod note;
pub mod tag;
