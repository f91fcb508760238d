//! Index use-case services.
//!
//! # Responsibility
//! - Drive reconcile and note-CRUD hooks over one injected store.
//! - Expose backlink, outgoing-link and tag queries to the UI layer.
//! - Keep callers decoupled from the storage backend.

pub mod index_service;
pub mod query_service;
pub mod tag_service;

pub use index_service::{
    IndexCoordinator, IndexStatus, IndexingFailure, NoteServiceError, ReconcileReport, SaveOutcome,
};
pub use query_service::{BacklinkQueryService, QueryError};
pub use tag_service::{TagService, TagServiceError};
