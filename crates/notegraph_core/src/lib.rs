//! Wiki-link and tag index for local-first notes.
//! Notes are the source of truth; links, tags and memberships are derived
//! from note content and kept in sync by [`IndexCoordinator`].

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod scan;
pub mod service;

pub use config::{ConfigError, IndexConfig, LogSettings};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::link::{LinkEdge, LinkRef, LinkTarget};
pub use model::note::{ContentChange, NewNote, Note, NoteId, NotePatch};
pub use model::tag::{tag_color, Tag, TagId, TagMembership, TagUsage};
pub use repo::{
    EdgeUpdate, IndexStore, MembershipDiff, MemoryIndexStore, RepoError, RepoResult,
    SqliteIndexStore,
};
pub use scan::{extract_link_targets, extract_tags};
pub use service::{
    BacklinkQueryService, IndexCoordinator, IndexStatus, IndexingFailure, NoteServiceError,
    QueryError, ReconcileReport, SaveOutcome, TagService, TagServiceError,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
