//! Read-side queries over the derived link/tag graph.
//!
//! # Invariants
//! - No query here ever returns a soft-deleted note.
//! - Every query is read-only.

use crate::config::IndexConfig;
use crate::model::link::LinkRef;
use crate::model::note::{Note, NoteId};
use crate::model::tag::{Tag, TagId};
use crate::repo::{IndexStore, RepoError, RepoResult};
use crate::scan::extract_link_targets;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum QueryError {
    InvalidFilter(String),
    Repo(RepoError),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFilter(message) => write!(f, "invalid tag filter: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::InvalidFilter(_) => None,
        }
    }
}

impl From<RepoError> for QueryError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Backlinks, outgoing links and tag lookups for the UI.
pub struct BacklinkQueryService<'s, S> {
    store: &'s S,
    config: &'s IndexConfig,
}

impl<'s, S: IndexStore> BacklinkQueryService<'s, S> {
    pub fn new(store: &'s S, config: &'s IndexConfig) -> Self {
        Self { store, config }
    }

    /// Live notes linking to `note_id`, most recently updated first.
    pub fn get_backlinks(&self, note_id: NoteId) -> RepoResult<Vec<Note>> {
        let mut notes = self.store.backlink_notes(note_id)?;
        notes.retain(Note::is_active);
        Ok(notes)
    }

    /// Live notes `note_id` links to. Unresolved titles are not included.
    pub fn get_outgoing_links(&self, note_id: NoteId) -> RepoResult<Vec<Note>> {
        let mut notes = self.store.outgoing_notes(note_id)?;
        notes.retain(Note::is_active);
        Ok(notes)
    }

    pub fn get_note_tags(&self, note_id: NoteId) -> RepoResult<Vec<Tag>> {
        self.store.note_tags(note_id)
    }

    /// Live notes carrying all (`match_all`) or any of `tag_ids`.
    ///
    /// An empty filter returns every live note. Duplicate ids are ignored.
    ///
    /// # Errors
    /// - [`QueryError::InvalidFilter`] for the nil id or more than
    ///   `max_filter_tags` distinct ids.
    pub fn filter_notes_by_tags(
        &self,
        tag_ids: &[TagId],
        match_all: bool,
    ) -> Result<Vec<Note>, QueryError> {
        if tag_ids.is_empty() {
            return Ok(self.store.list_notes(None)?);
        }
        if tag_ids.iter().any(TagId::is_nil) {
            return Err(QueryError::InvalidFilter(
                "tag ids cannot be nil".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let distinct: Vec<TagId> = tag_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if distinct.len() > self.config.max_filter_tags {
            return Err(QueryError::InvalidFilter(format!(
                "too many tags: {} (max {})",
                distinct.len(),
                self.config.max_filter_tags
            )));
        }

        let mut notes = self.store.notes_with_tags(&distinct, match_all)?;
        notes.retain(Note::is_active);
        Ok(notes)
    }

    /// Resolution state of every link in the note's current content.
    ///
    /// Includes unresolved titles, which have no stored edge. Returns an
    /// empty list for unknown or deleted notes.
    pub fn link_refs(&self, note_id: NoteId) -> RepoResult<Vec<LinkRef>> {
        let Some(note) = self.store.get_note(note_id)?.filter(Note::is_active) else {
            return Ok(Vec::new());
        };
        extract_link_targets(&note.content)
            .iter()
            .map(|target| self.store.resolve_link(target))
            .collect()
    }
}
