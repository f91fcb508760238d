//! Index coordinator: per-note reconcile, full reindex and note-CRUD hooks.
//!
//! # Responsibility
//! - Scan note content and apply the tag/link diff in one atomic unit.
//! - Hook note create/update/delete/restore/purge into the index.
//! - Convert store failures at the reconcile boundary into
//!   [`IndexingFailure`] without undoing the note write itself.
//!
//! # Invariants
//! - After a successful reconcile, the note's memberships equal its distinct
//!   tags and its outgoing edges equal its resolvable link targets.
//! - Metadata-only updates never reconcile.
//! - Deleting a note clears its memberships and outgoing edges; inbound
//!   edges stay and are filtered at read time.

use crate::config::IndexConfig;
use crate::model::note::{ContentChange, NewNote, Note, NoteId, NotePatch};
use crate::repo::{EdgeUpdate, IndexStore, MembershipDiff, RepoError, RepoResult};
use crate::scan::{extract_link_targets, extract_tags};
use crate::service::query_service::BacklinkQueryService;
use crate::service::tag_service::TagService;
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const UNTITLED: &str = "Untitled";

/// Reconcile failed; the note itself is saved but its links/tags may be stale.
#[derive(Debug)]
pub struct IndexingFailure {
    pub note_id: NoteId,
    pub source: RepoError,
}

impl IndexingFailure {
    pub fn new(note_id: NoteId, source: RepoError) -> Self {
        Self { note_id, source }
    }
}

impl Display for IndexingFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "indexing failed for note {}: {}", self.note_id, self.source)
    }
}

impl Error for IndexingFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Service error for the note-CRUD hooks.
#[derive(Debug)]
pub enum NoteServiceError {
    InvalidTitle(String),
    InvalidFolder(String),
    ContentTooLarge { bytes: usize, max_bytes: usize },
    NoteNotFound(NoteId),
    Repo(RepoError),
}

impl Display for NoteServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTitle(message) => write!(f, "invalid title: {message}"),
            Self::InvalidFolder(folder) => write!(f, "invalid folder: `{folder}`"),
            Self::ContentTooLarge { bytes, max_bytes } => {
                write!(f, "content too large: {bytes} bytes (max {max_bytes})")
            }
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for NoteServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for NoteServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NoteNotFound(id) => Self::NoteNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Derived-state changes applied by one reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub note_id: NoteId,
    pub tags: MembershipDiff,
    pub links: EdgeUpdate,
}

/// What happened to the index as part of a note write.
#[derive(Debug)]
pub enum IndexStatus {
    Reconciled(ReconcileReport),
    /// Delete hook removed the note's own memberships and outgoing edges.
    Cleared { memberships: usize, edges: usize },
    /// Nothing to index: metadata-only update, empty content, or no-op write.
    Skipped,
    Failed(IndexingFailure),
}

impl IndexStatus {
    pub fn report(&self) -> Option<&ReconcileReport> {
        match self {
            Self::Reconciled(report) => Some(report),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&IndexingFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

impl From<Result<ReconcileReport, IndexingFailure>> for IndexStatus {
    fn from(value: Result<ReconcileReport, IndexingFailure>) -> Self {
        match value {
            Ok(report) => Self::Reconciled(report),
            Err(failure) => Self::Failed(failure),
        }
    }
}

/// Result of a note write plus the index outcome that followed it.
#[derive(Debug)]
pub struct SaveOutcome<T> {
    pub value: T,
    pub index: IndexStatus,
}

/// Owns one injected index store and keeps its derived state in sync.
pub struct IndexCoordinator<S: IndexStore> {
    store: S,
    config: IndexConfig,
}

impl<S: IndexStore> IndexCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, IndexConfig::default())
    }

    pub fn with_config(store: S, config: IndexConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Read-side queries over the current store.
    pub fn queries(&self) -> BacklinkQueryService<'_, S> {
        BacklinkQueryService::new(&self.store, &self.config)
    }

    /// Tag management over the current store.
    pub fn tags(&mut self) -> TagService<'_, S> {
        TagService::new(&mut self.store)
    }

    /// Recomputes the note's memberships and outgoing edges from `content`.
    ///
    /// # Errors
    /// - Returns [`IndexingFailure`] when the note is missing or deleted, or
    ///   when the store fails; nothing from this call is applied then.
    pub fn reconcile(
        &mut self,
        note_id: NoteId,
        content: &str,
    ) -> Result<ReconcileReport, IndexingFailure> {
        let started_at = Instant::now();
        let tag_names = extract_tags(content);
        let link_targets = extract_link_targets(content);

        let outcome = self.store.atomic(|store| {
            if store.get_note(note_id)?.is_none() {
                return Err(RepoError::NoteNotFound(note_id));
            }
            let tags = store.set_membership(note_id, &tag_names)?;
            let links = store.set_outgoing_edges(note_id, &link_targets)?;
            Ok(ReconcileReport {
                note_id,
                tags,
                links,
            })
        });

        match outcome {
            Ok(report) => {
                debug!(
                    "event=reconcile module=index status=ok note_id={} tags_added={} tags_removed={} links_added={} links_removed={} unresolved={} duration_ms={}",
                    note_id,
                    report.tags.added.len(),
                    report.tags.removed.len(),
                    report.links.added.len(),
                    report.links.removed.len(),
                    report.links.unresolved().count(),
                    started_at.elapsed().as_millis()
                );
                Ok(report)
            }
            Err(err) => {
                error!(
                    "event=reconcile module=index status=error note_id={} duration_ms={} error={}",
                    note_id,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(IndexingFailure::new(note_id, err))
            }
        }
    }

    /// Reconciles every live note with non-empty content.
    ///
    /// Safe to re-run from scratch. A note that fails is logged and skipped;
    /// the returned count covers successfully reconciled notes.
    pub fn reindex_all(&mut self) -> RepoResult<usize> {
        let started_at = Instant::now();
        info!("event=reindex_all module=index status=start");

        let notes = self.store.list_notes(None)?;
        let mut processed = 0usize;
        let mut failed = 0usize;
        for note in notes.iter().filter(|note| !note.content.is_empty()) {
            match self.reconcile(note.id, &note.content) {
                Ok(_) => processed += 1,
                Err(failure) => {
                    failed += 1;
                    warn!(
                        "event=reindex_all module=index status=note_skipped note_id={} error={}",
                        failure.note_id, failure.source
                    );
                }
            }
        }

        info!(
            "event=reindex_all module=index status=ok processed={} failed={} duration_ms={}",
            processed,
            failed,
            started_at.elapsed().as_millis()
        );
        Ok(processed)
    }

    /// Removes stored edges whose target note is soft-deleted.
    pub fn prune_dangling_edges(&mut self) -> RepoResult<usize> {
        let pruned = self.store.atomic(|store| store.prune_dangling_edges())?;
        info!("event=prune_dangling_edges module=index status=ok pruned={pruned}");
        Ok(pruned)
    }

    /// Creates a note and indexes it when it has content.
    pub fn create_note(&mut self, draft: NewNote) -> Result<SaveOutcome<Note>, NoteServiceError> {
        let draft = self.validate_new_note(draft)?;
        let note = self.store.insert_note(&draft)?;
        let index = if note.content.is_empty() {
            IndexStatus::Skipped
        } else {
            self.reconcile(note.id, &note.content).into()
        };
        Ok(SaveOutcome { value: note, index })
    }

    /// Applies a partial update; reconciles only when content is part of it.
    pub fn update_note(
        &mut self,
        id: NoteId,
        patch: NotePatch,
    ) -> Result<SaveOutcome<Note>, NoteServiceError> {
        let patch = self.validate_patch(patch)?;
        let note = self
            .store
            .update_note(id, &patch)?
            .ok_or(NoteServiceError::NoteNotFound(id))?;

        let index = match &patch.content {
            ContentChange::Changed(content) => self.reconcile(id, content).into(),
            ContentChange::MetadataOnly => {
                debug!("event=reconcile module=index status=skipped reason=metadata_only note_id={id}");
                IndexStatus::Skipped
            }
        };
        Ok(SaveOutcome { value: note, index })
    }

    /// Soft-deletes a note and clears its own memberships and outgoing edges.
    ///
    /// The soft delete and both clears share one atomic unit; on error the
    /// note stays live with its derived rows intact.
    pub fn delete_note(&mut self, id: NoteId) -> Result<SaveOutcome<bool>, NoteServiceError> {
        let cleared = self.store.atomic(|store| {
            if !store.soft_delete_note(id)? {
                return Ok(None);
            }
            let memberships = store.clear_memberships(id)?;
            let edges = store.clear_outgoing_edges(id)?;
            Ok(Some((memberships, edges)))
        });

        match cleared {
            Ok(Some((memberships, edges))) => {
                debug!(
                    "event=note_delete module=index status=ok note_id={id} memberships={memberships} edges={edges}"
                );
                Ok(SaveOutcome {
                    value: true,
                    index: IndexStatus::Cleared { memberships, edges },
                })
            }
            Ok(None) => Ok(SaveOutcome {
                value: false,
                index: IndexStatus::Skipped,
            }),
            Err(err) => {
                error!("event=note_delete module=index status=error note_id={id} error={err}");
                Err(err.into())
            }
        }
    }

    /// Clears the soft-delete marker and re-indexes the restored content.
    pub fn restore_note(&mut self, id: NoteId) -> Result<SaveOutcome<bool>, NoteServiceError> {
        if !self.store.restore_note(id)? {
            return Ok(SaveOutcome {
                value: false,
                index: IndexStatus::Skipped,
            });
        }

        let note = self
            .store
            .get_note(id)?
            .ok_or(NoteServiceError::NoteNotFound(id))?;
        let index = if note.content.is_empty() {
            IndexStatus::Skipped
        } else {
            self.reconcile(id, &note.content).into()
        };
        Ok(SaveOutcome { value: true, index })
    }

    /// Permanently removes a note with every membership and edge touching it.
    pub fn purge_note(&mut self, id: NoteId) -> Result<bool, NoteServiceError> {
        let purged = self.store.atomic(|store| store.purge_note(id))?;
        if purged {
            info!("event=note_purge module=index status=ok note_id={id}");
        }
        Ok(purged)
    }

    pub fn get_note(&self, id: NoteId) -> RepoResult<Option<Note>> {
        self.store.get_note(id)
    }

    pub fn list_notes(&self, folder: Option<&str>) -> RepoResult<Vec<Note>> {
        self.store.list_notes(folder)
    }

    fn validate_new_note(&self, draft: NewNote) -> Result<NewNote, NoteServiceError> {
        let title = match draft.title.trim() {
            "" => UNTITLED.to_string(),
            trimmed => self.check_title_length(trimmed)?,
        };
        self.check_content_size(&draft.content)?;
        let folder = draft
            .folder
            .filter(|folder| self.config.is_known_folder(folder))
            .unwrap_or_else(|| self.config.default_folder.clone());

        Ok(NewNote {
            title,
            content: draft.content,
            folder: Some(folder),
        })
    }

    fn validate_patch(&self, patch: NotePatch) -> Result<NotePatch, NoteServiceError> {
        let title = match patch.title {
            Some(title) => match title.trim() {
                "" => {
                    return Err(NoteServiceError::InvalidTitle(
                        "title cannot be empty".to_string(),
                    ))
                }
                trimmed => Some(self.check_title_length(trimmed)?),
            },
            None => None,
        };
        if let Some(content) = patch.content.as_changed() {
            self.check_content_size(content)?;
        }
        if let Some(folder) = patch.folder.as_deref() {
            if !self.config.is_known_folder(folder) {
                return Err(NoteServiceError::InvalidFolder(folder.to_string()));
            }
        }

        Ok(NotePatch {
            title,
            folder: patch.folder,
            content: patch.content,
        })
    }

    fn check_title_length(&self, title: &str) -> Result<String, NoteServiceError> {
        let chars = title.chars().count();
        if chars > self.config.max_title_chars {
            return Err(NoteServiceError::InvalidTitle(format!(
                "title too long: {chars} characters (max {})",
                self.config.max_title_chars
            )));
        }
        Ok(title.to_string())
    }

    fn check_content_size(&self, content: &str) -> Result<(), NoteServiceError> {
        if content.len() > self.config.max_content_bytes {
            return Err(NoteServiceError::ContentTooLarge {
                bytes: content.len(),
                max_bytes: self.config.max_content_bytes,
            });
        }
        Ok(())
    }
}
