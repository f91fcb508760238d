//! Store contracts for notes, tags, memberships and wiki-link edges.
//!
//! # Responsibility
//! - Define the backend-agnostic contracts every index backend implements.
//! - Own the diff-and-apply logic once, as provided trait methods built on
//!   per-backend primitives.
//!
//! # Invariants
//! - Writes to derived relations happen through `set_membership`,
//!   `set_outgoing_edges`, the `clear_*` helpers, tag deletion, note purge
//!   or `prune_dangling_edges`.
//! - `atomic` either applies everything its closure wrote or nothing.
//! - Note-returning queries never include soft-deleted notes.

use crate::db::DbError;
use crate::model::link::{LinkEdge, LinkRef, LinkTarget};
use crate::model::note::{NewNote, Note, NoteId, NotePatch};
use crate::model::tag::{tag_key, Tag, TagId, TagMembership, TagUsage};
use crate::scan::is_valid_tag_name;
use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod memory_repo;
pub mod sqlite_repo;

pub use memory_repo::MemoryIndexStore;
pub use sqlite_repo::SqliteIndexStore;

pub type RepoResult<T> = Result<T, RepoError>;

/// Store error shared by both backends.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NoteNotFound(NoteId),
    TagNotFound(TagId),
    /// A different tag already owns this name (case-insensitive).
    Conflict { name: String, existing: TagId },
    /// Not something a `#tag` can spell.
    InvalidTagName(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::TagNotFound(id) => write!(f, "tag not found: {id}"),
            Self::Conflict { name, existing } => {
                write!(f, "tag name `{name}` is already used by tag {existing}")
            }
            Self::InvalidTagName(name) => write!(f, "invalid tag name `{name}`"),
            Self::InvalidData(message) => write!(f, "invalid persisted index data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

/// Rejects names `extract_tags` could never produce.
///
/// Keeps tag identity ASCII-only, where `tag_key` and SQLite `NOCASE` agree.
pub(crate) fn ensure_tag_name(name: &str) -> RepoResult<()> {
    if is_valid_tag_name(name) {
        Ok(())
    } else {
        Err(RepoError::InvalidTagName(name.to_string()))
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Tag membership changes applied by one `set_membership` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub added: Vec<Tag>,
    pub removed: Vec<Tag>,
    /// Memberships present before and after, left untouched.
    pub retained: usize,
}

impl MembershipDiff {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Outgoing edge changes applied by one `set_outgoing_edges` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeUpdate {
    /// One entry per distinct parsed target, in content order.
    pub links: Vec<LinkRef>,
    pub added: Vec<NoteId>,
    pub removed: Vec<NoteId>,
}

impl EdgeUpdate {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &LinkRef> {
        self.links.iter().filter(|link| !link.is_resolved())
    }
}

/// All-or-nothing execution of a group of store writes.
///
/// Nested calls are allowed; only the outermost unit commits.
pub trait AtomicStore: Sized {
    fn atomic<T, F>(&mut self, f: F) -> RepoResult<T>
    where
        F: FnOnce(&mut Self) -> RepoResult<T>;
}

/// Note persistence consumed by the index (the note-CRUD surface).
pub trait NoteStore {
    fn insert_note(&mut self, draft: &NewNote) -> RepoResult<Note>;
    /// Applies a patch to a live note. Returns `None` for unknown or deleted ids.
    fn update_note(&mut self, id: NoteId, patch: &NotePatch) -> RepoResult<Option<Note>>;
    /// Sets the soft-delete marker. Returns `false` when nothing changed.
    fn soft_delete_note(&mut self, id: NoteId) -> RepoResult<bool>;
    /// Clears the soft-delete marker. Returns `false` when nothing changed.
    fn restore_note(&mut self, id: NoteId) -> RepoResult<bool>;
    /// Removes the note row with every membership and edge touching it.
    fn purge_note(&mut self, id: NoteId) -> RepoResult<bool>;
    fn get_note(&self, id: NoteId) -> RepoResult<Option<Note>>;
    /// Live notes, most recently updated first.
    fn list_notes(&self, folder: Option<&str>) -> RepoResult<Vec<Note>>;
    /// Live notes whose title equals `title` exactly, oldest first.
    fn find_notes_by_title(&self, title: &str) -> RepoResult<Vec<NoteId>>;
}

/// Canonical tag rows with case-insensitive identity.
pub trait TagRegistry: AtomicStore {
    /// Returns the tag named `name` (ignoring case), creating it on first use.
    ///
    /// Implementations insert-or-ignore and then re-read.
    fn get_or_create_tag(&mut self, name: &str) -> RepoResult<Tag>;
    fn get_tag(&self, id: TagId) -> RepoResult<Option<Tag>>;
    fn find_tag_by_name(&self, name: &str) -> RepoResult<Option<Tag>>;
    /// Renames a tag and recomputes its color.
    ///
    /// Fails with `Conflict` when another tag already owns the name.
    fn rename_tag(&mut self, id: TagId, new_name: &str) -> RepoResult<Tag>;
    /// Deletes a tag together with all of its memberships.
    fn delete_tag(&mut self, id: TagId) -> RepoResult<bool>;
    /// All tags with membership counts, ordered by name ignoring case.
    fn list_tags(&self) -> RepoResult<Vec<TagUsage>>;
}

/// Note-to-tag relation.
pub trait TagMembershipStore: TagRegistry {
    /// Tags of one note, ordered by name ignoring case.
    fn note_tags(&self, note_id: NoteId) -> RepoResult<Vec<Tag>>;
    fn insert_membership(&mut self, note_id: NoteId, tag_id: TagId) -> RepoResult<bool>;
    fn delete_membership(&mut self, note_id: NoteId, tag_id: TagId) -> RepoResult<bool>;
    fn clear_memberships(&mut self, note_id: NoteId) -> RepoResult<usize>;
    fn all_memberships(&self) -> RepoResult<Vec<TagMembership>>;
    /// Live notes tagged with all (`match_all`) or any of `tag_ids`.
    ///
    /// `tag_ids` is non-empty and free of duplicates.
    fn notes_with_tags(&self, tag_ids: &[TagId], match_all: bool) -> RepoResult<Vec<Note>>;

    /// Makes the note's memberships equal `desired` (compared ignoring case).
    ///
    /// Only missing memberships are inserted and only stale ones deleted.
    fn set_membership(&mut self, note_id: NoteId, desired: &[String]) -> RepoResult<MembershipDiff> {
        self.atomic(|store| {
            let mut wanted: BTreeMap<String, &str> = BTreeMap::new();
            for name in desired {
                wanted.entry(tag_key(name)).or_insert(name.as_str());
            }

            let mut diff = MembershipDiff::default();
            for tag in store.note_tags(note_id)? {
                if wanted.remove(&tag.key()).is_some() {
                    diff.retained += 1;
                } else {
                    store.delete_membership(note_id, tag.id)?;
                    diff.removed.push(tag);
                }
            }

            for name in wanted.into_values() {
                let tag = store.get_or_create_tag(name)?;
                store.insert_membership(note_id, tag.id)?;
                diff.added.push(tag);
            }

            Ok(diff)
        })
    }
}

/// Directed note-to-note edges for resolved wiki-links.
pub trait LinkGraphStore: NoteStore + AtomicStore {
    /// Stored targets of `source_id`, including soft-deleted ones.
    fn outgoing_targets(&self, source_id: NoteId) -> RepoResult<Vec<NoteId>>;
    fn insert_edge(&mut self, source_id: NoteId, target_id: NoteId) -> RepoResult<bool>;
    fn delete_edge(&mut self, source_id: NoteId, target_id: NoteId) -> RepoResult<bool>;
    fn clear_outgoing_edges(&mut self, source_id: NoteId) -> RepoResult<usize>;
    fn all_edges(&self) -> RepoResult<Vec<LinkEdge>>;
    /// Live notes linking to `target_id`, most recently updated first.
    fn backlink_notes(&self, target_id: NoteId) -> RepoResult<Vec<Note>>;
    /// Live notes `source_id` links to, most recently updated first.
    fn outgoing_notes(&self, source_id: NoteId) -> RepoResult<Vec<Note>>;
    /// Removes edges whose target is soft-deleted.
    fn prune_dangling_edges(&mut self) -> RepoResult<usize>;

    /// Resolves one title to a live note; the oldest note wins on duplicates.
    fn resolve_link(&self, target: &LinkTarget) -> RepoResult<LinkRef> {
        let matches = self.find_notes_by_title(&target.title)?;
        let Some(first) = matches.first() else {
            return Ok(LinkRef::Unresolved {
                title: target.title.clone(),
                alias: target.alias.clone(),
            });
        };
        if matches.len() > 1 {
            warn!(
                "event=link_resolve module=repo status=ambiguous candidates={} target_id={}",
                matches.len(),
                first
            );
        }
        Ok(LinkRef::Resolved {
            title: target.title.clone(),
            alias: target.alias.clone(),
            target_id: *first,
            ambiguous: matches.len() > 1,
        })
    }

    /// Makes the stored outgoing edges of `source_id` equal the resolvable
    /// subset of `targets`. Unresolved titles are reported, not stored.
    fn set_outgoing_edges(
        &mut self,
        source_id: NoteId,
        targets: &[LinkTarget],
    ) -> RepoResult<EdgeUpdate> {
        self.atomic(|store| {
            let mut update = EdgeUpdate::default();
            let mut wanted = BTreeSet::new();
            for target in targets {
                let link = store.resolve_link(target)?;
                if let Some(target_id) = link.target_id() {
                    wanted.insert(target_id);
                }
                update.links.push(link);
            }

            for current in store.outgoing_targets(source_id)? {
                if !wanted.remove(&current) {
                    store.delete_edge(source_id, current)?;
                    update.removed.push(current);
                }
            }

            for target_id in wanted {
                store.insert_edge(source_id, target_id)?;
                update.added.push(target_id);
            }

            Ok(update)
        })
    }
}

/// Everything the index coordinator needs from one backend.
pub trait IndexStore: NoteStore + TagMembershipStore + LinkGraphStore {}

impl<T> IndexStore for T where T: NoteStore + TagMembershipStore + LinkGraphStore {}

/// Strictly increasing epoch-millisecond timestamps for one store.
///
/// Keeps `updated_at` ordering total even when writes land in the same
/// millisecond.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Clock {
    last_ms: i64,
}

impl Clock {
    pub(crate) fn starting_after(last_ms: i64) -> Self {
        Self { last_ms }
    }

    pub(crate) fn tick(&mut self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        self.last_ms = now.max(self.last_ms.saturating_add(1));
        self.last_ms
    }
}
