//! Process-local index store.
//!
//! Stand-in for the browser-local backend: same contract as
//! [`super::SqliteIndexStore`], kept in ordered maps with forward and reverse
//! sets per relation so note-side and tag/target-side scans are range scans.
//! Writes inside `atomic` push their inverse onto an undo journal, so a unit
//! costs what it touches rather than a copy of the whole store.

use crate::model::link::LinkEdge;
use crate::model::note::{ContentChange, NewNote, Note, NoteId, NotePatch};
use crate::model::tag::{tag_color, tag_key, Tag, TagId, TagMembership, TagUsage};
use crate::repo::{
    ensure_tag_name, AtomicStore, Clock, LinkGraphStore, NoteStore, RepoError, RepoResult,
    TagMembershipStore, TagRegistry,
};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    notes: BTreeMap<NoteId, Note>,
    tags: BTreeMap<TagId, Tag>,
    /// Lowercase name -> tag id; the unique case-insensitive name index.
    tag_names: BTreeMap<String, TagId>,
    note_tags: BTreeSet<(NoteId, TagId)>,
    tag_notes: BTreeSet<(TagId, NoteId)>,
    links_out: BTreeSet<(NoteId, NoteId)>,
    /// `(target, source)` pairs.
    links_in: BTreeSet<(NoteId, NoteId)>,
    clock: Clock,
}

/// Inverse of one primitive write.
#[derive(Debug, Clone)]
enum Undo {
    Note(NoteId, Option<Note>),
    Tag(TagId, Option<Tag>),
    TagName(String, Option<TagId>),
    Membership { note_id: NoteId, tag_id: TagId, present: bool },
    Edge { source_id: NoteId, target_id: NoteId, present: bool },
}

/// In-memory index store. `atomic` rolls back through an undo journal.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndexStore {
    state: MemoryState,
    journal: Vec<Undo>,
    depth: usize,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_note(&self, id: NoteId) -> Option<&Note> {
        self.state.notes.get(&id).filter(|note| note.is_active())
    }

    fn ensure_note_row(&self, id: NoteId) -> RepoResult<()> {
        if self.state.notes.contains_key(&id) {
            Ok(())
        } else {
            Err(RepoError::NoteNotFound(id))
        }
    }

    /// Live notes for `ids`, most recently updated first.
    fn live_notes_sorted(&self, ids: impl IntoIterator<Item = NoteId>) -> Vec<Note> {
        let mut notes: Vec<Note> = ids
            .into_iter()
            .filter_map(|id| self.live_note(id).cloned())
            .collect();
        sort_recent_first(&mut notes);
        notes
    }

    fn tags_of(&self, note_id: NoteId) -> BTreeSet<TagId> {
        self.state
            .note_tags
            .range(id_range(note_id))
            .map(|(_, tag_id)| *tag_id)
            .collect()
    }

    fn record(&mut self, undo: Undo) {
        if self.depth > 0 {
            self.journal.push(undo);
        }
    }

    fn put_note(&mut self, note: Note) {
        let id = note.id;
        let previous = self.state.notes.insert(id, note);
        self.record(Undo::Note(id, previous));
    }

    fn take_note(&mut self, id: NoteId) -> bool {
        let Some(removed) = self.state.notes.remove(&id) else {
            return false;
        };
        self.record(Undo::Note(id, Some(removed)));
        true
    }

    fn put_tag(&mut self, tag: Tag) {
        let id = tag.id;
        let previous = self.state.tags.insert(id, tag);
        self.record(Undo::Tag(id, previous));
    }

    fn take_tag(&mut self, id: TagId) -> Option<Tag> {
        let removed = self.state.tags.remove(&id)?;
        self.record(Undo::Tag(id, Some(removed.clone())));
        Some(removed)
    }

    fn put_tag_name(&mut self, key: String, id: TagId) {
        let previous = self.state.tag_names.insert(key.clone(), id);
        self.record(Undo::TagName(key, previous));
    }

    fn drop_tag_name(&mut self, key: &str) {
        if let Some(previous) = self.state.tag_names.remove(key) {
            self.record(Undo::TagName(key.to_string(), Some(previous)));
        }
    }

    fn link_membership(&mut self, note_id: NoteId, tag_id: TagId) -> bool {
        self.state.tag_notes.insert((tag_id, note_id));
        let added = self.state.note_tags.insert((note_id, tag_id));
        if added {
            self.record(Undo::Membership {
                note_id,
                tag_id,
                present: false,
            });
        }
        added
    }

    fn unlink_membership(&mut self, note_id: NoteId, tag_id: TagId) -> bool {
        self.state.tag_notes.remove(&(tag_id, note_id));
        let removed = self.state.note_tags.remove(&(note_id, tag_id));
        if removed {
            self.record(Undo::Membership {
                note_id,
                tag_id,
                present: true,
            });
        }
        removed
    }

    fn link_edge(&mut self, source_id: NoteId, target_id: NoteId) -> bool {
        self.state.links_in.insert((target_id, source_id));
        let added = self.state.links_out.insert((source_id, target_id));
        if added {
            self.record(Undo::Edge {
                source_id,
                target_id,
                present: false,
            });
        }
        added
    }

    fn unlink_edge(&mut self, source_id: NoteId, target_id: NoteId) -> bool {
        self.state.links_in.remove(&(target_id, source_id));
        let removed = self.state.links_out.remove(&(source_id, target_id));
        if removed {
            self.record(Undo::Edge {
                source_id,
                target_id,
                present: true,
            });
        }
        removed
    }

    /// Replays the journal backwards down to `mark`. The clock is not rewound.
    fn roll_back_to(&mut self, mark: usize) {
        while self.journal.len() > mark {
            let Some(undo) = self.journal.pop() else {
                break;
            };
            let state = &mut self.state;
            match undo {
                Undo::Note(id, Some(note)) => {
                    state.notes.insert(id, note);
                }
                Undo::Note(id, None) => {
                    state.notes.remove(&id);
                }
                Undo::Tag(id, Some(tag)) => {
                    state.tags.insert(id, tag);
                }
                Undo::Tag(id, None) => {
                    state.tags.remove(&id);
                }
                Undo::TagName(key, Some(id)) => {
                    state.tag_names.insert(key, id);
                }
                Undo::TagName(key, None) => {
                    state.tag_names.remove(&key);
                }
                Undo::Membership {
                    note_id,
                    tag_id,
                    present: true,
                } => {
                    state.note_tags.insert((note_id, tag_id));
                    state.tag_notes.insert((tag_id, note_id));
                }
                Undo::Membership {
                    note_id,
                    tag_id,
                    present: false,
                } => {
                    state.note_tags.remove(&(note_id, tag_id));
                    state.tag_notes.remove(&(tag_id, note_id));
                }
                Undo::Edge {
                    source_id,
                    target_id,
                    present: true,
                } => {
                    state.links_out.insert((source_id, target_id));
                    state.links_in.insert((target_id, source_id));
                }
                Undo::Edge {
                    source_id,
                    target_id,
                    present: false,
                } => {
                    state.links_out.remove(&(source_id, target_id));
                    state.links_in.remove(&(target_id, source_id));
                }
            }
        }
    }
}

impl AtomicStore for MemoryIndexStore {
    fn atomic<T, F>(&mut self, f: F) -> RepoResult<T>
    where
        F: FnOnce(&mut Self) -> RepoResult<T>,
    {
        let mark = self.journal.len();
        self.depth += 1;
        let outcome = f(self);
        self.depth -= 1;

        if outcome.is_err() {
            self.roll_back_to(mark);
        }
        if self.depth == 0 {
            self.journal.clear();
        }
        outcome
    }
}

impl NoteStore for MemoryIndexStore {
    fn insert_note(&mut self, draft: &NewNote) -> RepoResult<Note> {
        let now = self.state.clock.tick();
        let note = Note {
            id: Uuid::new_v4(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            folder: draft.folder_or_default().to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.put_note(note.clone());
        Ok(note)
    }

    fn update_note(&mut self, id: NoteId, patch: &NotePatch) -> RepoResult<Option<Note>> {
        if patch.is_empty() {
            return self.get_note(id);
        }

        let now = self.state.clock.tick();
        let Some(mut note) = self.live_note(id).cloned() else {
            return Ok(None);
        };

        if let Some(title) = patch.title.as_ref() {
            note.title = title.clone();
        }
        if let Some(folder) = patch.folder.as_ref() {
            note.folder = folder.clone();
        }
        if let ContentChange::Changed(content) = &patch.content {
            note.content = content.clone();
        }
        note.updated_at = now;
        self.put_note(note.clone());
        Ok(Some(note))
    }

    fn soft_delete_note(&mut self, id: NoteId) -> RepoResult<bool> {
        let now = self.state.clock.tick();
        let Some(mut note) = self.live_note(id).cloned() else {
            return Ok(false);
        };
        note.deleted_at = Some(now);
        self.put_note(note);
        Ok(true)
    }

    fn restore_note(&mut self, id: NoteId) -> RepoResult<bool> {
        let Some(mut note) = self
            .state
            .notes
            .get(&id)
            .filter(|note| !note.is_active())
            .cloned()
        else {
            return Ok(false);
        };
        note.deleted_at = None;
        self.put_note(note);
        Ok(true)
    }

    fn purge_note(&mut self, id: NoteId) -> RepoResult<bool> {
        if !self.take_note(id) {
            return Ok(false);
        }

        for tag_id in self.tags_of(id) {
            self.unlink_membership(id, tag_id);
        }
        let outgoing: Vec<_> = self.state.links_out.range(id_range(id)).copied().collect();
        for (source, target) in outgoing {
            self.unlink_edge(source, target);
        }
        let incoming: Vec<_> = self.state.links_in.range(id_range(id)).copied().collect();
        for (target, source) in incoming {
            self.unlink_edge(source, target);
        }
        Ok(true)
    }

    fn get_note(&self, id: NoteId) -> RepoResult<Option<Note>> {
        Ok(self.live_note(id).cloned())
    }

    fn list_notes(&self, folder: Option<&str>) -> RepoResult<Vec<Note>> {
        let ids = self
            .state
            .notes
            .values()
            .filter(|note| folder.map_or(true, |folder| note.folder == folder))
            .map(|note| note.id)
            .collect::<Vec<_>>();
        Ok(self.live_notes_sorted(ids))
    }

    fn find_notes_by_title(&self, title: &str) -> RepoResult<Vec<NoteId>> {
        let mut matches: Vec<&Note> = self
            .state
            .notes
            .values()
            .filter(|note| note.is_active() && note.title == title)
            .collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matches.into_iter().map(|note| note.id).collect())
    }
}

impl TagRegistry for MemoryIndexStore {
    fn get_or_create_tag(&mut self, name: &str) -> RepoResult<Tag> {
        ensure_tag_name(name)?;
        let key = tag_key(name);
        if !self.state.tag_names.contains_key(&key) {
            let tag = Tag {
                id: Uuid::new_v4(),
                name: name.to_string(),
                color: tag_color(name),
                created_at: self.state.clock.tick(),
            };
            self.put_tag_name(key, tag.id);
            self.put_tag(tag);
        }

        self.find_tag_by_name(name)?
            .ok_or_else(|| RepoError::InvalidData(format!("tag `{name}` missing after insert")))
    }

    fn get_tag(&self, id: TagId) -> RepoResult<Option<Tag>> {
        Ok(self.state.tags.get(&id).cloned())
    }

    fn find_tag_by_name(&self, name: &str) -> RepoResult<Option<Tag>> {
        Ok(self
            .state
            .tag_names
            .get(&tag_key(name))
            .and_then(|id| self.state.tags.get(id))
            .cloned())
    }

    fn rename_tag(&mut self, id: TagId, new_name: &str) -> RepoResult<Tag> {
        ensure_tag_name(new_name)?;
        let new_key = tag_key(new_name);
        if let Some(existing) = self.state.tag_names.get(&new_key) {
            if *existing != id {
                if !self.state.tags.contains_key(&id) {
                    return Err(RepoError::TagNotFound(id));
                }
                return Err(RepoError::Conflict {
                    name: new_name.to_string(),
                    existing: *existing,
                });
            }
        }

        let Some(mut tag) = self.state.tags.get(&id).cloned() else {
            return Err(RepoError::TagNotFound(id));
        };
        let old_key = tag.key();
        tag.name = new_name.to_string();
        tag.color = tag_color(new_name);
        self.put_tag(tag.clone());

        self.drop_tag_name(&old_key);
        self.put_tag_name(new_key, id);
        Ok(tag)
    }

    fn delete_tag(&mut self, id: TagId) -> RepoResult<bool> {
        let members: Vec<NoteId> = self
            .state
            .tag_notes
            .range(id_range(id))
            .map(|(_, note_id)| *note_id)
            .collect();
        for note_id in members {
            self.unlink_membership(note_id, id);
        }

        let Some(tag) = self.take_tag(id) else {
            return Ok(false);
        };
        self.drop_tag_name(&tag.key());
        Ok(true)
    }

    fn list_tags(&self) -> RepoResult<Vec<TagUsage>> {
        let mut usages: Vec<TagUsage> = self
            .state
            .tags
            .values()
            .map(|tag| TagUsage {
                tag: tag.clone(),
                note_count: self.state.tag_notes.range(id_range(tag.id)).count(),
            })
            .collect();
        usages.sort_by(|a, b| {
            a.tag
                .key()
                .cmp(&b.tag.key())
                .then(a.tag.id.cmp(&b.tag.id))
        });
        Ok(usages)
    }
}

impl TagMembershipStore for MemoryIndexStore {
    fn note_tags(&self, note_id: NoteId) -> RepoResult<Vec<Tag>> {
        let mut tags: Vec<Tag> = self
            .tags_of(note_id)
            .into_iter()
            .filter_map(|tag_id| self.state.tags.get(&tag_id).cloned())
            .collect();
        tags.sort_by_key(Tag::key);
        Ok(tags)
    }

    fn insert_membership(&mut self, note_id: NoteId, tag_id: TagId) -> RepoResult<bool> {
        self.ensure_note_row(note_id)?;
        if !self.state.tags.contains_key(&tag_id) {
            return Err(RepoError::TagNotFound(tag_id));
        }
        Ok(self.link_membership(note_id, tag_id))
    }

    fn delete_membership(&mut self, note_id: NoteId, tag_id: TagId) -> RepoResult<bool> {
        Ok(self.unlink_membership(note_id, tag_id))
    }

    fn clear_memberships(&mut self, note_id: NoteId) -> RepoResult<usize> {
        let tag_ids = self.tags_of(note_id);
        for tag_id in &tag_ids {
            self.unlink_membership(note_id, *tag_id);
        }
        Ok(tag_ids.len())
    }

    fn all_memberships(&self) -> RepoResult<Vec<TagMembership>> {
        Ok(self
            .state
            .note_tags
            .iter()
            .map(|(note_id, tag_id)| TagMembership {
                note_id: *note_id,
                tag_id: *tag_id,
            })
            .collect())
    }

    fn notes_with_tags(&self, tag_ids: &[TagId], match_all: bool) -> RepoResult<Vec<Note>> {
        let filter: BTreeSet<TagId> = tag_ids.iter().copied().collect();
        let mut candidates = BTreeSet::new();
        for tag_id in &filter {
            candidates.extend(
                self.state
                    .tag_notes
                    .range(id_range(*tag_id))
                    .map(|(_, note_id)| *note_id),
            );
        }

        let matching = candidates.into_iter().filter(|note_id| {
            !match_all || filter.is_subset(&self.tags_of(*note_id))
        });
        Ok(self.live_notes_sorted(matching.collect::<Vec<_>>()))
    }
}

impl LinkGraphStore for MemoryIndexStore {
    fn outgoing_targets(&self, source_id: NoteId) -> RepoResult<Vec<NoteId>> {
        Ok(self
            .state
            .links_out
            .range(id_range(source_id))
            .map(|(_, target)| *target)
            .collect())
    }

    fn insert_edge(&mut self, source_id: NoteId, target_id: NoteId) -> RepoResult<bool> {
        self.ensure_note_row(source_id)?;
        self.ensure_note_row(target_id)?;
        Ok(self.link_edge(source_id, target_id))
    }

    fn delete_edge(&mut self, source_id: NoteId, target_id: NoteId) -> RepoResult<bool> {
        Ok(self.unlink_edge(source_id, target_id))
    }

    fn clear_outgoing_edges(&mut self, source_id: NoteId) -> RepoResult<usize> {
        let targets = self.outgoing_targets(source_id)?;
        for target_id in &targets {
            self.delete_edge(source_id, *target_id)?;
        }
        Ok(targets.len())
    }

    fn all_edges(&self) -> RepoResult<Vec<LinkEdge>> {
        Ok(self
            .state
            .links_out
            .iter()
            .map(|(source_id, target_id)| LinkEdge {
                source_id: *source_id,
                target_id: *target_id,
            })
            .collect())
    }

    fn backlink_notes(&self, target_id: NoteId) -> RepoResult<Vec<Note>> {
        let sources: Vec<NoteId> = self
            .state
            .links_in
            .range(id_range(target_id))
            .map(|(_, source)| *source)
            .collect();
        Ok(self.live_notes_sorted(sources))
    }

    fn outgoing_notes(&self, source_id: NoteId) -> RepoResult<Vec<Note>> {
        let targets = self.outgoing_targets(source_id)?;
        Ok(self.live_notes_sorted(targets))
    }

    fn prune_dangling_edges(&mut self) -> RepoResult<usize> {
        let dangling: Vec<(NoteId, NoteId)> = self
            .state
            .links_out
            .iter()
            .filter(|(_, target)| {
                self.state
                    .notes
                    .get(target)
                    .is_some_and(|note| !note.is_active())
            })
            .copied()
            .collect();
        for (source_id, target_id) in &dangling {
            self.delete_edge(*source_id, *target_id)?;
        }
        Ok(dangling.len())
    }
}

fn id_range(id: Uuid) -> RangeInclusive<(Uuid, Uuid)> {
    (id, Uuid::nil())..=(id, Uuid::from_u128(u128::MAX))
}

fn sort_recent_first(notes: &mut [Note]) {
    notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::MemoryIndexStore;
    use crate::model::link::LinkTarget;
    use crate::model::note::NewNote;
    use crate::repo::{
        AtomicStore, LinkGraphStore, NoteStore, RepoError, TagMembershipStore, TagRegistry,
    };

    #[test]
    fn atomic_restores_state_when_closure_fails() {
        let mut store = MemoryIndexStore::new();
        let note = store.insert_note(&NewNote::new("A", "")).unwrap();

        let result: Result<(), RepoError> = store.atomic(|store| {
            let tag = store.get_or_create_tag("draft")?;
            store.insert_membership(note.id, tag.id)?;
            Err(RepoError::InvalidData("forced".to_string()))
        });

        assert!(result.is_err());
        assert!(store.find_tag_by_name("draft").unwrap().is_none());
        assert!(store.note_tags(note.id).unwrap().is_empty());
    }

    #[test]
    fn nested_atomic_failure_rolls_back_inner_unit_only_when_outer_recovers() {
        let mut store = MemoryIndexStore::new();

        store
            .atomic(|store| {
                store.get_or_create_tag("kept")?;
                let inner: Result<(), RepoError> = store.atomic(|store| {
                    store.get_or_create_tag("dropped")?;
                    Err(RepoError::InvalidData("inner".to_string()))
                });
                assert!(inner.is_err());
                Ok(())
            })
            .unwrap();

        assert!(store.find_tag_by_name("kept").unwrap().is_some());
        assert!(store.find_tag_by_name("dropped").unwrap().is_none());
    }

    #[test]
    fn membership_for_unknown_note_is_rejected() {
        let mut store = MemoryIndexStore::new();
        let tag = store.get_or_create_tag("x").unwrap();
        let err = store
            .insert_membership(uuid::Uuid::new_v4(), tag.id)
            .unwrap_err();
        assert!(matches!(err, RepoError::NoteNotFound(_)));
    }

    #[test]
    fn unit_journals_only_rows_it_touches() {
        let mut store = MemoryIndexStore::new();
        let body = "x".repeat(64 * 1024);
        for i in 0..32 {
            store
                .insert_note(&NewNote::new(format!("Bulk {i}"), body.clone()))
                .unwrap();
        }
        let target = store.insert_note(&NewNote::new("Target", "")).unwrap();
        let source = store.insert_note(&NewNote::new("Source", "")).unwrap();

        store
            .atomic(|store| {
                store.set_membership(source.id, &["alpha".to_string(), "beta".to_string()])?;
                store.set_outgoing_edges(source.id, &[LinkTarget::new("Target")])?;
                // Two tag rows, two name keys, two memberships, one edge.
                assert_eq!(store.journal.len(), 7);
                Ok(())
            })
            .unwrap();

        assert!(store.journal.is_empty());
        assert_eq!(store.depth, 0);
        assert_eq!(store.outgoing_targets(source.id).unwrap(), vec![target.id]);
    }

    #[test]
    fn failed_unit_restores_note_rows_and_tag_names() {
        let mut store = MemoryIndexStore::new();
        let target = store.insert_note(&NewNote::new("Target", "")).unwrap();
        let source = store.insert_note(&NewNote::new("Source", "")).unwrap();
        let work = store.get_or_create_tag("work").unwrap();
        store.insert_membership(source.id, work.id).unwrap();
        store.insert_edge(source.id, target.id).unwrap();

        let result: Result<(), RepoError> = store.atomic(|store| {
            store.soft_delete_note(source.id)?;
            store.rename_tag(work.id, "Job")?;
            store.purge_note(target.id)?;
            Err(RepoError::InvalidData("forced".to_string()))
        });

        assert!(result.is_err());
        assert!(store.get_note(source.id).unwrap().is_some());
        assert!(store.get_note(target.id).unwrap().is_some());
        assert_eq!(store.find_tag_by_name("WORK").unwrap().unwrap().name, "work");
        assert!(store.find_tag_by_name("job").unwrap().is_none());
        assert_eq!(store.note_tags(source.id).unwrap(), vec![work]);
        assert_eq!(store.outgoing_targets(source.id).unwrap(), vec![target.id]);
        assert_eq!(store.backlink_notes(target.id).unwrap().len(), 1);
    }
}
