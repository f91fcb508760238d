//! SQLite-backed index store.
//!
//! # Responsibility
//! - Implement note, tag, membership and link-edge primitives over the
//!   migrated schema.
//! - Map atomic units onto `BEGIN IMMEDIATE` (outermost) and `SAVEPOINT`s
//!   (nested).
//!
//! # Invariants
//! - Every note-returning query filters `deleted_at IS NULL`.
//! - Tag names compare with `COLLATE NOCASE`.

use crate::db::{open_db, open_db_in_memory};
use crate::model::link::LinkEdge;
use crate::model::note::{ContentChange, NewNote, Note, NoteId, NotePatch};
use crate::model::tag::{tag_color, Tag, TagId, TagMembership, TagUsage};
use crate::repo::{
    ensure_tag_name, AtomicStore, Clock, LinkGraphStore, NoteStore, RepoError, RepoResult,
    TagMembershipStore, TagRegistry,
};
use log::warn;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Params, Row};
use std::path::Path;
use uuid::Uuid;

const NOTE_COLUMNS: &str = "n.uuid AS uuid,
    n.title AS title,
    n.content AS content,
    n.folder AS folder,
    n.created_at AS created_at,
    n.updated_at AS updated_at,
    n.deleted_at AS deleted_at";

const TAG_COLUMNS: &str = "t.uuid AS uuid,
    t.name AS name,
    t.color AS color,
    t.created_at AS created_at";

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "notes",
        &["uuid", "title", "content", "folder", "updated_at", "deleted_at"],
    ),
    ("tags", &["uuid", "name", "color", "created_at"]),
    ("note_tags", &["note_uuid", "tag_uuid"]),
    ("links", &["source_uuid", "target_uuid"]),
];

/// Durable index store over one SQLite connection.
pub struct SqliteIndexStore {
    conn: Connection,
    depth: u32,
    clock: Clock,
}

impl SqliteIndexStore {
    /// Wraps a migrated connection (see [`crate::db::open_db`]).
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        ensure_index_connection_ready(&conn)?;
        let last_ms: i64 = conn.query_row(
            "SELECT MAX(
                (SELECT COALESCE(MAX(updated_at), 0) FROM notes),
                (SELECT COALESCE(MAX(deleted_at), 0) FROM notes),
                (SELECT COALESCE(MAX(created_at), 0) FROM tags)
            );",
            [],
            |row| row.get(0),
        )?;
        Ok(Self {
            conn,
            depth: 0,
            clock: Clock::starting_after(last_ms),
        })
    }

    /// Opens (and migrates) an index database file.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::try_new(open_db(path)?)
    }

    pub fn open_in_memory() -> RepoResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    /// Underlying connection, for diagnostics and maintenance SQL.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn query_notes<P: Params>(&self, sql: &str, params: P) -> RepoResult<Vec<Note>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(parse_note_row(row)?);
        }
        Ok(notes)
    }

    fn query_tags<P: Params>(&self, sql: &str, params: P) -> RepoResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(parse_tag_row(row)?);
        }
        Ok(tags)
    }

    fn query_ids<P: Params>(&self, sql: &str, column: &str, params: P) -> RepoResult<Vec<Uuid>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            ids.push(parse_uuid(&text, column)?);
        }
        Ok(ids)
    }
}

impl AtomicStore for SqliteIndexStore {
    fn atomic<T, F>(&mut self, f: F) -> RepoResult<T>
    where
        F: FnOnce(&mut Self) -> RepoResult<T>,
    {
        let depth = self.depth;
        let (begin, commit, rollback) = if depth == 0 && self.conn.is_autocommit() {
            (
                "BEGIN IMMEDIATE;".to_string(),
                "COMMIT;".to_string(),
                "ROLLBACK;".to_string(),
            )
        } else {
            let name = format!("notegraph_unit_{depth}");
            (
                format!("SAVEPOINT {name};"),
                format!("RELEASE {name};"),
                format!("ROLLBACK TO {name}; RELEASE {name};"),
            )
        };

        self.conn.execute_batch(&begin)?;
        self.depth = depth + 1;
        let outcome = f(self);
        self.depth = depth;

        let outcome = outcome.and_then(|value| {
            self.conn.execute_batch(&commit)?;
            Ok(value)
        });
        if outcome.is_err() {
            if let Err(err) = self.conn.execute_batch(&rollback) {
                warn!("event=store_rollback module=repo status=error depth={depth} error={err}");
            }
        }
        outcome
    }
}

impl NoteStore for SqliteIndexStore {
    fn insert_note(&mut self, draft: &NewNote) -> RepoResult<Note> {
        let now = self.clock.tick();
        let note = Note {
            id: Uuid::new_v4(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            folder: draft.folder_or_default().to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.conn.execute(
            "INSERT INTO notes (uuid, title, content, folder, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                note.id.to_string(),
                note.title.as_str(),
                note.content.as_str(),
                note.folder.as_str(),
                note.created_at,
                note.updated_at,
            ],
        )?;

        Ok(note)
    }

    fn update_note(&mut self, id: NoteId, patch: &NotePatch) -> RepoResult<Option<Note>> {
        if patch.is_empty() {
            return self.get_note(id);
        }

        let mut assignments = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(title) = patch.title.as_ref() {
            assignments.push("title = ?");
            bind_values.push(Value::Text(title.clone()));
        }
        if let Some(folder) = patch.folder.as_ref() {
            assignments.push("folder = ?");
            bind_values.push(Value::Text(folder.clone()));
        }
        if let ContentChange::Changed(content) = &patch.content {
            assignments.push("content = ?");
            bind_values.push(Value::Text(content.clone()));
        }
        assignments.push("updated_at = ?");
        bind_values.push(Value::Integer(self.clock.tick()));
        bind_values.push(Value::Text(id.to_string()));

        let sql = format!(
            "UPDATE notes SET {} WHERE uuid = ? AND deleted_at IS NULL;",
            assignments.join(", ")
        );
        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Ok(None);
        }

        self.get_note(id)
    }

    fn soft_delete_note(&mut self, id: NoteId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE notes SET deleted_at = ?1 WHERE uuid = ?2 AND deleted_at IS NULL;",
            params![self.clock.tick(), id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn restore_note(&mut self, id: NoteId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE notes SET deleted_at = NULL WHERE uuid = ?1 AND deleted_at IS NOT NULL;",
            [id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn purge_note(&mut self, id: NoteId) -> RepoResult<bool> {
        // Memberships and edges in both directions cascade.
        let changed = self
            .conn
            .execute("DELETE FROM notes WHERE uuid = ?1;", [id.to_string()])?;
        Ok(changed > 0)
    }

    fn get_note(&self, id: NoteId) -> RepoResult<Option<Note>> {
        let notes = self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS}
                 FROM notes n
                 WHERE n.uuid = ?1
                   AND n.deleted_at IS NULL;"
            ),
            [id.to_string()],
        )?;
        Ok(notes.into_iter().next())
    }

    fn list_notes(&self, folder: Option<&str>) -> RepoResult<Vec<Note>> {
        let mut sql = format!("SELECT {NOTE_COLUMNS} FROM notes n WHERE n.deleted_at IS NULL");
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(folder) = folder {
            sql.push_str(" AND n.folder = ?");
            bind_values.push(Value::Text(folder.to_string()));
        }
        sql.push_str(" ORDER BY n.updated_at DESC, n.uuid ASC;");
        self.query_notes(&sql, params_from_iter(bind_values))
    }

    fn find_notes_by_title(&self, title: &str) -> RepoResult<Vec<NoteId>> {
        self.query_ids(
            "SELECT uuid
             FROM notes
             WHERE title = ?1
               AND deleted_at IS NULL
             ORDER BY created_at ASC, uuid ASC;",
            "notes.uuid",
            [title],
        )
    }
}

impl TagRegistry for SqliteIndexStore {
    fn get_or_create_tag(&mut self, name: &str) -> RepoResult<Tag> {
        ensure_tag_name(name)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO tags (uuid, name, color, created_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                Uuid::new_v4().to_string(),
                name,
                tag_color(name),
                self.clock.tick(),
            ],
        )?;

        self.find_tag_by_name(name)?
            .ok_or_else(|| RepoError::InvalidData(format!("tag `{name}` missing after insert")))
    }

    fn get_tag(&self, id: TagId) -> RepoResult<Option<Tag>> {
        let tags = self.query_tags(
            &format!("SELECT {TAG_COLUMNS} FROM tags t WHERE t.uuid = ?1;"),
            [id.to_string()],
        )?;
        Ok(tags.into_iter().next())
    }

    fn find_tag_by_name(&self, name: &str) -> RepoResult<Option<Tag>> {
        let tags = self.query_tags(
            &format!("SELECT {TAG_COLUMNS} FROM tags t WHERE t.name = ?1 COLLATE NOCASE;"),
            [name],
        )?;
        Ok(tags.into_iter().next())
    }

    fn rename_tag(&mut self, id: TagId, new_name: &str) -> RepoResult<Tag> {
        ensure_tag_name(new_name)?;
        self.atomic(|store| {
            if store.get_tag(id)?.is_none() {
                return Err(RepoError::TagNotFound(id));
            }

            let owners = store.query_ids(
                "SELECT uuid
                 FROM tags
                 WHERE name = ?1 COLLATE NOCASE
                   AND uuid <> ?2;",
                "tags.uuid",
                params![new_name, id.to_string()],
            )?;
            if let Some(existing) = owners.first() {
                return Err(RepoError::Conflict {
                    name: new_name.to_string(),
                    existing: *existing,
                });
            }

            store.conn.execute(
                "UPDATE tags SET name = ?1, color = ?2 WHERE uuid = ?3;",
                params![new_name, tag_color(new_name), id.to_string()],
            )?;
            store.get_tag(id)?.ok_or(RepoError::TagNotFound(id))
        })
    }

    fn delete_tag(&mut self, id: TagId) -> RepoResult<bool> {
        self.atomic(|store| {
            store
                .conn
                .execute("DELETE FROM note_tags WHERE tag_uuid = ?1;", [id.to_string()])?;
            let changed = store
                .conn
                .execute("DELETE FROM tags WHERE uuid = ?1;", [id.to_string()])?;
            Ok(changed > 0)
        })
    }

    fn list_tags(&self) -> RepoResult<Vec<TagUsage>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TAG_COLUMNS}, COUNT(nt.note_uuid) AS note_count
             FROM tags t
             LEFT JOIN note_tags nt ON nt.tag_uuid = t.uuid
             GROUP BY t.uuid
             ORDER BY t.name COLLATE NOCASE ASC, t.uuid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut usages = Vec::new();
        while let Some(row) = rows.next()? {
            let count: i64 = row.get("note_count")?;
            usages.push(TagUsage {
                tag: parse_tag_row(row)?,
                note_count: usize::try_from(count).map_err(|_| {
                    RepoError::InvalidData(format!("negative note_count `{count}`"))
                })?,
            });
        }
        Ok(usages)
    }
}

impl TagMembershipStore for SqliteIndexStore {
    fn note_tags(&self, note_id: NoteId) -> RepoResult<Vec<Tag>> {
        self.query_tags(
            &format!(
                "SELECT {TAG_COLUMNS}
                 FROM note_tags nt
                 INNER JOIN tags t ON t.uuid = nt.tag_uuid
                 WHERE nt.note_uuid = ?1
                 ORDER BY t.name COLLATE NOCASE ASC;"
            ),
            [note_id.to_string()],
        )
    }

    fn insert_membership(&mut self, note_id: NoteId, tag_id: TagId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO note_tags (note_uuid, tag_uuid, created_at)
             VALUES (?1, ?2, ?3);",
            params![note_id.to_string(), tag_id.to_string(), self.clock.tick()],
        )?;
        Ok(changed > 0)
    }

    fn delete_membership(&mut self, note_id: NoteId, tag_id: TagId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM note_tags WHERE note_uuid = ?1 AND tag_uuid = ?2;",
            params![note_id.to_string(), tag_id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn clear_memberships(&mut self, note_id: NoteId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM note_tags WHERE note_uuid = ?1;",
            [note_id.to_string()],
        )?;
        Ok(changed)
    }

    fn all_memberships(&self) -> RepoResult<Vec<TagMembership>> {
        let mut stmt = self.conn.prepare(
            "SELECT note_uuid, tag_uuid
             FROM note_tags
             ORDER BY note_uuid ASC, tag_uuid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut memberships = Vec::new();
        while let Some(row) = rows.next()? {
            let note_text: String = row.get("note_uuid")?;
            let tag_text: String = row.get("tag_uuid")?;
            memberships.push(TagMembership {
                note_id: parse_uuid(&note_text, "note_tags.note_uuid")?,
                tag_id: parse_uuid(&tag_text, "note_tags.tag_uuid")?,
            });
        }
        Ok(memberships)
    }

    fn notes_with_tags(&self, tag_ids: &[TagId], match_all: bool) -> RepoResult<Vec<Note>> {
        let placeholders = vec!["?"; tag_ids.len()].join(", ");
        let mut bind_values: Vec<Value> = tag_ids
            .iter()
            .map(|id| Value::Text(id.to_string()))
            .collect();

        let filter = if match_all {
            bind_values.push(Value::Integer(tag_ids.len() as i64));
            format!(
                "(SELECT COUNT(DISTINCT nt.tag_uuid)
                  FROM note_tags nt
                  WHERE nt.note_uuid = n.uuid
                    AND nt.tag_uuid IN ({placeholders})) = ?"
            )
        } else {
            format!(
                "EXISTS (
                    SELECT 1
                    FROM note_tags nt
                    WHERE nt.note_uuid = n.uuid
                      AND nt.tag_uuid IN ({placeholders})
                )"
            )
        };

        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS}
                 FROM notes n
                 WHERE n.deleted_at IS NULL
                   AND {filter}
                 ORDER BY n.updated_at DESC, n.uuid ASC;"
            ),
            params_from_iter(bind_values),
        )
    }
}

impl LinkGraphStore for SqliteIndexStore {
    fn outgoing_targets(&self, source_id: NoteId) -> RepoResult<Vec<NoteId>> {
        self.query_ids(
            "SELECT target_uuid
             FROM links
             WHERE source_uuid = ?1
             ORDER BY target_uuid ASC;",
            "links.target_uuid",
            [source_id.to_string()],
        )
    }

    fn insert_edge(&mut self, source_id: NoteId, target_id: NoteId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO links (source_uuid, target_uuid, created_at)
             VALUES (?1, ?2, ?3);",
            params![
                source_id.to_string(),
                target_id.to_string(),
                self.clock.tick()
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_edge(&mut self, source_id: NoteId, target_id: NoteId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM links WHERE source_uuid = ?1 AND target_uuid = ?2;",
            params![source_id.to_string(), target_id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn clear_outgoing_edges(&mut self, source_id: NoteId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM links WHERE source_uuid = ?1;",
            [source_id.to_string()],
        )?;
        Ok(changed)
    }

    fn all_edges(&self) -> RepoResult<Vec<LinkEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_uuid, target_uuid
             FROM links
             ORDER BY source_uuid ASC, target_uuid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            let source_text: String = row.get("source_uuid")?;
            let target_text: String = row.get("target_uuid")?;
            edges.push(LinkEdge {
                source_id: parse_uuid(&source_text, "links.source_uuid")?,
                target_id: parse_uuid(&target_text, "links.target_uuid")?,
            });
        }
        Ok(edges)
    }

    fn backlink_notes(&self, target_id: NoteId) -> RepoResult<Vec<Note>> {
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS}
                 FROM links l
                 INNER JOIN notes n ON n.uuid = l.source_uuid
                 WHERE l.target_uuid = ?1
                   AND n.deleted_at IS NULL
                 ORDER BY n.updated_at DESC, n.uuid ASC;"
            ),
            [target_id.to_string()],
        )
    }

    fn outgoing_notes(&self, source_id: NoteId) -> RepoResult<Vec<Note>> {
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS}
                 FROM links l
                 INNER JOIN notes n ON n.uuid = l.target_uuid
                 WHERE l.source_uuid = ?1
                   AND n.deleted_at IS NULL
                 ORDER BY n.updated_at DESC, n.uuid ASC;"
            ),
            [source_id.to_string()],
        )
    }

    fn prune_dangling_edges(&mut self) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM links
             WHERE target_uuid IN (
                SELECT uuid FROM notes WHERE deleted_at IS NOT NULL
             );",
            [],
        )?;
        Ok(changed)
    }
}

fn parse_note_row(row: &Row<'_>) -> RepoResult<Note> {
    let uuid_text: String = row.get("uuid")?;
    Ok(Note {
        id: parse_uuid(&uuid_text, "notes.uuid")?,
        title: row.get("title")?,
        content: row.get("content")?,
        folder: row.get("folder")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn parse_tag_row(row: &Row<'_>) -> RepoResult<Tag> {
    let uuid_text: String = row.get("uuid")?;
    Ok(Tag {
        id: parse_uuid(&uuid_text, "tags.uuid")?,
        name: row.get("name")?,
        color: row.get("color")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn ensure_index_connection_ready(conn: &Connection) -> RepoResult<()> {
    for (table, columns) in REQUIRED_COLUMNS {
        if !table_exists(conn, table)? {
            return Err(RepoError::InvalidData(format!(
                "missing required table `{table}`"
            )));
        }
        for column in *columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::InvalidData(format!(
                    "missing required column `{table}.{column}`"
                )));
            }
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
