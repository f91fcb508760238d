//! Note record and note-CRUD payloads.
//!
//! Notes are owned by the note-CRUD surface; the index only reads their
//! title/content and soft-delete marker.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a note.
pub type NoteId = Uuid;

/// Folder used when a new note does not name one.
pub const DEFAULT_FOLDER: &str = "inbox";

/// Note row as seen by the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    /// Exact-match key for wiki-link resolution.
    pub title: String,
    /// Markdown source text scanned for `#tags` and `[[links]]`.
    pub content: String,
    pub folder: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds. Drives backlink ordering.
    pub updated_at: i64,
    /// Soft delete tombstone; `None` while the note is live.
    pub deleted_at: Option<i64>,
}

impl Note {
    /// Returns whether this note should be visible to queries.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Insert payload for a new note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    /// `None` files the note under [`DEFAULT_FOLDER`].
    pub folder: Option<String>,
}

impl NewNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            folder: None,
        }
    }

    pub fn in_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn folder_or_default(&self) -> &str {
        self.folder.as_deref().unwrap_or(DEFAULT_FOLDER)
    }
}

/// Whether an update carries a new content value.
///
/// Only `Changed` triggers a reconcile; metadata-only updates leave the
/// derived link/tag state as it was.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContentChange {
    Changed(String),
    #[default]
    MetadataOnly,
}

impl ContentChange {
    pub fn as_changed(&self) -> Option<&str> {
        match self {
            Self::Changed(content) => Some(content.as_str()),
            Self::MetadataOnly => None,
        }
    }
}

/// Partial update for one note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub folder: Option<String>,
    pub content: ContentChange,
}

impl NotePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: ContentChange::Changed(content.into()),
            ..Self::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn folder(folder: impl Into<String>) -> Self {
        Self {
            folder: Some(folder.into()),
            ..Self::default()
        }
    }

    /// Returns whether applying this patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.folder.is_none() && self.content.as_changed().is_none()
    }
}
