//! Wiki-link targets, stored edges and resolution results.

use crate::model::note::NoteId;
use serde::{Deserialize, Serialize};

/// One `[[title]]` or `[[title|alias]]` reference parsed from content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTarget {
    /// Trimmed, never empty.
    pub title: String,
    pub alias: Option<String>,
}

impl LinkTarget {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            alias: None,
        }
    }

    pub fn with_alias(title: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            alias: Some(alias.into()),
        }
    }
}

/// Directed note-to-note edge. Only resolved links are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkEdge {
    pub source_id: NoteId,
    pub target_id: NoteId,
}

/// Resolution outcome of one link target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkRef {
    Resolved {
        title: String,
        alias: Option<String>,
        target_id: NoteId,
        /// More than one live note carries this title; the oldest one won.
        ambiguous: bool,
    },
    /// No live note has this title yet (forward or broken link).
    Unresolved {
        title: String,
        alias: Option<String>,
    },
}

impl LinkRef {
    pub fn title(&self) -> &str {
        match self {
            Self::Resolved { title, .. } | Self::Unresolved { title, .. } => title,
        }
    }

    pub fn target_id(&self) -> Option<NoteId> {
        match self {
            Self::Resolved { target_id, .. } => Some(*target_id),
            Self::Unresolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}
