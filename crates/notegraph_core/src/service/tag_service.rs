//! Explicit tag management: create, rename, delete, list.

use crate::model::tag::{Tag, TagId, TagUsage};
use crate::repo::{IndexStore, RepoError};
use crate::scan::is_valid_tag_name;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum TagServiceError {
    /// Name is empty or contains characters a `#tag` cannot carry.
    InvalidName(String),
    Repo(RepoError),
}

impl Display for TagServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(
                f,
                "invalid tag name `{name}`; expected letters, digits, `_` or `-`"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TagServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::InvalidName(_) => None,
        }
    }
}

impl From<RepoError> for TagServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::InvalidTagName(name) => Self::InvalidName(name),
            other => Self::Repo(other),
        }
    }
}

pub struct TagService<'s, S> {
    store: &'s mut S,
}

impl<'s, S: IndexStore> TagService<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Self { store }
    }

    /// Returns the tag for `name` ignoring case, creating it when missing.
    ///
    /// A leading `#` is accepted and stripped.
    pub fn get_or_create(&mut self, name: &str) -> Result<Tag, TagServiceError> {
        let name = normalize_name(name)?;
        Ok(self.store.get_or_create_tag(name)?)
    }

    pub fn get(&self, id: TagId) -> Result<Option<Tag>, TagServiceError> {
        Ok(self.store.get_tag(id)?)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<Tag>, TagServiceError> {
        let name = normalize_name(name)?;
        Ok(self.store.find_tag_by_name(name)?)
    }

    /// Renames a tag; its color follows the new name.
    ///
    /// Changing only the case of a name is allowed.
    pub fn rename(&mut self, id: TagId, new_name: &str) -> Result<Tag, TagServiceError> {
        let new_name = normalize_name(new_name)?;
        let tag = self.store.atomic(|store| store.rename_tag(id, new_name))?;
        info!("event=tag_rename module=tags status=ok tag_id={id}");
        Ok(tag)
    }

    /// Deletes a tag and every membership referencing it.
    pub fn delete(&mut self, id: TagId) -> Result<bool, TagServiceError> {
        let deleted = self.store.atomic(|store| store.delete_tag(id))?;
        if deleted {
            info!("event=tag_delete module=tags status=ok tag_id={id}");
        }
        Ok(deleted)
    }

    /// Every tag with its membership count, ordered by name ignoring case.
    pub fn get_all(&self) -> Result<Vec<TagUsage>, TagServiceError> {
        Ok(self.store.list_tags()?)
    }
}

fn normalize_name(raw: &str) -> Result<&str, TagServiceError> {
    let trimmed = raw.trim();
    let name = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if !is_valid_tag_name(name) {
        return Err(TagServiceError::InvalidName(raw.to_string()));
    }
    Ok(name)
}
