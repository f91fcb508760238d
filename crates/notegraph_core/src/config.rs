//! Index and logging configuration.
//!
//! # Responsibility
//! - Hold note validation limits, tag filter limits and log settings.
//! - Load overrides from JSON; every field falls back to its default.

use crate::model::note::DEFAULT_FOLDER;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const DEFAULT_MAX_TITLE_CHARS: usize = 500;
const DEFAULT_MAX_CONTENT_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_MAX_FILTER_TAGS: usize = 100;
const DEFAULT_FOLDERS: &[&str] = &["inbox", "projects", "areas", "resources", "archive"];
const DEFAULT_MAX_LOG_FILE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_LOG_FILES: usize = 5;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Limits and defaults applied by the index services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Maximum note title length in characters.
    pub max_title_chars: usize,
    /// Maximum note content size in bytes.
    pub max_content_bytes: usize,
    /// Maximum number of tag ids accepted by one tag filter query.
    pub max_filter_tags: usize,
    /// Folders a note may be filed under.
    pub folders: Vec<String>,
    /// Folder used when a new note does not name one; must be in `folders`.
    pub default_folder: String,
    pub logging: LogSettings,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_title_chars: DEFAULT_MAX_TITLE_CHARS,
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            max_filter_tags: DEFAULT_MAX_FILTER_TAGS,
            folders: DEFAULT_FOLDERS.iter().map(|folder| folder.to_string()).collect(),
            default_folder: DEFAULT_FOLDER.to_string(),
            logging: LogSettings::default(),
        }
    }
}

impl IndexConfig {
    /// Parses a JSON document; omitted fields keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_title_chars == 0 {
            return Err(ConfigError::Invalid(
                "max_title_chars must be positive".to_string(),
            ));
        }
        if self.max_filter_tags == 0 {
            return Err(ConfigError::Invalid(
                "max_filter_tags must be positive".to_string(),
            ));
        }
        if !self.is_known_folder(&self.default_folder) {
            return Err(ConfigError::Invalid(format!(
                "default_folder `{}` is not listed in folders",
                self.default_folder
            )));
        }
        Ok(())
    }

    pub fn is_known_folder(&self, folder: &str) -> bool {
        self.folders.iter().any(|known| known == folder)
    }
}

/// File logging settings consumed by [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rolling log files; `None` disables file logging.
    pub dir: Option<PathBuf>,
    pub max_file_bytes: u64,
    pub max_files: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: None,
            max_file_bytes: DEFAULT_MAX_LOG_FILE_BYTES,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, IndexConfig};

    #[test]
    fn empty_json_yields_defaults() {
        let config = IndexConfig::from_json_str("{}").expect("empty object should parse");
        assert_eq!(config, IndexConfig::default());
        assert_eq!(config.max_title_chars, 500);
        assert_eq!(config.max_filter_tags, 100);
        assert_eq!(config.default_folder, "inbox");
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config = IndexConfig::from_json_str(
            r#"{ "max_filter_tags": 3, "logging": { "level": "warn" } }"#,
        )
        .expect("partial config should parse");
        assert_eq!(config.max_filter_tags, 3);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.max_files, 5);
        assert_eq!(config.folders.len(), 5);
    }

    #[test]
    fn unknown_default_folder_is_rejected() {
        let err = IndexConfig::from_json_str(r#"{ "default_folder": "nowhere" }"#)
            .expect_err("folder outside the list must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = IndexConfig::from_json_str("{ not json").expect_err("must fail");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notegraph.json");
        std::fs::write(&path, r#"{ "max_title_chars": 80 }"#).unwrap();
        let config = IndexConfig::load(&path).unwrap();
        assert_eq!(config.max_title_chars, 80);
    }
}
