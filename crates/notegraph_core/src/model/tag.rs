//! Tag entity, membership pair and deterministic tag colors.

use crate::model::note::NoteId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a tag.
pub type TagId = Uuid;

const TAG_SATURATION_PCT: u8 = 70;
const TAG_LIGHTNESS_PCT: u8 = 50;

/// Canonical tag row. `name` is unique ignoring case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    /// Spelling from the first reference that created the tag (or the last rename).
    pub name: String,
    /// Always `tag_color(name)`.
    pub color: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl Tag {
    /// Case-insensitive identity key.
    pub fn key(&self) -> String {
        tag_key(&self.name)
    }
}

/// Tag with its aggregate membership count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagUsage {
    pub tag: Tag,
    pub note_count: usize,
}

/// Note-to-tag relation pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TagMembership {
    pub note_id: NoteId,
    pub tag_id: TagId,
}

/// Returns the case-insensitive identity key for a tag name.
///
/// Folds ASCII only, matching SQLite `COLLATE NOCASE`.
pub fn tag_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Derives a stable `hsl(...)` color from the lowercase tag name.
///
/// Uses the 32-bit `h = c + (h << 5) - h` string hash over UTF-16 code units,
/// so the same name always maps to the same hue across sessions and backends.
pub fn tag_color(name: &str) -> String {
    let hash = tag_key(name).encode_utf16().fold(0i32, |acc, unit| {
        i32::from(unit).wrapping_add(acc.wrapping_shl(5).wrapping_sub(acc))
    });
    let hue = hash.unsigned_abs() % 360;
    format!("hsl({hue}, {TAG_SATURATION_PCT}%, {TAG_LIGHTNESS_PCT}%)")
}

#[cfg(test)]
mod tests {
    use super::{tag_color, tag_key};

    #[test]
    fn color_ignores_case() {
        assert_eq!(tag_color("Research"), tag_color("research"));
        assert_eq!(tag_color("RESEARCH"), tag_color("research"));
    }

    #[test]
    fn color_is_hsl_with_hue_in_range() {
        for name in ["a", "work", "long-tag_name-2024", ""] {
            let color = tag_color(name);
            let hue: u32 = color
                .trim_start_matches("hsl(")
                .split(',')
                .next()
                .unwrap()
                .parse()
                .unwrap();
            assert!(hue < 360, "hue out of range for {name}: {color}");
            assert!(color.ends_with(", 70%, 50%)"));
        }
    }

    #[test]
    fn known_hash_values_are_stable() {
        // "a" hashes to 97.
        assert_eq!(tag_color("a"), "hsl(97, 70%, 50%)");
        // "ab": 98 + (97 << 5) - 97 = 3105 -> 3105 % 360 = 225.
        assert_eq!(tag_color("AB"), "hsl(225, 70%, 50%)");
    }

    #[test]
    fn key_lowercases() {
        assert_eq!(tag_key("MiXeD-Case_1"), "mixed-case_1");
    }

    #[test]
    fn key_folds_ascii_only() {
        assert_eq!(tag_key("Work"), tag_key("WORK"));
        assert_ne!(tag_key("Été"), tag_key("été"));
    }
}
