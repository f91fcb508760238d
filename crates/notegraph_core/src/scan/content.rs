//! Regex-based scanner over note content.

use crate::model::link::LinkTarget;
use crate::model::tag::tag_key;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([A-Za-z0-9_-]+)").expect("valid tag regex"));
static TAG_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid tag name regex"));
static WIKI_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\]]+)\]\]").expect("valid wiki-link regex"));

/// Extracts distinct tag names in order of first appearance.
///
/// Names differing only by case collapse to the first spelling found.
pub fn extract_tags(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    TAG_RE
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|name| seen.insert(tag_key(name)))
        .map(str::to_string)
        .collect()
}

/// Extracts distinct wiki-link targets in order of first appearance.
///
/// `[[title|alias]]` splits on the first `|`. Titles and aliases are trimmed;
/// empty titles are dropped and repeated titles keep their first occurrence.
pub fn extract_link_targets(content: &str) -> Vec<LinkTarget> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for caps in WIKI_LINK_RE.captures_iter(content) {
        let Some(inner) = caps.get(1) else {
            continue;
        };
        let (title, alias) = match inner.as_str().split_once('|') {
            Some((title, alias)) => (title.trim(), Some(alias.trim())),
            None => (inner.as_str().trim(), None),
        };
        if title.is_empty() || !seen.insert(title.to_string()) {
            continue;
        }
        targets.push(LinkTarget {
            title: title.to_string(),
            alias: alias.filter(|value| !value.is_empty()).map(str::to_string),
        });
    }
    targets
}

/// Returns whether `name` could be written as a `#tag` in content.
pub fn is_valid_tag_name(name: &str) -> bool {
    TAG_NAME_RE.is_match(name)
}
