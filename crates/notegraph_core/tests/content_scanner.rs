use notegraph_core::scan::{extract_link_targets, extract_tags, is_valid_tag_name};
use notegraph_core::LinkTarget;
use proptest::prelude::*;
use std::collections::HashSet;

#[test]
fn realistic_note_yields_tags_and_links_in_order() {
    let content = "# Weekly review #planning\n\
        Met with [[Alice Smith|Alice]] about [[Project X]].\n\
        Follow up in [[Project X]] and #Planning #follow-up.\n\
        Broken: [[]] [[ | only alias]] [[Trailing|]]";

    assert_eq!(extract_tags(content), vec!["planning", "follow-up"]);
    assert_eq!(
        extract_link_targets(content),
        vec![
            LinkTarget::with_alias("Alice Smith", "Alice"),
            LinkTarget::new("Project X"),
            LinkTarget::new("Trailing"),
        ]
    );
}

#[test]
fn heading_marker_without_name_is_not_a_tag() {
    assert!(extract_tags("# Heading\n## Sub").is_empty());
    assert_eq!(extract_tags("##double"), vec!["double"]);
}

#[test]
fn link_targets_keep_exact_title_case() {
    let targets = extract_link_targets("[[Target]] [[target]]");
    assert_eq!(targets, vec![LinkTarget::new("Target"), LinkTarget::new("target")]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn extracted_tags_are_valid_and_distinct(content in "\\PC{0,200}") {
        let tags = extract_tags(&content);
        let mut keys = HashSet::new();
        for tag in &tags {
            prop_assert!(is_valid_tag_name(tag), "invalid tag {:?}", tag);
            prop_assert!(keys.insert(tag.to_lowercase()), "duplicate tag {:?}", tag);
            let marker = format!("#{tag}");
            prop_assert!(content.contains(&marker));
        }
    }

    #[test]
    fn extracted_links_are_trimmed_and_distinct(content in "(\\[\\[|\\]\\]|\\||[ a-zA-Z#]){0,80}") {
        let targets = extract_link_targets(&content);
        let mut titles = HashSet::new();
        for target in &targets {
            prop_assert!(!target.title.is_empty());
            prop_assert_eq!(target.title.trim(), target.title.as_str());
            prop_assert!(!target.title.contains('|'));
            prop_assert!(!target.title.contains(']'));
            prop_assert!(titles.insert(target.title.clone()));
            if let Some(alias) = &target.alias {
                prop_assert!(!alias.is_empty());
                prop_assert_eq!(alias.trim(), alias.as_str());
            }
        }
    }

    #[test]
    fn scanning_is_deterministic(content in "\\PC{0,200}") {
        prop_assert_eq!(extract_tags(&content), extract_tags(&content));
        prop_assert_eq!(extract_link_targets(&content), extract_link_targets(&content));
    }
}
