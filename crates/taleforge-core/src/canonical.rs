//! Canonical names for world-entity deduplication.

use crate::model::EntityType;

const LEADING_ARTICLES: [&str; 3] = ["the ", "a ", "an "];

/// Normalizes an entity name: trimmed, lowercased, inner whitespace
/// collapsed, and one leading article stripped.
///
/// `"  The Rusty   Anchor "` and `"rusty anchor"` map to the same key.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    let collapsed = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    for article in LEADING_ARTICLES {
        if let Some(stripped) = collapsed.strip_prefix(article) {
            if !stripped.is_empty() {
                return stripped.to_owned();
            }
        }
    }
    collapsed
}

/// Canonical key qualified by entity type, e.g. `location:rusty anchor`.
///
/// Used when the same name legitimately refers to two kinds of entity (a
/// tavern and its owner both called "Marlowe").
#[must_use]
pub fn qualified_canonical_name(entity_type: EntityType, name: &str) -> String {
    format!("{}:{}", entity_type.as_str(), canonical_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name_strips_article_and_case() {
        assert_eq!(canonical_name("  The Rusty   Anchor "), "rusty anchor");
        assert_eq!(canonical_name("An Old Hermit"), "old hermit");
        assert_eq!(canonical_name("a"), "a");
    }

    #[test]
    fn test_canonical_name_only_strips_whole_word_article() {
        assert_eq!(canonical_name("Theodore"), "theodore");
        assert_eq!(canonical_name("Anvil Hall"), "anvil hall");
    }

    #[test]
    fn test_qualified_canonical_name() {
        assert_eq!(
            qualified_canonical_name(EntityType::Location, "The Marlowe"),
            "location:marlowe"
        );
    }
}
