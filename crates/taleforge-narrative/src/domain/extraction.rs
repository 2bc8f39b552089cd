//! Entity extraction: the content-hash cache and the reply parser.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Number of narrative hashes remembered before the oldest is forgotten.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

type ContentHash = [u8; 32];

#[derive(Debug, Default)]
struct Seen {
    hashes: HashSet<ContentHash>,
    order: VecDeque<ContentHash>,
}

/// Remembers which narratives were already sent for extraction, keyed by
/// SHA-256 of the text. Bounded: past capacity the oldest hash is evicted.
#[derive(Debug)]
pub struct ExtractionCache {
    capacity: usize,
    seen: Mutex<Seen>,
}

impl ExtractionCache {
    /// Creates a cache remembering at most `capacity` hashes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: Mutex::new(Seen::default()),
        }
    }

    /// Records `text` and reports whether it was new. Identical text returns
    /// `false` until its hash is evicted.
    pub fn insert(&self, text: &str) -> bool {
        let hash: ContentHash = Sha256::digest(text.as_bytes()).into();
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if !seen.hashes.insert(hash) {
            return false;
        }
        seen.order.push_back(hash);
        while seen.order.len() > self.capacity {
            if let Some(oldest) = seen.order.pop_front() {
                seen.hashes.remove(&oldest);
            }
        }
        true
    }

    /// Number of remembered hashes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ExtractionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// One entity as the model reported it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtractedEntity {
    /// Entity kind, unvalidated.
    #[serde(rename = "type", alias = "entity_type")]
    pub entity_type: String,
    /// Display name.
    pub name: String,
    /// What the narration revealed.
    #[serde(default)]
    pub description: String,
}

/// Pulls the JSON payload out of a reply that may wrap it in a fenced code
/// block or surround it with prose.
#[must_use]
pub fn json_payload(reply: &str) -> &str {
    if let Some(start) = reply.find("```") {
        let body = &reply[start + 3..];
        if let Some(end) = body.find("```") {
            let block = body[..end].trim_start();
            let block = block
                .strip_prefix("json")
                .or_else(|| block.strip_prefix("JSON"))
                .unwrap_or(block);
            return block.trim();
        }
    }
    match (reply.find('['), reply.rfind(']')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => reply.trim(),
    }
}

/// Parses an extraction reply into entities.
///
/// # Errors
///
/// Returns the JSON error if no array of entities can be read.
pub fn parse_entities(reply: &str) -> Result<Vec<ExtractedEntity>, serde_json::Error> {
    serde_json::from_str(json_payload(reply))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_is_only_new_once() {
        let cache = ExtractionCache::default();

        assert!(cache.insert("The barkeep nods."));
        assert!(!cache.insert("The barkeep nods."));
        assert!(cache.insert("The barkeep frowns."));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_oldest_hash_is_evicted_past_capacity() {
        let cache = ExtractionCache::new(2);

        cache.insert("one");
        cache.insert("two");
        cache.insert("three");

        assert_eq!(cache.len(), 2);
        assert!(cache.insert("one"));
        assert!(!cache.insert("three"));
    }

    #[test]
    fn test_fenced_reply_parses() {
        let reply = "Here you go:\n```json\n[{\"type\": \"npc\", \"name\": \"Marlowe\", \"description\": \"Barkeep.\"}]\n```";

        let entities = parse_entities(reply).unwrap();

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "Marlowe");
        assert_eq!(entities[0].entity_type, "npc");
    }

    #[test]
    fn test_bare_array_inside_prose_parses() {
        let reply = "Entities: [{\"entity_type\": \"location\", \"name\": \"Rusty Anchor\"}] done";

        let entities = parse_entities(reply).unwrap();

        assert_eq!(entities[0].entity_type, "location");
        assert!(entities[0].description.is_empty());
    }

    #[test]
    fn test_prose_without_json_fails() {
        assert!(parse_entities("The fog rolls in over the harbour.").is_err());
    }
}
