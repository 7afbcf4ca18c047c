//! Post-search deduplication: first by normalized
//! content hash, then optionally by Jaccard token-set similarity.

use std::collections::HashSet;

use super::store::{sha256_hex, SearchHit};

/// Lowercases and collapses whitespace before hashing, so "Hello  World" and
/// "hello world" collide.
fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tokenize(text: &str) -> HashSet<String> {
    normalize(text).split_whitespace().map(String::from).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

pub struct Deduplicator {
    pub jaccard_threshold: f32,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self { jaccard_threshold: 0.85 }
    }
}

impl Deduplicator {
    pub fn new(jaccard_threshold: f32) -> Self {
        Self { jaccard_threshold }
    }

    /// Filters `hits` (already sorted by score descending) to unique entries;
    /// when two collide, the higher-scored one (the one already seen)
    /// survives, since the input is sorted best-first.
    pub fn dedupe(&self, hits: Vec<SearchHit>) -> Vec<SearchHit> {
        let mut seen_hashes: HashSet<String> = HashSet::new();
        let mut seen_tokens: Vec<HashSet<String>> = Vec::new();
        let mut out = Vec::new();

        for hit in hits {
            let normalized = normalize(&hit.record.text);
            let hash = sha256_hex(&normalized);
            if !seen_hashes.insert(hash) {
                continue;
            }

            let tokens = tokenize(&hit.record.text);
            if seen_tokens
                .iter()
                .any(|existing| jaccard(existing, &tokens) >= self.jaccard_threshold)
            {
                continue;
            }
            seen_tokens.push(tokens);
            out.push(hit);
        }
        out
    }
}
