// 🔎 Fuzzy Entity Matcher - Inverted-index token-overlap search
// Links entity names across heterogeneous sources. Exact normalized
// equality wins outright; otherwise candidates reachable through any
// shared token are ranked by Jaccard similarity. Absence of a match is
// an empty result, never an error.

use crate::normalize::{jaccard, normalize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Token-overlap threshold used by the batch resolution pass.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.55;

/// Stricter threshold for interactive single-name lookups.
pub const STRICT_MATCH_THRESHOLD: f64 = 0.6;

pub const DEFAULT_TOP_K: usize = 5;

// ============================================================================
// INDEX
// ============================================================================

/// One indexed entity. `ordinal` is the insertion position and doubles as
/// the deterministic tie-break key.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub entity_id: String,
    pub raw_name: String,
    pub normalized: String,
    pub tokens: HashSet<String>,
    pub ordinal: usize,
}

/// Inverted index over entity names: token → entries containing it, plus a
/// normalized-form lookup for the exact short-circuit.
#[derive(Debug, Default)]
pub struct EntityIndex {
    entries: Vec<IndexEntry>,
    by_token: HashMap<String, Vec<usize>>,
    by_normalized: HashMap<String, usize>,
}

impl EntityIndex {
    /// Build the index from `(entity_id, raw_name)` pairs. Entries with no
    /// significant tokens are kept (they can still exact-match) but are
    /// unreachable through token lookup.
    pub fn build<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut index = EntityIndex::default();
        for (entity_id, raw_name) in pairs {
            index.insert(entity_id, raw_name);
        }
        index
    }

    pub fn insert(&mut self, entity_id: String, raw_name: String) {
        let norm = normalize(&raw_name);
        let ordinal = self.entries.len();
        for token in &norm.tokens {
            self.by_token
                .entry(token.clone())
                .or_default()
                .push(ordinal);
        }
        // First entry per normalized form wins the exact short-circuit
        self.by_normalized
            .entry(norm.normalized.clone())
            .or_insert(ordinal);
        self.entries.push(IndexEntry {
            entity_id,
            raw_name,
            normalized: norm.normalized,
            tokens: norm.tokens,
            ordinal,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// MATCHING
// ============================================================================

/// A scored match for one query, ephemeral and never persisted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub entity_id: String,
    pub raw_name: String,
    pub score: f64,
}

/// Matcher with explicit, injectable thresholds. Both fields are public so
/// call sites can tune them per use case.
#[derive(Debug, Clone)]
pub struct EntityMatcher {
    pub threshold: f64,
    pub top_k: usize,
}

impl EntityMatcher {
    pub fn new() -> Self {
        EntityMatcher {
            threshold: DEFAULT_MATCH_THRESHOLD,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Stricter variant for ad-hoc lookups where a wrong link is worse
    /// than no link.
    pub fn strict() -> Self {
        EntityMatcher {
            threshold: STRICT_MATCH_THRESHOLD,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        EntityMatcher {
            threshold,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Find the best matches for `query` in `index`.
    ///
    /// 1. Empty token set → no matches.
    /// 2. Exact normalized equality → exactly one candidate, score 1.0,
    ///    regardless of `top_k`.
    /// 3. Otherwise: union of entries reachable through the query tokens,
    ///    scored by Jaccard similarity, filtered by `threshold`, sorted by
    ///    score descending. Ties keep index insertion order (stable sort
    ///    over ordinal-sorted candidates), so results are deterministic.
    pub fn find_matches(&self, query: &str, index: &EntityIndex) -> Vec<MatchCandidate> {
        let q = normalize(query);
        if q.tokens.is_empty() {
            return Vec::new();
        }

        if let Some(&i) = index.by_normalized.get(&q.normalized) {
            let entry = &index.entries[i];
            return vec![MatchCandidate {
                entity_id: entry.entity_id.clone(),
                raw_name: entry.raw_name.clone(),
                score: 1.0,
            }];
        }

        let mut candidate_idxs: Vec<usize> = Vec::new();
        let mut seen_idx: HashSet<usize> = HashSet::new();
        for token in &q.tokens {
            if let Some(idxs) = index.by_token.get(token) {
                for &i in idxs {
                    if seen_idx.insert(i) {
                        candidate_idxs.push(i);
                    }
                }
            }
        }
        candidate_idxs.sort_unstable();

        // One candidate per entity id; the earliest-inserted entry represents it
        let mut seen_ids: HashSet<&str> = HashSet::new();
        let mut scored: Vec<(usize, f64)> = Vec::new();
        for &i in &candidate_idxs {
            let entry = &index.entries[i];
            if seen_ids.insert(entry.entity_id.as_str()) {
                let score = jaccard(&q.tokens, &entry.tokens);
                if score >= self.threshold {
                    scored.push((i, score));
                }
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(self.top_k);

        scored
            .into_iter()
            .map(|(i, score)| {
                let entry = &index.entries[i];
                MatchCandidate {
                    entity_id: entry.entity_id.clone(),
                    raw_name: entry.raw_name.clone(),
                    score,
                }
            })
            .collect()
    }
}

impl Default for EntityMatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
