// 🕸️ Address Graph Builder - Shared-address clusters and connectivity
// Groups entities by normalized address key, links members of small
// clusters ("same_address" edges), and turns degree counts into a 0-1
// connectivity score. Only degree centrality is needed, so the graph is
// a plain adjacency map, not a graph-library structure.

use crate::normalize::address_key;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Clusters of more than this many entities are treated as hub noise:
/// they keep their size and flag but contribute no edges.
pub const MAX_EDGE_CLUSTER: usize = 50;

/// Minimum cluster size for the shell-risk address flag.
pub const CLUSTER_FLAG_THRESHOLD: usize = 3;

// ============================================================================
// GRAPH OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressEdge {
    pub source: String,
    pub target: String,
    pub relation: String,
}

/// Flat export of one pass over the address graph. The live adjacency map
/// is internal to the builder; consumers only see sizes, edges and scores.
#[derive(Debug, Clone, Default)]
pub struct AddressGraph {
    /// Address key → member entity ids, for clusters of size ≥ 2.
    pub clusters: BTreeMap<String, Vec<String>>,
    /// Entity id → size of its cluster (1 when unclustered).
    pub cluster_sizes: HashMap<String, usize>,
    pub edges: Vec<AddressEdge>,
    /// Entity id → degree / (num_nodes - 1), rounded to 6 places.
    pub centrality: HashMap<String, f64>,
    /// Entity id → centrality rescaled by the maximum observed (0-1).
    pub centrality_scores: HashMap<String, f64>,
    pub num_nodes: usize,
}

impl AddressGraph {
    pub fn cluster_size_of(&self, entity_id: &str) -> usize {
        self.cluster_sizes.get(entity_id).copied().unwrap_or(1)
    }

    /// Shell-risk address flag: entity sits in a cluster of ≥ 3, whether or
    /// not that cluster was large enough to be excluded from edges.
    pub fn cluster_flag(&self, entity_id: &str) -> bool {
        self.cluster_size_of(entity_id) >= CLUSTER_FLAG_THRESHOLD
    }

    pub fn centrality_of(&self, entity_id: &str) -> f64 {
        self.centrality.get(entity_id).copied().unwrap_or(0.0)
    }

    pub fn centrality_score_of(&self, entity_id: &str) -> f64 {
        self.centrality_scores.get(entity_id).copied().unwrap_or(0.0)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "Address graph: {} nodes, {} edges, {} clusters (size ≥ 2)",
            self.num_nodes,
            self.edges.len(),
            self.clusters.len()
        )
    }
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct AddressGraphBuilder {
    /// Largest cluster that still contributes edges.
    pub max_edge_cluster: usize,
}

impl AddressGraphBuilder {
    pub fn new() -> Self {
        AddressGraphBuilder {
            max_edge_cluster: MAX_EDGE_CLUSTER,
        }
    }

    /// Build the address graph from `(entity_id, raw_address)` pairs.
    ///
    /// Every entity is a node. Entities whose address yields no key stay
    /// isolated with cluster size 1. Cluster keys are iterated in sorted
    /// order so the edge list is deterministic for a given input order.
    pub fn build(&self, entities: &[(String, String)]) -> AddressGraph {
        let num_nodes = entities.len();

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (entity_id, raw_address) in entities {
            if let Some(key) = address_key(raw_address) {
                groups.entry(key).or_default().push(entity_id.clone());
            }
        }

        let mut cluster_sizes: HashMap<String, usize> = HashMap::new();
        let mut clusters: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut adjacency: HashMap<String, HashSet<String>> = HashMap::new();
        let mut edges: Vec<AddressEdge> = Vec::new();

        for (key, members) in &groups {
            if members.len() < 2 {
                continue;
            }
            for id in members {
                cluster_sizes.insert(id.clone(), members.len());
            }
            clusters.insert(key.clone(), members.clone());

            if members.len() > self.max_edge_cluster {
                continue;
            }
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    adjacency
                        .entry(members[i].clone())
                        .or_default()
                        .insert(members[j].clone());
                    adjacency
                        .entry(members[j].clone())
                        .or_default()
                        .insert(members[i].clone());
                    edges.push(AddressEdge {
                        source: members[i].clone(),
                        target: members[j].clone(),
                        relation: "same_address".to_string(),
                    });
                }
            }
        }

        // Degree pass: centrality = degree / (n - 1), then rescale by the max
        let mut centrality: HashMap<String, f64> = HashMap::new();
        let denom = num_nodes.saturating_sub(1) as f64;
        if denom > 0.0 {
            for (entity_id, _) in entities {
                let degree = adjacency.get(entity_id).map_or(0, |n| n.len());
                centrality.insert(entity_id.clone(), round6(degree as f64 / denom));
            }
        } else {
            for (entity_id, _) in entities {
                centrality.insert(entity_id.clone(), 0.0);
            }
        }

        let max_centrality = centrality.values().cloned().fold(0.0_f64, f64::max);
        let mut centrality_scores: HashMap<String, f64> = HashMap::new();
        for (entity_id, value) in &centrality {
            let score = if max_centrality > 0.0 {
                value / max_centrality
            } else {
                0.0
            };
            centrality_scores.insert(entity_id.clone(), score);
        }

        AddressGraph {
            clusters,
            cluster_sizes,
            edges,
            centrality,
            centrality_scores,
            num_nodes,
        }
    }
}

impl Default for AddressGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

// ============================================================================
// TESTS
// ============================================================================
