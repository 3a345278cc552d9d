//! Argument graph extraction from debate transcripts.
//!
//! Messages are split into sentences and classified into claims by
//! structural markers; cross-message edges are inferred from token overlap.
//! Node ids are SHA-256 digests of (debate, round, author, index), so the
//! same transcript always yields byte-identical graphs and callers can
//! cache by debate id, invalidating only when new rounds are sealed.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::scoring::{jaccard, tokens};
use crate::types::{
    ArgumentEdge, ArgumentGraph, ArgumentNode, Debate, EdgeKind, NodeKind, Round,
};

/// Tunable extraction parameters.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Minimum token-overlap similarity for a cross-message edge.
    pub edge_similarity_floor: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            edge_similarity_floor: 0.3,
        }
    }
}

const PREMISE_MARKERS: &[&str] = &[
    "if ", "because", "since ", "given that", "due to", "assuming",
];

const CONCLUSION_MARKERS: &[&str] = &[
    "this means",
    "therefore",
    "thus",
    "in conclusion",
    "so we should",
    "it follows",
];

const OBJECTION_MARKERS: &[&str] = &[
    "however",
    " but ",
    "disagree",
    "on the contrary",
    "the problem is",
    "i doubt",
    "fails to",
];

const SUPPORT_MARKERS: &[&str] = &[
    " agree",
    "as noted",
    "building on",
    "exactly",
    "in line with",
    "echo ",
];

const CITATION_MARKERS: &[&str] = &["as the ", "per the ", " said", " noted that", "echoing "];

/// Build the argument graph for a debate's sealed rounds.
pub fn build_graph(debate: &Debate, config: &GraphConfig) -> ArgumentGraph {
    let nodes = extract_nodes(&debate.id, &debate.rounds);
    let edges = infer_edges(&nodes, config);
    ArgumentGraph {
        debate_id: debate.id.clone(),
        rounds_covered: debate.rounds.len(),
        nodes,
        edges,
    }
}

fn extract_nodes(debate_id: &str, rounds: &[Round]) -> Vec<ArgumentNode> {
    let mut nodes = Vec::new();
    for round in rounds {
        for message in round.expert_messages() {
            let mut index = 0usize;
            for sentence in sentences(&message.content) {
                let lower = sentence.to_lowercase();
                if let Some((kind, hits)) = classify(&lower) {
                    nodes.push(ArgumentNode {
                        id: node_id(debate_id, round.number, &message.author_id, index),
                        kind,
                        expert_id: message.author_id.clone(),
                        round: round.number,
                        content: sentence.to_string(),
                        strength: (0.4 + 0.15 * hits as f64).min(0.9),
                    });
                    index += 1;
                }
            }
        }
    }
    nodes
}

/// Classification precedence: contradiction markers dominate agreement,
/// which dominates evaluative conclusions, which dominate causal premises.
fn classify(lower: &str) -> Option<(NodeKind, usize)> {
    let objections = marker_hits(lower, OBJECTION_MARKERS);
    if objections > 0 {
        return Some((NodeKind::Objection, objections));
    }
    let supports = marker_hits(lower, SUPPORT_MARKERS);
    if supports > 0 {
        return Some((NodeKind::Support, supports));
    }
    let conclusions = marker_hits(lower, CONCLUSION_MARKERS);
    if conclusions > 0 {
        return Some((NodeKind::Conclusion, conclusions));
    }
    let premises = marker_hits(lower, PREMISE_MARKERS);
    if premises > 0 {
        return Some((NodeKind::Premise, premises));
    }
    None
}

fn infer_edges(nodes: &[ArgumentNode], config: &GraphConfig) -> Vec<ArgumentEdge> {
    let token_sets: Vec<_> = nodes.iter().map(|n| tokens(&n.content)).collect();
    let mut edges = Vec::new();

    for (later_idx, later) in nodes.iter().enumerate() {
        for (earlier_idx, earlier) in nodes.iter().enumerate().take(later_idx) {
            // Only cross-message relations; same-author same-round sentences
            // belong to one contribution.
            if earlier.round == later.round && earlier.expert_id == later.expert_id {
                continue;
            }
            let similarity = jaccard(&token_sets[earlier_idx], &token_sets[later_idx]);
            if similarity < config.edge_similarity_floor {
                continue;
            }
            let kind = edge_kind(later);
            edges.push(ArgumentEdge {
                from: later.id.clone(),
                to: earlier.id.clone(),
                kind,
                strength: similarity,
            });
        }
    }
    edges
}

/// Relation carried by the later claim toward the referenced one.
fn edge_kind(later: &ArgumentNode) -> EdgeKind {
    let lower = later.content.to_lowercase();
    if CITATION_MARKERS.iter().any(|m| lower.contains(m)) {
        return EdgeKind::Cites;
    }
    match later.kind {
        NodeKind::Support => EdgeKind::AgreesWith,
        NodeKind::Objection => EdgeKind::DisagreesWith,
        NodeKind::Conclusion | NodeKind::Premise => {
            if marker_hits(&lower, OBJECTION_MARKERS) > 0 {
                EdgeKind::Attacks
            } else {
                EdgeKind::Supports
            }
        }
    }
}

fn marker_hits(lower: &str, markers: &[&str]) -> usize {
    markers.iter().filter(|m| lower.contains(*m)).count()
}

fn sentences(content: &str) -> impl Iterator<Item = &str> {
    content
        .split(|c| matches!(c, '.' | '!' | '?' | '\n'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn node_id(debate_id: &str, round: u32, author: &str, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(debate_id.as_bytes());
    hasher.update([0]);
    hasher.update(round.to_be_bytes());
    hasher.update(author.as_bytes());
    hasher.update([0]);
    hasher.update((index as u64).to_be_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Caches one graph per debate, invalidated when a new round seals.
pub struct GraphBuilder {
    config: GraphConfig,
    cache: Mutex<HashMap<String, ArgumentGraph>>,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Cached graph for the debate, rebuilt only when the sealed round
    /// count changed since the last call.
    pub fn graph_for(&self, debate: &Debate) -> ArgumentGraph {
        let mut cache = self.cache.lock().expect("graph cache lock");
        if let Some(cached) = cache.get(&debate.id) {
            if cached.rounds_covered == debate.rounds.len() {
                return cached.clone();
            }
        }
        let graph = build_graph(debate, &self.config);
        cache.insert(debate.id.clone(), graph.clone());
        graph
    }

    pub fn invalidate(&self, debate_id: &str) {
        self.cache
            .lock()
            .expect("graph cache lock")
            .remove(debate_id);
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}
