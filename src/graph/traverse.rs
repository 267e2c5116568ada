//! Bounded breadth-first subgraph retrieval.
//!
//! Walks outgoing and incoming edges from a seed one hop at a time. Within a hop,
//! new triples are taken in (predicate, neighbour) order until the triple budget
//! runs out, so identical inputs always give identical neighbourhoods.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{Iri, KnowledgeGraph, Term, Triple, TripleSource};

/// Limits for a retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum hop distance from the seed.
    pub max_hops: usize,
    /// Maximum number of triples to collect.
    pub max_triples: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_hops: 2,
            max_triples: 200,
        }
    }
}

/// A bounded neighbourhood of a seed node.
#[derive(Debug)]
pub struct Subgraph {
    /// The retrieved triples as a store of their own.
    pub store: KnowledgeGraph,
    /// Triples in the order they were taken.
    pub triples: Vec<Triple>,
    /// Every node reached, the seed included.
    pub visited: BTreeSet<Term>,
    /// Number of hops fully or partially expanded.
    pub hops_completed: usize,
    /// Whether the triple budget cut the walk short.
    pub truncated: bool,
}

impl Subgraph {
    /// Render the triples as N-Triples, one per line, in retrieval order.
    pub fn to_ntriples(&self) -> String {
        self.triples.iter().map(|t| format!("{t}\n")).collect()
    }
}

struct Candidate {
    predicate: Iri,
    neighbor: Term,
    triple: Triple,
}

/// Retrieve the neighbourhood of `seed` within the configured limits.
pub fn retrieve(source: &impl TripleSource, seed: &Term, config: &RetrievalConfig) -> Subgraph {
    let mut visited: BTreeSet<Term> = BTreeSet::new();
    let mut collected: BTreeSet<Triple> = BTreeSet::new();
    let mut ordered: Vec<Triple> = Vec::new();
    let mut hops_completed = 0;
    let mut truncated = false;

    visited.insert(seed.clone());
    let mut frontier = vec![seed.clone()];

    'hops: for hop in 1..=config.max_hops {
        if frontier.is_empty() {
            break;
        }
        if collected.len() >= config.max_triples {
            truncated = true;
            break;
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        for node in &frontier {
            for triple in source.matching(Some(node), None, None) {
                candidates.push(Candidate {
                    predicate: triple.predicate.clone(),
                    neighbor: triple.object.clone(),
                    triple,
                });
            }
            for triple in source.matching(None, None, Some(node)) {
                candidates.push(Candidate {
                    predicate: triple.predicate.clone(),
                    neighbor: triple.subject.clone(),
                    triple,
                });
            }
        }
        candidates.sort_by(|a, b| {
            (&a.predicate, &a.neighbor, &a.triple).cmp(&(&b.predicate, &b.neighbor, &b.triple))
        });

        let mut next_frontier = Vec::new();
        hops_completed = hop;
        for candidate in candidates {
            if collected.contains(&candidate.triple) {
                continue;
            }
            if collected.len() >= config.max_triples {
                truncated = true;
                break 'hops;
            }
            collected.insert(candidate.triple.clone());
            ordered.push(candidate.triple);
            if !candidate.neighbor.is_literal() && visited.insert(candidate.neighbor.clone()) {
                next_frontier.push(candidate.neighbor);
            }
        }
        frontier = next_frontier;
    }

    tracing::debug!(
        seed = %seed,
        triples = ordered.len(),
        hops = hops_completed,
        truncated,
        "retrieved subgraph"
    );

    Subgraph {
        store: KnowledgeGraph::from_unique(collected),
        triples: ordered,
        visited,
        hops_completed,
        truncated,
    }
}
