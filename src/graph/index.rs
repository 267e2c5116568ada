//! In-memory knowledge graph with dual-indexing.
//!
//! Uses `petgraph` for the adjacency structure and hash indexes for lookups by
//! predicate and by (subject, predicate). The graph is immutable once loaded, so
//! it is shared across workers without locks.

use std::collections::{BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::GraphLoadError;

use super::{HypotheticalGraph, Iri, Term, Triple, TripleSource};

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphLoadError>;

/// Immutable knowledge graph backed by petgraph with secondary indexes.
///
/// Nodes are subject and object terms; each edge carries its predicate.
pub struct KnowledgeGraph {
    /// The directed graph: nodes are Terms, edges carry the predicate.
    graph: DiGraph<Term, Iri>,
    /// Term → NodeIndex mapping for O(1) node lookups.
    node_index: HashMap<Term, NodeIndex>,
    /// Predicate index: predicate → sorted (subject, object) pairs.
    predicate_index: HashMap<Iri, Vec<(Term, Term)>>,
    /// (subject, predicate) → sorted objects.
    subject_predicate_index: HashMap<(Term, Iri), Vec<Term>>,
    triple_count: usize,
}

impl KnowledgeGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_index: HashMap::new(),
            predicate_index: HashMap::new(),
            subject_predicate_index: HashMap::new(),
            triple_count: 0,
        }
    }

    /// Load a set of triples.
    ///
    /// Duplicates collapse into one triple. Any malformed triple fails the whole
    /// load; a graph is never returned partially built.
    pub fn load(triples: impl IntoIterator<Item = Triple>) -> GraphResult<Self> {
        let mut unique = BTreeSet::new();
        let mut seen = 0usize;
        for triple in triples {
            triple.check()?;
            unique.insert(triple);
            seen += 1;
        }
        if seen > unique.len() {
            tracing::debug!(
                duplicates = seen - unique.len(),
                "collapsed duplicate triples during load"
            );
        }

        Ok(Self::from_unique(unique))
    }

    /// Build from triples already checked and de-duplicated.
    pub(crate) fn from_unique(unique: BTreeSet<Triple>) -> Self {
        let mut kg = Self::new();
        // BTreeSet iteration is sorted, so every index is built in sorted order.
        for triple in unique {
            kg.insert_sorted(triple);
        }
        kg
    }

    fn ensure_node(&mut self, term: &Term) -> NodeIndex {
        if let Some(idx) = self.node_index.get(term) {
            return *idx;
        }
        let idx = self.graph.add_node(term.clone());
        self.node_index.insert(term.clone(), idx);
        idx
    }

    /// Insert one triple. Callers feed triples in sorted, de-duplicated order.
    fn insert_sorted(&mut self, triple: Triple) {
        let subj_idx = self.ensure_node(&triple.subject);
        let obj_idx = self.ensure_node(&triple.object);
        self.graph
            .add_edge(subj_idx, obj_idx, triple.predicate.clone());

        self.predicate_index
            .entry(triple.predicate.clone())
            .or_default()
            .push((triple.subject.clone(), triple.object.clone()));

        self.subject_predicate_index
            .entry((triple.subject, triple.predicate))
            .or_default()
            .push(triple.object);

        self.triple_count += 1;
    }

    /// Overlay this graph with one candidate triple without touching it.
    ///
    /// Each call allocates its own overlay, so concurrent "what if" checks from
    /// different claims never share state.
    pub fn hypothetical(&self, triple: Triple) -> HypotheticalGraph<'_> {
        HypotheticalGraph::new(self, triple)
    }

    /// Get all triples where the given term appears as subject, sorted.
    pub fn triples_from(&self, subject: &Term) -> Vec<Triple> {
        let Some(&idx) = self.node_index.get(subject) else {
            return vec![];
        };
        let mut triples: Vec<Triple> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| Triple {
                subject: subject.clone(),
                predicate: e.weight().clone(),
                object: self.graph[e.target()].clone(),
            })
            .collect();
        triples.sort();
        triples
    }

    /// Get all triples where the given term appears as object, sorted.
    pub fn triples_to(&self, object: &Term) -> Vec<Triple> {
        let Some(&idx) = self.node_index.get(object) else {
            return vec![];
        };
        let mut triples: Vec<Triple> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| Triple {
                subject: self.graph[e.source()].clone(),
                predicate: e.weight().clone(),
                object: object.clone(),
            })
            .collect();
        triples.sort();
        triples
    }

    /// Check if a node exists.
    pub fn has_node(&self, term: &Term) -> bool {
        self.node_index.contains_key(term)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.node_index.len()
    }

    /// All predicates, sorted.
    pub fn predicates(&self) -> Vec<Iri> {
        let mut preds: Vec<Iri> = self.predicate_index.keys().cloned().collect();
        preds.sort();
        preds
    }

    /// Get all triples in the graph, sorted.
    pub fn all_triples(&self) -> Vec<Triple> {
        let mut triples: Vec<Triple> = self
            .graph
            .edge_indices()
            .filter_map(|ei| {
                let (src, dst) = self.graph.edge_endpoints(ei)?;
                Some(Triple {
                    subject: self.graph[src].clone(),
                    predicate: self.graph.edge_weight(ei)?.clone(),
                    object: self.graph[dst].clone(),
                })
            })
            .collect();
        triples.sort();
        triples
    }
}

impl TripleSource for KnowledgeGraph {
    fn exists(&self, subject: &Term, predicate: &Iri, object: &Term) -> bool {
        self.subject_predicate_index
            .get(&(subject.clone(), predicate.clone()))
            .is_some_and(|objects| objects.binary_search(object).is_ok())
    }

    fn matching(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Iri>,
        object: Option<&Term>,
    ) -> Vec<Triple> {
        match (subject, predicate, object) {
            (Some(s), Some(p), Some(o)) => {
                if self.exists(s, p, o) {
                    vec![Triple::new(s.clone(), p.clone(), o.clone())]
                } else {
                    vec![]
                }
            }
            (Some(s), Some(p), None) => self
                .subject_predicate_index
                .get(&(s.clone(), p.clone()))
                .map(|objects| {
                    objects
                        .iter()
                        .map(|o| Triple::new(s.clone(), p.clone(), o.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            (None, Some(p), o) => self
                .predicate_index
                .get(p)
                .map(|pairs| {
                    pairs
                        .iter()
                        .filter(|(_, obj)| o.is_none_or(|o| o == obj))
                        .map(|(s, obj)| Triple::new(s.clone(), p.clone(), obj.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            (Some(s), None, o) => self
                .triples_from(s)
                .into_iter()
                .filter(|t| o.is_none_or(|o| *o == t.object))
                .collect(),
            (None, None, Some(o)) => self.triples_to(o),
            (None, None, None) => self.all_triples(),
        }
    }

    fn len(&self) -> usize {
        self.triple_count
    }

    fn objects(&self, subject: &Term, predicate: &Iri) -> Vec<Term> {
        self.subject_predicate_index
            .get(&(subject.clone(), predicate.clone()))
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KnowledgeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeGraph")
            .field("nodes", &self.node_count())
            .field("triples", &self.triple_count)
            .finish()
    }
}
