//! Hypothetical overlays: "what if this claim were true".

use super::{Iri, KnowledgeGraph, Term, Triple, TripleSource};

/// A base graph unioned with one extra triple.
///
/// Borrows the base graph and never mutates it. When the candidate is already
/// present the overlay is identical to the base.
#[derive(Debug, Clone)]
pub struct HypotheticalGraph<'a> {
    base: &'a KnowledgeGraph,
    extra: Option<Triple>,
}

impl<'a> HypotheticalGraph<'a> {
    pub(crate) fn new(base: &'a KnowledgeGraph, candidate: Triple) -> Self {
        let extra = (!base.contains(&candidate)).then_some(candidate);
        Self { base, extra }
    }

    /// The base graph this overlay extends.
    pub fn base(&self) -> &'a KnowledgeGraph {
        self.base
    }

    /// The added triple, if it was not already in the base graph.
    pub fn added(&self) -> Option<&Triple> {
        self.extra.as_ref()
    }

    fn extra_matches(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Iri>,
        object: Option<&Term>,
    ) -> Option<&Triple> {
        self.extra.as_ref().filter(|t| {
            subject.is_none_or(|s| *s == t.subject)
                && predicate.is_none_or(|p| *p == t.predicate)
                && object.is_none_or(|o| *o == t.object)
        })
    }
}

impl TripleSource for HypotheticalGraph<'_> {
    fn exists(&self, subject: &Term, predicate: &Iri, object: &Term) -> bool {
        self.base.exists(subject, predicate, object)
            || self
                .extra_matches(Some(subject), Some(predicate), Some(object))
                .is_some()
    }

    fn matching(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Iri>,
        object: Option<&Term>,
    ) -> Vec<Triple> {
        let mut triples = self.base.matching(subject, predicate, object);
        if let Some(extra) = self.extra_matches(subject, predicate, object) {
            let pos = triples.binary_search(extra).unwrap_or_else(|p| p);
            triples.insert(pos, extra.clone());
        }
        triples
    }

    fn len(&self) -> usize {
        self.base.len() + usize::from(self.extra.is_some())
    }
}
