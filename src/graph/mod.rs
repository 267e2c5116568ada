//! Knowledge Graph: immutable, indexed triple store with hypothetical overlays.
//!
//! - **Data model** ([`Iri`], [`Literal`], [`Term`], [`Triple`]): structural value types
//! - **Store** ([`KnowledgeGraph`]): petgraph adjacency plus predicate and
//!   subject/predicate indexes, loaded atomically
//! - **Overlay** ([`HypotheticalGraph`]): the store plus one candidate triple
//! - **Loading** ([`rdf`]): Turtle / N-Triples / RDF-XML through oxigraph
//! - **Retrieval** ([`traverse`]): bounded breadth-first neighbourhoods
//!
//! Every reader goes through the [`TripleSource`] trait, so the validator and the
//! retriever work the same over the base store and over an overlay.

pub mod index;
pub mod overlay;
pub mod rdf;
pub mod traverse;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::GraphLoadError;

pub use index::KnowledgeGraph;
pub use overlay::HypotheticalGraph;

/// `rdf:type`.
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
/// Namespace of the XML Schema datatypes.
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
/// `xsd:string`, the datatype of plain literals.
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
/// `rdf:langString`, the datatype of language-tagged literals.
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

/// An IRI. Cheap to clone; validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Iri(Arc<str>);

impl Iri {
    /// Create an IRI, rejecting empty strings and characters IRIs may not contain.
    pub fn new(value: impl AsRef<str>) -> Result<Self, GraphLoadError> {
        let value = value.as_ref();
        let invalid = value.is_empty()
            || value
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\'));
        if invalid {
            return Err(GraphLoadError::InvalidIri {
                iri: value.to_string(),
            });
        }
        Ok(Self(Arc::from(value)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The local name: the part after the last `#`, or after the last `/`.
    pub fn local_name(&self) -> &str {
        let s = self.as_str();
        if let Some((_, tail)) = s.rsplit_once('#') {
            return tail;
        }
        match s.rsplit_once('/') {
            Some((_, tail)) if !tail.is_empty() => tail,
            _ => s,
        }
    }
}

impl TryFrom<String> for Iri {
    type Error = GraphLoadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Iri::new(value)
    }
}

impl From<Iri> for String {
    fn from(iri: Iri) -> Self {
        iri.0.to_string()
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// An RDF literal: lexical form, datatype and optional language tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    pub lexical: String,
    pub datatype: Iri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Literal {
    /// A plain `xsd:string` literal.
    pub fn string(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: Iri(Arc::from(XSD_STRING)),
            language: None,
        }
    }

    /// A literal with an explicit datatype.
    pub fn typed(lexical: impl Into<String>, datatype: Iri) -> Self {
        Self {
            lexical: lexical.into(),
            datatype,
            language: None,
        }
    }

    /// A literal whose datatype is in the XSD namespace, e.g. `xsd("1861", "gYear")`.
    pub fn xsd(lexical: impl Into<String>, local: &str) -> Self {
        Self::typed(lexical, Iri(Arc::from(format!("{XSD}{local}"))))
    }
}

/// A node or value in a triple. Ordering is `Iri < Blank < Literal`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Term {
    Iri(Iri),
    Blank(String),
    Literal(Literal),
}

impl Term {
    /// Shorthand for an IRI term.
    pub fn iri(value: impl AsRef<str>) -> Result<Self, GraphLoadError> {
        Iri::new(value).map(Term::Iri)
    }

    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }
}

impl From<Iri> for Term {
    fn from(iri: Iri) -> Self {
        Term::Iri(iri)
    }
}

impl From<Literal> for Term {
    fn from(lit: Literal) -> Self {
        Term::Literal(lit)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => iri.fmt(f),
            Term::Blank(id) => write!(f, "_:{id}"),
            Term::Literal(lit) => {
                f.write_str("\"")?;
                for c in lit.lexical.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        '\t' => f.write_str("\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")?;
                if let Some(lang) = &lit.language {
                    write!(f, "@{lang}")
                } else if lit.datatype.as_str() != XSD_STRING {
                    write!(f, "^^{}", lit.datatype)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// A triple (subject, predicate, object). Equality and ordering are structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    /// IRI or blank node.
    pub subject: Term,
    pub predicate: Iri,
    /// IRI, blank node or literal.
    pub object: Term,
}

impl Triple {
    /// Create a triple. Use [`Triple::check`] (or load it into a graph) to enforce
    /// that the subject is not a literal.
    pub fn new(subject: impl Into<Term>, predicate: Iri, object: impl Into<Term>) -> Self {
        Self {
            subject: subject.into(),
            predicate,
            object: object.into(),
        }
    }

    /// Shorthand for an all-IRI triple, e.g. in tests and fixtures.
    pub fn iris(subject: &str, predicate: &str, object: &str) -> Result<Self, GraphLoadError> {
        Ok(Self::new(Iri::new(subject)?, Iri::new(predicate)?, Iri::new(object)?))
    }

    /// Reject triples whose subject is a literal.
    pub fn check(&self) -> Result<(), GraphLoadError> {
        if self.subject.is_literal() {
            return Err(GraphLoadError::MalformedTriple {
                message: format!("literal subject in {self}"),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// Read access shared by the store, its overlays and retrieved subgraphs.
///
/// All sequence-returning methods return results sorted by subject, then
/// predicate, then object.
pub trait TripleSource: Send + Sync {
    /// Whether exactly this triple is present.
    fn exists(&self, subject: &Term, predicate: &Iri, object: &Term) -> bool;

    /// All triples matching the pattern; `None` is a wildcard.
    fn matching(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Iri>,
        object: Option<&Term>,
    ) -> Vec<Triple>;

    /// Number of triples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the triple is present.
    fn contains(&self, triple: &Triple) -> bool {
        self.exists(&triple.subject, &triple.predicate, &triple.object)
    }

    /// Objects of `(subject, predicate, ?)`, sorted.
    fn objects(&self, subject: &Term, predicate: &Iri) -> Vec<Term> {
        self.matching(Some(subject), Some(predicate), None)
            .into_iter()
            .map(|t| t.object)
            .collect()
    }
}
