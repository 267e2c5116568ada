//! Loading triple files through oxigraph.
//!
//! Files are parsed into a scratch in-memory oxigraph store and read back with a
//! single `SELECT ?s ?p ?o` scan of the default graph. Any parse failure aborts
//! the load; callers never see a partially loaded graph.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use oxigraph::io::RdfFormat;
use oxigraph::model::Term as OxTerm;
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;

use crate::error::GraphLoadError;

use super::index::{GraphResult, KnowledgeGraph};
use super::{Iri, Literal, Term, Triple, TripleSource};

/// Pick the RDF serialization from a file extension.
pub fn format_for(path: &Path) -> GraphResult<RdfFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("ttl") | Some("turtle") => Ok(RdfFormat::Turtle),
        Some("nt") => Ok(RdfFormat::NTriples),
        Some("rdf") | Some("owl") | Some("xml") => Ok(RdfFormat::RdfXml),
        _ => Err(GraphLoadError::UnsupportedFormat {
            path: path.display().to_string(),
        }),
    }
}

/// Read all triples from a file, format chosen by extension.
pub fn read_triples(path: &Path) -> GraphResult<Vec<Triple>> {
    let format = format_for(path)?;
    let file = File::open(path).map_err(|source| GraphLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_triples(BufReader::new(file), format, &path.display().to_string())
}

/// Parse triples from any reader. `origin` names the source in error messages.
pub fn parse_triples(
    reader: impl std::io::Read,
    format: RdfFormat,
    origin: &str,
) -> GraphResult<Vec<Triple>> {
    let parse_err = |message: String| GraphLoadError::Parse {
        path: origin.to_string(),
        message,
    };

    let store = Store::new().map_err(|e| parse_err(format!("failed to create oxigraph store: {e}")))?;
    store
        .load_from_reader(format, reader)
        .map_err(|e| parse_err(e.to_string()))?;

    let results = store
        .query("SELECT ?s ?p ?o WHERE { ?s ?p ?o }")
        .map_err(|e| parse_err(format!("triple scan failed: {e}")))?;

    let QueryResults::Solutions(solutions) = results else {
        return Err(parse_err("unexpected result type from triple scan".into()));
    };

    let mut triples = Vec::new();
    for solution in solutions {
        let solution = solution.map_err(|e| parse_err(format!("solution error: {e}")))?;
        let (Some(s), Some(p), Some(o)) = (solution.get("s"), solution.get("p"), solution.get("o"))
        else {
            continue;
        };
        let subject = convert_term(s)?;
        let predicate = match convert_term(p)? {
            Term::Iri(iri) => iri,
            other => {
                return Err(GraphLoadError::MalformedTriple {
                    message: format!("non-IRI predicate {other}"),
                });
            }
        };
        let triple = Triple::new(subject, predicate, convert_term(o)?);
        triple.check()?;
        triples.push(triple);
    }
    Ok(triples)
}

/// Load a file straight into an immutable graph.
pub fn load_graph(path: &Path) -> GraphResult<KnowledgeGraph> {
    let triples = read_triples(path)?;
    let graph = KnowledgeGraph::load(triples)?;
    tracing::info!(
        path = %path.display(),
        triples = graph.len(),
        nodes = graph.node_count(),
        "loaded knowledge graph"
    );
    Ok(graph)
}

fn convert_term(term: &OxTerm) -> GraphResult<Term> {
    match term {
        OxTerm::NamedNode(node) => Ok(Term::Iri(Iri::new(node.as_str())?)),
        OxTerm::BlankNode(node) => Ok(Term::Blank(node.as_str().to_string())),
        OxTerm::Literal(lit) => Ok(Term::Literal(Literal {
            lexical: lit.value().to_string(),
            datatype: Iri::new(lit.datatype().as_str())?,
            language: lit.language().map(str::to_string),
        })),
        #[allow(unreachable_patterns)]
        other => Err(GraphLoadError::MalformedTriple {
            message: format!("unsupported term {other}"),
        }),
    }
}
