// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # worldmind
//!
//! Gates generated factual claims on a knowledge graph and measures how well
//! systems abstain when they should.
//!
//! ## Architecture
//!
//! - **Knowledge graph** (`graph`): immutable indexed triple store (petgraph), RDF
//!   loading via oxigraph, hypothetical overlays and bounded retrieval
//! - **Constraints** (`shapes`): a SHACL subset compiled to rules and a validator
//! - **Licensing** (`oracle`): claim → ANSWER / ABSTAIN with a reason and evidence
//! - **Evaluation** (`card`, `extract`, `system`, `harness`): context cards run
//!   through interchangeable systems in parallel
//! - **Metrics** (`metrics`): confusion matrices and abstention scores
//!
//! ## Library usage
//!
//! ```no_run
//! use worldmind::config::EngineConfig;
//! use worldmind::engine::Engine;
//! use worldmind::graph::{Iri, KnowledgeGraph, Triple};
//! use worldmind::oracle::Claim;
//! use worldmind::shapes::ShapeSet;
//!
//! let graph = KnowledgeGraph::load(vec![
//!     Triple::iris("http://ex/EscanabaRiver", "http://ex/hasMouth", "http://ex/LakeMichigan").unwrap(),
//! ])
//! .unwrap();
//! let engine = Engine::from_parts(graph, ShapeSet::default(), EngineConfig::default()).unwrap();
//! let claim = Claim::new(
//!     Iri::new("http://ex/EscanabaRiver").unwrap(),
//!     Iri::new("http://ex/hasMouth").unwrap(),
//!     Iri::new("http://ex/LakeMichigan").unwrap(),
//! );
//! assert!(engine.check(&claim, &[]).is_answer());
//! ```

pub mod card;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod graph;
pub mod harness;
pub mod metrics;
pub mod oracle;
pub mod shapes;
pub mod system;
