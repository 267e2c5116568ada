//! Engine facade: top-level API for worldmind.
//!
//! The `Engine` is built once at startup and owns the immutable context every
//! operation reads: the knowledge graph, the compiled shapes, the configuration
//! and the licensing oracle over them.

use std::path::Path;
use std::sync::Arc;

use crate::config::{EngineConfig, ExtractorKind, SystemConfig};
use crate::error::{ConfigError, WmResult};
use crate::extract::{BoundedExtractor, CardClaimExtractor, ClaimExtractor, HttpClaimExtractor};
use crate::graph::traverse::{self, RetrievalConfig, Subgraph};
use crate::graph::{KnowledgeGraph, Term, TripleSource, rdf};
use crate::harness::Harness;
use crate::oracle::{Claim, Decision, LicensingOracle};
use crate::shapes::{self, ShapeSet, ValidationReport, Validator};
use crate::system::{ConstantSystem, ContextOracleSystem, EvaluationSystem, HttpSystem, LicensingSystem};

/// The worldmind engine.
pub struct Engine {
    config: EngineConfig,
    graph: Arc<KnowledgeGraph>,
    shapes: Arc<ShapeSet>,
    oracle: Arc<LicensingOracle>,
}

impl Engine {
    /// Load the graph and shapes named in the configuration.
    pub fn load(config: EngineConfig) -> WmResult<Self> {
        config.validate()?;
        let graph_path = config.graph.clone().ok_or_else(|| ConfigError::Invalid {
            message: "no knowledge graph file given (set `graph` or pass --graph)".into(),
        })?;
        let graph = rdf::load_graph(&graph_path)?;
        let shapes = match &config.shapes {
            Some(path) => shapes::parse::load_shapes(path)?,
            None => ShapeSet::default(),
        };
        Self::from_parts(graph, shapes, config)
    }

    /// Build an engine over an already loaded graph and shape set.
    pub fn from_parts(graph: KnowledgeGraph, shapes: ShapeSet, config: EngineConfig) -> WmResult<Self> {
        config.validate()?;
        tracing::info!(
            triples = graph.len(),
            nodes = graph.node_count(),
            shapes = shapes.len(),
            rules = shapes.rule_count(),
            "initializing worldmind engine"
        );
        let graph = Arc::new(graph);
        let shapes = Arc::new(shapes);
        let oracle = Arc::new(LicensingOracle::new(
            Arc::clone(&graph),
            Arc::clone(&shapes),
            config.oracle.clone(),
        ));
        Ok(Self {
            config,
            graph,
            shapes,
            oracle,
        })
    }

    /// Validate the whole graph against the shapes.
    pub fn validate(&self) -> ValidationReport {
        let report = Validator::new(self.config.validator.clone()).validate(self.graph.as_ref(), &self.shapes);
        tracing::info!(
            conforms = report.conforms,
            violations = report.violations.len(),
            skipped = report.skipped.len(),
            "validated graph"
        );
        report
    }

    /// Bounded neighbourhood of `seed`, with the configured limits unless
    /// `limits` overrides them.
    pub fn retrieve(&self, seed: &Term, limits: Option<&RetrievalConfig>) -> Subgraph {
        traverse::retrieve(self.graph.as_ref(), seed, limits.unwrap_or(&self.config.retrieval))
    }

    /// Decide one claim against a set of facts.
    pub fn check(&self, claim: &Claim, facts: &[String]) -> Decision {
        self.oracle.evaluate(claim, facts)
    }

    pub fn oracle(&self) -> Arc<LicensingOracle> {
        Arc::clone(&self.oracle)
    }

    /// The configured claim extractor. Remote extractors are bounded by the
    /// extraction timeout.
    pub fn extractor(&self) -> Arc<dyn ClaimExtractor> {
        let extractor = &self.config.extractor;
        match extractor.kind {
            ExtractorKind::Card => Arc::new(CardClaimExtractor),
            ExtractorKind::Http => {
                let http = HttpClaimExtractor::new(
                    extractor.endpoint.clone().unwrap_or_default(),
                    extractor.timeout(),
                );
                Arc::new(BoundedExtractor::new(Arc::new(http), extractor.timeout()))
            }
        }
    }

    /// The configured systems under evaluation, in configuration order.
    pub fn systems(&self) -> Vec<Arc<dyn EvaluationSystem>> {
        self.config
            .systems
            .iter()
            .map(|system| -> Arc<dyn EvaluationSystem> {
                let name = system.name().to_string();
                match system {
                    SystemConfig::Licensing { .. } => {
                        Arc::new(LicensingSystem::new(self.extractor(), self.oracle()).named(name))
                    }
                    SystemConfig::Context { .. } => Arc::new(ContextOracleSystem::new().named(name)),
                    SystemConfig::Constant { verdict, .. } => Arc::new(ConstantSystem::new(name, *verdict)),
                    SystemConfig::Http {
                        endpoint,
                        timeout_ms,
                        ..
                    } => Arc::new(HttpSystem::new(
                        name,
                        endpoint.clone(),
                        std::time::Duration::from_millis(*timeout_ms),
                    )),
                }
            })
            .collect()
    }

    /// A batch harness over the configured systems.
    pub fn harness(&self) -> Harness {
        Harness::new(self.systems()).with_threads(self.config.batch.threads)
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn shapes(&self) -> &ShapeSet {
        &self.shapes
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Counts describing the loaded context.
    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            triple_count: self.graph.len(),
            node_count: self.graph.node_count(),
            predicate_count: self.graph.predicates().len(),
            shape_count: self.shapes.len(),
            rule_count: self.shapes.rule_count(),
            systems: self.config.systems.iter().map(|s| s.name().to_string()).collect(),
        }
    }
}

/// Load a config file, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> WmResult<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

/// Summary of the loaded context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineInfo {
    pub triple_count: usize,
    pub node_count: usize,
    pub predicate_count: usize,
    pub shape_count: usize,
    pub rule_count: usize,
    pub systems: Vec<String>,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "worldmind engine info")?;
        writeln!(f, "  triples:      {}", self.triple_count)?;
        writeln!(f, "  nodes:        {}", self.node_count)?;
        writeln!(f, "  predicates:   {}", self.predicate_count)?;
        writeln!(f, "  shapes:       {}", self.shape_count)?;
        writeln!(f, "  rules:        {}", self.rule_count)?;
        writeln!(f, "  systems:      {}", self.systems.join(", "))?;
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("graph", &self.graph)
            .field("shapes", &self.shapes.len())
            .field("systems", &self.config.systems.len())
            .finish()
    }
}
