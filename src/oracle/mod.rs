//! Licensing Oracle: decides whether a claim may be asserted.
//!
//! Each claim runs through four checks, in a fixed order:
//!
//! 1. **Explicit contradiction**: the card's facts negate exactly this claim
//! 2. **Entailment**: the claim's triple is in the graph
//! 3. **Constraint violation**: adding the claim to the graph introduces a hard
//!    violation on one of its focus nodes
//! 4. **Default**: insufficient evidence (absence is not falsehood)
//!
//! Only step 2 can license an answer. Errors while evaluating one claim are
//! logged and resolve to insufficient evidence, never to an answer.

pub mod negation;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::OracleError;
use crate::graph::traverse::{self, RetrievalConfig};
use crate::graph::{Iri, KnowledgeGraph, Term, Triple, TripleSource};
use crate::shapes::{ShapeId, ShapeSet, Validator};

pub use negation::NegationMatcher;

// ---------------------------------------------------------------------------
// Claims and decisions
// ---------------------------------------------------------------------------

/// A candidate assertion. `negated` is set by extractors that saw the context
/// state the opposite explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    pub subject: Iri,
    pub predicate: Iri,
    pub object: Term,
    #[serde(default)]
    pub negated: bool,
}

impl Claim {
    pub fn new(subject: Iri, predicate: Iri, object: impl Into<Term>) -> Self {
        Self {
            subject,
            predicate,
            object: object.into(),
            negated: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }

    /// The claim as a candidate triple.
    pub fn triple(&self) -> Triple {
        Triple::new(self.subject.clone(), self.predicate.clone(), self.object.clone())
    }

    /// Nodes whose shapes the claim can affect: the subject, and the object
    /// unless it is a literal.
    pub fn focus_nodes(&self) -> Vec<Term> {
        let mut nodes = vec![Term::Iri(self.subject.clone())];
        if !self.object.is_literal() && self.object != nodes[0] {
            nodes.push(self.object.clone());
        }
        nodes
    }

    fn check(&self) -> Result<(), OracleError> {
        if let Term::Blank(id) = &self.object {
            return Err(OracleError::InvalidClaim {
                message: format!("blank node object _:{id} in claim about {}", self.subject),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("NOT ")?;
        }
        write!(f, "({} {} {})", self.subject, self.predicate, self.object)
    }
}

/// Whether a claim may be asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Answer,
    Abstain,
}

/// Why a decision was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    EntailedReason,
    ExplicitContradiction,
    ConstraintViolation,
    InsufficientEvidence,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::EntailedReason => "EntailedReason",
            Reason::ExplicitContradiction => "ExplicitContradiction",
            Reason::ConstraintViolation => "ConstraintViolation",
            Reason::InsufficientEvidence => "InsufficientEvidence",
        };
        f.write_str(s)
    }
}

/// What a decision rests on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Evidence {
    /// A triple of the graph (or the claim itself, when flagged negated).
    Triple(Triple),
    /// A shape the claim would violate.
    Shape(ShapeId),
    /// A card fact negating the claim.
    Fact(String),
}

/// The outcome for one claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub reason: Reason,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

impl Decision {
    pub fn entailed(triple: Triple) -> Self {
        Self {
            action: Action::Answer,
            reason: Reason::EntailedReason,
            evidence: vec![Evidence::Triple(triple)],
        }
    }

    pub fn contradicted(evidence: Evidence) -> Self {
        Self {
            action: Action::Abstain,
            reason: Reason::ExplicitContradiction,
            evidence: vec![evidence],
        }
    }

    pub fn violated(shapes: Vec<ShapeId>) -> Self {
        Self {
            action: Action::Abstain,
            reason: Reason::ConstraintViolation,
            evidence: shapes.into_iter().map(Evidence::Shape).collect(),
        }
    }

    pub fn insufficient() -> Self {
        Self {
            action: Action::Abstain,
            reason: Reason::InsufficientEvidence,
            evidence: Vec::new(),
        }
    }

    pub fn is_answer(&self) -> bool {
        self.action == Action::Answer
    }
}

/// A claim with its decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimDecision {
    pub claim: Claim,
    pub decision: Decision,
}

/// The card-level outcome: `ANSWER` iff every claim is `ANSWER`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDecision {
    pub decision: Decision,
    pub claims: Vec<ClaimDecision>,
    /// Retrieved neighbourhood of the first claim's subject, when configured.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<Triple>,
}

impl CardDecision {
    /// Aggregate per-claim decisions.
    ///
    /// All answers: the card answers, with every claim's evidence. Otherwise the
    /// first non-answer decides. No claims at all: insufficient evidence.
    pub fn aggregate(claims: Vec<ClaimDecision>) -> Self {
        let decision = if claims.is_empty() {
            Decision::insufficient()
        } else if let Some(first) = claims.iter().find(|c| !c.decision.is_answer()) {
            first.decision.clone()
        } else {
            Decision {
                action: Action::Answer,
                reason: Reason::EntailedReason,
                evidence: claims
                    .iter()
                    .flat_map(|c| c.decision.evidence.iter().cloned())
                    .collect(),
            }
        };
        Self {
            decision,
            claims,
            context: Vec::new(),
        }
    }

    pub fn action(&self) -> Action {
        self.decision.action
    }

    pub fn reason(&self) -> Reason {
        self.decision.reason
    }
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// Oracle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Compare predicates when matching negating facts.
    pub match_predicate: bool,
    /// Attach a retrieved neighbourhood of this many hops to card decisions.
    pub context_hops: Option<usize>,
    /// Triple budget for that neighbourhood.
    pub context_max_triples: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            match_predicate: true,
            context_hops: None,
            context_max_triples: 200,
        }
    }
}

/// Identifies one hard violation independently of its message.
type ViolationKey = (ShapeId, usize, Term);

/// The licensing gate over one immutable graph and shape set.
///
/// Shared by reference across workers. The only interior state is the cache of
/// violations already present in the base graph, keyed by focus node.
pub struct LicensingOracle {
    graph: Arc<KnowledgeGraph>,
    shapes: Arc<ShapeSet>,
    validator: Validator,
    negation: NegationMatcher,
    config: OracleConfig,
    baseline: DashMap<Term, Arc<BTreeSet<ViolationKey>>>,
}

impl LicensingOracle {
    pub fn new(graph: Arc<KnowledgeGraph>, shapes: Arc<ShapeSet>, config: OracleConfig) -> Self {
        Self {
            graph,
            shapes,
            validator: Validator::collect_all(),
            negation: NegationMatcher::new(config.match_predicate),
            config,
            baseline: DashMap::new(),
        }
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn shapes(&self) -> &ShapeSet {
        &self.shapes
    }

    /// Decide one claim against the card's facts.
    pub fn evaluate(&self, claim: &Claim, facts: &[String]) -> Decision {
        let decision = self.try_evaluate(claim, facts).unwrap_or_else(|err| {
            tracing::warn!(claim = %claim, error = %err, "claim evaluation failed");
            Decision::insufficient()
        });
        tracing::debug!(
            claim = %claim,
            action = ?decision.action,
            reason = %decision.reason,
            "claim decided"
        );
        decision
    }

    fn try_evaluate(&self, claim: &Claim, facts: &[String]) -> Result<Decision, OracleError> {
        claim.check()?;

        if claim.negated {
            return Ok(Decision::contradicted(Evidence::Triple(claim.triple())));
        }
        if let Some(fact) = self.negation.find(claim, facts) {
            return Ok(Decision::contradicted(Evidence::Fact(fact.to_string())));
        }

        let triple = claim.triple();
        if self.graph.contains(&triple) {
            return Ok(Decision::entailed(triple));
        }

        let violated = self.new_violations(claim);
        if !violated.is_empty() {
            return Ok(Decision::violated(violated));
        }

        Ok(Decision::insufficient())
    }

    /// Shapes with hard violations the claim would introduce on its focus nodes.
    fn new_violations(&self, claim: &Claim) -> Vec<ShapeId> {
        if self.shapes.is_empty() {
            return Vec::new();
        }
        let focus = claim.focus_nodes();
        let overlay = self.graph.hypothetical(claim.triple());
        let report = self.validator.validate_nodes(&overlay, &self.shapes, &focus);

        let mut shapes = Vec::new();
        for violation in report.hard_violations() {
            let baseline = self.baseline_for(&violation.focus_node);
            let key = (
                violation.shape_id.clone(),
                violation.rule_index,
                violation.focus_node.clone(),
            );
            if !baseline.contains(&key) && !shapes.contains(&violation.shape_id) {
                shapes.push(violation.shape_id.clone());
            }
        }
        shapes
    }

    fn baseline_for(&self, node: &Term) -> Arc<BTreeSet<ViolationKey>> {
        if let Some(cached) = self.baseline.get(node) {
            return Arc::clone(cached.value());
        }
        let report = self
            .validator
            .validate_nodes(self.graph.as_ref(), &self.shapes, std::slice::from_ref(node));
        let keys: BTreeSet<ViolationKey> = report
            .hard_violations()
            .map(|v| (v.shape_id.clone(), v.rule_index, v.focus_node.clone()))
            .collect();
        Arc::clone(
            self.baseline
                .entry(node.clone())
                .or_insert_with(|| Arc::new(keys))
                .value(),
        )
    }

    /// Decide every claim of a card and aggregate.
    pub fn evaluate_card(&self, claims: &[Claim], facts: &[String]) -> CardDecision {
        let decisions = claims
            .iter()
            .map(|claim| ClaimDecision {
                claim: claim.clone(),
                decision: self.evaluate(claim, facts),
            })
            .collect();
        let mut card = CardDecision::aggregate(decisions);

        if let (Some(hops), Some(first)) = (self.config.context_hops, claims.first()) {
            let retrieval = RetrievalConfig {
                max_hops: hops,
                max_triples: self.config.context_max_triples,
            };
            let seed = Term::Iri(first.subject.clone());
            card.context = traverse::retrieve(self.graph.as_ref(), &seed, &retrieval).triples;
        }
        card
    }
}

impl fmt::Debug for LicensingOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicensingOracle")
            .field("graph", &self.graph)
            .field("shapes", &self.shapes.len())
            .field("cached_nodes", &self.baseline.len())
            .finish()
    }
}
