//! Constraint Validator: evaluates a [`ShapeSet`] against any [`TripleSource`].
//!
//! For each shape the focus nodes are selected from its targets (sorted, so the
//! report order is stable), then each rule runs in declaration order. A rule that
//! cannot be evaluated is recorded as skipped, never as a violation. Validation
//! reads no clock and no randomness: same inputs, same report.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidatorInternalError;
use crate::graph::{Iri, RDF_TYPE, Term, TripleSource};

use super::value::{Interval, OrderedValue};
use super::{ConstraintShape, OverlapExpectation, Rule, Severity, ShapeId, ShapeSet, Target};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// When to stop evaluating a focus node after its first hard violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailFastMode {
    /// Follow each shape's own `fail_fast` flag.
    #[default]
    PerShape,
    /// Every shape is fail-fast.
    Always,
    /// Collect every violation, for diagnostics.
    Never,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub fail_fast: FailFastMode,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// One failed rule on one focus node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub focus_node: Term,
    pub shape_id: ShapeId,
    /// Index of the rule within its shape.
    pub rule_index: usize,
    pub severity: Severity,
    pub message: String,
}

impl Violation {
    pub fn is_hard(&self) -> bool {
        self.severity.is_hard()
    }
}

/// A rule that could not be evaluated and was treated as not applicable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRule {
    pub focus_node: Term,
    pub shape_id: ShapeId,
    pub rule_index: usize,
    pub reason: String,
}

/// Result of one validation call. Built fresh per call, never mutated after.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when there is no hard violation.
    pub conforms: bool,
    pub violations: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedRule>,
}

impl ValidationReport {
    fn new(violations: Vec<Violation>, skipped: Vec<SkippedRule>) -> Self {
        let conforms = !violations.iter().any(Violation::is_hard);
        Self {
            conforms,
            violations,
            skipped,
        }
    }

    pub fn hard_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_hard())
    }

    /// Shapes with at least one hard violation, in report order, without repeats.
    pub fn violated_shapes(&self) -> Vec<ShapeId> {
        let mut seen = BTreeSet::new();
        self.hard_violations()
            .filter(|v| seen.insert(v.shape_id.clone()))
            .map(|v| v.shape_id.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Stateless validator; cheap to clone and share across workers.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// A validator that never short-circuits.
    pub fn collect_all() -> Self {
        Self::new(ValidatorConfig {
            fail_fast: FailFastMode::Never,
        })
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate every targeted focus node of every shape.
    pub fn validate(&self, source: &impl TripleSource, shapes: &ShapeSet) -> ValidationReport {
        let mut violations = Vec::new();
        let mut skipped = Vec::new();
        for shape in shapes.shapes() {
            for focus in focus_nodes(source, &shape.targets) {
                self.check_focus(source, shape, &focus, &mut violations, &mut skipped);
            }
        }
        tracing::debug!(
            shapes = shapes.len(),
            violations = violations.len(),
            skipped = skipped.len(),
            "validated graph"
        );
        ValidationReport::new(violations, skipped)
    }

    /// Validate only the given nodes, against the shapes that target them.
    pub fn validate_nodes(
        &self,
        source: &impl TripleSource,
        shapes: &ShapeSet,
        nodes: &[Term],
    ) -> ValidationReport {
        let nodes: BTreeSet<&Term> = nodes.iter().collect();
        let mut violations = Vec::new();
        let mut skipped = Vec::new();
        for shape in shapes.shapes() {
            for focus in &nodes {
                if shape.targets.iter().any(|t| is_targeted(source, t, focus)) {
                    self.check_focus(source, shape, focus, &mut violations, &mut skipped);
                }
            }
        }
        ValidationReport::new(violations, skipped)
    }

    fn fail_fast(&self, shape: &ConstraintShape) -> bool {
        match self.config.fail_fast {
            FailFastMode::PerShape => shape.fail_fast,
            FailFastMode::Always => true,
            FailFastMode::Never => false,
        }
    }

    fn check_focus(
        &self,
        source: &impl TripleSource,
        shape: &ConstraintShape,
        focus: &Term,
        violations: &mut Vec<Violation>,
        skipped: &mut Vec<SkippedRule>,
    ) {
        for (rule_index, rule) in shape.rules.iter().enumerate() {
            match check_rule(source, rule, focus) {
                Ok(None) => {}
                Ok(Some(detail)) => {
                    let message = match shape.message_for(rule_index) {
                        Some(declared) => declared.to_string(),
                        None => format!("{}: {detail}", rule.describe()),
                    };
                    violations.push(Violation {
                        focus_node: focus.clone(),
                        shape_id: shape.id.clone(),
                        rule_index,
                        severity: shape.severity,
                        message,
                    });
                    if shape.severity.is_hard() && self.fail_fast(shape) {
                        return;
                    }
                }
                Err(err) => {
                    tracing::debug!(
                        shape = %shape.id,
                        focus = %focus,
                        rule_index,
                        error = %err,
                        "rule not applicable"
                    );
                    skipped.push(SkippedRule {
                        focus_node: focus.clone(),
                        shape_id: shape.id.clone(),
                        rule_index,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }
}

/// Validate with the default configuration.
pub fn validate(source: &impl TripleSource, shapes: &ShapeSet) -> ValidationReport {
    Validator::default().validate(source, shapes)
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

fn rdf_type() -> Option<Iri> {
    Iri::new(RDF_TYPE).ok()
}

/// Union of the focus nodes of all targets, sorted.
fn focus_nodes(source: &impl TripleSource, targets: &[Target]) -> BTreeSet<Term> {
    let mut nodes = BTreeSet::new();
    for target in targets {
        match target {
            Target::Class(class) => {
                if let Some(rdf_type) = rdf_type() {
                    let class = Term::Iri(class.clone());
                    nodes.extend(
                        source
                            .matching(None, Some(&rdf_type), Some(&class))
                            .into_iter()
                            .map(|t| t.subject),
                    );
                }
            }
            Target::SubjectsOf(p) => {
                nodes.extend(source.matching(None, Some(p), None).into_iter().map(|t| t.subject));
            }
            Target::ObjectsOf(p) => {
                nodes.extend(
                    source
                        .matching(None, Some(p), None)
                        .into_iter()
                        .map(|t| t.object)
                        .filter(|o| !o.is_literal()),
                );
            }
            Target::Node(node) => {
                nodes.insert(node.clone());
            }
        }
    }
    nodes
}

fn is_targeted(source: &impl TripleSource, target: &Target, node: &Term) -> bool {
    match target {
        Target::Class(class) => {
            rdf_type().is_some_and(|t| source.exists(node, &t, &Term::Iri(class.clone())))
        }
        Target::SubjectsOf(p) => !source.matching(Some(node), Some(p), None).is_empty(),
        Target::ObjectsOf(p) => {
            !node.is_literal() && !source.matching(None, Some(p), Some(node)).is_empty()
        }
        Target::Node(n) => n == node,
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Evaluate one rule: `Ok(Some(detail))` is a violation, `Ok(None)` a pass or
/// not-applicable, `Err` a rule that could not be evaluated.
fn check_rule(
    source: &impl TripleSource,
    rule: &Rule,
    focus: &Term,
) -> Result<Option<String>, ValidatorInternalError> {
    match rule {
        Rule::Cardinality { path, min, max } => {
            let count = source.objects(focus, path).len();
            let too_few = min.is_some_and(|m| count < m);
            let too_many = max.is_some_and(|m| count > m);
            Ok((too_few || too_many).then(|| format!("{focus} has {count}")))
        }
        Rule::Datatype { path, datatype } => Ok(source
            .objects(focus, path)
            .into_iter()
            .find(|v| v.as_literal().is_none_or(|lit| lit.datatype != *datatype))
            .map(|bad| format!("{focus} has {bad}"))),
        Rule::Comparison { left, op, right } => {
            let lefts = source.objects(focus, left);
            let rights = source.objects(focus, right);
            // Absence of a value is not evidence of a violation.
            if lefts.is_empty() || rights.is_empty() {
                return Ok(None);
            }
            for l in &lefts {
                let lv = OrderedValue::from_term(l)?;
                for r in &rights {
                    let rv = OrderedValue::from_term(r)?;
                    if !op.holds(lv.compare(&rv)?) {
                        return Ok(Some(format!("{focus} has {l} {} {r}", op.symbol())));
                    }
                }
            }
            Ok(None)
        }
        Rule::TemporalOverlap {
            left,
            right,
            expect,
        } => {
            let a = Interval::from_values(
                &source.objects(focus, &left.start),
                &source.objects(focus, &left.end),
            )?;
            let b = Interval::from_values(
                &source.objects(focus, &right.start),
                &source.objects(focus, &right.end),
            )?;
            let (Some(a), Some(b)) = (a, b) else {
                return Ok(None);
            };
            let overlap = a.overlaps(&b)?;
            let violated = match expect {
                OverlapExpectation::Overlap => !overlap,
                OverlapExpectation::Disjoint => overlap,
            };
            Ok(violated.then(|| {
                let state = if overlap { "overlapping" } else { "disjoint" };
                format!("{focus} has {state} intervals")
            }))
        }
    }
}
