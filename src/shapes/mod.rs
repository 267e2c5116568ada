//! Constraint shapes: declared rules valid data must satisfy.
//!
//! A [`ShapeSet`] is compiled once (from a SHACL-subset Turtle file via [`parse`],
//! or built in code) and then shared read-only. Each [`ConstraintShape`] selects
//! focus nodes through its [`Target`]s and evaluates its [`Rule`]s in declaration
//! order. Rules are pure functions of the graph state.

pub mod parse;
pub mod validate;
pub mod value;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::{Iri, Term};

pub use validate::{ValidationReport, Validator, ValidatorConfig, Violation};

/// Identifier of a shape: its IRI, or a generated `_:shape<N>` id for unnamed shapes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(pub String);

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShapeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Focus-node selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Every subject typed with this class.
    Class(Iri),
    /// Every subject of this property.
    SubjectsOf(Iri),
    /// Every non-literal object of this property.
    ObjectsOf(Iri),
    /// One explicit node.
    Node(Term),
}

/// How bad a violation is. Only [`Severity::Violation`] is a hard violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Violation,
    Warning,
    Info,
}

impl Severity {
    pub fn is_hard(self) -> bool {
        self == Severity::Violation
    }
}

/// Comparison between two properties of the same focus node: `left op right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl CompareOp {
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::LessThan => ordering == Less,
            CompareOp::LessThanOrEqual => ordering != Greater,
            CompareOp::GreaterThan => ordering == Greater,
            CompareOp::GreaterThanOrEqual => ordering != Less,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::LessThan => "<",
            CompareOp::LessThanOrEqual => "<=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterThanOrEqual => ">=",
        }
    }
}

/// An interval-valued property, given by its start and end properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalPath {
    pub start: Iri,
    /// A missing end value means the interval is open towards +infinity.
    pub end: Iri,
}

/// Whether two intervals must overlap or must be disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapExpectation {
    Overlap,
    Disjoint,
}

/// One constraint on a focus node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    /// Number of values of `path` lies within `[min, max]`.
    Cardinality {
        path: Iri,
        min: Option<usize>,
        max: Option<usize>,
    },
    /// Every value of `path` is a literal of `datatype`.
    Datatype { path: Iri, datatype: Iri },
    /// Every value pair of `left` and `right` satisfies `op`.
    Comparison { left: Iri, op: CompareOp, right: Iri },
    /// The two intervals overlap (or are disjoint).
    TemporalOverlap {
        left: IntervalPath,
        right: IntervalPath,
        expect: OverlapExpectation,
    },
}

impl Rule {
    /// Short human-readable description used in default messages.
    pub fn describe(&self) -> String {
        match self {
            Rule::Cardinality { path, min, max } => {
                let min = min.map(|m| m.to_string()).unwrap_or_else(|| "0".into());
                let max = max.map(|m| m.to_string()).unwrap_or_else(|| "*".into());
                format!("{} has [{min}..{max}] values", path.local_name())
            }
            Rule::Datatype { path, datatype } => {
                format!("{} values are {}", path.local_name(), datatype.local_name())
            }
            Rule::Comparison { left, op, right } => {
                format!("{} {} {}", left.local_name(), op.symbol(), right.local_name())
            }
            Rule::TemporalOverlap {
                left,
                right,
                expect,
            } => {
                let verb = match expect {
                    OverlapExpectation::Overlap => "overlaps",
                    OverlapExpectation::Disjoint => "is disjoint from",
                };
                format!(
                    "[{}, {}] {verb} [{}, {}]",
                    left.start.local_name(),
                    left.end.local_name(),
                    right.start.local_name(),
                    right.end.local_name()
                )
            }
        }
    }
}

/// A declared shape: targets plus an ordered list of rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintShape {
    pub id: ShapeId,
    /// Focus nodes are the union of all targets.
    pub targets: Vec<Target>,
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub severity: Severity,
    /// Stop at a focus node's first hard violation.
    #[serde(default)]
    pub fail_fast: bool,
    /// Overrides the generated violation message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Per-rule message overrides, keyed by rule index.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rule_messages: BTreeMap<usize, String>,
}

impl ConstraintShape {
    pub fn new(id: impl Into<ShapeId>, target: Target) -> Self {
        Self {
            id: id.into(),
            targets: vec![target],
            rules: Vec::new(),
            severity: Severity::Violation,
            fail_fast: false,
            message: None,
            rule_messages: BTreeMap::new(),
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// The declared message for a rule: its own, else the shape's.
    pub fn message_for(&self, rule_index: usize) -> Option<&str> {
        self.rule_messages
            .get(&rule_index)
            .or(self.message.as_ref())
            .map(String::as_str)
    }
}

/// An immutable collection of shapes, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeSet {
    shapes: Vec<ConstraintShape>,
}

impl ShapeSet {
    pub fn new(shapes: Vec<ConstraintShape>) -> Self {
        Self { shapes }
    }

    pub fn shapes(&self) -> &[ConstraintShape] {
        &self.shapes
    }

    pub fn get(&self, id: &ShapeId) -> Option<&ConstraintShape> {
        self.shapes.iter().find(|s| &s.id == id)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Total number of rules across all shapes.
    pub fn rule_count(&self) -> usize {
        self.shapes.iter().map(|s| s.rules.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn compare_ops() {
        assert!(CompareOp::GreaterThan.holds(Ordering::Greater));
        assert!(!CompareOp::GreaterThan.holds(Ordering::Equal));
        assert!(CompareOp::GreaterThanOrEqual.holds(Ordering::Equal));
        assert!(CompareOp::LessThan.holds(Ordering::Less));
        assert!(CompareOp::LessThanOrEqual.holds(Ordering::Equal));
        assert!(!CompareOp::LessThanOrEqual.holds(Ordering::Greater));
    }

    #[test]
    fn only_violation_is_hard() {
        assert!(Severity::Violation.is_hard());
        assert!(!Severity::Warning.is_hard());
        assert!(!Severity::Info.is_hard());
    }

    #[test]
    fn rule_descriptions() {
        let rule = Rule::Cardinality {
            path: Iri::new("http://ex#hasMouth").unwrap(),
            min: None,
            max: Some(1),
        };
        assert_eq!(rule.describe(), "hasMouth has [0..1] values");

        let cmp = Rule::Comparison {
            left: Iri::new("http://ex#sourceElevation").unwrap(),
            op: CompareOp::GreaterThan,
            right: Iri::new("http://ex#mouthElevation").unwrap(),
        };
        assert_eq!(cmp.describe(), "sourceElevation > mouthElevation");
    }

    #[test]
    fn shape_set_lookup() {
        let shape = ConstraintShape::new("RiverShape", Target::Class(Iri::new("River").unwrap()))
            .with_rule(Rule::Cardinality {
                path: Iri::new("hasMouth").unwrap(),
                min: None,
                max: Some(1),
            });
        let set = ShapeSet::new(vec![shape]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.rule_count(), 1);
        assert!(set.get(&ShapeId::from("RiverShape")).is_some());
        assert!(set.get(&ShapeId::from("Other")).is_none());
    }
}
