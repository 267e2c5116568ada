//! Compiling a SHACL-subset shapes graph into a [`ShapeSet`].
//!
//! Shapes files are plain RDF and load through the same path as the data graph.
//! Anything outside the supported subset that would change the meaning of a
//! shape (a non-IRI path, an unreadable count) fails the load.

use std::path::Path;

use crate::error::GraphLoadError;
use crate::graph::index::GraphResult;
use crate::graph::{Iri, KnowledgeGraph, RDF_TYPE, Term, TripleSource, rdf};

use super::{
    CompareOp, ConstraintShape, IntervalPath, OverlapExpectation, Rule, Severity, ShapeId,
    ShapeSet, Target,
};

/// SHACL namespace.
pub const SH: &str = "http://www.w3.org/ns/shacl#";
/// Namespace of the worldmind shape extensions.
pub const WM: &str = "http://worldmind.ai/shapes#";
/// Id prefix of shapes declared as blank nodes.
pub const UNNAMED_SHAPE_PREFIX: &str = "_:shape";

/// Read a shapes file and compile it.
pub fn load_shapes(path: &Path) -> GraphResult<ShapeSet> {
    let graph = KnowledgeGraph::load(rdf::read_triples(path)?)?;
    let shapes = compile(&graph)?;
    tracing::info!(
        path = %path.display(),
        shapes = shapes.len(),
        rules = shapes.rule_count(),
        "loaded constraint shapes"
    );
    Ok(shapes)
}

/// Compile every active `sh:NodeShape` in the graph, sorted by shape id.
pub fn compile(graph: &KnowledgeGraph) -> GraphResult<ShapeSet> {
    let node_shape = Term::Iri(sh("NodeShape")?);
    let shape_nodes: Vec<Term> = graph
        .matching(None, Some(&Iri::new(RDF_TYPE)?), Some(&node_shape))
        .into_iter()
        .map(|t| t.subject)
        .collect();

    let mut shapes = Vec::new();
    let mut unnamed = Vec::new();
    for node in shape_nodes {
        let reader = ShapeReader {
            graph,
            id: shape_id(&node),
        };
        if reader.flag(&node, &sh("deactivated")?)? {
            tracing::debug!(shape = %reader.id, "skipping deactivated shape");
            continue;
        }
        let shape = reader.shape(&node)?;
        match node {
            Term::Iri(_) => shapes.push(shape),
            _ => unnamed.push((content_key(&(&shape.targets, &shape.rules, shape.severity)), shape)),
        }
    }

    // Blank node labels change between parses, so unnamed shapes are numbered
    // by their content instead.
    unnamed.sort_by(|a, b| a.0.cmp(&b.0));
    for (index, (_, mut shape)) in unnamed.into_iter().enumerate() {
        shape.id = ShapeId(format!("{UNNAMED_SHAPE_PREFIX}{index}"));
        shapes.push(shape);
    }

    shapes.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(ShapeSet::new(shapes))
}

/// Canonical text of a compiled value, used to order anonymous declarations.
fn content_key<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn sh(local: &str) -> GraphResult<Iri> {
    Iri::new(format!("{SH}{local}"))
}

fn wm(local: &str) -> GraphResult<Iri> {
    Iri::new(format!("{WM}{local}"))
}

fn shape_id(node: &Term) -> ShapeId {
    match node {
        Term::Iri(iri) => ShapeId(iri.as_str().to_string()),
        other => ShapeId(other.to_string()),
    }
}

/// Reads the description of one shape, attributing errors to it.
struct ShapeReader<'a> {
    graph: &'a KnowledgeGraph,
    id: ShapeId,
}

/// A property shape before its rules are flattened into the node shape.
struct PropertyShape {
    order: Option<f64>,
    path: Iri,
    rules: Vec<Rule>,
    message: Option<String>,
}

impl ShapeReader<'_> {
    fn malformed(&self, message: impl Into<String>) -> GraphLoadError {
        GraphLoadError::MalformedShape {
            shape: self.id.to_string(),
            message: message.into(),
        }
    }

    fn shape(&self, node: &Term) -> GraphResult<ConstraintShape> {
        let targets = self.targets(node)?;
        if targets.is_empty() {
            tracing::warn!(shape = %self.id, "shape declares no target and selects no focus nodes");
        }

        let mut properties = Vec::new();
        for prop in self.graph.objects(node, &sh("property")?) {
            properties.push(self.property(&prop)?);
        }
        // Ordered properties first, then by path.
        properties.sort_by(|a, b| {
            let key = |p: &PropertyShape| (p.order.is_none(), p.order.unwrap_or(0.0));
            key(a)
                .partial_cmp(&key(b))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
                .then_with(|| content_key(&a.rules).cmp(&content_key(&b.rules)))
        });

        let mut shape = ConstraintShape {
            id: self.id.clone(),
            targets,
            rules: Vec::new(),
            severity: self.severity(node)?,
            fail_fast: self.flag(node, &wm("failFast")?)?,
            message: self.string(node, &sh("message")?),
            rule_messages: Default::default(),
        };
        for property in properties {
            for rule in property.rules {
                if let Some(message) = &property.message {
                    shape.rule_messages.insert(shape.rules.len(), message.clone());
                }
                shape.rules.push(rule);
            }
        }
        shape.rules.extend(self.interval_rules(node)?);
        Ok(shape)
    }

    fn targets(&self, node: &Term) -> GraphResult<Vec<Target>> {
        let mut targets = Vec::new();
        for class in self.iris(node, &sh("targetClass")?)? {
            targets.push(Target::Class(class));
        }
        for p in self.iris(node, &sh("targetSubjectsOf")?)? {
            targets.push(Target::SubjectsOf(p));
        }
        for p in self.iris(node, &sh("targetObjectsOf")?)? {
            targets.push(Target::ObjectsOf(p));
        }
        for n in self.graph.objects(node, &sh("targetNode")?) {
            targets.push(Target::Node(n));
        }
        Ok(targets)
    }

    fn severity(&self, node: &Term) -> GraphResult<Severity> {
        let Some(value) = self.single_iri(node, &sh("severity")?)? else {
            return Ok(Severity::Violation);
        };
        match value.as_str().strip_prefix(SH) {
            Some("Violation") => Ok(Severity::Violation),
            Some("Warning") => Ok(Severity::Warning),
            Some("Info") => Ok(Severity::Info),
            _ => Err(self.malformed(format!("unknown severity {value}"))),
        }
    }

    fn property(&self, prop: &Term) -> GraphResult<PropertyShape> {
        let path = self
            .single_iri(prop, &sh("path")?)?
            .ok_or_else(|| self.malformed("property shape without an IRI sh:path"))?;

        let mut rules = Vec::new();
        let min = self.count(prop, &sh("minCount")?)?;
        let max = self.count(prop, &sh("maxCount")?)?;
        if min.is_some() || max.is_some() {
            rules.push(Rule::Cardinality {
                path: path.clone(),
                min,
                max,
            });
        }
        for datatype in self.iris(prop, &sh("datatype")?)? {
            rules.push(Rule::Datatype {
                path: path.clone(),
                datatype,
            });
        }
        let comparisons = [
            (sh("lessThan")?, CompareOp::LessThan),
            (sh("lessThanOrEquals")?, CompareOp::LessThanOrEqual),
            (wm("greaterThan")?, CompareOp::GreaterThan),
            (wm("greaterThanOrEquals")?, CompareOp::GreaterThanOrEqual),
        ];
        for (predicate, op) in comparisons {
            for right in self.iris(prop, &predicate)? {
                rules.push(Rule::Comparison {
                    left: path.clone(),
                    op,
                    right,
                });
            }
        }

        let order = match self.graph.objects(prop, &sh("order")?).first() {
            None => None,
            Some(value) => Some(
                value
                    .as_literal()
                    .and_then(|lit| lit.lexical.trim().parse::<f64>().ok())
                    .ok_or_else(|| self.malformed(format!("sh:order {value} is not a number")))?,
            ),
        };

        Ok(PropertyShape {
            order,
            path,
            rules,
            message: self.string(prop, &sh("message")?),
        })
    }

    fn interval_rules(&self, node: &Term) -> GraphResult<Vec<Rule>> {
        let mut rules = Vec::new();
        let kinds = [
            (wm("intervalOverlap")?, OverlapExpectation::Overlap),
            (wm("intervalDisjoint")?, OverlapExpectation::Disjoint),
        ];
        for (predicate, expect) in kinds {
            for interval in self.graph.objects(node, &predicate) {
                let part = |local: &str| -> GraphResult<Iri> {
                    self.single_iri(&interval, &wm(local)?)?
                        .ok_or_else(|| self.malformed(format!("interval rule without wm:{local}")))
                };
                let left = IntervalPath {
                    start: part("leftStart")?,
                    end: part("leftEnd")?,
                };
                let right = IntervalPath {
                    start: part("rightStart")?,
                    end: part("rightEnd")?,
                };
                rules.push(Rule::TemporalOverlap {
                    left,
                    right,
                    expect,
                });
            }
        }
        rules.sort_by(|a, b| interval_key(a).cmp(&interval_key(b)));
        Ok(rules)
    }

    // -- value readers --

    fn iris(&self, node: &Term, predicate: &Iri) -> GraphResult<Vec<Iri>> {
        self.graph
            .objects(node, predicate)
            .into_iter()
            .map(|value| match value {
                Term::Iri(iri) => Ok(iri),
                other => Err(self.malformed(format!(
                    "{} expects an IRI, found {other}",
                    predicate.local_name()
                ))),
            })
            .collect()
    }

    fn single_iri(&self, node: &Term, predicate: &Iri) -> GraphResult<Option<Iri>> {
        let mut values = self.iris(node, predicate)?;
        if values.len() > 1 {
            return Err(self.malformed(format!(
                "{} has {} values, expected one",
                predicate.local_name(),
                values.len()
            )));
        }
        Ok(values.pop())
    }

    fn count(&self, node: &Term, predicate: &Iri) -> GraphResult<Option<usize>> {
        match self.graph.objects(node, predicate).first() {
            None => Ok(None),
            Some(value) => value
                .as_literal()
                .and_then(|lit| lit.lexical.trim().parse::<usize>().ok())
                .map(Some)
                .ok_or_else(|| {
                    self.malformed(format!(
                        "{} {value} is not a non-negative integer",
                        predicate.local_name()
                    ))
                }),
        }
    }

    fn flag(&self, node: &Term, predicate: &Iri) -> GraphResult<bool> {
        Ok(self
            .graph
            .objects(node, predicate)
            .iter()
            .filter_map(Term::as_literal)
            .any(|lit| lit.lexical.trim() == "true" || lit.lexical.trim() == "1"))
    }

    fn string(&self, node: &Term, predicate: &Iri) -> Option<String> {
        self.graph
            .objects(node, predicate)
            .iter()
            .filter_map(Term::as_literal)
            .map(|lit| lit.lexical.clone())
            .next()
    }
}

fn interval_key(rule: &Rule) -> (Option<&Iri>, Option<&Iri>) {
    match rule {
        Rule::TemporalOverlap { left, right, .. } => (Some(&left.start), Some(&right.start)),
        _ => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::rdf::parse_triples;
    use crate::shapes::validate;
    use oxigraph::io::RdfFormat;

    const RIVER_SHAPES: &str = r#"
        @prefix sh: <http://www.w3.org/ns/shacl#> .
        @prefix wm: <http://worldmind.ai/shapes#> .
        @prefix ex: <http://worldmind.ai/rivers-v4#> .
        @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .

        ex:RiverShape a sh:NodeShape ;
            sh:targetClass ex:River ;
            wm:failFast true ;
            sh:property [
                sh:path ex:hasMouth ;
                sh:maxCount 1 ;
                sh:order 0 ;
                sh:message "A river has at most one mouth" ;
            ] ;
            sh:property [
                sh:path ex:sourceElevation ;
                sh:datatype xsd:double ;
                wm:greaterThan ex:mouthElevation ;
            ] .

        ex:TenureShape a sh:NodeShape ;
            sh:targetSubjectsOf ex:termStart ;
            sh:severity sh:Warning ;
            wm:intervalOverlap [
                wm:leftStart ex:termStart ;
                wm:leftEnd ex:termEnd ;
                wm:rightStart ex:birthYear ;
                wm:rightEnd ex:deathYear ;
            ] .

        ex:RetiredShape a sh:NodeShape ;
            sh:deactivated true ;
            sh:targetClass ex:River .
    "#;

    fn compile_str(ttl: &str) -> GraphResult<ShapeSet> {
        let triples = parse_triples(ttl.as_bytes(), RdfFormat::Turtle, "shapes.ttl")?;
        compile(&KnowledgeGraph::load(triples)?)
    }

    fn ex(local: &str) -> Iri {
        Iri::new(format!("http://worldmind.ai/rivers-v4#{local}")).unwrap()
    }

    #[test]
    fn compiles_supported_subset() {
        let shapes = compile_str(RIVER_SHAPES).unwrap();
        assert_eq!(shapes.len(), 2, "deactivated shape is skipped");

        let river = shapes
            .get(&ShapeId("http://worldmind.ai/rivers-v4#RiverShape".into()))
            .unwrap();
        assert!(river.fail_fast);
        assert_eq!(river.targets, vec![Target::Class(ex("River"))]);
        assert_eq!(river.rules.len(), 3);
        assert_eq!(river.rules[0], Rule::Cardinality {
            path: ex("hasMouth"),
            min: None,
            max: Some(1),
        });
        assert!(matches!(river.rules[1], Rule::Datatype { .. }));
        assert_eq!(river.rules[2], Rule::Comparison {
            left: ex("sourceElevation"),
            op: CompareOp::GreaterThan,
            right: ex("mouthElevation"),
        });
        assert_eq!(river.message_for(0), Some("A river has at most one mouth"));
        assert_eq!(river.message_for(1), None);

        let tenure = shapes
            .get(&ShapeId("http://worldmind.ai/rivers-v4#TenureShape".into()))
            .unwrap();
        assert_eq!(tenure.severity, Severity::Warning);
        assert!(matches!(
            tenure.rules[0],
            Rule::TemporalOverlap {
                expect: OverlapExpectation::Overlap,
                ..
            }
        ));
    }

    #[test]
    fn compiled_shapes_validate() {
        let shapes = compile_str(RIVER_SHAPES).unwrap();
        let data = r#"
            @prefix ex: <http://worldmind.ai/rivers-v4#> .
            ex:Escanaba a ex:River ; ex:hasMouth ex:LakeMichigan , ex:LakeSuperior .
        "#;
        let kg = KnowledgeGraph::load(
            parse_triples(data.as_bytes(), RdfFormat::Turtle, "data.ttl").unwrap(),
        )
        .unwrap();
        let report = validate::validate(&kg, &shapes);
        assert!(!report.conforms);
        assert_eq!(report.violations[0].message, "A river has at most one mouth");
    }

    #[test]
    fn non_iri_path_is_malformed() {
        let ttl = r#"
            @prefix sh: <http://www.w3.org/ns/shacl#> .
            @prefix ex: <http://ex/> .
            ex:S a sh:NodeShape ; sh:targetClass ex:C ;
                sh:property [ sh:path [ sh:inversePath ex:p ] ; sh:minCount 1 ] .
        "#;
        assert!(matches!(
            compile_str(ttl),
            Err(GraphLoadError::MalformedShape { .. })
        ));
    }

    #[test]
    fn bad_count_is_malformed() {
        let ttl = r#"
            @prefix sh: <http://www.w3.org/ns/shacl#> .
            @prefix ex: <http://ex/> .
            ex:S a sh:NodeShape ; sh:targetClass ex:C ;
                sh:property [ sh:path ex:p ; sh:maxCount "many" ] .
        "#;
        assert!(matches!(
            compile_str(ttl),
            Err(GraphLoadError::MalformedShape { .. })
        ));
    }

    #[test]
    fn properties_follow_order_then_path() {
        let ttl = r#"
            @prefix sh: <http://www.w3.org/ns/shacl#> .
            @prefix ex: <http://ex/> .
            ex:S a sh:NodeShape ; sh:targetClass ex:C ;
                sh:property [ sh:path ex:a ; sh:minCount 1 ] ;
                sh:property [ sh:path ex:z ; sh:minCount 1 ; sh:order 1 ] ;
                sh:property [ sh:path ex:m ; sh:minCount 1 ] .
        "#;
        let shapes = compile_str(ttl).unwrap();
        let paths: Vec<&str> = shapes.shapes()[0]
            .rules
            .iter()
            .filter_map(|r| match r {
                Rule::Cardinality { path, .. } => Some(path.local_name()),
                _ => None,
            })
            .collect();
        assert_eq!(paths, vec!["z", "a", "m"]);
    }

    #[test]
    fn unnamed_shapes_get_stable_ids() {
        let lake = r#"[] a sh:NodeShape ; sh:targetClass ex:Lake ;
                sh:property [ sh:path ex:area ; sh:minCount 1 ] ."#;
        let river = r#"[] a sh:NodeShape ; sh:targetClass ex:River ;
                sh:property [ sh:path ex:hasMouth ; sh:maxCount 1 ] ."#;
        let prefixes = r#"
            @prefix sh: <http://www.w3.org/ns/shacl#> .
            @prefix ex: <http://ex/> .
        "#;

        let first = compile_str(&format!("{prefixes}\n{lake}\n{river}")).unwrap();
        let second = compile_str(&format!("{prefixes}\n{river}\n{lake}")).unwrap();

        let ids: Vec<&str> = first.shapes().iter().map(|s| s.id.0.as_str()).collect();
        assert_eq!(ids, vec!["_:shape0", "_:shape1"]);
        assert!(ids.iter().all(|id| id.starts_with(UNNAMED_SHAPE_PREFIX)));
        for shape in first.shapes() {
            let again = second.get(&shape.id).unwrap();
            assert_eq!(again.targets, shape.targets);
            assert_eq!(again.rules, shape.rules);
        }
    }
}
