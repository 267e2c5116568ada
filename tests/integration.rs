//! End-to-end integration tests for the worldmind engine.
//!
//! These tests load a river graph and its shapes from Turtle files, then drive
//! the licensing oracle through the engine facade: entailment, explicit
//! negation, constraint violations and the open-world default.

use std::path::Path;

use worldmind::config::EngineConfig;
use worldmind::engine::Engine;
use worldmind::error::{GraphLoadError, WorldmindError};
use worldmind::graph::{Iri, Literal, Term, TripleSource};
use worldmind::oracle::{Action, Claim, Evidence, Reason};
use worldmind::shapes::ShapeId;

const EX: &str = "http://worldmind.ai/rivers-v4#";

const RIVERS: &str = r#"
@prefix ex: <http://worldmind.ai/rivers-v4#> .
@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .

ex:EscanabaRiver a ex:River ;
    ex:hasMouth ex:LakeMichigan ;
    ex:sourceElevation "400"^^xsd:double ;
    ex:mouthElevation "177"^^xsd:double .

ex:BearCreek a ex:River ;
    ex:hasTributary ex:WhetstoneRiver .

ex:WhetstoneRiver a ex:River .

ex:FordRiver a ex:River ;
    ex:sourceElevation "300"^^xsd:double .

ex:LakeMichigan ex:partOf ex:GreatLakes .
"#;

const SHAPES: &str = r#"
@prefix sh: <http://www.w3.org/ns/shacl#> .
@prefix wm: <http://worldmind.ai/shapes#> .
@prefix ex: <http://worldmind.ai/rivers-v4#> .
@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .

ex:RiverShape a sh:NodeShape ;
    sh:targetClass ex:River ;
    sh:property [
        sh:path ex:hasMouth ;
        sh:maxCount 1 ;
    ] ;
    sh:property [
        sh:path ex:sourceElevation ;
        wm:greaterThan ex:mouthElevation ;
    ] .
"#;

fn ex(local: &str) -> Iri {
    Iri::new(format!("{EX}{local}")).unwrap()
}

fn claim(s: &str, p: &str, o: &str) -> Claim {
    Claim::new(ex(s), ex(p), ex(o))
}

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn river_engine(dir: &Path) -> Engine {
    let config = EngineConfig {
        graph: Some(write(dir, "rivers.ttl", RIVERS)),
        shapes: Some(write(dir, "shapes.ttl", SHAPES)),
        ..Default::default()
    };
    Engine::load(config).unwrap()
}

#[test]
fn entailed_claim_is_answered() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = river_engine(dir.path());

    let facts = vec!["Escanaba River hasMouth Lake Michigan".to_string()];
    let decision = engine.check(&claim("EscanabaRiver", "hasMouth", "LakeMichigan"), &facts);

    assert_eq!(decision.action, Action::Answer);
    assert_eq!(decision.reason, Reason::EntailedReason);
    assert!(matches!(decision.evidence.as_slice(), [Evidence::Triple(_)]));
}

#[test]
fn explicit_negation_wins_over_entailment() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = river_engine(dir.path());

    // The graph holds this triple, but the card says otherwise.
    let facts = vec!["Bear Creek DOES NOT have tributary: Whetstone River".to_string()];
    let decision = engine.check(&claim("BearCreek", "hasTributary", "WhetstoneRiver"), &facts);

    assert_eq!(decision.action, Action::Abstain);
    assert_eq!(decision.reason, Reason::ExplicitContradiction);
    assert_eq!(
        decision.evidence,
        vec![Evidence::Fact(facts[0].clone())]
    );
}

#[test]
fn unknown_pair_is_insufficient_evidence() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = river_engine(dir.path());

    let decision = engine.check(&claim("PineRiver", "hasMouth", "LakeHuron"), &[]);
    assert_eq!(decision.action, Action::Abstain);
    assert_eq!(decision.reason, Reason::InsufficientEvidence);
}

#[test]
fn second_mouth_violates_cardinality() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = river_engine(dir.path());

    let decision = engine.check(&claim("EscanabaRiver", "hasMouth", "LakeSuperior"), &[]);
    assert_eq!(decision.action, Action::Abstain);
    assert_eq!(decision.reason, Reason::ConstraintViolation);
    assert_eq!(
        decision.evidence,
        vec![Evidence::Shape(ShapeId(format!("{EX}RiverShape")))]
    );

    // The base graph itself is untouched by the hypothetical check.
    assert!(!engine.graph().exists(
        &Term::Iri(ex("EscanabaRiver")),
        &ex("hasMouth"),
        &Term::Iri(ex("LakeSuperior"))
    ));
}

#[test]
fn mouth_above_source_violates_comparison() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = river_engine(dir.path());

    let high = Claim::new(ex("FordRiver"), ex("mouthElevation"), Literal::xsd("350", "double"));
    let decision = engine.check(&high, &[]);
    assert_eq!(decision.reason, Reason::ConstraintViolation);

    let low = Claim::new(ex("FordRiver"), ex("mouthElevation"), Literal::xsd("120", "double"));
    let decision = engine.check(&low, &[]);
    assert_eq!(decision.reason, Reason::InsufficientEvidence);
}

#[test]
fn every_stored_triple_is_entailed() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = river_engine(dir.path());

    for triple in engine.graph().all_triples() {
        let Some(subject) = triple.subject.as_iri() else {
            continue;
        };
        let claim = Claim::new(subject.clone(), triple.predicate.clone(), triple.object.clone());
        let decision = engine.check(&claim, &[]);
        assert_eq!(decision.action, Action::Answer, "{triple}");
        assert_eq!(decision.reason, Reason::EntailedReason, "{triple}");
    }
}

#[test]
fn open_world_never_answers() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = river_engine(dir.path());

    let absent = [
        claim("EscanabaRiver", "flowsThrough", "DeltaCounty"),
        claim("WhetstoneRiver", "hasTributary", "BearCreek"),
        claim("GreatLakes", "partOf", "LakeMichigan"),
        claim("Nowhere", "partOf", "Nothing"),
    ];
    for c in &absent {
        let decision = engine.check(c, &[]);
        assert_eq!(decision.action, Action::Abstain, "{c}");
        assert_eq!(decision.reason, Reason::InsufficientEvidence, "{c}");
    }
}

#[test]
fn decisions_are_deterministic_across_engines() {
    let dir = tempfile::TempDir::new().unwrap();
    let first = river_engine(dir.path());
    let second = river_engine(dir.path());

    let claims = [
        claim("EscanabaRiver", "hasMouth", "LakeMichigan"),
        claim("EscanabaRiver", "hasMouth", "LakeSuperior"),
        claim("BearCreek", "hasTributary", "WhetstoneRiver"),
        claim("PineRiver", "hasMouth", "LakeHuron"),
    ];
    let facts = vec!["Bear Creek DOES NOT have tributary: Whetstone River".to_string()];
    for c in &claims {
        let a = first.check(c, &facts);
        assert_eq!(a, first.check(c, &facts));
        assert_eq!(a, second.check(c, &facts));
    }
}

#[test]
fn graph_conforms_and_retrieval_is_bounded() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = river_engine(dir.path());

    let report = engine.validate();
    assert!(report.conforms, "{:?}", report.violations);

    let seed = Term::Iri(ex("EscanabaRiver"));
    let all = engine.retrieve(&seed, None);
    assert!(all.triples.len() >= 5);
    let ntriples = all.to_ntriples();
    assert!(ntriples.contains("<http://worldmind.ai/rivers-v4#partOf>"));

    let capped = engine.retrieve(
        &seed,
        Some(&worldmind::graph::traverse::RetrievalConfig {
            max_hops: 2,
            max_triples: 2,
        }),
    );
    assert_eq!(capped.triples.len(), 2);
    assert!(capped.truncated);
    assert_eq!(capped.triples, all.triples[..2].to_vec());
}

#[test]
fn malformed_graph_aborts_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = EngineConfig {
        graph: Some(write(dir.path(), "broken.ttl", "@prefix ex: <http://ex/> .\nex:a ex:b ")),
        ..Default::default()
    };
    let err = Engine::load(config).unwrap_err();
    assert!(matches!(
        err,
        WorldmindError::GraphLoad(GraphLoadError::Parse { .. })
    ));
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = EngineConfig {
        graph: Some(write(dir.path(), "rivers.csv", "a,b,c")),
        ..Default::default()
    };
    assert!(matches!(
        Engine::load(config),
        Err(WorldmindError::GraphLoad(GraphLoadError::UnsupportedFormat { .. }))
    ));
}
