//! Batch evaluation tests: cards file → harness → result rows → metrics.

use std::path::Path;
use std::sync::Arc;

use worldmind::card::{self, Verdict};
use worldmind::config::{EngineConfig, SystemConfig};
use worldmind::engine::Engine;
use worldmind::harness::{self, ErrorRecord, Harness};
use worldmind::metrics;
use worldmind::system::ConstantSystem;

const RIVERS: &str = r#"
<http://ex/EscanabaRiver> <http://ex/hasMouth> <http://ex/LakeMichigan> .
<http://ex/BearCreek> <http://ex/hasTributary> <http://ex/WhetstoneRiver> .
"#;

const CARDS: &str = r#"{"id":"CARD_E_000001","facts":["Escanaba River hasMouth Lake Michigan"],"question":"Is Lake Michigan the mouth of Escanaba River?","gold":"YES","label":"E","claim":{"subj":"http://ex/EscanabaRiver","pred":"http://ex/hasMouth","obj":"http://ex/LakeMichigan"}}
{"id":"CARD_C_000001","facts":["Bear Creek DOES NOT have tributary: Whetstone River"],"question":"Does Bear Creek have tributary Whetstone River?","gold":"NO","label":"C","claim":{"subj":"http://ex/BearCreek","pred":"http://ex/hasTributary","obj":"http://ex/WhetstoneRiver"}}
{"id":"CARD_U_000001","facts":["Pine River flows through Alcona County"],"question":"Is Lake Huron the mouth of Pine River?","gold":"UNKNOWN","label":"U","claim":{"subj":"http://ex/PineRiver","pred":"http://ex/hasMouth","obj":"http://ex/LakeHuron"}}
{"id":"CARD_E_000002","facts":[],"question":"?","gold":"MAYBE","label":"E","claim":{"subj":"http://ex/a","pred":"http://ex/b","obj":"http://ex/c"}}
"#;

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn engine(dir: &Path, config: EngineConfig) -> Engine {
    Engine::load(EngineConfig {
        graph: Some(write(dir, "rivers.nt", RIVERS)),
        ..config
    })
    .unwrap()
}

#[test]
fn batch_covers_every_valid_card() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = engine(dir.path(), EngineConfig::default());
    let batch = card::read_cards(&write(dir.path(), "cards.jsonl", CARDS)).unwrap();
    assert_eq!(batch.cards.len(), 3);
    assert_eq!(batch.errors.len(), 1);
    assert_eq!(batch.errors[0].id.as_deref(), Some("CARD_E_000002"));

    let outcome = engine.harness().run(&batch.cards);
    assert!(!outcome.cancelled);
    assert!(outcome.errors.is_empty());
    // Two default systems per card.
    assert_eq!(outcome.results.len(), 6);
    assert!(outcome.results.iter().all(|r| r.pass), "{:?}", outcome.results);

    let licensed: Vec<_> = outcome
        .results
        .iter()
        .filter(|r| r.system == "kg_licensed")
        .collect();
    assert_eq!(
        licensed.iter().map(|r| r.pred).collect::<Vec<_>>(),
        vec![Verdict::Yes, Verdict::No, Verdict::Unknown]
    );
    assert_eq!(licensed[1].reason.as_deref(), Some("ExplicitContradiction"));
    assert_eq!(licensed[2].reason.as_deref(), Some("InsufficientEvidence"));

    let m = outcome.matrices["kg_licensed"];
    assert_eq!((m.a_e, m.s_c, m.s_u), (1, 1, 1));
    let scores = m.score();
    assert_eq!(scores.ap, Some(1.0));
    assert_eq!(scores.la, Some(1.0));
    assert_eq!(scores.ar, Some(1.0));
    assert_eq!(scores.far_ne, Some(0.0));
}

#[test]
fn results_file_feeds_metrics() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = EngineConfig::default();
    config.systems.push(SystemConfig::Constant {
        name: "raw_llm".into(),
        verdict: Verdict::Yes,
    });
    config.batch.threads = Some(2);
    let engine = engine(dir.path(), config);
    let batch = card::read_cards(&write(dir.path(), "cards.jsonl", CARDS)).unwrap();
    let outcome = engine.harness().run(&batch.cards);

    let results_path = dir.path().join("results.jsonl");
    harness::write_jsonl(&results_path, &outcome.results).unwrap();
    let errors: Vec<ErrorRecord> = batch.errors.iter().map(ErrorRecord::from).collect();
    let errors_path = dir.path().join("errors.jsonl");
    harness::write_jsonl(&errors_path, &errors).unwrap();
    assert_eq!(std::fs::read_to_string(&errors_path).unwrap().lines().count(), 1);

    let rows = metrics::read_results(&results_path).unwrap();
    assert_eq!(rows.len(), 9);
    let by_system = metrics::metrics_by_system(&rows);
    assert_eq!(
        by_system.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["kg", "kg_licensed", "raw_llm"]
    );

    // Always answering: nothing abstained, so abstention precision is undefined.
    let raw = &by_system["raw_llm"];
    assert_eq!(raw.counts.answers(), 3);
    assert_eq!(raw.scores.ap, None);
    assert_eq!(raw.scores.far_ne, Some(1.0));
    assert_eq!(raw.scores.cvrr, Some(0.0));

    let json = serde_json::to_value(&by_system).unwrap();
    assert!(json["raw_llm"]["AP"].is_null());
    assert_eq!(json["kg_licensed"]["counts"]["S_C"], 1);

    // Matrices folded during the run agree with the ones recomputed from disk.
    for (system, matrix) in &outcome.matrices {
        assert_eq!(by_system[system].counts, *matrix);
    }
}

#[test]
fn malformed_result_row_is_reported_with_line() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "results.jsonl",
        "{\"id\":\"A\",\"gold\":\"YES\",\"pred\":\"YES\",\"pass\":true,\"system\":\"kg\",\"label\":\"E\"}\n{\"id\":\"B\"}\n",
    );
    match metrics::read_results(&path) {
        Err(worldmind::error::OutputError::MalformedRow { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected malformed row, got {other:?}"),
    }
}

#[test]
fn partitioned_batches_merge_to_the_whole() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = engine(dir.path(), EngineConfig::default());
    let batch = card::read_cards(&write(dir.path(), "cards.jsonl", CARDS)).unwrap();
    let harness = Harness::new(engine.systems());

    let whole = harness.run(&batch.cards);
    let (left, right) = batch.cards.split_at(1);
    let left = harness.run(left);
    let right = harness.run(right);

    for (system, matrix) in &whole.matrices {
        let merged = left.matrices.get(system).copied().unwrap_or_default()
            + right.matrices.get(system).copied().unwrap_or_default();
        assert_eq!(merged, *matrix);
        assert_eq!(merged.score(), matrix.score());
    }
}

#[test]
fn extra_systems_need_no_harness_changes() {
    let dir = tempfile::TempDir::new().unwrap();
    let batch = card::read_cards(&write(dir.path(), "cards.jsonl", CARDS)).unwrap();
    let harness = Harness::new(vec![
        Arc::new(ConstantSystem::new("always_no", Verdict::No)),
        Arc::new(ConstantSystem::new("always_unknown", Verdict::Unknown)),
    ]);
    assert_eq!(harness.system_names(), vec!["always_no", "always_unknown"]);

    let outcome = harness.run(&batch.cards);
    let no = outcome.matrices["always_no"];
    assert_eq!(no.abstentions(), 3);
    assert_eq!(no.score().la, Some(0.0));
    assert_eq!(no.score().ap, Some(2.0 / 3.0));
}

#[test]
fn undecodable_bytes_skip_only_their_line() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = engine(dir.path(), EngineConfig::default());

    let mut bytes = Vec::new();
    let mut lines = CARDS.lines();
    bytes.extend_from_slice(lines.next().unwrap().as_bytes());
    bytes.extend_from_slice(b"\n{\"id\":\"CARD_C_\xff\xff\",\"facts\":[]}\n");
    for line in lines {
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
    }
    let path = dir.path().join("cards.jsonl");
    std::fs::write(&path, &bytes).unwrap();

    let batch = card::read_cards(&path).unwrap();
    assert_eq!(batch.cards.len(), 3);
    assert_eq!(batch.errors.len(), 2);
    assert_eq!(batch.errors[0].line, 2);
    assert!(batch.errors[0].id.is_none());
    assert_eq!(batch.errors[1].id.as_deref(), Some("CARD_E_000002"));

    let outcome = engine.harness().run(&batch.cards);
    let ids: Vec<&str> = outcome
        .results
        .iter()
        .filter(|r| r.system == "kg_licensed")
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(ids, vec!["CARD_E_000001", "CARD_C_000001", "CARD_U_000001"]);
}

#[test]
fn generated_negation_facts_abstain() {
    let dir = tempfile::TempDir::new().unwrap();
    let graph = write(
        dir.path(),
        "dbpedia.nt",
        "<http://dbpedia.org/resource/Bear_Creek_(Michigan)> <http://dbpedia.org/ontology/hasTributary> <http://dbpedia.org/resource/Mill_Creek> .\n",
    );
    let engine = Engine::load(EngineConfig {
        graph: Some(graph),
        ..Default::default()
    })
    .unwrap();
    let cards = write(
        dir.path(),
        "cards.jsonl",
        r#"{"id":"CARD_C_000042","facts":["Bear Creek (Michigan) DOES NOT have tributary: Whetstone River (Michigan) (not in database)"],"question":"Does Bear Creek have tributary Whetstone River?","gold":"NO","label":"C","claim":{"subj":"http://dbpedia.org/resource/Bear_Creek_(Michigan)","pred":"http://dbpedia.org/ontology/hasTributary","obj":"http://dbpedia.org/resource/Whetstone_River_(Michigan)"}}"#,
    );
    let batch = card::read_cards(&cards).unwrap();
    let outcome = engine.harness().run(&batch.cards);

    let licensed = outcome
        .results
        .iter()
        .find(|r| r.system == "kg_licensed")
        .unwrap();
    assert_eq!(licensed.pred, Verdict::No);
    assert_eq!(licensed.reason.as_deref(), Some("ExplicitContradiction"));
    assert!(licensed.pass);
}
