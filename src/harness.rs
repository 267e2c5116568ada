//! Batch evaluation: every card through every system, in parallel.
//!
//! Cards are independent, so the batch is a rayon map over cards that keeps card
//! order in the output. A shared cancel flag (set from SIGINT/SIGTERM) stops the
//! batch from starting new cards; a cancelled batch reports no results.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::card::{Card, Label, Verdict};
use crate::error::{MalformedCardError, OutputError};
use crate::metrics::{self, SystemMatrices};
use crate::system::EvaluationSystem;

/// One output row: one card answered by one system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,
    pub gold: Verdict,
    pub pred: Verdict,
    pub pass: bool,
    pub system: String,
    pub label: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One row of the error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub kind: String,
    pub message: String,
}

impl From<&MalformedCardError> for ErrorRecord {
    fn from(err: &MalformedCardError) -> Self {
        Self {
            line: Some(err.line),
            id: err.id.clone(),
            system: None,
            kind: "malformed_card".into(),
            message: err.message.clone(),
        }
    }
}

/// Everything a batch produced.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Card order, then system order within a card.
    pub results: Vec<ResultRecord>,
    pub matrices: SystemMatrices,
    pub errors: Vec<ErrorRecord>,
    pub cancelled: bool,
}

/// Runs cards through a fixed set of systems.
pub struct Harness {
    systems: Vec<Arc<dyn EvaluationSystem>>,
    threads: Option<usize>,
    cancel: Arc<AtomicBool>,
}

impl Harness {
    pub fn new(systems: Vec<Arc<dyn EvaluationSystem>>) -> Self {
        Self {
            systems,
            threads: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use a dedicated pool of `threads` workers instead of the global one.
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads.filter(|&n| n > 0);
        self
    }

    /// The flag that cancels the batch when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Set the cancel flag on SIGINT and SIGTERM.
    pub fn cancel_on_signals(&self) -> std::io::Result<()> {
        for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&self.cancel))?;
        }
        Ok(())
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name()).collect()
    }

    /// Evaluate all cards.
    pub fn run(&self, cards: &[Card]) -> BatchOutcome {
        tracing::info!(
            cards = cards.len(),
            systems = self.systems.len(),
            threads = ?self.threads,
            "starting batch"
        );
        let per_card = match self.pool() {
            Some(pool) => pool.install(|| self.answer_all(cards)),
            None => self.answer_all(cards),
        };

        if self.cancel.load(Ordering::Relaxed) {
            tracing::warn!("batch cancelled, discarding partial results");
            return BatchOutcome {
                cancelled: true,
                ..Default::default()
            };
        }

        let mut outcome = BatchOutcome::default();
        for rows in per_card.into_iter().flatten() {
            for (result, error) in rows {
                outcome.results.push(result);
                outcome.errors.extend(error);
            }
        }
        outcome.matrices = metrics::matrices_by_system(&outcome.results);
        log_summary(&outcome.results);
        outcome
    }

    fn pool(&self) -> Option<rayon::ThreadPool> {
        let threads = self.threads?;
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::warn!(threads, error = %e, "failed to build worker pool, using the global pool");
                None
            }
        }
    }

    fn answer_all(&self, cards: &[Card]) -> Vec<Option<Vec<(ResultRecord, Option<ErrorRecord>)>>> {
        cards
            .par_iter()
            .map(|card| {
                if self.cancel.load(Ordering::Relaxed) {
                    return None;
                }
                Some(self.systems.iter().map(|system| answer_one(system.as_ref(), card)).collect())
            })
            .collect()
    }
}

fn answer_one(system: &dyn EvaluationSystem, card: &Card) -> (ResultRecord, Option<ErrorRecord>) {
    let prediction = system.answer(card);
    let error = prediction.error.map(|message| ErrorRecord {
        line: None,
        id: Some(card.id.clone()),
        system: Some(system.name().to_string()),
        kind: "system".into(),
        message,
    });
    let result = ResultRecord {
        id: card.id.clone(),
        gold: card.gold,
        pred: prediction.pred,
        pass: prediction.pred == card.gold,
        system: system.name().to_string(),
        label: card.label,
        reason: prediction.reason,
    };
    (result, error)
}

/// Log pass rates per system and label.
fn log_summary(results: &[ResultRecord]) {
    let mut tally: BTreeMap<(&str, Label), (usize, usize)> = BTreeMap::new();
    for row in results {
        let entry = tally.entry((row.system.as_str(), row.label)).or_default();
        entry.1 += 1;
        if row.pass {
            entry.0 += 1;
        }
    }
    for ((system, label), (passed, total)) in tally {
        let accuracy = passed as f64 / total as f64;
        tracing::info!(system, label = %label, passed, total, accuracy, "batch summary");
    }
}

/// Write rows as JSON Lines.
pub fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), OutputError> {
    let write_err = |source: std::io::Error| OutputError::Write {
        path: path.display().to_string(),
        source,
    };
    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    for row in rows {
        serde_json::to_writer(&mut writer, row).map_err(|e| write_err(std::io::Error::other(e)))?;
        writer.write_all(b"\n").map_err(write_err)?;
    }
    writer.flush().map_err(write_err)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "wrote JSONL");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Iri;
    use crate::oracle::Claim;
    use crate::system::{ConstantSystem, Prediction};

    fn card(n: usize, label: Label, gold: Verdict) -> Card {
        Card {
            id: format!("CARD_{label}_{n:06}"),
            facts: Vec::new(),
            question: "?".into(),
            gold,
            label,
            claim: Claim::new(
                Iri::new("http://ex/A").unwrap(),
                Iri::new("http://ex/p").unwrap(),
                Iri::new("http://ex/B").unwrap(),
            ),
            answer: None,
        }
    }

    fn cards() -> Vec<Card> {
        (0..30)
            .map(|n| match n % 3 {
                0 => card(n, Label::E, Verdict::Yes),
                1 => card(n, Label::C, Verdict::No),
                _ => card(n, Label::U, Verdict::Unknown),
            })
            .collect()
    }

    struct Flaky;

    impl EvaluationSystem for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn answer(&self, _card: &Card) -> Prediction {
            Prediction::new(Verdict::Unknown).with_error("backend down")
        }
    }

    #[test]
    fn results_keep_card_order() {
        let harness = Harness::new(vec![
            Arc::new(ConstantSystem::new("yes", Verdict::Yes)),
            Arc::new(ConstantSystem::new("unknown", Verdict::Unknown)),
        ])
        .with_threads(Some(4));
        let cards = cards();
        let outcome = harness.run(&cards);

        assert!(!outcome.cancelled);
        assert_eq!(outcome.results.len(), 60);
        for (i, card) in cards.iter().enumerate() {
            assert_eq!(outcome.results[2 * i].id, card.id);
            assert_eq!(outcome.results[2 * i].system, "yes");
            assert_eq!(outcome.results[2 * i + 1].system, "unknown");
        }
    }

    #[test]
    fn matrices_match_predictions() {
        let harness = Harness::new(vec![Arc::new(ConstantSystem::new("yes", Verdict::Yes))]);
        let outcome = harness.run(&cards());
        let m = outcome.matrices["yes"];
        assert_eq!((m.a_e, m.a_c, m.a_u), (10, 10, 10));
        assert_eq!(m.abstentions(), 0);
        assert_eq!(outcome.results.iter().filter(|r| r.pass).count(), 10);
    }

    #[test]
    fn recovered_errors_are_logged_not_fatal() {
        let harness = Harness::new(vec![Arc::new(Flaky)]);
        let outcome = harness.run(&cards()[..3]);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.errors.len(), 3);
        assert_eq!(outcome.errors[0].system.as_deref(), Some("flaky"));
        assert_eq!(outcome.errors[0].kind, "system");
    }

    #[test]
    fn cancelled_batch_discards_results() {
        let harness = Harness::new(vec![Arc::new(ConstantSystem::new("yes", Verdict::Yes))]);
        harness.cancel_flag().store(true, Ordering::Relaxed);
        let outcome = harness.run(&cards());
        assert!(outcome.cancelled);
        assert!(outcome.results.is_empty());
        assert!(outcome.matrices.is_empty());
    }

    #[test]
    fn jsonl_round_trip_through_metrics_reader() {
        let harness = Harness::new(vec![Arc::new(ConstantSystem::new("no", Verdict::No))]);
        let outcome = harness.run(&cards());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        write_jsonl(&path, &outcome.results).unwrap();

        let rows = metrics::read_results(&path).unwrap();
        assert_eq!(rows, outcome.results);
    }

    #[test]
    fn malformed_card_becomes_error_row() {
        let err = MalformedCardError {
            line: 3,
            id: None,
            message: "expected value".into(),
        };
        let row = ErrorRecord::from(&err);
        assert_eq!(row.line, Some(3));
        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["kind"], "malformed_card");
    }
}
