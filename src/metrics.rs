//! Abstention Metrics Engine.
//!
//! A [`ConfusionMatrix`] counts (action, label) pairs. Matrices are plain
//! counters, so partial matrices from parallel workers merge by addition in any
//! order. Every score is a ratio that is `None` (JSON `null`) when its
//! denominator is zero.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::{Add, AddAssign};
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::card::{Label, Verdict};
use crate::error::OutputError;
use crate::harness::ResultRecord;
use crate::oracle::Action;

/// Answer/abstain × entailed/contradictory/unknown counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    #[serde(rename = "A_E")]
    pub a_e: u64,
    #[serde(rename = "A_C")]
    pub a_c: u64,
    #[serde(rename = "A_U")]
    pub a_u: u64,
    #[serde(rename = "S_E")]
    pub s_e: u64,
    #[serde(rename = "S_C")]
    pub s_c: u64,
    #[serde(rename = "S_U")]
    pub s_u: u64,
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one pair.
    pub fn record(&mut self, action: Action, label: Label) {
        let cell = match (action, label) {
            (Action::Answer, Label::E) => &mut self.a_e,
            (Action::Answer, Label::C) => &mut self.a_c,
            (Action::Answer, Label::U) => &mut self.a_u,
            (Action::Abstain, Label::E) => &mut self.s_e,
            (Action::Abstain, Label::C) => &mut self.s_c,
            (Action::Abstain, Label::U) => &mut self.s_u,
        };
        *cell += 1;
    }

    /// Return the matrix with one more pair counted.
    pub fn fold(mut self, action: Action, label: Label) -> Self {
        self.record(action, label);
        self
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Action, Label)>) -> Self {
        pairs
            .into_iter()
            .fold(Self::new(), |m, (action, label)| m.fold(action, label))
    }

    /// Elementwise sum.
    pub fn merge(self, other: Self) -> Self {
        Self {
            a_e: self.a_e + other.a_e,
            a_c: self.a_c + other.a_c,
            a_u: self.a_u + other.a_u,
            s_e: self.s_e + other.s_e,
            s_c: self.s_c + other.s_c,
            s_u: self.s_u + other.s_u,
        }
    }

    pub fn answers(&self) -> u64 {
        self.a_e + self.a_c + self.a_u
    }

    pub fn abstentions(&self) -> u64 {
        self.s_e + self.s_c + self.s_u
    }

    pub fn total(&self) -> u64 {
        self.answers() + self.abstentions()
    }

    pub fn score(&self) -> Scores {
        let non_entailed = self.a_c + self.a_u + self.s_c + self.s_u;
        Scores {
            ap: ratio(self.s_c + self.s_u, self.abstentions()),
            cvrr: ratio(self.s_c, self.s_c + self.a_c),
            far_ne: ratio(self.a_c + self.a_u, non_entailed),
            la: ratio(self.a_e, self.a_e + self.s_e),
            ar: ratio(self.s_c + self.s_u, non_entailed),
        }
    }

    pub fn extended(&self) -> ExtendedScores {
        let total = self.total();
        ExtendedScores {
            ap_invalid: ratio(self.s_c, self.s_c + self.s_e),
            ap_unknown: ratio(self.s_u, self.s_u + self.s_e),
            ar_contradictory: ratio(self.s_c, self.s_c + self.a_c),
            ar_unknown: ratio(self.s_u, self.s_u + self.a_u),
            coverage: ratio(self.answers(), total),
            answer_accuracy: ratio(self.a_e, self.answers()),
            overall_accuracy: ratio(self.a_e + self.s_c + self.s_u, total),
            total,
            answers: self.answers(),
            abstentions: self.abstentions(),
        }
    }
}

impl Add for ConfusionMatrix {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.merge(rhs)
    }
}

impl AddAssign for ConfusionMatrix {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.merge(rhs);
    }
}

impl std::iter::Sum for ConfusionMatrix {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::new(), Self::merge)
    }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// The five headline scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    /// Abstention precision: warranted abstentions / abstentions.
    #[serde(rename = "AP")]
    pub ap: Option<f64>,
    /// Contradictory claims rejected / contradictory claims.
    #[serde(rename = "CVRR")]
    pub cvrr: Option<f64>,
    /// Non-entailed claims answered / non-entailed claims. Lower is better.
    #[serde(rename = "FAR-NE")]
    pub far_ne: Option<f64>,
    /// Entailed claims answered / entailed claims.
    #[serde(rename = "LA")]
    pub la: Option<f64>,
    /// Abstention recall over non-entailed claims.
    #[serde(rename = "AR")]
    pub ar: Option<f64>,
}

/// Per-label breakdowns and totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedScores {
    #[serde(rename = "AP_invalid")]
    pub ap_invalid: Option<f64>,
    #[serde(rename = "AP_unknown")]
    pub ap_unknown: Option<f64>,
    #[serde(rename = "AR_contradictory")]
    pub ar_contradictory: Option<f64>,
    #[serde(rename = "AR_unknown")]
    pub ar_unknown: Option<f64>,
    pub coverage: Option<f64>,
    pub answer_accuracy: Option<f64>,
    pub overall_accuracy: Option<f64>,
    pub total: u64,
    pub answers: u64,
    pub abstentions: u64,
}

/// Everything reported for one system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub counts: ConfusionMatrix,
    #[serde(flatten)]
    pub scores: Scores,
    #[serde(flatten)]
    pub extended: ExtendedScores,
}

impl SystemMetrics {
    pub fn from_matrix(counts: ConfusionMatrix) -> Self {
        Self {
            counts,
            scores: counts.score(),
            extended: counts.extended(),
        }
    }
}

/// Action implied by a recorded prediction: YES answers, anything else abstains.
pub fn action_of(pred: Verdict) -> Action {
    match pred {
        Verdict::Yes => Action::Answer,
        Verdict::No | Verdict::Unknown => Action::Abstain,
    }
}

/// Partial confusion matrices keyed by system name.
pub type SystemMatrices = BTreeMap<String, ConfusionMatrix>;

fn merge_matrices(mut a: SystemMatrices, b: SystemMatrices) -> SystemMatrices {
    for (system, matrix) in b {
        *a.entry(system).or_default() += matrix;
    }
    a
}

/// Fold result rows into one matrix per system, in parallel.
pub fn matrices_by_system(rows: &[ResultRecord]) -> SystemMatrices {
    rows.par_iter()
        .fold(SystemMatrices::new, |mut acc, row| {
            acc.entry(row.system.clone())
                .or_default()
                .record(action_of(row.pred), row.label);
            acc
        })
        .reduce(SystemMatrices::new, merge_matrices)
}

/// Scores for every system found in the rows.
pub fn metrics_by_system(rows: &[ResultRecord]) -> BTreeMap<String, SystemMetrics> {
    matrices_by_system(rows)
        .into_iter()
        .map(|(system, matrix)| (system, SystemMetrics::from_matrix(matrix)))
        .collect()
}

/// Read result rows (JSON Lines). Any unreadable row fails the read.
pub fn read_results(path: &Path) -> Result<Vec<ResultRecord>, OutputError> {
    let read_err = |source: std::io::Error| OutputError::Read {
        path: path.display().to_string(),
        source,
    };
    let file = File::open(path).map_err(read_err)?;
    let mut rows = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(read_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line).map_err(|e| OutputError::MalformedRow {
            line: idx + 1,
            message: e.to_string(),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

fn fmt_score(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"))
}

/// Human-readable report for one system.
pub fn render_report(system: &str, metrics: &SystemMetrics) -> String {
    let c = &metrics.counts;
    let s = &metrics.scores;
    let x = &metrics.extended;
    let mut out = String::new();
    let _ = writeln!(out, "System: {system}");
    let _ = writeln!(out, "  Confusion matrix:");
    let _ = writeln!(out, "              E      C      U");
    let _ = writeln!(out, "    ANSWER  {:>5}  {:>5}  {:>5}", c.a_e, c.a_c, c.a_u);
    let _ = writeln!(out, "    ABSTAIN {:>5}  {:>5}  {:>5}", c.s_e, c.s_c, c.s_u);
    let _ = writeln!(out, "  AP      {}", fmt_score(s.ap));
    let _ = writeln!(out, "    on contradictory  {}", fmt_score(x.ap_invalid));
    let _ = writeln!(out, "    on unknown        {}", fmt_score(x.ap_unknown));
    let _ = writeln!(out, "  AR      {}", fmt_score(s.ar));
    let _ = writeln!(out, "    on contradictory  {}", fmt_score(x.ar_contradictory));
    let _ = writeln!(out, "    on unknown        {}", fmt_score(x.ar_unknown));
    let _ = writeln!(out, "  CVRR    {}", fmt_score(s.cvrr));
    let _ = writeln!(out, "  FAR-NE  {}", fmt_score(s.far_ne));
    let _ = writeln!(out, "  LA      {}", fmt_score(s.la));
    let _ = writeln!(
        out,
        "  coverage {}  answer accuracy {}  overall accuracy {}",
        fmt_score(x.coverage),
        fmt_score(x.answer_accuracy),
        fmt_score(x.overall_accuracy)
    );
    out
}
