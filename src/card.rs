//! Context cards: test fixtures pairing facts and a question with a gold label.
//!
//! Cards arrive as JSON Lines. Each line is validated on its own; a bad line
//! becomes a [`MalformedCardError`] and the rest of the file still loads.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MalformedCardError, OutputError};
use crate::graph::{Iri, Term};
use crate::oracle::Claim;

/// Expected (or predicted) answer to a card's question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Yes,
    No,
    Unknown,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Yes => "YES",
            Verdict::No => "NO",
            Verdict::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Epistemic label of a card: entailed, contradictory or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    E,
    C,
    U,
}

impl Label {
    pub const ALL: [Label; 3] = [Label::E, Label::C, Label::U];

    pub fn as_str(self) -> &'static str {
        match self {
            Label::E => "E",
            Label::C => "C",
            Label::U => "U",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A context card. Read-only once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CardRecord", into = "CardRecord")]
pub struct Card {
    pub id: String,
    pub facts: Vec<String>,
    pub question: String,
    pub gold: Verdict,
    pub label: Label,
    pub claim: Claim,
    /// Generated text under test, for extractors that read text.
    pub answer: Option<String>,
}

/// Wire form of a card.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CardRecord {
    id: String,
    facts: Vec<String>,
    question: String,
    gold: Verdict,
    label: Label,
    claim: ClaimRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    answer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClaimRecord {
    subj: String,
    pred: String,
    obj: String,
}

impl TryFrom<CardRecord> for Card {
    type Error = String;

    fn try_from(record: CardRecord) -> Result<Self, Self::Error> {
        if record.id.trim().is_empty() {
            return Err("empty card id".into());
        }
        let iri = |field: &str, value: &str| {
            Iri::new(value).map_err(|_| format!("claim.{field} is not a valid IRI: {value:?}"))
        };
        let claim = Claim::new(
            iri("subj", &record.claim.subj)?,
            iri("pred", &record.claim.pred)?,
            iri("obj", &record.claim.obj)?,
        );
        Ok(Card {
            id: record.id,
            facts: record.facts,
            question: record.question,
            gold: record.gold,
            label: record.label,
            claim,
            answer: record.answer,
        })
    }
}

impl From<Card> for CardRecord {
    fn from(card: Card) -> Self {
        let obj = match &card.claim.object {
            Term::Iri(iri) => iri.as_str().to_string(),
            other => other.to_string(),
        };
        CardRecord {
            id: card.id,
            facts: card.facts,
            question: card.question,
            gold: card.gold,
            label: card.label,
            claim: ClaimRecord {
                subj: card.claim.subject.as_str().to_string(),
                pred: card.claim.predicate.as_str().to_string(),
                obj,
            },
            answer: card.answer,
        }
    }
}

impl Card {
    /// Parse one JSON line. `line` is 1-based and only used in errors.
    pub fn parse_line(text: &str, line: usize) -> Result<Self, MalformedCardError> {
        serde_json::from_str(text).map_err(|e| MalformedCardError {
            line,
            id: card_id_hint(text),
            message: e.to_string(),
        })
    }
}

/// Best-effort id of an invalid card, for error reports.
fn card_id_hint(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value.get("id")?.as_str().map(str::to_string)
}

/// Cards read from one source, plus the lines that failed.
#[derive(Debug, Default)]
pub struct CardBatch {
    pub cards: Vec<Card>,
    pub errors: Vec<MalformedCardError>,
}

/// Parse JSON Lines from any reader. Blank lines are ignored; a line that is not
/// valid UTF-8 is a malformed card like any other.
pub fn parse_cards(reader: impl BufRead) -> std::io::Result<CardBatch> {
    let mut batch = CardBatch::default();
    for (idx, bytes) in reader.split(b'\n').enumerate() {
        let line = idx + 1;
        let parsed = match String::from_utf8(bytes?) {
            Ok(text) => {
                let text = text.trim_end_matches('\r');
                if text.trim().is_empty() {
                    continue;
                }
                Card::parse_line(text, line)
            }
            Err(e) => Err(MalformedCardError {
                line,
                id: None,
                message: format!("invalid UTF-8: {e}"),
            }),
        };
        match parsed {
            Ok(card) => batch.cards.push(card),
            Err(err) => {
                tracing::warn!(line = err.line, id = ?err.id, error = %err.message, "skipping malformed card");
                batch.errors.push(err);
            }
        }
    }
    Ok(batch)
}

/// Read a cards file.
pub fn read_cards(path: &Path) -> Result<CardBatch, OutputError> {
    let read_err = |source: std::io::Error| OutputError::Read {
        path: path.display().to_string(),
        source,
    };
    let file = File::open(path).map_err(read_err)?;
    let batch = parse_cards(BufReader::new(file)).map_err(read_err)?;
    tracing::info!(
        path = %path.display(),
        cards = batch.cards.len(),
        malformed = batch.errors.len(),
        "loaded cards"
    );
    Ok(batch)
}
