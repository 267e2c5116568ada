//! Systems under evaluation.
//!
//! The harness only sees [`EvaluationSystem`]: a name and `answer(card)`. The
//! graph-licensed oracle, the facts-only baseline, stubbed model adapters and
//! remote services are all interchangeable behind it.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::card::{Card, Verdict};
use crate::extract::{ClaimExtractor, post_json};
use crate::graph::Term;
use crate::oracle::negation::{iri_label, normalize_label, term_label};
use crate::oracle::{Action, CardDecision, LicensingOracle, Reason};

/// A system's answer to one card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub pred: Verdict,
    /// Reason code, when the system gives one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// A recovered error, reported in the batch error log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Prediction {
    pub fn new(pred: Verdict) -> Self {
        Self {
            pred,
            reason: None,
            error: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Anything that can answer a context card.
pub trait EvaluationSystem: Send + Sync {
    /// Name written to the `system` field of result rows.
    fn name(&self) -> &str;

    fn answer(&self, card: &Card) -> Prediction;
}

/// Map a card decision to a verdict: answers are YES, explicit contradictions
/// and constraint violations NO, anything else UNKNOWN.
pub fn verdict_for(decision: &CardDecision) -> Verdict {
    match (decision.action(), decision.reason()) {
        (Action::Answer, _) => Verdict::Yes,
        (Action::Abstain, Reason::ExplicitContradiction | Reason::ConstraintViolation) => {
            Verdict::No
        }
        (Action::Abstain, _) => Verdict::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Graph-licensed system
// ---------------------------------------------------------------------------

/// Extractor plus licensing oracle.
pub struct LicensingSystem {
    name: String,
    extractor: Arc<dyn ClaimExtractor>,
    oracle: Arc<LicensingOracle>,
}

impl LicensingSystem {
    pub const DEFAULT_NAME: &'static str = "kg_licensed";

    pub fn new(extractor: Arc<dyn ClaimExtractor>, oracle: Arc<LicensingOracle>) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            extractor,
            oracle,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The full card decision, for callers that want the evidence.
    pub fn decide(&self, card: &Card) -> Result<CardDecision, crate::error::ExtractError> {
        let claims = self.extractor.extract(card)?;
        Ok(self.oracle.evaluate_card(&claims, &card.facts))
    }
}

impl EvaluationSystem for LicensingSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn answer(&self, card: &Card) -> Prediction {
        match self.decide(card) {
            Ok(decision) => {
                Prediction::new(verdict_for(&decision)).with_reason(decision.reason().to_string())
            }
            Err(err) => {
                tracing::warn!(
                    card = %card.id,
                    extractor = self.extractor.name(),
                    error = %err,
                    "claim extraction failed, abstaining"
                );
                Prediction::new(Verdict::Unknown)
                    .with_reason(Reason::InsufficientEvidence.to_string())
                    .with_error(err.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Facts-only baseline
// ---------------------------------------------------------------------------

/// Decides from the card's facts alone, without the graph.
///
/// A fact stating `DOES NOT` and naming both subject and object gives NO; any
/// other fact naming both gives YES; otherwise UNKNOWN.
#[derive(Debug, Clone)]
pub struct ContextOracleSystem {
    name: String,
}

impl ContextOracleSystem {
    pub const DEFAULT_NAME: &'static str = "kg";

    pub fn new() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for ContextOracleSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationSystem for ContextOracleSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn answer(&self, card: &Card) -> Prediction {
        let subject = normalize_label(&iri_label(&card.claim.subject));
        let object = normalize_label(&term_label(&card.claim.object));
        let names_both = |fact: &str| {
            let fact = normalize_label(fact);
            fact.contains(&subject) && fact.contains(&object)
        };
        let negates = |fact: &str| fact.to_uppercase().contains("DOES NOT");

        if card.facts.iter().any(|f| negates(f) && names_both(f)) {
            return Prediction::new(Verdict::No).with_reason(Reason::ExplicitContradiction.to_string());
        }
        if card.facts.iter().any(|f| !negates(f) && names_both(f)) {
            return Prediction::new(Verdict::Yes).with_reason(Reason::EntailedReason.to_string());
        }
        Prediction::new(Verdict::Unknown).with_reason(Reason::InsufficientEvidence.to_string())
    }
}

// ---------------------------------------------------------------------------
// Stubs and remote systems
// ---------------------------------------------------------------------------

/// Always gives the same verdict. Stands in for model adapters that are not
/// wired up.
#[derive(Debug, Clone)]
pub struct ConstantSystem {
    name: String,
    verdict: Verdict,
}

impl ConstantSystem {
    pub fn new(name: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            name: name.into(),
            verdict,
        }
    }
}

impl EvaluationSystem for ConstantSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn answer(&self, _card: &Card) -> Prediction {
        Prediction::new(self.verdict)
    }
}

/// Posts the question side of a card to a remote service that replies `{"pred": "YES"|"NO"|"UNKNOWN"}`.
///
/// Any failure gives UNKNOWN: an unreachable system does not answer.
#[derive(Debug, Clone)]
pub struct HttpSystem {
    name: String,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct HttpReply {
    pred: Verdict,
    #[serde(default)]
    reason: Option<String>,
}

impl HttpSystem {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

/// The request a remote system sees: never the gold verdict or the label.
fn request_body(card: &Card) -> serde_json::Value {
    let obj = match &card.claim.object {
        Term::Iri(iri) => iri.as_str().to_string(),
        other => other.to_string(),
    };
    serde_json::json!({
        "id": card.id,
        "facts": card.facts,
        "question": card.question,
        "claim": {
            "subj": card.claim.subject.as_str(),
            "pred": card.claim.predicate.as_str(),
            "obj": obj,
        },
    })
}

impl EvaluationSystem for HttpSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn answer(&self, card: &Card) -> Prediction {
        let reply = post_json(&self.endpoint, &request_body(card), self.timeout).and_then(|json| {
            serde_json::from_value::<HttpReply>(json).map_err(|e| format!("unexpected reply: {e}"))
        });
        match reply {
            Ok(reply) => {
                let prediction = Prediction::new(reply.pred);
                match reply.reason {
                    Some(reason) => prediction.with_reason(reason),
                    None => prediction,
                }
            }
            Err(message) => {
                tracing::warn!(system = %self.name, card = %card.id, error = %message, "remote system failed");
                Prediction::new(Verdict::Unknown).with_error(message)
            }
        }
    }
}
