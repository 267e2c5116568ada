//! Claim extraction: turning a card (or its generated answer) into claims.
//!
//! Extraction is the one step that may wait on something outside the process,
//! so every extractor can be wrapped in a [`BoundedExtractor`]. Callers map any
//! [`ExtractError`] to insufficient evidence, never to an answer.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::error::ExtractError;
use crate::graph::{Iri, Literal, Term};
use crate::oracle::Claim;

/// Produces the claims a card asserts.
pub trait ClaimExtractor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn extract(&self, card: &Card) -> Result<Vec<Claim>, ExtractError>;
}

/// Uses the structured claim carried by the card itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardClaimExtractor;

impl ClaimExtractor for CardClaimExtractor {
    fn name(&self) -> &str {
        "card"
    }

    fn extract(&self, card: &Card) -> Result<Vec<Claim>, ExtractError> {
        Ok(vec![card.claim.clone()])
    }
}

// ---------------------------------------------------------------------------
// HTTP extractor
// ---------------------------------------------------------------------------

/// A claim as returned by an extraction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimPayload {
    pub subj: String,
    pub pred: String,
    /// An IRI, or any other string as a plain literal.
    pub obj: String,
    #[serde(default)]
    pub negated: bool,
}

impl ClaimPayload {
    pub fn into_claim(self) -> Result<Claim, ExtractError> {
        let iri = |value: &str| {
            Iri::new(value).map_err(|e| ExtractError::Failure {
                message: e.to_string(),
            })
        };
        let object = match Iri::new(&self.obj) {
            Ok(iri) => Term::Iri(iri),
            Err(_) => Term::Literal(Literal::string(self.obj)),
        };
        let mut claim = Claim::new(iri(&self.subj)?, iri(&self.pred)?, object);
        claim.negated = self.negated;
        Ok(claim)
    }
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    claims: Vec<ClaimPayload>,
}

/// Posts the card's generated answer (or its question) to an extraction
/// service and reads back `{"claims": [{subj, pred, obj, negated}]}`.
#[derive(Debug, Clone)]
pub struct HttpClaimExtractor {
    endpoint: String,
    timeout: Duration,
}

impl HttpClaimExtractor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

impl ClaimExtractor for HttpClaimExtractor {
    fn name(&self) -> &str {
        "http"
    }

    fn extract(&self, card: &Card) -> Result<Vec<Claim>, ExtractError> {
        let body = serde_json::json!({
            "id": card.id,
            "text": card.answer.as_deref().unwrap_or(&card.question),
            "facts": card.facts,
        });
        let json = post_json(&self.endpoint, &body, self.timeout)
            .map_err(|message| ExtractError::Failure { message })?;
        let response: ExtractResponse =
            serde_json::from_value(json).map_err(|e| ExtractError::Failure {
                message: format!("unexpected extractor payload: {e}"),
            })?;
        response
            .claims
            .into_iter()
            .map(ClaimPayload::into_claim)
            .collect()
    }
}

/// POST a JSON body and parse a JSON reply. Errors are rendered as messages.
pub(crate) fn post_json(
    url: &str,
    body: &serde_json::Value,
    timeout: Duration,
) -> Result<serde_json::Value, String> {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let body_str = serde_json::to_string(body).map_err(|e| format!("JSON serialize error: {e}"))?;

    let resp = match agent
        .post(url)
        .set("Content-Type", "application/json")
        .send_string(&body_str)
    {
        Ok(resp) => resp,
        Err(ureq::Error::Status(code, resp)) => {
            let text = resp.into_string().unwrap_or_default();
            let preview: String = text.chars().take(200).collect();
            return Err(format!("HTTP error {code} from {url}: {preview}"));
        }
        Err(ureq::Error::Transport(transport)) => {
            return Err(format!("transport error calling {url}: {transport}"));
        }
    };

    let resp_str = resp.into_string().map_err(|e| e.to_string())?;
    serde_json::from_str(&resp_str).map_err(|e| format!("invalid JSON from {url}: {e}"))
}

// ---------------------------------------------------------------------------
// Timeout wrapper
// ---------------------------------------------------------------------------

/// Bounds any extractor by a wall-clock timeout.
///
/// The inner call runs on its own thread. On timeout the caller gets
/// [`ExtractError::Timeout`] at once; the abandoned call finishes in the
/// background and its result is dropped.
pub struct BoundedExtractor {
    inner: Arc<dyn ClaimExtractor>,
    timeout: Duration,
}

impl BoundedExtractor {
    pub fn new(inner: Arc<dyn ClaimExtractor>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl ClaimExtractor for BoundedExtractor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn extract(&self, card: &Card) -> Result<Vec<Claim>, ExtractError> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let card = card.clone();
        std::thread::Builder::new()
            .name(format!("extract-{}", card.id))
            .spawn(move || {
                // The receiver may be gone after a timeout.
                let _ = tx.send(inner.extract(&card));
            })
            .map_err(|e| ExtractError::Failure {
                message: format!("failed to spawn extractor thread: {e}"),
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ExtractError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ExtractError::Failure {
                message: "extractor thread exited without a result".into(),
            }),
        }
    }
}

impl std::fmt::Debug for BoundedExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedExtractor")
            .field("inner", &self.inner.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
