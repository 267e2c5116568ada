//! Explicit-negation detection in card facts.
//!
//! A negating fact reads `<subject> DOES NOT have <predicate>: <object>`, with
//! optional trailing parentheticals such as `(Michigan) (not in database)`.
//! Trailing parentheticals are dropped on both sides (fact text and IRI local
//! names) before labels are normalised, so `Bear Creek (Michigan)` matches
//! `Bear_Creek_(Michigan)`, `BearCreek` and `Bear_Creek`.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::graph::{Iri, Term};

use super::Claim;

/// Predicate prefixes dropped before predicate labels are compared.
const PREDICATE_PREFIXES: &[&str] = &["have", "has", "is"];

static RE_NEGATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?P<subj>.+?)\s+DOES\s+NOT\s+(?:HAVE|HAS)\s+(?P<rest>.+?)\s*$").unwrap()
});

/// Normalise a label: NFKC, lower-case, alphanumerics only.
pub fn normalize_label(text: &str) -> String {
    text.nfkc()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Human-readable label of an IRI: its local name, underscores as spaces,
/// trailing parenthetical disambiguators removed.
pub fn iri_label(iri: &Iri) -> String {
    let local = iri.local_name().replace('_', " ");
    strip_parentheticals(&local).to_string()
}

/// Label of a claim term: IRI label or literal lexical form.
pub fn term_label(term: &Term) -> String {
    match term {
        Term::Iri(iri) => iri_label(iri),
        Term::Literal(lit) => lit.lexical.clone(),
        Term::Blank(id) => id.clone(),
    }
}

/// Drop every trailing `(...)` group. A label that is nothing but
/// parentheticals is kept as is.
fn strip_parentheticals(text: &str) -> &str {
    let original = text.trim();
    let mut label = original;
    while label.ends_with(')') {
        match label.rfind('(') {
            Some(open) => label = label[..open].trim_end(),
            None => break,
        }
    }
    if label.is_empty() { original } else { label }
}

fn predicate_key(label: &str) -> String {
    let normalized = normalize_label(label);
    PREDICATE_PREFIXES
        .iter()
        .find_map(|prefix| normalized.strip_prefix(prefix).filter(|rest| !rest.is_empty()))
        .map(str::to_string)
        .unwrap_or(normalized)
}

/// A fact split into its negated parts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NegatedFact {
    subject: String,
    /// Text after the `have`/`has` marker: `predicate: object` or `predicate object`.
    rest: String,
}

/// Finds facts that explicitly negate a claim.
#[derive(Debug, Clone)]
pub struct NegationMatcher {
    match_predicate: bool,
}

impl NegationMatcher {
    /// `match_predicate = false` compares subject and object only.
    pub fn new(match_predicate: bool) -> Self {
        Self { match_predicate }
    }

    /// The first fact negating the claim, if any.
    pub fn find<'f>(&self, claim: &Claim, facts: &'f [String]) -> Option<&'f str> {
        let subject = normalize_label(&iri_label(&claim.subject));
        let predicate = predicate_key(&iri_label(&claim.predicate));
        let object = normalize_label(&term_label(&claim.object));
        if subject.is_empty() || object.is_empty() {
            return None;
        }

        facts
            .iter()
            .find(|fact| {
                self.parse(fact).is_some_and(|negated| {
                    normalize_label(&negated.subject) == subject
                        && self.rest_matches(&negated.rest, &predicate, &object)
                })
            })
            .map(String::as_str)
    }

    fn parse(&self, fact: &str) -> Option<NegatedFact> {
        let caps = RE_NEGATION.captures(fact)?;
        let rest = strip_parentheticals(caps.name("rest")?.as_str().trim_end_matches('.'));
        Some(NegatedFact {
            subject: strip_parentheticals(caps.name("subj")?.as_str()).to_string(),
            rest: rest.to_string(),
        })
    }

    fn rest_matches(&self, rest: &str, predicate: &str, object: &str) -> bool {
        if let Some((pred_part, obj_part)) = rest.split_once(':') {
            return normalize_label(obj_part) == object
                && (!self.match_predicate || predicate_key(pred_part) == predicate);
        }
        // Without a colon the boundary between predicate and object is unknown,
        // so match the whole remainder against predicate + object.
        let rest = normalize_label(rest);
        if !self.match_predicate {
            return rest.ends_with(object);
        }
        let Some(pred_part) = rest.strip_suffix(object) else {
            return false;
        };
        !pred_part.is_empty() && predicate_key(pred_part) == predicate
    }
}

impl Default for NegationMatcher {
    fn default() -> Self {
        Self::new(true)
    }
}
