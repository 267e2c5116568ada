//! Ordered values for comparison and interval rules.
//!
//! Numbers compare as `f64`; `xsd:date`, `xsd:dateTime` and `xsd:gYear` compare
//! as calendar days. Values of different kinds never compare.

use std::cmp::Ordering;

use chrono::{Datelike, DateTime, NaiveDate, NaiveDateTime};

use crate::error::ValidatorInternalError;
use crate::graph::{Literal, Term, XSD, XSD_STRING};

const NUMERIC_TYPES: &[&str] = &[
    "integer",
    "decimal",
    "double",
    "float",
    "int",
    "long",
    "short",
    "byte",
    "nonNegativeInteger",
    "positiveInteger",
    "nonPositiveInteger",
    "negativeInteger",
    "unsignedInt",
    "unsignedLong",
    "unsignedShort",
    "unsignedByte",
];

/// A value with a total order within its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderedValue {
    Number(f64),
    /// Days since the common era.
    Day(i64),
}

impl OrderedValue {
    /// Interpret a term as an ordered value.
    pub fn from_term(term: &Term) -> Result<Self, ValidatorInternalError> {
        let unordered = || ValidatorInternalError::UnorderedValue {
            value: term.to_string(),
        };
        let lit = term.as_literal().ok_or_else(unordered)?;
        Self::from_literal(lit).ok_or_else(unordered)
    }

    fn from_literal(lit: &Literal) -> Option<Self> {
        let lexical = lit.lexical.trim();
        let datatype = lit.datatype.as_str();
        let local = datatype.strip_prefix(XSD).unwrap_or("");

        if NUMERIC_TYPES.contains(&local) || datatype == XSD_STRING || lit.language.is_some() {
            return parse_number(lexical).map(OrderedValue::Number);
        }
        let date = match local {
            "date" => parse_date(lexical)?,
            "dateTime" => parse_date_time(lexical)?,
            "gYear" => NaiveDate::from_ymd_opt(lexical.parse().ok()?, 1, 1)?,
            _ => return None,
        };
        Some(OrderedValue::Day(i64::from(date.num_days_from_ce())))
    }

    /// Compare two values of the same kind.
    pub fn compare(&self, other: &Self) -> Result<Ordering, ValidatorInternalError> {
        match (self, other) {
            (OrderedValue::Number(a), OrderedValue::Number(b)) => {
                a.partial_cmp(b)
                    .ok_or_else(|| ValidatorInternalError::Incomparable {
                        left: a.to_string(),
                        right: b.to_string(),
                    })
            }
            (OrderedValue::Day(a), OrderedValue::Day(b)) => Ok(a.cmp(b)),
            (a, b) => Err(ValidatorInternalError::Incomparable {
                left: format!("{a:?}"),
                right: format!("{b:?}"),
            }),
        }
    }
}

fn parse_number(lexical: &str) -> Option<f64> {
    lexical.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_date(lexical: &str) -> Option<NaiveDate> {
    // Timezone suffixes ("2001-10-26Z", "2001-10-26+02:00") are ignored.
    let head = lexical.get(..10).unwrap_or(lexical);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn parse_date_time(lexical: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(lexical) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(lexical, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.date())
}

/// A closed interval whose end may be open towards +infinity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: OrderedValue,
    /// `None` means unbounded.
    pub end: Option<OrderedValue>,
}

impl Interval {
    /// Build an interval from the start and end values of a focus node.
    ///
    /// Several values widen the interval (earliest start, latest end). No start
    /// value means there is no interval; no end value means an open end.
    pub fn from_values(starts: &[Term], ends: &[Term]) -> Result<Option<Self>, ValidatorInternalError> {
        let Some(start) = extreme(starts, Ordering::Less)? else {
            return Ok(None);
        };
        let end = extreme(ends, Ordering::Greater)?;
        Ok(Some(Self { start, end }))
    }

    /// `[s1,e1]` and `[s2,e2]` overlap iff `s1 <= e2` and `s2 <= e1`.
    pub fn overlaps(&self, other: &Interval) -> Result<bool, ValidatorInternalError> {
        Ok(starts_before_end(&self.start, other.end.as_ref())?
            && starts_before_end(&other.start, self.end.as_ref())?)
    }
}

fn starts_before_end(start: &OrderedValue, end: Option<&OrderedValue>) -> Result<bool, ValidatorInternalError> {
    match end {
        None => Ok(true),
        Some(end) => Ok(start.compare(end)? != Ordering::Greater),
    }
}

/// Smallest (`Less`) or largest (`Greater`) value of a list.
fn extreme(terms: &[Term], keep: Ordering) -> Result<Option<OrderedValue>, ValidatorInternalError> {
    let mut best: Option<OrderedValue> = None;
    for term in terms {
        let value = OrderedValue::from_term(term)?;
        best = match best {
            Some(current) if current.compare(&value)? != keep.reverse() => Some(current),
            _ => Some(value),
        };
    }
    Ok(best)
}
