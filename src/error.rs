//! Rich diagnostic error types for the worldmind licensing engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Only [`GraphLoadError`] is fatal to a run;
//! every other error is recovered at the smallest scope (one claim or one card).

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the worldmind engine.
#[derive(Debug, Error, Diagnostic)]
pub enum WorldmindError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    GraphLoad(#[from] GraphLoadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Card(#[from] MalformedCardError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Output(#[from] OutputError),
}

// ---------------------------------------------------------------------------
// Graph / shape loading errors
// ---------------------------------------------------------------------------

/// A triple or shape source could not be loaded. Fatal: the run cannot evaluate
/// claims against an unknown graph.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphLoadError {
    #[error("failed to read {path}")]
    #[diagnostic(
        code(wm::graph::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported RDF format for {path}")]
    #[diagnostic(
        code(wm::graph::format),
        help("Use a .ttl (Turtle), .nt (N-Triples) or .rdf/.owl (RDF/XML) file.")
    )]
    UnsupportedFormat { path: String },

    #[error("failed to parse {path}: {message}")]
    #[diagnostic(
        code(wm::graph::parse),
        help("The file is not valid in its declared serialization. Nothing was loaded.")
    )]
    Parse { path: String, message: String },

    #[error("malformed triple: {message}")]
    #[diagnostic(
        code(wm::graph::malformed_triple),
        help(
            "Subjects must be IRIs or blank nodes and predicates must be IRIs. \
             The graph was not loaded."
        )
    )]
    MalformedTriple { message: String },

    #[error("invalid IRI: {iri:?}")]
    #[diagnostic(
        code(wm::graph::invalid_iri),
        help("IRIs must be non-empty and may not contain whitespace or any of <>\"{{}}|^`\\.")
    )]
    InvalidIri { iri: String },

    #[error("malformed shape {shape}: {message}")]
    #[diagnostic(
        code(wm::graph::malformed_shape),
        help(
            "Only a SHACL subset is supported: node shapes with targetClass/targetSubjectsOf/\
             targetObjectsOf/targetNode, property shapes with an IRI sh:path and \
             minCount/maxCount/datatype/lessThan/lessThanOrEquals, and wm: interval rules."
        )
    )]
    MalformedShape { shape: String, message: String },
}

// ---------------------------------------------------------------------------
// Card errors
// ---------------------------------------------------------------------------

/// A single card failed schema validation. The card is skipped and logged.
#[derive(Debug, Error, Diagnostic)]
#[error("malformed card at line {line}{}: {message}", id_suffix(.id))]
#[diagnostic(
    code(wm::card::malformed),
    help("Cards are JSON objects with id, facts, question, gold, label and claim {{subj, pred, obj}}.")
)]
pub struct MalformedCardError {
    /// 1-based line number in the cards file.
    pub line: usize,
    /// Card id, when it could be read.
    pub id: Option<String>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Claim extraction errors
// ---------------------------------------------------------------------------

/// Failure of the external claim extractor. Never fatal: mapped to
/// `ABSTAIN / InsufficientEvidence` for the affected card.
#[derive(Debug, Error, Diagnostic)]
pub enum ExtractError {
    #[error("claim extraction timed out after {timeout_ms} ms")]
    #[diagnostic(
        code(wm::extract::timeout),
        help("Increase `extractor.timeout_ms` or check the extractor service.")
    )]
    Timeout { timeout_ms: u64 },

    #[error("claim extraction failed: {message}")]
    #[diagnostic(
        code(wm::extract::failure),
        help("The extractor returned an error or an unreadable payload.")
    )]
    Failure { message: String },
}

// ---------------------------------------------------------------------------
// Validator errors
// ---------------------------------------------------------------------------

/// A rule could not be evaluated. Treated as "not applicable": neither a
/// violation nor a crash.
#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum ValidatorInternalError {
    #[error("cannot compare {left} with {right}")]
    #[diagnostic(code(wm::validate::incomparable))]
    Incomparable { left: String, right: String },

    #[error("value {value} is not numeric or temporal")]
    #[diagnostic(code(wm::validate::unordered_value))]
    UnorderedValue { value: String },
}

// ---------------------------------------------------------------------------
// Oracle errors
// ---------------------------------------------------------------------------

/// Errors while evaluating one claim. Recovered as `InsufficientEvidence`.
#[derive(Debug, Error, Diagnostic)]
pub enum OracleError {
    #[error("invalid claim: {message}")]
    #[diagnostic(
        code(wm::oracle::invalid_claim),
        help("Claims need an IRI subject, an IRI predicate and an IRI or literal object.")
    )]
    InvalidClaim { message: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(wm::config::read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(wm::config::parse),
        help("Check the TOML syntax and field names in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(wm::config::invalid), help("{message}"))]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Output errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum OutputError {
    #[error("failed to write {path}")]
    #[diagnostic(
        code(wm::output::write),
        help("Ensure the output directory is writable and the disk is not full.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}")]
    #[diagnostic(code(wm::output::read))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed result row at line {line}: {message}")]
    #[diagnostic(
        code(wm::output::malformed_row),
        help("Result rows need id, gold, pred, pass, system and label fields.")
    )]
    MalformedRow { line: usize, message: String },
}

fn id_suffix(id: &Option<String>) -> String {
    id.as_ref().map(|i| format!(" ({i})")).unwrap_or_default()
}

/// Convenience alias for functions returning worldmind results.
pub type WmResult<T> = std::result::Result<T, WorldmindError>;
