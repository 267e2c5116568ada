//! worldmind CLI: knowledge-graph licensing and abstention metrics.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use worldmind::card;
use worldmind::config::EngineConfig;
use worldmind::engine::{self, Engine};
use worldmind::graph::traverse::RetrievalConfig;
use worldmind::graph::{Iri, Literal, Term};
use worldmind::harness::{self, ErrorRecord};
use worldmind::metrics::{self, SystemMetrics};
use worldmind::oracle::Claim;

#[derive(Parser)]
#[command(name = "worldmind", version, about = "Knowledge-graph licensing for generated claims")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Knowledge graph file (overrides `graph` in the config).
    #[arg(long, global = true)]
    graph: Option<PathBuf>,

    /// Shapes file (overrides `shapes` in the config).
    #[arg(long, global = true)]
    shapes: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show counts for the loaded graph and shapes.
    Info,

    /// Validate the graph against the shapes. Exits non-zero when it does not conform.
    Validate,

    /// Print the bounded neighbourhood of an entity as N-Triples.
    Retrieve {
        /// Seed entity IRI.
        seed: String,

        /// Maximum number of hops.
        #[arg(long)]
        hops: Option<usize>,

        /// Maximum number of triples.
        #[arg(long)]
        max_triples: Option<usize>,
    },

    /// Decide one claim and print the decision as JSON.
    Check {
        subject: String,
        predicate: String,
        object: String,

        /// Treat the object as a plain literal instead of an IRI.
        #[arg(long)]
        literal: bool,

        /// The claim is asserted as false.
        #[arg(long)]
        negated: bool,

        /// Card fact (repeatable).
        #[arg(long = "fact")]
        facts: Vec<String>,
    },

    /// Run every configured system over a cards file.
    Eval {
        /// Cards (JSON Lines).
        #[arg(long)]
        cards: PathBuf,

        /// Result rows (JSON Lines).
        #[arg(long, default_value = "results.jsonl")]
        out: PathBuf,

        /// Error log (JSON Lines). Defaults to `<out>.errors.jsonl`.
        #[arg(long)]
        errors: Option<PathBuf>,

        /// Worker threads (overrides `batch.threads`).
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Compute abstention metrics from result rows.
    Metrics {
        /// Result rows (JSON Lines).
        #[arg(long)]
        results: PathBuf,

        /// Write the metrics JSON here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Also print the confusion-matrix report.
        #[arg(long)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = engine::load_config(cli.config.as_deref())?;
    if cli.graph.is_some() {
        config.graph = cli.graph.clone();
    }
    if cli.shapes.is_some() {
        config.shapes = cli.shapes.clone();
    }

    match cli.command {
        Commands::Info => {
            let engine = Engine::load(config)?;
            println!("{}", engine.info());
        }

        Commands::Validate => {
            let engine = Engine::load(config)?;
            let report = engine.validate();
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
            if !report.conforms {
                eprintln!(
                    "graph does not conform: {} hard violation(s)",
                    report.hard_violations().count()
                );
                std::process::exit(1);
            }
        }

        Commands::Retrieve {
            seed,
            hops,
            max_triples,
        } => {
            let defaults = config.retrieval.clone();
            let engine = Engine::load(config)?;
            let seed = Term::iri(&seed)?;
            let limits = RetrievalConfig {
                max_hops: hops.unwrap_or(defaults.max_hops),
                max_triples: max_triples.unwrap_or(defaults.max_triples),
            };
            let subgraph = engine.retrieve(&seed, Some(&limits));
            print!("{}", subgraph.to_ntriples());
            if subgraph.truncated {
                eprintln!("(truncated at {} triples)", limits.max_triples);
            }
        }

        Commands::Check {
            subject,
            predicate,
            object,
            literal,
            negated,
            facts,
        } => {
            let engine = Engine::load(config)?;
            let object = if literal {
                Term::Literal(Literal::string(object))
            } else {
                Term::iri(&object)?
            };
            let mut claim = Claim::new(Iri::new(&subject)?, Iri::new(&predicate)?, object);
            claim.negated = negated;
            let decision = engine.check(&claim, &facts);
            println!("{}", serde_json::to_string_pretty(&decision).into_diagnostic()?);
        }

        Commands::Eval {
            cards,
            out,
            errors,
            threads,
        } => {
            if threads.is_some() {
                config.batch.threads = threads;
            }
            run_eval(config, &cards, &out, errors)?;
        }

        Commands::Metrics {
            results,
            out,
            verbose,
        } => {
            let rows = metrics::read_results(&results)?;
            let by_system = metrics::metrics_by_system(&rows);
            if verbose {
                for (system, m) in &by_system {
                    eprintln!("{}", metrics::render_report(system, m));
                }
            }
            write_metrics(&by_system, out.as_deref())?;
        }
    }

    Ok(())
}

fn run_eval(config: EngineConfig, cards: &Path, out: &Path, errors: Option<PathBuf>) -> Result<()> {
    let engine = Engine::load(config)?;
    let batch = card::read_cards(cards)?;

    let harness = engine.harness();
    harness.cancel_on_signals().into_diagnostic()?;
    let outcome = harness.run(&batch.cards);
    if outcome.cancelled {
        miette::bail!("evaluation cancelled, no results written");
    }

    harness::write_jsonl(out, &outcome.results)?;

    let mut error_rows: Vec<ErrorRecord> = batch.errors.iter().map(ErrorRecord::from).collect();
    error_rows.extend(outcome.errors);
    let errors_path = errors.unwrap_or_else(|| out.with_extension("errors.jsonl"));
    harness::write_jsonl(&errors_path, &error_rows)?;

    let by_system: BTreeMap<String, SystemMetrics> = outcome
        .matrices
        .into_iter()
        .map(|(system, matrix)| (system, SystemMetrics::from_matrix(matrix)))
        .collect();
    write_metrics(&by_system, None)?;

    println!(
        "Evaluated {} cards ({} skipped, {} errors) -> {}",
        batch.cards.len(),
        batch.errors.len(),
        error_rows.len(),
        out.display()
    );
    Ok(())
}

fn write_metrics(by_system: &BTreeMap<String, SystemMetrics>, out: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(by_system).into_diagnostic()?;
    match out {
        Some(path) => {
            std::fs::write(path, json + "\n").map_err(|source| worldmind::error::OutputError::Write {
                path: path.display().to_string(),
                source,
            })?;
            eprintln!("Wrote metrics to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
