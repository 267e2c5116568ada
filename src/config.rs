//! Engine configuration, read from TOML.
//!
//! Every section has serde defaults, so an empty file is a valid configuration.
//! CLI flags override file values after loading.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::card::Verdict;
use crate::error::ConfigError;
use crate::graph::traverse::RetrievalConfig;
use crate::oracle::OracleConfig;
use crate::shapes::ValidatorConfig;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Knowledge graph file (Turtle, N-Triples or RDF/XML).
    pub graph: Option<PathBuf>,
    /// SHACL-subset shapes file. No file means no constraints.
    pub shapes: Option<PathBuf>,
    pub oracle: OracleConfig,
    pub validator: ValidatorConfig,
    pub retrieval: RetrievalConfig,
    pub extractor: ExtractorConfig,
    pub batch: BatchConfig,
    /// Systems evaluated by `eval`, in output order.
    pub systems: Vec<SystemConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            graph: None,
            shapes: None,
            oracle: OracleConfig::default(),
            validator: ValidatorConfig::default(),
            retrieval: RetrievalConfig::default(),
            extractor: ExtractorConfig::default(),
            batch: BatchConfig::default(),
            systems: vec![
                SystemConfig::Licensing { name: None },
                SystemConfig::Context { name: None },
            ],
        }
    }
}

/// Which claim extractor the licensing systems use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// The claim carried by the card.
    #[default]
    Card,
    /// A remote extraction service.
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub kind: ExtractorKind,
    pub endpoint: Option<String>,
    /// Per-card extraction timeout.
    pub timeout_ms: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            kind: ExtractorKind::Card,
            endpoint: None,
            timeout_ms: 5_000,
        }
    }
}

impl ExtractorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads. `None` uses rayon's global pool.
    pub threads: Option<usize>,
}

/// One system under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SystemConfig {
    /// Extractor plus licensing oracle.
    Licensing {
        #[serde(default)]
        name: Option<String>,
    },
    /// Facts-only baseline.
    Context {
        #[serde(default)]
        name: Option<String>,
    },
    /// Always answers the same verdict.
    Constant { name: String, verdict: Verdict },
    /// Remote system answering cards over HTTP.
    Http {
        name: String,
        endpoint: String,
        #[serde(default = "default_http_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_http_timeout_ms() -> u64 {
    30_000
}

impl SystemConfig {
    /// Name written to result rows.
    pub fn name(&self) -> &str {
        match self {
            SystemConfig::Licensing { name } => {
                name.as_deref().unwrap_or(crate::system::LicensingSystem::DEFAULT_NAME)
            }
            SystemConfig::Context { name } => {
                name.as_deref().unwrap_or(crate::system::ContextOracleSystem::DEFAULT_NAME)
            }
            SystemConfig::Constant { name, .. } | SystemConfig::Http { name, .. } => name,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), systems = config.systems.len(), "loaded config");
        Ok(config)
    }

    /// Check the settings that serde cannot.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        if self.extractor.timeout_ms == 0 {
            return invalid("extractor.timeout_ms must be greater than zero".into());
        }
        if self.extractor.kind == ExtractorKind::Http
            && self.extractor.endpoint.as_deref().is_none_or(str::is_empty)
        {
            return invalid("extractor.kind = \"http\" needs extractor.endpoint".into());
        }
        if self.batch.threads == Some(0) {
            return invalid("batch.threads must be at least 1".into());
        }
        if self.oracle.context_hops.is_some() && self.oracle.context_max_triples == 0 {
            return invalid("oracle.context_max_triples must be greater than zero".into());
        }

        let mut names = BTreeSet::new();
        for system in &self.systems {
            let name = system.name();
            if name.is_empty() {
                return invalid("system names must not be empty".into());
            }
            if !names.insert(name) {
                return invalid(format!("duplicate system name {name:?}"));
            }
            if let SystemConfig::Http {
                endpoint,
                timeout_ms,
                ..
            } = system
            {
                if endpoint.is_empty() {
                    return invalid(format!("system {name:?} needs an endpoint"));
                }
                if *timeout_ms == 0 {
                    return invalid(format!("system {name:?} needs a timeout above zero"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.systems[0].name(), "kg_licensed");
        assert_eq!(config.systems[1].name(), "kg");
    }

    #[test]
    fn parses_sections_and_systems() {
        let text = r#"
graph = "data/kg.ttl"

[oracle]
match_predicate = false
context_hops = 1

[validator]
fail_fast = "never"

[retrieval]
max_hops = 3

[extractor]
timeout_ms = 250

[batch]
threads = 4

[[systems]]
kind = "licensing"

[[systems]]
kind = "constant"
name = "raw_llm"
verdict = "UNKNOWN"

[[systems]]
kind = "http"
name = "rag"
endpoint = "http://localhost:8080/answer"
"#;
        let config: EngineConfig = toml::from_str(text).unwrap();
        assert_eq!(config.graph.as_deref(), Some(Path::new("data/kg.ttl")));
        assert!(!config.oracle.match_predicate);
        assert_eq!(config.oracle.context_hops, Some(1));
        assert_eq!(config.oracle.context_max_triples, 200);
        assert_eq!(config.retrieval.max_hops, 3);
        assert_eq!(config.retrieval.max_triples, 200);
        assert_eq!(config.extractor.timeout(), Duration::from_millis(250));
        assert_eq!(config.batch.threads, Some(4));
        assert_eq!(config.systems.len(), 3);
        assert_eq!(
            config.systems[2],
            SystemConfig::Http {
                name: "rag".into(),
                endpoint: "http://localhost:8080/answer".into(),
                timeout_ms: 30_000,
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inconsistent_settings() {
        let mut config = EngineConfig {
            extractor: ExtractorConfig {
                kind: ExtractorKind::Http,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        config.extractor.kind = ExtractorKind::Card;
        config.systems.push(SystemConfig::Constant {
            name: "kg".into(),
            verdict: Verdict::Yes,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid configuration"));

        config.systems.pop();
        config.batch.threads = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_path_on_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let missing = tmp.path().join("missing.toml");
        assert!(matches!(
            EngineConfig::load(&missing),
            Err(ConfigError::Read { .. })
        ));

        let bad = tmp.path().join("bad.toml");
        std::fs::write(&bad, "[oracle]\nmatch_predicate = \"maybe\"\n").unwrap();
        match EngineConfig::load(&bad) {
            Err(ConfigError::Parse { path, .. }) => assert!(path.ends_with("bad.toml")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
