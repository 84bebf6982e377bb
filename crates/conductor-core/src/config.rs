use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ConductorError;
use crate::conductor::ResearchOptions;
use crate::mcp::McpStrategy;

const DEFAULT_CONFIG_PATH: &str = "conductor.toml";
const CONFIG_PATH_ENV: &str = "CONDUCTOR_CONFIG";

pub const REPORT_SOURCE_ENV: &str = "CONDUCTOR_REPORT_SOURCE";
pub const MCP_STRATEGY_ENV: &str = "CONDUCTOR_MCP_STRATEGY";
pub const CURATE_SOURCES_ENV: &str = "CONDUCTOR_CURATE_SOURCES";
pub const DOC_PATH_ENV: &str = "CONDUCTOR_DOC_PATH";

/// Report type whose runs skip appending the original query to the plan.
pub const SUBTOPIC_REPORT: &str = "subtopic_report";

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Apply `CONDUCTOR_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = lookup(REPORT_SOURCE_ENV) {
            match value.parse() {
                Ok(source) => self.research.report_source = source,
                Err(err) => warn!(env = REPORT_SOURCE_ENV, error = %err, "ignoring override"),
            }
        }
        if let Some(value) = lookup(MCP_STRATEGY_ENV) {
            self.research.mcp_strategy = value.trim().to_string();
        }
        if let Some(value) = lookup(CURATE_SOURCES_ENV) {
            match parse_bool(&value) {
                Some(flag) => self.research.curate_sources = flag,
                None => warn!(env = CURATE_SOURCES_ENV, value = %value, "ignoring override"),
            }
        }
        if let Some(value) = lookup(DOC_PATH_ENV) {
            self.research.doc_path = PathBuf::from(value);
        }
    }
}

/// Helper to load configuration with best-practice guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `CONDUCTOR_CONFIG` environment variable.
    /// 3. `conductor.toml` in the current working directory.
    ///
    /// Only the implicit default may be absent; it then yields built-in
    /// defaults. Environment overrides are applied last.
    pub fn load(path: Option<PathBuf>) -> Result<Config, ConductorError> {
        let (candidate, explicit) = resolve_path(path);
        let mut config = if !explicit && !candidate.exists() {
            Config::default()
        } else {
            let raw = fs::read_to_string(&candidate)
                .map_err(|err| ConductorError::config_io(candidate.clone(), err))?;
            Self::parse(&raw)?
        };

        config.apply_env_overrides();
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Config, ConductorError> {
        toml::from_str(raw).map_err(|err| ConductorError::InvalidConfiguration(err.to_string()))
    }

    fn validate(config: &Config) -> Result<(), ConductorError> {
        if config.research.max_search_results_per_query == 0 {
            return Err(ConductorError::InvalidConfiguration(
                "research.max_search_results_per_query must be at least 1".into(),
            ));
        }
        if config.research.report_type.trim().is_empty() {
            return Err(ConductorError::InvalidConfiguration(
                "research.report_type must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> (PathBuf, bool) {
    if let Some(path) = path {
        return (path, true);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return (PathBuf::from(from_env), true);
        }
    }

    (Path::new(DEFAULT_CONFIG_PATH).to_path_buf(), false)
}

/// Where a run gathers its context from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    #[default]
    Web,
    Local,
    Hybrid,
    #[serde(alias = "langchain_documents")]
    Documents,
    #[serde(alias = "langchain_vectorstore")]
    VectorStore,
}

impl ReportSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportSource::Web => "web",
            ReportSource::Local => "local",
            ReportSource::Hybrid => "hybrid",
            ReportSource::Documents => "documents",
            ReportSource::VectorStore => "vector_store",
        }
    }
}

impl fmt::Display for ReportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "web" => Ok(ReportSource::Web),
            "local" => Ok(ReportSource::Local),
            "hybrid" => Ok(ReportSource::Hybrid),
            "documents" | "langchain_documents" => Ok(ReportSource::Documents),
            "vector_store" | "vectorstore" | "langchain_vectorstore" => {
                Ok(ReportSource::VectorStore)
            }
            other => Err(format!("unknown report source '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub report_source: ReportSource,
    pub report_type: String,
    pub max_search_results_per_query: usize,
    pub max_sub_queries: usize,
    pub curate_sources: bool,
    /// Raw strategy name; unknown values resolve to `fast` at run time.
    pub mcp_strategy: String,
    pub doc_path: PathBuf,
    pub images_per_scrape: usize,
    /// Fallback retrievers run until this many results have accumulated.
    pub min_search_results: usize,
    pub verbose: bool,
    pub agent_role: Option<String>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            report_source: ReportSource::Web,
            report_type: "research_report".into(),
            max_search_results_per_query: 5,
            max_sub_queries: 3,
            curate_sources: false,
            mcp_strategy: McpStrategy::Fast.as_str().into(),
            doc_path: PathBuf::from("./my-docs"),
            images_per_scrape: 4,
            min_search_results: 1,
            verbose: true,
            agent_role: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            log_dir: None,
        }
    }
}

/// Settings for one run: per-run override, then configuration, then default.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub report_source: ReportSource,
    pub report_type: String,
    pub mcp_strategy: McpStrategy,
    pub curate_sources: bool,
    pub verbose: bool,
    pub max_search_results: usize,
    pub max_sub_queries: usize,
    pub images_per_scrape: usize,
    pub min_search_results: usize,
    pub doc_path: PathBuf,
    pub role: Option<String>,
}

impl RunSettings {
    pub fn resolve(config: &ResearchConfig, options: &ResearchOptions) -> Self {
        let report_type = options
            .report_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&config.report_type)
            .to_string();

        Self {
            report_source: options.report_source.unwrap_or(config.report_source),
            report_type,
            mcp_strategy: McpStrategy::resolve(
                options.mcp_strategy.as_deref(),
                Some(config.mcp_strategy.as_str()),
            ),
            curate_sources: options.curate_sources.unwrap_or(config.curate_sources),
            verbose: options.verbose.unwrap_or(config.verbose),
            max_search_results: config.max_search_results_per_query.max(1),
            max_sub_queries: config.max_sub_queries,
            images_per_scrape: config.images_per_scrape,
            min_search_results: config.min_search_results,
            doc_path: config.doc_path.clone(),
            role: options.role.clone().or_else(|| config.agent_role.clone()),
        }
    }

    pub fn is_subtopic_report(&self) -> bool {
        self.report_type == SUBTOPIC_REPORT
    }
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
