//! Tool-call (MCP) retrieval strategy and the run-scoped result cache.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::metrics;
use crate::retriever::{ConfiguredRetriever, SearchRequest};

pub const MCP_SOURCE_TYPE: &str = "mcp";

/// How tool-call retrievers participate in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpStrategy {
    /// Skip tool-call retrieval for the whole run.
    Disabled,
    /// Run once with the original query and share the result.
    #[default]
    Fast,
    /// Run for every sub-query, never cached.
    Deep,
}

impl McpStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            McpStrategy::Disabled => "disabled",
            McpStrategy::Fast => "fast",
            McpStrategy::Deep => "deep",
        }
    }

    /// Like [`FromStr`], but unknown values fall back to `Fast` with a warning.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            warn!(strategy = %value, "unknown MCP strategy, defaulting to fast");
            McpStrategy::Fast
        })
    }

    /// Per-run override, then configured value, then `Fast`.
    pub fn resolve(run_override: Option<&str>, configured: Option<&str>) -> Self {
        run_override
            .into_iter()
            .chain(configured)
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(Self::parse_lenient)
            .unwrap_or_default()
    }
}

impl fmt::Display for McpStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for McpStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(McpStrategy::Disabled),
            "fast" => Ok(McpStrategy::Fast),
            "deep" => Ok(McpStrategy::Deep),
            other => Err(format!("unknown MCP strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallContextEntry {
    pub content: String,
    pub url: String,
    pub title: String,
    pub query: String,
    pub source_type: String,
}

pub type ToolCallEntries = Arc<Vec<ToolCallContextEntry>>;

/// Tool-call results shared by every sub-query of one run.
///
/// The lock is held across population so at most one execution ever
/// happens, even when sub-queries race for the first fill.
#[derive(Debug, Default)]
pub struct ToolCallCache {
    entries: Mutex<Option<ToolCallEntries>>,
}

impl ToolCallCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cached(&self) -> Option<ToolCallEntries> {
        self.entries.lock().await.clone()
    }

    pub async fn is_populated(&self) -> bool {
        self.entries.lock().await.is_some()
    }

    /// Return the cached entries, running `populate` first if the cache is empty.
    pub async fn get_or_populate<F, Fut>(&self, populate: F) -> ToolCallEntries
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Vec<ToolCallContextEntry>>,
    {
        let mut guard = self.entries.lock().await;
        if let Some(entries) = guard.as_ref() {
            return entries.clone();
        }
        let entries = Arc::new(populate().await);
        *guard = Some(entries.clone());
        entries
    }
}

/// Run every tool-call retriever for every query and flatten the hits into
/// context entries. Backend failures yield no entries for that pair.
pub async fn execute_tool_calls(
    queries: &[String],
    retrievers: &[ConfiguredRetriever],
    template: &SearchRequest,
    strategy: McpStrategy,
) -> Vec<ToolCallContextEntry> {
    let mut entries = Vec::new();

    for (idx, query) in queries.iter().enumerate() {
        info!(
            query = %query,
            position = idx + 1,
            total = queries.len(),
            "executing tool-call research"
        );
        let request = template.for_query(query.clone());

        for retriever in retrievers {
            let results = retriever.search_isolated(&request).await;
            metrics::record_tool_call(strategy.as_str(), results.len());

            let before = entries.len();
            entries.extend(
                results
                    .into_iter()
                    .filter(|result| !result.body.is_empty())
                    .map(|result| ToolCallContextEntry {
                        content: result.body,
                        url: result.url,
                        title: result.title,
                        query: query.clone(),
                        source_type: MCP_SOURCE_TYPE.to_string(),
                    }),
            );
            info!(
                retriever = %retriever.name(),
                query = %query,
                added = entries.len() - before,
                "tool-call results collected"
            );
        }
    }

    entries
}
