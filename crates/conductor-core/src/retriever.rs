use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics;

/// One hit returned by a retrieval backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(alias = "href")]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl SearchResult {
    pub fn new(url: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Everything a backend receives for one search.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub headers: HashMap<String, String>,
    pub query_domains: Vec<String>,
    pub max_results: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, max_results: usize) -> Self {
        Self {
            query: query.into(),
            max_results,
            ..Default::default()
        }
    }

    /// Same headers and domains, different query.
    pub fn for_query(&self, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..self.clone()
        }
    }
}

/// Uniform contract across web-search and tool-call providers. Backends may
/// fail; callers always go through [`ConfiguredRetriever::search_isolated`].
#[async_trait]
pub trait RetrieverBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> anyhow::Result<Vec<SearchResult>>;
}

/// Capability tag fixed when the retriever is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverKind {
    Web,
    ToolCall,
}

impl RetrieverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrieverKind::Web => "web",
            RetrieverKind::ToolCall => "tool_call",
        }
    }
}

#[derive(Clone)]
pub struct ConfiguredRetriever {
    name: String,
    kind: RetrieverKind,
    backend: Arc<dyn RetrieverBackend>,
}

impl ConfiguredRetriever {
    pub fn new(
        name: impl Into<String>,
        kind: RetrieverKind,
        backend: Arc<dyn RetrieverBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            backend,
        }
    }

    pub fn web(name: impl Into<String>, backend: Arc<dyn RetrieverBackend>) -> Self {
        Self::new(name, RetrieverKind::Web, backend)
    }

    pub fn tool_call(name: impl Into<String>, backend: Arc<dyn RetrieverBackend>) -> Self {
        Self::new(name, RetrieverKind::ToolCall, backend)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RetrieverKind {
        self.kind
    }

    pub fn is_tool_call(&self) -> bool {
        self.kind == RetrieverKind::ToolCall
    }

    /// Run the backend, converting any failure into an empty result set.
    pub async fn search_isolated(&self, request: &SearchRequest) -> Vec<SearchResult> {
        debug!(retriever = %self.name, query = %request.query, "searching");
        match self.backend.search(request).await {
            Ok(results) => {
                info!(
                    retriever = %self.name,
                    query = %request.query,
                    count = results.len(),
                    "received search results"
                );
                results
            }
            Err(err) => {
                warn!(
                    retriever = %self.name,
                    kind = self.kind.as_str(),
                    query = %request.query,
                    error = %err,
                    "retriever failed; treating as zero results"
                );
                metrics::record_backend_failure(&self.name, self.kind.as_str());
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for ConfiguredRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredRetriever")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Retrievers partitioned by capability once, at configuration time.
#[derive(Debug, Clone, Default)]
pub struct Retrievers {
    web: Vec<ConfiguredRetriever>,
    tool_call: Vec<ConfiguredRetriever>,
}

impl Retrievers {
    pub fn new(retrievers: impl IntoIterator<Item = ConfiguredRetriever>) -> Self {
        let (tool_call, web) = retrievers
            .into_iter()
            .partition(ConfiguredRetriever::is_tool_call);
        Self { web, tool_call }
    }

    pub fn push(&mut self, retriever: ConfiguredRetriever) {
        match retriever.kind() {
            RetrieverKind::Web => self.web.push(retriever),
            RetrieverKind::ToolCall => self.tool_call.push(retriever),
        }
    }

    pub fn web(&self) -> &[ConfiguredRetriever] {
        &self.web
    }

    pub fn tool_call(&self) -> &[ConfiguredRetriever] {
        &self.tool_call
    }

    pub fn has_tool_call(&self) -> bool {
        !self.tool_call.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.web
            .iter()
            .chain(self.tool_call.iter())
            .map(|retriever| retriever.name().to_string())
            .collect()
    }

    /// Web search through the first web retriever, falling back to the rest.
    pub async fn search_web(&self, request: &SearchRequest, min_results: usize) -> Vec<SearchResult> {
        match self.web.split_first() {
            Some((primary, fallbacks)) => {
                search_with_fallback(request, primary, fallbacks, min_results).await
            }
            None => Vec::new(),
        }
    }
}

/// Query `primary`, then each fallback in order until at least `min_results`
/// hits have accumulated. Never fails.
pub async fn search_with_fallback(
    request: &SearchRequest,
    primary: &ConfiguredRetriever,
    fallbacks: &[ConfiguredRetriever],
    min_results: usize,
) -> Vec<SearchResult> {
    let mut results = primary.search_isolated(request).await;

    for fallback in fallbacks {
        if results.len() >= min_results {
            break;
        }
        info!(
            primary = %primary.name(),
            fallback = %fallback.name(),
            have = results.len(),
            want = min_results,
            "too few results; trying fallback retriever"
        );
        results.extend(fallback.search_isolated(request).await);
    }

    results
}
