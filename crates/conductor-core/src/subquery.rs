use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use rand::seq::SliceRandom;
use serde_json::{Value, json};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::combiner::combine_context;
use crate::conductor::ResearchComponents;
use crate::config::RunSettings;
use crate::events::{ProgressEvent, ProgressKind};
use crate::mcp::{McpStrategy, ToolCallCache, ToolCallEntries, execute_tool_calls};
use crate::memory::VectorFilter;
use crate::metrics;
use crate::retriever::SearchRequest;
use crate::scraper::ScrapedDocument;
use crate::state::ResearchState;

/// Everything one run shares across its concurrent tasks.
pub(crate) struct RunScope {
    pub(crate) run_id: String,
    pub(crate) query: String,
    pub(crate) components: ResearchComponents,
    pub(crate) settings: RunSettings,
    /// Headers, domains and result limit; the query is swapped per search.
    pub(crate) request: SearchRequest,
    pub(crate) state: Arc<ResearchState>,
    pub(crate) tool_cache: ToolCallCache,
}

impl RunScope {
    pub(crate) fn emit(&self, kind: ProgressKind, message: impl Into<String>) {
        if self.settings.verbose {
            self.components
                .progress
                .emit(ProgressEvent::new(kind, message));
        }
    }

    pub(crate) fn emit_with(&self, kind: ProgressKind, message: impl Into<String>, payload: Value) {
        if self.settings.verbose {
            self.components
                .progress
                .emit(ProgressEvent::new(kind, message).with_payload(payload));
        }
    }

    pub(crate) fn log_event(&self, event: &str, data: Value) {
        if let Some(log) = &self.components.research_log {
            if let Err(err) = log.log_event(&self.run_id, event, data) {
                warn!(run_id = %self.run_id, event = %event, error = %err, "failed to write research log");
            }
        }
    }

    /// Apply research log retention; called once when a run finalizes.
    pub(crate) async fn prune_research_log(&self) {
        let Some(log) = self.components.research_log.clone() else {
            return;
        };
        match tokio::task::spawn_blocking(move || log.prune_expired()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(run_id = %self.run_id, error = %err, "research log pruning failed"),
            Err(err) => warn!(run_id = %self.run_id, error = %err, "research log pruning task aborted"),
        }
    }

    /// Announce the tool-call strategy for a gathering pass. Under `fast` this
    /// also runs the single tool-call execution with the original query.
    pub(crate) async fn prime_tool_calls(&self) {
        if !self.components.retrievers.has_tool_call() || self.tool_cache.is_populated().await {
            return;
        }

        match self.settings.mcp_strategy {
            McpStrategy::Disabled => {
                info!(run_id = %self.run_id, "tool-call research disabled by strategy");
                self.emit(
                    ProgressKind::McpDisabled,
                    "MCP research disabled by configuration",
                );
            }
            McpStrategy::Fast => {
                self.emit(
                    ProgressKind::McpOptimization,
                    "MCP Fast: Running once for main query (performance mode)",
                );
                let entries = self.cached_tool_calls().await;
                info!(run_id = %self.run_id, entries = entries.len(), "tool-call results cached");
            }
            McpStrategy::Deep => {
                self.emit(
                    ProgressKind::McpComprehensive,
                    "MCP Deep: Will run for each sub-query (thorough mode)",
                );
            }
        }
    }

    async fn cached_tool_calls(&self) -> ToolCallEntries {
        self.tool_cache
            .get_or_populate(|| {
                execute_tool_calls(
                    std::slice::from_ref(&self.query),
                    self.components.retrievers.tool_call(),
                    &self.request,
                    McpStrategy::Fast,
                )
            })
            .await
    }

    async fn tool_call_context(&self, sub_query: &str) -> ToolCallEntries {
        if !self.components.retrievers.has_tool_call() {
            return ToolCallEntries::default();
        }

        match self.settings.mcp_strategy {
            McpStrategy::Disabled => {
                debug!(sub_query = %sub_query, "tool-call research disabled for sub-query");
                ToolCallEntries::default()
            }
            McpStrategy::Fast => {
                let entries = self.cached_tool_calls().await;
                self.emit(
                    ProgressKind::McpCacheReuse,
                    format!(
                        "Reusing cached MCP results ({} sources) for: {sub_query}",
                        entries.len()
                    ),
                );
                entries
            }
            McpStrategy::Deep => {
                info!(sub_query = %sub_query, "running deep tool-call research");
                let queries = [sub_query.to_string()];
                Arc::new(
                    execute_tool_calls(
                        &queries,
                        self.components.retrievers.tool_call(),
                        &self.request,
                        McpStrategy::Deep,
                    )
                    .await,
                )
            }
        }
    }

    /// Add unseen URLs to the visited set and return them in input order.
    pub(crate) fn register_urls<I>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let new_urls = self.state.visited_urls().filter_new(candidates);
        for url in &new_urls {
            self.emit_with(
                ProgressKind::AddedSourceUrl,
                format!("Added source url to research: {url}"),
                Value::String(url.clone()),
            );
        }
        new_urls
    }

    async fn search_new_urls(&self, sub_query: &str) -> Vec<String> {
        let request = self.request.for_query(sub_query);
        let results = self
            .components
            .retrievers
            .search_web(&request, self.settings.min_search_results)
            .await;

        let mut new_urls = self.register_urls(
            results
                .into_iter()
                .map(|result| result.url)
                .filter(|url| !url.is_empty()),
        );
        new_urls.shuffle(&mut rand::thread_rng());
        new_urls
    }

    /// Scrape `urls`, recording sources and newly selected images.
    pub(crate) async fn browse_urls(&self, urls: &[String]) -> anyhow::Result<Vec<ScrapedDocument>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        self.emit(
            ProgressKind::ScrapingUrls,
            format!("Scraping content from {} URLs...", urls.len()),
        );
        let output = self.components.scraper.scrape(urls).await?;

        self.state.add_sources(&output.documents).await;
        let new_images = self
            .state
            .add_top_images(
                &output.images,
                self.settings.images_per_scrape,
                self.components.image_hasher.as_ref(),
            )
            .await;

        self.emit(
            ProgressKind::ScrapingContent,
            format!("Scraped {} pages of content", output.documents.len()),
        );
        self.emit_with(
            ProgressKind::ScrapingImages,
            format!(
                "Selected {} new images from {} total images",
                new_images.len(),
                output.images.len()
            ),
            json!(new_images),
        );
        self.emit(ProgressKind::ScrapingComplete, "Scraping complete");

        self.load_vector_store(&output.documents).await;
        Ok(output.documents)
    }

    pub(crate) async fn load_vector_store(&self, documents: &[ScrapedDocument]) {
        let Some(store) = &self.components.vector_store else {
            return;
        };
        if documents.is_empty() {
            return;
        }
        match store.load(documents).await {
            Ok(()) => self.emit(
                ProgressKind::VectorStoreLoaded,
                format!("Loaded {} documents into the vector store", documents.len()),
            ),
            Err(err) => warn!(run_id = %self.run_id, error = %err, "vector store load failed"),
        }
    }
}

/// Turns one sub-query into one context string. Never fails: errors are
/// logged and produce an empty string for that sub-query only.
#[derive(Clone)]
pub struct SubQueryProcessor {
    scope: Arc<RunScope>,
}

impl SubQueryProcessor {
    pub(crate) fn new(scope: Arc<RunScope>) -> Self {
        Self { scope }
    }

    #[instrument(skip_all, fields(sub_query = %sub_query))]
    pub async fn process(&self, sub_query: &str, already_scraped: &[ScrapedDocument]) -> String {
        let started = Instant::now();
        self.scope.log_event(
            "sub_query",
            json!({"query": sub_query, "scraped_data_size": already_scraped.len()}),
        );
        self.scope.emit(
            ProgressKind::RunningSubqueryResearch,
            format!("Running research for '{sub_query}'..."),
        );

        match self.try_process(sub_query, already_scraped).await {
            Ok(context) => {
                metrics::record_subquery("ok", elapsed_ms(started), context.len());
                context
            }
            Err(err) => {
                error!(sub_query = %sub_query, error = %format!("{err:#}"), "sub-query failed");
                self.scope.emit(
                    ProgressKind::SubqueryError,
                    format!("Error processing '{sub_query}': {err}"),
                );
                metrics::record_subquery("error", elapsed_ms(started), 0);
                String::new()
            }
        }
    }

    async fn try_process(
        &self,
        sub_query: &str,
        already_scraped: &[ScrapedDocument],
    ) -> anyhow::Result<String> {
        let scope = &self.scope;
        let tool_entries = scope.tool_call_context(sub_query).await;

        let scraped: Cow<'_, [ScrapedDocument]> = if already_scraped.is_empty() {
            let urls = scope.search_new_urls(sub_query).await;
            let documents = scope
                .browse_urls(&urls)
                .await
                .with_context(|| format!("scraping failed for '{sub_query}'"))?;
            Cow::Owned(documents)
        } else {
            Cow::Borrowed(already_scraped)
        };

        let web_text = if scraped.is_empty() {
            String::new()
        } else {
            scope
                .components
                .ranker
                .rank(sub_query, &scraped)
                .await
                .context("similarity ranking failed")?
        };

        let combined = combine_context(&tool_entries, &web_text, sub_query);
        if combined.is_empty() {
            warn!(sub_query = %sub_query, "no combined context found");
            scope.emit(
                ProgressKind::SubqueryContextNotFound,
                format!("No content found for '{sub_query}'..."),
            );
            return Ok(combined);
        }

        let cached = scope.settings.mcp_strategy == McpStrategy::Fast && !tool_entries.is_empty();
        scope.emit(
            ProgressKind::ContextCombined,
            format!(
                "Combined research context: {} MCP sources{}, {}",
                tool_entries.len(),
                if cached { " (cached)" } else { "" },
                if web_text.is_empty() { "no web content" } else { "web content" },
            ),
        );
        scope.log_event(
            "content_found",
            json!({
                "sub_query": sub_query,
                "content_size": combined.len(),
                "mcp_sources": tool_entries.len(),
                "web_content": !web_text.is_empty(),
            }),
        );
        Ok(combined)
    }

    /// Vector-store variant: query the store instead of searching the web.
    #[instrument(skip_all, fields(sub_query = %sub_query))]
    pub async fn process_with_vector_store(
        &self,
        sub_query: &str,
        filter: Option<&VectorFilter>,
    ) -> String {
        let scope = &self.scope;
        scope.emit(
            ProgressKind::RunningSubqueryResearch,
            format!("Running research for '{sub_query}'..."),
        );
        let Some(store) = &scope.components.vector_store else {
            return String::new();
        };

        let started = Instant::now();
        let content = match store.query(sub_query, filter).await {
            Ok(content) => content,
            Err(err) => {
                warn!(sub_query = %sub_query, error = %err, "vector store query failed");
                metrics::record_subquery("error", elapsed_ms(started), 0);
                return String::new();
            }
        };
        metrics::record_subquery("ok", elapsed_ms(started), content.len());

        if content.is_empty() {
            scope.emit(
                ProgressKind::SubqueryContextNotFound,
                format!("No content found for '{sub_query}'..."),
            );
        } else {
            scope.emit(ProgressKind::SubqueryContextWindow, content.clone());
        }
        content
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Spawn one task per item and wait for all of them, keeping input order.
/// A task that panics contributes an empty string.
pub(crate) async fn fan_out<F, Fut>(items: Vec<String>, task: F) -> Vec<String>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = String> + Send + 'static,
{
    let mut set = JoinSet::new();
    let total = items.len();
    for (idx, item) in items.into_iter().enumerate() {
        let fut = task(item);
        set.spawn(async move { (idx, fut.await) });
    }

    let mut results = vec![String::new(); total];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, value)) => results[idx] = value,
            Err(err) => error!(error = %err, "sub-query task aborted"),
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_preserves_order_and_survives_panics() {
        let items = vec!["slow".to_string(), "boom".to_string(), "fast".to_string()];
        let results = fan_out(items, |item| async move {
            match item.as_str() {
                "slow" => {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    "slow done".to_string()
                }
                "boom" => panic!("task failure"),
                _ => "fast done".to_string(),
            }
        })
        .await;

        assert_eq!(results, vec!["slow done", "", "fast done"]);
    }
}
