//! Query planning: turn one research question into ordered sub-queries.
//!
//! The conductor performs a preliminary web search and hands the hits to a
//! [`Planner`] together with the run's role and report settings.

use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::llm::{ChatMessage, LlmClient};
use crate::retriever::SearchResult;

/// Everything the planner may use to outline the research.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    /// Query being researched.
    pub query: String,
    /// Results of the preliminary search for `query`.
    pub search_results: Vec<SearchResult>,
    /// Agent role prompt for the run, if any.
    pub role: Option<String>,
    /// Enclosing query when this run researches a subtopic.
    pub parent_query: Option<String>,
    pub report_type: String,
    /// Names of the configured retrievers, web first.
    pub retriever_names: Vec<String>,
    /// Upper bound on the number of sub-queries returned.
    pub max_sub_queries: usize,
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> anyhow::Result<Vec<String>>;
}

/// Planner that always returns the same sub-queries.
#[derive(Debug, Clone, Default)]
pub struct StaticPlanner {
    sub_queries: Vec<String>,
}

impl StaticPlanner {
    pub fn new<I, S>(sub_queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sub_queries: sub_queries.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn plan(&self, _request: &PlanRequest) -> anyhow::Result<Vec<String>> {
        Ok(self.sub_queries.clone())
    }
}

/// Planner asking an LLM for a JSON list of search queries.
pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn build_prompt(request: &PlanRequest) -> String {
        let task = match request.parent_query.as_deref() {
            Some(parent) if !parent.is_empty() => format!("{parent} - {}", request.query),
            _ => request.query.clone(),
        };

        let mut context = String::new();
        for result in &request.search_results {
            context.push_str(&format!("- {} ({}): {}\n", result.title, result.url, result.body));
        }

        format!(
            "Write {max} search queries to research the following task: \"{task}\".\n\
             The report type is {report_type}; queries will be run with {retrievers}.\n\
             Use this context from a preliminary search to sharpen the queries:\n{context}\n\
             Respond only with a JSON list of strings, e.g. [\"query 1\", \"query 2\"].",
            max = request.max_sub_queries,
            report_type = request.report_type,
            retrievers = if request.retriever_names.is_empty() {
                "no retrievers".to_string()
            } else {
                request.retriever_names.join(", ")
            },
        )
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, request: &PlanRequest) -> anyhow::Result<Vec<String>> {
        let mut messages = Vec::with_capacity(2);
        if let Some(role) = request.role.as_deref().filter(|role| !role.is_empty()) {
            messages.push(ChatMessage::system(role));
        }
        messages.push(ChatMessage::user(Self::build_prompt(request)));

        let response = self
            .llm
            .complete(&messages)
            .await
            .context("LLM outline step failed")?;
        debug!(chars = response.len(), "received research outline");

        let mut sub_queries = parse_sub_queries(&response)
            .ok_or_else(|| anyhow!("could not parse sub-queries from LLM response"))?;
        if request.max_sub_queries > 0 {
            sub_queries.truncate(request.max_sub_queries);
        }
        info!(query = %request.query, count = sub_queries.len(), "planned sub-queries");
        Ok(sub_queries)
    }
}

/// Parse a JSON string list embedded in `text`, falling back to numbered or
/// bulleted lines.
pub fn parse_sub_queries(text: &str) -> Option<Vec<String>> {
    if let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) {
        if start < end {
            if let Ok(list) = serde_json::from_str::<Vec<String>>(&text[start..=end]) {
                let list = clean(list);
                if !list.is_empty() {
                    return Some(list);
                }
            }
        }
    }

    let lines: Vec<String> = text
        .lines()
        .filter_map(|line| strip_list_marker(line.trim()))
        .map(str::to_string)
        .collect();
    let lines = clean(lines);
    (!lines.is_empty()).then_some(lines)
}

/// Item text of a `- item`, `* item`, `1. item` or `1) item` line; `None` for
/// anything else, so prose that merely starts with a number is rejected.
fn strip_list_marker(line: &str) -> Option<&str> {
    let rest = match line.strip_prefix(['-', '*']) {
        Some(rest) => rest,
        None => {
            let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            if digits == 0 {
                return None;
            }
            line[digits..].strip_prefix(['.', ')'])?
        }
    };
    let item = rest.trim();
    (!item.is_empty()).then_some(item)
}

fn clean(queries: Vec<String>) -> Vec<String> {
    queries
        .into_iter()
        .map(|query| query.trim().trim_matches('"').trim().to_string())
        .filter(|query| !query.is_empty())
        .collect()
}
