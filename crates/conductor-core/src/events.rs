//! Progress sink for streaming research activity to a UI or log.
//!
//! Emission is fire-and-forget: a closed receiver is logged and ignored, and
//! nothing here may affect the research control flow.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Kinds of progress updates emitted during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    StartingResearch,
    PlanningResearch,
    Subqueries,
    RunningSubqueryResearch,
    SubqueryContextNotFound,
    SubqueryContextWindow,
    SubqueryError,
    AddedSourceUrl,
    ScrapingUrls,
    ScrapingContent,
    ScrapingImages,
    ScrapingComplete,
    LoadingDocuments,
    VectorStoreLoaded,
    McpDisabled,
    McpOptimization,
    McpComprehensive,
    McpCacheReuse,
    ContextCombined,
    CuratingSources,
    ResearchStepFinalized,
    ReviewFeedback,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::StartingResearch => "starting_research",
            ProgressKind::PlanningResearch => "planning_research",
            ProgressKind::Subqueries => "subqueries",
            ProgressKind::RunningSubqueryResearch => "running_subquery_research",
            ProgressKind::SubqueryContextNotFound => "subquery_context_not_found",
            ProgressKind::SubqueryContextWindow => "subquery_context_window",
            ProgressKind::SubqueryError => "subquery_error",
            ProgressKind::AddedSourceUrl => "added_source_url",
            ProgressKind::ScrapingUrls => "scraping_urls",
            ProgressKind::ScrapingContent => "scraping_content",
            ProgressKind::ScrapingImages => "scraping_images",
            ProgressKind::ScrapingComplete => "scraping_complete",
            ProgressKind::LoadingDocuments => "loading_documents",
            ProgressKind::VectorStoreLoaded => "vector_store_loaded",
            ProgressKind::McpDisabled => "mcp_disabled",
            ProgressKind::McpOptimization => "mcp_optimization",
            ProgressKind::McpComprehensive => "mcp_comprehensive",
            ProgressKind::McpCacheReuse => "mcp_cache_reuse",
            ProgressKind::ContextCombined => "context_combined",
            ProgressKind::CuratingSources => "curating_sources",
            ProgressKind::ResearchStepFinalized => "research_step_finalized",
            ProgressKind::ReviewFeedback => "review_feedback",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub timestamp_ms: u64,
}

impl ProgressEvent {
    pub fn new(kind: ProgressKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            payload: None,
            timestamp_ms: current_timestamp(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink forwarding events over an unbounded channel.
#[derive(Clone)]
pub struct ChannelProgress {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, event: ProgressEvent) {
        let kind = event.kind;
        if let Err(e) = self.sender.send(event) {
            tracing::warn!(kind = kind.as_str(), error = %e, "Failed to emit progress event");
        }
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Current Unix timestamp in milliseconds
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
