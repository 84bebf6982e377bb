//! Research conductor core built on top of `graph_flow`.
//!
//! Plans sub-queries for a research question, fans them out concurrently
//! across web, tool-call, local-document and vector-store backends, and
//! converges the partial results into one ranked context.

mod combiner;
mod conductor;
mod config;
mod curator;
mod dedup;
mod documents;
mod error;
mod events;
mod images;
mod llm;
mod logging;
mod mcp;
mod memory;
pub mod metrics;
mod planner;
mod ranking;
mod retriever;
mod scraper;
mod state;
mod subquery;
mod tasks;
mod telemetry;
mod workflow;

pub use combiner::{ENTRY_SEPARATOR, SECTION_SEPARATOR, SYNTHETIC_SOURCE_URL, combine_context};
pub use conductor::{
    GatherMode, ResearchComponents, ResearchConductor, ResearchOptions, ResearchPhase,
};
pub use config::{
    Config, ConfigLoader, LoggingConfig, ReportSource, ResearchConfig, RunSettings,
    SUBTOPIC_REPORT,
};
pub use curator::{SourceCurator, parse_curated};
pub use dedup::VisitedUrls;
pub use documents::{DocumentLoader, LocalDocumentLoader, ProvidedDocuments};
pub use error::ConductorError;
pub use events::{ChannelProgress, NoopProgress, ProgressEvent, ProgressKind, ProgressSink};
pub use images::{FilenameHasher, HIGH_SCORE, ImageCandidate, ImageHasher, select_top_images};
pub use llm::{ChatMessage, LlmClient};
pub use logging::{LOG_DIR_ENV, ResearchLog};
pub use mcp::{
    MCP_SOURCE_TYPE, McpStrategy, ToolCallCache, ToolCallContextEntry, ToolCallEntries,
    execute_tool_calls,
};
pub use memory::{InMemoryVectorStore, VectorFilter, VectorStore};
pub use planner::{LlmPlanner, PlanRequest, Planner, StaticPlanner, parse_sub_queries};
pub use ranking::{KeywordRanker, SimilarityRanker};
pub use retriever::{
    ConfiguredRetriever, RetrieverBackend, RetrieverKind, Retrievers, SearchRequest, SearchResult,
    search_with_fallback,
};
pub use scraper::{ScrapeOutput, ScrapedDocument, Scraper};
pub use state::ResearchState;
pub use subquery::SubQueryProcessor;
pub use tasks::{ConductResearchTask, FinalizeTask};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use workflow::{
    SessionOptions, SessionOutcome, run_research_session, run_research_session_with_options,
};
