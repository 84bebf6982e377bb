//! The research conductor: plan, gather, curate.
//!
//! A run moves through [`ResearchPhase`] in order. Gathering picks exactly one
//! [`GatherMode`] and fans sub-queries out concurrently; every failure except
//! planning (and loading the configured local documents) degrades to fewer
//! sources instead of an error.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{ReportSource, ResearchConfig, RunSettings};
use crate::curator::{SourceCurator, parse_curated};
use crate::documents::{DocumentLoader, LocalDocumentLoader, ProvidedDocuments};
use crate::error::ConductorError;
use crate::events::{NoopProgress, ProgressKind, ProgressSink};
use crate::images::{FilenameHasher, ImageHasher};
use crate::logging::ResearchLog;
use crate::mcp::ToolCallCache;
use crate::memory::{VectorFilter, VectorStore};
use crate::planner::{PlanRequest, Planner};
use crate::ranking::{KeywordRanker, SimilarityRanker};
use crate::retriever::{Retrievers, SearchRequest};
use crate::scraper::{ScrapedDocument, Scraper};
use crate::state::ResearchState;
use crate::subquery::{RunScope, SubQueryProcessor, fan_out};

/// Collaborators a conductor runs against.
#[derive(Clone)]
pub struct ResearchComponents {
    pub planner: Arc<dyn Planner>,
    pub retrievers: Retrievers,
    pub scraper: Arc<dyn Scraper>,
    pub ranker: Arc<dyn SimilarityRanker>,
    pub image_hasher: Arc<dyn ImageHasher>,
    /// Loader for the `local` and `hybrid` sources; defaults to `doc_path`.
    pub document_loader: Option<Arc<dyn DocumentLoader>>,
    pub curator: Option<Arc<dyn SourceCurator>>,
    pub vector_store: Option<Arc<dyn VectorStore>>,
    pub progress: Arc<dyn ProgressSink>,
    pub research_log: Option<ResearchLog>,
}

impl ResearchComponents {
    pub fn new(planner: Arc<dyn Planner>, retrievers: Retrievers, scraper: Arc<dyn Scraper>) -> Self {
        Self {
            planner,
            retrievers,
            scraper,
            ranker: Arc::new(KeywordRanker::default()),
            image_hasher: Arc::new(FilenameHasher),
            document_loader: None,
            curator: None,
            vector_store: None,
            progress: Arc::new(NoopProgress),
            research_log: None,
        }
    }

    pub fn with_ranker(mut self, ranker: Arc<dyn SimilarityRanker>) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn with_image_hasher(mut self, hasher: Arc<dyn ImageHasher>) -> Self {
        self.image_hasher = hasher;
        self
    }

    pub fn with_document_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.document_loader = Some(loader);
        self
    }

    pub fn with_curator(mut self, curator: Arc<dyn SourceCurator>) -> Self {
        self.curator = Some(curator);
        self
    }

    pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_research_log(mut self, log: ResearchLog) -> Self {
        self.research_log = Some(log);
        self
    }
}

/// Per-run inputs. `None` overrides fall through to configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchOptions {
    pub query: String,
    pub report_source: Option<ReportSource>,
    pub report_type: Option<String>,
    pub parent_query: Option<String>,
    pub role: Option<String>,
    pub source_urls: Vec<String>,
    pub complement_source_urls: bool,
    pub documents: Vec<ScrapedDocument>,
    pub vector_store_filter: Option<VectorFilter>,
    pub query_domains: Vec<String>,
    pub headers: HashMap<String, String>,
    pub mcp_strategy: Option<String>,
    pub curate_sources: Option<bool>,
    pub verbose: Option<bool>,
}

impl ResearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    #[default]
    Idle,
    Planning,
    Gathering,
    Curating,
    Done,
}

/// How a run gathers context, chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherMode {
    ProvidedUrls { complement: bool },
    Web,
    Local,
    Hybrid,
    Documents,
    VectorStore,
}

impl GatherMode {
    /// Explicit source URLs win; otherwise the report source decides.
    pub fn select(options: &ResearchOptions, source: ReportSource) -> Self {
        if !options.source_urls.is_empty() {
            return GatherMode::ProvidedUrls {
                complement: options.complement_source_urls,
            };
        }
        match source {
            ReportSource::Web => GatherMode::Web,
            ReportSource::Local => GatherMode::Local,
            ReportSource::Hybrid => GatherMode::Hybrid,
            ReportSource::Documents => GatherMode::Documents,
            ReportSource::VectorStore => GatherMode::VectorStore,
        }
    }
}

pub struct ResearchConductor {
    components: ResearchComponents,
    config: ResearchConfig,
    state: Arc<ResearchState>,
    phase: ResearchPhase,
}

impl ResearchConductor {
    pub fn new(components: ResearchComponents, config: ResearchConfig) -> Self {
        Self::with_state(components, config, Arc::new(ResearchState::new()))
    }

    pub fn with_state(
        components: ResearchComponents,
        config: ResearchConfig,
        state: Arc<ResearchState>,
    ) -> Self {
        Self {
            components,
            config,
            state,
            phase: ResearchPhase::Idle,
        }
    }

    pub fn phase(&self) -> ResearchPhase {
        self.phase
    }

    pub fn state(&self) -> &Arc<ResearchState> {
        &self.state
    }

    /// Run one research task and return its final context.
    #[instrument(skip_all, fields(query = %options.query))]
    pub async fn conduct_research(
        &mut self,
        options: ResearchOptions,
    ) -> Result<Vec<String>, ConductorError> {
        let result = self.run(options).await;
        if result.is_err() {
            self.phase = ResearchPhase::Idle;
        }
        result
    }

    async fn run(&mut self, options: ResearchOptions) -> Result<Vec<String>, ConductorError> {
        let settings = RunSettings::resolve(&self.config, &options);
        let mode = GatherMode::select(&options, settings.report_source);

        let mut request = SearchRequest::new(options.query.clone(), settings.max_search_results);
        request.headers = options.headers.clone();
        request.query_domains = options.query_domains.clone();

        let scope = Arc::new(RunScope {
            run_id: Uuid::new_v4().to_string(),
            query: options.query.clone(),
            components: self.components.clone(),
            settings,
            request,
            state: self.state.clone(),
            tool_cache: ToolCallCache::new(),
        });

        info!(
            run_id = %scope.run_id,
            retrievers = ?scope.components.retrievers.names(),
            mode = ?mode,
            mcp_strategy = %scope.settings.mcp_strategy,
            "starting research"
        );
        scope.log_event(
            "query",
            json!({
                "query": options.query,
                "report_source": scope.settings.report_source.as_str(),
                "report_type": scope.settings.report_type,
            }),
        );
        scope.emit(
            ProgressKind::StartingResearch,
            format!("Starting the research task for '{}'...", options.query),
        );

        self.phase = ResearchPhase::Planning;
        scope.state.visited_urls().reset();

        let context = self.gather(&scope, mode, &options).await?;
        info!(run_id = %scope.run_id, elements = context.len(), "gathered context");

        let context = if scope.settings.curate_sources {
            self.phase = ResearchPhase::Curating;
            curate(&scope, context).await
        } else {
            context
        };

        scope.state.set_context(context.clone()).await;
        scope.log_event("context", json!(context));
        scope.prune_research_log().await;
        scope.emit(
            ProgressKind::ResearchStepFinalized,
            format!(
                "Finalized research step with {} context elements",
                context.len()
            ),
        );
        self.phase = ResearchPhase::Done;
        Ok(context)
    }

    async fn gather(
        &mut self,
        scope: &Arc<RunScope>,
        mode: GatherMode,
        options: &ResearchOptions,
    ) -> Result<Vec<String>, ConductorError> {
        match mode {
            GatherMode::ProvidedUrls { complement: false } => {
                self.phase = ResearchPhase::Gathering;
                Ok(context_by_urls(scope, &options.source_urls).await)
            }
            GatherMode::ProvidedUrls { complement: true } => {
                let sub_queries = plan(scope, options).await?;
                self.phase = ResearchPhase::Gathering;
                let (mut provided, web) = tokio::join!(
                    context_by_urls(scope, &options.source_urls),
                    context_by_sub_queries(scope, sub_queries, Vec::new()),
                );
                provided.extend(web);
                Ok(provided)
            }
            GatherMode::Web => {
                let sub_queries = plan(scope, options).await?;
                self.phase = ResearchPhase::Gathering;
                Ok(context_by_sub_queries(scope, sub_queries, Vec::new()).await)
            }
            GatherMode::Local | GatherMode::Documents => {
                let sub_queries = plan(scope, options).await?;
                self.phase = ResearchPhase::Gathering;
                let documents = self.load_documents(scope, mode, options).await?;
                Ok(context_by_sub_queries(scope, sub_queries, documents).await)
            }
            GatherMode::Hybrid => {
                let sub_queries = plan(scope, options).await?;
                self.phase = ResearchPhase::Gathering;
                let documents = self.load_documents(scope, mode, options).await?;
                let (docs_context, web_context) = tokio::join!(
                    context_by_sub_queries(scope, sub_queries.clone(), documents),
                    context_by_sub_queries(scope, sub_queries, Vec::new()),
                );
                Ok(vec![join_local_and_web(&docs_context, &web_context)])
            }
            GatherMode::VectorStore => {
                let sub_queries = plan(scope, options).await?;
                self.phase = ResearchPhase::Gathering;
                if scope.components.vector_store.is_none() {
                    warn!(run_id = %scope.run_id, "vector store source selected but no store configured");
                    return Ok(Vec::new());
                }
                Ok(context_by_vector_store(scope, sub_queries, options.vector_store_filter.clone()).await)
            }
        }
    }

    async fn load_documents(
        &self,
        scope: &Arc<RunScope>,
        mode: GatherMode,
        options: &ResearchOptions,
    ) -> Result<Vec<ScrapedDocument>, ConductorError> {
        let loader: Arc<dyn DocumentLoader> = match mode {
            GatherMode::Documents => Arc::new(ProvidedDocuments::new(options.documents.clone())),
            _ => match &self.components.document_loader {
                Some(loader) => loader.clone(),
                None => Arc::new(LocalDocumentLoader::new(scope.settings.doc_path.clone())),
            },
        };

        scope.emit(ProgressKind::LoadingDocuments, "Loading documents...");
        let documents = loader.load().await.map_err(ConductorError::document_load)?;
        info!(run_id = %scope.run_id, count = documents.len(), "loaded documents");
        scope.load_vector_store(&documents).await;
        Ok(documents)
    }
}

/// Preliminary search plus the planner's outline step. The only stage whose
/// failure reaches the caller.
async fn plan(scope: &RunScope, options: &ResearchOptions) -> Result<Vec<String>, ConductorError> {
    scope.emit(
        ProgressKind::PlanningResearch,
        "Planning the research strategy and subtasks...",
    );

    let search_results = scope
        .components
        .retrievers
        .search_web(&scope.request, scope.settings.min_search_results)
        .await;
    info!(run_id = %scope.run_id, results = search_results.len(), "preliminary search complete");

    let request = PlanRequest {
        query: scope.query.clone(),
        search_results,
        role: scope.settings.role.clone(),
        parent_query: options.parent_query.clone(),
        report_type: scope.settings.report_type.clone(),
        retriever_names: scope.components.retrievers.names(),
        max_sub_queries: scope.settings.max_sub_queries,
    };
    let mut sub_queries = scope
        .components
        .planner
        .plan(&request)
        .await
        .map_err(ConductorError::planning)?;

    if !scope.settings.is_subtopic_report() {
        sub_queries.push(scope.query.clone());
    }

    info!(run_id = %scope.run_id, sub_queries = ?sub_queries, "planned research");
    scope.emit_with(
        ProgressKind::Subqueries,
        format!("I will conduct my research based on the following queries: {sub_queries:?}..."),
        json!(sub_queries),
    );
    Ok(sub_queries)
}

async fn context_by_urls(scope: &RunScope, urls: &[String]) -> Vec<String> {
    let new_urls = scope.register_urls(urls.iter().cloned());
    info!(run_id = %scope.run_id, new_urls = new_urls.len(), "scraping provided source urls");

    let documents = match scope.browse_urls(&new_urls).await {
        Ok(documents) => documents,
        Err(err) => {
            warn!(run_id = %scope.run_id, error = %err, "scraping provided urls failed");
            return Vec::new();
        }
    };
    if documents.is_empty() {
        return Vec::new();
    }

    match scope.components.ranker.rank(&scope.query, &documents).await {
        Ok(context) if !context.is_empty() => vec![context],
        Ok(_) => Vec::new(),
        Err(err) => {
            warn!(run_id = %scope.run_id, error = %err, "ranking provided sources failed");
            Vec::new()
        }
    }
}

async fn context_by_sub_queries(
    scope: &Arc<RunScope>,
    sub_queries: Vec<String>,
    already_scraped: Vec<ScrapedDocument>,
) -> Vec<String> {
    scope.prime_tool_calls().await;

    let processor = SubQueryProcessor::new(scope.clone());
    let already_scraped = Arc::new(already_scraped);
    let context = fan_out(sub_queries, |sub_query| {
        let processor = processor.clone();
        let already_scraped = already_scraped.clone();
        async move { processor.process(&sub_query, &already_scraped).await }
    })
    .await;

    let total = context.len();
    let context: Vec<String> = context.into_iter().filter(|c| !c.is_empty()).collect();
    info!(
        run_id = %scope.run_id,
        sub_queries = total,
        with_context = context.len(),
        "gathered sub-query context"
    );
    context
}

async fn context_by_vector_store(
    scope: &Arc<RunScope>,
    sub_queries: Vec<String>,
    filter: Option<VectorFilter>,
) -> Vec<String> {
    let processor = SubQueryProcessor::new(scope.clone());
    let filter = Arc::new(filter);
    fan_out(sub_queries, |sub_query| {
        let processor = processor.clone();
        let filter = filter.clone();
        async move {
            processor
                .process_with_vector_store(&sub_query, (*filter).as_ref())
                .await
        }
    })
    .await
    .into_iter()
    .filter(|c| !c.is_empty())
    .collect()
}

fn join_local_and_web(docs_context: &[String], web_context: &[String]) -> String {
    format!(
        "Context from local documents: {}\n\nContext from web sources: {}",
        docs_context.join("\n\n"),
        web_context.join("\n\n")
    )
}

/// Re-rank gathered context through the curator. Any curator problem keeps
/// the uncurated context.
async fn curate(scope: &RunScope, context: Vec<String>) -> Vec<String> {
    let Some(curator) = &scope.components.curator else {
        warn!(run_id = %scope.run_id, "source curation enabled but no curator configured");
        return context;
    };
    scope.emit(ProgressKind::CuratingSources, "Curating sources...");

    let curated = match curator.curate(&scope.query, &context).await {
        Ok(value) => value,
        Err(err) => {
            warn!(run_id = %scope.run_id, error = %err, "source curation failed; keeping uncurated context");
            return context;
        }
    };
    let Some(documents) = parse_curated(&curated) else {
        warn!(run_id = %scope.run_id, "curator returned malformed sources; keeping uncurated context");
        return context;
    };

    match scope.components.ranker.rank(&scope.query, &documents).await {
        Ok(text) if !text.is_empty() => {
            info!(run_id = %scope.run_id, sources = documents.len(), "curated context");
            vec![text]
        }
        Ok(_) => context,
        Err(err) => {
            warn!(run_id = %scope.run_id, error = %err, "ranking curated sources failed; keeping uncurated context");
            context
        }
    }
}
