mod common;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use common::{PageScraper, ToolBackend, WebBackend, components, subtopic_config};
use conductor_core::{
    ChannelProgress, InMemoryVectorStore, PlanRequest, Planner, ProgressEvent, ProgressKind,
    ProvidedDocuments, ReportSource, ResearchConductor, ResearchConfig, ResearchOptions,
    ResearchPhase, ScrapedDocument, SourceCurator, VectorFilter, VectorStore,
};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;

const FIVE: &[&str] = &["alpha", "beta", "gamma", "delta", "epsilon"];

fn drain(receiver: &mut UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

fn count(events: &[ProgressEvent], kind: ProgressKind) -> usize {
    events.iter().filter(|event| event.kind == kind).count()
}

#[tokio::test]
async fn fast_strategy_runs_tool_calls_once() {
    let tool = ToolBackend::new();
    let (progress, mut receiver) = ChannelProgress::new();
    let components = components(FIVE, WebBackend::new(), Some(tool.clone()), PageScraper::new())
        .with_progress(Arc::new(progress));

    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));
    let context = conductor
        .conduct_research(ResearchOptions::new("energy outlook"))
        .await
        .unwrap();

    assert_eq!(tool.calls(), 1);
    assert_eq!(context.len(), 5);
    for entry in &context {
        assert!(entry.contains("tool insight for energy outlook"));
        assert!(entry.contains("*Source: Tool answer (https://tools.example/answer)*"));
    }

    let events = drain(&mut receiver);
    assert_eq!(count(&events, ProgressKind::McpOptimization), 1);
    assert_eq!(count(&events, ProgressKind::McpCacheReuse), 5);
    assert_eq!(conductor.phase(), ResearchPhase::Done);
}

#[tokio::test]
async fn deep_strategy_runs_tool_calls_per_sub_query() {
    let tool = ToolBackend::new();
    let components = components(FIVE, WebBackend::new(), Some(tool.clone()), PageScraper::new());

    let mut conductor = ResearchConductor::new(components, subtopic_config("deep"));
    let context = conductor
        .conduct_research(ResearchOptions::new("energy outlook"))
        .await
        .unwrap();

    assert_eq!(tool.calls(), 5);
    assert_eq!(context.len(), 5);
    assert!(context[2].contains("tool insight for gamma"));
}

#[tokio::test]
async fn disabled_strategy_never_calls_tools() {
    let tool = ToolBackend::new();
    let (progress, mut receiver) = ChannelProgress::new();
    let components = components(FIVE, WebBackend::new(), Some(tool.clone()), PageScraper::new())
        .with_progress(Arc::new(progress));

    let mut options = ResearchOptions::new("energy outlook");
    options.mcp_strategy = Some("disabled".into());
    let mut conductor = ResearchConductor::new(components, subtopic_config("deep"));
    let context = conductor.conduct_research(options).await.unwrap();

    assert_eq!(tool.calls(), 0);
    assert_eq!(context.len(), 5);
    assert!(context.iter().all(|entry| !entry.contains("tool insight")));
    assert_eq!(count(&drain(&mut receiver), ProgressKind::McpDisabled), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fast_hybrid_shares_one_tool_call_across_both_passes() {
    let tool = ToolBackend::new();
    let components = components(FIVE, WebBackend::new(), Some(tool.clone()), PageScraper::new())
        .with_document_loader(Arc::new(ProvidedDocuments::new(local_docs())));

    let mut options = ResearchOptions::new("energy outlook");
    options.report_source = Some(ReportSource::Hybrid);
    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));
    let context = conductor.conduct_research(options).await.unwrap();

    assert_eq!(tool.calls(), 1);
    assert_eq!(context.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fast_complement_shares_one_tool_call() {
    let tool = ToolBackend::new();
    let components = components(FIVE, WebBackend::new(), Some(tool.clone()), PageScraper::new());

    let mut options = ResearchOptions::new("energy outlook");
    options.source_urls = vec!["https://example.com/solar".into()];
    options.complement_source_urls = true;
    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));
    let context = conductor.conduct_research(options).await.unwrap();

    assert_eq!(tool.calls(), 1);
    assert_eq!(context.len(), 6);
}

#[tokio::test]
async fn unknown_strategy_behaves_like_fast() {
    let tool = ToolBackend::new();
    let components = components(FIVE, WebBackend::new(), Some(tool.clone()), PageScraper::new());

    let mut conductor = ResearchConductor::new(components, subtopic_config("turbo"));
    conductor
        .conduct_research(ResearchOptions::new("energy outlook"))
        .await
        .unwrap();

    assert_eq!(tool.calls(), 1);
}

#[tokio::test]
async fn sub_query_results_keep_plan_order_and_urls_are_scraped_once() {
    let components = components(&["sub1", "sub2"], WebBackend::new(), None, PageScraper::new());
    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));

    let context = conductor
        .conduct_research(ResearchOptions::new("market drivers"))
        .await
        .unwrap();

    assert_eq!(context.len(), 2);
    assert!(context[0].contains("Source: https://example.com/sub1"));
    assert!(context[1].contains("Source: https://example.com/sub2"));

    let visited = conductor.state().visited_urls().snapshot();
    assert_eq!(visited.len(), 3);
    let shared = visited
        .iter()
        .filter(|url| url.as_str() == "https://example.com/shared")
        .count();
    assert_eq!(shared, 1);

    let sources = conductor.state().sources().await;
    assert_eq!(sources.len(), 3);
    assert_eq!(conductor.state().images().await.len(), 3);
}

#[tokio::test]
async fn original_query_is_appended_outside_subtopic_reports() {
    let components = components(&["sub1"], WebBackend::new(), None, PageScraper::new());
    let (progress, mut receiver) = ChannelProgress::new();
    let components = components.with_progress(Arc::new(progress));

    let mut conductor = ResearchConductor::new(components, ResearchConfig::default());
    conductor
        .conduct_research(ResearchOptions::new("market"))
        .await
        .unwrap();

    let events = drain(&mut receiver);
    let planned = events
        .iter()
        .find(|event| event.kind == ProgressKind::Subqueries)
        .and_then(|event| event.payload.clone());
    assert_eq!(planned, Some(json!(["sub1", "market"])));
}

#[tokio::test]
async fn scrape_failure_only_empties_its_sub_query() {
    let (progress, mut receiver) = ChannelProgress::new();
    let components = components(
        &["alpha", "beta", "gamma"],
        WebBackend::new(),
        None,
        PageScraper::failing_on(&["beta"]),
    )
    .with_progress(Arc::new(progress));

    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));
    let context = conductor
        .conduct_research(ResearchOptions::new("energy"))
        .await
        .unwrap();

    assert_eq!(context.len(), 2);
    assert!(context.iter().any(|entry| entry.contains("notes on alpha")));
    assert!(context.iter().any(|entry| entry.contains("notes on gamma")));
    assert_eq!(count(&drain(&mut receiver), ProgressKind::SubqueryError), 1);
}

struct FailingPlanner;

#[async_trait]
impl Planner for FailingPlanner {
    async fn plan(&self, _request: &PlanRequest) -> Result<Vec<String>> {
        Err(anyhow!("model unavailable"))
    }
}

#[tokio::test]
async fn planning_failure_reaches_the_caller() {
    let mut components = components(&[], WebBackend::new(), None, PageScraper::new());
    components.planner = Arc::new(FailingPlanner);

    let mut conductor = ResearchConductor::new(components, ResearchConfig::default());
    let err = conductor
        .conduct_research(ResearchOptions::new("energy"))
        .await
        .unwrap_err();

    assert!(err.is_planning());
    assert!(err.to_string().contains("model unavailable"));
    assert_eq!(conductor.phase(), ResearchPhase::Idle);
}

#[tokio::test]
async fn provided_urls_skip_planning() {
    let web = WebBackend::new();
    let mut components = components(&[], web.clone(), None, PageScraper::new());
    components.planner = Arc::new(FailingPlanner);

    let mut options = ResearchOptions::new("solar notes");
    options.source_urls = vec![
        "https://example.com/solar".into(),
        "https://example.com/solar".into(),
    ];
    let mut conductor = ResearchConductor::new(components, ResearchConfig::default());
    let context = conductor.conduct_research(options).await.unwrap();

    assert_eq!(context.len(), 1);
    assert!(context[0].contains("Detailed notes on solar."));
    assert_eq!(web.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(conductor.state().sources().await.len(), 1);
}

#[tokio::test]
async fn complemented_urls_add_web_context() {
    let components = components(&["wind"], WebBackend::new(), None, PageScraper::new());
    let mut options = ResearchOptions::new("solar wind");
    options.source_urls = vec!["https://example.com/solar".into()];
    options.complement_source_urls = true;

    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));
    let context = conductor.conduct_research(options).await.unwrap();

    assert_eq!(context.len(), 2);
    assert!(context[0].contains("notes on solar"));
    assert!(context[1].contains("notes on wind"));
}

fn local_docs() -> Vec<ScrapedDocument> {
    vec![
        ScrapedDocument::new("/docs/alpha.md", "Internal memo about alpha.").with_title("alpha"),
        ScrapedDocument::new("/docs/beta.md", "Internal memo about beta.").with_title("beta"),
    ]
}

#[tokio::test]
async fn hybrid_returns_single_labelled_element() {
    let components = components(&["alpha"], WebBackend::new(), None, PageScraper::new())
        .with_document_loader(Arc::new(ProvidedDocuments::new(local_docs())));

    let mut options = ResearchOptions::new("alpha");
    options.report_source = Some(ReportSource::Hybrid);
    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));
    let context = conductor.conduct_research(options).await.unwrap();

    assert_eq!(context.len(), 1);
    let combined = &context[0];
    assert!(combined.starts_with("Context from local documents: "));
    let (local, web) = combined
        .split_once("\n\nContext from web sources: ")
        .unwrap();
    assert!(local.contains("Internal memo about alpha."));
    assert!(!local.contains("beta"));
    assert!(web.contains("Detailed notes on alpha."));
}

#[tokio::test]
async fn caller_documents_are_researched_without_search() {
    let web = WebBackend::new();
    let components = components(&["beta"], web.clone(), None, PageScraper::new());

    let mut options = ResearchOptions::new("beta");
    options.report_source = Some(ReportSource::Documents);
    options.documents = local_docs();
    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));
    let context = conductor.conduct_research(options).await.unwrap();

    assert_eq!(
        context,
        vec!["Source: /docs/beta.md\nTitle: beta\nContent: Internal memo about beta.".to_string()]
    );
    // Only the preliminary planning search touches the web retriever.
    assert_eq!(web.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn vector_store_queries_respect_filter() {
    let store = Arc::new(InMemoryVectorStore::default());
    store
        .load(&[
            ScrapedDocument::new("https://kb/a", "alpha guidance for teams")
                .with_metadata("team", json!("red")),
            ScrapedDocument::new("https://kb/b", "alpha guidance for others")
                .with_metadata("team", json!("blue")),
        ])
        .await
        .unwrap();

    let components = components(&["alpha"], WebBackend::new(), None, PageScraper::new())
        .with_vector_store(store);
    let mut filter = VectorFilter::new();
    filter.insert("team".into(), json!("blue"));

    let mut options = ResearchOptions::new("alpha");
    options.report_source = Some(ReportSource::VectorStore);
    options.vector_store_filter = Some(filter);
    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));
    let context = conductor.conduct_research(options).await.unwrap();

    assert_eq!(context.len(), 1);
    assert!(context[0].contains("https://kb/b"));
    assert!(!context[0].contains("https://kb/a"));
}

#[tokio::test]
async fn vector_store_source_without_store_still_surfaces_planning_failure() {
    let mut components = components(&[], WebBackend::new(), None, PageScraper::new());
    components.planner = Arc::new(FailingPlanner);

    let mut options = ResearchOptions::new("alpha");
    options.report_source = Some(ReportSource::VectorStore);
    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));
    let err = conductor.conduct_research(options).await.unwrap_err();
    assert!(err.is_planning());
}

#[tokio::test]
async fn vector_store_source_without_store_is_empty() {
    let mut options = ResearchOptions::new("alpha");
    options.report_source = Some(ReportSource::VectorStore);

    let components = components(&["alpha"], WebBackend::new(), None, PageScraper::new());
    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));
    let context = conductor.conduct_research(options).await.unwrap();
    assert!(context.is_empty());
}

struct CannedCurator(Value);

#[async_trait]
impl SourceCurator for CannedCurator {
    async fn curate(&self, _query: &str, _context: &[String]) -> Result<Value> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn malformed_curation_keeps_uncurated_context() {
    let components = components(&["sub1", "sub2"], WebBackend::new(), None, PageScraper::new())
        .with_curator(Arc::new(CannedCurator(json!("I could not rank these"))));

    let mut options = ResearchOptions::new("market");
    options.curate_sources = Some(true);
    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));
    let context = conductor.conduct_research(options).await.unwrap();

    assert_eq!(context.len(), 2);
    assert!(context[0].contains("notes on sub1"));
}

#[tokio::test]
async fn curated_sources_replace_context() {
    let curated = json!([
        {"url": "https://example.com/sub2", "title": "sub2", "raw_content": "Curated market summary for sub2."}
    ]);
    let components = components(&["sub1", "sub2"], WebBackend::new(), None, PageScraper::new())
        .with_curator(Arc::new(CannedCurator(curated)));

    let mut options = ResearchOptions::new("market sub2");
    options.curate_sources = Some(true);
    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));
    let context = conductor.conduct_research(options).await.unwrap();

    assert_eq!(context.len(), 1);
    assert!(context[0].contains("Curated market summary"));
    assert_eq!(conductor.state().context().await, context);
}

#[tokio::test]
async fn sources_accumulate_across_runs_but_visited_resets() {
    let components = components(&["sub1"], WebBackend::new(), None, PageScraper::new());
    let mut conductor = ResearchConductor::new(components, subtopic_config("fast"));

    conductor
        .conduct_research(ResearchOptions::new("first"))
        .await
        .unwrap();
    conductor
        .conduct_research(ResearchOptions::new("second"))
        .await
        .unwrap();

    // Same URLs are scraped again because the visited set is per run.
    assert_eq!(conductor.state().sources().await.len(), 4);
    assert_eq!(conductor.state().visited_urls().snapshot().len(), 2);
    // Images already collected are not selected twice.
    assert_eq!(conductor.state().images().await.len(), 2);
}
