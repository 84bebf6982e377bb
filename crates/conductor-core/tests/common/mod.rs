#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use conductor_core::{
    ConfiguredRetriever, ImageCandidate, ResearchComponents, ResearchConfig, RetrieverBackend,
    Retrievers, SUBTOPIC_REPORT, ScrapeOutput, ScrapedDocument, Scraper, SearchRequest,
    SearchResult, StaticPlanner,
};

/// Returns `https://example.com/<query>` plus a URL shared by every query.
pub struct WebBackend {
    pub calls: AtomicUsize,
}

impl WebBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RetrieverBackend for WebBackend {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            SearchResult::new(
                format!("https://example.com/{}", request.query),
                request.query.clone(),
                "snippet",
            ),
            SearchResult::new("https://example.com/shared", "shared", "snippet"),
        ])
    }
}

/// Tool-call provider counting its invocations.
pub struct ToolBackend {
    pub calls: AtomicUsize,
}

impl ToolBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RetrieverBackend for ToolBackend {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![SearchResult::new(
            "https://tools.example/answer",
            "Tool answer",
            format!("tool insight for {}", request.query),
        )])
    }
}

/// Page content mentions the last path segment so keyword ranking matches it.
/// URLs containing any of `failing` make the whole scrape call fail.
pub struct PageScraper {
    failing: Vec<String>,
}

impl PageScraper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failing: Vec::new(),
        })
    }

    pub fn failing_on(markers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: markers.iter().map(|m| m.to_string()).collect(),
        })
    }
}

#[async_trait]
impl Scraper for PageScraper {
    async fn scrape(&self, urls: &[String]) -> Result<ScrapeOutput> {
        if let Some(url) = urls
            .iter()
            .find(|url| self.failing.iter().any(|marker| url.contains(marker.as_str())))
        {
            return Err(anyhow!("connection reset while fetching {url}"));
        }

        let documents = urls
            .iter()
            .map(|url| {
                let topic = url.rsplit('/').next().unwrap_or_default();
                ScrapedDocument::new(url.clone(), format!("Detailed notes on {topic}."))
                    .with_title(topic)
            })
            .collect();
        let images = urls
            .iter()
            .map(|url| ImageCandidate::new(format!("{url}-chart.png"), 3))
            .collect();
        Ok(ScrapeOutput { documents, images })
    }
}

pub fn subtopic_config(mcp_strategy: &str) -> ResearchConfig {
    ResearchConfig {
        report_type: SUBTOPIC_REPORT.into(),
        mcp_strategy: mcp_strategy.into(),
        ..ResearchConfig::default()
    }
}

pub fn components(
    sub_queries: &[&str],
    web: Arc<WebBackend>,
    tool: Option<Arc<ToolBackend>>,
    scraper: Arc<PageScraper>,
) -> ResearchComponents {
    let mut retrievers = Retrievers::new([ConfiguredRetriever::web("web", web)]);
    if let Some(tool) = tool {
        retrievers.push(ConfiguredRetriever::tool_call("tools", tool));
    }
    ResearchComponents::new(
        Arc::new(StaticPlanner::new(sub_queries.iter().copied())),
        retrievers,
        scraper,
    )
}
