//! Filesystem-backed retriever and scraper so the CLI can run without
//! network access.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use conductor_core::{
    DocumentLoader, LocalDocumentLoader, RetrieverBackend, ScrapeOutput, ScrapedDocument,
    Scraper, SearchRequest, SearchResult,
};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

const SNIPPET_CHARS: usize = 280;

/// Keyword search over a directory of text files, loaded on first use.
pub struct DocumentIndex {
    loader: LocalDocumentLoader,
    documents: OnceCell<Vec<ScrapedDocument>>,
}

impl DocumentIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            loader: LocalDocumentLoader::new(path),
            documents: OnceCell::new(),
        }
    }

    async fn documents(&self) -> Result<&[ScrapedDocument]> {
        let docs = self
            .documents
            .get_or_try_init(|| self.loader.load())
            .await?;
        Ok(docs.as_slice())
    }
}

#[async_trait]
impl RetrieverBackend for DocumentIndex {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let terms = terms(&request.query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, &ScrapedDocument)> = self
            .documents()
            .await?
            .iter()
            .map(|doc| (match_count(&terms, doc), doc))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.url.cmp(&b.1.url)));

        let results: Vec<SearchResult> = scored
            .into_iter()
            .take(request.max_results)
            .map(|(_, doc)| SearchResult::new(&doc.url, &doc.title, snippet(&doc.raw_content)))
            .collect();
        debug!(query = %request.query, hits = results.len(), "document index search");
        Ok(results)
    }
}

/// Reads `file://` or bare paths from disk; unreadable paths are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileScraper;

#[async_trait]
impl Scraper for FileScraper {
    async fn scrape(&self, urls: &[String]) -> Result<ScrapeOutput> {
        let mut output = ScrapeOutput::default();
        for url in urls {
            let path = url.strip_prefix("file://").unwrap_or(url);
            match tokio::fs::read_to_string(path).await {
                Ok(text) if !text.trim().is_empty() => {
                    let title = std::path::Path::new(path)
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    output
                        .documents
                        .push(ScrapedDocument::new(url.clone(), text).with_title(title));
                }
                Ok(_) => debug!(%url, "skipping empty file"),
                Err(err) => warn!(%url, error = %err, "failed to read source"),
            }
        }
        Ok(output)
    }
}

fn terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| term.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn match_count(terms: &[String], doc: &ScrapedDocument) -> usize {
    let haystack = format!("{} {}", doc.title, doc.raw_content).to_lowercase();
    terms
        .iter()
        .filter(|term| haystack.contains(term.as_str()))
        .count()
}

fn snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SNIPPET_CHARS).collect()
}
