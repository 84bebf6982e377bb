use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::ranking::{extract_keywords, keyword_score, render_documents};
use crate::scraper::ScrapedDocument;

/// Metadata equality filter applied to vector-store queries.
pub type VectorFilter = Map<String, Value>;

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn load(&self, documents: &[ScrapedDocument]) -> anyhow::Result<()>;

    async fn query(&self, query: &str, filter: Option<&VectorFilter>) -> anyhow::Result<String>;
}

/// Simple in-memory store for tests and offline runs, keyed by document URL.
pub struct InMemoryVectorStore {
    store: DashMap<String, ScrapedDocument>,
    limit: usize,
}

impl InMemoryVectorStore {
    pub fn new(limit: usize) -> Self {
        Self {
            store: DashMap::new(),
            limit: limit.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new(5)
    }
}

fn matches_filter(doc: &ScrapedDocument, filter: Option<&VectorFilter>) -> bool {
    filter.is_none_or(|filter| {
        filter
            .iter()
            .all(|(key, expected)| doc.metadata.get(key) == Some(expected))
    })
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn load(&self, documents: &[ScrapedDocument]) -> anyhow::Result<()> {
        for doc in documents {
            if doc.raw_content.trim().is_empty() {
                continue;
            }
            let key = if doc.url.is_empty() {
                format!("doc-{}", self.store.len())
            } else {
                doc.url.clone()
            };
            self.store.insert(key, doc.clone());
        }
        Ok(())
    }

    async fn query(&self, query: &str, filter: Option<&VectorFilter>) -> anyhow::Result<String> {
        let keywords = extract_keywords(query);
        let mut scored: Vec<(usize, ScrapedDocument)> = self
            .store
            .iter()
            .filter(|entry| matches_filter(entry.value(), filter))
            .map(|entry| (keyword_score(&keywords, entry.value()), entry.value().clone()))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.url.cmp(&b.1.url)));

        let picked: Vec<&ScrapedDocument> =
            scored.iter().take(self.limit).map(|(_, doc)| doc).collect();
        Ok(render_documents(&picked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn query_returns_matching_documents() {
        let store = InMemoryVectorStore::default();
        store
            .load(&[
                ScrapedDocument::new("file://a.md", "solid state batteries"),
                ScrapedDocument::new("file://b.md", "sourdough starter"),
                ScrapedDocument::new("file://empty.md", "   "),
            ])
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        let text = store.query("battery chemistry batteries", None).await.unwrap();
        assert!(text.contains("file://a.md"));
        assert!(!text.contains("file://b.md"));
    }

    #[tokio::test]
    async fn filter_restricts_by_metadata() {
        let store = InMemoryVectorStore::default();
        store
            .load(&[
                ScrapedDocument::new("file://2023.md", "battery outlook")
                    .with_metadata("year", json!(2023)),
                ScrapedDocument::new("file://2024.md", "battery outlook")
                    .with_metadata("year", json!(2024)),
            ])
            .await
            .unwrap();

        let mut filter = VectorFilter::new();
        filter.insert("year".into(), json!(2024));

        let text = store.query("battery", Some(&filter)).await.unwrap();
        assert!(text.contains("file://2024.md"));
        assert!(!text.contains("file://2023.md"));
    }
}
