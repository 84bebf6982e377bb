use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::images::ImageCandidate;

/// Page content produced by the scraper or a document loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedDocument {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub raw_content: String,
    /// Anything else the producer attached (author, page number, score...).
    #[serde(default, flatten)]
    pub metadata: Map<String, Value>,
}

impl ScrapedDocument {
    pub fn new(url: impl Into<String>, raw_content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            raw_content: raw_content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeOutput {
    pub documents: Vec<ScrapedDocument>,
    pub images: Vec<ImageCandidate>,
}

/// Black-box "fetch URL → content" service.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, urls: &[String]) -> anyhow::Result<ScrapeOutput>;
}
