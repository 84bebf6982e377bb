use std::collections::HashSet;
use std::fmt::Write as _;

use async_trait::async_trait;

use crate::scraper::ScrapedDocument;

const MIN_KEYWORD_LEN: usize = 3;
const MAX_KEYWORDS: usize = 32;

/// Condenses documents into the text most relevant to a query.
#[async_trait]
pub trait SimilarityRanker: Send + Sync {
    async fn rank(&self, query: &str, documents: &[ScrapedDocument]) -> anyhow::Result<String>;
}

/// Offline ranker scoring documents by query keyword overlap.
#[derive(Debug, Clone)]
pub struct KeywordRanker {
    max_documents: usize,
}

impl KeywordRanker {
    pub fn new(max_documents: usize) -> Self {
        Self {
            max_documents: max_documents.max(1),
        }
    }
}

impl Default for KeywordRanker {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl SimilarityRanker for KeywordRanker {
    async fn rank(&self, query: &str, documents: &[ScrapedDocument]) -> anyhow::Result<String> {
        let keywords = extract_keywords(query);
        let mut scored: Vec<(usize, &ScrapedDocument)> = documents
            .iter()
            .map(|doc| (keyword_score(&keywords, doc), doc))
            .filter(|(score, _)| *score > 0)
            .collect();
        // stable sort keeps input order among ties
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let picked: Vec<&ScrapedDocument> = scored
            .into_iter()
            .take(self.max_documents)
            .map(|(_, doc)| doc)
            .collect();
        Ok(render_documents(&picked))
    }
}

/// Lowercased, de-duplicated alphanumeric tokens of at least three characters.
pub(crate) fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
        .filter(|token| seen.insert(token.clone()))
        .take(MAX_KEYWORDS)
        .collect()
}

pub(crate) fn keyword_score(keywords: &[String], doc: &ScrapedDocument) -> usize {
    let haystack = format!("{} {}", doc.title, doc.raw_content).to_lowercase();
    keywords
        .iter()
        .filter(|keyword| haystack.contains(keyword.as_str()))
        .count()
}

pub(crate) fn render_documents(documents: &[&ScrapedDocument]) -> String {
    let mut output = String::new();
    for doc in documents {
        let _ = writeln!(
            output,
            "Source: {}\nTitle: {}\nContent: {}\n",
            doc.url,
            doc.title,
            doc.raw_content.trim()
        );
    }
    output.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_normalised() {
        let keywords = extract_keywords("Rust async, RUST traits & an ox");
        assert_eq!(keywords, vec!["rust", "async", "traits"]);
    }

    #[tokio::test]
    async fn ranker_orders_by_overlap_and_drops_misses() {
        let docs = vec![
            ScrapedDocument::new("https://a", "cooking pasta"),
            ScrapedDocument::new("https://b", "rust async runtime internals"),
            ScrapedDocument::new("https://c", "rust ownership"),
        ];

        let text = KeywordRanker::default()
            .rank("rust async", &docs)
            .await
            .unwrap();

        let b = text.find("https://b").unwrap();
        let c = text.find("https://c").unwrap();
        assert!(b < c);
        assert!(!text.contains("https://a"));
    }

    #[tokio::test]
    async fn no_matches_yields_empty_text() {
        let docs = vec![ScrapedDocument::new("https://a", "cooking pasta")];
        let text = KeywordRanker::new(3).rank("quantum", &docs).await.unwrap();
        assert!(text.is_empty());
    }
}
