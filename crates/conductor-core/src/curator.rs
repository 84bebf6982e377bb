use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::scraper::ScrapedDocument;

/// External collaborator that ranks gathered context into a source list.
///
/// Output is untrusted: anything other than a non-empty array of objects is
/// treated as malformed by [`parse_curated`].
#[async_trait]
pub trait SourceCurator: Send + Sync {
    async fn curate(&self, query: &str, context: &[String]) -> anyhow::Result<Value>;
}

/// Interpret curator output as documents, or `None` when it is malformed.
pub fn parse_curated(value: &Value) -> Option<Vec<ScrapedDocument>> {
    let items = value.as_array()?;
    if !items.first().is_some_and(Value::is_object) {
        return None;
    }

    let docs: Vec<ScrapedDocument> = items
        .iter()
        .filter_map(|item| match serde_json::from_value::<ScrapedDocument>(item.clone()) {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(error = %err, "dropping curated source without raw_content");
                None
            }
        })
        .collect();

    if docs.is_empty() { None } else { Some(docs) }
}
