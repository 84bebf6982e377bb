use tokio::sync::RwLock;

use crate::dedup::VisitedUrls;
use crate::images::{ImageCandidate, ImageHasher, select_top_images};
use crate::scraper::ScrapedDocument;

/// Research state shared by every task of a run.
///
/// Sources and images accumulate across runs; the visited set is reset when
/// a run starts planning and the context is replaced when it finishes.
#[derive(Debug, Default)]
pub struct ResearchState {
    visited_urls: VisitedUrls,
    sources: RwLock<Vec<ScrapedDocument>>,
    images: RwLock<Vec<ImageCandidate>>,
    context: RwLock<Vec<String>>,
}

impl ResearchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited_urls(&self) -> &VisitedUrls {
        &self.visited_urls
    }

    pub async fn sources(&self) -> Vec<ScrapedDocument> {
        self.sources.read().await.clone()
    }

    pub async fn images(&self) -> Vec<ImageCandidate> {
        self.images.read().await.clone()
    }

    pub async fn context(&self) -> Vec<String> {
        self.context.read().await.clone()
    }

    pub(crate) async fn add_sources(&self, documents: &[ScrapedDocument]) {
        self.sources.write().await.extend_from_slice(documents);
    }

    /// Select up to `k` new images against the collection and append them.
    ///
    /// The write lock spans selection so concurrent scrapes cannot both add
    /// the same image.
    pub(crate) async fn add_top_images(
        &self,
        candidates: &[ImageCandidate],
        k: usize,
        hasher: &dyn ImageHasher,
    ) -> Vec<ImageCandidate> {
        let mut images = self.images.write().await;
        let selected = select_top_images(candidates, k, &images, hasher);
        images.extend(selected.iter().cloned());
        selected
    }

    pub(crate) async fn set_context(&self, context: Vec<String>) {
        *self.context.write().await = context;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::FilenameHasher;

    #[tokio::test]
    async fn images_already_collected_are_not_added_twice() {
        let state = ResearchState::new();
        let candidates = vec![
            ImageCandidate::new("https://cdn.example/a.png", 3),
            ImageCandidate::new("https://cdn.example/b.png", 1),
        ];

        let first = state.add_top_images(&candidates, 4, &FilenameHasher).await;
        assert_eq!(first.len(), 2);

        let second = state.add_top_images(&candidates, 4, &FilenameHasher).await;
        assert!(second.is_empty());
        assert_eq!(state.images().await.len(), 2);
    }
}
