use dashmap::DashSet;

/// Run-scoped set of URLs that have already been handed to the scraper.
///
/// `DashSet::insert` is an atomic check-and-insert, so concurrent sub-query
/// tasks can never both claim the same URL.
#[derive(Debug, Default)]
pub struct VisitedUrls {
    urls: DashSet<String>,
}

impl VisitedUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim every candidate that has not been seen yet, preserving input order.
    pub fn filter_new<I, S>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        candidates
            .into_iter()
            .map(Into::into)
            .filter(|url| self.urls.insert(url.clone()))
            .collect()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Forget everything; called when a new top-level research task starts.
    pub fn reset(&self) {
        self.urls.clear();
    }

    /// Sorted copy of the visited URLs.
    pub fn snapshot(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.urls.iter().map(|url| url.key().clone()).collect();
        urls.sort();
        urls
    }
}
