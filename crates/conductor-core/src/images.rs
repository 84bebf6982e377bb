use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

/// Minimum score for an image to be preferred during selection.
pub const HIGH_SCORE: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub url: String,
    /// Relevance score in `0..=3`.
    pub score: u8,
}

impl ImageCandidate {
    pub fn new(url: impl Into<String>, score: u8) -> Self {
        Self {
            url: url.into(),
            score,
        }
    }
}

/// Computes a content identity for an image URL.
///
/// Returning `None` (or an empty string) marks the image as unhashable; the
/// selector skips it.
pub trait ImageHasher: Send + Sync {
    fn hash(&self, image_url: &str) -> Option<String>;
}

/// Hashes the image filename plus the `url` query parameter CDNs use to wrap
/// the original asset, so resized copies of one image collapse to one hash.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilenameHasher;

impl ImageHasher for FilenameHasher {
    fn hash(&self, image_url: &str) -> Option<String> {
        let parsed = match Url::parse(image_url) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(url = %image_url, error = %err, "image url is not hashable");
                return None;
            }
        };

        let filename = parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .unwrap_or_default()
            .to_string();
        let essential: String = parsed
            .query_pairs()
            .filter(|(key, _)| key == "url")
            .map(|(_, value)| value.into_owned())
            .collect();

        let digest = Sha256::digest(format!("{filename}{essential}").as_bytes());
        Some(hex::encode(digest))
    }
}

/// Pick up to `k` images, high scores first, unique by content hash and not
/// already part of `existing`.
pub fn select_top_images(
    images: &[ImageCandidate],
    k: usize,
    existing: &[ImageCandidate],
    hasher: &dyn ImageHasher,
) -> Vec<ImageCandidate> {
    let mut selected = Vec::new();
    if k == 0 {
        return selected;
    }

    let existing_urls: HashSet<&str> = existing.iter().map(|img| img.url.as_str()).collect();
    let mut seen_hashes = HashSet::new();

    let high_score = images.iter().filter(|img| img.score >= HIGH_SCORE);
    for image in high_score.chain(images.iter()) {
        if existing_urls.contains(image.url.as_str()) {
            continue;
        }
        let Some(hash) = hasher.hash(&image.url) else {
            continue;
        };
        if hash.trim().is_empty() || !seen_hashes.insert(hash) {
            continue;
        }

        selected.push(image.clone());
        if selected.len() == k {
            break;
        }
    }

    selected
}
