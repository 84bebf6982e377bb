use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::scraper::ScrapedDocument;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "csv", "json", "html", "htm", "rst"];

/// Source of local documents for the `local` and `hybrid` report sources.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<ScrapedDocument>>;
}

/// Reads text files under a directory (or a single file).
#[derive(Debug, Clone)]
pub struct LocalDocumentLoader {
    path: PathBuf,
    recursive: bool,
}

impl LocalDocumentLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recursive: true,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentLoader for LocalDocumentLoader {
    async fn load(&self) -> Result<Vec<ScrapedDocument>> {
        let path = self.path.clone();
        let recursive = self.recursive;
        let docs = tokio::task::spawn_blocking(move || collect_documents(&path, recursive))
            .await
            .context("document loader task panicked")??;
        info!(path = %self.path.display(), count = docs.len(), "loaded local documents");
        Ok(docs)
    }
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn collect_documents(path: &Path, recursive: bool) -> Result<Vec<ScrapedDocument>> {
    if !path.exists() {
        anyhow::bail!("document path {} does not exist", path.display());
    }

    let files: Box<dyn Iterator<Item = PathBuf>> = if path.is_file() {
        Box::new(std::iter::once(path.to_path_buf()))
    } else {
        let walker = WalkDir::new(path)
            .min_depth(0)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .sort_by_file_name();
        Box::new(
            walker
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|file| is_text_file(file)),
        )
    };

    let mut docs = Vec::new();
    for file in files {
        let text = fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        if text.trim().is_empty() {
            debug!(file = %file.display(), "skipping empty document");
            continue;
        }
        let title = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        docs.push(
            ScrapedDocument::new(file.display().to_string(), text)
                .with_title(title)
                .with_metadata("source", Value::String(file.display().to_string())),
        );
    }

    Ok(docs)
}

/// Caller-supplied documents for the `documents` report source.
#[derive(Debug, Clone, Default)]
pub struct ProvidedDocuments {
    documents: Vec<ScrapedDocument>,
}

impl ProvidedDocuments {
    pub fn new(documents: Vec<ScrapedDocument>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl DocumentLoader for ProvidedDocuments {
    async fn load(&self) -> Result<Vec<ScrapedDocument>> {
        Ok(self
            .documents
            .iter()
            .filter(|doc| !doc.raw_content.trim().is_empty())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn loads_text_files_and_skips_others() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.md"), "battery chemistry notes").unwrap();
        fs::write(dir.path().join("blank.txt"), "  \n").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("deep.txt"), "nested text").unwrap();

        let docs = LocalDocumentLoader::new(dir.path()).load().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().any(|doc| doc.title == "notes"));

        let shallow = LocalDocumentLoader::new(dir.path())
            .recursive(false)
            .load()
            .await
            .unwrap();
        assert_eq!(shallow.len(), 1);
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let result = LocalDocumentLoader::new(dir.path().join("absent"))
            .load()
            .await;
        assert!(result.is_err());
    }
}
