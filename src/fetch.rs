//! Fragment retrieval.
//!
//! A component whose element names a fragment locator fetches its markup
//! through a [`FragmentFetcher`] before populating its isolated scope.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component as PathComponent, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("fragment '{0}' not found")]
    NotFound(String),

    #[error("fragment locator '{0}' escapes the fragment root")]
    OutsideRoot(String),

    #[error("failed to read fragment '{locator}': {message}")]
    Io { locator: String, message: String },
}

#[async_trait(?Send)]
pub trait FragmentFetcher {
    async fn fetch(&self, locator: &str) -> Result<String, FetchError>;
}

/// In-memory fragments keyed by locator.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    fragments: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fragment(mut self, locator: &str, markup: &str) -> Self {
        self.insert(locator, markup);
        self
    }

    pub fn insert(&mut self, locator: &str, markup: &str) {
        self.fragments
            .insert(locator.to_string(), markup.to_string());
    }
}

#[async_trait(?Send)]
impl FragmentFetcher for StaticFetcher {
    async fn fetch(&self, locator: &str) -> Result<String, FetchError> {
        self.fragments
            .get(locator)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(locator.to_string()))
    }
}

/// Fragments read from files below a root directory. Locators are paths
/// relative to the root; a leading `/` is ignored and `..` is refused.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, locator: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(locator.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| matches!(c, PathComponent::ParentDir | PathComponent::Prefix(_)));
        if escapes {
            return Err(FetchError::OutsideRoot(locator.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait(?Send)]
impl FragmentFetcher for DirectoryFetcher {
    async fn fetch(&self, locator: &str) -> Result<String, FetchError> {
        let path = self.resolve(locator)?;
        debug!(path = %path.display(), "reading fragment");
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(locator.to_string())
            } else {
                FetchError::Io {
                    locator: locator.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }
}
