//! Secondary, non-authoritative metadata used to fill gaps in live listings.

mod index;
mod models_dev;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::catalog::Model;

pub use index::{EnrichmentIndex, IndexCost, IndexEntry, IndexProvider};
pub use models_dev::ModelsDevSource;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with {status}")]
    Status { url: String, status: StatusCode },
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("enrichment dataset has not been downloaded to {0}")]
    Missing(PathBuf),
}

/// Lifecycle of an enrichment dataset: obtain, index, load, apply, discard.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// Makes sure a local copy of the raw dataset exists. Idempotent.
    async fn ensure_repository(&self) -> Result<(), EnrichmentError>;

    /// Materializes the queryable index and returns its path.
    async fn build_index(&self) -> Result<PathBuf, EnrichmentError>;

    async fn parse(&self, path: &Path) -> Result<EnrichmentIndex, EnrichmentError>;

    /// Fills unset fields only. Returns the models and the number enhanced.
    fn enhance(
        &self,
        models: Vec<Model>,
        provider_id: &str,
        index: &EnrichmentIndex,
    ) -> (Vec<Model>, usize) {
        index.enhance(models, provider_id)
    }

    /// Removes the local working copy.
    async fn cleanup(&self) -> Result<(), EnrichmentError>;
}
