//! models.dev (<https://models.dev>) dataset, cached locally as JSON.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::fs;
use tracing::{debug, info, warn};

use super::{
    EnrichmentError, EnrichmentIndex, EnrichmentSource, IndexCost, IndexEntry, IndexProvider,
};
use crate::catalog::Modality;
use crate::config::ModelsDevPreferences;

const RAW_FILE: &str = "api.json";
const INDEX_FILE: &str = "index.json";

/// The whole dataset, keyed by models.dev provider ID.
type RawDataset = HashMap<String, RawProvider>;

#[derive(Debug, Deserialize)]
struct RawProvider {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    models: HashMap<String, RawModel>,
}

/// Absent booleans stay `None` so they cannot mask live values.
#[derive(Debug, Deserialize)]
struct RawModel {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    attachment: Option<bool>,
    #[serde(default)]
    reasoning: Option<bool>,
    #[serde(default)]
    tool_call: Option<bool>,
    #[serde(default)]
    structured_output: Option<bool>,
    #[serde(default)]
    temperature: Option<bool>,
    #[serde(default)]
    open_weights: Option<bool>,
    #[serde(default)]
    knowledge: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    modalities: RawModalities,
    #[serde(default)]
    cost: Option<RawCost>,
    #[serde(default)]
    limit: RawLimit,
}

#[derive(Debug, Default, Deserialize)]
struct RawModalities {
    #[serde(default)]
    input: Vec<String>,
    #[serde(default)]
    output: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCost {
    #[serde(default)]
    input: Option<f64>,
    #[serde(default)]
    output: Option<f64>,
    #[serde(default)]
    reasoning: Option<f64>,
    #[serde(default)]
    cache_read: Option<f64>,
    #[serde(default)]
    cache_write: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLimit {
    #[serde(default)]
    context: Option<u64>,
    #[serde(default)]
    output: Option<u64>,
}

fn modalities(raw: &[String]) -> Vec<Modality> {
    let mut parsed: Vec<Modality> = raw.iter().filter_map(|m| Modality::parse(m)).collect();
    parsed.sort();
    parsed.dedup();
    parsed
}

/// Release dates are `YYYY-MM-DD`, occasionally only `YYYY-MM`.
fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d"))
        .ok()
}

impl From<RawModel> for IndexEntry {
    fn from(raw: RawModel) -> Self {
        let cost = raw.cost.unwrap_or_default();
        Self {
            name: raw.name.filter(|name| !name.trim().is_empty()),
            family: raw.family.filter(|family| !family.trim().is_empty()),
            attachment: raw.attachment,
            reasoning: raw.reasoning,
            tool_call: raw.tool_call,
            structured_output: raw.structured_output,
            temperature: raw.temperature,
            open_weights: raw.open_weights,
            knowledge: raw.knowledge.filter(|k| !k.trim().is_empty()),
            release_date: raw.release_date.as_deref().and_then(parse_release_date),
            input_modalities: modalities(&raw.modalities.input),
            output_modalities: modalities(&raw.modalities.output),
            cost: IndexCost {
                input: cost.input,
                output: cost.output,
                reasoning: cost.reasoning,
                cache_read: cost.cache_read,
                cache_write: cost.cache_write,
            },
            context_window: raw.limit.context.filter(|value| *value > 0),
            output_tokens: raw.limit.output.filter(|value| *value > 0),
        }
    }
}

/// Downloads `api.json` into a cache directory and indexes it.
#[derive(Debug, Clone)]
pub struct ModelsDevSource {
    client: Client,
    api_url: String,
    logo_base_url: String,
    cache_dir: PathBuf,
    refresh_after: Duration,
    download_timeout: Duration,
}

impl ModelsDevSource {
    pub fn new(client: Client, preferences: &ModelsDevPreferences) -> Self {
        Self {
            client,
            api_url: preferences.api_url.clone(),
            logo_base_url: preferences.logo_base_url.trim_end_matches('/').to_string(),
            cache_dir: preferences.cache_dir(),
            refresh_after: preferences.refresh_after(),
            download_timeout: preferences.download_timeout(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn raw_path(&self) -> PathBuf {
        self.cache_dir.join(RAW_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.cache_dir.join(INDEX_FILE)
    }

    async fn is_fresh(&self, path: &Path) -> bool {
        let Ok(metadata) = fs::metadata(path).await else {
            return false;
        };
        metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age < self.refresh_after)
    }

    async fn download(&self) -> Result<Vec<u8>, EnrichmentError> {
        let response = self
            .client
            .get(&self.api_url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|source| EnrichmentError::Download {
                url: self.api_url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(EnrichmentError::Status {
                url: self.api_url.clone(),
                status: response.status(),
            });
        }
        let bytes = response.bytes().await.map_err(|source| EnrichmentError::Download {
            url: self.api_url.clone(),
            source,
        })?;

        serde_json::from_slice::<RawDataset>(&bytes).map_err(|source| EnrichmentError::Json {
            path: PathBuf::from(&self.api_url),
            source,
        })?;
        Ok(bytes.to_vec())
    }

    fn build(&self, dataset: RawDataset) -> EnrichmentIndex {
        let providers = dataset
            .into_iter()
            .map(|(id, provider)| {
                let models: BTreeMap<String, IndexEntry> = provider
                    .models
                    .into_iter()
                    .map(|(model_id, model)| (model_id, IndexEntry::from(model)))
                    .collect();
                let entry = IndexProvider {
                    name: provider.name.unwrap_or_else(|| id.clone()),
                    logo_url: Some(format!("{}/{id}.svg", self.logo_base_url)),
                    models,
                };
                (id, entry)
            })
            .collect();
        EnrichmentIndex {
            generated_at: Some(Utc::now()),
            providers,
        }
    }
}

#[async_trait]
impl EnrichmentSource for ModelsDevSource {
    async fn ensure_repository(&self) -> Result<(), EnrichmentError> {
        let raw_path = self.raw_path();
        if self.is_fresh(&raw_path).await {
            debug!(path = %raw_path.display(), "models.dev cache is fresh");
            return Ok(());
        }

        match self.download().await {
            Ok(bytes) => {
                write_atomic(&raw_path, &bytes).await?;
                info!(
                    path = %raw_path.display(),
                    bytes = bytes.len(),
                    "Downloaded models.dev dataset"
                );
                Ok(())
            }
            Err(err) => {
                if !fs::try_exists(&raw_path).await.unwrap_or(false) {
                    return Err(err);
                }
                warn!(
                    error = %err,
                    path = %raw_path.display(),
                    "models.dev refresh failed, keeping cached copy"
                );
                Ok(())
            }
        }
    }

    async fn build_index(&self) -> Result<PathBuf, EnrichmentError> {
        let raw_path = self.raw_path();
        let raw = match fs::read(&raw_path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(EnrichmentError::Missing(raw_path));
            }
            Err(source) => return Err(EnrichmentError::Io { path: raw_path, source }),
        };
        let dataset: RawDataset =
            serde_json::from_slice(&raw).map_err(|source| EnrichmentError::Json {
                path: raw_path.clone(),
                source,
            })?;

        let index = self.build(dataset);
        let model_count: usize = index.providers.values().map(|p| p.models.len()).sum();
        let serialized = serde_json::to_vec_pretty(&index).map_err(|source| EnrichmentError::Json {
            path: self.index_path(),
            source,
        })?;
        let index_path = self.index_path();
        write_atomic(&index_path, &serialized).await?;
        debug!(
            providers = index.providers.len(),
            models = model_count,
            path = %index_path.display(),
            "Built models.dev index"
        );
        Ok(index_path)
    }

    async fn parse(&self, path: &Path) -> Result<EnrichmentIndex, EnrichmentError> {
        let raw = fs::read(path).await.map_err(|source| EnrichmentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| EnrichmentError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    async fn cleanup(&self) -> Result<(), EnrichmentError> {
        match fs::remove_dir_all(&self.cache_dir).await {
            Ok(()) => {
                info!(path = %self.cache_dir.display(), "Removed models.dev cache");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(EnrichmentError::Io {
                path: self.cache_dir.clone(),
                source,
            }),
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EnrichmentError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| EnrichmentError::Io { path, source }
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(io_err(parent))?;
    }
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, bytes).await.map_err(io_err(&temp_path))?;
    fs::rename(&temp_path, path).await.map_err(io_err(path))
}
