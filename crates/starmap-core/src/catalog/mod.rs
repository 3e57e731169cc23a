//! In-memory catalog of providers, authors and models.
//!
//! A catalog is loaded either from an on-disk tree (`providers.yaml`,
//! `authors.yaml` and one YAML file per model under `<providerID>/`) or from
//! the baseline compiled into the binary. The sync pipeline clones it freely;
//! every clone is an independent deep copy.

mod store;
mod types;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub use store::{ModelFiles, PROVIDERS_FILE, AUTHORS_FILE};
pub use types::*;

const EMBEDDED_PROVIDERS: &str = include_str!("../../data/providers.yaml");
const EMBEDDED_AUTHORS: &str = include_str!("../../data/authors.yaml");
const SUGGESTION_THRESHOLD: f64 = 0.8;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("YAML serialization error: {0}")]
    Serialize(#[from] serde_yaml::Error),
    #[error("model file {0} has an empty id")]
    EmptyModelId(PathBuf),
    #[error("invalid model id {id:?}: {reason}")]
    InvalidModelId { id: String, reason: String },
    #[error("duplicate provider id {0}")]
    DuplicateProvider(ProviderId),
}

/// Where a catalog was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    Embedded,
    Directory(PathBuf),
}

/// A provider's chat-completions endpoint, flattened for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub provider_id: ProviderId,
    pub url: String,
    pub health_api_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    providers: BTreeMap<ProviderId, Provider>,
    authors: BTreeMap<AuthorId, Author>,
    source: CatalogSource,
}

impl Catalog {
    pub fn new(
        providers: impl IntoIterator<Item = Provider>,
        authors: impl IntoIterator<Item = Author>,
    ) -> Self {
        let mut catalog = Self {
            providers: providers.into_iter().map(|p| (p.id.clone(), p)).collect(),
            authors: authors.into_iter().map(|a| (a.id.clone(), a)).collect(),
            source: CatalogSource::Embedded,
        };
        catalog.rebuild_author_models();
        catalog
    }

    /// Baseline compiled into the binary. Carries providers and authors, no models.
    pub fn embedded() -> Result<Self, CatalogError> {
        let providers =
            parse_providers(EMBEDDED_PROVIDERS, Path::new("<embedded>/providers.yaml"))?;
        let authors = parse_authors(EMBEDDED_AUTHORS, Path::new("<embedded>/authors.yaml"))?;
        Ok(Self::new(providers, authors))
    }

    /// Loads `dir` when it holds a catalog, otherwise falls back to the embedded baseline.
    pub fn load(dir: &Path) -> Result<Self, CatalogError> {
        if dir.join(PROVIDERS_FILE).is_file() {
            Self::load_dir(dir)
        } else {
            debug!(dir = %dir.display(), "No catalog on disk, using embedded baseline");
            Self::embedded()
        }
    }

    pub fn load_dir(dir: &Path) -> Result<Self, CatalogError> {
        let providers_path = dir.join(PROVIDERS_FILE);
        let providers = parse_providers(&read(&providers_path)?, &providers_path)?;

        let authors_path = dir.join(AUTHORS_FILE);
        let authors = if authors_path.is_file() {
            parse_authors(&read(&authors_path)?, &authors_path)?
        } else {
            Vec::new()
        };

        let mut by_id = BTreeMap::new();
        for provider in providers {
            if by_id.contains_key(&provider.id) {
                return Err(CatalogError::DuplicateProvider(provider.id));
            }
            by_id.insert(provider.id.clone(), provider);
        }

        for provider in by_id.values_mut() {
            let provider_dir = dir.join(provider.id.as_str());
            if provider_dir.is_dir() {
                (provider.models, provider.model_files) = load_model_dir(&provider_dir)?;
            }
        }

        let mut catalog = Self {
            providers: by_id,
            authors: authors.into_iter().map(|a| (a.id.clone(), a)).collect(),
            source: CatalogSource::Directory(dir.to_path_buf()),
        };
        catalog.rebuild_author_models();
        Ok(catalog)
    }

    pub fn source(&self) -> &CatalogSource {
        &self.source
    }

    pub fn providers(&self) -> &BTreeMap<ProviderId, Provider> {
        &self.providers
    }

    pub fn provider(&self, id: &str) -> Option<&Provider> {
        self.providers.get(id)
    }

    pub fn provider_mut(&mut self, id: &str) -> Option<&mut Provider> {
        self.providers.get_mut(id)
    }

    pub fn authors(&self) -> &BTreeMap<AuthorId, Author> {
        &self.authors
    }

    pub fn author(&self, id: &str) -> Option<&Author> {
        self.authors.get(id)
    }

    /// Inserts or replaces models for a provider. Unknown providers are ignored.
    pub fn upsert_models(&mut self, provider_id: &str, models: impl IntoIterator<Item = Model>) {
        if let Some(provider) = self.providers.get_mut(provider_id) {
            for model in models {
                provider.models.insert(model.id.clone(), model);
            }
        }
        self.rebuild_author_models();
    }

    pub fn remove_models<'a>(
        &mut self,
        provider_id: &str,
        ids: impl IntoIterator<Item = &'a ModelId>,
    ) {
        if let Some(provider) = self.providers.get_mut(provider_id) {
            for id in ids {
                provider.models.remove(id);
            }
        }
        self.rebuild_author_models();
    }

    pub fn replace_models(&mut self, provider_id: &str, models: BTreeMap<ModelId, Model>) {
        if let Some(provider) = self.providers.get_mut(provider_id) {
            provider.models = models;
        }
        self.rebuild_author_models();
    }

    /// Every `(provider, model)` pair in the catalog.
    pub fn models(&self) -> impl Iterator<Item = (&ProviderId, &Model)> {
        self.providers
            .iter()
            .flat_map(|(id, provider)| provider.models.values().map(move |model| (id, model)))
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.providers
            .values()
            .filter_map(|provider| {
                provider.chat_completions.as_ref().map(|chat| Endpoint {
                    provider_id: provider.id.clone(),
                    url: chat.url.clone(),
                    health_api_url: chat.health_api_url.clone(),
                })
            })
            .collect()
    }

    /// Closest known provider ID, for "did you mean" hints.
    pub fn suggest_provider(&self, id: &str) -> Option<&ProviderId> {
        let needle = id.to_ascii_lowercase();
        self.providers
            .keys()
            .map(|candidate| (candidate, strsim::jaro_winkler(&needle, candidate.as_str())))
            .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(candidate, _)| candidate)
    }

    fn rebuild_author_models(&mut self) {
        for author in self.authors.values_mut() {
            author.models.clear();
        }
        for provider in self.providers.values() {
            for model in provider.models.values() {
                for credited in &model.authors {
                    if let Some(author) = self.authors.get_mut(&credited.id) {
                        author.models.insert(model.id.clone(), model.clone());
                    }
                }
            }
        }
    }
}

fn read(path: &Path) -> Result<String, CatalogError> {
    fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_providers(raw: &str, path: &Path) -> Result<Vec<Provider>, CatalogError> {
    serde_yaml::from_str(raw).map_err(|source| CatalogError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_authors(raw: &str, path: &Path) -> Result<Vec<Author>, CatalogError> {
    serde_yaml::from_str(raw).map_err(|source| CatalogError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn parse_model(raw: &str, path: &Path) -> Result<Model, CatalogError> {
    let model: Model = serde_yaml::from_str(raw).map_err(|source| CatalogError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    if model.id.is_empty() {
        return Err(CatalogError::EmptyModelId(path.to_path_buf()));
    }
    Ok(model)
}

type LoadedModels = (BTreeMap<ModelId, Model>, BTreeMap<ModelId, Vec<PathBuf>>);

fn load_model_dir(dir: &Path) -> Result<LoadedModels, CatalogError> {
    let mut models = BTreeMap::new();
    let mut files: BTreeMap<ModelId, Vec<PathBuf>> = BTreeMap::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|err| CatalogError::Read {
            path: dir.to_path_buf(),
            source: err.into(),
        })?;
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if !entry.file_type().is_file() || !is_yaml {
            continue;
        }

        let model = parse_model(&read(path)?, path)?;
        files
            .entry(model.id.clone())
            .or_default()
            .push(path.to_path_buf());
        if let Some(previous) = models.insert(model.id.clone(), model) {
            warn!(
                model = %previous.id,
                path = %path.display(),
                "Duplicate model id on disk, keeping the later file"
            );
        }
    }
    Ok((models, files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn embedded_catalog_parses() {
        let catalog = Catalog::embedded().expect("embedded catalog");
        assert!(catalog.provider("openai").is_some());
        assert!(catalog.provider("anthropic").is_some());
        assert!(catalog.author("meta").is_some());
        assert!(catalog.models().next().is_none());
    }

    #[test]
    fn load_falls_back_to_embedded_without_providers_file() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::load(dir.path()).unwrap();
        assert_eq!(catalog.source(), &CatalogSource::Embedded);
    }

    #[test]
    fn load_dir_reads_nested_model_files() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(PROVIDERS_FILE),
            "- id: acme\n  name: Acme\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("acme/meta-llama")).unwrap();
        fs::write(dir.path().join("acme/a.yaml"), "id: a\nname: A\n").unwrap();
        fs::write(
            dir.path().join("acme/meta-llama/llama-3.yaml"),
            "id: meta-llama/llama-3\nname: Llama 3\n",
        )
        .unwrap();

        let catalog = Catalog::load(dir.path()).unwrap();
        let acme = catalog.provider("acme").unwrap();
        assert_eq!(acme.models.len(), 2);
        assert!(acme.models.contains_key("meta-llama/llama-3"));
        assert_eq!(
            acme.model_files["meta-llama/llama-3"],
            vec![dir.path().join("acme/meta-llama/llama-3.yaml")]
        );
    }

    #[test]
    fn load_dir_records_every_file_of_a_model() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PROVIDERS_FILE), "- id: acme\n  name: Acme\n").unwrap();
        fs::create_dir_all(dir.path().join("acme")).unwrap();
        fs::write(dir.path().join("acme/a.yaml"), "id: a\nname: A\n").unwrap();
        fs::write(dir.path().join("acme/legacy.yml"), "id: a\nname: Legacy A\n").unwrap();

        let catalog = Catalog::load(dir.path()).unwrap();
        let acme = catalog.provider("acme").unwrap();
        assert_eq!(acme.models.len(), 1);
        assert_eq!(acme.models["a"].name, "Legacy A");
        assert_eq!(
            acme.model_files["a"],
            vec![dir.path().join("acme/a.yaml"), dir.path().join("acme/legacy.yml")]
        );
    }

    #[test]
    fn empty_model_id_is_a_load_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PROVIDERS_FILE), "- id: acme\n  name: Acme\n").unwrap();
        fs::create_dir_all(dir.path().join("acme")).unwrap();
        fs::write(dir.path().join("acme/broken.yaml"), "id: ''\nname: Broken\n").unwrap();

        let err = Catalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::EmptyModelId(_)));
    }

    #[test]
    fn author_models_follow_model_credits() {
        let meta = Author {
            id: AuthorId::from("meta"),
            name: "Meta".to_string(),
            ..Author::default()
        };
        let provider = Provider {
            id: ProviderId::from("groq"),
            name: "Groq".to_string(),
            ..Provider::default()
        };
        let mut catalog = Catalog::new([provider], [meta.clone()]);

        let mut model = Model::new("llama-3.1-8b-instant");
        model.authors.push(meta.reference());
        catalog.upsert_models("groq", [model]);

        let author = catalog.author("meta").unwrap();
        assert!(author.models.contains_key("llama-3.1-8b-instant"));

        catalog.remove_models("groq", [&ModelId::from("llama-3.1-8b-instant")]);
        assert!(catalog.author("meta").unwrap().models.is_empty());
    }

    #[test]
    fn suggests_close_provider_ids() {
        let catalog = Catalog::embedded().unwrap();
        assert_eq!(
            catalog.suggest_provider("antropic").map(ProviderId::as_str),
            Some("anthropic")
        );
        assert!(catalog.suggest_provider("zzzzzz").is_none());
    }
}
