//! Writes approved changesets to the per-model YAML tree.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::catalog::{Catalog, CatalogError, Model, ModelFiles, ModelId, ProviderId};

use super::changeset::ProviderChangeset;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOperation {
    CleanDirectory,
    WriteModel(ModelId),
    DeleteModel(ModelId),
    SaveCatalog,
}

impl fmt::Display for ApplyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyOperation::CleanDirectory => f.write_str("clean provider directory"),
            ApplyOperation::WriteModel(id) => write!(f, "write model {id}"),
            ApplyOperation::DeleteModel(id) => write!(f, "delete model {id}"),
            ApplyOperation::SaveCatalog => f.write_str("save providers and authors"),
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to {operation} for provider {provider}: {source}")]
pub struct ApplyError {
    pub provider: ProviderId,
    pub operation: ApplyOperation,
    #[source]
    pub source: CatalogError,
}

/// Persists changesets under one output directory.
#[derive(Debug, Clone)]
pub struct Applier {
    files: ModelFiles,
}

impl Applier {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            files: ModelFiles::new(output_dir.as_ref()),
        }
    }

    pub fn files(&self) -> &ModelFiles {
        &self.files
    }

    /// Removes every persisted model of a provider. Only called after a destructive approval.
    pub fn clean_provider_directory(&self, provider_id: &ProviderId) -> Result<(), ApplyError> {
        self.files
            .clean_provider_directory(provider_id.as_str())
            .map_err(|source| ApplyError {
                provider: provider_id.clone(),
                operation: ApplyOperation::CleanDirectory,
                source,
            })
    }

    /// Writes additions and updates, deletes removals, then mirrors the result into `catalog`.
    ///
    /// With `fresh` the provider directory is wiped first and the provider's
    /// model map is replaced by the additions. Files recorded at load time
    /// under a non-canonical name are removed once their model is rewritten
    /// or dropped.
    pub fn apply(
        &self,
        catalog: &mut Catalog,
        changeset: &ProviderChangeset,
        fresh: bool,
    ) -> Result<(), ApplyError> {
        let provider = &changeset.provider_id;
        let mut files: BTreeMap<ModelId, Vec<PathBuf>> = if fresh {
            self.clean_provider_directory(provider)?;
            BTreeMap::new()
        } else {
            catalog
                .provider(provider.as_str())
                .map(|known| known.model_files.clone())
                .unwrap_or_default()
        };

        for model in changeset
            .added
            .iter()
            .chain(changeset.updated.iter().map(|update| &update.new))
        {
            let stale = files.remove(&model.id).unwrap_or_default();
            let path = self.write(provider, model, &stale)?;
            files.insert(model.id.clone(), vec![path]);
        }
        for model in &changeset.removed {
            let stale = files.remove(&model.id).unwrap_or_default();
            self.delete(provider, &model.id, &stale)?;
        }

        if fresh {
            let models = changeset
                .added
                .iter()
                .map(|model| (model.id.clone(), model.clone()))
                .collect();
            catalog.replace_models(provider.as_str(), models);
        } else {
            let upserts = changeset
                .added
                .iter()
                .cloned()
                .chain(changeset.updated.iter().map(|update| update.new.clone()));
            catalog.upsert_models(provider.as_str(), upserts);
            let removed = changeset.removed.iter().map(|model| &model.id);
            catalog.remove_models(provider.as_str(), removed);
        }
        if let Some(known) = catalog.provider_mut(provider.as_str()) {
            known.model_files = files;
        }

        info!(
            provider = %provider,
            added = changeset.added.len(),
            updated = changeset.updated.len(),
            removed = changeset.removed.len(),
            fresh,
            "Applied changeset"
        );
        Ok(())
    }

    fn write(
        &self,
        provider: &ProviderId,
        model: &Model,
        stale: &[PathBuf],
    ) -> Result<PathBuf, ApplyError> {
        let err = |source| ApplyError {
            provider: provider.clone(),
            operation: ApplyOperation::WriteModel(model.id.clone()),
            source,
        };
        let path = self.files.write_model(provider.as_str(), model).map_err(err)?;
        for old in stale.iter().filter(|old| **old != path) {
            self.files.delete_file(provider.as_str(), old).map_err(err)?;
        }
        Ok(path)
    }

    fn delete(
        &self,
        provider: &ProviderId,
        model_id: &ModelId,
        stale: &[PathBuf],
    ) -> Result<(), ApplyError> {
        let err = |source| ApplyError {
            provider: provider.clone(),
            operation: ApplyOperation::DeleteModel(model_id.clone()),
            source,
        };
        for old in stale {
            self.files.delete_file(provider.as_str(), old).map_err(err)?;
        }
        self.files.delete_model(provider.as_str(), model_id).map_err(err)
    }

    /// Writes `providers.yaml` and `authors.yaml` so the output directory loads as a catalog.
    pub fn save_catalog(&self, catalog: &Catalog) -> Result<(), ApplyError> {
        let err = |source| ApplyError {
            provider: ProviderId::from("*"),
            operation: ApplyOperation::SaveCatalog,
            source,
        };
        self.files
            .save_providers(catalog.providers().values())
            .map_err(err)?;
        self.files.save_authors(catalog.authors().values()).map_err(err)
    }
}

/// Sets bookkeeping timestamps. Additions are created now, updates keep their
/// original creation time.
pub fn stamp(changeset: &mut ProviderChangeset, now: DateTime<Utc>) {
    for model in &mut changeset.added {
        model.created_at = Some(now);
        model.updated_at = Some(now);
    }
    for update in &mut changeset.updated {
        update.new.created_at = update.old.created_at.or(Some(now));
        update.new.updated_at = Some(now);
    }
}
