//! One-YAML-file-per-model persistence under an output directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{debug, warn};

use super::{Author, CatalogError, Model, ModelId, Provider};

pub const PROVIDERS_FILE: &str = "providers.yaml";
pub const AUTHORS_FILE: &str = "authors.yaml";

/// Writes and deletes `<root>/<providerID>/<modelID>.yaml` files.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    root: PathBuf,
}

impl ModelFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn provider_dir(&self, provider_id: &str) -> PathBuf {
        self.root.join(provider_id)
    }

    /// Path of a model file. `/` in the ID becomes a directory boundary.
    ///
    /// Bytes outside `[A-Za-z0-9._-]` are written as `%XX`, so distinct IDs
    /// never share a file.
    pub fn model_path(
        &self,
        provider_id: &str,
        model_id: &ModelId,
    ) -> Result<PathBuf, CatalogError> {
        let mut path = self.provider_dir(provider_id);
        let segments: Vec<&str> = model_id.as_str().split('/').collect();
        let last = segments.len() - 1;
        for (index, segment) in segments.iter().enumerate() {
            if segment.is_empty() || *segment == "." || *segment == ".." {
                return Err(CatalogError::InvalidModelId {
                    id: model_id.to_string(),
                    reason: format!("segment {segment:?} is not a valid path component"),
                });
            }
            let encoded = encode_segment(segment);
            if index == last {
                path.push(format!("{encoded}.yaml"));
            } else {
                path.push(encoded);
            }
        }
        Ok(path)
    }

    pub fn write_model(&self, provider_id: &str, model: &Model) -> Result<PathBuf, CatalogError> {
        let path = self.model_path(provider_id, &model.id)?;
        write_yaml(&path, model)?;
        debug!(path = %path.display(), "Wrote model file");
        Ok(path)
    }

    /// Removes a model file and prunes directories it leaves empty, up to the provider directory.
    pub fn delete_model(&self, provider_id: &str, model_id: &ModelId) -> Result<(), CatalogError> {
        let path = self.model_path(provider_id, model_id)?;
        self.delete_file(provider_id, &path)
    }

    /// Like [`ModelFiles::delete_model`] for a file found at load time, whatever its name.
    ///
    /// Paths outside the provider directory are left alone.
    pub fn delete_file(&self, provider_id: &str, path: &Path) -> Result<(), CatalogError> {
        let stop = self.provider_dir(provider_id);
        if !path.starts_with(&stop) || path == stop {
            warn!(
                path = %path.display(),
                provider = provider_id,
                "Refusing to delete file outside provider directory"
            );
            return Ok(());
        }
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Model file already absent");
            }
            Err(source) => {
                return Err(CatalogError::Write {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        let mut current = path.parent().map(Path::to_path_buf);
        while let Some(dir) = current {
            if dir == stop || !dir.starts_with(&stop) {
                break;
            }
            let is_empty = fs::read_dir(&dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty || fs::remove_dir(&dir).is_err() {
                break;
            }
            current = dir.parent().map(Path::to_path_buf);
        }
        Ok(())
    }

    /// Deletes every persisted model for a provider.
    pub fn clean_provider_directory(&self, provider_id: &str) -> Result<(), CatalogError> {
        let dir = self.provider_dir(provider_id);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|source| CatalogError::Write {
                path: dir.clone(),
                source,
            })?;
            debug!(dir = %dir.display(), "Removed provider directory");
        }
        Ok(())
    }

    pub fn save_providers<'a>(
        &self,
        providers: impl IntoIterator<Item = &'a Provider>,
    ) -> Result<(), CatalogError> {
        let providers: Vec<&Provider> = providers.into_iter().collect();
        write_yaml(&self.root.join(PROVIDERS_FILE), &providers)
    }

    pub fn save_authors<'a>(
        &self,
        authors: impl IntoIterator<Item = &'a Author>,
    ) -> Result<(), CatalogError> {
        let authors: Vec<&Author> = authors.into_iter().collect();
        write_yaml(&self.root.join(AUTHORS_FILE), &authors)
    }
}

fn encode_segment(segment: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let pattern = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex"));
    pattern
        .replace_all(segment, |caps: &Captures<'_>| {
            caps[0].bytes().map(|byte| format!("%{byte:02X}")).collect::<String>()
        })
        .into_owned()
}

fn write_yaml<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CatalogError> {
    let serialized = serde_yaml::to_string(value)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| CatalogError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = build_temp_path(path);
    fs::write(&temp_path, serialized).map_err(|source| CatalogError::Write {
        path: temp_path.clone(),
        source,
    })?;
    fs::rename(&temp_path, path).map_err(|source| CatalogError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn build_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => {
            temp_path.set_extension(format!("{ext}.tmp"));
        }
        _ => {
            temp_path.set_extension("tmp");
        }
    }
    temp_path
}
