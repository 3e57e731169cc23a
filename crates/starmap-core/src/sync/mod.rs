//! Catalog synchronization: fetch live listings, enrich, diff, apply.
//!
//! [`Syncer::sync`] produces a preview [`SyncResult`]. Nothing is written
//! unless the caller either passed `auto_approve` or later hands the result
//! to [`Syncer::apply`] with an [`Approval`]. Fresh runs need
//! [`Approval::ConfirmedDestructive`].

mod apply;
mod changeset;
mod fetch;
mod merge;
mod result;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, Provider, ProviderId};
use crate::config::{DEFAULT_CONCURRENCY, DEFAULT_FETCH_TIMEOUT_SECS, FileConfig};
use crate::enrichment::{EnrichmentError, EnrichmentIndex, EnrichmentSource};
use crate::providers::{FetchError, ProviderFetcher};

pub use apply::{Applier, ApplyError, ApplyOperation, stamp};
pub use changeset::{CompareMode, ModelUpdate, ProviderChangeset, compare};
pub use result::{ProviderResult, ProviderStatus, SyncResult, SyncTotals};

use fetch::{FetchLimits, fetch_all};
use merge::{AuthorMatcher, merge_baseline, sanitize};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unknown provider {id}{}", suggestion_hint(.suggestion))]
    UnknownProvider {
        id: String,
        suggestion: Option<ProviderId>,
    },
    #[error("provider {0} has no model listing client")]
    Unsupported(ProviderId),
    #[error("sync was cancelled")]
    Cancelled,
    #[error("a dry-run result cannot be applied")]
    DryRun,
    #[error("fresh sync deletes existing model files and needs explicit destructive confirmation")]
    FreshNotConfirmed,
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

/// Caller's decision after reviewing a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Confirmed,
    /// Also acknowledges that fresh mode deletes existing model files.
    ConfirmedDestructive,
}

/// Everything one sync invocation needs. Built by the caller; no global state.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Single provider to sync; `None` means every provider with a client.
    pub provider: Option<String>,
    pub dry_run: bool,
    pub fresh: bool,
    pub auto_approve: bool,
    pub output_dir: PathBuf,
    pub fetch_timeout: Duration,
    pub concurrency: usize,
    pub enrich: bool,
    pub cleanup_enrichment: bool,
}

impl SyncOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider: None,
            dry_run: false,
            fresh: false,
            auto_approve: false,
            output_dir: output_dir.into(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            enrich: true,
            cleanup_enrichment: false,
        }
    }

    pub fn from_config(config: &FileConfig) -> Self {
        Self {
            fetch_timeout: config.sync.fetch_timeout(),
            concurrency: config.sync.concurrency,
            enrich: config.models_dev.enabled,
            ..Self::new(config.sync.output_dir())
        }
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Drives a sync against one catalog.
pub struct Syncer {
    catalog: Catalog,
    fetcher: Arc<dyn ProviderFetcher>,
    enrichment: Option<Arc<dyn EnrichmentSource>>,
    env: EnvLookup,
}

impl Syncer {
    pub fn new(catalog: Catalog, fetcher: Arc<dyn ProviderFetcher>) -> Self {
        Self {
            catalog,
            fetcher,
            enrichment: None,
            env: Arc::new(|name: &str| std::env::var(name).ok()),
        }
    }

    pub fn with_enrichment(mut self, source: Arc<dyn EnrichmentSource>) -> Self {
        self.enrichment = Some(source);
        self
    }

    /// Replaces the environment used to resolve provider credentials.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn into_catalog(self) -> Catalog {
        self.catalog
    }

    /// Computes a preview and, with `auto_approve` outside dry-run, applies it.
    pub async fn sync(
        &mut self,
        cancel: &CancellationToken,
        options: SyncOptions,
    ) -> Result<SyncResult, SyncError> {
        let targets = self.resolve_providers(options.provider.as_deref())?;
        info!(
            providers = targets.len(),
            dry_run = options.dry_run,
            fresh = options.fresh,
            "Starting sync"
        );

        let index = if options.enrich {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Sync cancelled while preparing enrichment");
                    return Err(SyncError::Cancelled);
                }
                index = self.load_enrichment() => index,
            }
        } else {
            None
        };

        let snapshots: Vec<Provider> = targets
            .iter()
            .filter_map(|id| self.catalog.provider(id.as_str()))
            .map(|provider| {
                let mut snapshot = provider.clone();
                snapshot.models.clear();
                snapshot.model_files.clear();
                snapshot.resolve_credentials(|name| (self.env)(name));
                snapshot
            })
            .collect();

        let limits = FetchLimits {
            concurrency: options.concurrency,
            timeout: options.fetch_timeout,
        };
        let outcomes = fetch_all(Arc::clone(&self.fetcher), snapshots, limits, cancel).await;
        if cancel.is_cancelled() {
            warn!("Sync cancelled, discarding fetched results");
            return Err(SyncError::Cancelled);
        }

        let mode = if options.fresh {
            CompareMode::Fresh
        } else {
            CompareMode::Diff
        };
        let authors = AuthorMatcher::new(&self.catalog);
        let mut result =
            SyncResult::new(options.dry_run, options.fresh, options.output_dir.clone());

        for (provider_id, outcome) in outcomes {
            let Some(provider) = self.catalog.provider(provider_id.as_str()) else {
                continue;
            };
            let existing = &provider.models;

            let fetched = match outcome {
                Ok(models) => models,
                Err(err) => {
                    let status = fetch_status(&err);
                    warn!(provider = %provider_id, error = %err, "Provider skipped");
                    result.provider_results.insert(
                        provider_id.clone(),
                        ProviderResult::without_data(provider_id, status, existing.len()),
                    );
                    continue;
                }
            };

            let api_models_count = fetched.len();
            let mut models = sanitize(&provider_id, fetched);

            let mut enhanced_count = 0;
            if let (Some(index), Some(source)) = (index.as_ref(), self.enrichment.as_ref()) {
                let lookup_id = provider.models_dev_id();
                let (enhanced, count) = source.enhance(models, lookup_id, index);
                models = enhanced;
                enhanced_count = count;
                if provider.icon_url.is_none() {
                    if let Some(logo) = index.logo_url(lookup_id) {
                        result.icon_updates.insert(provider_id.clone(), logo.to_string());
                    }
                }
            }

            authors.attribute(&provider_id, &mut models);

            if mode == CompareMode::Diff {
                for model in &mut models {
                    if let Some(baseline) = existing.get(&model.id) {
                        merge_baseline(model, baseline);
                    }
                }
            }

            let changeset = compare(&provider_id, existing, &models, mode);
            debug!(
                provider = %provider_id,
                added = changeset.added.len(),
                updated = changeset.updated.len(),
                removed = changeset.removed.len(),
                "Computed changeset"
            );
            result.provider_results.insert(
                provider_id,
                ProviderResult::synced(changeset, api_models_count, existing.len(), enhanced_count),
            );
        }

        if options.cleanup_enrichment {
            if let Some(source) = self.enrichment.as_ref() {
                if let Err(err) = source.cleanup().await {
                    warn!(error = %err, "Failed to clean up enrichment cache");
                }
            }
        }

        if options.dry_run {
            info!("Dry run complete, nothing written");
        } else if options.auto_approve {
            let approval = if options.fresh {
                Approval::ConfirmedDestructive
            } else {
                Approval::Confirmed
            };
            self.apply(&mut result, approval)?;
        }

        Ok(result)
    }

    /// Commits a preview produced by [`Syncer::sync`].
    ///
    /// Providers are applied one at a time; the first failure stops the run
    /// and is returned. Declining is simply not calling this.
    pub fn apply(&mut self, result: &mut SyncResult, approval: Approval) -> Result<(), SyncError> {
        if result.dry_run {
            return Err(SyncError::DryRun);
        }
        if result.fresh && approval != Approval::ConfirmedDestructive {
            return Err(SyncError::FreshNotConfirmed);
        }
        if result.applied {
            debug!("Sync result already applied");
            return Ok(());
        }
        if !result.has_changes() && result.icon_updates.is_empty() {
            result.applied = true;
            return Ok(());
        }

        let applier = Applier::new(&result.output_dir);
        let now = Utc::now();
        for provider_result in result.provider_results.values_mut() {
            let Some(changeset) = provider_result.changeset.as_mut() else {
                continue;
            };
            if changeset.is_empty() {
                continue;
            }
            stamp(changeset, now);
            applier.apply(&mut self.catalog, changeset, result.fresh)?;
        }

        for (provider_id, icon_url) in &result.icon_updates {
            if let Some(provider) = self.catalog.provider_mut(provider_id.as_str()) {
                provider.icon_url = Some(icon_url.clone());
            }
        }
        applier.save_catalog(&self.catalog)?;

        result.applied = true;
        info!(output = %result.output_dir.display(), "Sync applied");
        Ok(())
    }

    fn resolve_providers(&self, requested: Option<&str>) -> Result<Vec<ProviderId>, SyncError> {
        match requested {
            Some(id) => {
                let Some(provider) = self.catalog.provider(id) else {
                    return Err(SyncError::UnknownProvider {
                        id: id.to_string(),
                        suggestion: self.catalog.suggest_provider(id).cloned(),
                    });
                };
                if !self.fetcher.has_client(&provider.id) {
                    return Err(SyncError::Unsupported(provider.id.clone()));
                }
                Ok(vec![provider.id.clone()])
            }
            None => {
                let (supported, unsupported): (Vec<&ProviderId>, Vec<&ProviderId>) = self
                    .catalog
                    .providers()
                    .keys()
                    .partition(|id| self.fetcher.has_client(id));
                if !unsupported.is_empty() {
                    debug!(count = unsupported.len(), "Skipping providers without a client");
                }
                Ok(supported.into_iter().cloned().collect())
            }
        }
    }

    /// Sets up the enrichment index once per run. Failures only disable enrichment.
    async fn load_enrichment(&self) -> Option<EnrichmentIndex> {
        let source = self.enrichment.as_ref()?;
        let loaded: Result<EnrichmentIndex, EnrichmentError> = async {
            source.ensure_repository().await?;
            let path = source.build_index().await?;
            source.parse(&path).await
        }
        .await;
        match loaded {
            Ok(index) => Some(index),
            Err(err) => {
                warn!(error = %err, "Enrichment unavailable, continuing without it");
                None
            }
        }
    }
}

fn suggestion_hint(suggestion: &Option<ProviderId>) -> String {
    suggestion
        .as_ref()
        .map(|id| format!(" (did you mean {id}?)"))
        .unwrap_or_default()
}

fn fetch_status(err: &FetchError) -> ProviderStatus {
    if err.is_missing_credentials() {
        ProviderStatus::Skipped {
            reason: err.to_string(),
        }
    } else {
        ProviderStatus::Failed {
            error: err.to_string(),
        }
    }
}
