use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::catalog::ProviderId;

use super::changeset::ProviderChangeset;

/// What happened to one provider during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderStatus {
    Synced,
    /// Not attempted in a meaningful way, e.g. credentials are missing.
    Skipped { reason: String },
    /// The fetch failed; the provider took no part in comparison.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResult {
    pub provider_id: ProviderId,
    pub status: ProviderStatus,
    pub api_models_count: usize,
    pub existing_models_count: usize,
    pub enhanced_count: usize,
    pub added_count: usize,
    pub updated_count: usize,
    pub removed_count: usize,
    pub changeset: Option<ProviderChangeset>,
}

impl ProviderResult {
    pub(crate) fn synced(
        changeset: ProviderChangeset,
        api_models_count: usize,
        existing_models_count: usize,
        enhanced_count: usize,
    ) -> Self {
        Self {
            provider_id: changeset.provider_id.clone(),
            status: ProviderStatus::Synced,
            api_models_count,
            existing_models_count,
            enhanced_count,
            added_count: changeset.added.len(),
            updated_count: changeset.updated.len(),
            removed_count: changeset.removed.len(),
            changeset: Some(changeset),
        }
    }

    pub(crate) fn without_data(
        provider_id: ProviderId,
        status: ProviderStatus,
        existing_models_count: usize,
    ) -> Self {
        Self {
            provider_id,
            status,
            api_models_count: 0,
            existing_models_count,
            enhanced_count: 0,
            added_count: 0,
            updated_count: 0,
            removed_count: 0,
            changeset: None,
        }
    }

    pub fn has_changes(&self) -> bool {
        self.added_count + self.updated_count + self.removed_count > 0
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            ProviderStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Sums across every provider in a [`SyncResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncTotals {
    pub providers: usize,
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
    pub api_models: usize,
    pub enhanced: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Outcome of one sync invocation. Keyed by provider so arrival order is irrelevant.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResult {
    pub dry_run: bool,
    pub fresh: bool,
    /// Whether the changes have been written to `output_dir`.
    pub applied: bool,
    pub output_dir: PathBuf,
    pub provider_results: BTreeMap<ProviderId, ProviderResult>,
    /// Provider logo URLs discovered during enrichment, persisted on apply.
    pub icon_updates: BTreeMap<ProviderId, String>,
}

impl SyncResult {
    pub(crate) fn new(dry_run: bool, fresh: bool, output_dir: PathBuf) -> Self {
        Self {
            dry_run,
            fresh,
            applied: false,
            output_dir,
            provider_results: BTreeMap::new(),
            icon_updates: BTreeMap::new(),
        }
    }

    pub fn has_changes(&self) -> bool {
        self.provider_results.values().any(ProviderResult::has_changes)
    }

    pub fn changesets(&self) -> impl Iterator<Item = &ProviderChangeset> {
        self.provider_results
            .values()
            .filter_map(|result| result.changeset.as_ref())
            .filter(|changeset| !changeset.is_empty())
    }

    /// Providers whose fetch failed, with the error text.
    pub fn errors(&self) -> Vec<(&ProviderId, &str)> {
        self.provider_results
            .iter()
            .filter_map(|(id, result)| result.error().map(|error| (id, error)))
            .collect()
    }

    pub fn totals(&self) -> SyncTotals {
        let mut totals = SyncTotals::default();
        for result in self.provider_results.values() {
            totals.providers += 1;
            match result.status {
                ProviderStatus::Synced => totals.synced += 1,
                ProviderStatus::Skipped { .. } => totals.skipped += 1,
                ProviderStatus::Failed { .. } => totals.failed += 1,
            }
            totals.api_models += result.api_models_count;
            totals.enhanced += result.enhanced_count;
            totals.added += result.added_count;
            totals.updated += result.updated_count;
            totals.removed += result.removed_count;
        }
        totals
    }

    /// Human-readable report. Dry-run and fresh runs are always labelled.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        if self.dry_run {
            let _ = writeln!(out, "DRY RUN: no files were written");
        }
        if self.fresh {
            let _ = writeln!(
                out,
                "FRESH SYNC: existing model files are deleted and rewritten for changed providers"
            );
        }

        let totals = self.totals();
        let _ = writeln!(
            out,
            "Providers: {} synced, {} skipped, {} failed",
            totals.synced, totals.skipped, totals.failed
        );

        for (id, result) in &self.provider_results {
            match &result.status {
                ProviderStatus::Synced => {
                    let _ = writeln!(
                        out,
                        "  {id}: {} fetched, {} existing, {} enhanced, +{} ~{} -{}",
                        result.api_models_count,
                        result.existing_models_count,
                        result.enhanced_count,
                        result.added_count,
                        result.updated_count,
                        result.removed_count
                    );
                }
                ProviderStatus::Skipped { reason } => {
                    let _ = writeln!(out, "  {id}: skipped ({reason})");
                }
                ProviderStatus::Failed { error } => {
                    let _ = writeln!(out, "  {id}: error ({error})");
                }
            }
        }

        let _ = write!(
            out,
            "Total: {} added, {} updated, {} removed",
            totals.added, totals.updated, totals.removed
        );
        if totals.failed > 0 {
            let _ = write!(out, ", {} errors", totals.failed);
        }
        if !self.has_changes() {
            let _ = write!(out, "\nNo changes.");
        } else if self.applied {
            let _ = write!(out, "\nApplied to {}", self.output_dir.display());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Model;

    fn result_with(dry_run: bool, fresh: bool) -> SyncResult {
        let mut result = SyncResult::new(dry_run, fresh, PathBuf::from("/out"));
        let mut changeset = ProviderChangeset::empty(ProviderId::from("acme"));
        changeset.added.push(Model::new("c"));
        result
            .provider_results
            .insert(ProviderId::from("acme"), ProviderResult::synced(changeset, 2, 2, 1));
        result.provider_results.insert(
            ProviderId::from("broken"),
            ProviderResult::without_data(
                ProviderId::from("broken"),
                ProviderStatus::Failed {
                    error: "connection refused".to_string(),
                },
                4,
            ),
        );
        result
    }

    #[test]
    fn totals_and_errors_aggregate_per_provider() {
        let result = result_with(false, false);
        let totals = result.totals();
        assert_eq!(totals.synced, 1);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.added, 1);
        assert!(result.has_changes());
        assert_eq!(result.errors(), vec![(&ProviderId::from("broken"), "connection refused")]);
    }

    #[test]
    fn summary_labels_modes() {
        let summary = result_with(true, true).summary();
        assert!(summary.starts_with("DRY RUN"));
        assert!(summary.contains("FRESH SYNC"));
        assert!(summary.contains("acme: 2 fetched, 2 existing, 1 enhanced, +1 ~0 -0"));
        assert!(summary.contains("broken: error (connection refused)"));
        assert!(summary.contains("1 errors"));

        let plain = result_with(false, false).summary();
        assert!(!plain.contains("DRY RUN"));
        assert!(!plain.contains("FRESH"));
    }
}
