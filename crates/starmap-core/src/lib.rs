//! Core library for the starmap AI model catalog: data model, provider
//! fetchers, models.dev enrichment and the sync engine.

pub mod catalog;
pub mod config;
pub mod enrichment;
pub mod logging;
pub mod providers;
pub mod sync;

pub use catalog::{Catalog, CatalogError, Model, ModelFiles, ModelId, Provider, ProviderId};
pub use config::{
    ConfigError, ConfigLoadResult, ConfigSource, FileConfig, ModelsDevPreferences, SyncPreferences,
    config_directory, config_path, load_config, load_config_from, save_config,
};
pub use enrichment::{EnrichmentError, EnrichmentIndex, EnrichmentSource, ModelsDevSource};
pub use logging::{LoggingDestination, LoggingError, Verbosity, init_logging};
pub use providers::{FetchError, HttpProviderFetcher, ProviderFetcher, http_client};
pub use sync::{
    Approval, ProviderChangeset, ProviderResult, ProviderStatus, SyncError, SyncOptions,
    SyncResult, Syncer,
};
