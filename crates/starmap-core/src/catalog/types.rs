//! Catalog entities: providers, authors and the models they serve or created.
//!
//! These types are the on-disk YAML schema as well as the in-memory model the
//! sync pipeline works on. Optional fields stay `None` when a source did not
//! report them, which is what lets enrichment tell "unknown" apart from
//! "explicitly false/zero".

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a provider (e.g. `openai`, `groq`).
    ProviderId
);
string_id!(
    /// Globally unique model identifier. May contain `/`-separated segments.
    ModelId
);
string_id!(
    /// Identifier of a model author (e.g. `meta`, `mistral`).
    AuthorId
);

/// An organization exposing an API that serves models.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headquarters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ProviderApiKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_vars: Vec<ProviderEnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<ProviderCatalog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_completions: Option<ChatCompletions>,

    /// Models currently attributed to this provider. Persisted as one file per
    /// model, never inline in `providers.yaml`.
    #[serde(skip)]
    pub models: BTreeMap<ModelId, Model>,

    /// Files each model was read from at load time. Usually one canonical
    /// path, but hand-placed files may use any name or repeat an ID.
    #[serde(skip)]
    pub model_files: BTreeMap<ModelId, Vec<PathBuf>>,

    /// Credentials resolved from the environment for the current run.
    #[serde(skip)]
    pub credentials: ResolvedCredentials,
}

/// Describes how a provider expects its API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderApiKey {
    /// Environment variable holding the key.
    pub name: String,
    /// Optional glob describing the key format (e.g. `sk-*`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default)]
    pub scheme: AuthScheme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    #[default]
    Bearer,
    Header,
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEnvVar {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Where and how to list a provider's models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCatalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_url: Option<String>,
    pub endpoint: CatalogEndpoint,
    /// Provider ID used by models.dev when it differs from ours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_dev_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEndpoint {
    #[serde(rename = "type")]
    pub kind: EndpointKind,
    pub url: String,
    #[serde(default = "default_auth_required")]
    pub auth_required: bool,
}

const fn default_auth_required() -> bool {
    true
}

/// Wire dialect spoken by a provider's model-listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    #[serde(alias = "openai_compatible")]
    Openai,
    Anthropic,
    Google,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletions {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_api_url: Option<String>,
}

/// Credential material looked up from the environment before a sync.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ResolvedCredentials {
    pub api_key: Option<String>,
    pub env: BTreeMap<String, String>,
    /// First required variable that was not set, if any.
    pub missing: Option<String>,
}

impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("missing", &self.missing)
            .finish()
    }
}

impl Provider {
    /// Looks up the API key and required environment variables through `lookup`.
    pub fn resolve_credentials<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut resolved = ResolvedCredentials::default();

        if let Some(api_key) = &self.api_key {
            match lookup(&api_key.name).filter(|value| !value.trim().is_empty()) {
                Some(value) => resolved.api_key = Some(value),
                None => resolved.missing = Some(api_key.name.clone()),
            }
        }

        for var in &self.env_vars {
            match lookup(&var.name).filter(|value| !value.trim().is_empty()) {
                Some(value) => {
                    resolved.env.insert(var.name.clone(), value);
                }
                None if var.required && resolved.missing.is_none() => {
                    resolved.missing = Some(var.name.clone());
                }
                None => {}
            }
        }

        self.credentials = resolved;
    }

    /// Whether listing models needs credentials at all.
    pub fn requires_auth(&self) -> bool {
        self.catalog
            .as_ref()
            .map(|catalog| catalog.endpoint.auth_required)
            .unwrap_or(false)
    }

    /// Provider ID to use when looking this provider up in models.dev.
    pub fn models_dev_id(&self) -> &str {
        self.catalog
            .as_ref()
            .and_then(|catalog| catalog.models_dev_id.as_deref())
            .unwrap_or(self.id.as_str())
    }
}

/// The organization credited with creating a model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hugging_face: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<AuthorCatalog>,

    /// Models attributed to this author, rebuilt after every load.
    #[serde(skip)]
    pub models: BTreeMap<ModelId, Model>,
}

/// Cross-reference telling which provider's listing identifies an author's models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCatalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<ProviderId>,
    /// Glob patterns matched against model IDs.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Author {
    /// Copy suitable for embedding inside a [`Model`]: identity and links, no models.
    pub fn reference(&self) -> Author {
        Author {
            models: BTreeMap::new(),
            catalog: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(default, skip_serializing_if = "Limits::is_empty")]
    pub limits: Limits,
    #[serde(default, skip_serializing_if = "Pricing::is_empty")]
    pub pricing: Pricing,
    #[serde(default, skip_serializing_if = "Features::is_empty")]
    pub features: Features,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn new(id: impl Into<ModelId>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            ..Self::default()
        }
    }

    /// Equality over content-bearing fields only; bookkeeping timestamps are ignored.
    pub fn content_eq(&self, other: &Model) -> bool {
        self.changed_fields(other).is_empty()
    }

    /// Names of content fields that differ between `self` and `other`.
    pub fn changed_fields(&self, other: &Model) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.id != other.id {
            changed.push("id");
        }
        if self.name != other.name {
            changed.push("name");
        }
        if self.description != other.description {
            changed.push("description");
        }
        let ours: Vec<&AuthorId> = self.authors.iter().map(|a| &a.id).collect();
        let theirs: Vec<&AuthorId> = other.authors.iter().map(|a| &a.id).collect();
        if ours != theirs {
            changed.push("authors");
        }
        if self.limits != other.limits {
            changed.push("limits");
        }
        if self.pricing != other.pricing {
            changed.push("pricing");
        }
        if self.features != other.features {
            changed.push("features");
        }
        if self.metadata != other.metadata {
            changed.push("metadata");
        }
        changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

impl Limits {
    pub fn is_empty(&self) -> bool {
        self.context_window.is_none() && self.output_tokens.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "TokenPricing::is_empty")]
    pub tokens: TokenPricing,
    #[serde(default, skip_serializing_if = "OperationPricing::is_empty")]
    pub operations: OperationPricing,
}

impl Pricing {
    pub fn is_empty(&self) -> bool {
        self.currency.is_none() && self.tokens.is_empty() && self.operations.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenPricing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<TokenCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<TokenCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<TokenCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read: Option<TokenCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write: Option<TokenCost>,
}

impl TokenPricing {
    pub fn is_empty(&self) -> bool {
        self.input.is_none()
            && self.output.is_none()
            && self.reasoning.is_none()
            && self.cache_read.is_none()
            && self.cache_write.is_none()
    }
}

/// Token price, expressed per million tokens, per token, or both.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenCost {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_1m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_token: Option<f64>,
}

impl TokenCost {
    pub fn per_million(per_1m: f64) -> Self {
        Self {
            per_1m: Some(per_1m),
            per_token: None,
        }
    }

    pub fn per_token(per_token: f64) -> Self {
        Self {
            per_1m: None,
            per_token: Some(per_token),
        }
    }

    /// Normalized price per million tokens.
    pub fn as_per_million(&self) -> Option<f64> {
        self.per_1m
            .or_else(|| self.per_token.map(|value| value * 1_000_000.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationPricing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_request: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_input: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_gen: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_input_per_minute: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_output_per_minute: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_search: Option<f64>,
}

impl OperationPricing {
    pub fn is_empty(&self) -> bool {
        self.per_request.is_none()
            && self.image_input.is_none()
            && self.image_gen.is_none()
            && self.audio_input_per_minute.is_none()
            && self.audio_output_per_minute.is_none()
            && self.web_search.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
    Video,
    Pdf,
    Embedding,
}

impl Modality {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Modality::Text),
            "image" | "images" | "vision" => Some(Modality::Image),
            "audio" => Some(Modality::Audio),
            "video" => Some(Modality::Video),
            "pdf" | "file" => Some(Modality::Pdf),
            "embedding" | "embeddings" => Some(Modality::Embedding),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modalities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<Modality>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<Modality>,
}

impl Modalities {
    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }
}

/// Capability flags. `None` means the source did not say.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Features {
    #[serde(default, skip_serializing_if = "Modalities::is_empty")]
    pub modalities: Modalities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_search: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_outputs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<bool>,
}

impl Features {
    pub fn is_empty(&self) -> bool {
        *self == Features::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<NaiveDate>,
    /// Knowledge cutoff as published (`YYYY-MM` or `YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_cutoff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_weights: Option<bool>,
    #[serde(default, skip_serializing_if = "Architecture::is_empty")]
    pub architecture: Architecture,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        *self == Metadata::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Architecture {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_count: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<String>,
}

impl Architecture {
    pub fn is_empty(&self) -> bool {
        *self == Architecture::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_honor_width_in_tables() {
        assert_eq!(format!("{:<6}|", ProviderId::from("acme")), "acme  |");
        assert_eq!(format!("{:>4}", ModelId::from("a")), "   a");
    }

    #[test]
    fn content_eq_ignores_timestamps() {
        let mut a = Model::new("gpt-4o");
        a.limits.context_window = Some(128_000);
        let mut b = a.clone();
        b.updated_at = Some(Utc::now());
        b.created_at = Some(Utc::now());
        assert!(a.content_eq(&b));

        b.limits.context_window = Some(64_000);
        assert_eq!(a.changed_fields(&b), vec!["limits"]);
    }

    #[test]
    fn token_cost_normalizes_per_token_prices() {
        let cost = TokenCost::per_token(0.000_002);
        let per_million = cost.as_per_million().unwrap();
        assert!((per_million - 2.0).abs() < 1e-9);
    }

    #[test]
    fn model_yaml_omits_empty_sections() {
        let model = Model::new("llama-3.1-8b-instant");
        let yaml = serde_yaml::to_string(&model).unwrap();
        assert!(yaml.contains("id: llama-3.1-8b-instant"));
        assert!(!yaml.contains("pricing"));
        assert!(!yaml.contains("limits"));
    }

    #[test]
    fn resolve_credentials_reports_missing_key() {
        let mut provider = Provider {
            id: ProviderId::from("groq"),
            name: "Groq".to_string(),
            api_key: Some(ProviderApiKey {
                name: "GROQ_API_KEY".to_string(),
                pattern: None,
                header: None,
                scheme: AuthScheme::Bearer,
            }),
            ..Provider::default()
        };

        provider.resolve_credentials(|_| None);
        assert_eq!(provider.credentials.missing.as_deref(), Some("GROQ_API_KEY"));

        provider.resolve_credentials(|name| (name == "GROQ_API_KEY").then(|| "gsk-1".to_string()));
        assert_eq!(provider.credentials.api_key.as_deref(), Some("gsk-1"));
        assert!(provider.credentials.missing.is_none());
    }
}
