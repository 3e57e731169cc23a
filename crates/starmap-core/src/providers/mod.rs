//! Live model listings from provider APIs.

mod anthropic;
mod google;
mod openai;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::catalog::{AuthScheme, Catalog, EndpointKind, Model, Provider, ProviderId};

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider {0} has no client implementation")]
    Unsupported(ProviderId),
    #[error("provider {provider} is missing credentials: set {env_var}")]
    MissingCredentials { provider: ProviderId, env_var: String },
    #[error("request to {provider} failed: {source}")]
    Http {
        provider: ProviderId,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} responded with {status}: {body}")]
    Status {
        provider: ProviderId,
        status: StatusCode,
        body: String,
    },
    #[error("failed to decode {provider} model list: {source}")]
    Decode {
        provider: ProviderId,
        #[source]
        source: serde_json::Error,
    },
    #[error("fetching {provider} timed out after {}s", after.as_secs())]
    Timeout { provider: ProviderId, after: Duration },
    #[error("fetching {0} was cancelled")]
    Cancelled(ProviderId),
    #[error("fetch task for {0} ended without a result")]
    Aborted(ProviderId),
}

impl FetchError {
    /// Missing credentials are a skip, not a failure of the provider's API.
    pub fn is_missing_credentials(&self) -> bool {
        matches!(self, FetchError::MissingCredentials { .. })
    }
}

/// Lists the models a provider currently serves.
#[async_trait]
pub trait ProviderFetcher: Send + Sync {
    fn has_client(&self, provider_id: &ProviderId) -> bool;

    async fn fetch_models(&self, provider: &Provider) -> Result<Vec<Model>, FetchError>;
}

/// Shared HTTP client with the crate's user agent.
pub fn http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder().user_agent(user_agent).build()
}

/// Fetcher backed by the provider's own listing endpoint.
#[derive(Debug, Clone)]
pub struct HttpProviderFetcher {
    client: Client,
    kinds: HashMap<ProviderId, EndpointKind>,
}

impl HttpProviderFetcher {
    pub fn new(client: Client, catalog: &Catalog) -> Self {
        Self::from_providers(client, catalog.providers().values())
    }

    pub fn from_providers<'a>(
        client: Client,
        providers: impl IntoIterator<Item = &'a Provider>,
    ) -> Self {
        let kinds = providers
            .into_iter()
            .filter_map(|provider| {
                provider
                    .catalog
                    .as_ref()
                    .map(|catalog| (provider.id.clone(), catalog.endpoint.kind))
            })
            .collect();
        Self { client, kinds }
    }
}

#[async_trait]
impl ProviderFetcher for HttpProviderFetcher {
    fn has_client(&self, provider_id: &ProviderId) -> bool {
        self.kinds.contains_key(provider_id)
    }

    async fn fetch_models(&self, provider: &Provider) -> Result<Vec<Model>, FetchError> {
        let (Some(kind), Some(catalog)) =
            (self.kinds.get(&provider.id), provider.catalog.as_ref())
        else {
            return Err(FetchError::Unsupported(provider.id.clone()));
        };
        let api_key = checked_api_key(provider)?;

        debug!(provider = %provider.id, url = %catalog.endpoint.url, "Listing models");
        let request = ListRequest {
            client: &self.client,
            provider,
            url: &catalog.endpoint.url,
            api_key,
        };
        let models = match kind {
            EndpointKind::Openai => openai::list_models(&request).await?,
            EndpointKind::Anthropic => anthropic::list_models(&request).await?,
            EndpointKind::Google => google::list_models(&request).await?,
        };
        debug!(provider = %provider.id, count = models.len(), "Listed models");
        Ok(models)
    }
}

/// Everything an adapter needs to issue its listing call.
pub(crate) struct ListRequest<'a> {
    client: &'a Client,
    provider: &'a Provider,
    url: &'a str,
    api_key: Option<&'a str>,
}

impl ListRequest<'_> {
    fn provider_id(&self) -> &ProviderId {
        &self.provider.id
    }

    /// GET request with the provider's auth scheme applied.
    fn get(&self, default_header: &str) -> RequestBuilder {
        let builder = self.client.get(self.url);
        let Some(key) = self.api_key else {
            return builder;
        };
        let descriptor = self.provider.api_key.as_ref();
        match descriptor.map(|d| d.scheme).unwrap_or_default() {
            AuthScheme::Bearer => builder.bearer_auth(key),
            AuthScheme::Header => {
                let header = descriptor
                    .and_then(|d| d.header.as_deref())
                    .unwrap_or(default_header);
                builder.header(header, key)
            }
            AuthScheme::Query => builder.query(&[("key", key)]),
        }
    }
}

fn checked_api_key(provider: &Provider) -> Result<Option<&str>, FetchError> {
    let key = provider.credentials.api_key.as_deref();
    if !provider.requires_auth() {
        return Ok(key);
    }

    if let Some(env_var) = &provider.credentials.missing {
        return Err(FetchError::MissingCredentials {
            provider: provider.id.clone(),
            env_var: env_var.clone(),
        });
    }
    match (provider.api_key.as_ref(), key) {
        (Some(descriptor), None) => Err(FetchError::MissingCredentials {
            provider: provider.id.clone(),
            env_var: descriptor.name.clone(),
        }),
        _ => Ok(key),
    }
}

async fn send_json<T: DeserializeOwned>(
    provider: &ProviderId,
    request: RequestBuilder,
) -> Result<T, FetchError> {
    let response = request.send().await.map_err(|source| FetchError::Http {
        provider: provider.clone(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(FetchError::Status {
            provider: provider.clone(),
            status,
            body,
        });
    }

    let bytes = response.bytes().await.map_err(|source| FetchError::Http {
        provider: provider.clone(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| FetchError::Decode {
        provider: provider.clone(),
        source,
    })
}
