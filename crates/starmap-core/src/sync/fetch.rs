//! Bounded, cancellable fan-out of provider fetches.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::catalog::{Model, Provider, ProviderId};
use crate::providers::{FetchError, ProviderFetcher};

pub(crate) type FetchOutcome = Result<Vec<Model>, FetchError>;

#[derive(Debug, Clone, Copy)]
pub(crate) struct FetchLimits {
    pub concurrency: usize,
    pub timeout: Duration,
}

/// Fetches every provider with at most `limits.concurrency` requests in flight.
///
/// Each fetch gets its own timeout. Once `cancel` fires no new fetch is
/// started and in-flight ones resolve to [`FetchError::Cancelled`]. The
/// returned map has one entry per input provider.
pub(crate) async fn fetch_all(
    fetcher: Arc<dyn ProviderFetcher>,
    providers: Vec<Provider>,
    limits: FetchLimits,
    cancel: &CancellationToken,
) -> BTreeMap<ProviderId, FetchOutcome> {
    let semaphore = Arc::new(Semaphore::new(limits.concurrency.max(1)));
    let (tx, mut rx) = mpsc::channel::<(ProviderId, FetchOutcome)>(providers.len().max(1));
    let mut outcomes = BTreeMap::new();
    let mut launched = Vec::with_capacity(providers.len());

    for provider in providers {
        let provider_id = provider.id.clone();
        if cancel.is_cancelled() {
            outcomes.insert(provider_id.clone(), Err(FetchError::Cancelled(provider_id)));
            continue;
        }

        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => permit,
            _ = cancel.cancelled() => {
                outcomes.insert(provider_id.clone(), Err(FetchError::Cancelled(provider_id)));
                continue;
            }
        };
        let Ok(permit) = permit else {
            outcomes.insert(provider_id.clone(), Err(FetchError::Aborted(provider_id)));
            continue;
        };

        let fetcher = Arc::clone(&fetcher);
        let tx = tx.clone();
        let cancel = cancel.clone();
        let per_fetch = limits.timeout;
        launched.push(provider_id.clone());
        tokio::spawn(async move {
            let _permit = permit;
            debug!(provider = %provider.id, "Fetching models");
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(FetchError::Cancelled(provider.id.clone())),
                result = timeout(per_fetch, fetcher.fetch_models(&provider)) => match result {
                    Ok(outcome) => outcome,
                    Err(_) => Err(FetchError::Timeout {
                        provider: provider.id.clone(),
                        after: per_fetch,
                    }),
                },
            };
            let _ = tx.send((provider.id.clone(), outcome)).await;
        });
    }
    drop(tx);

    while let Some((provider_id, outcome)) = rx.recv().await {
        outcomes.insert(provider_id, outcome);
    }

    for provider_id in launched {
        if !outcomes.contains_key(&provider_id) {
            warn!(provider = %provider_id, "Fetch task ended without reporting");
            outcomes.insert(provider_id.clone(), Err(FetchError::Aborted(provider_id)));
        }
    }
    outcomes
}
