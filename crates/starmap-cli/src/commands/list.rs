use std::fmt::Write as _;

use anyhow::{Context, Result, bail};
use starmap_core::{
    Catalog, FileConfig, HttpProviderFetcher, Model, Provider, ProviderFetcher, http_client,
};

use crate::cli_args::ListCommand;

pub fn run(command: &ListCommand, config: &FileConfig) -> Result<()> {
    let args = command.args();
    let dir = args.catalog_dir(config);
    let catalog = Catalog::load(&dir)
        .with_context(|| format!("failed to load catalog from {}", dir.display()))?;
    let filter = args.provider.as_deref().map(str::trim).filter(|id| !id.is_empty());
    if let Some(id) = filter {
        if catalog.provider(id).is_none() {
            match catalog.suggest_provider(id) {
                Some(suggestion) => bail!("unknown provider {id} (did you mean {suggestion}?)"),
                None => bail!("unknown provider {id}"),
            }
        }
    }

    let rendered = match command {
        ListCommand::Providers(_) => {
            let client =
                http_client(&config.sync.user_agent).context("failed to build HTTP client")?;
            let fetcher = HttpProviderFetcher::new(client, &catalog);
            render_providers(&catalog, filter, &fetcher, |name| std::env::var(name).ok())
        }
        ListCommand::Models(_) => render_models(&catalog, filter),
        ListCommand::Authors(_) => render_authors(&catalog, filter),
    };
    print!("{rendered}");
    Ok(())
}

fn selected<'a>(
    catalog: &'a Catalog,
    filter: Option<&'a str>,
) -> impl Iterator<Item = &'a Provider> {
    catalog
        .providers()
        .values()
        .filter(move |provider| filter.is_none_or(|id| provider.id.as_str() == id))
}

pub fn render_providers<F>(
    catalog: &Catalog,
    filter: Option<&str>,
    fetcher: &dyn ProviderFetcher,
    lookup: F,
) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = format!(
        "{:<20}  {:<24}  {:<6}  {:>6}  CREDENTIALS\n",
        "ID", "NAME", "CLIENT", "MODELS"
    );
    for provider in selected(catalog, filter) {
        let client = if fetcher.has_client(&provider.id) { "yes" } else { "no" };
        let _ = writeln!(
            out,
            "{:<20}  {:<24}  {:<6}  {:>6}  {}",
            provider.id,
            provider.name,
            client,
            provider.models.len(),
            credential_status(provider, &lookup)
        );
    }

    let endpoints: Vec<_> = catalog
        .endpoints()
        .into_iter()
        .filter(|endpoint| filter.is_none_or(|id| endpoint.provider_id.as_str() == id))
        .collect();
    if !endpoints.is_empty() {
        let _ = writeln!(out, "\n{:<20}  CHAT COMPLETIONS", "ID");
        for endpoint in endpoints {
            let _ = write!(out, "{:<20}  {}", endpoint.provider_id, endpoint.url);
            if let Some(health) = &endpoint.health_api_url {
                let _ = write!(out, "  (health: {health})");
            }
            out.push('\n');
        }
    }
    out
}

fn credential_status<F>(provider: &Provider, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if provider.api_key.is_none() && provider.env_vars.is_empty() {
        return "not needed".to_string();
    }
    let mut resolved = provider.clone();
    resolved.resolve_credentials(lookup);
    match resolved.credentials.missing {
        Some(var) if provider.requires_auth() || provider.catalog.is_none() => {
            format!("missing {var}")
        }
        Some(var) => format!("optional ({var} unset)"),
        None => "set".to_string(),
    }
}

pub fn render_models(catalog: &Catalog, filter: Option<&str>) -> String {
    let mut out = format!(
        "{:<20}  {:<40}  {:>9}  {:>9}  {:>9}\n",
        "PROVIDER", "MODEL", "CONTEXT", "IN/1M", "OUT/1M"
    );
    let models = catalog
        .models()
        .filter(|(provider_id, _)| filter.is_none_or(|id| provider_id.as_str() == id));
    for (provider_id, model) in models {
        let _ = writeln!(
            out,
            "{:<20}  {:<40}  {:>9}  {:>9}  {:>9}",
            provider_id,
            model.id,
            model
                .limits
                .context_window
                .map(|tokens| tokens.to_string())
                .unwrap_or_else(|| "-".to_string()),
            price(model, |model| model.pricing.tokens.input),
            price(model, |model| model.pricing.tokens.output),
        );
    }
    out
}

fn price<F>(model: &Model, pick: F) -> String
where
    F: Fn(&Model) -> Option<starmap_core::catalog::TokenCost>,
{
    pick(model)
        .and_then(|cost| cost.as_per_million())
        .map(|value| format!("{value:.2}"))
        .unwrap_or_else(|| "-".to_string())
}

/// With a provider filter only models served by that provider are counted.
pub fn render_authors(catalog: &Catalog, filter: Option<&str>) -> String {
    let mut out = format!("{:<20}  {:<28}  {:>6}\n", "ID", "NAME", "MODELS");
    for author in catalog.authors().values() {
        let count = match filter {
            Some(id) => catalog
                .provider(id)
                .map(|provider| {
                    provider
                        .models
                        .values()
                        .filter(|model| {
                            model.authors.iter().any(|credited| credited.id == author.id)
                        })
                        .count()
                })
                .unwrap_or(0),
            None => author.models.len(),
        };
        if filter.is_some() && count == 0 {
            continue;
        }
        let _ = writeln!(out, "{:<20}  {:<28}  {:>6}", author.id, author.name, count);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use starmap_core::catalog::{
        AuthScheme, CatalogEndpoint, ChatCompletions, EndpointKind, ProviderApiKey,
        ProviderCatalog, TokenCost,
    };
    use starmap_core::{ModelId, ProviderId};

    fn catalog() -> Catalog {
        let mut model = Model::new("acme-1");
        model.limits.context_window = Some(128_000);
        model.pricing.tokens.input = Some(TokenCost::per_token(0.000_003));

        let mut acme = Provider {
            id: ProviderId::from("acme"),
            name: "Acme".to_string(),
            api_key: Some(ProviderApiKey {
                name: "ACME_API_KEY".to_string(),
                pattern: None,
                header: None,
                scheme: AuthScheme::Bearer,
            }),
            catalog: Some(ProviderCatalog {
                docs_url: None,
                endpoint: CatalogEndpoint {
                    kind: EndpointKind::Openai,
                    url: "https://api.acme.test/v1/models".to_string(),
                    auth_required: true,
                },
                models_dev_id: None,
            }),
            chat_completions: Some(ChatCompletions {
                url: "https://api.acme.test/v1/chat/completions".to_string(),
                health_api_url: Some("https://status.acme.test/api".to_string()),
            }),
            ..Provider::default()
        };
        acme.models.insert(ModelId::from("acme-1"), model);
        let manual = Provider {
            id: ProviderId::from("manual"),
            name: "Manual".to_string(),
            ..Provider::default()
        };
        Catalog::new([acme, manual], [])
    }

    #[test]
    fn providers_show_client_and_credentials() {
        let catalog = catalog();
        let client = http_client("starmap-test").unwrap();
        let fetcher = HttpProviderFetcher::new(client, &catalog);

        let missing = render_providers(&catalog, None, &fetcher, |_| None);
        let acme = missing.lines().find(|line| line.starts_with("acme")).unwrap();
        assert!(acme.contains("yes"));
        assert!(acme.ends_with("missing ACME_API_KEY"));
        let manual = missing.lines().find(|line| line.starts_with("manual")).unwrap();
        assert!(manual.contains("no"));
        assert!(manual.ends_with("not needed"));

        let set = render_providers(&catalog, Some("acme"), &fetcher, |_| Some("sk-1".to_string()));
        assert!(set.lines().nth(1).unwrap().ends_with("set"));
        assert!(set.lines().all(|line| !line.starts_with("manual")));
    }

    #[test]
    fn providers_list_chat_endpoints() {
        let catalog = catalog();
        let fetcher = HttpProviderFetcher::new(http_client("starmap-test").unwrap(), &catalog);

        let rendered = render_providers(&catalog, None, &fetcher, |_| None);
        let section: Vec<&str> = rendered
            .lines()
            .skip_while(|line| !line.ends_with("CHAT COMPLETIONS"))
            .skip(1)
            .collect();
        assert_eq!(
            section,
            vec![
                "acme                  https://api.acme.test/v1/chat/completions  \
                 (health: https://status.acme.test/api)"
            ]
        );

        let manual_only = render_providers(&catalog, Some("manual"), &fetcher, |_| None);
        assert!(!manual_only.contains("CHAT COMPLETIONS"));
    }

    #[test]
    fn models_show_normalized_prices() {
        let rendered = render_models(&catalog(), Some("acme"));
        let row = rendered.lines().nth(1).unwrap();
        assert!(row.contains("acme-1"));
        assert!(row.contains("128000"));
        assert!(row.contains("3.00"));
        assert!(row.trim_end().ends_with('-'));
    }
}
