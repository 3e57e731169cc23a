//! Per-provider preparation of fetched models before they are compared.

use std::collections::BTreeSet;

use glob::{MatchOptions, Pattern};
use tracing::warn;

use crate::catalog::{Author, Catalog, Model, ModelId, ProviderId};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Drops models with empty IDs and repeated IDs, keeping the first occurrence.
pub(crate) fn sanitize(provider_id: &ProviderId, models: Vec<Model>) -> Vec<Model> {
    let mut seen: BTreeSet<ModelId> = BTreeSet::new();
    let mut kept = Vec::with_capacity(models.len());
    for model in models {
        if model.id.is_empty() {
            warn!(provider = %provider_id, "Dropping fetched model with an empty id");
            continue;
        }
        if !seen.insert(model.id.clone()) {
            warn!(provider = %provider_id, model = %model.id, "Dropping duplicate fetched model");
            continue;
        }
        kept.push(model);
    }
    kept
}

/// Author glob patterns compiled once per run.
pub(crate) struct AuthorMatcher {
    rules: Vec<(Author, Option<ProviderId>, Vec<Pattern>)>,
}

impl AuthorMatcher {
    pub(crate) fn new(catalog: &Catalog) -> Self {
        let rules = catalog
            .authors()
            .values()
            .filter_map(|author| {
                let catalog_ref = author.catalog.as_ref()?;
                let patterns: Vec<Pattern> = catalog_ref
                    .patterns
                    .iter()
                    .filter_map(|raw| match Pattern::new(raw) {
                        Ok(pattern) => Some(pattern),
                        Err(err) => {
                            warn!(
                                author = %author.id,
                                pattern = %raw,
                                error = %err,
                                "Ignoring invalid author pattern"
                            );
                            None
                        }
                    })
                    .collect();
                (!patterns.is_empty()).then(|| {
                    (author.reference(), catalog_ref.provider_id.clone(), patterns)
                })
            })
            .collect();
        Self { rules }
    }

    /// Credits matching authors on models served by `provider_id`.
    pub(crate) fn attribute(&self, provider_id: &ProviderId, models: &mut [Model]) {
        for (author, scope, patterns) in &self.rules {
            if scope.as_ref().is_some_and(|scope| scope != provider_id) {
                continue;
            }
            for model in models.iter_mut() {
                let already = model.authors.iter().any(|credited| credited.id == author.id);
                if !already
                    && patterns
                        .iter()
                        .any(|pattern| pattern.matches_with(model.id.as_str(), MATCH_OPTIONS))
                {
                    model.authors.push(author.clone());
                }
            }
        }
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, baseline: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(baseline);
    }
}

/// Fills fields still unset on `model` from the catalog's stored copy.
///
/// Live and enrichment values always win; the baseline only covers gaps.
pub(crate) fn merge_baseline(model: &mut Model, baseline: &Model) {
    let placeholder_name =
        model.name == model.id.as_str() && baseline.name != baseline.id.as_str();
    if model.name.trim().is_empty() || placeholder_name {
        model.name.clone_from(&baseline.name);
    }
    fill(&mut model.description, &baseline.description);
    if model.authors.is_empty() {
        model.authors.clone_from(&baseline.authors);
    }

    fill(&mut model.limits.context_window, &baseline.limits.context_window);
    fill(&mut model.limits.output_tokens, &baseline.limits.output_tokens);

    let pricing = &mut model.pricing;
    fill(&mut pricing.currency, &baseline.pricing.currency);
    let tokens = &mut pricing.tokens;
    let base_tokens = &baseline.pricing.tokens;
    fill(&mut tokens.input, &base_tokens.input);
    fill(&mut tokens.output, &base_tokens.output);
    fill(&mut tokens.reasoning, &base_tokens.reasoning);
    fill(&mut tokens.cache_read, &base_tokens.cache_read);
    fill(&mut tokens.cache_write, &base_tokens.cache_write);
    let operations = &mut pricing.operations;
    let base_ops = &baseline.pricing.operations;
    fill(&mut operations.per_request, &base_ops.per_request);
    fill(&mut operations.image_input, &base_ops.image_input);
    fill(&mut operations.image_gen, &base_ops.image_gen);
    fill(&mut operations.audio_input_per_minute, &base_ops.audio_input_per_minute);
    fill(&mut operations.audio_output_per_minute, &base_ops.audio_output_per_minute);
    fill(&mut operations.web_search, &base_ops.web_search);

    let features = &mut model.features;
    let base = &baseline.features;
    if features.modalities.input.is_empty() {
        features.modalities.input.clone_from(&base.modalities.input);
    }
    if features.modalities.output.is_empty() {
        features.modalities.output.clone_from(&base.modalities.output);
    }
    fill(&mut features.tool_calls, &base.tool_calls);
    fill(&mut features.tools, &base.tools);
    fill(&mut features.tool_choice, &base.tool_choice);
    fill(&mut features.web_search, &base.web_search);
    fill(&mut features.attachments, &base.attachments);
    fill(&mut features.reasoning, &base.reasoning);
    fill(&mut features.structured_outputs, &base.structured_outputs);
    fill(&mut features.streaming, &base.streaming);
    fill(&mut features.temperature, &base.temperature);

    let metadata = &mut model.metadata;
    let base = &baseline.metadata;
    fill(&mut metadata.release_date, &base.release_date);
    fill(&mut metadata.knowledge_cutoff, &base.knowledge_cutoff);
    fill(&mut metadata.open_weights, &base.open_weights);
    fill(&mut metadata.architecture.parameter_count, &base.architecture.parameter_count);
    fill(&mut metadata.architecture.family, &base.architecture.family);
    fill(&mut metadata.architecture.tokenizer, &base.architecture.tokenizer);
    if metadata.tags.is_empty() {
        metadata.tags.clone_from(&base.tags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AuthorCatalog, AuthorId, Provider, TokenCost};

    fn author(id: &str, provider: Option<&str>, patterns: &[&str]) -> Author {
        Author {
            id: AuthorId::from(id),
            name: id.to_string(),
            catalog: Some(AuthorCatalog {
                provider_id: provider.map(ProviderId::from),
                patterns: patterns.iter().map(|p| p.to_string()).collect(),
            }),
            ..Author::default()
        }
    }

    #[test]
    fn sanitize_drops_empty_and_duplicate_ids() {
        let acme = ProviderId::from("acme");
        let mut second = Model::new("a");
        second.name = "second".to_string();
        let models = sanitize(
            &acme,
            vec![Model::new("a"), Model::new(""), second, Model::new("b")],
        );
        let ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(models[0].name, "a");
    }

    #[test]
    fn attribution_respects_provider_scope() {
        let provider = Provider {
            id: ProviderId::from("groq"),
            name: "Groq".to_string(),
            ..Provider::default()
        };
        let catalog = Catalog::new(
            [provider],
            [
                author("meta", None, &["llama-*", "meta-llama/*"]),
                author("openai", Some("openai"), &["gpt-*"]),
            ],
        );
        let matcher = AuthorMatcher::new(&catalog);

        let mut models = vec![Model::new("Llama-3.3-70B-Versatile"), Model::new("gpt-oss-20b")];
        matcher.attribute(&ProviderId::from("groq"), &mut models);
        assert_eq!(models[0].authors.len(), 1);
        assert_eq!(models[0].authors[0].id.as_str(), "meta");
        assert!(models[0].authors[0].catalog.is_none());
        assert!(models[1].authors.is_empty());

        matcher.attribute(&ProviderId::from("groq"), &mut models);
        assert_eq!(models[0].authors.len(), 1);
    }

    #[test]
    fn baseline_only_fills_gaps() {
        let mut baseline = Model::new("a");
        baseline.name = "Model A".to_string();
        baseline.description = Some("stored".to_string());
        baseline.pricing.tokens.input = Some(TokenCost::per_million(3.0));
        baseline.pricing.tokens.output = Some(TokenCost::per_million(6.0));
        baseline.features.reasoning = Some(true);

        let mut live = Model::new("a");
        live.pricing.tokens.input = Some(TokenCost::per_million(1.0));
        live.features.reasoning = Some(false);

        merge_baseline(&mut live, &baseline);
        assert_eq!(live.name, "Model A");
        assert_eq!(live.description.as_deref(), Some("stored"));
        assert_eq!(live.pricing.tokens.input, Some(TokenCost::per_million(1.0)));
        assert_eq!(live.pricing.tokens.output, Some(TokenCost::per_million(6.0)));
        assert_eq!(live.features.reasoning, Some(false));
    }
}
