//! OpenAI-compatible `GET /models` listings.
//!
//! Most providers only return `id`, `created` and `owned_by`. OpenRouter-style
//! aggregators extend each entry with context, pricing and architecture, which
//! are mapped when present.

use chrono::DateTime;
use serde::Deserialize;

use super::{FetchError, ListRequest, send_json};
use crate::catalog::{Model, Modality, TokenCost};

pub(super) async fn list_models(request: &ListRequest<'_>) -> Result<Vec<Model>, FetchError> {
    let payload: ListResponse =
        send_json(request.provider_id(), request.get("authorization")).await?;
    Ok(payload.data.into_iter().map(Model::from).collect())
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: Vec<ModelPayload>,
}

#[derive(Debug, Deserialize)]
struct ModelPayload {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    context_length: Option<u64>,
    #[serde(default)]
    max_completion_tokens: Option<u64>,
    #[serde(default)]
    top_provider: Option<TopProvider>,
    #[serde(default)]
    pricing: Option<PricingPayload>,
    #[serde(default)]
    architecture: Option<ArchitecturePayload>,
    #[serde(default)]
    supported_parameters: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TopProvider {
    #[serde(default)]
    context_length: Option<u64>,
    #[serde(default)]
    max_completion_tokens: Option<u64>,
}

/// Prices are per token, usually as decimal strings.
#[derive(Debug, Deserialize, Default)]
struct PricingPayload {
    #[serde(default)]
    prompt: Option<PriceValue>,
    #[serde(default)]
    completion: Option<PriceValue>,
    #[serde(default)]
    internal_reasoning: Option<PriceValue>,
    #[serde(default)]
    input_cache_read: Option<PriceValue>,
    #[serde(default)]
    input_cache_write: Option<PriceValue>,
    #[serde(default)]
    request: Option<PriceValue>,
    #[serde(default)]
    image: Option<PriceValue>,
    #[serde(default)]
    web_search: Option<PriceValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceValue {
    Float(f64),
    String(String),
}

impl PriceValue {
    /// Negative sentinels (variable pricing) are treated as unknown.
    fn as_f64(&self) -> Option<f64> {
        let value = match self {
            PriceValue::Float(value) => Some(*value),
            PriceValue::String(value) => value.trim().parse::<f64>().ok(),
        };
        value.filter(|value| *value >= 0.0)
    }
}

#[derive(Debug, Deserialize)]
struct ArchitecturePayload {
    #[serde(default)]
    input_modalities: Vec<String>,
    #[serde(default)]
    output_modalities: Vec<String>,
    #[serde(default)]
    tokenizer: Option<String>,
}

fn token_cost(value: &Option<PriceValue>) -> Option<TokenCost> {
    value.as_ref().and_then(PriceValue::as_f64).map(TokenCost::per_token)
}

fn price(value: &Option<PriceValue>) -> Option<f64> {
    value.as_ref().and_then(PriceValue::as_f64)
}

fn modalities(raw: &[String]) -> Vec<Modality> {
    let mut parsed: Vec<Modality> = raw.iter().filter_map(|m| Modality::parse(m)).collect();
    parsed.sort();
    parsed.dedup();
    parsed
}

impl From<ModelPayload> for Model {
    fn from(payload: ModelPayload) -> Self {
        let ModelPayload {
            id,
            name,
            description,
            created,
            context_length,
            max_completion_tokens,
            top_provider,
            pricing,
            architecture,
            supported_parameters,
        } = payload;

        let mut model = Model::new(id);
        if let Some(name) = name.filter(|name| !name.trim().is_empty()) {
            model.name = name;
        }
        model.description = description.filter(|d| !d.trim().is_empty());

        let (top_context, top_output) = top_provider
            .map(|top| (top.context_length, top.max_completion_tokens))
            .unwrap_or_default();
        model.limits.context_window = context_length.or(top_context);
        model.limits.output_tokens = max_completion_tokens.or(top_output);

        if let Some(pricing) = pricing {
            model.pricing.tokens.input = token_cost(&pricing.prompt);
            model.pricing.tokens.output = token_cost(&pricing.completion);
            model.pricing.tokens.reasoning = token_cost(&pricing.internal_reasoning);
            model.pricing.tokens.cache_read = token_cost(&pricing.input_cache_read);
            model.pricing.tokens.cache_write = token_cost(&pricing.input_cache_write);
            model.pricing.operations.per_request = price(&pricing.request);
            model.pricing.operations.image_input = price(&pricing.image);
            model.pricing.operations.web_search = price(&pricing.web_search);
            if !model.pricing.tokens.is_empty() || !model.pricing.operations.is_empty() {
                model.pricing.currency = Some("USD".to_string());
            }
        }

        if let Some(architecture) = architecture {
            model.features.modalities.input = modalities(&architecture.input_modalities);
            model.features.modalities.output = modalities(&architecture.output_modalities);
            model.metadata.architecture.tokenizer = architecture.tokenizer;
        }

        if !supported_parameters.is_empty() {
            let has = |name: &str| supported_parameters.iter().any(|p| p == name);
            model.features.tool_calls = Some(has("tools"));
            model.features.tools = Some(has("tools"));
            model.features.tool_choice = Some(has("tool_choice"));
            model.features.structured_outputs =
                Some(has("structured_outputs") || has("response_format"));
            model.features.reasoning = Some(has("reasoning") || has("include_reasoning"));
            model.features.temperature = Some(has("temperature"));
        }

        model.metadata.release_date = created
            .filter(|ts| *ts > 0)
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive());

        model
    }
}
