use serde::Deserialize;

use super::{FetchError, ListRequest, send_json};
use crate::catalog::{Modality, Model};

const PAGE_SIZE: &str = "1000";
const RESOURCE_PREFIX: &str = "models/";

/// Walks every page of the Gemini `models` list.
pub(super) async fn list_models(request: &ListRequest<'_>) -> Result<Vec<Model>, FetchError> {
    let mut models = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut builder = request
            .get("x-goog-api-key")
            .query(&[("pageSize", PAGE_SIZE)]);
        if let Some(token) = page_token.as_deref() {
            builder = builder.query(&[("pageToken", token)]);
        }

        let page: ListResponse = send_json(request.provider_id(), builder).await?;
        models.extend(page.models.into_iter().map(Model::from));

        match page.next_page_token.filter(|token| !token.is_empty()) {
            Some(token) if page_token.as_deref() != Some(token.as_str()) => {
                page_token = Some(token)
            }
            _ => break,
        }
    }

    Ok(models)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    models: Vec<ModelPayload>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelPayload {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_token_limit: Option<u64>,
    #[serde(default)]
    output_token_limit: Option<u64>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    thinking: Option<bool>,
}

impl From<ModelPayload> for Model {
    fn from(payload: ModelPayload) -> Self {
        let id = payload
            .name
            .strip_prefix(RESOURCE_PREFIX)
            .unwrap_or(&payload.name)
            .to_string();
        let mut model = Model::new(id);
        if let Some(name) = payload.display_name.filter(|name| !name.trim().is_empty()) {
            model.name = name;
        }
        model.description = payload.description.filter(|d| !d.trim().is_empty());
        model.limits.context_window = payload.input_token_limit;
        model.limits.output_tokens = payload.output_token_limit;

        let methods = &payload.supported_generation_methods;
        if methods.iter().any(|m| m == "embedContent") {
            model.features.modalities.input = vec![Modality::Text];
            model.features.modalities.output = vec![Modality::Embedding];
        }
        if methods.iter().any(|m| m == "generateContent") {
            model.features.streaming = Some(methods.iter().any(|m| m == "streamGenerateContent"));
        }
        if payload.temperature.is_some() {
            model.features.temperature = Some(true);
        }
        model.features.reasoning = payload.thinking;
        model
    }
}
