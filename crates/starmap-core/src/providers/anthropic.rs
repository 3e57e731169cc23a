use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{FetchError, ListRequest, send_json};
use crate::catalog::Model;

pub(super) const API_VERSION: &str = "2023-06-01";
const PAGE_LIMIT: &str = "1000";

/// Walks every page of `GET /v1/models`.
pub(super) async fn list_models(request: &ListRequest<'_>) -> Result<Vec<Model>, FetchError> {
    let mut models = Vec::new();
    let mut after_id: Option<String> = None;

    loop {
        let mut builder = request
            .get("x-api-key")
            .header("anthropic-version", API_VERSION)
            .query(&[("limit", PAGE_LIMIT)]);
        if let Some(after) = after_id.as_deref() {
            builder = builder.query(&[("after_id", after)]);
        }

        let page: ListResponse = send_json(request.provider_id(), builder).await?;
        models.extend(page.data.into_iter().map(Model::from));

        match (page.has_more, page.last_id) {
            (true, Some(last)) if after_id.as_deref() != Some(last.as_str()) => {
                after_id = Some(last)
            }
            _ => break,
        }
    }

    Ok(models)
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: Vec<ModelPayload>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelPayload {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<ModelPayload> for Model {
    fn from(payload: ModelPayload) -> Self {
        let mut model = Model::new(payload.id);
        if let Some(name) = payload.display_name.filter(|name| !name.trim().is_empty()) {
            model.name = name;
        }
        model.metadata.release_date = payload.created_at.map(|at| at.date_naive());
        model
    }
}
