//! Normalized, queryable snapshot of the enrichment dataset.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{Modality, Model, TokenCost};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnrichmentIndex {
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub providers: BTreeMap<String, IndexProvider>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexProvider {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub models: BTreeMap<String, IndexEntry>,
}

/// Supplementary facts for one model. Every field is optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_weights: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_modalities: Vec<Modality>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_modalities: Vec<Modality>,
    #[serde(default)]
    pub cost: IndexCost,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

/// Prices in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexCost {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write: Option<f64>,
}

impl IndexCost {
    fn is_empty(&self) -> bool {
        self.input.is_none()
            && self.output.is_none()
            && self.reasoning.is_none()
            && self.cache_read.is_none()
            && self.cache_write.is_none()
    }
}

impl EnrichmentIndex {
    pub fn provider(&self, provider_id: &str) -> Option<&IndexProvider> {
        self.providers.get(provider_id)
    }

    pub fn logo_url(&self, provider_id: &str) -> Option<&str> {
        self.provider(provider_id)?.logo_url.as_deref()
    }

    /// Exact model ID first, then a case-insensitive match.
    pub fn lookup(&self, provider_id: &str, model_id: &str) -> Option<&IndexEntry> {
        let provider = self.provider(provider_id)?;
        provider.models.get(model_id).or_else(|| {
            provider
                .models
                .iter()
                .find(|(id, _)| id.eq_ignore_ascii_case(model_id))
                .map(|(_, entry)| entry)
        })
    }

    /// Fills unset fields of `models` from matching entries.
    ///
    /// Returns the models and how many of them gained at least one field.
    pub fn enhance(&self, models: Vec<Model>, provider_id: &str) -> (Vec<Model>, usize) {
        let mut enhanced = 0;
        let models = models
            .into_iter()
            .map(|mut model| {
                if let Some(entry) = self.lookup(provider_id, model.id.as_str()) {
                    if fill_from_entry(&mut model, entry) {
                        enhanced += 1;
                    }
                }
                model
            })
            .collect();
        (models, enhanced)
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) -> bool {
    if slot.is_none() && value.is_some() {
        *slot = value.clone();
        true
    } else {
        false
    }
}

fn fill_cost(slot: &mut Option<TokenCost>, per_1m: Option<f64>) -> bool {
    fill(slot, &per_1m.map(TokenCost::per_million))
}

fn fill_vec<T: Clone>(slot: &mut Vec<T>, value: &[T]) -> bool {
    if slot.is_empty() && !value.is_empty() {
        *slot = value.to_vec();
        true
    } else {
        false
    }
}

/// Never touches a field that already holds a value.
fn fill_from_entry(model: &mut Model, entry: &IndexEntry) -> bool {
    let mut changed = false;

    if model.name.trim().is_empty() || model.name == model.id.as_str() {
        if let Some(name) = entry.name.as_ref().filter(|name| !name.trim().is_empty()) {
            model.name = name.clone();
            changed = true;
        }
    }

    changed |= fill(&mut model.limits.context_window, &entry.context_window);
    changed |= fill(&mut model.limits.output_tokens, &entry.output_tokens);

    if !entry.cost.is_empty() {
        let tokens = &mut model.pricing.tokens;
        let mut priced = false;
        priced |= fill_cost(&mut tokens.input, entry.cost.input);
        priced |= fill_cost(&mut tokens.output, entry.cost.output);
        priced |= fill_cost(&mut tokens.reasoning, entry.cost.reasoning);
        priced |= fill_cost(&mut tokens.cache_read, entry.cost.cache_read);
        priced |= fill_cost(&mut tokens.cache_write, entry.cost.cache_write);
        if priced && model.pricing.currency.is_none() {
            model.pricing.currency = Some("USD".to_string());
        }
        changed |= priced;
    }

    let features = &mut model.features;
    changed |= fill_vec(&mut features.modalities.input, &entry.input_modalities);
    changed |= fill_vec(&mut features.modalities.output, &entry.output_modalities);
    changed |= fill(&mut features.attachments, &entry.attachment);
    changed |= fill(&mut features.reasoning, &entry.reasoning);
    changed |= fill(&mut features.tool_calls, &entry.tool_call);
    changed |= fill(&mut features.structured_outputs, &entry.structured_output);
    changed |= fill(&mut features.temperature, &entry.temperature);

    let metadata = &mut model.metadata;
    changed |= fill(&mut metadata.release_date, &entry.release_date);
    changed |= fill(&mut metadata.knowledge_cutoff, &entry.knowledge);
    changed |= fill(&mut metadata.open_weights, &entry.open_weights);
    changed |= fill(&mut metadata.architecture.family, &entry.family);

    changed
}
