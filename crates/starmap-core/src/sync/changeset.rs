use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{Model, ModelId, ProviderId};

/// How fetched models are compared with what is already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareMode {
    #[default]
    Diff,
    /// Ignore existing state: every fetched model is an addition.
    Fresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelUpdate {
    pub old: Model,
    pub new: Model,
    pub changed_fields: Vec<&'static str>,
}

impl ModelUpdate {
    pub fn id(&self) -> &ModelId {
        &self.new.id
    }
}

/// Additions, updates and removals for one provider. An ID appears in at most one list.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderChangeset {
    pub provider_id: ProviderId,
    pub added: Vec<Model>,
    pub updated: Vec<ModelUpdate>,
    pub removed: Vec<Model>,
}

impl ProviderChangeset {
    pub fn empty(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}

/// Diffs `fetched` against `existing`.
///
/// Unchanged models are omitted. Output lists are sorted by model ID. When
/// `fetched` repeats an ID the first occurrence wins.
pub fn compare(
    provider_id: &ProviderId,
    existing: &BTreeMap<ModelId, Model>,
    fetched: &[Model],
    mode: CompareMode,
) -> ProviderChangeset {
    let mut changeset = ProviderChangeset::empty(provider_id.clone());
    let mut seen: BTreeSet<&ModelId> = BTreeSet::new();

    for model in fetched {
        if !seen.insert(&model.id) {
            continue;
        }
        match (mode, existing.get(&model.id)) {
            (CompareMode::Fresh, _) | (CompareMode::Diff, None) => {
                changeset.added.push(model.clone())
            }
            (CompareMode::Diff, Some(old)) => {
                let changed_fields = old.changed_fields(model);
                if !changed_fields.is_empty() {
                    changeset.updated.push(ModelUpdate {
                        old: old.clone(),
                        new: model.clone(),
                        changed_fields,
                    });
                }
            }
        }
    }

    if mode == CompareMode::Diff {
        changeset.removed = existing
            .iter()
            .filter(|(id, _)| !seen.contains(id))
            .map(|(_, model)| model.clone())
            .collect();
    }

    changeset.added.sort_by(|a, b| a.id.cmp(&b.id));
    changeset.updated.sort_by(|a, b| a.new.id.cmp(&b.new.id));
    changeset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TokenCost;

    fn model(id: &str, input_price: f64) -> Model {
        let mut model = Model::new(id);
        model.pricing.tokens.input = Some(TokenCost::per_million(input_price));
        model
    }

    fn existing(models: &[Model]) -> BTreeMap<ModelId, Model> {
        models.iter().map(|m| (m.id.clone(), m.clone())).collect()
    }

    fn ids(models: &[Model]) -> Vec<&str> {
        models.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn classifies_added_updated_removed() {
        let acme = ProviderId::from("acme");
        let current = existing(&[model("a", 1.0), model("b", 1.0)]);
        let fetched = vec![model("a", 2.0), model("c", 1.0)];

        let changeset = compare(&acme, &current, &fetched, CompareMode::Diff);
        assert_eq!(ids(&changeset.added), vec!["c"]);
        assert_eq!(changeset.updated.len(), 1);
        assert_eq!(changeset.updated[0].id().as_str(), "a");
        assert_eq!(changeset.updated[0].old, model("a", 1.0));
        assert_eq!(changeset.updated[0].new, model("a", 2.0));
        assert_eq!(changeset.updated[0].changed_fields, vec!["pricing"]);
        assert_eq!(ids(&changeset.removed), vec!["b"]);
    }

    #[test]
    fn categories_partition_the_union() {
        let acme = ProviderId::from("acme");
        let current = existing(&[model("keep", 1.0), model("change", 1.0), model("gone", 1.0)]);
        let fetched = vec![model("keep", 1.0), model("change", 5.0), model("new", 1.0)];

        let changeset = compare(&acme, &current, &fetched, CompareMode::Diff);
        let mut classified: Vec<&str> = ids(&changeset.added);
        classified.extend(changeset.updated.iter().map(|u| u.id().as_str()));
        classified.extend(ids(&changeset.removed));
        classified.sort();
        assert_eq!(classified, vec!["change", "gone", "new"]);
        assert_eq!(changeset.len(), 3);
    }

    #[test]
    fn identical_sets_yield_empty_changeset() {
        let acme = ProviderId::from("acme");
        let models = vec![model("a", 1.0), model("b", 2.0)];
        let changeset = compare(&acme, &existing(&models), &models, CompareMode::Diff);
        assert!(changeset.is_empty());
    }

    #[test]
    fn timestamp_only_differences_are_unchanged() {
        let acme = ProviderId::from("acme");
        let mut stored = model("a", 1.0);
        stored.created_at = Some(chrono::Utc::now());
        stored.updated_at = stored.created_at;

        let changeset = compare(&acme, &existing(&[stored]), &[model("a", 1.0)], CompareMode::Diff);
        assert!(changeset.is_empty());
    }

    #[test]
    fn fresh_mode_adds_everything_and_removes_nothing() {
        let acme = ProviderId::from("acme");
        let current = existing(&[model("a", 1.0), model("b", 1.0)]);
        let fetched = vec![model("c", 1.0), model("a", 1.0)];

        let changeset = compare(&acme, &current, &fetched, CompareMode::Fresh);
        assert_eq!(ids(&changeset.added), vec!["a", "c"]);
        assert!(changeset.updated.is_empty());
        assert!(changeset.removed.is_empty());
    }

    #[test]
    fn duplicate_fetched_ids_keep_first() {
        let acme = ProviderId::from("acme");
        let fetched = vec![model("a", 1.0), model("a", 9.0)];
        let changeset = compare(&acme, &BTreeMap::new(), &fetched, CompareMode::Diff);
        assert_eq!(changeset.added, vec![model("a", 1.0)]);
    }
}
