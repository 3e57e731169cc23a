use std::fs;
use std::path::Path;
use std::sync::Arc;

use starmap_core::catalog::TokenCost;
use starmap_core::{
    Approval, Catalog, HttpProviderFetcher, ModelsDevPreferences, ModelsDevSource, ProviderStatus,
    SyncOptions, Syncer,
};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_catalog(dir: &Path, server: &MockServer) {
    let providers = format!(
        "\
- id: acme
  name: Acme AI
  api_key:
    name: ACME_API_KEY
  catalog:
    endpoint:
      type: openai
      url: {uri}/acme/v1/models
    models_dev_id: acme-ai
- id: down
  name: Down Inc
  catalog:
    endpoint:
      type: openai
      url: {uri}/down/v1/models
      auth_required: false
- id: manual
  name: Manual Only
",
        uri = server.uri()
    );
    fs::write(dir.join("providers.yaml"), providers).expect("write providers");
    fs::write(
        dir.join("authors.yaml"),
        "- id: acme-labs\n  name: Acme Labs\n  catalog:\n    patterns: [\"acme-*\"]\n",
    )
    .expect("write authors");

    fs::create_dir_all(dir.join("acme")).expect("acme dir");
    fs::write(
        dir.join("acme/acme-old.yaml"),
        "id: acme-old\nname: Acme Old\n",
    )
    .expect("write acme-old");
    fs::write(
        dir.join("acme/acme-1.yaml"),
        "id: acme-1\nname: Acme One\ndescription: Hand-written notes\n",
    )
    .expect("write acme-1");

    fs::create_dir_all(dir.join("down")).expect("down dir");
    fs::write(dir.join("down/keep.yaml"), "id: keep\nname: Keep Me\n").expect("write keep");
}

async fn mount_provider_mocks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/acme/v1/models"))
        .and(header("authorization", "Bearer acme-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "object": "list",
            "data": [
                {"id": "acme-1", "object": "model", "created": 1735689600, "owned_by": "acme",
                 "pricing": {"prompt": "0.000001", "completion": "0.000002"}},
                {"id": "acme-2", "object": "model", "created": 1738368000, "owned_by": "acme"}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/down/v1/models"))
        .respond_with(ResponseTemplate::new(500).set_body_string("maintenance"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/models-dev/api.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "acme-ai": {
                "id": "acme-ai",
                "name": "Acme AI",
                "models": {
                    "acme-1": {
                        "id": "acme-1",
                        "name": "Acme One (models.dev)",
                        "tool_call": true,
                        "cost": {"input": 7.0, "output": 21.0},
                        "limit": {"context": 128000, "output": 8192}
                    },
                    "acme-2": {
                        "id": "acme-2",
                        "name": "Acme Two",
                        "reasoning": true,
                        "cost": {"input": 0.5, "output": 1.5}
                    }
                }
            }
        })))
        .mount(server)
        .await;
}

fn syncer_for(dir: &Path, server: &MockServer) -> Syncer {
    let catalog = Catalog::load(dir).expect("load catalog");
    let client = reqwest::Client::new();
    let fetcher = HttpProviderFetcher::new(client.clone(), &catalog);
    let preferences = ModelsDevPreferences {
        api_url: format!("{}/models-dev/api.json", server.uri()),
        logo_base_url: "https://models.dev/logos".to_string(),
        cache_dir: Some(dir.join(".cache/models.dev").display().to_string()),
        ..ModelsDevPreferences::default()
    };
    let source = ModelsDevSource::new(client, &preferences);

    Syncer::new(catalog, Arc::new(fetcher))
        .with_enrichment(Arc::new(source))
        .with_env(|name| (name == "ACME_API_KEY").then(|| "acme-secret".to_string()))
}

#[tokio::test]
async fn end_to_end_sync_enriches_and_persists() {
    let server = MockServer::start().await;
    mount_provider_mocks(&server).await;
    let temp = tempdir().expect("tempdir");
    write_catalog(temp.path(), &server);

    let mut syncer = syncer_for(temp.path(), &server);
    let mut result = syncer
        .sync(&CancellationToken::new(), SyncOptions::new(temp.path()))
        .await
        .expect("sync preview");

    assert!(!result.applied);
    assert!(!temp.path().join("acme/acme-2.yaml").exists());

    let acme = &result.provider_results["acme"];
    assert_eq!(acme.status, ProviderStatus::Synced);
    assert_eq!(acme.api_models_count, 2);
    assert_eq!(acme.existing_models_count, 2);
    assert_eq!(acme.enhanced_count, 2);
    assert_eq!((acme.added_count, acme.updated_count, acme.removed_count), (1, 1, 1));

    let changeset = acme.changeset.as_ref().expect("acme changeset");
    let update = &changeset.updated[0];
    let live_input = update.new.pricing.tokens.input.and_then(|c| c.as_per_million());
    assert!((live_input.expect("input price") - 1.0).abs() < 1e-9);
    assert_eq!(update.new.pricing.tokens.output, Some(TokenCost::per_token(0.000_002)));
    assert_eq!(update.new.limits.context_window, Some(128_000));
    assert_eq!(update.new.name, "Acme One (models.dev)");
    assert_eq!(update.new.description.as_deref(), Some("Hand-written notes"));
    assert_eq!(update.new.authors[0].id.as_str(), "acme-labs");

    let down = &result.provider_results["down"];
    assert!(down.changeset.is_none());
    assert!(down.error().expect("down error").contains("500"));
    assert!(!result.provider_results.contains_key("manual"));

    let summary = result.summary();
    assert!(summary.contains("acme: 2 fetched, 2 existing, 2 enhanced, +1 ~1 -1"));
    assert!(summary.contains("down: error"));

    syncer
        .apply(&mut result, Approval::Confirmed)
        .expect("apply preview");

    assert!(temp.path().join("acme/acme-2.yaml").exists());
    assert!(!temp.path().join("acme/acme-old.yaml").exists());
    assert!(temp.path().join("down/keep.yaml").exists());

    let reloaded = Catalog::load(temp.path()).expect("reload");
    let acme = reloaded.provider("acme").expect("acme provider");
    assert_eq!(acme.icon_url.as_deref(), Some("https://models.dev/logos/acme-ai.svg"));
    assert_eq!(acme.models["acme-2"].features.reasoning, Some(true));
    assert!(reloaded.provider("down").expect("down").models.contains_key("keep"));
    assert!(reloaded.author("acme-labs").expect("author").models.contains_key("acme-2"));
}

#[tokio::test]
async fn second_sync_after_apply_is_a_no_op() {
    let server = MockServer::start().await;
    mount_provider_mocks(&server).await;
    let temp = tempdir().expect("tempdir");
    write_catalog(temp.path(), &server);

    let mut first = syncer_for(temp.path(), &server);
    let options = SyncOptions {
        auto_approve: true,
        ..SyncOptions::new(temp.path())
    };
    let applied = first
        .sync(&CancellationToken::new(), options.clone())
        .await
        .expect("first sync");
    assert!(applied.applied);

    let mut second = syncer_for(temp.path(), &server);
    let again = second
        .sync(&CancellationToken::new(), options)
        .await
        .expect("second sync");
    assert!(!again.has_changes(), "unexpected changes:\n{}", again.summary());
}

#[tokio::test]
async fn missing_credentials_are_skipped_not_failed() {
    let server = MockServer::start().await;
    mount_provider_mocks(&server).await;
    let temp = tempdir().expect("tempdir");
    write_catalog(temp.path(), &server);

    let mut syncer = syncer_for(temp.path(), &server).with_env(|_| None);
    let result = syncer
        .sync(
            &CancellationToken::new(),
            SyncOptions {
                provider: Some("acme".to_string()),
                dry_run: true,
                enrich: false,
                ..SyncOptions::new(temp.path())
            },
        )
        .await
        .expect("sync");

    let acme = &result.provider_results["acme"];
    assert!(matches!(acme.status, ProviderStatus::Skipped { .. }));
    assert_eq!(result.totals().skipped, 1);
    assert!(result.errors().is_empty());
}

#[tokio::test]
async fn unavailable_enrichment_is_soft_failure() {
    let server = MockServer::start().await;
    mount_provider_mocks(&server).await;
    let temp = tempdir().expect("tempdir");
    write_catalog(temp.path(), &server);

    let catalog = Catalog::load(temp.path()).expect("load catalog");
    let client = reqwest::Client::new();
    let preferences = ModelsDevPreferences {
        api_url: format!("{}/missing/api.json", server.uri()),
        cache_dir: Some(temp.path().join(".cache").display().to_string()),
        ..ModelsDevPreferences::default()
    };
    let fetcher = HttpProviderFetcher::new(client.clone(), &catalog);
    let mut syncer = Syncer::new(catalog.clone(), Arc::new(fetcher))
        .with_enrichment(Arc::new(ModelsDevSource::new(client, &preferences)))
        .with_env(|name| (name == "ACME_API_KEY").then(|| "acme-secret".to_string()));

    let result = syncer
        .sync(
            &CancellationToken::new(),
            SyncOptions {
                dry_run: true,
                ..SyncOptions::new(temp.path())
            },
        )
        .await
        .expect("sync without enrichment");

    assert_eq!(result.provider_results["acme"].enhanced_count, 0);
    assert_eq!(result.provider_results["acme"].added_count, 1);
    assert!(result.icon_updates.is_empty());
}
