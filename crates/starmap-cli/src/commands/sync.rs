use std::fmt::Write as _;
use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use dialoguer::Confirm;
use starmap_core::sync::ModelUpdate;
use starmap_core::{
    Approval, Catalog, FileConfig, HttpProviderFetcher, Model, ModelsDevSource, SyncResult,
    Syncer, http_client,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli_args::SyncArgs;

pub async fn run(args: &SyncArgs, config: &FileConfig, cancel: CancellationToken) -> Result<()> {
    let options = args.to_options(config);
    let catalog = Catalog::load(&options.output_dir)
        .with_context(|| format!("failed to load catalog from {}", options.output_dir.display()))?;

    let client = http_client(&config.sync.user_agent).context("failed to build HTTP client")?;
    let fetcher = HttpProviderFetcher::new(client.clone(), &catalog);
    let mut syncer = Syncer::new(catalog, Arc::new(fetcher));
    if options.enrich {
        syncer = syncer.with_enrichment(Arc::new(ModelsDevSource::new(client, &config.models_dev)));
    }

    let mut result = syncer.sync(&cancel, options).await?;

    print!("{}", render_preview(&result));
    if args.show_diff {
        print_update_diffs(&result);
    }
    println!("{}", result.summary());

    if result.dry_run {
        return Ok(());
    }
    if result.applied {
        println!("Applied changes to {}", result.output_dir.display());
        return Ok(());
    }
    if !result.has_changes() {
        println!("Catalog is up to date.");
        return Ok(());
    }

    let fresh = result.fresh;
    let approval = tokio::task::spawn_blocking(move || confirm(fresh))
        .await
        .context("confirmation prompt panicked")??;
    let Some(approval) = approval else {
        info!("Sync declined by user");
        println!("No changes written.");
        return Ok(());
    };

    syncer.apply(&mut result, approval)?;
    println!("Applied changes to {}", result.output_dir.display());
    Ok(())
}

/// Asks for approval; fresh runs need a second, explicit destructive confirmation.
fn confirm(fresh: bool) -> Result<Option<Approval>> {
    let apply = Confirm::new()
        .with_prompt("Apply these changes?")
        .default(false)
        .interact()
        .context("failed to read confirmation (use --auto-approve in non-interactive shells)")?;
    if !apply {
        return Ok(None);
    }
    if !fresh {
        return Ok(Some(Approval::Confirmed));
    }

    let destructive = Confirm::new()
        .with_prompt(
            "Fresh sync deletes every existing model file of the listed providers. Continue?",
        )
        .default(false)
        .interact()
        .context("failed to read confirmation")?;
    Ok(destructive.then_some(Approval::ConfirmedDestructive))
}

/// Per-model listing of a preview, grouped by provider.
pub fn render_preview(result: &SyncResult) -> String {
    let mut out = String::new();
    for changeset in result.changesets().filter(|changeset| !changeset.is_empty()) {
        let _ = writeln!(out, "{}:", changeset.provider_id);
        for model in &changeset.added {
            let _ = writeln!(out, "  + {}{}", model.id, display_name(model));
        }
        for update in &changeset.updated {
            let _ = writeln!(out, "  ~ {} ({})", update.id(), update.changed_fields.join(", "));
        }
        for model in &changeset.removed {
            let _ = writeln!(out, "  - {}{}", model.id, display_name(model));
        }
    }
    for (provider_id, icon_url) in &result.icon_updates {
        let _ = writeln!(out, "{provider_id}: icon {icon_url}");
    }
    out
}

fn display_name(model: &Model) -> String {
    if model.name.is_empty() || model.name == model.id.as_str() {
        String::new()
    } else {
        format!(" ({})", model.name)
    }
}

fn print_update_diffs(result: &SyncResult) {
    let theme = termdiff::SignsColorTheme {};
    let mut stdout = std::io::stdout();
    for changeset in result.changesets() {
        for update in &changeset.updated {
            let (old, new) = match update_yaml(update) {
                Ok(pair) => pair,
                Err(err) => {
                    eprintln!("Warning: could not render diff for {}: {err}", update.id());
                    continue;
                }
            };
            println!("--- {}/{}", changeset.provider_id, update.id());
            if let Err(err) = termdiff::diff(&mut stdout, &old, &new, &theme) {
                eprintln!("Warning: error generating diff: {err}");
            }
        }
    }
    let _ = stdout.flush();
}

/// Both sides of an update as YAML, without bookkeeping timestamps.
pub fn update_yaml(update: &ModelUpdate) -> Result<(String, String), serde_yaml::Error> {
    let strip = |model: &Model| {
        let mut model = model.clone();
        model.created_at = None;
        model.updated_at = None;
        model
    };
    Ok((
        serde_yaml::to_string(&strip(&update.old))?,
        serde_yaml::to_string(&strip(&update.new))?,
    ))
}
