use std::path::Path;

use anyhow::{Context, Result, bail};
use starmap_core::{FileConfig, save_config};

use crate::cli_args::InitConfigArgs;

pub fn init(args: &InitConfigArgs, target: &Path) -> Result<()> {
    if target.exists() && !args.force {
        bail!("{} already exists (pass --force to replace it)", target.display());
    }
    save_config(&FileConfig::default(), target)
        .with_context(|| format!("failed to write {}", target.display()))?;
    println!("Wrote default configuration to {}", target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use starmap_core::load_config_from;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn writes_defaults_once() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("starmap/config.toml");

        init(&InitConfigArgs::default(), &target).unwrap();
        let loaded = load_config_from(&target);
        assert!(loaded.warnings.is_empty());
        assert_eq!(loaded.config, FileConfig::default());

        fs::write(&target, "[sync]\nconcurrency = 2\n").unwrap();
        let err = init(&InitConfigArgs::default(), &target).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert!(fs::read_to_string(&target).unwrap().contains("concurrency = 2"));

        init(&InitConfigArgs { force: true }, &target).unwrap();
        assert_eq!(load_config_from(&target).config, FileConfig::default());
    }
}
