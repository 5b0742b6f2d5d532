use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::PairsArgs;
use crate::dataset::discover_pairs;
use crate::model::{PairEntry, PairInventoryManifest};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

pub const PAIR_INVENTORY_FILENAME: &str = "pair_inventory.json";

pub fn run(args: PairsArgs) -> Result<()> {
    let manifest = build_manifest(&args.pairs_dir, &args.extension)?;

    if args.dry_run {
        info!(
            pair_count = manifest.pair_count,
            categories = manifest.categories.len(),
            source = %manifest.source_directory,
            "pair inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args.manifest_path.unwrap_or_else(|| {
        args.cache_root
            .join("manifests")
            .join(PAIR_INVENTORY_FILENAME)
    });

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote pair inventory manifest");
    info!(
        pair_count = manifest.pair_count,
        categories = manifest.categories.len(),
        "pair inventory completed"
    );

    Ok(())
}

pub fn build_manifest(pairs_dir: &Path, extension: &str) -> Result<PairInventoryManifest> {
    let pairs = discover_pairs(pairs_dir, extension)?;

    let mut entries = Vec::with_capacity(pairs.len());
    for pair in &pairs {
        entries.push(PairEntry {
            category: pair.category.clone(),
            name: pair.name.clone(),
            before_file: file_name(&pair.before)?,
            after_file: file_name(&pair.after)?,
            before_sha256: sha256_file(&pair.before)?,
            after_sha256: sha256_file(&pair.after)?,
        });
    }

    let categories = entries
        .iter()
        .map(|entry| entry.category.clone())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect::<Vec<String>>();

    Ok(PairInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: pairs_dir.display().to_string(),
        extension: extension.trim_start_matches('.').to_string(),
        pair_count: entries.len(),
        categories,
        pairs: entries,
    })
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))
}
