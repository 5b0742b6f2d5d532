use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::pairs::PAIR_INVENTORY_FILENAME;
use crate::model::PairInventoryManifest;
use crate::store::{
    DEFAULT_DB_FILENAME, count_generations_by_variant, count_runs, latest_run, open_store,
};

pub fn run(args: StatusArgs) -> Result<()> {
    let inventory_path = args
        .cache_root
        .join("manifests")
        .join(PAIR_INVENTORY_FILENAME);
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join(DEFAULT_DB_FILENAME));

    info!(cache_root = %args.cache_root.display(), "status requested");

    if inventory_path.exists() {
        let raw = fs::read(&inventory_path)
            .with_context(|| format!("failed to read {}", inventory_path.display()))?;
        let inventory: PairInventoryManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", inventory_path.display()))?;

        info!(
            generated_at = %inventory.generated_at,
            source = %inventory.source_directory,
            pair_count = inventory.pair_count,
            categories = %inventory.categories.join(","),
            "loaded pair inventory manifest"
        );
    } else {
        warn!(path = %inventory_path.display(), "pair inventory manifest missing");
    }

    if !db_path.exists() {
        warn!(path = %db_path.display(), "generation store missing");
        return Ok(());
    }

    let connection = open_store(&db_path)?;
    let runs = count_runs(&connection).unwrap_or(0);
    info!(path = %db_path.display(), runs, "generation store status");

    match latest_run(&connection)? {
        Some(run) => {
            info!(
                run_id = %run.run_id,
                model_id = %run.model_id,
                revision = %run.revision,
                adapter_path = %run.adapter_path.clone().unwrap_or_default(),
                source = %run.source,
                started_at = %run.started_at,
                finished_at = %run.finished_at.clone().unwrap_or_default(),
                "latest generation run"
            );
            for (variant, generations) in count_generations_by_variant(&connection, &run.run_id)? {
                info!(run_id = %run.run_id, variant = %variant, generations, "variant generations");
            }
            if run.finished_at.is_none() {
                warn!(run_id = %run.run_id, "latest run did not finish");
            }
        }
        None => warn!(path = %db_path.display(), "generation store has no runs"),
    }

    Ok(())
}
