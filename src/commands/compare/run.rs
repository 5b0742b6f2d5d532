use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{build_comparison, write_json_report, write_text_report};
use crate::cli::CompareArgs;
use crate::metrics::AVERAGED_METRICS;
use crate::results_log;

pub fn run(args: CompareArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.results_log)
        .with_context(|| format!("failed to read {}", args.results_log.display()))?;
    let log = results_log::parse(&raw)
        .with_context(|| format!("failed to parse {}", args.results_log.display()))?;

    info!(
        path = %args.results_log.display(),
        base_categories = log.base.categories.len(),
        finetuned_categories = log.finetuned.categories.len(),
        "loaded results log"
    );

    let comparison = build_comparison(&log, &args.sort_metric, AVERAGED_METRICS);
    if comparison.ranking.is_empty() {
        warn!(metric = %args.sort_metric, "no finetuned category reports the sort metric");
    }

    if args.json {
        write_json_report(&comparison)
    } else {
        write_text_report(&comparison)
    }
}
