use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::ScoreArgs;
use crate::inference::Variant;
use crate::metrics::{MetricSuite, Sample};
use crate::model::{CategoryScore, ScoreReport};
use crate::results_log::{self, CategoryMetrics, MetricsSection, ResultsLog};
use crate::store::{DEFAULT_DB_FILENAME, GenerationRow, latest_run, load_generations, open_store};
use crate::util::{now_utc_string, write_json_pretty, write_text};

pub fn run(args: ScoreArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join(DEFAULT_DB_FILENAME));
    if !db_path.exists() {
        bail!("generation store not found at {}", db_path.display());
    }

    let connection = open_store(&db_path)?;
    let run_id = match args.run_id.clone() {
        Some(run_id) => run_id,
        None => latest_run(&connection)?
            .map(|run| run.run_id)
            .with_context(|| format!("no generation runs in {}", db_path.display()))?,
    };

    let rows = load_generations(&connection, &run_id)?;
    if rows.is_empty() {
        bail!("no generations stored for run {run_id}");
    }
    info!(run_id = %run_id, generations = rows.len(), "scoring generations");

    let suite = MetricSuite::new()?;
    let (log, scores) = score_generations(&suite, &rows);
    for (variant, section) in [("base", &log.base), ("finetuned", &log.finetuned)] {
        if section.categories.is_empty() {
            warn!(run_id = %run_id, variant, "no generations for variant, section left empty");
        }
    }

    write_text(&args.results_log, &results_log::render(&log))?;
    info!(path = %args.results_log.display(), "wrote results log");

    if let Some(report_path) = &args.report_path {
        let report = ScoreReport {
            manifest_version: 1,
            generated_at: now_utc_string(),
            run_id: run_id.clone(),
            results_log: args.results_log.display().to_string(),
            scores,
        };
        write_json_pretty(report_path, &report)?;
        info!(path = %report_path.display(), "wrote score report");
    }

    Ok(())
}

pub fn score_generations(
    suite: &MetricSuite,
    rows: &[GenerationRow],
) -> (ResultsLog, Vec<CategoryScore>) {
    let mut groups = BTreeMap::<(&str, &str), Vec<Sample<'_>>>::new();
    for row in rows {
        groups
            .entry((row.variant.as_str(), row.category.as_str()))
            .or_default()
            .push(Sample {
                generated: &row.generated,
                reference: &row.reference,
            });
    }

    let mut log = ResultsLog::default();
    let mut scores = Vec::with_capacity(groups.len());

    for ((variant, category), samples) in groups {
        let section: &mut MetricsSection = if variant == Variant::Base.as_str() {
            &mut log.base
        } else if variant == Variant::Finetuned.as_str() {
            &mut log.finetuned
        } else {
            warn!(variant, "skipping generations with unknown variant");
            continue;
        };

        let metrics = suite.score(&samples);
        section.categories.push(CategoryMetrics {
            category: category.to_string(),
            metrics: metrics.clone(),
        });
        scores.push(CategoryScore {
            variant: variant.to_string(),
            category: category.to_string(),
            samples: samples.len(),
            metrics,
        });
    }

    (log, scores)
}
