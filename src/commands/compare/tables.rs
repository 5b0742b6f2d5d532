use serde::Serialize;

use crate::results_log::{CategoryMetrics, ResultsLog};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(super) struct DiffRow {
    pub(super) metric: String,
    pub(super) base: f64,
    pub(super) finetuned: f64,
    pub(super) diff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(super) struct CategoryDiff {
    pub(super) category: String,
    pub(super) rows: Vec<DiffRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(super) struct RankRow {
    pub(super) category: String,
    pub(super) base: Option<f64>,
    pub(super) finetuned: f64,
    pub(super) diff: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(super) struct AverageRow {
    pub(super) category: String,
    pub(super) base: Option<f64>,
    pub(super) finetuned: Option<f64>,
    pub(super) diff: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct Comparison {
    pub(super) sort_metric: String,
    pub(super) averaged_metrics: Vec<String>,
    pub(super) diffs: Vec<CategoryDiff>,
    pub(super) ranking: Vec<RankRow>,
    pub(super) averages: Vec<AverageRow>,
}

pub(super) fn build_comparison(
    log: &ResultsLog,
    sort_metric: &str,
    averaged_metrics: &[&str],
) -> Comparison {
    Comparison {
        sort_metric: sort_metric.to_string(),
        averaged_metrics: averaged_metrics.iter().map(|name| name.to_string()).collect(),
        diffs: category_diffs(log),
        ranking: rank_categories(log, sort_metric),
        averages: category_averages(log, averaged_metrics),
    }
}

pub(super) fn diff_rows(base: &CategoryMetrics, finetuned: &CategoryMetrics) -> Vec<DiffRow> {
    base.metrics
        .iter()
        .filter_map(|(metric, base_value)| {
            finetuned.get(metric).map(|finetuned_value| DiffRow {
                metric: metric.clone(),
                base: *base_value,
                finetuned: finetuned_value,
                diff: finetuned_value - base_value,
            })
        })
        .collect()
}

pub(super) fn category_diffs(log: &ResultsLog) -> Vec<CategoryDiff> {
    log.base
        .categories
        .iter()
        .filter_map(|base| {
            log.finetuned
                .category(&base.category)
                .map(|finetuned| CategoryDiff {
                    category: base.category.clone(),
                    rows: diff_rows(base, finetuned),
                })
        })
        .collect()
}

pub(super) fn rank_categories(log: &ResultsLog, metric: &str) -> Vec<RankRow> {
    let mut rows = log
        .finetuned
        .categories
        .iter()
        .filter_map(|finetuned| {
            let finetuned_value = finetuned.get(metric)?;
            let base_value = log
                .base
                .category(&finetuned.category)
                .and_then(|base| base.get(metric));
            Some(RankRow {
                category: finetuned.category.clone(),
                base: base_value,
                finetuned: finetuned_value,
                diff: base_value.map(|base_value| finetuned_value - base_value),
            })
        })
        .collect::<Vec<_>>();

    rows.sort_by(|left, right| {
        right
            .finetuned
            .total_cmp(&left.finetuned)
            .then_with(|| left.category.cmp(&right.category))
    });
    rows
}

pub(super) fn category_average(category: &CategoryMetrics, metrics: &[&str]) -> Option<f64> {
    let values = metrics
        .iter()
        .filter_map(|metric| category.get(metric))
        .collect::<Vec<f64>>();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub(super) fn category_averages(log: &ResultsLog, metrics: &[&str]) -> Vec<AverageRow> {
    let mut names = log
        .base
        .categories
        .iter()
        .map(|category| category.category.clone())
        .collect::<Vec<String>>();
    for category in &log.finetuned.categories {
        if !names.contains(&category.category) {
            names.push(category.category.clone());
        }
    }

    names
        .into_iter()
        .map(|name| {
            let base = log
                .base
                .category(&name)
                .and_then(|category| category_average(category, metrics));
            let finetuned = log
                .finetuned
                .category(&name)
                .and_then(|category| category_average(category, metrics));
            let diff = match (base, finetuned) {
                (Some(base), Some(finetuned)) => Some(finetuned - base),
                _ => None,
            };
            AverageRow {
                category: name,
                base,
                finetuned,
                diff,
            }
        })
        .collect()
}
