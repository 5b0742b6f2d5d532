use std::io::{self, Write};

use anyhow::{Context, Result};

use super::Comparison;
use crate::table::{format_optional_score, format_score, render};

pub(super) fn write_json_report(comparison: &Comparison) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, comparison)
        .context("failed to serialize comparison json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

pub(super) fn write_text_report(comparison: &Comparison) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    output.write_all(render_text_report(comparison).as_bytes())?;
    output.flush()?;
    Ok(())
}

pub(super) fn render_text_report(comparison: &Comparison) -> String {
    let mut sections = Vec::<String>::new();

    for category in &comparison.diffs {
        let rows = category
            .rows
            .iter()
            .map(|row| {
                vec![
                    row.metric.clone(),
                    format_score(row.base),
                    format_score(row.finetuned),
                    format_score(row.diff),
                ]
            })
            .collect::<Vec<_>>();
        sections.push(format!(
            "Category: {}\n{}",
            category.category,
            render(&["metric", "base", "finetuned", "diff"], &rows)
        ));
    }

    let ranking_rows = comparison
        .ranking
        .iter()
        .map(|row| {
            vec![
                row.category.clone(),
                format_optional_score(row.base),
                format_score(row.finetuned),
                format_optional_score(row.diff),
            ]
        })
        .collect::<Vec<_>>();
    sections.push(format!(
        "Categories by finetuned {}\n{}",
        comparison.sort_metric,
        render(&["category", "base", "finetuned", "diff"], &ranking_rows)
    ));

    let average_rows = comparison
        .averages
        .iter()
        .map(|row| {
            vec![
                row.category.clone(),
                format_optional_score(row.base),
                format_optional_score(row.finetuned),
                format_optional_score(row.diff),
            ]
        })
        .collect::<Vec<_>>();
    sections.push(format!(
        "Average of {}\n{}",
        comparison.averaged_metrics.join(", "),
        render(&["category", "base_avg", "finetuned_avg", "diff"], &average_rows)
    ));

    sections.join("\n")
}
