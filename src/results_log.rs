use std::fmt::Write as _;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Serialize;
use tracing::warn;

pub const BASE_HEADER: &str = "Base Model Results";
pub const FINETUNED_HEADER: &str = "Finetuned Model Results";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMetrics {
    pub category: String,
    pub metrics: Vec<(String, f64)>,
}

impl CategoryMetrics {
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.metrics
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, value)| *value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSection {
    pub categories: Vec<CategoryMetrics>,
}

impl MetricsSection {
    pub fn category(&self, name: &str) -> Option<&CategoryMetrics> {
        self.categories.iter().find(|entry| entry.category == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultsLog {
    pub base: MetricsSection,
    pub finetuned: MetricsSection,
}

pub fn render(log: &ResultsLog) -> String {
    let mut out = String::new();
    render_section(&mut out, BASE_HEADER, &log.base);
    out.push('\n');
    render_section(&mut out, FINETUNED_HEADER, &log.finetuned);
    out
}

fn render_section(out: &mut String, header: &str, section: &MetricsSection) {
    let _ = writeln!(out, "{header}");
    for category in &section.categories {
        let _ = writeln!(out, "##### {}", category.category);
        for (metric, value) in &category.metrics {
            let _ = writeln!(out, "{metric} = {value}");
        }
    }
}

pub fn parse(raw: &str) -> Result<ResultsLog> {
    let lines = raw.lines().collect::<Vec<_>>();
    let Some(base_line) = lines.iter().position(|line| line.trim() == BASE_HEADER) else {
        bail!("results log has no \"{BASE_HEADER}\" header");
    };
    let Some(finetuned_line) = lines[base_line + 1..]
        .iter()
        .position(|line| line.trim() == FINETUNED_HEADER)
        .map(|offset| base_line + 1 + offset)
    else {
        bail!("results log has no \"{FINETUNED_HEADER}\" header after \"{BASE_HEADER}\"");
    };

    let category_regex =
        Regex::new(r"^#####\s*(.+?)\s*$").context("failed to compile category header regex")?;
    let metric_regex = Regex::new(r"^\s*([A-Za-z0-9_.\-]+)\s*=\s*(.*?)\s*$")
        .context("failed to compile metric line regex")?;

    Ok(ResultsLog {
        base: parse_section(
            &lines[base_line + 1..finetuned_line],
            &category_regex,
            &metric_regex,
        )
        .with_context(|| format!("failed to parse \"{BASE_HEADER}\" section"))?,
        finetuned: parse_section(&lines[finetuned_line + 1..], &category_regex, &metric_regex)
            .with_context(|| format!("failed to parse \"{FINETUNED_HEADER}\" section"))?,
    })
}

fn parse_section(
    lines: &[&str],
    category_regex: &Regex,
    metric_regex: &Regex,
) -> Result<MetricsSection> {
    let mut section = MetricsSection::default();

    for &line in lines {
        if let Some(captures) = category_regex.captures(line) {
            let name = captures
                .get(1)
                .map(|m| m.as_str())
                .context("missing category capture")?;
            section.categories.push(CategoryMetrics {
                category: name.to_string(),
                metrics: Vec::new(),
            });
            continue;
        }

        let Some(captures) = metric_regex.captures(line) else {
            continue;
        };
        let metric = captures
            .get(1)
            .map(|m| m.as_str())
            .context("missing metric capture")?;
        let raw_value = captures
            .get(2)
            .map(|m| m.as_str())
            .context("missing value capture")?;
        let value = raw_value
            .parse::<f64>()
            .with_context(|| format!("invalid metric value in line: {}", line.trim()))?;

        match section.categories.last_mut() {
            Some(category) => category.metrics.push((metric.to_string(), value)),
            None => warn!(line = line.trim(), "metric line outside any category skipped"),
        }
    }

    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::{CategoryMetrics, MetricsSection, ResultsLog, parse, render};

    const SAMPLE: &str = "\
Base Model Results
##### cli
metric_a = 1.0
metric_b = 0.25

Finetuned Model Results
##### cli
metric_a = 1.5
";

    #[test]
    fn parses_both_sections_in_order() {
        let log = parse(SAMPLE).expect("sample log parses");
        let base = log.base.category("cli").expect("base cli");
        let finetuned = log.finetuned.category("cli").expect("finetuned cli");

        assert_eq!(base.get("metric_a"), Some(1.0));
        assert_eq!(base.get("metric_b"), Some(0.25));
        assert_eq!(finetuned.get("metric_a"), Some(1.5));
        assert_eq!(finetuned.get("metric_b"), None);
    }

    #[test]
    fn missing_or_swapped_headers_are_errors() {
        assert!(parse("##### cli\nmetric_a = 1.0\n").is_err());
        assert!(parse("Base Model Results\n##### cli\n").is_err());
        assert!(parse("Finetuned Model Results\n\nBase Model Results\n").is_err());
    }

    #[test]
    fn malformed_value_names_the_line() {
        let raw = "Base Model Results\n##### cli\nbleu = abc\nFinetuned Model Results\n";
        let err = parse(raw).expect_err("non-numeric value must fail");
        assert!(format!("{err:#}").contains("bleu = abc"), "{err:#}");
    }

    #[test]
    fn multi_word_or_empty_values_are_errors() {
        for line in ["bleu = 0.5 0.7", "bleu = not a number", "bleu ="] {
            let raw = format!("Base Model Results\n##### cli\n{line}\nFinetuned Model Results\n");
            let err = parse(&raw).expect_err("value must be a single float");
            assert!(format!("{err:#}").contains(line), "{err:#}");
        }
    }

    #[test]
    fn metric_before_any_category_is_skipped() {
        let raw = "\
Base Model Results
bleu = 0.9
##### cli
bleu = 0.5
Finetuned Model Results
exact_match = 1.0
";
        let log = parse(raw).expect("stray metric lines are tolerated");
        assert_eq!(
            log.base.categories,
            vec![CategoryMetrics {
                category: "cli".to_string(),
                metrics: vec![("bleu".to_string(), 0.5)],
            }]
        );
        assert!(log.finetuned.categories.is_empty());
    }

    #[test]
    fn headers_only_match_whole_lines() {
        let log = ResultsLog {
            base: MetricsSection {
                categories: vec![CategoryMetrics {
                    category: "Finetuned Model Results regressions".to_string(),
                    metrics: vec![("bleu".to_string(), 0.25)],
                }],
            },
            finetuned: MetricsSection {
                categories: vec![CategoryMetrics {
                    category: "Base Model Results".to_string(),
                    metrics: vec![("bleu".to_string(), 0.5)],
                }],
            },
        };

        assert_eq!(parse(&render(&log)).expect("rendered log parses"), log);
    }

    #[test]
    fn render_output_parses_back() {
        let log = ResultsLog {
            base: MetricsSection {
                categories: vec![CategoryMetrics {
                    category: "web app".to_string(),
                    metrics: vec![("bleu".to_string(), 0.125), ("exact_match".to_string(), 0.0)],
                }],
            },
            finetuned: MetricsSection::default(),
        };

        assert_eq!(parse(&render(&log)).expect("rendered log parses"), log);
    }
}
