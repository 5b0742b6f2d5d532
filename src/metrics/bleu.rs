use std::collections::HashMap;

use anyhow::{Context, Result};
use regex::Regex;

pub const MAX_ORDER: usize = 4;

#[derive(Debug, Clone)]
pub struct Tokenizer13a {
    symbols: Regex,
    period_comma_after: Regex,
    period_comma_before: Regex,
    dash_after_digit: Regex,
}

impl Tokenizer13a {
    pub fn new() -> Result<Self> {
        Ok(Self {
            symbols: Regex::new(r"([\{-~\[-` -&\(-\+:-@/])")
                .context("failed to compile 13a symbol regex")?,
            period_comma_after: Regex::new(r"([^0-9])([\.,])")
                .context("failed to compile 13a period regex")?,
            period_comma_before: Regex::new(r"([\.,])([^0-9])")
                .context("failed to compile 13a period regex")?,
            dash_after_digit: Regex::new(r"([0-9])(-)")
                .context("failed to compile 13a dash regex")?,
        })
    }

    pub fn tokenize(&self, line: &str) -> Vec<String> {
        let line = line
            .replace("<skipped>", "")
            .replace("-\n", "")
            .replace('\n', " ");
        let line = line
            .replace("&quot;", "\"")
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">");

        let padded = format!(" {line} ");
        let padded = self.symbols.replace_all(&padded, " $1 ");
        let padded = self.period_comma_after.replace_all(&padded, "$1 $2 ");
        let padded = self.period_comma_before.replace_all(&padded, " $1 $2");
        let padded = self.dash_after_digit.replace_all(&padded, "$1 $2 ");

        padded.split_whitespace().map(ToOwned::to_owned).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BleuScore {
    pub bleu: f64,
    pub brevity_penalty: f64,
}

pub trait UnigramWeight {
    fn weight(&self, token: &str) -> f64;
}

pub struct Uniform;

impl UnigramWeight for Uniform {
    fn weight(&self, _token: &str) -> f64 {
        1.0
    }
}

/// Corpus BLEU over pre-tokenized (hypothesis, reference) pairs: clipped n-gram
/// precision up to order 4, geometric mean without smoothing, brevity penalty.
pub fn corpus_bleu(pairs: &[(Vec<String>, Vec<String>)]) -> BleuScore {
    corpus_bleu_weighted(pairs, &Uniform)
}

pub fn corpus_bleu_weighted(
    pairs: &[(Vec<String>, Vec<String>)],
    weights: &dyn UnigramWeight,
) -> BleuScore {
    let mut matches_by_order = [0.0_f64; MAX_ORDER];
    let mut possible_by_order = [0.0_f64; MAX_ORDER];
    let mut translation_length = 0usize;
    let mut reference_length = 0usize;

    for (hypothesis, reference) in pairs {
        translation_length += hypothesis.len();
        reference_length += reference.len();

        let hypothesis_counts = ngram_counts(hypothesis);
        let reference_counts = ngram_counts(reference);

        for (ngram, count) in &hypothesis_counts {
            let Some(reference_count) = reference_counts.get(ngram) else {
                continue;
            };
            let clipped = (*count).min(*reference_count) as f64;
            let order = ngram.len() - 1;
            let weight = if ngram.len() == 1 {
                weights.weight(ngram[0])
            } else {
                1.0
            };
            matches_by_order[order] += clipped * weight;
        }

        possible_by_order[0] += hypothesis
            .iter()
            .map(|token| weights.weight(token))
            .sum::<f64>();
        for order in 1..MAX_ORDER {
            possible_by_order[order] += hypothesis.len().saturating_sub(order) as f64;
        }
    }

    if translation_length == 0 {
        return BleuScore {
            bleu: 0.0,
            brevity_penalty: 0.0,
        };
    }

    let mut precisions = [0.0_f64; MAX_ORDER];
    for order in 0..MAX_ORDER {
        if possible_by_order[order] > 0.0 {
            precisions[order] = matches_by_order[order] / possible_by_order[order];
        }
    }

    let geo_mean = if precisions.iter().all(|value| *value > 0.0) {
        let log_sum = precisions.iter().map(|value| value.ln()).sum::<f64>();
        (log_sum / MAX_ORDER as f64).exp()
    } else {
        0.0
    };

    let ratio = translation_length as f64 / reference_length.max(1) as f64;
    let brevity_penalty = if ratio > 1.0 {
        1.0
    } else {
        (1.0 - 1.0 / ratio).exp()
    };

    BleuScore {
        bleu: geo_mean * brevity_penalty,
        brevity_penalty,
    }
}

fn ngram_counts(tokens: &[String]) -> HashMap<Vec<&str>, usize> {
    let mut counts = HashMap::<Vec<&str>, usize>::new();
    for order in 1..=MAX_ORDER {
        if tokens.len() < order {
            break;
        }
        for window in tokens.windows(order) {
            let key = window.iter().map(String::as_str).collect::<Vec<&str>>();
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    counts
}
