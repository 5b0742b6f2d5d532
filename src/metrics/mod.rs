use anyhow::Result;
use tracing::debug;

pub mod bleu;
pub mod codebleu;
pub mod levenshtein;

use self::bleu::{Tokenizer13a, corpus_bleu};
use self::codebleu::{KeywordWeights, lexical_codebleu};

pub const BLEU: &str = "bleu";
pub const CODEBLEU: &str = "codebleu";
pub const NGRAM_MATCH: &str = "ngram_match_score";
pub const WEIGHTED_NGRAM_MATCH: &str = "weighted_ngram_match_score";
pub const LEVENSHTEIN_RATIO: &str = "levenshtein_ratio";
pub const EXACT_MATCH: &str = "exact_match";

pub const AVERAGED_METRICS: &[&str] = &[BLEU, CODEBLEU, LEVENSHTEIN_RATIO, EXACT_MATCH];

#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    pub generated: &'a str,
    pub reference: &'a str,
}

pub struct MetricSuite {
    tokenizer: Tokenizer13a,
    keywords: KeywordWeights,
}

impl MetricSuite {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tokenizer: Tokenizer13a::new()?,
            keywords: KeywordWeights::python(),
        })
    }

    pub fn score(&self, samples: &[Sample<'_>]) -> Vec<(String, f64)> {
        let tokenized = samples
            .iter()
            .map(|sample| {
                (
                    self.tokenizer.tokenize(sample.generated),
                    self.tokenizer.tokenize(sample.reference),
                )
            })
            .collect::<Vec<_>>();
        let bleu = corpus_bleu(&tokenized);
        debug!(
            samples = samples.len(),
            bleu = bleu.bleu,
            brevity_penalty = bleu.brevity_penalty,
            "corpus bleu"
        );

        let raw_pairs = samples
            .iter()
            .map(|sample| (sample.generated, sample.reference))
            .collect::<Vec<_>>();
        let codebleu = lexical_codebleu(&raw_pairs, &self.keywords);

        let levenshtein = mean(
            samples
                .iter()
                .map(|sample| levenshtein::ratio(sample.generated, sample.reference)),
        );
        let exact = mean(samples.iter().map(|sample| exact_match(sample.generated, sample.reference)));

        vec![
            (BLEU.to_string(), bleu.bleu),
            (CODEBLEU.to_string(), codebleu.codebleu),
            (NGRAM_MATCH.to_string(), codebleu.ngram_match),
            (WEIGHTED_NGRAM_MATCH.to_string(), codebleu.weighted_ngram_match),
            (LEVENSHTEIN_RATIO.to_string(), levenshtein),
            (EXACT_MATCH.to_string(), exact),
        ]
    }
}

pub fn exact_match(generated: &str, reference: &str) -> f64 {
    if generated.trim() == reference.trim() {
        1.0
    } else {
        0.0
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (total, count) = values.fold((0.0_f64, 0usize), |(total, count), value| {
        (total + value, count + 1)
    });
    if count == 0 { 0.0 } else { total / count as f64 }
}
