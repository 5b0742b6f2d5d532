use std::collections::HashSet;

use super::bleu::{UnigramWeight, corpus_bleu, corpus_bleu_weighted};

const KEYWORD_WEIGHT: f64 = 1.0;
const OTHER_WEIGHT: f64 = 0.2;

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield", "abs", "all", "any", "bool", "dict", "enumerate", "filter", "float",
    "getattr", "hasattr", "int", "isinstance", "len", "list", "map", "max", "min", "open",
    "print", "range", "reversed", "set", "setattr", "sorted", "str", "sum", "super", "tuple",
    "type", "zip",
];

pub struct KeywordWeights {
    keywords: HashSet<&'static str>,
}

impl KeywordWeights {
    pub fn python() -> Self {
        Self {
            keywords: PYTHON_KEYWORDS.iter().copied().collect(),
        }
    }
}

impl UnigramWeight for KeywordWeights {
    fn weight(&self, token: &str) -> f64 {
        if self.keywords.contains(token) {
            KEYWORD_WEIGHT
        } else {
            OTHER_WEIGHT
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodeBleuScore {
    pub codebleu: f64,
    pub ngram_match: f64,
    pub weighted_ngram_match: f64,
}

pub fn lexical_codebleu(pairs: &[(&str, &str)], weights: &KeywordWeights) -> CodeBleuScore {
    let tokenized = pairs
        .iter()
        .map(|(hypothesis, reference)| (split_tokens(hypothesis), split_tokens(reference)))
        .collect::<Vec<_>>();

    let ngram_match = corpus_bleu(&tokenized).bleu;
    let weighted_ngram_match = corpus_bleu_weighted(&tokenized, weights).bleu;

    CodeBleuScore {
        codebleu: (ngram_match + weighted_ngram_match) / 2.0,
        ngram_match,
        weighted_ngram_match,
    }
}

fn split_tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(ToOwned::to_owned).collect()
}
