use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use crate::query::Query;

pub mod candle_model;
pub mod lora;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Variant {
    Base,
    Finetuned,
}

impl Variant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Finetuned => "finetuned",
        }
    }
}

pub trait CompletionModel {
    fn label(&self) -> &str;

    fn complete(&mut self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub duration_ms: u128,
}

pub fn run_queries<M, F>(model: &mut M, queries: &[Query], mut sink: F) -> Result<usize>
where
    M: CompletionModel + ?Sized,
    F: FnMut(&Query, Completion) -> Result<()>,
{
    let total = queries.len();
    let started = Instant::now();

    for (index, query) in queries.iter().enumerate() {
        let query_started = Instant::now();
        let text = model.complete(query.inference_input()).with_context(|| {
            format!(
                "generation failed for {} with {} model",
                query.key(),
                model.label()
            )
        })?;
        let duration_ms = query_started.elapsed().as_millis();

        info!(
            variant = model.label(),
            query = %query.key(),
            position = index + 1,
            total,
            generated_chars = text.chars().count(),
            duration_ms = duration_ms as u64,
            "completion generated"
        );
        sink(query, Completion { text, duration_ms })?;
    }

    info!(
        variant = model.label(),
        queries = total,
        duration_ms = started.elapsed().as_millis() as u64,
        "generation pass complete"
    );
    Ok(total)
}

#[cfg(test)]
mod tests {
    use anyhow::{Result, bail};

    use super::{CompletionModel, run_queries};
    use crate::query::Query;

    struct Echo {
        calls: usize,
        fail_on: Option<usize>,
    }

    impl CompletionModel for Echo {
        fn label(&self) -> &str {
            "echo"
        }

        fn complete(&mut self, prompt: &str) -> Result<String> {
            self.calls += 1;
            if self.fail_on == Some(self.calls) {
                bail!("out of memory");
            }
            Ok(prompt.to_uppercase())
        }
    }

    fn queries() -> Vec<Query> {
        vec![
            Query::new("a", "cli", "print(1)", "print(2)"),
            Query::new("b", "cli", "x = 1", "x = 2"),
        ]
    }

    #[test]
    fn completions_follow_query_order() {
        let mut model = Echo {
            calls: 0,
            fail_on: None,
        };
        let mut seen = Vec::new();
        let count = run_queries(&mut model, &queries(), |query, completion| {
            seen.push((query.name().to_string(), completion.text));
            Ok(())
        })
        .expect("run succeeds");

        assert_eq!(count, 2);
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), "PRINT(1)".to_string()),
                ("b".to_string(), "X = 1".to_string()),
            ]
        );
    }

    #[test]
    fn model_failure_stops_the_pass_and_names_the_query() {
        let mut model = Echo {
            calls: 0,
            fail_on: Some(2),
        };
        let mut delivered = 0usize;
        let err = run_queries(&mut model, &queries(), |_, _| {
            delivered += 1;
            Ok(())
        })
        .expect_err("second query fails");

        assert_eq!(delivered, 1);
        assert!(err.to_string().contains("cli/b"), "{err}");
    }
}
