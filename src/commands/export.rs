use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::cli::{ExportArgs, ExportFormat};
use crate::dataset::load_pairs;
use crate::query::Query;
use crate::util::write_jsonl;

pub fn run(args: ExportArgs) -> Result<()> {
    let queries = load_pairs(&args.pairs_dir, &args.extension)?;

    let Some(test_fraction) = args.test_fraction else {
        write_queries(&args.output, &queries, args.format)?;
        info!(
            path = %args.output.display(),
            format = args.format.as_str(),
            records = queries.len(),
            "export completed"
        );
        return Ok(());
    };

    if !(0.0..1.0).contains(&test_fraction) {
        bail!("--test-fraction must be in [0, 1), got {test_fraction}");
    }

    let (train, test): (Vec<Query>, Vec<Query>) = queries
        .into_iter()
        .partition(|query| !is_test_split(query, test_fraction));
    let test_path = test_split_path(&args.output);

    write_queries(&args.output, &train, args.format)?;
    write_queries(&test_path, &test, args.format)?;
    info!(
        train_path = %args.output.display(),
        test_path = %test_path.display(),
        format = args.format.as_str(),
        train_records = train.len(),
        test_records = test.len(),
        "export completed with split"
    );

    Ok(())
}

fn write_queries(path: &Path, queries: &[Query], format: ExportFormat) -> Result<()> {
    match format {
        ExportFormat::Training => {
            let records = queries
                .iter()
                .map(Query::training_record)
                .collect::<Vec<_>>();
            write_jsonl(path, &records)
        }
        ExportFormat::Dataset => {
            let records = queries
                .iter()
                .map(Query::dataset_record)
                .collect::<Vec<_>>();
            write_jsonl(path, &records)
        }
    }
}

/// Deterministic: the first 8 bytes of SHA-256(category/name) as a fraction of 2^64.
fn is_test_split(query: &Query, test_fraction: f64) -> bool {
    let digest = Sha256::digest(query.key().as_bytes());
    let mut prefix = [0_u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let position = u64::from_be_bytes(prefix) as f64 / 2_f64.powi(64);
    position < test_fraction
}

fn test_split_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("export");
    output.with_file_name(format!("{stem}.test.jsonl"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::{is_test_split, run, test_split_path};
    use crate::cli::{ExportArgs, ExportFormat};
    use crate::query::Query;

    #[test]
    fn split_is_deterministic_and_respects_bounds() {
        let query = Query::new("foo", "cli", "a", "b");
        assert!(!is_test_split(&query, 0.0));
        assert_eq!(is_test_split(&query, 0.5), is_test_split(&query, 0.5));
        assert!(is_test_split(&query, 0.999_999_999));
    }

    #[test]
    fn test_split_path_sits_next_to_output() {
        assert_eq!(
            test_split_path(Path::new("data/train.jsonl")),
            Path::new("data/train.test.jsonl")
        );
    }

    #[test]
    fn training_export_writes_prompt_completion_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pairs = dir.path().join("pairs");
        fs::create_dir(&pairs).expect("mkdir");
        fs::write(pairs.join("foo_before.py"), "print(1)").expect("write");
        fs::write(pairs.join("foo_after.py"), "print(2)").expect("write");
        let output = dir.path().join("out").join("train.jsonl");

        run(ExportArgs {
            pairs_dir: pairs,
            extension: "py".to_string(),
            output: output.clone(),
            format: ExportFormat::Training,
            test_fraction: None,
        })
        .expect("export succeeds");

        let written = fs::read_to_string(&output).expect("read export");
        assert_eq!(written, "{\"prompt\":\"print(1)\",\"completion\":\"print(2)\"}\n");
    }

    #[test]
    fn test_fraction_partitions_by_hashed_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pairs = dir.path().join("pairs");
        fs::create_dir(&pairs).expect("mkdir");
        for stem in ["a", "b", "c", "d", "e", "f", "g", "h"] {
            fs::write(pairs.join(format!("{stem}_before.py")), stem).expect("write");
            fs::write(pairs.join(format!("{stem}_after.py")), stem).expect("write");
        }
        let output = dir.path().join("train.jsonl");

        run(ExportArgs {
            pairs_dir: pairs.clone(),
            extension: "py".to_string(),
            output: output.clone(),
            format: ExportFormat::Dataset,
            test_fraction: Some(0.5),
        })
        .expect("export succeeds");

        let names_in = |path: &Path| {
            fs::read_to_string(path)
                .expect("read split")
                .lines()
                .map(|line| {
                    serde_json::from_str::<crate::query::DatasetRecord>(line)
                        .expect("record parses")
                        .name
                        .expect("name is exported")
                })
                .collect::<Vec<_>>()
        };
        let train = names_in(&output);
        let test = names_in(&dir.path().join("train.test.jsonl"));

        let expected_test = crate::dataset::load_pairs(&pairs, "py")
            .expect("pairs load")
            .into_iter()
            .filter(|query| is_test_split(query, 0.5))
            .map(|query| query.name().to_string())
            .collect::<Vec<_>>();
        assert_eq!(test, expected_test);
        assert_eq!(train.len() + test.len(), 8);
        assert!(train.iter().all(|name| !test.contains(name)));
    }

    #[test]
    fn out_of_range_fraction_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("foo_before.py"), "a").expect("write");
        fs::write(dir.path().join("foo_after.py"), "b").expect("write");

        let result = run(ExportArgs {
            pairs_dir: dir.path().to_path_buf(),
            extension: "py".to_string(),
            output: dir.path().join("train.jsonl"),
            format: ExportFormat::Dataset,
            test_fraction: Some(1.5),
        });
        assert!(result.is_err());
    }
}
