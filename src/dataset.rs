use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{debug, info};

use crate::query::{DatasetRecord, Query};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairPaths {
    pub name: String,
    pub category: String,
    pub before: PathBuf,
    pub after: PathBuf,
}

pub fn discover_pairs(root: &Path, extension: &str) -> Result<Vec<PairPaths>> {
    let extension = extension.trim_start_matches('.');
    let pattern = Regex::new(&format!(
        r"^(?P<stem>.+)_before\.{}$",
        regex::escape(extension)
    ))
    .context("failed to compile before-file regex")?;

    let root_category = root
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| root.display().to_string());

    let mut pairs = collect_pairs_in(root, &root_category, extension, &pattern)?;

    for subdirectory in list_subdirectories(root)? {
        let category = subdirectory
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 directory name: {}", subdirectory.display()))?;
        pairs.extend(collect_pairs_in(&subdirectory, &category, extension, &pattern)?);
    }

    if pairs.is_empty() {
        bail!(
            "no *_before.{extension} files found in {}",
            root.display()
        );
    }

    pairs.sort_by(|a, b| a.category.cmp(&b.category).then(a.name.cmp(&b.name)));
    if let Some(window) = pairs
        .windows(2)
        .find(|window| window[0].category == window[1].category && window[0].name == window[1].name)
    {
        bail!(
            "duplicate pair {}/{}: {} and {}",
            window[0].category,
            window[0].name,
            window[0].before.display(),
            window[1].before.display()
        );
    }
    Ok(pairs)
}

pub fn load_pairs(root: &Path, extension: &str) -> Result<Vec<Query>> {
    let pairs = discover_pairs(root, extension)?;
    let mut queries = Vec::with_capacity(pairs.len());

    for pair in &pairs {
        let before = read_utf8(&pair.before)?;
        let after = read_utf8(&pair.after)?;
        queries.push(Query::new(&pair.name, &pair.category, before, after));
    }

    info!(
        root = %root.display(),
        queries = queries.len(),
        "loaded before/after pairs"
    );
    Ok(queries)
}

pub fn load_jsonl_dataset(path: &Path) -> Result<Vec<Query>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset {}", path.display()))?;

    let mut queries = Vec::new();
    let mut seen = HashMap::<String, usize>::new();
    for (index, line) in raw.lines().enumerate() {
        let line_number = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let record: DatasetRecord = serde_json::from_str(line).with_context(|| {
            format!(
                "failed to parse dataset record at {}:{line_number}",
                path.display()
            )
        })?;
        let query = Query::from_dataset_record(record, line_number);
        if let Some(first_line) = seen.insert(query.key(), line_number) {
            bail!(
                "duplicate dataset record {} at {}:{first_line} and {}:{line_number}",
                query.key(),
                path.display(),
                path.display()
            );
        }
        queries.push(query);
    }

    info!(path = %path.display(), queries = queries.len(), "loaded jsonl dataset");
    Ok(queries)
}

fn collect_pairs_in(
    directory: &Path,
    category: &str,
    extension: &str,
    pattern: &Regex,
) -> Result<Vec<PairPaths>> {
    let mut pairs = Vec::new();

    let entries = fs::read_dir(directory)
        .with_context(|| format!("failed to read {}", directory.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", directory.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(captures) = pattern.captures(filename) else {
            continue;
        };
        let stem = captures
            .name("stem")
            .map(|m| m.as_str())
            .context("missing stem capture")?;

        let after = directory.join(format!("{stem}_after.{extension}"));
        if !after.is_file() {
            bail!(
                "missing counterpart {} for {}",
                after.display(),
                path.display()
            );
        }

        debug!(before = %path.display(), after = %after.display(), "paired files");
        pairs.push(PairPaths {
            name: stem.to_string(),
            category: category.to_string(),
            before: path,
            after,
        });
    }

    Ok(pairs)
}

fn list_subdirectories(root: &Path) -> Result<Vec<PathBuf>> {
    let mut directories = Vec::new();

    let entries =
        fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", root.display()))?;
        let path = entry.path();
        if entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_dir()
        {
            directories.push(path);
        }
    }

    directories.sort();
    Ok(directories)
}

fn read_utf8(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {} as UTF-8", path.display()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{discover_pairs, load_jsonl_dataset, load_pairs};

    #[test]
    fn load_pairs_reads_both_sides_verbatim() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("foo_before.py"), "print(1)").expect("write before");
        fs::write(dir.path().join("foo_after.py"), "print(2)").expect("write after");

        let queries = load_pairs(dir.path(), "py").expect("pairs should load");
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].name(), "foo");
        assert_eq!(
            queries[0].training_record(),
            crate::query::TrainingRecord {
                prompt: "print(1)".to_string(),
                completion: "print(2)".to_string(),
            }
        );
    }

    #[test]
    fn missing_after_file_fails_with_its_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("lonely_before.py"), "x = 1").expect("write before");

        let err = load_pairs(dir.path(), "py").expect_err("unpaired file must fail");
        assert!(err.to_string().contains("lonely_after.py"), "{err}");
    }

    #[test]
    fn subdirectories_become_categories_and_order_is_stable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cli = dir.path().join("cli");
        let web = dir.path().join("web");
        fs::create_dir(&cli).expect("mkdir cli");
        fs::create_dir(&web).expect("mkdir web");
        for (directory, stem) in [(&web, "b"), (&cli, "z"), (&cli, "a")] {
            fs::write(directory.join(format!("{stem}_before.py")), "old").expect("write");
            fs::write(directory.join(format!("{stem}_after.py")), "new").expect("write");
        }
        fs::write(cli.join("notes.txt"), "ignored").expect("write extra");

        let pairs = discover_pairs(dir.path(), "py").expect("pairs should be found");
        let keys = pairs
            .iter()
            .map(|pair| format!("{}/{}", pair.category, pair.name))
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["cli/a", "cli/z", "web/b"]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(discover_pairs(dir.path(), "py").is_err());
    }

    #[test]
    fn jsonl_dataset_rejects_repeated_category_and_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dupes.jsonl");
        fs::write(
            &path,
            "{\"input\": \"a\", \"output\": \"b\", \"name\": \"fix\"}\n{\"input\": \"c\", \"output\": \"d\", \"name\": \"fix\"}\n",
        )
        .expect("write dataset");

        let err = load_jsonl_dataset(&path).expect_err("repeated key must fail");
        let message = err.to_string();
        assert!(message.contains("dataset/fix"), "{message}");
        assert!(message.contains(":1") && message.contains(":2"), "{message}");
    }

    #[test]
    fn root_files_and_same_named_subdirectory_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("cli");
        let nested = root.join("cli");
        fs::create_dir_all(&nested).expect("mkdir");
        for directory in [&root, &nested] {
            fs::write(directory.join("a_before.py"), "old").expect("write");
            fs::write(directory.join("a_after.py"), "new").expect("write");
        }

        let err = discover_pairs(&root, "py").expect_err("duplicate key must fail");
        assert!(err.to_string().contains("duplicate pair cli/a"), "{err}");
    }

    #[test]
    fn pairs_nested_two_levels_deep_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let deep = dir.path().join("web").join("legacy");
        fs::create_dir_all(&deep).expect("mkdir");
        fs::write(deep.join("old_before.py"), "x").expect("write");
        fs::write(deep.join("old_after.py"), "y").expect("write");
        fs::write(dir.path().join("web").join("b_before.py"), "x").expect("write");
        fs::write(dir.path().join("web").join("b_after.py"), "y").expect("write");

        let pairs = discover_pairs(dir.path(), "py").expect("pairs should be found");
        let keys = pairs
            .iter()
            .map(|pair| format!("{}/{}", pair.category, pair.name))
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["web/b"]);
    }

    #[test]
    fn non_utf8_pair_file_fails_with_its_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("bin_before.py"), [0xff_u8, 0xfe, 0x00]).expect("write");
        fs::write(dir.path().join("bin_after.py"), "ok").expect("write");

        let err = load_pairs(dir.path(), "py").expect_err("invalid UTF-8 must fail");
        assert!(err.to_string().contains("bin_before.py"), "{err}");
    }

    #[test]
    fn jsonl_dataset_skips_blank_lines_and_reports_bad_line_numbers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = dir.path().join("good.jsonl");
        fs::write(
            &good,
            "{\"input\": \"a\", \"output\": \"b\", \"category\": \"cli\"}\n\n{\"input\": \"c\", \"output\": \"d\"}\n",
        )
        .expect("write dataset");

        let queries = load_jsonl_dataset(&good).expect("dataset should load");
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].category(), "cli");
        assert_eq!(queries[1].name(), "line-3");

        let bad = dir.path().join("bad.jsonl");
        fs::write(&bad, "{\"input\": \"a\", \"output\": \"b\"}\nnot json\n").expect("write");
        let err = load_jsonl_dataset(&bad).expect_err("malformed line must fail");
        assert!(err.to_string().contains(":2"), "{err}");
    }
}
