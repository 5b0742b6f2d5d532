use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::util::ensure_directory;

pub const STORE_SCHEMA_VERSION: &str = "0.1.0";
pub const DEFAULT_DB_FILENAME: &str = "generations.sqlite";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRow {
    pub run_id: String,
    pub model_id: String,
    pub revision: String,
    pub adapter_path: Option<String>,
    pub source: String,
    pub started_at: String,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRow {
    pub run_id: String,
    pub variant: String,
    pub category: String,
    pub query_name: String,
    pub prompt: String,
    pub reference: String,
    pub generated: String,
    pub duration_ms: i64,
    pub created_at: String,
}

pub fn open_store(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }

    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS runs (
          run_id TEXT PRIMARY KEY,
          model_id TEXT NOT NULL,
          revision TEXT NOT NULL,
          adapter_path TEXT,
          source TEXT NOT NULL,
          started_at TEXT NOT NULL,
          finished_at TEXT
        );

        CREATE TABLE IF NOT EXISTS generations (
          run_id TEXT NOT NULL,
          variant TEXT NOT NULL,
          category TEXT NOT NULL,
          query_name TEXT NOT NULL,
          prompt TEXT NOT NULL,
          reference TEXT NOT NULL,
          generated TEXT NOT NULL,
          duration_ms INTEGER NOT NULL,
          created_at TEXT NOT NULL,
          PRIMARY KEY(run_id, variant, category, query_name),
          FOREIGN KEY(run_id) REFERENCES runs(run_id)
        );

        CREATE INDEX IF NOT EXISTS idx_generations_run ON generations(run_id, variant);
        ",
        )
        .context("failed to create generation store schema")?;

    connection.execute(
        "
        INSERT INTO metadata(key, value) VALUES('schema_version', ?1)
        ON CONFLICT(key) DO UPDATE SET value=excluded.value
        ",
        params![STORE_SCHEMA_VERSION],
    )?;

    Ok(())
}

pub fn insert_run(connection: &Connection, run: &RunRow) -> Result<()> {
    connection
        .execute(
            "
        INSERT INTO runs(run_id, model_id, revision, adapter_path, source, started_at, finished_at)
        VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ",
            params![
                run.run_id,
                run.model_id,
                run.revision,
                run.adapter_path,
                run.source,
                run.started_at,
                run.finished_at,
            ],
        )
        .with_context(|| format!("failed to insert run {}", run.run_id))?;
    Ok(())
}

pub fn finish_run(connection: &Connection, run_id: &str, finished_at: &str) -> Result<()> {
    connection
        .execute(
            "UPDATE runs SET finished_at = ?2 WHERE run_id = ?1",
            params![run_id, finished_at],
        )
        .with_context(|| format!("failed to finish run {run_id}"))?;
    Ok(())
}

pub fn insert_generation(connection: &Connection, row: &GenerationRow) -> Result<()> {
    connection
        .execute(
            "
        INSERT INTO generations(run_id, variant, category, query_name, prompt, reference, generated, duration_ms, created_at)
        VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(run_id, variant, category, query_name) DO UPDATE SET
          prompt=excluded.prompt,
          reference=excluded.reference,
          generated=excluded.generated,
          duration_ms=excluded.duration_ms,
          created_at=excluded.created_at
        ",
            params![
                row.run_id,
                row.variant,
                row.category,
                row.query_name,
                row.prompt,
                row.reference,
                row.generated,
                row.duration_ms,
                row.created_at,
            ],
        )
        .with_context(|| {
            format!(
                "failed to store generation {}/{} for {}",
                row.category, row.query_name, row.variant
            )
        })?;
    Ok(())
}

pub fn latest_run(connection: &Connection) -> Result<Option<RunRow>> {
    let row = connection
        .query_row(
            "
        SELECT run_id, model_id, revision, adapter_path, source, started_at, finished_at
        FROM runs
        ORDER BY started_at DESC, run_id DESC
        LIMIT 1
        ",
            [],
            |row| {
                Ok(RunRow {
                    run_id: row.get(0)?,
                    model_id: row.get(1)?,
                    revision: row.get(2)?,
                    adapter_path: row.get(3)?,
                    source: row.get(4)?,
                    started_at: row.get(5)?,
                    finished_at: row.get(6)?,
                })
            },
        )
        .optional()
        .context("failed to query latest run")?;
    Ok(row)
}

pub fn load_generations(connection: &Connection, run_id: &str) -> Result<Vec<GenerationRow>> {
    let mut statement = connection.prepare(
        "
        SELECT run_id, variant, category, query_name, prompt, reference, generated, duration_ms, created_at
        FROM generations
        WHERE run_id = ?1
        ORDER BY variant, category, query_name
        ",
    )?;

    let rows = statement
        .query_map(params![run_id], |row| {
            Ok(GenerationRow {
                run_id: row.get(0)?,
                variant: row.get(1)?,
                category: row.get(2)?,
                query_name: row.get(3)?,
                prompt: row.get(4)?,
                reference: row.get(5)?,
                generated: row.get(6)?,
                duration_ms: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("failed to load generations for run {run_id}"))?;

    Ok(rows)
}

/// Returns `base` when unused, otherwise `base-2`, `base-3`, ...
pub fn unique_run_id(connection: &Connection, base: &str) -> Result<String> {
    let mut candidate = base.to_string();
    let mut suffix = 1usize;
    while connection
        .query_row(
            "SELECT 1 FROM runs WHERE run_id = ?1",
            params![candidate],
            |_| Ok(()),
        )
        .optional()
        .with_context(|| format!("failed to look up run {candidate}"))?
        .is_some()
    {
        suffix += 1;
        candidate = format!("{base}-{suffix}");
    }
    Ok(candidate)
}

pub fn count_runs(connection: &Connection) -> Result<i64> {
    let count = connection.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
    Ok(count)
}

pub fn count_generations_by_variant(
    connection: &Connection,
    run_id: &str,
) -> Result<Vec<(String, i64)>> {
    let mut statement = connection.prepare(
        "
        SELECT variant, COUNT(*)
        FROM generations
        WHERE run_id = ?1
        GROUP BY variant
        ORDER BY variant
        ",
    )?;

    let counts = statement
        .query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<(String, i64)>>>()?;
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::{
        GenerationRow, RunRow, count_generations_by_variant, ensure_schema, insert_generation,
        insert_run, latest_run, load_generations, unique_run_id,
    };

    fn run(run_id: &str, started_at: &str) -> RunRow {
        RunRow {
            run_id: run_id.to_string(),
            model_id: "tiny/model".to_string(),
            revision: "main".to_string(),
            adapter_path: None,
            source: "pairs:fixtures".to_string(),
            started_at: started_at.to_string(),
            finished_at: None,
        }
    }

    fn generation(run_id: &str, variant: &str, name: &str, generated: &str) -> GenerationRow {
        GenerationRow {
            run_id: run_id.to_string(),
            variant: variant.to_string(),
            category: "cli".to_string(),
            query_name: name.to_string(),
            prompt: "print(1)".to_string(),
            reference: "print(2)".to_string(),
            generated: generated.to_string(),
            duration_ms: 3,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn latest_run_prefers_most_recent_start() {
        let connection = Connection::open_in_memory().expect("in-memory DB should open");
        ensure_schema(&connection).expect("schema");
        insert_run(&connection, &run("generate-a", "2026-01-01T00:00:00Z")).expect("run a");
        insert_run(&connection, &run("generate-b", "2026-02-01T00:00:00Z")).expect("run b");

        let latest = latest_run(&connection).expect("query").expect("a run exists");
        assert_eq!(latest.run_id, "generate-b");
    }

    #[test]
    fn generations_upsert_and_group_by_variant() {
        let connection = Connection::open_in_memory().expect("in-memory DB should open");
        ensure_schema(&connection).expect("schema");
        insert_run(&connection, &run("r1", "2026-01-01T00:00:00Z")).expect("run");

        insert_generation(&connection, &generation("r1", "base", "foo", "print(0)")).expect("g1");
        insert_generation(&connection, &generation("r1", "base", "foo", "print(2)")).expect("g2");
        insert_generation(&connection, &generation("r1", "finetuned", "foo", "print(2)"))
            .expect("g3");

        let rows = load_generations(&connection, "r1").expect("load");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].variant, "base");
        assert_eq!(rows[0].generated, "print(2)");

        let counts = count_generations_by_variant(&connection, "r1").expect("counts");
        assert_eq!(
            counts,
            vec![("base".to_string(), 1), ("finetuned".to_string(), 1)]
        );
    }

    #[test]
    fn colliding_run_ids_get_a_numeric_suffix() {
        let connection = Connection::open_in_memory().expect("in-memory DB should open");
        ensure_schema(&connection).expect("schema");
        let base = "generate-20260101T000000.000Z";
        assert_eq!(unique_run_id(&connection, base).expect("lookup"), base);

        insert_run(&connection, &run(base, "2026-01-01T00:00:00Z")).expect("first run");
        let second = unique_run_id(&connection, base).expect("lookup");
        assert_eq!(second, format!("{base}-2"));

        insert_run(&connection, &run(&second, "2026-01-01T00:00:00Z")).expect("second run");
        assert_eq!(
            unique_run_id(&connection, base).expect("lookup"),
            format!("{base}-3")
        );
    }

    #[test]
    fn empty_store_has_no_latest_run() {
        let connection = Connection::open_in_memory().expect("in-memory DB should open");
        ensure_schema(&connection).expect("schema");
        assert!(latest_run(&connection).expect("query").is_none());
    }
}
