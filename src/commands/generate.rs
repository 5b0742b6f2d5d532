use std::time::Instant;

use anyhow::{Result, bail};
use candle_core::{DType, Device};
use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use crate::cli::{DTypeArg, GenerateArgs, VariantSelection};
use crate::dataset::{load_jsonl_dataset, load_pairs};
use crate::inference::candle_model::{
    DeepSeekCompletionModel, GenerationSettings, HubModelSource, select_device,
};
use crate::inference::lora::load_adapter;
use crate::inference::{CompletionModel, Variant, run_queries};
use crate::model::{GenerationCounts, GenerationRunManifest};
use crate::query::Query;
use crate::store::{
    DEFAULT_DB_FILENAME, GenerationRow, RunRow, finish_run, insert_generation, insert_run,
    open_store, unique_run_id,
};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: GenerateArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let started = Instant::now();
    let manifest_dir = args.cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join(DEFAULT_DB_FILENAME));
    let connection = open_store(&db_path)?;
    let run_id = unique_run_id(
        &connection,
        &format!("generate-{}", utc_compact_string(started_ts)),
    )?;

    let (mut queries, source) = load_queries(&args)?;
    if let Some(limit) = args.limit {
        queries.truncate(limit);
    }
    info!(run_id = %run_id, source = %source, queries = queries.len(), "starting generation");

    let variants = selected_variants(args.variant);
    let device = select_device(args.cpu)?;
    let dtype = resolve_dtype(args.dtype, &device);

    let adapter = if variants.contains(&Variant::Finetuned) {
        Some(load_adapter(&args.adapter_path, &device)?)
    } else {
        None
    };

    insert_run(
        &connection,
        &RunRow {
            run_id: run_id.clone(),
            model_id: args.model_id.clone(),
            revision: args.revision.clone(),
            adapter_path: adapter
                .as_ref()
                .map(|_| args.adapter_path.display().to_string()),
            source: source.clone(),
            started_at: started_at.clone(),
            finished_at: None,
        },
    )?;

    let hub_source = HubModelSource {
        model_id: args.model_id.clone(),
        revision: args.revision.clone(),
        hf_home: args.hf_home.clone(),
    };
    let settings = GenerationSettings {
        max_new_tokens: args.max_new_tokens,
    };

    let mut counts = GenerationCounts {
        query_count: queries.len(),
        base_generated: 0,
        finetuned_generated: 0,
    };

    for variant in variants {
        let variant_adapter = match variant {
            Variant::Base => None,
            Variant::Finetuned => adapter.as_ref(),
        };
        let mut model = DeepSeekCompletionModel::load(
            variant.as_str(),
            &hub_source,
            &device,
            dtype,
            variant_adapter,
            settings,
        )?;
        let generated = generate_variant(&connection, &run_id, variant, &mut model, &queries)?;
        match variant {
            Variant::Base => counts.base_generated = generated,
            Variant::Finetuned => counts.finetuned_generated = generated,
        }
    }

    let finished_at = now_utc_string();
    finish_run(&connection, &run_id, &finished_at)?;

    let manifest = GenerationRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: "completed".to_string(),
        started_at,
        updated_at: finished_at,
        model_id: args.model_id.clone(),
        revision: args.revision.clone(),
        adapter_path: adapter
            .as_ref()
            .map(|_| args.adapter_path.display().to_string()),
        source,
        device: format!("{device:?}"),
        dtype: format!("{dtype:?}"),
        max_new_tokens: args.max_new_tokens,
        db_path: db_path.display().to_string(),
        counts,
        duration_ms: started.elapsed().as_millis(),
    };
    let manifest_path = manifest_dir.join(format!("{run_id}.json"));
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote generation run manifest");
    info!(
        run_id = %run_id,
        base_generated = manifest.counts.base_generated,
        finetuned_generated = manifest.counts.finetuned_generated,
        "generation completed"
    );

    Ok(())
}

fn load_queries(args: &GenerateArgs) -> Result<(Vec<Query>, String)> {
    if let Some(pairs_dir) = &args.pairs_dir {
        let queries = load_pairs(pairs_dir, &args.extension)?;
        return Ok((queries, format!("pairs:{}", pairs_dir.display())));
    }

    match &args.dataset {
        Some(dataset) => Ok((
            load_jsonl_dataset(dataset)?,
            format!("dataset:{}", dataset.display()),
        )),
        None => bail!("either --pairs-dir or --dataset is required"),
    }
}

fn selected_variants(selection: VariantSelection) -> Vec<Variant> {
    match selection {
        VariantSelection::Base => vec![Variant::Base],
        VariantSelection::Finetuned => vec![Variant::Finetuned],
        VariantSelection::Both => vec![Variant::Base, Variant::Finetuned],
    }
}

fn resolve_dtype(requested: Option<DTypeArg>, device: &Device) -> DType {
    match requested {
        Some(DTypeArg::F32) => DType::F32,
        Some(DTypeArg::F16) => DType::F16,
        Some(DTypeArg::Bf16) => DType::BF16,
        None if device.is_cpu() => DType::F32,
        None => DType::BF16,
    }
}

fn generate_variant<M: CompletionModel + ?Sized>(
    connection: &Connection,
    run_id: &str,
    variant: Variant,
    model: &mut M,
    queries: &[Query],
) -> Result<usize> {
    run_queries(model, queries, |query, completion| {
        insert_generation(
            connection,
            &GenerationRow {
                run_id: run_id.to_string(),
                variant: variant.as_str().to_string(),
                category: query.category().to_string(),
                query_name: query.name().to_string(),
                prompt: query.inference_input().to_string(),
                reference: query.after().to_string(),
                generated: completion.text,
                duration_ms: i64::try_from(completion.duration_ms).unwrap_or(i64::MAX),
                created_at: now_utc_string(),
            },
        )
    })
}
