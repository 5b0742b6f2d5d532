use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Error as E, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::deepseek2::{DeepSeekV2, DeepSeekV2Config};
use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use super::lora::{LoraAdapter, merge_into};
use super::CompletionModel;

const EOS_TOKEN_CANDIDATES: &[&str] = &["<｜end▁of▁sentence｜>", "</s>", "<|endoftext|>"];

#[derive(Debug, Clone)]
pub struct HubModelSource {
    pub model_id: String,
    pub revision: String,
    pub hf_home: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub max_new_tokens: usize,
}

struct HubFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: Vec<PathBuf>,
}

pub struct DeepSeekCompletionModel {
    label: String,
    model: DeepSeekV2,
    tokenizer: Tokenizer,
    device: Device,
    eos_token_ids: BTreeSet<u32>,
    settings: GenerationSettings,
}

impl DeepSeekCompletionModel {
    pub fn load(
        label: &str,
        source: &HubModelSource,
        device: &Device,
        dtype: DType,
        adapter: Option<&LoraAdapter>,
        settings: GenerationSettings,
    ) -> Result<Self> {
        let files = fetch_hub_files(source)?;

        let raw_config = fs::read(&files.config)
            .with_context(|| format!("failed to read {}", files.config.display()))?;
        let config: DeepSeekV2Config = serde_json::from_slice(&raw_config)
            .with_context(|| format!("failed to parse {}", files.config.display()))?;
        let config_value: serde_json::Value = serde_json::from_slice(&raw_config)
            .with_context(|| format!("failed to parse {}", files.config.display()))?;

        let tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(E::msg)?;
        let eos_token_ids = resolve_eos_token_ids(&config_value, &tokenizer);
        if eos_token_ids.is_empty() {
            warn!(model_id = %source.model_id, "no eos token id found, generation stops only at max_new_tokens");
        }

        let vb = match adapter {
            None => unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, dtype, device)? },
            Some(adapter) => {
                let mut tensors = load_weight_tensors(&files.weights, device)?;
                merge_into(&mut tensors, adapter)?;
                VarBuilder::from_tensors(tensors, dtype, device)
            }
        };
        let model = DeepSeekV2::new(&config, vb)
            .with_context(|| format!("failed to build model {}", source.model_id))?;

        info!(
            variant = label,
            model_id = %source.model_id,
            revision = %source.revision,
            shards = files.weights.len(),
            dtype = ?dtype,
            device = ?device,
            "model loaded"
        );

        Ok(Self {
            label: label.to_string(),
            model,
            tokenizer,
            device: device.clone(),
            eos_token_ids,
            settings,
        })
    }
}

impl CompletionModel for DeepSeekCompletionModel {
    fn label(&self) -> &str {
        &self.label
    }

    fn complete(&mut self, prompt: &str) -> Result<String> {
        self.model.clear_kv_cache();

        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(E::msg)?
            .get_ids()
            .to_vec();
        let prompt_len = tokens.len();
        let mut logits_processor = LogitsProcessor::from_sampling(0, Sampling::ArgMax);
        let mut seqlen_offset = 0usize;

        for index in 0..self.settings.max_new_tokens {
            let context = if index == 0 {
                &tokens[..]
            } else {
                &tokens[tokens.len() - 1..]
            };
            let input = Tensor::new(context, &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, seqlen_offset)?;
            seqlen_offset += context.len();

            let logits = last_position_logits(&logits)?;
            let next_token = logits_processor.sample(&logits)?;
            if self.eos_token_ids.contains(&next_token) {
                break;
            }
            tokens.push(next_token);
        }

        self.tokenizer
            .decode(&tokens[prompt_len..], true)
            .map_err(E::msg)
    }
}

pub fn select_device(cpu: bool) -> Result<Device> {
    if cpu {
        return Ok(Device::Cpu);
    }
    match Device::cuda_if_available(0) {
        Ok(device) => Ok(device),
        Err(err) => {
            warn!(error = %err, "cuda unavailable, falling back to cpu");
            Ok(Device::Cpu)
        }
    }
}

fn fetch_hub_files(source: &HubModelSource) -> Result<HubFiles> {
    let api = ApiBuilder::new()
        .with_cache_dir(source.hf_home.join("hub"))
        .build()
        .context("failed to initialise hugging face hub client")?;
    let repo = api.repo(Repo::with_revision(
        source.model_id.clone(),
        RepoType::Model,
        source.revision.clone(),
    ));

    let config = repo
        .get("config.json")
        .with_context(|| format!("failed to fetch config.json for {}", source.model_id))?;
    let tokenizer = repo
        .get("tokenizer.json")
        .with_context(|| format!("failed to fetch tokenizer.json for {}", source.model_id))?;
    let weights = fetch_weight_files(&repo, &source.model_id)?;

    Ok(HubFiles {
        config,
        tokenizer,
        weights,
    })
}

fn fetch_weight_files(repo: &ApiRepo, model_id: &str) -> Result<Vec<PathBuf>> {
    let index_path = match repo.get("model.safetensors.index.json") {
        Ok(path) => path,
        Err(err) => {
            info!(model_id, error = %err, "no sharded weight index, using model.safetensors");
            let single = repo
                .get("model.safetensors")
                .with_context(|| format!("failed to fetch model.safetensors for {model_id}"))?;
            return Ok(vec![single]);
        }
    };

    let raw = fs::read(&index_path)
        .with_context(|| format!("failed to read {}", index_path.display()))?;
    let index: serde_json::Value = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", index_path.display()))?;
    let shard_names = shard_names_from_index(&index)
        .with_context(|| format!("weight_map missing in {}", index_path.display()))?;

    let mut weights = Vec::with_capacity(shard_names.len());
    for shard in shard_names {
        weights.push(
            repo.get(&shard)
                .with_context(|| format!("failed to fetch {shard} for {model_id}"))?,
        );
    }
    Ok(weights)
}

fn shard_names_from_index(index: &serde_json::Value) -> Option<Vec<String>> {
    let weight_map = index.get("weight_map")?.as_object()?;
    let names = weight_map
        .values()
        .filter_map(|value| value.as_str().map(ToOwned::to_owned))
        .collect::<BTreeSet<String>>();
    Some(names.into_iter().collect())
}

fn load_weight_tensors(paths: &[PathBuf], device: &Device) -> Result<HashMap<String, Tensor>> {
    let mut tensors = HashMap::new();
    for path in paths {
        tensors.extend(load_shard(path, device)?);
    }
    Ok(tensors)
}

fn load_shard(path: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    candle_core::safetensors::load(path, device)
        .with_context(|| format!("failed to load weights {}", path.display()))
}

fn resolve_eos_token_ids(config: &serde_json::Value, tokenizer: &Tokenizer) -> BTreeSet<u32> {
    let mut ids = BTreeSet::new();
    match config.get("eos_token_id") {
        Some(serde_json::Value::Number(number)) => {
            if let Some(id) = number.as_u64().and_then(|id| u32::try_from(id).ok()) {
                ids.insert(id);
            }
        }
        Some(serde_json::Value::Array(values)) => {
            ids.extend(
                values
                    .iter()
                    .filter_map(|value| value.as_u64())
                    .filter_map(|id| u32::try_from(id).ok()),
            );
        }
        _ => {}
    }

    if ids.is_empty() {
        ids.extend(
            EOS_TOKEN_CANDIDATES
                .iter()
                .filter_map(|token| tokenizer.token_to_id(token)),
        );
    }
    ids
}

fn last_position_logits(logits: &Tensor) -> Result<Tensor> {
    let mut logits = logits.squeeze(0)?;
    while logits.rank() > 1 {
        let last = logits.dim(0)? - 1;
        logits = logits.get(last)?;
    }
    Ok(logits.to_dtype(DType::F32)?)
}

#[cfg(test)]
mod tests {
    use candle_core::{Device, Tensor};

    use super::{last_position_logits, shard_names_from_index};

    #[test]
    fn shard_names_are_deduplicated_and_sorted() {
        let index = serde_json::json!({
            "metadata": {"total_size": 10},
            "weight_map": {
                "a.weight": "model-00002-of-00002.safetensors",
                "b.weight": "model-00001-of-00002.safetensors",
                "c.weight": "model-00001-of-00002.safetensors"
            }
        });
        assert_eq!(
            shard_names_from_index(&index),
            Some(vec![
                "model-00001-of-00002.safetensors".to_string(),
                "model-00002-of-00002.safetensors".to_string(),
            ])
        );
        assert_eq!(shard_names_from_index(&serde_json::json!({})), None);
    }

    #[test]
    fn last_position_logits_takes_final_step() {
        let device = Device::Cpu;
        let logits = Tensor::new(&[[[0.0_f32, 1.0], [5.0, 3.0]]], &device).expect("logits");
        let last = last_position_logits(&logits).expect("reduce");
        assert_eq!(last.to_vec1::<f32>().expect("vec"), vec![5.0, 3.0]);

        let flat = Tensor::new(&[[2.0_f32, 4.0]], &device).expect("logits");
        let last = last_position_logits(&flat).expect("reduce");
        assert_eq!(last.to_vec1::<f32>().expect("vec"), vec![2.0, 4.0]);
    }
}
