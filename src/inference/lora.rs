use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use candle_core::{DType, Device, Tensor};
use serde::Deserialize;
use tracing::{debug, info};

pub const ADAPTER_CONFIG_FILENAME: &str = "adapter_config.json";
pub const ADAPTER_WEIGHTS_FILENAME: &str = "adapter_model.safetensors";

const PEFT_PREFIX: &str = "base_model.model.";

#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    pub r: usize,
    pub lora_alpha: f64,
    #[serde(default)]
    pub use_rslora: bool,
    #[serde(default)]
    pub base_model_name_or_path: Option<String>,
    #[serde(default)]
    pub target_modules: serde_json::Value,
}

impl AdapterConfig {
    pub fn scaling(&self) -> f64 {
        if self.use_rslora {
            self.lora_alpha / (self.r as f64).sqrt()
        } else {
            self.lora_alpha / self.r as f64
        }
    }
}

#[derive(Debug)]
pub struct LoraAdapter {
    pub config: AdapterConfig,
    pub tensors: HashMap<String, Tensor>,
}

pub fn load_adapter(adapter_dir: &Path, device: &Device) -> Result<LoraAdapter> {
    let config_path = adapter_dir.join(ADAPTER_CONFIG_FILENAME);
    let raw = fs::read(&config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let config: AdapterConfig = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    if config.r == 0 {
        bail!("adapter rank must be positive in {}", config_path.display());
    }

    let weights_path = adapter_dir.join(ADAPTER_WEIGHTS_FILENAME);
    if !weights_path.is_file() {
        bail!(
            "adapter weights not found at {} (only safetensors adapters are supported)",
            weights_path.display()
        );
    }
    let tensors = candle_core::safetensors::load(&weights_path, device)
        .with_context(|| format!("failed to load {}", weights_path.display()))?;

    info!(
        adapter = %adapter_dir.display(),
        rank = config.r,
        alpha = config.lora_alpha,
        rslora = config.use_rslora,
        base_model = %config.base_model_name_or_path.clone().unwrap_or_default(),
        target_modules = %config.target_modules,
        tensors = tensors.len(),
        "loaded lora adapter"
    );

    Ok(LoraAdapter { config, tensors })
}

/// Folds every `lora_A`/`lora_B` pair into its base weight:
/// `W += scaling * B.matmul(A)`, computed in f32 and cast back to the base dtype.
pub fn merge_into(base: &mut HashMap<String, Tensor>, adapter: &LoraAdapter) -> Result<usize> {
    let scaling = adapter.config.scaling();
    let mut merged = 0usize;

    let mut modules = adapter
        .tensors
        .keys()
        .filter_map(|key| lora_a_module(key).map(|module| (module, key.clone())))
        .collect::<Vec<_>>();
    modules.sort();

    for (module, lora_a_key) in modules {
        let lora_b_key = lora_a_key.replacen(".lora_A.", ".lora_B.", 1);
        let lora_a = &adapter.tensors[&lora_a_key];
        let lora_b = adapter
            .tensors
            .get(&lora_b_key)
            .with_context(|| format!("adapter has {lora_a_key} but no {lora_b_key}"))?;

        let base_key = format!("{module}.weight");
        let weight = base
            .get(&base_key)
            .with_context(|| format!("base model has no weight {base_key} for adapter module"))?;

        let delta = lora_b
            .to_dtype(DType::F32)?
            .matmul(&lora_a.to_dtype(DType::F32)?)?
            .affine(scaling, 0.0)?;
        if delta.dims() != weight.dims() {
            bail!(
                "lora delta shape {:?} does not match {base_key} shape {:?}",
                delta.dims(),
                weight.dims()
            );
        }

        let updated = weight
            .to_dtype(DType::F32)?
            .add(&delta)?
            .to_dtype(weight.dtype())?;
        debug!(module = %module, "merged lora delta");
        base.insert(base_key, updated);
        merged += 1;
    }

    if merged == 0 {
        bail!("adapter contains no lora_A/lora_B tensor pairs");
    }

    info!(modules = merged, scaling, "merged lora adapter into base weights");
    Ok(merged)
}

fn lora_a_module(key: &str) -> Option<String> {
    let key = key.strip_prefix(PEFT_PREFIX).unwrap_or(key);
    key.strip_suffix(".lora_A.weight")
        .or_else(|| key.strip_suffix(".lora_A.default.weight"))
        .map(ToOwned::to_owned)
}
