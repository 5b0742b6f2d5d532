use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairEntry {
    pub category: String,
    pub name: String,
    pub before_file: String,
    pub after_file: String,
    pub before_sha256: String,
    pub after_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub extension: String,
    pub pair_count: usize,
    pub categories: Vec<String>,
    pub pairs: Vec<PairEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationCounts {
    pub query_count: usize,
    pub base_generated: usize,
    pub finetuned_generated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub model_id: String,
    pub revision: String,
    pub adapter_path: Option<String>,
    pub source: String,
    pub device: String,
    pub dtype: String,
    pub max_new_tokens: usize,
    pub db_path: String,
    pub counts: GenerationCounts,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryScore {
    pub variant: String,
    pub category: String,
    pub samples: usize,
    pub metrics: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub manifest_version: u32,
    pub generated_at: String,
    pub run_id: String,
    pub results_log: String,
    pub scores: Vec<CategoryScore>,
}
