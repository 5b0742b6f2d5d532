use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "fixeval",
    version,
    about = "Code-repair model evaluation: pair loading, generation, scoring and comparison"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Pairs(PairsArgs),
    Export(ExportArgs),
    Generate(GenerateArgs),
    Score(ScoreArgs),
    Compare(CompareArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PairsArgs {
    #[arg(long, default_value = ".cache/fixeval")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub pairs_dir: PathBuf,

    #[arg(long, default_value = "py")]
    pub extension: String,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Training,
    Dataset,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Dataset => "dataset",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[arg(long)]
    pub pairs_dir: PathBuf,

    #[arg(long, default_value = "py")]
    pub extension: String,

    #[arg(long)]
    pub output: PathBuf,

    #[arg(long, value_enum, default_value_t = ExportFormat::Training)]
    pub format: ExportFormat,

    #[arg(long)]
    pub test_fraction: Option<f64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum VariantSelection {
    Base,
    Finetuned,
    Both,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DTypeArg {
    F32,
    F16,
    Bf16,
}

#[derive(Args, Debug, Clone)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["pairs_dir", "dataset"])
))]
pub struct GenerateArgs {
    #[arg(long, default_value = ".cache/fixeval")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub pairs_dir: Option<PathBuf>,

    #[arg(long, default_value = "py")]
    pub extension: String,

    #[arg(long)]
    pub dataset: Option<PathBuf>,

    #[arg(long, default_value = "deepseek-ai/DeepSeek-Coder-V2-Lite-Base")]
    pub model_id: String,

    #[arg(long, default_value = "main")]
    pub revision: String,

    #[arg(long, default_value = "lora_adapter")]
    pub adapter_path: PathBuf,

    #[arg(long, value_enum, default_value_t = VariantSelection::Both)]
    pub variant: VariantSelection,

    #[arg(long, default_value_t = 512)]
    pub max_new_tokens: usize,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub cpu: bool,

    #[arg(long, value_enum)]
    pub dtype: Option<DTypeArg>,

    #[arg(long, env = "HF_HOME", default_value = "models")]
    pub hf_home: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    #[arg(long, default_value = ".cache/fixeval")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub run_id: Option<String>,

    #[arg(long, default_value = "analysis_results.txt")]
    pub results_log: PathBuf,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    #[arg(long, default_value = "analysis_results.txt")]
    pub results_log: PathBuf,

    #[arg(long, default_value = "codebleu")]
    pub sort_metric: String,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/fixeval")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands, VariantSelection};

    #[test]
    fn generate_defaults_to_both_variants_and_greedy_settings() {
        let cli = Cli::try_parse_from(["fixeval", "generate", "--dataset", "data.jsonl"])
            .expect("minimal generate parses");
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate command");
        };
        assert_eq!(args.variant, VariantSelection::Both);
        assert_eq!(args.max_new_tokens, 512);
    }

    #[test]
    fn generate_has_no_sampling_seed() {
        let result =
            Cli::try_parse_from(["fixeval", "generate", "--dataset", "d.jsonl", "--seed", "7"]);
        assert!(result.is_err());
    }
}
