use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use url::Url;

use crate::{
    artifacts::output_file_name, ollama_client::DEFAULT_OLLAMA_URL, prompt::DEFAULT_PREAMBLE,
};

pub const DEFAULT_DATASET: &str = "multistep_arithmetic_two.json";
pub const DEFAULT_MAX_EXAMPLES: usize = 249;
pub const DEFAULT_OUTPUT_LIMIT: usize = 30_000;
pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_RESULTS_SUFFIX: &str = "multistep";
pub const DEFAULT_MODELS: [&str; 5] = [
    "gemma3:4b",
    "deepseek-r1:1.5b",
    "deepseek-r1:8b",
    "llama3.2:1b",
    "llama3.1:8b",
];

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub dataset: PathBuf,
    pub models: Vec<String>,
    pub max_examples: Option<usize>,
    pub preamble: String,
    pub output_dir: PathBuf,
    pub results_suffix: String,
    pub output_limit: usize,
    pub batch_size: usize,
    pub limit_hint: bool,
    pub ollama_base_url: Url,
    pub request_timeout: Option<Duration>,
}

impl RunnerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Same as [`RunnerConfig::load`] with environment lookups routed through `env`.
    pub fn load_with_env(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file_cfg = if let Some(path) = path {
            Self::read_file(path)?
        } else {
            FileConfig::default()
        };

        let dataset = env("ARITHBENCH_DATASET")
            .map(PathBuf::from)
            .unwrap_or(file_cfg.dataset);

        let models = match env("ARITHBENCH_MODELS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|model| !model.is_empty())
                .map(str::to_string)
                .collect(),
            None => file_cfg.models,
        };

        let max_examples = match env("ARITHBENCH_MAX_EXAMPLES") {
            Some(value) if value.eq_ignore_ascii_case("all") => None,
            Some(value) => Some(
                value
                    .parse::<usize>()
                    .with_context(|| format!("invalid ARITHBENCH_MAX_EXAMPLES value {value:?}"))?,
            ),
            None => file_cfg.max_examples,
        };

        let preamble = match &file_cfg.preamble_file {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("unable to read preamble file at {}", path.display()))?,
            None => file_cfg.preamble.unwrap_or_else(|| DEFAULT_PREAMBLE.to_string()),
        };

        let output_dir = env("ARITHBENCH_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(file_cfg.output_dir);

        let base_url = env("OLLAMA_HOST")
            .or(file_cfg.ollama.base_url)
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        let ollama_base_url = parse_base_url(&base_url)?;

        let config = Self {
            dataset,
            models,
            max_examples,
            preamble,
            output_dir,
            results_suffix: file_cfg.results_suffix,
            output_limit: file_cfg.output_limit,
            batch_size: file_cfg.batch_size,
            limit_hint: file_cfg.limit_hint,
            ollama_base_url,
            request_timeout: file_cfg.ollama.timeout_secs.map(Duration::from_secs),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            bail!("at least one model must be configured");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.output_limit == 0 {
            bail!("output_limit must be at least 1");
        }

        let mut files: HashMap<String, &str> = HashMap::new();
        for model in &self.models {
            let file = output_file_name(model, &self.results_suffix);
            if let Some(previous) = files.insert(file.clone(), model) {
                bail!("models {previous:?} and {model:?} would both write to {file}");
            }
        }
        Ok(())
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file at {}", path.display()))?;
        if path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
            .unwrap_or(false)
        {
            let cfg: FileConfig = serde_yaml::from_str(&contents)
                .with_context(|| format!("invalid YAML config at {}", path.display()))?;
            Ok(cfg)
        } else {
            let cfg: FileConfig = serde_json::from_str(&contents)
                .with_context(|| format!("invalid JSON config at {}", path.display()))?;
            Ok(cfg)
        }
    }
}

/// Accepts `host:port` the way `OLLAMA_HOST` is often written.
fn parse_base_url(raw: &str) -> Result<Url> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    Url::parse(&candidate).with_context(|| format!("invalid Ollama base URL {raw:?}"))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct FileConfig {
    dataset: PathBuf,
    models: Vec<String>,
    max_examples: Option<usize>,
    preamble: Option<String>,
    preamble_file: Option<PathBuf>,
    output_dir: PathBuf,
    results_suffix: String,
    output_limit: usize,
    batch_size: usize,
    limit_hint: bool,
    ollama: OllamaSection,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from(DEFAULT_DATASET),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            max_examples: Some(DEFAULT_MAX_EXAMPLES),
            preamble: None,
            preamble_file: None,
            output_dir: PathBuf::from("."),
            results_suffix: DEFAULT_RESULTS_SUFFIX.to_string(),
            output_limit: DEFAULT_OUTPUT_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            limit_hint: true,
            ollama: OllamaSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct OllamaSection {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}
