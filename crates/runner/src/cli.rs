use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    artifacts::{ensure_output_dir, write_run_metadata, ModelOutcome},
    config::RunnerConfig,
    dataset::load_examples,
    error::{RunnerError, RunnerResult},
    harness::{EvalSettings, Harness},
    ollama_client::OllamaClient,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Multistep arithmetic benchmark for local Ollama models")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to a YAML/JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Query every configured model on every example and write one CSV per model
    Run(RunArgs),
    /// Print the prompts that would be sent, without calling any model
    Prompt(PromptArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,
    /// Model to evaluate; repeat to evaluate several in order
    #[arg(long = "model")]
    pub models: Vec<String>,
    /// Directory receiving the result CSVs and run_meta.json
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Do not ask models to keep answers under the output limit
    #[arg(long)]
    pub no_limit_hint: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PromptArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Task file with an `examples` array of {input, target}
    #[arg(long)]
    pub dataset: Option<PathBuf>,
    /// Evaluate only the first N examples
    #[arg(long, conflicts_with = "all")]
    pub max_examples: Option<usize>,
    /// Evaluate every example in the dataset
    #[arg(long)]
    pub all: bool,
}

impl SelectionArgs {
    fn apply(&self, config: &mut RunnerConfig) {
        if let Some(dataset) = &self.dataset {
            config.dataset = dataset.clone();
        }
        if self.all {
            config.max_examples = None;
        } else if let Some(max) = self.max_examples {
            config.max_examples = Some(max);
        }
    }
}

impl RunArgs {
    fn apply(&self, config: &mut RunnerConfig) {
        self.selection.apply(config);
        if !self.models.is_empty() {
            config.models = self.models.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if self.no_limit_hint {
            config.limit_hint = false;
        }
    }
}

impl Cli {
    pub async fn run(self) -> RunnerResult<()> {
        let mut config = RunnerConfig::load(self.config.as_deref())?;

        match self.command {
            Commands::Run(args) => {
                args.apply(&mut config);
                config.validate()?;
                run(&config).await
            }
            Commands::Prompt(args) => {
                args.selection.apply(&mut config);
                print_prompts(&config)
            }
        }
    }
}

pub async fn run(config: &RunnerConfig) -> RunnerResult<()> {
    let examples = load_examples(&config.dataset, config.max_examples)?;
    tracing::info!(
        dataset = %config.dataset.display(),
        examples = examples.len(),
        "loaded examples"
    );

    ensure_output_dir(&config.output_dir)?;
    let client = OllamaClient::from_config(config)?;
    let harness = Harness::new(client, EvalSettings::from_config(config));

    let report = harness.run(&examples).await;
    let meta_path = write_run_metadata(&config.output_dir, &config.dataset, &report)?;

    for outcome in &report.outcomes {
        match outcome {
            ModelOutcome::Completed {
                model,
                path,
                rows_written,
                failures,
                clipped,
            } => tracing::info!(
                %model,
                path = %path.display(),
                rows_written,
                failures,
                clipped,
                "model finished"
            ),
            ModelOutcome::Aborted {
                model,
                path,
                rows_written,
                error,
            } => tracing::error!(
                %model,
                path = %path.display(),
                rows_written,
                %error,
                "model aborted"
            ),
        }
    }
    tracing::info!(path = %meta_path.display(), "run summary written");

    match report.aborted() {
        0 => Ok(()),
        n => Err(RunnerError::Incomplete(n)),
    }
}

fn print_prompts(config: &RunnerConfig) -> RunnerResult<()> {
    let examples = load_examples(&config.dataset, config.max_examples)?;
    let settings = EvalSettings::from_config(config);
    let builder = settings.prompt_builder();

    for (idx, example) in examples.iter().enumerate() {
        println!("--- example {} (expected: {}) ---", idx + 1, example.target);
        println!("{}", builder.build(example));
    }
    Ok(())
}
