pub mod artifacts;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod harness;
pub mod model_client;
pub mod ollama_client;
pub mod prompt;

pub use artifacts::{ModelOutcome, ResultRow, ResultSink, RunReport};
pub use cli::Cli;
pub use dataset::{load_examples, Example};
pub use error::{RunnerError, RunnerResult};
pub use harness::{clip_output, EvalSettings, Harness};
pub use model_client::ModelClient;
pub use ollama_client::OllamaClient;
pub use prompt::{build_prompt, PromptBuilder};
