//! Model-major evaluation loop.
//!
//! Every model runs over the whole example set before the next one starts, so the
//! inference backend only ever needs one model resident. Rows are buffered and
//! appended to the model's CSV every `batch_size` examples and after the last one.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    artifacts::{
        output_file_name, FileStore, ModelOutcome, ResultRow, ResultSink, ResultStore, RunReport,
    },
    config::RunnerConfig,
    dataset::Example,
    error::RunnerResult,
    model_client::ModelClient,
    prompt::PromptBuilder,
};

pub const UNAVAILABLE_OUTPUT: &str = "Error: Model unavailable";
pub const CLIPPED_PREFIX: &str = "CLIPPED ";

#[derive(Debug, Clone)]
pub struct EvalSettings {
    pub models: Vec<String>,
    pub preamble: String,
    pub output_dir: PathBuf,
    pub results_suffix: String,
    pub output_limit: usize,
    pub batch_size: usize,
    pub limit_hint: bool,
}

impl EvalSettings {
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            models: config.models.clone(),
            preamble: config.preamble.clone(),
            output_dir: config.output_dir.clone(),
            results_suffix: config.results_suffix.clone(),
            output_limit: config.output_limit,
            batch_size: config.batch_size,
            limit_hint: config.limit_hint,
        }
    }

    pub fn output_path(&self, model: &str) -> PathBuf {
        self.output_dir.join(output_file_name(model, &self.results_suffix))
    }

    pub fn prompt_builder(&self) -> PromptBuilder {
        let builder = PromptBuilder::new(&self.preamble);
        if self.limit_hint {
            builder.limit_hint(self.output_limit)
        } else {
            builder
        }
    }
}

/// Keeps the last `limit` characters of an overlong answer, where the final result
/// usually sits. Returns whether clipping happened.
pub fn clip_output(output: String, limit: usize) -> (String, bool) {
    let len = output.chars().count();
    if len <= limit {
        return (output, false);
    }
    let tail: String = output.chars().skip(len - limit).collect();
    (format!("{CLIPPED_PREFIX}{tail}"), true)
}

pub struct Harness<C, S = FileStore> {
    client: C,
    store: S,
    settings: EvalSettings,
}

impl<C: ModelClient> Harness<C> {
    pub fn new(client: C, settings: EvalSettings) -> Self {
        Self::with_store(client, FileStore, settings)
    }
}

impl<C: ModelClient, S: ResultStore> Harness<C, S> {
    pub fn with_store(client: C, store: S, settings: EvalSettings) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    pub async fn run(&self, examples: &[Example]) -> RunReport {
        info!(
            models = self.settings.models.len(),
            examples = examples.len(),
            "evaluating models"
        );
        let started_at = Utc::now();

        let mut outcomes = Vec::with_capacity(self.settings.models.len());
        for model in &self.settings.models {
            info!(%model, "evaluating model");
            outcomes.push(self.run_model(model, examples).await);
        }

        info!("All results saved.");
        RunReport {
            started_at,
            finished_at: Utc::now(),
            total_examples: examples.len(),
            outcomes,
        }
    }

    async fn run_model(&self, model: &str, examples: &[Example]) -> ModelOutcome {
        let path = self.settings.output_path(model);
        let mut sink = match self.store.open(&path, model) {
            Ok(sink) => sink,
            Err(err) => {
                error!(%model, error = %err, "cannot open result file; skipping model");
                return ModelOutcome::Aborted {
                    model: model.to_string(),
                    path,
                    rows_written: 0,
                    error: err.to_string(),
                };
            }
        };

        let prompts = self.settings.prompt_builder();
        let batch_size = self.settings.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size.min(examples.len()));
        let mut failures = 0usize;
        let mut clipped = 0usize;

        for (idx, example) in examples.iter().enumerate() {
            let processed = idx + 1;
            let prompt = prompts.build(example);

            let output = match self.client.chat(model, &prompt).await {
                Ok(text) => {
                    let (text, was_clipped) = clip_output(text, self.settings.output_limit);
                    if was_clipped {
                        clipped += 1;
                    }
                    text
                }
                Err(err) => {
                    warn!(%model, example = processed, error = %err, "model call failed");
                    failures += 1;
                    UNAVAILABLE_OUTPUT.to_string()
                }
            };

            batch.push(ResultRow {
                input: example.input.clone(),
                expected: example.target.clone(),
                output,
            });

            if processed % batch_size == 0 || processed == examples.len() {
                if let Err(err) = self.flush(&mut sink, &mut batch) {
                    error!(%model, error = %err, "writing results failed; skipping rest of model");
                    return ModelOutcome::Aborted {
                        model: model.to_string(),
                        path,
                        rows_written: sink.rows_written(),
                        error: err.to_string(),
                    };
                }
                info!(
                    "Saved {processed} examples for model {model} to {}",
                    sink.path().display()
                );
            }
        }

        ModelOutcome::Completed {
            model: model.to_string(),
            path,
            rows_written: sink.rows_written(),
            failures,
            clipped,
        }
    }

    fn flush(
        &self,
        sink: &mut ResultSink<S::Writer>,
        batch: &mut Vec<ResultRow>,
    ) -> RunnerResult<()> {
        sink.append_rows(batch)?;
        batch.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Write},
        path::Path,
        sync::Mutex,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::error::RunnerError;

    struct Echo {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ModelClient for Echo {
        async fn chat(&self, model: &str, prompt: &str) -> RunnerResult<String> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), prompt.to_string()));
            Ok(format!("{model} says hi"))
        }
    }

    struct AlwaysDown;

    #[async_trait]
    impl ModelClient for AlwaysDown {
        async fn chat(&self, model: &str, _prompt: &str) -> RunnerResult<String> {
            Err(RunnerError::Llm(format!("model {model} not found")))
        }
    }

    fn settings(dir: &std::path::Path, models: &[&str]) -> EvalSettings {
        EvalSettings {
            models: models.iter().map(|m| m.to_string()).collect(),
            preamble: "Solve.".into(),
            output_dir: dir.to_path_buf(),
            results_suffix: "test".into(),
            output_limit: 30_000,
            batch_size: 20,
            limit_hint: false,
        }
    }

    #[test]
    fn short_output_is_untouched() {
        let text = "x".repeat(30_000);
        let (out, clipped) = clip_output(text.clone(), 30_000);
        assert!(!clipped);
        assert_eq!(out, text);
    }

    #[test]
    fn long_output_keeps_tail() {
        let text = format!("{}{}", "a".repeat(5), "b".repeat(30_000));
        let (out, clipped) = clip_output(text, 30_000);
        assert!(clipped);
        assert_eq!(out, format!("CLIPPED {}", "b".repeat(30_000)));
    }

    #[test]
    fn clipping_counts_characters_not_bytes() {
        let (out, clipped) = clip_output("ééé→1".to_string(), 3);
        assert!(clipped);
        assert_eq!(out, "CLIPPED é→1");
        assert_eq!(clip_output("ééé".to_string(), 3), ("ééé".to_string(), false));
    }

    #[tokio::test]
    async fn prompts_carry_limit_hint_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = settings(dir.path(), &["m"]);
        cfg.limit_hint = true;
        let client = Echo {
            calls: Mutex::new(Vec::new()),
        };

        Harness::new(&client, cfg).run(&[Example::new("1+1", "2")]).await;

        let calls = client.calls.lock().unwrap();
        assert_eq!(calls[0].1, "Solve.\n\nQ:1+1\nA: (Limit output to 30,000 characters)");
    }

    #[tokio::test]
    async fn failures_become_sentinel_rows() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(AlwaysDown, settings(dir.path(), &["m"]));
        let examples = vec![Example::new("1+1", "2"), Example::new("2+2", "4")];

        let report = harness.run(&examples).await;

        match &report.outcomes[0] {
            ModelOutcome::Completed {
                rows_written,
                failures,
                ..
            } => {
                assert_eq!(*rows_written, 2);
                assert_eq!(*failures, 2);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let contents = std::fs::read_to_string(dir.path().join("m_test_results.csv")).unwrap();
        assert_eq!(
            contents,
            "input,expected,m output\n1+1,2,Error: Model unavailable\n2+2,4,Error: Model unavailable\n"
        );
    }

    #[tokio::test]
    async fn sentinel_survives_a_tiny_output_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = settings(dir.path(), &["m"]);
        cfg.output_limit = 10;

        let report = Harness::new(AlwaysDown, cfg)
            .run(&[Example::new("1+1", "2")])
            .await;

        match &report.outcomes[0] {
            ModelOutcome::Completed {
                failures, clipped, ..
            } => {
                assert_eq!(*failures, 1);
                assert_eq!(*clipped, 0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let contents = std::fs::read_to_string(dir.path().join("m_test_results.csv")).unwrap();
        assert_eq!(contents, "input,expected,m output\n1+1,2,Error: Model unavailable\n");
    }

    /// In-memory writer that starts failing once it has been flushed `fail_after` times.
    struct FlakyWriter {
        buf: Vec<u8>,
        flushes: usize,
        fail_after: Option<usize>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.buf.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            match self.fail_after {
                Some(limit) if self.flushes > limit => {
                    Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
                }
                _ => Ok(()),
            }
        }
    }

    struct FlakyStore {
        failing_model: &'static str,
    }

    impl ResultStore for FlakyStore {
        type Writer = FlakyWriter;

        fn open(&self, path: &Path, model: &str) -> RunnerResult<ResultSink<FlakyWriter>> {
            // Header flush and first batch succeed, the second batch fails.
            let fail_after = (model == self.failing_model).then_some(2);
            let writer = FlakyWriter {
                buf: Vec::new(),
                flushes: 0,
                fail_after,
            };
            ResultSink::from_writer(path, writer, model)
        }
    }

    #[tokio::test]
    async fn write_failure_mid_model_aborts_only_that_model() {
        let dir = tempfile::tempdir().unwrap();
        let examples: Vec<Example> = (1..=45)
            .map(|i| Example::new(format!("{i}+{i}"), (2 * i).to_string()))
            .collect();
        let client = Echo {
            calls: Mutex::new(Vec::new()),
        };
        let store = FlakyStore { failing_model: "a" };

        let report = Harness::with_store(&client, store, settings(dir.path(), &["a", "b"]))
            .run(&examples)
            .await;

        match &report.outcomes[0] {
            ModelOutcome::Aborted {
                model,
                rows_written,
                ..
            } => {
                assert_eq!(model, "a");
                assert_eq!(*rows_written, 20);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        match &report.outcomes[1] {
            ModelOutcome::Completed {
                model,
                rows_written,
                ..
            } => {
                assert_eq!(model, "b");
                assert_eq!(*rows_written, 45);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(report.aborted(), 1);

        let calls = client.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|(model, _)| model == "a").count(), 40);
        assert_eq!(calls.iter().filter(|(model, _)| model == "b").count(), 45);
    }

    #[tokio::test]
    async fn unopenable_output_skips_only_that_model() {
        let dir = tempfile::tempdir().unwrap();
        // A directory squatting on the first model's file name makes File::create fail.
        std::fs::create_dir(dir.path().join("bad_test_results.csv")).unwrap();
        let client = Echo {
            calls: Mutex::new(Vec::new()),
        };

        let report = Harness::new(&client, settings(dir.path(), &["bad", "good"]))
            .run(&[Example::new("1+1", "2")])
            .await;

        assert!(report.outcomes[0].is_aborted());
        assert!(!report.outcomes[1].is_aborted());
        assert_eq!(report.aborted(), 1);
        let calls = client.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "good");
    }

    #[tokio::test]
    async fn empty_example_set_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let report = Harness::new(AlwaysDown, settings(dir.path(), &["m"])).run(&[]).await;

        assert_eq!(report.total_examples, 0);
        let contents = std::fs::read_to_string(dir.path().join("m_test_results.csv")).unwrap();
        assert_eq!(contents, "input,expected,m output\n");
    }
}
