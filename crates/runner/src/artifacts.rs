use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RunnerError, RunnerResult};

pub const RUN_META_FILE: &str = "run_meta.json";

/// One model's raw answer to one example, in CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub input: String,
    pub expected: String,
    pub output: String,
}

/// `deepseek-r1:1.5b` + `multistep` -> `deepseek-r1_1.5b_multistep_results.csv`
pub fn output_file_name(model: &str, suffix: &str) -> String {
    let sanitized = model.replace([':', '/', '\\', ' ', '\t', '\n'], "_");
    format!("{sanitized}_{suffix}_results.csv")
}

/// Append-only CSV for a single model's results.
pub struct ResultSink<W: Write = File> {
    path: PathBuf,
    writer: csv::Writer<W>,
    rows_written: usize,
}

impl ResultSink<File> {
    /// Creates (or truncates) `path` and writes the header row.
    pub fn create(path: impl Into<PathBuf>, model: &str) -> RunnerResult<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|err| {
            RunnerError::Sink(format!("unable to create {}: {err}", path.display()))
        })?;
        Self::from_writer(path, file, model)
    }
}

impl<W: Write> ResultSink<W> {
    /// Writes the header row to `writer`; `path` is only used for reporting.
    pub fn from_writer(path: impl Into<PathBuf>, writer: W, model: &str) -> RunnerResult<Self> {
        let mut writer = csv::Writer::from_writer(writer);
        let output_column = format!("{model} output");
        writer.write_record(["input", "expected", output_column.as_str()])?;
        writer.flush()?;

        Ok(Self {
            path: path.into(),
            writer,
            rows_written: 0,
        })
    }

    pub fn append_rows(&mut self, rows: &[ResultRow]) -> RunnerResult<()> {
        for row in rows {
            self.writer
                .write_record([&row.input, &row.expected, &row.output])?;
        }
        self.writer.flush()?;
        self.rows_written += rows.len();
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

/// Where per-model result sinks come from.
pub trait ResultStore {
    type Writer: Write;

    fn open(&self, path: &Path, model: &str) -> RunnerResult<ResultSink<Self::Writer>>;
}

/// Result files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStore;

impl ResultStore for FileStore {
    type Writer = File;

    fn open(&self, path: &Path, model: &str) -> RunnerResult<ResultSink<File>> {
        ResultSink::create(path, model)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Completed {
        model: String,
        path: PathBuf,
        rows_written: usize,
        failures: usize,
        clipped: usize,
    },
    Aborted {
        model: String,
        path: PathBuf,
        rows_written: usize,
        error: String,
    },
}

impl ModelOutcome {
    pub fn model(&self) -> &str {
        match self {
            Self::Completed { model, .. } | Self::Aborted { model, .. } => model,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_examples: usize,
    pub outcomes: Vec<ModelOutcome>,
}

impl RunReport {
    pub fn aborted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_aborted()).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub dataset: PathBuf,
    #[serde(flatten)]
    pub report: RunReport,
}

pub fn write_run_metadata(dir: &Path, dataset: &Path, report: &RunReport) -> RunnerResult<PathBuf> {
    let path = dir.join(RUN_META_FILE);
    let metadata = RunMetadata {
        dataset: dataset.to_path_buf(),
        report: report.clone(),
    };
    let file = File::create(&path).map_err(|err| {
        RunnerError::Sink(format!("unable to write run metadata at {}: {err}", path.display()))
    })?;
    serde_json::to_writer_pretty(file, &metadata)?;
    Ok(path)
}

pub fn ensure_output_dir(dir: &Path) -> RunnerResult<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("unable to create output directory at {}", dir.display()))?;
    Ok(())
}
