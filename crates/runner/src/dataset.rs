use std::{fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{RunnerError, RunnerResult};

/// One arithmetic word problem and its expected answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub input: String,
    pub target: String,
}

impl Example {
    pub fn new(input: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskFile {
    examples: Vec<Example>,
}

/// Loads `{"examples": [...]}` from `path`, keeping at most `max_count` entries.
pub fn load_examples(path: impl AsRef<Path>, max_count: Option<usize>) -> RunnerResult<Vec<Example>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| {
        RunnerError::Dataset(format!("unable to open examples at {}: {err}", path.display()))
    })?;
    read_examples(BufReader::new(file), max_count).map_err(|err| match err {
        RunnerError::Dataset(msg) => RunnerError::Dataset(format!("{}: {msg}", path.display())),
        other => other,
    })
}

pub fn read_examples<R: std::io::Read>(reader: R, max_count: Option<usize>) -> RunnerResult<Vec<Example>> {
    let task: TaskFile = serde_json::from_reader(reader)
        .map_err(|err| RunnerError::Dataset(format!("malformed examples file: {err}")))?;

    let mut examples = task.examples;
    if let Some(max) = max_count {
        examples.truncate(max);
    }
    Ok(examples)
}
