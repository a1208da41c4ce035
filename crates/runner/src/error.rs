use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("configuration error: {0}")]
    Config(#[from] anyhow::Error),
    #[error("dataset error: {0}")]
    Dataset(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("result sink error: {0}")]
    Sink(String),
    #[error("{0} model(s) did not finish writing results")]
    Incomplete(usize),
}

pub type RunnerResult<T> = Result<T, RunnerError>;
