use async_trait::async_trait;

use crate::error::RunnerResult;

/// Chat backend seen by the harness: one user prompt in, the reply text out.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn chat(&self, model: &str, prompt: &str) -> RunnerResult<String>;
}

#[async_trait]
impl<T: ModelClient + ?Sized> ModelClient for &T {
    async fn chat(&self, model: &str, prompt: &str) -> RunnerResult<String> {
        (**self).chat(model, prompt).await
    }
}
