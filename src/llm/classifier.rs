//! Classifier client: one prompt in, one trimmed label out.

use std::sync::Arc;

use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, LlmProvider};

/// Sampling temperature for classification calls.
pub const CLASSIFY_TEMPERATURE: f32 = 0.8;

/// Sends classification prompts to a language model.
#[derive(Clone)]
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            temperature: CLASSIFY_TEMPERATURE,
        }
    }

    /// Send `prompt` and return the response with surrounding whitespace removed.
    pub async fn classify(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(model = self.llm.model_name(), "Calling model for classification");
        let request = CompletionRequest::new(prompt).with_temperature(self.temperature);
        let response = self.llm.complete(request).await?;
        debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Classification complete"
        );
        Ok(response.content.trim().to_string())
    }
}
