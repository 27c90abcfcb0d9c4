//! Hosted model access for message classification.
//!
//! One model per run, chosen with `--provider` and `--model`. rig-core does
//! the HTTP work; [`RigAdapter`] narrows it to the single-prompt
//! [`LlmProvider`] seam the [`Classifier`] depends on.

pub mod classifier;
pub mod provider;
mod rig_adapter;

pub use classifier::{CLASSIFY_TEMPERATURE, Classifier};
pub use provider::*;

use std::fmt;
use std::sync::Arc;

use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use rig::providers::{anthropic, openai};
use secrecy::ExposeSecret;
use tracing::info;

use crate::error::LlmError;
use rig_adapter::RigAdapter;

/// Hosted API the classifier talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LlmBackend {
    #[value(name = "openai")]
    OpenAi,
    Anthropic,
}

impl LlmBackend {
    /// Name used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

/// Classifier model selection and credentials.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Build the classifier model for `config`.
///
/// No request is made here, so a bad key surfaces on the first classification.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let backend = config.backend;
    let key = config.api_key.expose_secret();
    let provider = match backend {
        LlmBackend::OpenAi => {
            let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
                openai::Client::new(key).map_err(|e| client_error(backend, e))?;
            adapt(client.completion_model(&config.model), config)
        }
        LlmBackend::Anthropic => {
            let client: rig::client::Client<anthropic::client::AnthropicExt> =
                anthropic::Client::new(key).map_err(|e| client_error(backend, e))?;
            adapt(client.completion_model(&config.model), config)
        }
    };
    info!(provider = backend.name(), model = %config.model, "Classifier model ready");
    Ok(provider)
}

fn adapt<M>(model: M, config: &LlmConfig) -> Arc<dyn LlmProvider>
where
    M: CompletionModel + Send + Sync + 'static,
{
    Arc::new(RigAdapter::new(model, &config.model, config.backend.name()))
}

fn client_error(backend: LlmBackend, e: impl fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: backend.name().to_string(),
        reason: format!("client setup failed: {e}"),
    }
}
