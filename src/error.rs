//! Error types for mail-triage.

use std::fmt;

/// Top-level error type for a triage run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail store error: {0}")]
    MailStore(#[from] MailStoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

impl Error {
    /// Short name of the component that raised the error, for log fields.
    pub fn component(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::MailStore(_) => "mailstore",
            Self::Llm(_) => "llm",
            Self::Pipeline(_) => "pipeline",
        }
    }
}

/// Configuration-related errors. All of these are raised before any
/// network activity.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("{} configuration errors: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<ConfigError>),
}

impl ConfigError {
    /// Collapse a list of validation errors into one error.
    ///
    /// Returns `None` for an empty list and the error itself for a single one.
    pub fn aggregate(mut errors: Vec<ConfigError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }
}

/// Mail store (IMAP) errors.
#[derive(Debug, thiserror::Error)]
pub enum MailStoreError {
    #[error("Unable to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS setup failed for {host}: {reason}")]
    Tls { host: String, reason: String },

    #[error("Login failed for {username}: {reason}")]
    Auth { username: String, reason: String },

    #[error("Unable to select mailbox {mailbox}: {reason}")]
    Select { mailbox: String, reason: String },

    #[error("Capability query failed: {0}")]
    Capability(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Fetch of uid {uid} failed: {reason}")]
    Fetch { uid: u32, reason: String },

    #[error("Listing folder {folder} failed: {reason}")]
    List { folder: String, reason: String },

    #[error("Invalid folder name {folder}")]
    InvalidFolder { folder: String },

    #[error("Folder {folder} does not exist")]
    FolderMissing { folder: String },

    #[error("Unable to create folder {folder}: {reason}")]
    CreateFolder { folder: String, reason: String },

    #[error("Moving uid {uid} to {folder} failed: {reason}")]
    Move {
        uid: u32,
        folder: String,
        reason: String,
    },

    #[error("Logout failed: {0}")]
    Logout(String),

    #[error("Session already closed")]
    Closed,
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Classifying uid {uid} ({subject:?}) failed: {source}")]
    Classify {
        uid: u32,
        subject: String,
        #[source]
        source: LlmError,
    },

    #[error("Move failed: {0}")]
    Move(#[from] MailStoreError),

    #[error("Blocking task failed: {0}")]
    Worker(String),

    #[error("{} message(s) failed: {}", .0.len(), join_errors(.0))]
    Batch(Vec<PipelineError>),
}

fn join_errors<E: fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_empty_is_none() {
        assert!(ConfigError::aggregate(Vec::new()).is_none());
    }

    #[test]
    fn aggregate_single_is_unwrapped() {
        let err = ConfigError::aggregate(vec![ConfigError::InvalidValue {
            key: "since".into(),
            message: "bad".into(),
        }])
        .unwrap();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn aggregate_many_lists_every_error() {
        let err = ConfigError::aggregate(vec![
            ConfigError::MissingRequired {
                key: "username".into(),
                hint: "pass --username".into(),
            },
            ConfigError::MissingRequired {
                key: "password".into(),
                hint: "pass --password".into(),
            },
        ])
        .unwrap();
        let text = err.to_string();
        assert!(text.starts_with("2 configuration errors"));
        assert!(text.contains("username"));
        assert!(text.contains("password"));
    }

    #[test]
    fn component_names_the_source() {
        assert_eq!(Error::from(MailStoreError::Closed).component(), "mailstore");
        assert_eq!(
            Error::from(PipelineError::Worker("x".into())).component(),
            "pipeline"
        );
    }

    #[test]
    fn batch_error_joins_messages() {
        let err = PipelineError::Batch(vec![
            PipelineError::Worker("a".into()),
            PipelineError::Worker("b".into()),
        ]);
        assert_eq!(
            err.to_string(),
            "2 message(s) failed: Blocking task failed: a; Blocking task failed: b"
        );
    }
}
