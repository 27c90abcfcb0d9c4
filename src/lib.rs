//! Mail triage: classify mailbox messages with an LLM and route them to folders.

pub mod config;
pub mod error;
pub mod llm;
pub mod mailstore;
pub mod pipeline;
