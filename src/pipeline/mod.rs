//! Triage pipeline.
//!
//! Every fetched message flows through:
//! 1. `MessageProcessor::process()`: LLM classification + priority rules
//! 2. `Destination::for_category()`: exactly "junk" → spam, else archive
//! 3. `runner::apply_moves()`: moves applied once the fetch stream drains
//!
//! `runner::run()` wires these to a `MailStore` for one batch.

pub mod notify;
pub mod processor;
pub mod rules;
pub mod runner;
pub mod types;
