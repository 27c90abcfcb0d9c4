//! Message processor: classifies fetched messages and decides folders.
//!
//! Flow per message:
//! 1. Build a plain-text prompt from the envelope
//! 2. LLM classification → free-text category
//! 3. Priority rules → at most one notice
//! 4. Decide: exactly "junk" → spam folder, anything else → archive folder
//!
//! Failures are collected per message; the batch keeps going.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{Instrument, Span, error, info, info_span};

use crate::config::{DEFAULT_BATCH_LIMIT, RoutingConfig};
use crate::error::PipelineError;
use crate::llm::Classifier;
use crate::mailstore::FetchedMessage;
use crate::pipeline::notify::Notifier;
use crate::pipeline::rules::PriorityRules;
use crate::pipeline::types::{BatchReport, Destination, PriorityNotice, RoutingDecision};

/// Instruction line placed before the envelope in every prompt.
const CLASSIFY_INSTRUCTION: &str = "Classify the following email with a single lowercase word \
     such as \"junk\", \"personal\", \"work\", or \"newsletter\". Reply with the word only.";

/// Turns fetched messages into routing decisions.
pub struct MessageProcessor {
    classifier: Classifier,
    rules: PriorityRules,
    routing: RoutingConfig,
    notifier: Arc<dyn Notifier>,
    batch_limit: usize,
    span: Span,
}

impl MessageProcessor {
    pub fn new(
        classifier: Classifier,
        rules: PriorityRules,
        routing: RoutingConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            classifier,
            rules,
            routing,
            notifier,
            batch_limit: DEFAULT_BATCH_LIMIT,
            span: info_span!("processor", component = "processor"),
        }
    }

    /// Cap on messages taken from one channel.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Span that scopes every event this processor emits.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Folder name for a destination.
    pub fn folder_for(&self, destination: Destination) -> &str {
        match destination {
            Destination::Spam => &self.routing.spam_folder,
            Destination::Archive => &self.routing.archive_folder,
        }
    }

    /// Classify one message and decide where it goes.
    ///
    /// Priority rules run even when classification fails, so a notice never
    /// depends on the category.
    pub async fn process(&self, message: &FetchedMessage) -> Result<RoutingDecision, PipelineError> {
        let prompt = build_prompt(message);
        let classified = self.classifier.classify(&prompt).await;

        let priority = self.rules.evaluate(message);
        if let Some(reason) = &priority {
            self.notifier.notify(&PriorityNotice {
                uid: message.uid,
                subject: message.subject().to_string(),
                from: message.envelope.from.clone(),
                reason: reason.clone(),
            });
        }

        let category = classified.map_err(|source| PipelineError::Classify {
            uid: message.uid,
            subject: message.subject().to_string(),
            source,
        })?;
        info!(
            uid = message.uid,
            subject = %message.subject(),
            category = %category,
            "Categorized email"
        );

        let destination = Destination::for_category(&category);
        Ok(RoutingDecision {
            uid: message.uid,
            seq: message.seq,
            subject: message.subject().to_string(),
            category,
            destination,
            folder: self.folder_for(destination).to_string(),
            priority,
        })
    }

    /// Drain `rx` in delivery order.
    ///
    /// Stops when the channel closes, `batch_limit` messages have been
    /// taken, or `shutdown` is set (checked between messages). Dropping the
    /// receiver on return tells the producer to stop.
    pub async fn process_batch(
        &self,
        mut rx: mpsc::Receiver<FetchedMessage>,
        shutdown: &AtomicBool,
    ) -> BatchReport {
        let span = self.span.clone();
        async move {
            let mut report = BatchReport::default();

            while report.processed < self.batch_limit {
                if shutdown.load(Ordering::Relaxed) {
                    info!(processed = report.processed, "Shutdown requested, stopping batch");
                    report.cancelled = true;
                    break;
                }

                let Some(message) = rx.recv().await else {
                    break;
                };
                info!(uid = message.uid, subject = %message.subject(), "Email received");

                match self.process(&message).await {
                    Ok(decision) => report.decisions.push(decision),
                    Err(e) => {
                        error!(uid = message.uid, error = %e, "Failed to process email");
                        report.failures.push(e);
                    }
                }
                report.processed += 1;
            }

            info!(
                processed = report.processed,
                decided = report.decisions.len(),
                failed = report.failures.len(),
                "Batch processing complete"
            );
            report
        }
        .instrument(span)
        .await
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the classification prompt for a message.
pub fn build_prompt(message: &FetchedMessage) -> String {
    let envelope = &message.envelope;
    let date = envelope
        .date
        .map(|d| d.to_rfc2822())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "{CLASSIFY_INSTRUCTION}\n\nSubject: {}\nFrom: {}\nDate: {}\n",
        envelope.subject,
        envelope.from.join(", "),
        date
    )
}
