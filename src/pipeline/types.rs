//! Shared types for the triage pipeline.

use serde::Serialize;

use crate::error::PipelineError;

/// The only category label that routes to the spam folder. Matched exactly.
pub const JUNK_CATEGORY: &str = "junk";

// ── Destination ─────────────────────────────────────────────────────

/// Where a message goes after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Spam,
    Archive,
}

impl Destination {
    /// `Spam` for exactly `"junk"`, `Archive` for anything else.
    pub fn for_category(category: &str) -> Self {
        if category == JUNK_CATEGORY {
            Self::Spam
        } else {
            Self::Archive
        }
    }
}

// ── Priority ────────────────────────────────────────────────────────

/// Why a message was flagged for the user's attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriorityReason {
    /// A sender address contained this configured string.
    Sender { matched: String },
    /// The subject contained this configured keyword.
    Keyword { matched: String },
}

/// A notification emitted for a priority message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityNotice {
    pub uid: u32,
    pub subject: String,
    pub from: Vec<String>,
    pub reason: PriorityReason,
}

impl PriorityNotice {
    /// Human-readable one-liner.
    pub fn message(&self) -> String {
        match self.reason {
            PriorityReason::Sender { .. } => {
                format!("Priority email from: {}", self.from.join(", "))
            }
            PriorityReason::Keyword { .. } => {
                format!("Email with important keyword received: {}", self.subject)
            }
        }
    }
}

// ── Decision ────────────────────────────────────────────────────────

/// Routing decision for one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub uid: u32,
    pub seq: u32,
    pub subject: String,
    pub category: String,
    pub destination: Destination,
    /// Concrete folder name for `destination`.
    pub folder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<PriorityReason>,
}

// ── Batch report ────────────────────────────────────────────────────

/// Outcome of draining one fetch channel.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Messages taken from the channel (including failures).
    pub processed: usize,
    pub decisions: Vec<RoutingDecision>,
    pub failures: Vec<PipelineError>,
    /// Processing stopped because shutdown was requested.
    pub cancelled: bool,
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// UIDs matched by the search, before the batch cap.
    pub matched: usize,
    pub processed: usize,
    pub decisions: Vec<RoutingDecision>,
    pub moved: usize,
    pub failures: Vec<PipelineError>,
    pub cancelled: bool,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn collected per-message failures into one error.
    pub fn into_result(self) -> Result<Self, PipelineError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(PipelineError::Batch(self.failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn junk_routes_to_spam() {
        assert_eq!(Destination::for_category("junk"), Destination::Spam);
    }

    #[test]
    fn junk_match_is_case_sensitive_and_exact() {
        assert_eq!(Destination::for_category("Junk"), Destination::Archive);
        assert_eq!(Destination::for_category("JUNK"), Destination::Archive);
        assert_eq!(Destination::for_category("junk mail"), Destination::Archive);
        assert_eq!(Destination::for_category(""), Destination::Archive);
    }

    #[test]
    fn notice_message_names_sender_or_subject() {
        let mut notice = PriorityNotice {
            uid: 1,
            subject: "URGENT: call me".into(),
            from: vec!["a@x.com".into(), "b@x.com".into()],
            reason: PriorityReason::Sender {
                matched: "a@x.com".into(),
            },
        };
        assert_eq!(notice.message(), "Priority email from: a@x.com, b@x.com");

        notice.reason = PriorityReason::Keyword {
            matched: "urgent".into(),
        };
        assert_eq!(
            notice.message(),
            "Email with important keyword received: URGENT: call me"
        );
    }

    #[test]
    fn decision_serializes_without_empty_priority() {
        let decision = RoutingDecision {
            uid: 9,
            seq: 2,
            subject: "Hi".into(),
            category: "personal".into(),
            destination: Destination::Archive,
            folder: "Archive".into(),
            priority: None,
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["destination"], "archive");
        assert!(json.get("priority").is_none());
    }

    #[test]
    fn summary_with_failures_becomes_batch_error() {
        let summary = RunSummary {
            failures: vec![PipelineError::Worker("x".into())],
            ..Default::default()
        };
        assert!(!summary.is_clean());
        assert!(matches!(
            summary.into_result(),
            Err(PipelineError::Batch(errors)) if errors.len() == 1
        ));
    }
}
