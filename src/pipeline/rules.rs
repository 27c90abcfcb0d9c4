//! Priority rules: sender substrings and subject keywords.
//!
//! Sender rules are checked first. Keyword rules only fire when no sender
//! rule matched, so a message yields at most one priority reason.

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::mailstore::FetchedMessage;
use crate::pipeline::types::PriorityReason;

/// A subject keyword with its compiled case-insensitive matcher.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub keyword: String,
    regex: Regex,
}

impl KeywordRule {
    pub fn new(keyword: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(&regex::escape(keyword))
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            keyword: keyword.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, subject: &str) -> bool {
        self.regex.is_match(subject)
    }
}

/// Priority rules evaluated for every message.
#[derive(Debug, Clone, Default)]
pub struct PriorityRules {
    /// Case-sensitive substrings matched against each sender address.
    senders: Vec<String>,
    keywords: Vec<KeywordRule>,
}

impl PriorityRules {
    /// Build rules from configured senders and keywords.
    pub fn new(senders: &[String], keywords: &[String]) -> Result<Self, regex::Error> {
        let keywords = keywords
            .iter()
            .map(|k| KeywordRule::new(k))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            senders: senders.to_vec(),
            keywords,
        })
    }

    /// Rules that never match.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The first sender pattern contained in any sender address.
    pub fn matching_sender(&self, from: &[String]) -> Option<&str> {
        from.iter().find_map(|addr| {
            self.senders
                .iter()
                .find(|pattern| addr.contains(pattern.as_str()))
                .map(String::as_str)
        })
    }

    /// The first keyword contained in `subject`, ignoring case.
    pub fn matching_keyword(&self, subject: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|rule| rule.is_match(subject))
            .map(|rule| rule.keyword.as_str())
    }

    /// Evaluate a message. Sender match wins over keyword match.
    pub fn evaluate(&self, message: &FetchedMessage) -> Option<PriorityReason> {
        if let Some(matched) = self.matching_sender(&message.envelope.from) {
            debug!(uid = message.uid, matched, "Sender matched priority rule");
            return Some(PriorityReason::Sender {
                matched: matched.to_string(),
            });
        }
        if let Some(matched) = self.matching_keyword(message.subject()) {
            debug!(uid = message.uid, matched, "Subject matched keyword rule");
            return Some(PriorityReason::Keyword {
                matched: matched.to_string(),
            });
        }
        None
    }
}
