//! Search filter and its IMAP query rendering.

use chrono::NaiveDate;
use serde::Serialize;

/// Criteria evaluated by the mail store to select messages.
///
/// Set criteria combine as a logical AND. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchFilter {
    /// Only messages without the `\Seen` flag.
    pub unread_only: bool,
    /// Only messages received on or after this date.
    pub since: Option<NaiveDate>,
}

impl SearchFilter {
    /// Build a filter from CLI flags.
    ///
    /// `since` wins over `today` when both are given.
    pub fn from_flags(
        unread: bool,
        today: bool,
        since: Option<NaiveDate>,
        current_date: NaiveDate,
    ) -> Self {
        let since = since.or(today.then_some(current_date));
        Self {
            unread_only: unread,
            since,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.unread_only && self.since.is_none()
    }

    /// Render as an IMAP `SEARCH` key list.
    pub fn to_imap_query(&self) -> String {
        if self.is_empty() {
            return "ALL".to_string();
        }
        let mut keys = Vec::new();
        if self.unread_only {
            keys.push("UNSEEN".to_string());
        }
        if let Some(date) = self.since {
            keys.push(format!("SINCE {}", date.format("%-d-%b-%Y")));
        }
        keys.join(" ")
    }
}
