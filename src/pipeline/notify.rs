//! Notification sink for priority messages.

use std::sync::Mutex;

use tracing::warn;

use crate::pipeline::types::PriorityNotice;

/// Receives priority notices from the processor.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &PriorityNotice);
}

/// Emits notices as structured `warn` events.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &PriorityNotice) {
        warn!(
            uid = notice.uid,
            subject = %notice.subject,
            reason = ?notice.reason,
            "{}",
            notice.message()
        );
    }
}

/// Keeps every notice in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<PriorityNotice>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<PriorityNotice> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notice: &PriorityNotice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice.clone());
        }
    }
}
