//! Mail-store client.
//!
//! The `MailStore` trait is the seam between the pipeline and the IMAP
//! session. All methods are blocking; the runner calls them from
//! `spawn_blocking` and hands the store back and forth by value, so exactly
//! one step owns the session at a time.

pub mod filter;
pub mod parse;
pub mod session;
pub mod types;

pub use filter::SearchFilter;
pub use session::{ImapStore, MailStream};
pub use types::{Envelope, FetchedMessage};

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::MailStoreError;

/// Blocking operations on a selected mailbox.
pub trait MailStore: Send + 'static {
    /// UIDs matching `filter`, ascending.
    fn search(&mut self, filter: &SearchFilter) -> Result<Vec<u32>, MailStoreError>;

    /// Fetch envelope and body for one UID. `Ok(None)` if the message vanished.
    fn fetch_one(&mut self, uid: u32) -> Result<Option<FetchedMessage>, MailStoreError>;

    /// Make sure `folder` exists, creating it when `create` is set.
    fn ensure_folder(&mut self, folder: &str, create: bool) -> Result<(), MailStoreError>;

    /// Move one message to `folder`.
    fn move_message(&mut self, uid: u32, folder: &str) -> Result<(), MailStoreError>;

    /// End the session. Calling it twice is a no-op.
    fn logout(&mut self) -> Result<(), MailStoreError>;
}

/// Producer side of the fetch channel.
///
/// Fetches `uids` one at a time and sends each message with a blocking send.
/// Stops early when the receiver is dropped (the consumer hit its cap) or
/// when `shutdown` is set. Returns how many messages were sent.
pub fn stream_messages<S: MailStore + ?Sized>(
    store: &mut S,
    uids: &[u32],
    tx: &mpsc::Sender<FetchedMessage>,
    shutdown: &AtomicBool,
) -> Result<usize, MailStoreError> {
    let mut sent = 0;
    for &uid in uids {
        if shutdown.load(Ordering::Relaxed) {
            info!(sent, "Fetch stopped by shutdown request");
            break;
        }

        let Some(message) = store.fetch_one(uid)? else {
            warn!(uid, "Message disappeared before fetch, skipping");
            continue;
        };

        if tx.blocking_send(message).is_err() {
            debug!(sent, "Consumer closed the channel, stopping fetch");
            break;
        }
        sent += 1;
    }
    Ok(sent)
}
