//! Run orchestration: search, fetch, classify, move, logout.
//!
//! The mail store is blocking and single-owner. Every step that touches it
//! runs on the blocking pool and hands the store back by value. Fetching
//! and classification overlap through a bounded channel sized to the batch
//! limit, and moves are applied only after the channel has drained so the
//! fetch sequence is never disturbed by expunges.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{Instrument, error, info, info_span, warn};

use crate::config::RunSettings;
use crate::error::{Error, PipelineError};
use crate::mailstore::{MailStore, stream_messages};
use crate::pipeline::processor::MessageProcessor;
use crate::pipeline::types::{RoutingDecision, RunSummary};

/// Result of applying routing decisions to the store.
#[derive(Debug, Default)]
pub struct MoveOutcome {
    pub moved: usize,
    pub failures: Vec<PipelineError>,
    pub cancelled: bool,
}

/// Execute one triage run against `store`.
///
/// Errors that stop the run (search or fetch failure, a crashed blocking
/// task) are returned as `Err`. Per-message classification and move
/// failures are collected in [`RunSummary::failures`]. The store is logged
/// out on every path that still owns it.
pub async fn run<S: MailStore>(
    store: S,
    processor: Arc<MessageProcessor>,
    settings: RunSettings,
    shutdown: Arc<AtomicBool>,
) -> Result<RunSummary, Error> {
    let span = info_span!("runner", component = "runner", dry_run = settings.dry_run);
    run_inner(store, processor, settings, shutdown)
        .instrument(span)
        .await
}

async fn run_inner<S: MailStore>(
    store: S,
    processor: Arc<MessageProcessor>,
    settings: RunSettings,
    shutdown: Arc<AtomicBool>,
) -> Result<RunSummary, Error> {
    let mut summary = RunSummary {
        dry_run: settings.dry_run,
        ..RunSummary::default()
    };

    // ── Search ──
    let filter = settings.filter.clone();
    let (store, searched) = with_store(store, move |s| s.search(&filter)).await?;
    let mut uids = match searched {
        Ok(uids) => uids,
        Err(e) => {
            close(store).await;
            return Err(e.into());
        }
    };

    summary.matched = uids.len();
    if uids.is_empty() {
        info!("No emails found");
        close(store).await;
        return Ok(summary);
    }

    let limit = settings.batch_limit.max(1);
    if uids.len() > limit {
        info!(matched = uids.len(), limit, "Capping batch");
        uids.truncate(limit);
    }

    // ── Fetch + classify ──
    let (tx, rx) = mpsc::channel(limit);
    let producer_shutdown = shutdown.clone();
    let producer = tokio::task::spawn_blocking(move || {
        let mut store = store;
        let fetched = stream_messages(&mut store, &uids, &tx, &producer_shutdown);
        (store, fetched)
    });

    let report = processor.process_batch(rx, &shutdown).await;
    let (store, fetched) = producer.await.map_err(worker_error)?;

    summary.processed = report.processed;
    summary.decisions = report.decisions;
    summary.failures = report.failures;
    summary.cancelled = report.cancelled;

    if let Err(e) = fetched {
        error!(error = %e, "Fetch failed, aborting run");
        close(store).await;
        return Err(e.into());
    }

    // ── Move ──
    let store = if settings.dry_run {
        info!(decisions = summary.decisions.len(), "Dry run, skipping moves");
        store
    } else {
        let decisions = summary.decisions.clone();
        let create = settings.create_folders;
        let move_shutdown = shutdown.clone();
        let (store, outcome) = with_store(store, move |s| {
            apply_moves(s, &decisions, create, &move_shutdown)
        })
        .await?;
        summary.moved = outcome.moved;
        summary.failures.extend(outcome.failures);
        summary.cancelled |= outcome.cancelled;
        store
    };

    close(store).await;

    info!(
        matched = summary.matched,
        processed = summary.processed,
        moved = summary.moved,
        failed = summary.failures.len(),
        cancelled = summary.cancelled,
        "Run complete"
    );
    Ok(summary)
}

/// Apply decisions in order.
///
/// Each destination folder is checked once before its first move. A folder
/// that cannot be ensured fails once and its messages are left in place.
pub fn apply_moves<S: MailStore + ?Sized>(
    store: &mut S,
    decisions: &[RoutingDecision],
    create_folders: bool,
    shutdown: &AtomicBool,
) -> MoveOutcome {
    let mut outcome = MoveOutcome::default();
    let mut folders: HashMap<&str, bool> = HashMap::new();

    for decision in decisions {
        if shutdown.load(Ordering::Relaxed) {
            info!(moved = outcome.moved, "Shutdown requested, stopping moves");
            outcome.cancelled = true;
            break;
        }

        let folder = decision.folder.as_str();
        let ready = match folders.get(folder) {
            Some(&ready) => ready,
            None => {
                let ready = match store.ensure_folder(folder, create_folders) {
                    Ok(()) => true,
                    Err(e) => {
                        error!(folder, error = %e, "Destination folder unavailable");
                        outcome.failures.push(e.into());
                        false
                    }
                };
                folders.insert(folder, ready);
                ready
            }
        };
        if !ready {
            warn!(uid = decision.uid, folder, "Leaving message in place");
            continue;
        }

        match store.move_message(decision.uid, folder) {
            Ok(()) => outcome.moved += 1,
            Err(e) => {
                error!(uid = decision.uid, folder, error = %e, "Move failed");
                outcome.failures.push(e.into());
            }
        }
    }
    outcome
}

/// Run `f` against the store on the blocking pool and get the store back.
async fn with_store<S, T, F>(store: S, f: F) -> Result<(S, T), PipelineError>
where
    S: MailStore,
    T: Send + 'static,
    F: FnOnce(&mut S) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut store = store;
        let out = f(&mut store);
        (store, out)
    })
    .await
    .map_err(worker_error)
}

/// Log out, warning on failure. Never fails the run.
async fn close<S: MailStore>(store: S) {
    match with_store(store, |s| s.logout()).await {
        Ok((_, Ok(()))) => {}
        Ok((_, Err(e))) => warn!(error = %e, "Logout failed"),
        Err(e) => warn!(error = %e, "Logout task failed"),
    }
}

fn worker_error(e: tokio::task::JoinError) -> PipelineError {
    PipelineError::Worker(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MailStoreError;
    use crate::mailstore::{FetchedMessage, SearchFilter};
    use crate::pipeline::types::Destination;

    #[derive(Default)]
    struct RecordingStore {
        existing: Vec<String>,
        ensured: Vec<String>,
        moves: Vec<(u32, String)>,
        fail_move: Option<u32>,
    }

    impl MailStore for RecordingStore {
        fn search(&mut self, _filter: &SearchFilter) -> Result<Vec<u32>, MailStoreError> {
            Ok(Vec::new())
        }

        fn fetch_one(&mut self, _uid: u32) -> Result<Option<FetchedMessage>, MailStoreError> {
            Ok(None)
        }

        fn ensure_folder(&mut self, folder: &str, create: bool) -> Result<(), MailStoreError> {
            self.ensured.push(folder.to_string());
            if self.existing.iter().any(|f| f == folder) {
                return Ok(());
            }
            if create {
                self.existing.push(folder.to_string());
                Ok(())
            } else {
                Err(MailStoreError::FolderMissing {
                    folder: folder.to_string(),
                })
            }
        }

        fn move_message(&mut self, uid: u32, folder: &str) -> Result<(), MailStoreError> {
            if self.fail_move == Some(uid) {
                return Err(MailStoreError::Move {
                    uid,
                    folder: folder.to_string(),
                    reason: "NO [TRYCREATE]".into(),
                });
            }
            self.moves.push((uid, folder.to_string()));
            Ok(())
        }

        fn logout(&mut self) -> Result<(), MailStoreError> {
            Ok(())
        }
    }

    fn decision(uid: u32, folder: &str) -> RoutingDecision {
        RoutingDecision {
            uid,
            seq: uid,
            subject: format!("message {uid}"),
            category: "work".into(),
            destination: if folder == "Spam" {
                Destination::Spam
            } else {
                Destination::Archive
            },
            folder: folder.into(),
            priority: None,
        }
    }

    fn store_with(folders: &[&str]) -> RecordingStore {
        RecordingStore {
            existing: folders.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn moves_in_decision_order() {
        let mut store = store_with(&["Spam", "Archive"]);
        let decisions = [decision(3, "Spam"), decision(1, "Archive"), decision(2, "Spam")];
        let outcome = apply_moves(&mut store, &decisions, false, &AtomicBool::new(false));

        assert_eq!(outcome.moved, 3);
        assert!(outcome.failures.is_empty());
        assert_eq!(
            store.moves,
            vec![
                (3, "Spam".to_string()),
                (1, "Archive".to_string()),
                (2, "Spam".to_string())
            ]
        );
    }

    #[test]
    fn each_folder_is_checked_once() {
        let mut store = store_with(&["Spam", "Archive"]);
        let decisions = [decision(1, "Spam"), decision(2, "Spam"), decision(3, "Archive")];
        apply_moves(&mut store, &decisions, false, &AtomicBool::new(false));
        assert_eq!(store.ensured, vec!["Spam", "Archive"]);
    }

    #[test]
    fn missing_folder_fails_once_and_keeps_messages() {
        let mut store = store_with(&["Archive"]);
        let decisions = [decision(1, "Spam"), decision(2, "Spam"), decision(3, "Archive")];
        let outcome = apply_moves(&mut store, &decisions, false, &AtomicBool::new(false));

        assert_eq!(outcome.moved, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            outcome.failures[0],
            PipelineError::Move(MailStoreError::FolderMissing { .. })
        ));
        assert_eq!(store.moves, vec![(3, "Archive".to_string())]);
    }

    #[test]
    fn missing_folder_created_on_request() {
        let mut store = store_with(&[]);
        let decisions = [decision(1, "Spam")];
        let outcome = apply_moves(&mut store, &decisions, true, &AtomicBool::new(false));
        assert_eq!(outcome.moved, 1);
        assert!(store.existing.contains(&"Spam".to_string()));
    }

    #[test]
    fn failed_move_does_not_stop_the_rest() {
        let mut store = RecordingStore {
            fail_move: Some(2),
            ..store_with(&["Archive"])
        };
        let decisions = [decision(1, "Archive"), decision(2, "Archive"), decision(3, "Archive")];
        let outcome = apply_moves(&mut store, &decisions, false, &AtomicBool::new(false));
        assert_eq!(outcome.moved, 2);
        assert_eq!(outcome.failures.len(), 1);
    }

    #[test]
    fn shutdown_stops_moves() {
        let mut store = store_with(&["Archive"]);
        let outcome = apply_moves(
            &mut store,
            &[decision(1, "Archive")],
            false,
            &AtomicBool::new(true),
        );
        assert!(outcome.cancelled);
        assert_eq!(outcome.moved, 0);
        assert!(store.moves.is_empty());
    }
}
