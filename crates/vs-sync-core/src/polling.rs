use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};
use vs_api_types::{PollingCommand, PollingReply};

use crate::config::SyncConfig;
use crate::vault::Vault;
use crate::{SyncOutcome, Synchronizers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCycle {
    /// A switch, an account change, or another poll was in progress.
    Skipped,
    Completed,
    Failed { rate_limited: bool },
}

/// Timer-driven refresh of the active account.
pub struct Poller {
    vault: Vault,
    syncs: Arc<Synchronizers>,
    config: SyncConfig,
    in_progress: AtomicBool,
}

struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Poller {
    pub fn new(vault: Vault, syncs: Arc<Synchronizers>, config: SyncConfig) -> Self {
        Self {
            vault,
            syncs,
            config,
            in_progress: AtomicBool::new(false),
        }
    }

    /// One polling cycle. Conflicting work is skipped, never queued.
    pub async fn poll_once(&self) -> PollCycle {
        let busy = self
            .vault
            .read(|state| state.is_network_changing || state.changing_connected_account.is_some());
        if busy {
            debug!("poll skipped: network or account change pending");
            return PollCycle::Skipped;
        }
        if self.in_progress.swap(true, Ordering::SeqCst) {
            debug!("poll skipped: previous poll still running");
            return PollCycle::Skipped;
        }
        let _running = InProgress(&self.in_progress);

        let outcomes = self.syncs.run_all().await;
        let failures: Vec<SyncOutcome> = outcomes.into_iter().filter(|o| o.is_failure()).collect();
        if failures.is_empty() {
            return PollCycle::Completed;
        }
        let rate_limited = failures
            .iter()
            .any(|outcome| matches!(outcome, SyncOutcome::Failed { rate_limited: true }));
        warn!(failures = failures.len(), rate_limited, "poll cycle failed; backing off");
        PollCycle::Failed { rate_limited }
    }

    /// Spawns the polling loop. Polling starts on `startPolling` and halts on
    /// `stopPolling`; a closed command channel leaves the current mode in place.
    /// `ContinuePolling` is sent on `replies` after every cycle that ran.
    pub fn start(
        self: Arc<Self>,
        mut commands: mpsc::Receiver<PollingCommand>,
        replies: Option<mpsc::UnboundedSender<PollingReply>>,
    ) -> PollerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(async move {
            let mut active = false;
            let mut commands_open = true;
            let mut next_poll = Instant::now() + self.config.poll_interval;

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    command = commands.recv(), if commands_open => match command {
                        Some(PollingCommand::StartPolling) => {
                            if !active {
                                info!(interval_secs = self.config.poll_interval.as_secs(), "polling started");
                                active = true;
                                next_poll = Instant::now() + self.config.poll_interval;
                            }
                        }
                        Some(PollingCommand::StopPolling) => {
                            if active {
                                info!("polling stopped");
                            }
                            active = false;
                        }
                        None => {
                            debug!("polling port disconnected");
                            commands_open = false;
                        }
                    },
                    _ = time::sleep_until(next_poll), if active => {
                        let cycle = self.poll_once().await;
                        let delay = match cycle {
                            PollCycle::Failed { .. } => self.config.poll_retry_interval,
                            PollCycle::Completed | PollCycle::Skipped => self.config.poll_interval,
                        };
                        next_poll = Instant::now() + delay;
                        if cycle != PollCycle::Skipped {
                            if let Some(replies) = &replies {
                                let _ = replies.send(PollingReply::ContinuePolling);
                            }
                        }
                    }
                }
            }
        });

        PollerHandle {
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }
}

pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PollerHandle {
    pub async fn shutdown(&self) {
        if self.shutdown.send(true).is_err() {
            return;
        }
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(err) = handle.await {
                debug!(?err, "poller worker exited with error");
            }
        }
    }
}
