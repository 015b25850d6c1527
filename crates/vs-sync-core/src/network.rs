//! Network switch orchestration.
//!
//! A switch moves `Idle -> Switching -> Committed | Restored | Cancelled | Failed`.
//! Asking for the committed network while a switch is pending restores it. Starting a
//! switch cancels the previous one and every in-flight synchronizer before the
//! vault enters the switching state. Only the newest switch may commit or emit;
//! the emit lock serialises "cancel and begin" against "commit and emit" so a
//! superseded switch can never slip an event out after its successor started.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};
use vs_api_types::{AccountType, ChainFamily, Network};
use vs_keyring::{Keyring, SignerNetworkSwitch};

use crate::Synchronizers;
use crate::cancellable::{CancelHandle, TaskSlot, cancellable};
use crate::error::{SyncError, SyncResult};
use crate::events::EventBroadcaster;
use crate::vault::Vault;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// Target was already active and nothing was pending.
    Unchanged,
    Committed,
    /// A pending switch was abandoned in favour of the committed network.
    Restored,
    /// A newer switch superseded this one.
    Cancelled,
}

impl SwitchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SwitchOutcome::Unchanged => "unchanged",
            SwitchOutcome::Committed => "committed",
            SwitchOutcome::Restored => "restored",
            SwitchOutcome::Cancelled => "cancelled",
        }
    }
}

/// Whether an account of `account_type` can follow a move from `current` to `target`.
/// A hardware signer active on a UTXO network cannot switch at all, and one on an
/// EVM network can only move to another EVM network.
pub fn signer_can_follow(account_type: AccountType, current: &Network, target: &Network) -> bool {
    if !account_type.is_hardware() {
        return true;
    }
    match (current.kind, target.kind) {
        (ChainFamily::Utxo, _) | (ChainFamily::Evm, ChainFamily::Utxo) => false,
        (ChainFamily::Evm, ChainFamily::Evm) => true,
    }
}

pub struct NetworkSwitcher {
    vault: Vault,
    keyring: Arc<dyn Keyring>,
    syncs: Arc<Synchronizers>,
    events: EventBroadcaster,
    slot: TaskSlot,
    emit_lock: Mutex<()>,
    signer_timeout: Option<Duration>,
}

/// Clears the switching state if the caller stops awaiting a switch that is
/// still the live one.
struct PendingSwitch<'a> {
    switcher: &'a NetworkSwitcher,
    handle: CancelHandle,
    armed: bool,
}

impl PendingSwitch<'_> {
    fn settle(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingSwitch<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let _emit = self.switcher.emit_guard();
        if self.handle.is_cancelled() {
            return;
        }
        self.handle.cancel();
        warn!("network switch abandoned before it settled");
        self.switcher.restore_committed();
    }
}

impl NetworkSwitcher {
    pub fn new(
        vault: Vault,
        keyring: Arc<dyn Keyring>,
        syncs: Arc<Synchronizers>,
        events: EventBroadcaster,
        signer_timeout: Option<Duration>,
    ) -> Self {
        Self {
            vault,
            keyring,
            syncs,
            events,
            slot: TaskSlot::new("network-switch"),
            emit_lock: Mutex::new(()),
            signer_timeout,
        }
    }

    /// Switches to `network`. The most recently started switch always wins:
    /// asking for the committed network while another switch is pending still
    /// supersedes it, re-pointing the signer without announcing a chain change.
    pub async fn switch_network(&self, network: Network) -> SyncResult<SwitchOutcome> {
        let (task, current) = {
            let _emit = self.emit_guard();
            let (current, changing, active_account) = self.vault.read(|state| {
                (
                    state.active_network.clone(),
                    state.is_network_changing,
                    state.active_account,
                )
            });
            let restoring = current.is_same_network(&network);
            if restoring && !changing {
                debug!(chain_id = network.chain_id, "switch target already active");
                return Ok(SwitchOutcome::Unchanged);
            }
            if !restoring && !signer_can_follow(active_account.account_type, &current, &network) {
                return Err(SyncError::IncompatibleSigner {
                    account: active_account,
                    family: network.kind,
                    chain_id: network.chain_id,
                });
            }

            let task = cancellable(|token| {
                let network = network.clone();
                async move {
                    let signed = self.call_signer(&network).await;

                    let _emit = self.emit_guard();
                    if token.is_cancelled() {
                        return Ok(SwitchOutcome::Cancelled);
                    }
                    match signed {
                        Ok(switch) => {
                            if !self.vault.commit_network_change(&token, &network, &switch.wallet) {
                                return Ok(SwitchOutcome::Cancelled);
                            }
                            self.syncs.spawn_all();
                            if restoring {
                                info!(chain_id = network.chain_id, "pending switch abandoned; network kept");
                                return Ok(SwitchOutcome::Restored);
                            }
                            info!(chain_id = network.chain_id, family = %network.kind, "network switch committed");
                            self.announce(&network);
                            Ok(SwitchOutcome::Committed)
                        }
                        Err(err) => {
                            warn!(chain_id = network.chain_id, error = %err, "network switch failed");
                            self.vault.fail_network_change();
                            let still_active = self.vault.read(|state| state.active_network.clone());
                            self.announce(&still_active);
                            Err(err)
                        }
                    }
                }
            });

            self.slot.install(task.handle());
            self.syncs.cancel_all();
            self.vault.begin_network_change();
            (task, current)
        };
        debug!(from = current.chain_id, to = network.chain_id, "network switch started");

        let pending = PendingSwitch {
            switcher: self,
            handle: task.handle(),
            armed: true,
        };
        let joined = task.join().await;
        pending.settle();

        match joined {
            Ok(result) => result,
            Err(_) => {
                debug!(chain_id = network.chain_id, "network switch superseded");
                Ok(SwitchOutcome::Cancelled)
            }
        }
    }

    /// Cancels the in-flight switch, if any, and returns the vault to the
    /// committed network. Returns `false` when nothing was pending.
    pub fn cancel(&self) -> bool {
        let _emit = self.emit_guard();
        let cancelled = self.slot.cancel();
        let changing = self.vault.read(|state| state.is_network_changing);
        if cancelled && changing {
            info!("pending network switch cancelled");
            self.restore_committed();
            return true;
        }
        false
    }

    /// Leaves the switching state on the still-committed network. Callers hold
    /// the emit lock; no chain change is announced since none happened.
    fn restore_committed(&self) {
        self.vault.abort_network_change();
        if tokio::runtime::Handle::try_current().is_ok() {
            self.syncs.spawn_all();
        }
    }

    fn announce(&self, network: &Network) {
        self.events.chain_changed(network);
        let is_testnet = network
            .kind
            .is_bitcoin_based()
            .then(|| self.keyring.is_testnet(network));
        self.events.is_testnet(is_testnet);
    }

    async fn call_signer(&self, network: &Network) -> SyncResult<SignerNetworkSwitch> {
        let call = self.keyring.set_signer_network(network);
        let result = match self.signer_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                SyncError::NetworkSwitchFailed(format!("signer did not answer within {}s", limit.as_secs()))
            })?,
            None => call.await,
        };
        let switch = result.map_err(|err| SyncError::NetworkSwitchFailed(format!("{err:#}")))?;
        if !switch.success {
            return Err(SyncError::NetworkSwitchFailed("signer rejected the network".to_owned()));
        }
        Ok(switch)
    }

    fn emit_guard(&self) -> MutexGuard<'_, ()> {
        self.emit_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
