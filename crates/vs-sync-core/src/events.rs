use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;
use vs_api_types::{DappEvent, Network};

pub type ListenerId = u64;

struct Listener {
    id: ListenerId,
    host: Option<String>,
    sender: mpsc::UnboundedSender<DappEvent>,
}

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<Listener>>,
}

/// Fans committed state transitions out to connected dapp listeners.
/// A listener whose channel is closed is dropped on the next send.
#[derive(Clone, Default)]
pub struct EventBroadcaster {
    listeners: Arc<Listeners>,
}

impl EventBroadcaster {
    pub fn subscribe(&self, host: Option<String>) -> (ListenerId, mpsc::UnboundedReceiver<DappEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push(Listener { id, host, sender });
        (id, receiver)
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.entries().retain(|listener| listener.id != id);
    }

    pub fn listener_count(&self) -> usize {
        self.entries().len()
    }

    pub fn connected_hosts(&self) -> Vec<String> {
        self.entries()
            .iter()
            .filter_map(|listener| listener.host.clone())
            .collect()
    }

    pub fn broadcast(&self, event: DappEvent) {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|listener| listener.sender.send(event.clone()).is_ok());
        let dropped = before - entries.len();
        debug!(method = event.method(), listeners = entries.len(), dropped, "dapp event broadcast");
    }

    pub fn chain_changed(&self, network: &Network) {
        self.broadcast(DappEvent::chain_changed(network));
    }

    /// `None` is sent for EVM networks, where dapps read testnet status from the chain id.
    pub fn is_testnet(&self, is_testnet: Option<bool>) {
        self.broadcast(DappEvent::IsTestnet { is_testnet });
    }

    pub fn lock_state_changed(&self, accounts: Vec<String>, is_unlocked: bool) {
        self.broadcast(DappEvent::LockStateChanged { accounts, is_unlocked });
    }

    pub fn accounts_changed(&self, accounts: Vec<String>) {
        self.broadcast(DappEvent::AccountsChanged { accounts });
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<Listener>> {
        self.listeners
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::evm_network;

    #[test]
    fn every_listener_receives_the_event() {
        let events = EventBroadcaster::default();
        let (_, mut first) = events.subscribe(Some("app.example".to_owned()));
        let (_, mut second) = events.subscribe(None);

        events.chain_changed(&evm_network(57));

        let expected = DappEvent::ChainChanged {
            chain_id: "0x39".to_owned(),
            network_version: 57,
        };
        assert_eq!(first.try_recv().unwrap(), expected);
        assert_eq!(second.try_recv().unwrap(), expected);
        assert_eq!(events.connected_hosts(), vec!["app.example".to_owned()]);
    }

    #[test]
    fn closed_listeners_are_dropped() {
        let events = EventBroadcaster::default();
        let (_, receiver) = events.subscribe(None);
        let (_, mut alive) = events.subscribe(None);
        drop(receiver);

        events.lock_state_changed(Vec::new(), false);

        assert_eq!(events.listener_count(), 1);
        assert_eq!(
            alive.try_recv().unwrap(),
            DappEvent::LockStateChanged {
                accounts: Vec::new(),
                is_unlocked: false
            }
        );
    }

    #[test]
    fn unsubscribe_removes_listener() {
        let events = EventBroadcaster::default();
        let (id, _receiver) = events.subscribe(None);
        events.unsubscribe(id);
        assert_eq!(events.listener_count(), 0);
    }
}
