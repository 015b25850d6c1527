//! In-crate fakes for the provider and keyring seams.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, watch};
use vs_api_types::{
    Account, AccountKeys, AccountRef, AccountType, ChainFamily, EvmTransaction, Network, NetworkRegistry,
    TransactionBatch, UtxoTransaction,
};
use vs_chain_client::{AssetBatch, ChainProvider, ProviderError, ProviderRegistry};
use vs_keyring::{Keyring, SignerNetworkSwitch};

use crate::vault::{Vault, VaultState};

pub fn utxo_network(chain_id: u64) -> Network {
    Network {
        chain_id,
        url: format!("https://blockbook-{chain_id}.example"),
        label: format!("UTXO {chain_id}"),
        currency: "sys".to_owned(),
        kind: ChainFamily::Utxo,
        explorer: None,
        api_url: None,
        slip44: Some(57),
        default: false,
    }
}

pub fn evm_network(chain_id: u64) -> Network {
    Network {
        chain_id,
        url: format!("https://rpc-{chain_id}.example"),
        label: format!("EVM {chain_id}"),
        currency: "eth".to_owned(),
        kind: ChainFamily::Evm,
        explorer: None,
        api_url: None,
        slip44: None,
        default: false,
    }
}

pub fn account(id: u32) -> Account {
    Account::new(
        AccountRef::new(AccountType::HdAccount, id),
        format!("Account {}", id + 1),
        format!("0xaddr-{id}"),
        format!("xpub-{id}"),
    )
}

pub fn hardware_account(account_type: AccountType, id: u32) -> Account {
    Account::new(
        AccountRef::new(account_type, id),
        format!("{account_type:?} {id}"),
        format!("0xhw-{id}"),
        format!("xpub-hw-{id}"),
    )
}

pub fn vault_with(active: Network, accounts: Vec<Account>) -> Vault {
    let mut registry = NetworkRegistry::default();
    for network in [utxo_network(57), evm_network(1), evm_network(137), active.clone()] {
        registry.insert(network);
    }
    let mut state = VaultState::new(registry, active);
    for account in accounts {
        state.insert_account(account);
    }
    Vault::new(state)
}

pub fn providers_with(providers: Vec<Arc<FakeProvider>>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::default();
    for provider in providers {
        registry.register(provider);
    }
    registry
}

pub fn utxo_tx(txid: &str, confirmations: u64, block_time: u64) -> UtxoTransaction {
    UtxoTransaction {
        txid: txid.to_owned(),
        confirmations,
        block_time,
        block_height: None,
        value: "1000".to_owned(),
        fees: None,
    }
}

pub fn evm_tx(hash: &str, confirmations: u64, timestamp: u64) -> EvmTransaction {
    EvmTransaction {
        hash: hash.to_owned(),
        from: "0xaddr-0".to_owned(),
        to: Some("0xdest".to_owned()),
        value: "1000".to_owned(),
        input: "0x".to_owned(),
        confirmations,
        timestamp,
        block_number: None,
        nonce: None,
        is_canceled: false,
    }
}

/// A closed gate blocks callers until it is opened.
struct Gate {
    open: watch::Sender<bool>,
}

impl Gate {
    fn closed() -> Self {
        let (open, _) = watch::channel(false);
        Self { open }
    }

    fn open(&self) {
        self.open.send_replace(true);
    }

    async fn pass(mut receiver: watch::Receiver<bool>) {
        let _ = receiver.wait_for(|open| *open).await;
    }
}

#[derive(Default)]
struct CallCounter {
    calls: AtomicUsize,
    notify: Notify,
}

impl CallCounter {
    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn get(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.get() >= count {
                return;
            }
            notified.await;
        }
    }
}

pub struct FakeProvider {
    family: ChainFamily,
    balance: Mutex<Result<String, ProviderError>>,
    transactions: Mutex<Result<TransactionBatch, ProviderError>>,
    assets: Mutex<Result<AssetBatch, ProviderError>>,
    balance_gate: Mutex<Option<watch::Receiver<bool>>>,
    gate: Mutex<Option<Gate>>,
    balance_calls: CallCounter,
}

impl FakeProvider {
    pub fn new(family: ChainFamily) -> Self {
        let empty = match family {
            ChainFamily::Utxo => TransactionBatch::Utxo(Vec::new()),
            ChainFamily::Evm => TransactionBatch::Evm(Vec::new()),
        };
        Self {
            family,
            balance: Mutex::new(Ok("0".to_owned())),
            transactions: Mutex::new(Ok(empty)),
            assets: Mutex::new(Ok(AssetBatch::default())),
            balance_gate: Mutex::new(None),
            gate: Mutex::new(None),
            balance_calls: CallCounter::default(),
        }
    }

    pub fn with_balance(self, balance: &str) -> Self {
        self.set_balance(balance);
        self
    }

    pub fn with_transactions(self, batch: TransactionBatch) -> Self {
        *self.transactions.lock().unwrap() = Ok(batch);
        self
    }

    pub fn with_assets(self, batch: AssetBatch) -> Self {
        *self.assets.lock().unwrap() = Ok(batch);
        self
    }

    /// Every fetch fails with `error`.
    pub fn failing(self, error: ProviderError) -> Self {
        *self.balance.lock().unwrap() = Err(error.clone());
        *self.transactions.lock().unwrap() = Err(error.clone());
        *self.assets.lock().unwrap() = Err(error);
        self
    }

    /// Balance fetches block until [`FakeProvider::release`].
    pub fn gated(self) -> Self {
        self.gate();
        self
    }

    pub fn gate(&self) {
        let gate = Gate::closed();
        *self.balance_gate.lock().unwrap() = Some(gate.open.subscribe());
        *self.gate.lock().unwrap() = Some(gate);
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.open();
        }
        *self.balance_gate.lock().unwrap() = None;
    }

    pub fn set_balance(&self, balance: &str) {
        *self.balance.lock().unwrap() = Ok(balance.to_owned());
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.get()
    }

    pub async fn wait_for_calls(&self, count: usize) {
        self.balance_calls.wait_for(count).await;
    }
}

#[async_trait]
impl ChainProvider for FakeProvider {
    fn family(&self) -> ChainFamily {
        self.family
    }

    async fn fetch_balance(&self, _identity: &str, _network: &Network) -> Result<String, ProviderError> {
        let gate = self.balance_gate.lock().unwrap().clone();
        self.balance_calls.record();
        if let Some(gate) = gate {
            Gate::pass(gate).await;
        }
        self.balance.lock().unwrap().clone()
    }

    async fn fetch_transactions(&self, _identity: &str, _network: &Network) -> Result<TransactionBatch, ProviderError> {
        self.transactions.lock().unwrap().clone()
    }

    async fn fetch_assets(&self, _identity: &str, _network: &Network) -> Result<AssetBatch, ProviderError> {
        self.assets.lock().unwrap().clone()
    }
}

/// Keyring whose signer answers per chain id: succeed, fail, or wait for release.
#[derive(Default)]
pub struct FakeKeyring {
    gates: Mutex<HashMap<u64, Gate>>,
    failing: Mutex<Vec<u64>>,
    wallet: Mutex<Vec<AccountKeys>>,
    signer_calls: CallCounter,
    unlocked: Mutex<bool>,
    active_account: Mutex<Option<AccountRef>>,
}

impl FakeKeyring {
    pub const PASSWORD: &'static str = "correct horse";

    pub fn gate_network(&self, chain_id: u64) {
        self.gates.lock().unwrap().insert(chain_id, Gate::closed());
    }

    pub fn release_network(&self, chain_id: u64) {
        if let Some(gate) = self.gates.lock().unwrap().remove(&chain_id) {
            gate.open();
        }
    }

    pub fn fail_network(&self, chain_id: u64) {
        self.failing.lock().unwrap().push(chain_id);
    }

    pub fn set_wallet(&self, wallet: Vec<AccountKeys>) {
        *self.wallet.lock().unwrap() = wallet;
    }

    pub fn signer_calls(&self) -> usize {
        self.signer_calls.get()
    }

    pub async fn wait_for_signer_calls(&self, count: usize) {
        self.signer_calls.wait_for(count).await;
    }

    pub fn active_account(&self) -> Option<AccountRef> {
        *self.active_account.lock().unwrap()
    }
}

#[async_trait]
impl Keyring for FakeKeyring {
    async fn set_signer_network(&self, network: &Network) -> anyhow::Result<SignerNetworkSwitch> {
        let gate = self
            .gates
            .lock()
            .unwrap()
            .get(&network.chain_id)
            .map(|gate| gate.open.subscribe());
        self.signer_calls.record();
        if let Some(gate) = gate {
            Gate::pass(gate).await;
        }
        if self.failing.lock().unwrap().contains(&network.chain_id) {
            anyhow::bail!("signer unavailable for chain {}", network.chain_id);
        }
        Ok(SignerNetworkSwitch {
            success: true,
            active_chain: network.kind,
            wallet: self.wallet.lock().unwrap().clone(),
        })
    }

    fn set_active_account(&self, account: AccountRef) -> anyhow::Result<()> {
        *self.active_account.lock().unwrap() = Some(account);
        Ok(())
    }

    async fn unlock(&self, password: &str) -> anyhow::Result<bool> {
        let matches = password == Self::PASSWORD;
        if matches {
            *self.unlocked.lock().unwrap() = true;
        }
        Ok(matches)
    }

    fn lock(&self) {
        *self.unlocked.lock().unwrap() = false;
    }

    fn is_unlocked(&self) -> bool {
        *self.unlocked.lock().unwrap()
    }
}
