use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::network::ChainFamily;

pub const MAX_TRANSACTIONS_PER_CHAIN: usize = 30;

const ERC20_TRANSFER_SELECTOR: &str = "0xa9059cbb";
const ERC20_TRANSFER_FROM_SELECTOR: &str = "0x23b872dd";

/// Common view over both transaction shapes used by merging and ordering.
pub trait TransactionRecord {
    fn identity(&self) -> &str;
    fn confirmations(&self) -> u64;
    fn timestamp(&self) -> u64;

    /// Entries hidden from the visible list even though they are valid history.
    fn is_display_noise(&self) -> bool {
        false
    }

    fn identity_key(&self) -> String {
        self.identity().to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtxoTransaction {
    pub txid: String,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default)]
    pub block_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees: Option<String>,
}

impl TransactionRecord for UtxoTransaction {
    fn identity(&self) -> &str {
        &self.txid
    }

    fn confirmations(&self) -> u64 {
        self.confirmations
    }

    fn timestamp(&self) -> u64 {
        self.block_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvmTransaction {
    pub hash: String,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Wei, either decimal or `0x`-prefixed hex as the node reported it.
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default)]
    pub is_canceled: bool,
}

impl EvmTransaction {
    pub fn is_token_transfer(&self) -> bool {
        let input = self.input.to_ascii_lowercase();
        input.starts_with(ERC20_TRANSFER_SELECTOR) || input.starts_with(ERC20_TRANSFER_FROM_SELECTOR)
    }

    pub fn has_zero_value(&self) -> bool {
        let value = self.value.trim();
        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .unwrap_or(value);
        digits.chars().all(|c| c == '0' || c == '.')
    }
}

impl TransactionRecord for EvmTransaction {
    fn identity(&self) -> &str {
        &self.hash
    }

    fn confirmations(&self) -> u64 {
        self.confirmations
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn is_display_noise(&self) -> bool {
        self.has_zero_value() && !self.is_token_transfer()
    }
}

/// A page of transactions as one family's provider returned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "transactions", rename_all = "snake_case")]
pub enum TransactionBatch {
    Utxo(Vec<UtxoTransaction>),
    Evm(Vec<EvmTransaction>),
}

impl TransactionBatch {
    pub fn family(&self) -> ChainFamily {
        match self {
            TransactionBatch::Utxo(_) => ChainFamily::Utxo,
            TransactionBatch::Evm(_) => ChainFamily::Evm,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TransactionBatch::Utxo(txs) => txs.len(),
            TransactionBatch::Evm(txs) => txs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transaction history per family, keyed by chain id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountTransactions {
    #[serde(default)]
    pub utxo: BTreeMap<u64, Vec<UtxoTransaction>>,
    #[serde(default)]
    pub evm: BTreeMap<u64, Vec<EvmTransaction>>,
}

impl AccountTransactions {
    pub fn utxo_for(&self, chain_id: u64) -> &[UtxoTransaction] {
        self.utxo.get(&chain_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn evm_for(&self, chain_id: u64) -> &[EvmTransaction] {
        self.evm.get(&chain_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn count(&self, family: ChainFamily, chain_id: u64) -> usize {
        match family {
            ChainFamily::Utxo => self.utxo_for(chain_id).len(),
            ChainFamily::Evm => self.evm_for(chain_id).len(),
        }
    }
}
