use serde::{Deserialize, Serialize};

use crate::account::{AccountRef, AccountType, Balances};
use crate::network::{ChainFamily, Network};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchNetworkRequest {
    pub chain_id: u64,
    pub kind: ChainFamily,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchNetworkResponse {
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetActiveAccountRequest {
    pub account_type: AccountType,
    pub id: u32,
    /// Dapp host asking for the change, when the request comes from a connected site.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub connected_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetActiveAccountResponse {
    pub switched: bool,
    pub pending_conflict: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockStateResponse {
    pub is_unlocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddNetworkRequest {
    pub network: Network,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account: AccountRef,
    pub label: String,
    pub address: String,
    pub balances: Balances,
    pub visible_tokens: usize,
    pub transactions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSummaryResponse {
    pub active_account: AccountRef,
    pub active_network: Network,
    pub active_chain: ChainFamily,
    pub is_bitcoin_based: bool,
    pub is_network_changing: bool,
    pub error: bool,
    pub accounts: Vec<AccountSummary>,
}
