use serde::{Deserialize, Serialize};

use crate::network::Network;

/// Events pushed to connected dapp pages, serialized as `{ "method": ..., "params": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum DappEvent {
    #[serde(rename_all = "camelCase")]
    ChainChanged { chain_id: String, network_version: u64 },
    #[serde(rename_all = "camelCase")]
    IsTestnet {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_testnet: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    LockStateChanged { accounts: Vec<String>, is_unlocked: bool },
    #[serde(rename_all = "camelCase")]
    AccountsChanged { accounts: Vec<String> },
}

impl DappEvent {
    pub fn chain_changed(network: &Network) -> Self {
        DappEvent::ChainChanged {
            chain_id: network.chain_id_hex(),
            network_version: network.chain_id,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            DappEvent::ChainChanged { .. } => "chainChanged",
            DappEvent::IsTestnet { .. } => "isTestnet",
            DappEvent::LockStateChanged { .. } => "lockStateChanged",
            DappEvent::AccountsChanged { .. } => "accountsChanged",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PollingCommand {
    StartPolling,
    StopPolling,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PollingReply {
    ContinuePolling,
}
