use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Chain ids that are always treated as test networks, whatever their label says.
pub const TESTNET_CHAIN_IDS: [u64; 7] = [5700, 80001, 11155111, 421611, 5, 69, 57000];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    Utxo,
    Evm,
}

impl ChainFamily {
    pub fn is_bitcoin_based(self) -> bool {
        matches!(self, ChainFamily::Utxo)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChainFamily::Utxo => "utxo",
            ChainFamily::Evm => "evm",
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Network {
    pub chain_id: u64,
    pub url: String,
    pub label: String,
    pub currency: String,
    pub kind: ChainFamily,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slip44: Option<u32>,
    #[serde(default)]
    pub default: bool,
}

impl Network {
    /// Two networks are the same switch target when chain id, url and label all match.
    pub fn is_same_network(&self, other: &Network) -> bool {
        self.chain_id == other.chain_id && self.url == other.url && self.label == other.label
    }

    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    pub fn is_testnet(&self) -> bool {
        TESTNET_CHAIN_IDS.contains(&self.chain_id) || self.label.to_ascii_lowercase().contains("test")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkRegistry {
    #[serde(default)]
    pub utxo: BTreeMap<u64, Network>,
    #[serde(default)]
    pub evm: BTreeMap<u64, Network>,
}

impl NetworkRegistry {
    pub fn family(&self, family: ChainFamily) -> &BTreeMap<u64, Network> {
        match family {
            ChainFamily::Utxo => &self.utxo,
            ChainFamily::Evm => &self.evm,
        }
    }

    fn family_mut(&mut self, family: ChainFamily) -> &mut BTreeMap<u64, Network> {
        match family {
            ChainFamily::Utxo => &mut self.utxo,
            ChainFamily::Evm => &mut self.evm,
        }
    }

    pub fn get(&self, family: ChainFamily, chain_id: u64) -> Option<&Network> {
        self.family(family).get(&chain_id)
    }

    pub fn contains(&self, family: ChainFamily, chain_id: u64) -> bool {
        self.family(family).contains_key(&chain_id)
    }

    /// Inserts or replaces the network under its own family, returning the previous entry.
    pub fn insert(&mut self, network: Network) -> Option<Network> {
        self.family_mut(network.kind).insert(network.chain_id, network)
    }

    pub fn remove(&mut self, family: ChainFamily, chain_id: u64) -> Option<Network> {
        self.family_mut(family).remove(&chain_id)
    }
}
