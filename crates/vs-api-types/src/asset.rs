use serde::{Deserialize, Serialize};

use crate::network::ChainFamily;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TokenIdentity {
    Contract(String),
    AssetGuid(String),
}

impl TokenIdentity {
    /// Dedup key. Contract addresses are compared case-insensitively.
    pub fn key(&self) -> String {
        match self {
            TokenIdentity::Contract(address) => address.to_ascii_lowercase(),
            TokenIdentity::AssetGuid(guid) => guid.clone(),
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            TokenIdentity::Contract(_) => ChainFamily::Evm,
            TokenIdentity::AssetGuid(_) => ChainFamily::Utxo,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    pub identity: TokenIdentity,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub decimals: u8,
    pub balance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Nft {
    pub contract_address: String,
    pub token_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

impl Nft {
    pub fn identity_key(&self) -> String {
        format!("{}:{}", self.contract_address.to_ascii_lowercase(), self.token_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountAssets {
    #[serde(default)]
    pub utxo: Vec<Token>,
    #[serde(default)]
    pub evm: Vec<Token>,
    #[serde(default)]
    pub nfts: Vec<Nft>,
}

impl AccountAssets {
    pub fn tokens(&self, family: ChainFamily) -> &[Token] {
        match family {
            ChainFamily::Utxo => &self.utxo,
            ChainFamily::Evm => &self.evm,
        }
    }

    pub fn tokens_mut(&mut self, family: ChainFamily) -> &mut Vec<Token> {
        match family {
            ChainFamily::Utxo => &mut self.utxo,
            ChainFamily::Evm => &mut self.evm,
        }
    }

    /// Tokens that may be rendered for the active network: filed under its family and
    /// tagged with its chain id.
    pub fn visible_tokens(&self, family: ChainFamily, chain_id: u64) -> impl Iterator<Item = &Token> {
        self.tokens(family)
            .iter()
            .filter(move |token| token.identity.family() == family && token.chain_id == Some(chain_id))
    }

    pub fn visible_nfts(&self, chain_id: u64) -> impl Iterator<Item = &Nft> {
        self.nfts.iter().filter(move |nft| nft.chain_id == Some(chain_id))
    }
}
