use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use vs_api_types::{ChainFamily, Network, Nft, Token, TransactionBatch};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider rate limited the request")]
    RateLimited,
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("unexpected provider payload: {0}")]
    Decode(String),
    #[error("no provider registered for {0} networks")]
    UnsupportedFamily(ChainFamily),
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetBatch {
    pub tokens: Vec<Token>,
    pub nfts: Vec<Nft>,
}

/// Backend access for one chain family. `identity` is the account's extended public
/// key on UTXO backends and its address on EVM nodes.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    fn family(&self) -> ChainFamily;

    /// Native balance, already formatted for display (e.g. `"1.2345"`).
    async fn fetch_balance(&self, identity: &str, network: &Network) -> Result<String, ProviderError>;

    async fn fetch_transactions(&self, identity: &str, network: &Network) -> Result<TransactionBatch, ProviderError>;

    async fn fetch_assets(&self, identity: &str, network: &Network) -> Result<AssetBatch, ProviderError>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ChainFamily, Arc<dyn ChainProvider>>,
}

impl ProviderRegistry {
    pub fn register(&mut self, provider: Arc<dyn ChainProvider>) {
        self.providers.insert(provider.family(), provider);
    }

    pub fn provider(&self, family: ChainFamily) -> Option<Arc<dyn ChainProvider>> {
        self.providers.get(&family).cloned()
    }

    pub fn require(&self, family: ChainFamily) -> Result<Arc<dyn ChainProvider>, ProviderError> {
        self.provider(family).ok_or(ProviderError::UnsupportedFamily(family))
    }
}
