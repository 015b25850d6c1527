use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use vs_api_types::{
    ChainFamily, MAX_TRANSACTIONS_PER_CHAIN, Network, Token, TokenIdentity, TransactionBatch,
    UtxoTransaction,
};
use vs_chain_client::{AssetBatch, ChainProvider, ProviderError};

use crate::{FlexNumber, check_status, format_units, transport_error};

const SATOSHI_DECIMALS: u32 = 8;

/// UTXO backend speaking the Blockbook `api/v2/xpub` dialect.
///
/// The backend URL comes from the active network, so one adapter serves every
/// UTXO network in the registry.
pub struct BlockbookAdapter {
    http: reqwest::Client,
}

impl BlockbookAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn xpub_details(
        &self,
        network: &Network,
        xpub: &str,
        query: &[(&str, &str)],
    ) -> Result<XpubResponse, ProviderError> {
        let url = format!(
            "{}/api/v2/xpub/{}",
            network.url.trim_end_matches('/'),
            xpub
        );
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(format!("blockbook xpub response: {err}")))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XpubResponse {
    #[serde(default)]
    balance: Option<FlexNumber>,
    #[serde(default)]
    transactions: Vec<BlockbookTx>,
    #[serde(default)]
    tokens: Vec<BlockbookToken>,
    #[serde(default)]
    tokens_asset: Vec<BlockbookToken>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockbookTx {
    txid: String,
    #[serde(default)]
    confirmations: u64,
    #[serde(default)]
    block_time: u64,
    #[serde(default)]
    block_height: Option<i64>,
    #[serde(default)]
    value: Option<FlexNumber>,
    #[serde(default)]
    fees: Option<FlexNumber>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockbookToken {
    #[serde(default)]
    asset_guid: Option<FlexNumber>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    decimals: Option<u8>,
    #[serde(default)]
    balance: Option<FlexNumber>,
}

fn narrow_balance(body: &XpubResponse) -> Result<String, ProviderError> {
    let sats = body
        .balance
        .as_ref()
        .and_then(FlexNumber::as_u128)
        .ok_or_else(|| ProviderError::Decode("blockbook balance missing".to_owned()))?;
    Ok(format_units(sats, SATOSHI_DECIMALS, SATOSHI_DECIMALS))
}

fn narrow_transactions(body: XpubResponse) -> Vec<UtxoTransaction> {
    body.transactions
        .into_iter()
        .take(MAX_TRANSACTIONS_PER_CHAIN)
        .map(|tx| UtxoTransaction {
            txid: tx.txid,
            confirmations: tx.confirmations,
            block_time: tx.block_time,
            // Blockbook reports mempool entries at height -1.
            block_height: tx.block_height.and_then(|height| u64::try_from(height).ok()),
            value: tx
                .value
                .as_ref()
                .and_then(FlexNumber::as_u128)
                .unwrap_or_default()
                .to_string(),
            fees: tx
                .fees
                .as_ref()
                .and_then(FlexNumber::as_u128)
                .map(|fees| fees.to_string()),
        })
        .collect()
}

fn narrow_assets(body: XpubResponse, chain_id: u64) -> Vec<Token> {
    let source = if body.tokens_asset.is_empty() {
        body.tokens
    } else {
        body.tokens_asset
    };

    source
        .into_iter()
        .filter_map(|token| {
            let guid = token.asset_guid.as_ref().and_then(FlexNumber::as_u64)?;
            let decimals = token.decimals.unwrap_or(SATOSHI_DECIMALS as u8);
            let raw = token
                .balance
                .as_ref()
                .and_then(FlexNumber::as_u128)
                .unwrap_or_default();
            Some(Token {
                identity: TokenIdentity::AssetGuid(guid.to_string()),
                symbol: token.symbol.unwrap_or_default(),
                name: token.name,
                decimals,
                balance: raw as f64 / 10f64.powi(i32::from(decimals)),
                chain_id: Some(chain_id),
            })
        })
        .take(MAX_TRANSACTIONS_PER_CHAIN)
        .collect()
}

#[async_trait]
impl ChainProvider for BlockbookAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Utxo
    }

    async fn fetch_balance(&self, identity: &str, network: &Network) -> Result<String, ProviderError> {
        let body = self
            .xpub_details(network, identity, &[("details", "basic")])
            .await?;
        narrow_balance(&body)
    }

    async fn fetch_transactions(&self, identity: &str, network: &Network) -> Result<TransactionBatch, ProviderError> {
        let page_size = MAX_TRANSACTIONS_PER_CHAIN.to_string();
        let body = self
            .xpub_details(
                network,
                identity,
                &[("details", "txs"), ("pageSize", page_size.as_str())],
            )
            .await?;
        let txs = narrow_transactions(body);
        debug!(chain_id = network.chain_id, count = txs.len(), "blockbook transactions fetched");
        Ok(TransactionBatch::Utxo(txs))
    }

    async fn fetch_assets(&self, identity: &str, network: &Network) -> Result<AssetBatch, ProviderError> {
        let body = self
            .xpub_details(
                network,
                identity,
                &[("details", "tokenBalances"), ("tokens", "nonzero")],
            )
            .await?;
        if body.tokens.is_empty() && body.tokens_asset.is_empty() {
            warn!(chain_id = network.chain_id, "blockbook returned no token balances");
        }
        Ok(AssetBatch {
            tokens: narrow_assets(body, network.chain_id),
            nfts: Vec::new(),
        })
    }
}
