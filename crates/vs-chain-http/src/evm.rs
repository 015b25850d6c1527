use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use vs_api_types::{
    ChainFamily, EvmTransaction, MAX_TRANSACTIONS_PER_CHAIN, Network, Nft, Token, TokenIdentity,
    TransactionBatch,
};
use vs_chain_client::{AssetBatch, ChainProvider, ProviderError};

use crate::{FlexNumber, check_status, format_units, parse_hex_quantity, transport_error};

const WEI_DECIMALS: u32 = 18;
const DISPLAY_PRECISION: u32 = 4;

/// EVM backend: balances over JSON-RPC, history and token holdings from the
/// network's Etherscan-compatible explorer API (`api_url`).
pub struct EvmRpcAdapter {
    http: reqwest::Client,
}

impl EvmRpcAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn rpc_call(&self, network: &Network, method: &str, params: Value) -> Result<Value, ProviderError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let response = self
            .http
            .post(network.url.trim_end_matches('/'))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(format!("{method} response: {err}")))?;

        if let Some(error) = body.error {
            if error.code == -32005 || error.message.to_ascii_lowercase().contains("rate limit") {
                return Err(ProviderError::RateLimited);
            }
            return Err(ProviderError::Decode(format!(
                "{method} rpc error {}: {}",
                error.code, error.message
            )));
        }
        body.result
            .ok_or_else(|| ProviderError::Decode(format!("{method} returned no result")))
    }

    async fn explorer_call(
        &self,
        network: &Network,
        action: &str,
        address: &str,
        extra: &[(&str, &str)],
    ) -> Result<Option<Value>, ProviderError> {
        let Some(api_url) = network.api_url.as_deref() else {
            return Ok(None);
        };
        let response = self
            .http
            .get(api_url.trim_end_matches('/'))
            .query(&[("module", "account"), ("action", action), ("address", address)])
            .query(extra)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let body: ExplorerResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(format!("explorer {action} response: {err}")))?;
        body.into_result().map(Some)
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

impl ExplorerResponse {
    /// Etherscan signals "nothing found" and throttling with the same `status: "0"`;
    /// only a string result carries an error.
    fn into_result(self) -> Result<Value, ProviderError> {
        if self.status == "1" || self.result.is_array() {
            return Ok(self.result);
        }
        let detail = self.result.as_str().unwrap_or(&self.message).to_owned();
        if detail.to_ascii_lowercase().contains("rate limit") {
            return Err(ProviderError::RateLimited);
        }
        Err(ProviderError::Decode(format!("explorer error: {detail}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerTx {
    hash: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    value: Option<FlexNumber>,
    #[serde(default)]
    input: String,
    #[serde(default)]
    confirmations: Option<FlexNumber>,
    #[serde(default)]
    time_stamp: Option<FlexNumber>,
    #[serde(default)]
    block_number: Option<FlexNumber>,
    #[serde(default)]
    nonce: Option<FlexNumber>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerToken {
    contract_address: String,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    decimals: Option<FlexNumber>,
    #[serde(default)]
    balance: Option<FlexNumber>,
    #[serde(default, rename = "type")]
    standard: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

fn narrow_balance(result: &Value) -> Result<String, ProviderError> {
    let wei = result
        .as_str()
        .and_then(parse_hex_quantity)
        .ok_or_else(|| ProviderError::Decode(format!("eth_getBalance result {result}")))?;
    Ok(format_units(wei, WEI_DECIMALS, DISPLAY_PRECISION))
}

fn flex_u64(value: &Option<FlexNumber>) -> Option<u64> {
    value.as_ref().and_then(FlexNumber::as_u64)
}

fn narrow_transactions(result: Value) -> Result<Vec<EvmTransaction>, ProviderError> {
    let rows: Vec<ExplorerTx> = serde_json::from_value(result)
        .map_err(|err| ProviderError::Decode(format!("explorer txlist rows: {err}")))?;
    Ok(rows
        .into_iter()
        .take(MAX_TRANSACTIONS_PER_CHAIN)
        .map(|row| EvmTransaction {
            value: row
                .value
                .as_ref()
                .and_then(FlexNumber::as_u128)
                .unwrap_or_default()
                .to_string(),
            confirmations: flex_u64(&row.confirmations).unwrap_or_default(),
            timestamp: flex_u64(&row.time_stamp).unwrap_or_default(),
            block_number: flex_u64(&row.block_number),
            nonce: flex_u64(&row.nonce),
            to: row.to.filter(|to| !to.is_empty()),
            hash: row.hash,
            from: row.from,
            input: row.input,
            is_canceled: false,
        })
        .collect())
}

fn narrow_assets(result: Value, chain_id: u64) -> Result<AssetBatch, ProviderError> {
    let rows: Vec<ExplorerToken> = serde_json::from_value(result)
        .map_err(|err| ProviderError::Decode(format!("explorer tokenlist rows: {err}")))?;

    let mut batch = AssetBatch::default();
    for row in rows {
        match row.standard.as_deref() {
            Some("ERC-721") | Some("ERC-1155") => {
                let Some(token_id) = row.id else {
                    debug!(contract = %row.contract_address, "skipping nft entry without token id");
                    continue;
                };
                batch.nfts.push(Nft {
                    contract_address: row.contract_address,
                    token_id,
                    name: row.name,
                    chain_id: Some(chain_id),
                });
            }
            _ => {
                let decimals = flex_u64(&row.decimals)
                    .and_then(|d| u8::try_from(d).ok())
                    .unwrap_or(WEI_DECIMALS as u8);
                let raw = row
                    .balance
                    .as_ref()
                    .and_then(FlexNumber::as_u128)
                    .unwrap_or_default();
                batch.tokens.push(Token {
                    identity: TokenIdentity::Contract(row.contract_address),
                    symbol: row.symbol.unwrap_or_default(),
                    name: row.name,
                    decimals,
                    balance: raw as f64 / 10f64.powi(i32::from(decimals)),
                    chain_id: Some(chain_id),
                });
            }
        }
    }
    Ok(batch)
}

#[async_trait]
impl ChainProvider for EvmRpcAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    async fn fetch_balance(&self, identity: &str, network: &Network) -> Result<String, ProviderError> {
        let result = self
            .rpc_call(network, "eth_getBalance", serde_json::json!([identity, "latest"]))
            .await?;
        narrow_balance(&result)
    }

    async fn fetch_transactions(&self, identity: &str, network: &Network) -> Result<TransactionBatch, ProviderError> {
        let offset = MAX_TRANSACTIONS_PER_CHAIN.to_string();
        let result = self
            .explorer_call(
                network,
                "txlist",
                identity,
                &[("sort", "desc"), ("page", "1"), ("offset", offset.as_str())],
            )
            .await?;
        let Some(result) = result else {
            warn!(chain_id = network.chain_id, "network has no explorer api; skipping transaction fetch");
            return Ok(TransactionBatch::Evm(Vec::new()));
        };
        Ok(TransactionBatch::Evm(narrow_transactions(result)?))
    }

    async fn fetch_assets(&self, identity: &str, network: &Network) -> Result<AssetBatch, ProviderError> {
        match self.explorer_call(network, "tokenlist", identity, &[]).await? {
            Some(result) => narrow_assets(result, network.chain_id),
            None => Ok(AssetBatch::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn balance_is_formatted_from_hex_wei() {
        assert_eq!(narrow_balance(&json!("0x14d1120d7b160000")).unwrap(), "1.5");
        assert!(narrow_balance(&json!(12)).is_err());
    }

    #[test]
    fn explorer_rate_limit_is_classified() {
        let body: ExplorerResponse = serde_json::from_value(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Max rate limit reached"
        }))
        .unwrap();
        assert_eq!(body.into_result(), Err(ProviderError::RateLimited));
    }

    #[test]
    fn empty_history_is_not_an_error() {
        let body: ExplorerResponse = serde_json::from_value(json!({
            "status": "0",
            "message": "No transactions found",
            "result": []
        }))
        .unwrap();
        assert_eq!(body.into_result().unwrap(), json!([]));
    }

    #[test]
    fn txlist_rows_narrow_string_numbers() {
        let txs = narrow_transactions(json!([{
            "hash": "0xABC",
            "from": "0x1",
            "to": "",
            "value": "1000",
            "input": "0x",
            "confirmations": "12",
            "timeStamp": "1700000000",
            "blockNumber": "19000000",
            "nonce": "4"
        }]))
        .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].to, None);
        assert_eq!(txs[0].confirmations, 12);
        assert_eq!(txs[0].timestamp, 1_700_000_000);
        assert_eq!(txs[0].nonce, Some(4));
    }

    #[test]
    fn tokenlist_splits_fungible_and_nft_entries() {
        let batch = narrow_assets(
            json!([
                { "contractAddress": "0xToken", "symbol": "USDC", "decimals": "6", "balance": "2500000", "type": "ERC-20" },
                { "contractAddress": "0xNft", "name": "Punk", "type": "ERC-721", "id": "42" },
                { "contractAddress": "0xNoId", "type": "ERC-721" }
            ]),
            1,
        )
        .unwrap();
        assert_eq!(batch.tokens.len(), 1);
        assert_eq!(batch.tokens[0].balance, 2.5);
        assert_eq!(batch.nfts.len(), 1);
        assert_eq!(batch.nfts[0].token_id, "42");
    }
}
