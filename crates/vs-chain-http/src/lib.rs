//! HTTP chain providers.
//!
//! `BlockbookAdapter` talks to a Blockbook-style UTXO indexer keyed by extended public
//! key; `EvmRpcAdapter` uses a JSON-RPC node for balances and an Etherscan-compatible
//! explorer API for history and tokens. Every response is narrowed into the typed
//! entities of `vs-api-types` before it leaves this crate.

mod blockbook;
mod evm;
mod format;

pub use blockbook::BlockbookAdapter;
pub use evm::EvmRpcAdapter;
pub use format::{format_units, parse_hex_quantity};

use serde::Deserialize;
use std::time::Duration;
use vs_chain_client::ProviderError;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Shared reqwest client for both adapters.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| ProviderError::Transport(err.to_string()))
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Transport(err.to_string())
}

/// Maps a non-success status to the provider error taxonomy; 429 becomes `RateLimited`.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Indexers disagree on whether amounts are JSON numbers or strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FlexNumber {
    Int(u64),
    Float(f64),
    Text(String),
}

impl FlexNumber {
    fn as_u128(&self) -> Option<u128> {
        match self {
            FlexNumber::Int(value) => Some(u128::from(*value)),
            FlexNumber::Float(value) if *value >= 0.0 => Some(*value as u128),
            FlexNumber::Float(_) => None,
            FlexNumber::Text(text) => {
                let text = text.trim();
                if text.starts_with("0x") {
                    parse_hex_quantity(text)
                } else {
                    text.parse().ok()
                }
            }
        }
    }

    fn as_u64(&self) -> Option<u64> {
        self.as_u128().and_then(|value| u64::try_from(value).ok())
    }
}
