use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;
use tracing::info;
use vs_api_types::{AddNetworkRequest, ChainFamily, Network, NetworkRegistry};

use crate::{AppState, ApiResult, bad_request, sync_error};

fn network(
    kind: ChainFamily,
    chain_id: u64,
    label: &str,
    url: &str,
    currency: &str,
    api_url: Option<&str>,
    slip44: Option<u32>,
) -> Network {
    Network {
        chain_id,
        url: url.to_owned(),
        label: label.to_owned(),
        currency: currency.to_owned(),
        kind,
        explorer: None,
        api_url: api_url.map(str::to_owned),
        slip44,
        default: true,
    }
}

/// Built-in networks seeded into a fresh vault. Syscoin mainnet (UTXO) starts active.
pub(crate) fn default_networks() -> (NetworkRegistry, Network) {
    let syscoin = network(
        ChainFamily::Utxo,
        57,
        "Syscoin Mainnet",
        "https://blockbook.syscoin.org",
        "sys",
        None,
        Some(57),
    );
    let defaults = [
        syscoin.clone(),
        network(
            ChainFamily::Utxo,
            5700,
            "Syscoin Testnet",
            "https://blockbook-dev.syscoin.org",
            "tsys",
            None,
            Some(1),
        ),
        network(
            ChainFamily::Evm,
            1,
            "Ethereum Mainnet",
            "https://rpc.ankr.com/eth",
            "eth",
            Some("https://api.etherscan.io/api"),
            None,
        ),
        network(
            ChainFamily::Evm,
            57,
            "Syscoin NEVM",
            "https://rpc.syscoin.org",
            "sys",
            Some("https://explorer.syscoin.org/api"),
            None,
        ),
        network(
            ChainFamily::Evm,
            137,
            "Polygon Mainnet",
            "https://polygon-rpc.com",
            "matic",
            Some("https://api.polygonscan.com/api"),
            None,
        ),
    ];

    let mut registry = NetworkRegistry::default();
    for entry in defaults {
        registry.insert(entry);
    }
    (registry, syscoin)
}

pub(crate) async fn list_networks(State(state): State<Arc<AppState>>) -> ApiResult<NetworkRegistry> {
    Ok(Json(state.controller.vault().read(|vault| vault.networks.clone())))
}

/// Adds a custom network or edits an existing one under the same family and chain id.
pub(crate) async fn upsert_network(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddNetworkRequest>,
) -> ApiResult<Network> {
    let network = request.network;
    if network.url.trim().is_empty() {
        return Err(bad_request("network url is required"));
    }
    if network.label.trim().is_empty() {
        return Err(bad_request("network label is required"));
    }
    if network.kind.is_bitcoin_based() && network.slip44.is_none() {
        return Err(bad_request("utxo networks need a slip44 coin type"));
    }

    let replaced = state.controller.upsert_network(network.clone());
    info!(
        kind = %network.kind,
        chain_id = network.chain_id,
        edited = replaced.is_some(),
        "network saved"
    );
    Ok(Json(network))
}

pub(crate) async fn remove_network(
    State(state): State<Arc<AppState>>,
    Path((kind, chain_id)): Path<(ChainFamily, u64)>,
) -> ApiResult<Network> {
    let removed = state.controller.remove_network(kind, chain_id).map_err(sync_error)?;
    info!(%kind, chain_id, "network removed");
    Ok(Json(removed))
}
