use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use vs_api_types::{
    Account, AccountRef, AccountType, LockStateResponse, PollingCommand, SetActiveAccountRequest,
    SetActiveAccountResponse, SwitchNetworkRequest, SwitchNetworkResponse, TransactionBatch, UnlockRequest,
    VaultSummaryResponse,
};

use crate::{AppState, ApiResult, ErrorResponse, sync_error};

#[derive(Debug, Serialize)]
pub(crate) struct AckResponse {
    ok: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshResponse {
    refreshed: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct PollingResponse {
    accepted: PollingCommand,
}

#[derive(Debug, Serialize)]
pub(crate) struct CancelSwitchResponse {
    cancelled: bool,
}

fn ack() -> ApiResult<AckResponse> {
    Ok(Json(AckResponse { ok: true }))
}

pub(crate) async fn vault_summary(State(state): State<Arc<AppState>>) -> ApiResult<VaultSummaryResponse> {
    Ok(Json(state.controller.summary()))
}

pub(crate) async fn switch_network(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SwitchNetworkRequest>,
) -> ApiResult<SwitchNetworkResponse> {
    let outcome = state
        .controller
        .switch_network(request.kind, request.chain_id)
        .await
        .map_err(sync_error)?;

    let chain_id = state
        .controller
        .vault()
        .read(|vault| vault.active_network.chain_id_hex());
    info!(kind = %request.kind, chain_id = request.chain_id, outcome = outcome.as_str(), "switch request finished");
    Ok(Json(SwitchNetworkResponse {
        outcome: outcome.as_str().to_owned(),
        chain_id: Some(chain_id),
    }))
}

pub(crate) async fn cancel_switch(State(state): State<Arc<AppState>>) -> ApiResult<CancelSwitchResponse> {
    Ok(Json(CancelSwitchResponse {
        cancelled: state.controller.cancel_network_switch(),
    }))
}

pub(crate) async fn set_active_account(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetActiveAccountRequest>,
) -> ApiResult<SetActiveAccountResponse> {
    let account = AccountRef::new(request.account_type, request.id);
    let switched = state
        .controller
        .set_active_account(account, request.host, request.connected_address)
        .map_err(sync_error)?;
    Ok(Json(SetActiveAccountResponse {
        switched,
        pending_conflict: !switched,
    }))
}

pub(crate) async fn resolve_account_conflict(State(state): State<Arc<AppState>>) -> ApiResult<AckResponse> {
    state.controller.resolve_account_conflict();
    ack()
}

pub(crate) async fn refresh_account(State(state): State<Arc<AppState>>) -> ApiResult<RefreshResponse> {
    Ok(Json(RefreshResponse {
        refreshed: state.controller.refresh_active_account(),
    }))
}

pub(crate) async fn remove_account(
    State(state): State<Arc<AppState>>,
    Path((account_type, id)): Path<(AccountType, u32)>,
) -> ApiResult<Account> {
    let removed = state
        .controller
        .remove_account(AccountRef::new(account_type, id))
        .map_err(sync_error)?;
    Ok(Json(removed))
}

/// Feeds a `startPolling`/`stopPolling` message to the poller.
pub(crate) async fn polling(
    State(state): State<Arc<AppState>>,
    Json(command): Json<PollingCommand>,
) -> ApiResult<PollingResponse> {
    if state.polling.send(command).await.is_err() {
        warn!(?command, "poller is not running");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "poller is not running".to_owned(),
            }),
        ));
    }
    Ok(Json(PollingResponse { accepted: command }))
}

pub(crate) async fn unlock(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UnlockRequest>,
) -> ApiResult<LockStateResponse> {
    state.controller.unlock(&request.password).await.map_err(sync_error)?;
    Ok(Json(LockStateResponse {
        is_unlocked: state.controller.is_unlocked(),
    }))
}

pub(crate) async fn lock(State(state): State<Arc<AppState>>) -> ApiResult<LockStateResponse> {
    state.controller.lock();
    Ok(Json(LockStateResponse {
        is_unlocked: state.controller.is_unlocked(),
    }))
}

pub(crate) async fn resolve_error(State(state): State<Arc<AppState>>) -> ApiResult<AckResponse> {
    state.controller.resolve_error();
    ack()
}

pub(crate) async fn record_sent_transaction(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<TransactionBatch>,
) -> ApiResult<AckResponse> {
    state.controller.record_sent_transaction(batch).map_err(sync_error)?;
    ack()
}

pub(crate) async fn cancel_transaction(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> ApiResult<AckResponse> {
    state.controller.mark_transaction_canceled(&hash).map_err(sync_error)?;
    ack()
}

pub(crate) async fn accelerate_transaction(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> ApiResult<AckResponse> {
    state.controller.mark_transaction_accelerated(&hash).map_err(sync_error)?;
    ack()
}
