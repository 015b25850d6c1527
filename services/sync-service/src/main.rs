use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use vs_api_types::{ErrorResponse, PollingCommand};
use vs_storage::{InMemorySnapshotStore, RocksDbSnapshotStore, SnapshotStore};
use vs_sync_core::{SyncController, SyncError};

mod bootstrap;
mod config;
mod dapp_events;
mod networks;
mod ops;
mod persist;

use config::ServiceConfig;

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

struct AppState {
    controller: Arc<SyncController>,
    polling: mpsc::Sender<PollingCommand>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServiceConfig::from_env()?;
    let store: Arc<dyn SnapshotStore> = match config.db_path.as_deref() {
        Some(path) => {
            info!(path, "using rocksdb snapshot store");
            Arc::new(RocksDbSnapshotStore::open_default(path)?)
        }
        None => {
            warn!("VAULTSYNC_DB_PATH not set; vault snapshots are kept in memory only");
            Arc::new(InMemorySnapshotStore::default())
        }
    };

    let controller = Arc::new(bootstrap::build_controller(&config, store.as_ref()).await?);
    let persistence = persist::spawn_persistence(controller.vault().clone(), store.clone());

    let (polling_tx, polling_rx) = mpsc::channel(16);
    let (reply_tx, mut replies) = mpsc::unbounded_channel();
    let poller = controller.poller().start(polling_rx, Some(reply_tx));
    tokio::spawn(async move {
        while let Some(reply) = replies.recv().await {
            debug!(?reply, "poll cycle finished");
        }
    });

    let state = Arc::new(AppState {
        controller: controller.clone(),
        polling: polling_tx,
    });
    let app = router(state).layer(CorsLayer::permissive());

    info!("sync-service listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poller.shutdown().await;
    controller.synchronizers().cancel_all();
    persistence.abort();
    persist::save_vault(store.as_ref(), controller.vault()).await?;
    info!("sync-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/vault", get(ops::vault_summary))
        .route("/network/switch", post(ops::switch_network))
        .route("/network/switch/cancel", post(ops::cancel_switch))
        .route("/account/active", post(ops::set_active_account))
        .route("/account/conflict/resolve", post(ops::resolve_account_conflict))
        .route("/account/refresh", post(ops::refresh_account))
        .route("/accounts/{account_type}/{id}", delete(ops::remove_account))
        .route("/polling", post(ops::polling))
        .route("/wallet/unlock", post(ops::unlock))
        .route("/wallet/lock", post(ops::lock))
        .route("/error/resolve", post(ops::resolve_error))
        .route("/transactions/sent", post(ops::record_sent_transaction))
        .route("/transactions/{hash}/cancel", post(ops::cancel_transaction))
        .route("/transactions/{hash}/accelerate", post(ops::accelerate_transaction))
        .route("/networks", get(networks::list_networks).post(networks::upsert_network))
        .route("/networks/{kind}/{chain_id}", delete(networks::remove_network))
        .route("/dapp/events", get(dapp_events::dapp_events))
        .with_state(state)
}

async fn health(State(_state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "sync-service",
        status: "ok",
    })
}

async fn version(State(_state): State<Arc<AppState>>) -> Json<VersionResponse> {
    Json(VersionResponse {
        service: "sync-service",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error: message.into() }))
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    error_response(StatusCode::BAD_REQUEST, message)
}

fn sync_error(err: SyncError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        SyncError::IncompatibleSigner { .. } | SyncError::ActiveNetworkRemoval | SyncError::ActiveAccountRemoval => {
            StatusCode::CONFLICT
        }
        SyncError::NetworkSwitchFailed(_) => StatusCode::BAD_GATEWAY,
        SyncError::UnknownAccount(_) | SyncError::UnknownNetwork { .. } | SyncError::UnknownTransaction(_) => {
            StatusCode::NOT_FOUND
        }
        SyncError::FamilyMismatch { .. } => StatusCode::BAD_REQUEST,
        SyncError::InvalidPassword => StatusCode::UNAUTHORIZED,
        SyncError::Keyring(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(%err, "request failed");
    }
    error_response(status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use vs_api_types::{ChainFamily, DappEvent, Network, TransactionBatch};
    use vs_chain_client::{AssetBatch, ChainProvider, ProviderError, ProviderRegistry};
    use vs_keyring::{LocalKeyring, WatchOnlyAccount};
    use vs_storage::InMemorySnapshotStore;
    use vs_sync_core::{EventBroadcaster, SyncConfig};

    const PASSWORD: &str = "hunter2";

    struct StaticProvider {
        family: ChainFamily,
        balance: &'static str,
    }

    #[async_trait]
    impl ChainProvider for StaticProvider {
        fn family(&self) -> ChainFamily {
            self.family
        }

        async fn fetch_balance(&self, _identity: &str, _network: &Network) -> Result<String, ProviderError> {
            Ok(self.balance.to_owned())
        }

        async fn fetch_transactions(&self, _identity: &str, _network: &Network) -> Result<TransactionBatch, ProviderError> {
            Ok(match self.family {
                ChainFamily::Utxo => TransactionBatch::Utxo(Vec::new()),
                ChainFamily::Evm => TransactionBatch::Evm(Vec::new()),
            })
        }

        async fn fetch_assets(&self, _identity: &str, _network: &Network) -> Result<AssetBatch, ProviderError> {
            Ok(AssetBatch::default())
        }
    }

    async fn test_state() -> (Arc<AppState>, mpsc::Receiver<PollingCommand>) {
        let account = WatchOnlyAccount::new(
            vs_api_types::AccountRef::new(vs_api_types::AccountType::HdAccount, 0),
            "0xwatch",
        )
        .with_xpub(57, "zpub-watch");
        let keyring = Arc::new(LocalKeyring::new(PASSWORD, vec![account]).unwrap());
        let store = InMemorySnapshotStore::default();
        let vault = bootstrap::load_or_seed_vault(&store, keyring.as_ref()).await.unwrap();

        let mut providers = ProviderRegistry::default();
        providers.register(Arc::new(StaticProvider {
            family: ChainFamily::Utxo,
            balance: "1.5",
        }));
        providers.register(Arc::new(StaticProvider {
            family: ChainFamily::Evm,
            balance: "0.25",
        }));

        let controller = Arc::new(SyncController::new(
            vault,
            keyring,
            providers,
            EventBroadcaster::default(),
            SyncConfig::default(),
        ));
        let (polling, commands) = mpsc::channel(4);
        (Arc::new(AppState { controller, polling }), commands)
    }

    async fn call(state: &Arc<AppState>, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_and_version_respond() {
        let (state, _commands) = test_state().await;

        let (status, body) = call(&state, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = call(&state, Method::GET, "/version", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn switching_to_evm_commits_and_notifies_dapps() {
        let (state, _commands) = test_state().await;
        let (_id, mut events) = state.controller.events().subscribe(Some("app.example".to_owned()));

        let (status, body) = call(
            &state,
            Method::POST,
            "/network/switch",
            Some(json!({ "chain_id": 137, "kind": "evm" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "committed");
        assert_eq!(body["chain_id"], "0x89");

        assert_eq!(
            events.recv().await.unwrap(),
            DappEvent::ChainChanged {
                chain_id: "0x89".to_owned(),
                network_version: 137,
            }
        );
        assert_eq!(events.recv().await.unwrap(), DappEvent::IsTestnet { is_testnet: None });

        let (_, summary) = call(&state, Method::GET, "/vault", None).await;
        assert_eq!(summary["active_chain"], "evm");
        assert_eq!(summary["is_bitcoin_based"], false);
        assert_eq!(summary["is_network_changing"], false);

        let (status, body) = call(
            &state,
            Method::POST,
            "/network/switch",
            Some(json!({ "chain_id": 137, "kind": "evm" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "unchanged");
    }

    #[tokio::test]
    async fn unknown_network_is_not_found() {
        let (state, _commands) = test_state().await;

        let (status, body) = call(
            &state,
            Method::POST,
            "/network/switch",
            Some(json!({ "chain_id": 999, "kind": "evm" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("999"));
    }

    #[tokio::test]
    async fn utxo_switch_without_keys_fails_and_flags_error() {
        let (state, _commands) = test_state().await;

        let (status, _) = call(
            &state,
            Method::POST,
            "/network/switch",
            Some(json!({ "chain_id": 5700, "kind": "utxo" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (_, summary) = call(&state, Method::GET, "/vault", None).await;
        assert_eq!(summary["error"], true);
        assert_eq!(summary["active_network"]["chain_id"], 57);

        let (status, _) = call(&state, Method::POST, "/error/resolve", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, summary) = call(&state, Method::GET, "/vault", None).await;
        assert_eq!(summary["error"], false);
    }

    #[tokio::test]
    async fn unlock_checks_password_and_lock_reports_state() {
        let (state, _commands) = test_state().await;

        let (status, _) = call(&state, Method::POST, "/wallet/unlock", Some(json!({ "password": "nope" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(&state, Method::POST, "/wallet/unlock", Some(json!({ "password": PASSWORD }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_unlocked"], true);

        let (_, body) = call(&state, Method::POST, "/wallet/lock", None).await;
        assert_eq!(body["is_unlocked"], false);
    }

    #[tokio::test]
    async fn polling_commands_reach_the_poller_port() {
        let (state, mut commands) = test_state().await;

        let (status, body) = call(&state, Method::POST, "/polling", Some(json!({ "action": "startPolling" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted"]["action"], "startPolling");
        assert_eq!(commands.recv().await, Some(PollingCommand::StartPolling));

        drop(commands);
        let (status, _) = call(&state, Method::POST, "/polling", Some(json!({ "action": "stopPolling" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn active_network_cannot_be_removed() {
        let (state, _commands) = test_state().await;

        let (status, _) = call(&state, Method::DELETE, "/networks/utxo/57", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&state, Method::DELETE, "/networks/evm/137", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["label"], "Polygon Mainnet");

        let (_, registry) = call(&state, Method::GET, "/networks", None).await;
        assert!(registry["evm"].get("137").is_none());
    }

    #[tokio::test]
    async fn custom_network_is_validated_and_saved() {
        let (state, _commands) = test_state().await;

        let (status, _) = call(
            &state,
            Method::POST,
            "/networks",
            Some(json!({ "network": {
                "chain_id": 2000, "url": "https://blockbook.custom", "label": "Custom",
                "currency": "doge", "kind": "utxo"
            }})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &state,
            Method::POST,
            "/networks",
            Some(json!({ "network": {
                "chain_id": 570, "url": "https://rpc.rollux.example", "label": "Rollux",
                "currency": "sys", "kind": "evm"
            }})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chain_id"], 570);
        assert!(state.controller.vault().read(|vault| vault.networks.contains(ChainFamily::Evm, 570)));
    }

    #[tokio::test]
    async fn sent_transaction_of_wrong_family_is_rejected() {
        let (state, _commands) = test_state().await;

        let (status, _) = call(
            &state,
            Method::POST,
            "/transactions/sent",
            Some(json!({ "kind": "evm", "transactions": [{ "hash": "0xabc", "from": "0xwatch" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &state,
            Method::POST,
            "/transactions/sent",
            Some(json!({ "kind": "utxo", "transactions": [{ "txid": "abc", "value": "1000" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, summary) = call(&state, Method::GET, "/vault", None).await;
        assert_eq!(summary["accounts"][0]["transactions"], 1);

        let (status, _) = call(&state, Method::POST, "/transactions/0xmissing/cancel", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn account_change_with_connected_dapp_is_parked() {
        let (state, _commands) = test_state().await;

        let (status, body) = call(
            &state,
            Method::POST,
            "/account/active",
            Some(json!({
                "account_type": "HDAccount", "id": 0,
                "host": "app.example", "connected_address": "0xsomeone-else"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["switched"], false);
        assert_eq!(body["pending_conflict"], true);
        assert!(state.controller.vault().read(|vault| vault.changing_connected_account.is_some()));

        call(&state, Method::POST, "/account/conflict/resolve", None).await;
        assert!(state.controller.vault().read(|vault| vault.changing_connected_account.is_none()));

        let (status, _) = call(&state, Method::DELETE, "/accounts/HDAccount/0", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn closing_the_event_stream_unsubscribes_the_listener() {
        let (state, _commands) = test_state().await;
        let events = state.controller.events().clone();

        let request = Request::builder()
            .uri("/dapp/events?host=app.example")
            .body(Body::empty())
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(events.listener_count(), 1);
        assert_eq!(events.connected_hosts(), vec!["app.example".to_owned()]);

        drop(response);
        assert_eq!(events.listener_count(), 0);
    }

    #[tokio::test]
    async fn cancelling_with_no_pending_switch_reports_false() {
        let (state, _commands) = test_state().await;

        let (status, body) = call(&state, Method::POST, "/network/switch/cancel", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], false);
    }
}
