mod account;
mod api;
mod asset;
mod dapp;
mod network;
mod transaction;

pub use account::{Account, AccountKeys, AccountRef, AccountType, Balance, Balances, NO_DATA_SENTINEL};
pub use api::{
    AccountSummary, AddNetworkRequest, ErrorResponse, LockStateResponse, SetActiveAccountRequest,
    SetActiveAccountResponse, SwitchNetworkRequest, SwitchNetworkResponse, UnlockRequest,
    VaultSummaryResponse,
};
pub use asset::{AccountAssets, Nft, Token, TokenIdentity};
pub use dapp::{DappEvent, PollingCommand, PollingReply};
pub use network::{ChainFamily, Network, NetworkRegistry, TESTNET_CHAIN_IDS};
pub use transaction::{
    AccountTransactions, EvmTransaction, MAX_TRANSACTIONS_PER_CHAIN, TransactionBatch, TransactionRecord,
    UtxoTransaction,
};
