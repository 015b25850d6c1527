use serde::{Deserialize, Serialize};
use std::fmt;

use crate::asset::AccountAssets;
use crate::network::ChainFamily;
use crate::transaction::AccountTransactions;

/// Wire value of a balance that has not been fetched yet.
pub const NO_DATA_SENTINEL: f64 = -1.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccountType {
    #[serde(rename = "HDAccount")]
    HdAccount,
    Imported,
    Trezor,
    Ledger,
}

impl AccountType {
    pub fn is_hardware(self) -> bool {
        matches!(self, AccountType::Trezor | AccountType::Ledger)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountRef {
    pub account_type: AccountType,
    pub id: u32,
}

impl AccountRef {
    pub fn new(account_type: AccountType, id: u32) -> Self {
        Self { account_type, id }
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.account_type, self.id)
    }
}

/// Native balance of one chain family. `NoData` means "not fetched yet", which is
/// never the same thing as a zero balance.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub enum Balance {
    #[default]
    NoData,
    Amount(f64),
}

impl Balance {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Balance::NoData)
    }

    pub fn amount(&self) -> Option<f64> {
        match self {
            Balance::NoData => None,
            Balance::Amount(value) => Some(*value),
        }
    }

    /// A fetched amount is commit-worthy when it differs from what is stored.
    pub fn differs_from(&self, fetched: f64) -> bool {
        match self {
            Balance::NoData => true,
            Balance::Amount(stored) => *stored != fetched,
        }
    }
}

impl From<f64> for Balance {
    fn from(value: f64) -> Self {
        if value.is_finite() && value >= 0.0 {
            Balance::Amount(value)
        } else {
            Balance::NoData
        }
    }
}

impl From<Balance> for f64 {
    fn from(balance: Balance) -> Self {
        balance.amount().unwrap_or(NO_DATA_SENTINEL)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Balance::NoData => f.write_str("-"),
            Balance::Amount(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Balances {
    #[serde(default)]
    pub utxo: Balance,
    #[serde(default)]
    pub evm: Balance,
}

impl Balances {
    pub fn get(&self, family: ChainFamily) -> Balance {
        match family {
            ChainFamily::Utxo => self.utxo,
            ChainFamily::Evm => self.evm,
        }
    }

    pub fn set(&mut self, family: ChainFamily, balance: Balance) {
        match family {
            ChainFamily::Utxo => self.utxo = balance,
            ChainFamily::Evm => self.evm = balance,
        }
    }

    pub fn clear(&mut self) {
        *self = Balances::default();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: u32,
    pub account_type: AccountType,
    pub label: String,
    pub address: String,
    #[serde(default)]
    pub xpub: String,
    #[serde(default)]
    pub balances: Balances,
    #[serde(default)]
    pub assets: AccountAssets,
    #[serde(default)]
    pub transactions: AccountTransactions,
}

impl Account {
    pub fn new(account: AccountRef, label: impl Into<String>, address: impl Into<String>, xpub: impl Into<String>) -> Self {
        Self {
            id: account.id,
            account_type: account.account_type,
            label: label.into(),
            address: address.into(),
            xpub: xpub.into(),
            balances: Balances::default(),
            assets: AccountAssets::default(),
            transactions: AccountTransactions::default(),
        }
    }

    pub fn account_ref(&self) -> AccountRef {
        AccountRef::new(self.account_type, self.id)
    }

    /// Key the family's backend indexes this account by: the extended public key for
    /// UTXO backends, the address for EVM nodes.
    pub fn identity(&self, family: ChainFamily) -> &str {
        match family {
            ChainFamily::Utxo => &self.xpub,
            ChainFamily::Evm => &self.address,
        }
    }
}

/// Keys the signer re-derived for an account after it was reconfigured for a network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountKeys {
    pub account: AccountRef,
    pub address: String,
    #[serde(default)]
    pub xpub: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_round_trips_through_sentinel() {
        let json = serde_json::to_string(&Balances::default()).unwrap();
        assert_eq!(json, r#"{"utxo":-1.0,"evm":-1.0}"#);

        let parsed: Balances = serde_json::from_str(r#"{"utxo":0.0,"evm":-1}"#).unwrap();
        assert_eq!(parsed.utxo, Balance::Amount(0.0));
        assert!(parsed.evm.is_no_data());
    }

    #[test]
    fn zero_balance_is_distinct_from_no_data() {
        assert!(Balance::NoData.differs_from(0.0));
        assert!(!Balance::Amount(0.0).differs_from(0.0));
        assert!(Balance::Amount(1.5).differs_from(1.25));
    }

    #[test]
    fn identity_follows_family() {
        let account = Account::new(AccountRef::new(AccountType::HdAccount, 0), "Account 1", "0xabc", "zpub123");
        assert_eq!(account.identity(ChainFamily::Utxo), "zpub123");
        assert_eq!(account.identity(ChainFamily::Evm), "0xabc");
    }

    #[test]
    fn account_type_keeps_keyring_spelling() {
        assert_eq!(serde_json::to_string(&AccountType::HdAccount).unwrap(), r#""HDAccount""#);
        assert!(AccountType::Ledger.is_hardware());
        assert!(!AccountType::Imported.is_hardware());
    }
}
