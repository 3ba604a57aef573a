//! Account balances and transactions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Decimal amount as sent by the bank, with its currency or unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub value: String,
    pub unit: String,
}

impl Amount {
    pub fn new(value: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            unit: unit.into(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.value.trim().parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: String,
    pub display_id: Option<String>,
    pub account_type: Option<String>,
    /// Booked balance.
    pub balance: Option<Amount>,
    pub available_cash: Option<Amount>,
}

/// Flattened view of a balance used by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub account_id: String,
    pub amount: String,
    pub currency: String,
}

impl AccountBalance {
    /// Booked balance, or the available cash when the bank sent no balance.
    pub fn summary(&self) -> Option<BalanceSummary> {
        let amount = self.balance.as_ref().or(self.available_cash.as_ref())?;
        Some(BalanceSummary {
            account_id: self.account_id.clone(),
            amount: amount.value.clone(),
            currency: amount.unit.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTransaction {
    pub reference: Option<String>,
    /// `BOOKED` or `NOTBOOKED`.
    pub booking_status: String,
    pub booking_date: Option<NaiveDate>,
    pub amount: Amount,
    /// Remitter for credits, creditor for debits.
    pub counterparty: Option<String>,
    pub remittance_info: Option<String>,
    pub transaction_type: Option<String>,
}

impl AccountTransaction {
    pub fn is_booked(&self) -> bool {
        self.booking_status == "BOOKED"
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Booked,
    #[strum(serialize = "NOTBOOKED")]
    #[serde(rename = "NOTBOOKED")]
    NotBooked,
    Both,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionDirection {
    Credit,
    Debit,
    CreditAndDebit,
}

/// Transaction list filters. Part of the cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub state: Option<TransactionState>,
    pub direction: Option<TransactionDirection>,
    pub paging_first: Option<u32>,
}
