//! Stored account history: the last balance per account and every transaction seen.
//!
//! Rows keep the fetched item as JSON in `raw`; the flat columns are for
//! querying and sorting only.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::Result;
use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{AccountBalance, AccountTransaction};

#[derive(Debug, Clone, FromRow)]
pub struct PositionDbModel {
    pub account_id: String,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub raw: String,
    pub updated_at: i64,
}

impl PositionDbModel {
    pub fn from_balance(balance: &AccountBalance, now: DateTime<Utc>) -> Result<Self> {
        let summary = balance.summary();
        Ok(Self {
            account_id: balance.account_id.clone(),
            amount: summary.as_ref().map(|s| s.amount.clone()),
            currency: summary.map(|s| s.currency),
            raw: serde_json::to_string(balance)?,
            updated_at: datetime_to_ms(now),
        })
    }

    pub fn balance(&self) -> Result<AccountBalance> {
        Ok(serde_json::from_str(&self.raw)?)
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.updated_at)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TransactionDbModel {
    /// `account:reference`, or the transaction's content for entries without a reference.
    pub history_key: String,
    pub external_id: Option<String>,
    pub account_id: String,
    pub booking_status: String,
    /// `YYYY-MM-DD`.
    pub booking_date: Option<String>,
    pub amount: String,
    pub currency: String,
    pub raw: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Identity of a transaction in the history.
///
/// Entries without a bank reference (typically not yet booked) are keyed by
/// their content, so refetching them updates the same row. Two unreferenced
/// entries identical in every field share a row.
pub fn history_key(account_id: &str, tx: &AccountTransaction) -> String {
    match &tx.reference {
        Some(reference) => format!("{account_id}:{reference}"),
        None => format!(
            "{account_id}:{}:{}:{}{}:{}:{}",
            tx.booking_status,
            tx.booking_date.map(|d| d.to_string()).unwrap_or_default(),
            tx.amount.value,
            tx.amount.unit,
            tx.counterparty.as_deref().unwrap_or_default(),
            tx.remittance_info.as_deref().unwrap_or_default(),
        ),
    }
}

impl TransactionDbModel {
    pub fn from_transaction(
        account_id: &str,
        tx: &AccountTransaction,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let now = datetime_to_ms(now);
        Ok(Self {
            history_key: history_key(account_id, tx),
            external_id: tx.reference.clone(),
            account_id: account_id.to_string(),
            booking_status: tx.booking_status.clone(),
            booking_date: tx.booking_date.map(|d| d.to_string()),
            amount: tx.amount.value.clone(),
            currency: tx.amount.unit.clone(),
            raw: serde_json::to_string(tx)?,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn transaction(&self) -> Result<AccountTransaction> {
        Ok(serde_json::from_str(&self.raw)?)
    }
}
