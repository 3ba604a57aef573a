//! Locally tracked orders.
//!
//! A [`LocalOrder`] is created as a draft without contacting the bank and is
//! advanced only by explicit user actions and by the bank's answers to a sync.
//!
//! ```text
//! Draft --sync--> Submitted --ack--> Confirmed
//!   ^                 |     \--ack--> Rejected
//!   +--transport err--+
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

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
pub enum OrderStatus {
    /// Created locally, not yet accepted by the bank.
    Draft,
    /// A submission is in flight.
    Submitted,
    Confirmed,
    Rejected,
}

impl OrderStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Rejected)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInstructions {
    /// ISIN or WKN.
    pub instrument: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OrderInstructions {
    pub fn validate(&self) -> Result<()> {
        if self.instrument.trim().is_empty() {
            return Err(Error::validation("instrument is required"));
        }
        if !(self.quantity.is_finite() && self.quantity > 0.0) {
            return Err(Error::validation("quantity must be positive"));
        }
        match (self.order_type, self.limit_price) {
            (OrderType::Limit, Some(price)) if price.is_finite() && price > 0.0 => Ok(()),
            (OrderType::Limit, _) => Err(Error::validation(
                "limit orders need a positive limit price",
            )),
            (OrderType::Market, Some(_)) => Err(Error::validation(
                "market orders cannot carry a limit price",
            )),
            (OrderType::Market, None) => Ok(()),
        }
    }
}

/// The bank's answer to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub remote_order_id: Option<String>,
    pub accepted: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalOrder {
    /// Client-assigned id.
    pub id: String,
    /// Depot the order is placed in.
    pub account_id: String,
    pub instructions: OrderInstructions,
    pub status: OrderStatus,
    pub remote_order_id: Option<String>,
    pub last_sync_error: Option<String>,
    pub sync_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl LocalOrder {
    pub fn new(
        account_id: impl Into<String>,
        instructions: OrderInstructions,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            instructions,
            status: OrderStatus::Draft,
            remote_order_id: None,
            last_sync_error: None,
            sync_attempts: 0,
            created_at: now,
            updated_at: now,
            last_synced_at: None,
        }
    }

    fn transition(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<()> {
        let allowed = matches!(
            (self.status, to),
            (OrderStatus::Draft, OrderStatus::Submitted)
                | (OrderStatus::Submitted, OrderStatus::Draft)
                | (OrderStatus::Submitted, OrderStatus::Confirmed)
                | (OrderStatus::Submitted, OrderStatus::Rejected)
        );
        if !allowed {
            return Err(Error::InvalidOrderTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_submitted(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(OrderStatus::Submitted, now)?;
        self.sync_attempts += 1;
        self.last_synced_at = Some(now);
        Ok(())
    }

    /// Apply the bank's answer to a submission.
    pub fn apply_ack(&mut self, ack: OrderAck, now: DateTime<Utc>) -> Result<()> {
        if ack.accepted {
            self.transition(OrderStatus::Confirmed, now)?;
            self.last_sync_error = None;
        } else {
            self.transition(OrderStatus::Rejected, now)?;
            self.last_sync_error = ack.message;
        }
        self.remote_order_id = ack.remote_order_id;
        Ok(())
    }

    /// Put a submitted order back to draft after a failed attempt.
    pub fn revert_to_draft(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition(OrderStatus::Draft, now)?;
        self.last_sync_error = Some(error.into());
        Ok(())
    }
}
