use std::str::FromStr;

use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{LocalOrder, OrderInstructions, OrderSide, OrderStatus, OrderType};
use crate::{Error, Result};

/// `local_orders` row; instructions are flattened into columns.
#[derive(Debug, Clone, FromRow)]
pub struct LocalOrderDbModel {
    pub id: String,
    pub account_id: String,
    pub instrument: String,
    pub side: String,
    pub order_type: String,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub notes: Option<String>,
    pub status: String,
    pub remote_order_id: Option<String>,
    pub last_sync_error: Option<String>,
    pub sync_attempts: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_synced_at: Option<i64>,
}

fn parse_column<T: FromStr>(column: &'static str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::corrupt_row("local_orders", column, value))
}

impl From<&LocalOrder> for LocalOrderDbModel {
    fn from(order: &LocalOrder) -> Self {
        let instructions = &order.instructions;
        Self {
            id: order.id.clone(),
            account_id: order.account_id.clone(),
            instrument: instructions.instrument.clone(),
            side: instructions.side.to_string(),
            order_type: instructions.order_type.to_string(),
            quantity: instructions.quantity,
            limit_price: instructions.limit_price,
            notes: instructions.notes.clone(),
            status: order.status.to_string(),
            remote_order_id: order.remote_order_id.clone(),
            last_sync_error: order.last_sync_error.clone(),
            sync_attempts: i64::from(order.sync_attempts),
            created_at: datetime_to_ms(order.created_at),
            updated_at: datetime_to_ms(order.updated_at),
            last_synced_at: order.last_synced_at.map(datetime_to_ms),
        }
    }
}

impl TryFrom<LocalOrderDbModel> for LocalOrder {
    type Error = Error;

    fn try_from(row: LocalOrderDbModel) -> Result<Self> {
        Ok(Self {
            instructions: OrderInstructions {
                instrument: row.instrument,
                side: parse_column::<OrderSide>("side", &row.side)?,
                order_type: parse_column::<OrderType>("order_type", &row.order_type)?,
                quantity: row.quantity,
                limit_price: row.limit_price,
                notes: row.notes,
            },
            id: row.id,
            account_id: row.account_id,
            status: parse_column::<OrderStatus>("status", &row.status)?,
            remote_order_id: row.remote_order_id,
            last_sync_error: row.last_sync_error,
            sync_attempts: u32::try_from(row.sync_attempts).unwrap_or(u32::MAX),
            created_at: ms_to_datetime(row.created_at),
            updated_at: ms_to_datetime(row.updated_at),
            last_synced_at: row.last_synced_at.map(ms_to_datetime),
        })
    }
}
