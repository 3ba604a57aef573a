//! Storage, configuration and start-up errors.

use thiserror::Error;

use crate::domain::OrderStatus;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the local side: the database, stored rows, configuration and logging.
///
/// Authentication and data-access failures have their own types:
/// [`crate::session::AuthError`] and [`crate::repository::DataError`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored JSON document could not be written or read back.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored column holds a value the current code cannot parse.
    #[error("Corrupt row in {table}: invalid {column} {value:?}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        value: String,
    },

    #[error("Order cannot move from {from} to {to}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn corrupt_row(table: &'static str, column: &'static str, value: impl Into<String>) -> Self {
        Self::CorruptRow {
            table,
            column,
            value: value.into(),
        }
    }
}
