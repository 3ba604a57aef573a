//! Repository layer over the SQLite pool.

pub mod credential_store;
pub mod history;
pub mod order;
pub mod sync_log;

pub use credential_store::SqlxCredentialStore;
pub use history::{HistoryRepository, SqlxHistoryRepository};
pub use order::{OrderRepository, SqlxOrderRepository};
pub use sync_log::{SqlxSyncLogRepository, SyncLogRepository};
