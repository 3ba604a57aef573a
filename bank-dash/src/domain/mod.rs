//! Domain layer: account data and locally tracked orders.

pub mod account;
pub mod order;

pub use account::{
    AccountBalance, AccountTransaction, Amount, BalanceSummary, TransactionDirection,
    TransactionQuery, TransactionState,
};
pub use order::{LocalOrder, OrderAck, OrderInstructions, OrderSide, OrderStatus, OrderType};
