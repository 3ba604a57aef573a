//! Background jobs.

pub mod refresh;

pub use refresh::{DataRefreshJob, RefreshOutcome};
