//! Trial results and their on-disk store.

pub mod store;
pub mod types;

pub use store::ResultStore;
pub use types::{TestResult, TrialStatus};
