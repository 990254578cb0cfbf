//! Event-log consistency: pure rewrites and the optimistic update driver.

pub mod rewrite;
pub mod update;

pub use rewrite::{LogTransform, Rewrite};
pub use update::{EventLogUpdater, RetryPolicy, UpdateOutcome};
