//! Derived views over a snapshot. Pure functions, no I/O.

mod blocking;
mod replication;
mod sessions;
mod waits;

pub use blocking::{BlockingChain, BlockingGraph};
pub use replication::{LagClass, LagThresholds, ReplicationLag, classify, classify_all, parse_lsn};
pub use sessions::longest_waiting;
pub use waits::{WaitSummaryViolation, aggregate_wait_events, validate_wait_summary};
