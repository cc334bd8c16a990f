//! Snapshot model.
//!
//! A [`Model`] is produced once per collection run and never mutated after
//! assembly. Every entity sequence is wrapped in [`Collected`], so an empty
//! sequence caused by a failed probe is distinguishable from an empty
//! sequence the server actually reported.

mod entities;
mod snapshot;

pub use entities::{
    ActiveSession, BlockedSession, Extension, ReplicationSlot, ReplicationStatus, SlotType,
    WaitEventSummary, WalReceiverStatus,
};
pub use snapshot::{Collected, Metadata, Model, SCHEMA_VERSION};
