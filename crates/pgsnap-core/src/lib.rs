//! pgsnap-core - point-in-time diagnostic snapshots of a PostgreSQL server.
//!
//! Provides:
//! - `probe`: the fixed catalog of read-only diagnostic queries and their row decoders
//! - `collector`: session abstraction, the snapshot assembler, postgres and mock sessions
//! - `model`: the serializable snapshot model (entities + metadata)
//! - `analytics`: pure views over a model (longest waiters, blocking chains, replication lag)
//! - `config`: connection and collection options
//! - `error`: probe, decode and collection error types

pub mod analytics;
pub mod collector;
pub mod config;
pub mod error;
pub mod model;
pub mod probe;

pub use collector::{AssemblerState, SnapshotAssembler};
pub use config::CollectConfig;
pub use error::{CollectError, ConfigError, CycleDetected, DecodeError, ProbeError};
pub use model::{Model, SCHEMA_VERSION};
