//! Snapshot collection.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    SnapshotAssembler                      │
//! │  global probes ──► borrowed session (sequential)          │
//! │  per-db probes ──► SessionFactory ──► worker per database │
//! │                         │               │                 │
//! │                         └── mpsc ◄──────┘                 │
//! └──────────────────────────┬────────────────────────────────┘
//!                            │
//!                     ┌──────▼───────┐
//!                     │ ProbeSession │ (trait)
//!                     └──────┬───────┘
//!              ┌─────────────┴─────────────┐
//!       ┌──────▼──────┐             ┌──────▼──────┐
//!       │  PgSession  │             │ MockSession │
//!       │ (postgres)  │             │  (testing)  │
//!       └─────────────┘             └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use pgsnap_core::collector::{PgConnector, PgSession};
//! use pgsnap_core::{CollectConfig, SnapshotAssembler};
//!
//! let config = CollectConfig::from_env()?;
//! let mut session = PgSession::connect(&config, config.main_database())?;
//! let connector = PgConnector::new(config.clone());
//! let model = SnapshotAssembler::new(config, &mut session)?
//!     .with_session_factory(&connector)
//!     .collect()?;
//! ```

mod assembler;
pub mod mock;
mod pg_session;
pub mod traits;

pub use assembler::{AssemblerState, SnapshotAssembler};
pub use mock::{MockFactory, MockResponse, MockSession};
pub use pg_session::{PgConnector, PgSession};
pub use traits::{ProbeSession, SessionError, SessionFactory};
