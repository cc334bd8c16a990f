use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::entities::*;
use crate::analytics::{self, BlockingGraph, LagThresholds, ReplicationLag};
use crate::error::{DecodeError, ProbeError};

/// Schema version stamped into every model.
pub const SCHEMA_VERSION: &str = "1.0";

/// Result of one probe: its value, the probe error if it failed, and the
/// rows that were skipped during decoding.
///
/// When `error` is set, `value` is the empty default.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Collected<T> {
    pub value: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<DecodeError>,
}

impl<T> Collected<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            error: None,
            skipped: Vec::new(),
        }
    }

    pub fn with_skipped(value: T, skipped: Vec<DecodeError>) -> Self {
        Self {
            value,
            error: None,
            skipped,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Collected<U> {
        Collected {
            value: f(self.value),
            error: self.error,
            skipped: self.skipped,
        }
    }
}

impl<T: Default> Collected<T> {
    pub fn failed(error: ProbeError) -> Self {
        Self {
            value: T::default(),
            error: Some(error),
            skipped: Vec::new(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Metadata {
    /// Schema version of this model, see [`SCHEMA_VERSION`].
    pub version: String,
    /// Collection start, seconds since Unix epoch.
    pub at: i64,
    /// Databases whose session opened and whose probes ran.
    pub collected_dbs: BTreeSet<String>,
}

/// Point-in-time diagnostic snapshot of one server.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Model {
    pub metadata: Metadata,
    pub active_sessions: Collected<Vec<ActiveSession>>,
    pub replication_status: Collected<Vec<ReplicationStatus>>,
    pub replication_slots: Collected<Vec<ReplicationSlot>>,
    pub wait_event_summary: Collected<Vec<WaitEventSummary>>,
    pub blocked_sessions: Collected<Vec<BlockedSession>>,
    /// Present only on a standby with a running receiver.
    pub wal_receiver: Collected<Option<WalReceiverStatus>>,
    /// Installed extensions keyed by database name.
    pub extensions: BTreeMap<String, Collected<Vec<Extension>>>,
}

impl Model {
    /// Whether the server is a standby, as far as the WAL receiver probe
    /// can tell. `None` when that probe failed.
    pub fn is_standby(&self) -> Option<bool> {
        if self.wal_receiver.is_ok() {
            Some(self.wal_receiver.value.is_some())
        } else {
            None
        }
    }

    /// Every recorded probe error, labeled by probe name.
    ///
    /// Per-database errors are labeled `extensions[dbname]`.
    pub fn probe_errors(&self) -> Vec<(String, &ProbeError)> {
        let global = [
            ("active_sessions", self.active_sessions.error.as_ref()),
            ("replication_status", self.replication_status.error.as_ref()),
            ("replication_slots", self.replication_slots.error.as_ref()),
            ("wait_event_summary", self.wait_event_summary.error.as_ref()),
            ("blocked_sessions", self.blocked_sessions.error.as_ref()),
            ("wal_receiver_status", self.wal_receiver.error.as_ref()),
        ];

        let mut errors: Vec<(String, &ProbeError)> = global
            .into_iter()
            .filter_map(|(name, error)| error.map(|e| (name.to_string(), e)))
            .collect();

        for (db, collected) in &self.extensions {
            if let Some(e) = &collected.error {
                errors.push((format!("extensions[{}]", db), e));
            }
        }
        errors
    }

    /// Number of rows skipped across all probes.
    pub fn skipped_rows(&self) -> usize {
        self.active_sessions.skipped.len()
            + self.replication_status.skipped.len()
            + self.replication_slots.skipped.len()
            + self.wait_event_summary.skipped.len()
            + self.blocked_sessions.skipped.len()
            + self.wal_receiver.skipped.len()
            + self
                .extensions
                .values()
                .map(|c| c.skipped.len())
                .sum::<usize>()
    }

    pub fn longest_waiting(&self, limit: usize) -> Vec<&ActiveSession> {
        analytics::longest_waiting(&self.active_sessions.value, limit)
    }

    pub fn blocking_graph(&self) -> BlockingGraph<'_> {
        BlockingGraph::from_sessions(&self.blocked_sessions.value)
    }

    pub fn classify_replication(&self, thresholds: &LagThresholds) -> Vec<ReplicationLag> {
        analytics::classify_all(&self.replication_status.value, thresholds)
    }

    /// Equality ignoring the collection timestamp.
    pub fn same_content(&self, other: &Model) -> bool {
        let mut a = self.clone();
        a.metadata.at = other.metadata.at;
        a == *other
    }
}
