//! Entities decoded from probe rows.
//!
//! All timestamps are seconds since Unix epoch (0 when the server reported
//! null). LSNs are kept as the server's textual `XX/YYYYYYYY` tokens.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A session waiting on an event while executing a statement.
///
/// Source: `pg_stat_activity` where `wait_event IS NOT NULL AND state = 'active'`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ActiveSession {
    /// Backend process ID, unique within a snapshot.
    pub pid: i32,
    /// Wait event category (Lock, LWLock, IO, ...).
    pub wait_event_type: String,
    pub wait_event: String,
    /// Statement text, possibly truncated to `track_activity_query_size`.
    pub query: String,
    pub state: String,
    /// Seconds since `query_start`, never negative.
    pub duration: f64,
}

/// A connected replica as seen by the primary.
///
/// Source: `pg_stat_replication`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ReplicationStatus {
    /// WAL sender process ID.
    pub pid: i32,
    /// streaming, catchup, backup, startup, stopping.
    pub state: String,
    pub application_name: String,
    pub client_addr: String,
    pub backend_start: i64,
    pub sent_lsn: String,
    pub write_lsn: String,
    pub flush_lsn: String,
    pub replay_lsn: String,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SlotType {
    #[default]
    Physical,
    Logical,
}

impl SlotType {
    pub fn as_str(self) -> &'static str {
        match self {
            SlotType::Physical => "physical",
            SlotType::Logical => "logical",
        }
    }
}

impl std::fmt::Display for SlotType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SlotType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "physical" => Ok(SlotType::Physical),
            "logical" => Ok(SlotType::Logical),
            other => Err(other.to_string()),
        }
    }
}

/// Source: `pg_replication_slots`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ReplicationSlot {
    /// Unique within a snapshot.
    pub slot_name: String,
    /// Output plugin; empty for physical slots.
    pub plugin: String,
    pub slot_type: SlotType,
    pub active: bool,
    pub restart_lsn: String,
    /// Empty for physical slots.
    pub confirmed_flush_lsn: String,
}

/// Number of active sessions per (wait_event_type, wait_event).
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct WaitEventSummary {
    pub wait_event_type: String,
    pub wait_event: String,
    /// Always at least 1.
    pub sessions: i64,
}

/// A session whose lock request is blocked by one or more other sessions.
///
/// Source: `pg_stat_activity` + `pg_blocking_pids()`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct BlockedSession {
    pub blocked_pid: i32,
    pub wait_event_type: String,
    pub wait_event: String,
    pub blocked_query: String,
    /// Non-empty, server-reported order, never contains `blocked_pid`.
    pub blocking_pids: Vec<i32>,
}

/// Standby-side WAL receiver.
///
/// Source: `pg_stat_wal_receiver`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct WalReceiverStatus {
    pub pid: i32,
    pub status: String,
    pub receive_start_lsn: String,
    pub receive_start_tli: i32,
    /// Last WAL location flushed to disk by the receiver.
    pub received_lsn: String,
    pub received_tli: i32,
    pub last_msg_send_time: i64,
    pub last_msg_receipt_time: i64,
    /// Receipt minus send time of the last message, in microseconds.
    pub latency: i64,
    pub latest_end_lsn: String,
    pub latest_end_time: i64,
    pub slot_name: String,
    pub conninfo: String,
}

/// An installed extension in one database.
///
/// Source: `pg_extension` + `pg_available_extensions`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct Extension {
    pub name: String,
    pub schema_name: String,
    pub installed_version: String,
    /// Empty when the control file is no longer available.
    pub default_version: String,
    pub comment: String,
}

impl Extension {
    /// True when a newer version is available than the one installed.
    pub fn upgrade_available(&self) -> bool {
        !self.default_version.is_empty() && self.default_version != self.installed_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_type_round_trips_names() {
        assert_eq!("logical".parse::<SlotType>(), Ok(SlotType::Logical));
        assert_eq!(SlotType::Physical.to_string(), "physical");
        assert_eq!("temporary".parse::<SlotType>(), Err("temporary".to_string()));
    }

    #[test]
    fn extension_upgrade_available() {
        let mut ext = Extension {
            name: "pg_stat_statements".to_string(),
            installed_version: "1.9".to_string(),
            default_version: "1.10".to_string(),
            ..Extension::default()
        };
        assert!(ext.upgrade_available());
        ext.default_version = "1.9".to_string();
        assert!(!ext.upgrade_available());
        ext.default_version.clear();
        assert!(!ext.upgrade_available());
    }
}
