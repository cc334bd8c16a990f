//! The probe catalog.
//!
//! A probe is a read-only query against server runtime views, mapped to one
//! entity type. The catalog is a process-wide constant table; each snapshot
//! run reads it but owns no part of it.
//!
//! Probes:
//! - `pg_stat_activity`: sessions waiting on an event, wait-event summary, blocked sessions
//! - `pg_stat_replication`: connected replicas (primary only)
//! - `pg_replication_slots`: physical and logical slots
//! - `pg_stat_wal_receiver`: WAL receiver (standby only)
//! - `pg_extension`: installed extensions (per database)

pub mod decode;
mod queries;
mod row;

use serde::{Deserialize, Serialize};

pub use row::{RawRow, Value};

/// Entity type a probe produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    ActiveSessions,
    ReplicationStatus,
    ReplicationSlots,
    WaitEventSummary,
    BlockedSessions,
    WalReceiver,
    Extensions,
}

impl ProbeKind {
    /// Probes that run once per snapshot on the main session, in run order.
    pub const GLOBAL: [ProbeKind; 6] = [
        ProbeKind::ActiveSessions,
        ProbeKind::ReplicationStatus,
        ProbeKind::ReplicationSlots,
        ProbeKind::WaitEventSummary,
        ProbeKind::BlockedSessions,
        ProbeKind::WalReceiver,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProbeKind::ActiveSessions => "active_sessions",
            ProbeKind::ReplicationStatus => "replication_status",
            ProbeKind::ReplicationSlots => "replication_slots",
            ProbeKind::WaitEventSummary => "wait_event_summary",
            ProbeKind::BlockedSessions => "blocked_sessions",
            ProbeKind::WalReceiver => "wal_receiver_status",
            ProbeKind::Extensions => "extensions",
        }
    }

    /// Catalog entry for this probe.
    pub fn def(self) -> &'static ProbeDef {
        &CATALOG[self as usize]
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a probe runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeScope {
    /// Once per snapshot, regardless of database count.
    Global,
    /// Once per target database, on that database's own session.
    PerDatabase,
}

/// Declared type of a result column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Int,
    Float,
    Text,
    Bool,
    IntArray,
}

impl ColumnType {
    /// Whether `value` fits this column. Null fits any column; nullability
    /// is a per-entity decision.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ColumnType::Int, Value::Int(_))
                | (ColumnType::Float, Value::Float(_))
                | (ColumnType::Text, Value::Text(_))
                | (ColumnType::Bool, Value::Bool(_))
                | (ColumnType::IntArray, Value::IntArray(_))
        )
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Bool => "bool",
            ColumnType::IntArray => "int[]",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty }
}

/// Static definition of a probe: SQL plus the expected row shape.
#[derive(Debug)]
pub struct ProbeDef {
    pub kind: ProbeKind,
    pub scope: ProbeScope,
    /// Backing server view, for diagnostics.
    pub view: &'static str,
    pub sql: &'static str,
    pub columns: &'static [Column],
}

use ColumnType::{Bool, Float, Int, IntArray, Text};

/// Indexed by `ProbeKind as usize`.
pub static CATALOG: [ProbeDef; 7] = [
    ProbeDef {
        kind: ProbeKind::ActiveSessions,
        scope: ProbeScope::Global,
        view: "pg_stat_activity",
        sql: queries::ACTIVE_SESSIONS,
        columns: &[
            col("pid", Int),
            col("wait_event_type", Text),
            col("wait_event", Text),
            col("query", Text),
            col("state", Text),
            col("duration", Float),
        ],
    },
    ProbeDef {
        kind: ProbeKind::ReplicationStatus,
        scope: ProbeScope::Global,
        view: "pg_stat_replication",
        sql: queries::REPLICATION_STATUS,
        columns: &[
            col("pid", Int),
            col("state", Text),
            col("application_name", Text),
            col("client_addr", Text),
            col("backend_start", Int),
            col("sent_lsn", Text),
            col("write_lsn", Text),
            col("flush_lsn", Text),
            col("replay_lsn", Text),
        ],
    },
    ProbeDef {
        kind: ProbeKind::ReplicationSlots,
        scope: ProbeScope::Global,
        view: "pg_replication_slots",
        sql: queries::REPLICATION_SLOTS,
        columns: &[
            col("slot_name", Text),
            col("plugin", Text),
            col("slot_type", Text),
            col("active", Bool),
            col("restart_lsn", Text),
            col("confirmed_flush_lsn", Text),
        ],
    },
    ProbeDef {
        kind: ProbeKind::WaitEventSummary,
        scope: ProbeScope::Global,
        view: "pg_stat_activity",
        sql: queries::WAIT_EVENT_SUMMARY,
        columns: &[
            col("wait_event_type", Text),
            col("wait_event", Text),
            col("sessions", Int),
        ],
    },
    ProbeDef {
        kind: ProbeKind::BlockedSessions,
        scope: ProbeScope::Global,
        view: "pg_stat_activity",
        sql: queries::BLOCKED_SESSIONS,
        columns: &[
            col("blocked_pid", Int),
            col("wait_event_type", Text),
            col("wait_event", Text),
            col("blocked_query", Text),
            col("blocking_pids", IntArray),
        ],
    },
    ProbeDef {
        kind: ProbeKind::WalReceiver,
        scope: ProbeScope::Global,
        view: "pg_stat_wal_receiver",
        sql: queries::WAL_RECEIVER,
        columns: &[
            col("pid", Int),
            col("status", Text),
            col("receive_start_lsn", Text),
            col("receive_start_tli", Int),
            col("received_lsn", Text),
            col("received_tli", Int),
            col("last_msg_send_time", Int),
            col("last_msg_receipt_time", Int),
            col("latency", Int),
            col("latest_end_lsn", Text),
            col("latest_end_time", Int),
            col("slot_name", Text),
            col("conninfo", Text),
        ],
    },
    ProbeDef {
        kind: ProbeKind::Extensions,
        scope: ProbeScope::PerDatabase,
        view: "pg_extension",
        sql: queries::EXTENSIONS,
        columns: &[
            col("name", Text),
            col("schema_name", Text),
            col("installed_version", Text),
            col("default_version", Text),
            col("comment", Text),
        ],
    },
];

/// The whole catalog.
pub fn catalog() -> &'static [ProbeDef] {
    &CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_indexed_by_kind() {
        for (idx, def) in catalog().iter().enumerate() {
            assert_eq!(def.kind as usize, idx);
            assert_eq!(def.kind.def().kind, def.kind);
        }
    }

    #[test]
    fn global_probes_are_global() {
        for kind in ProbeKind::GLOBAL {
            assert_eq!(kind.def().scope, ProbeScope::Global);
        }
        assert_eq!(ProbeKind::Extensions.def().scope, ProbeScope::PerDatabase);
    }

    #[test]
    fn select_lists_match_declared_columns() {
        for def in catalog() {
            for column in def.columns {
                assert!(
                    def.sql.contains(column.name),
                    "{} sql does not mention column {}",
                    def.kind,
                    column.name
                );
            }
        }
    }

    #[test]
    fn probes_are_read_only() {
        for def in catalog() {
            let sql = def.sql.to_ascii_uppercase();
            for keyword in ["INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE"] {
                assert!(!sql.contains(keyword), "{} contains {}", def.kind, keyword);
            }
        }
    }

    #[test]
    fn null_fits_any_column() {
        assert!(ColumnType::Int.accepts(&Value::Null));
        assert!(ColumnType::Int.accepts(&Value::Int(1)));
        assert!(!ColumnType::Int.accepts(&Value::Float(1.0)));
        assert!(!ColumnType::Text.accepts(&Value::Unsupported("inet".to_string())));
    }
}
