//! Pre-built mock server states for testing.
//!
//! Rows are laid out exactly as the catalog queries return them.

use super::session::MockSession;
use crate::probe::{ProbeKind, RawRow, Value};

pub(crate) fn active_row(pid: i32, ty: &str, event: &str, query: &str, duration: f64) -> RawRow {
    RawRow::new(vec![
        pid.into(),
        ty.into(),
        event.into(),
        query.into(),
        "active".into(),
        duration.into(),
    ])
}

pub(crate) fn replication_row(pid: i32, state: &str, app: &str, sent: &str, replay: &str) -> RawRow {
    RawRow::new(vec![
        pid.into(),
        state.into(),
        app.into(),
        "10.0.0.12".into(),
        1640995200i64.into(),
        sent.into(),
        sent.into(),
        replay.into(),
        replay.into(),
    ])
}

pub(crate) fn slot_row(name: &str, plugin: Option<&str>, slot_type: &str, active: bool) -> RawRow {
    let confirmed: Value = if slot_type == "logical" {
        "0/3000148".into()
    } else {
        Value::Null
    };
    RawRow::new(vec![
        name.into(),
        plugin.into(),
        slot_type.into(),
        active.into(),
        "0/3000060".into(),
        confirmed,
    ])
}

pub(crate) fn summary_row(ty: &str, event: &str, sessions: i64) -> RawRow {
    RawRow::new(vec![ty.into(), event.into(), sessions.into()])
}

pub(crate) fn blocked_row(pid: i32, query: &str, blockers: &[i32]) -> RawRow {
    RawRow::new(vec![
        pid.into(),
        "Lock".into(),
        "transactionid".into(),
        query.into(),
        blockers.to_vec().into(),
    ])
}

pub(crate) fn wal_receiver_row(pid: i32, status: &str, received: &str) -> RawRow {
    RawRow::new(vec![
        pid.into(),
        status.into(),
        "0/3000000".into(),
        1i32.into(),
        received.into(),
        1i32.into(),
        1640995200i64.into(),
        1640995200i64.into(),
        850i64.into(),
        received.into(),
        1640995199i64.into(),
        "standby_1".into(),
        "host=10.0.0.11 port=5432 user=replicator".into(),
    ])
}

pub(crate) fn extension_row(name: &str, installed: &str, default: Option<&str>) -> RawRow {
    RawRow::new(vec![
        name.into(),
        "public".into(),
        installed.into(),
        default.into(),
        Value::Null,
    ])
}

impl MockSession {
    /// A busy primary with two replicas, one lagging, and a lock queue
    /// 101 <- 102 <- 103.
    pub fn primary() -> Self {
        Self::new()
            .with_rows(
                ProbeKind::ActiveSessions,
                vec![
                    active_row(103, "Lock", "transactionid", "UPDATE accounts SET balance = 0", 42.5),
                    active_row(102, "Lock", "transactionid", "UPDATE accounts SET balance = 1", 12.25),
                    active_row(201, "IO", "DataFileRead", "SELECT count(*) FROM events", 3.0),
                ],
            )
            .with_rows(
                ProbeKind::ReplicationStatus,
                vec![
                    replication_row(3001, "streaming", "standby_1", "0/3000148", "0/3000148"),
                    replication_row(3002, "streaming", "standby_2", "0/3000148", "0/2000000"),
                ],
            )
            .with_rows(
                ProbeKind::ReplicationSlots,
                vec![
                    slot_row("cdc", Some("pgoutput"), "logical", false),
                    slot_row("standby_1", None, "physical", true),
                    slot_row("standby_2", None, "physical", true),
                ],
            )
            .with_rows(
                ProbeKind::WaitEventSummary,
                vec![
                    summary_row("Lock", "transactionid", 2),
                    summary_row("IO", "DataFileRead", 1),
                ],
            )
            .with_rows(
                ProbeKind::BlockedSessions,
                vec![
                    blocked_row(102, "UPDATE accounts SET balance = 1", &[101]),
                    blocked_row(103, "UPDATE accounts SET balance = 0", &[102]),
                ],
            )
            .with_rows(ProbeKind::WalReceiver, Vec::new())
    }

    /// A quiet standby streaming from its primary.
    pub fn standby() -> Self {
        Self::new()
            .with_rows(
                ProbeKind::ActiveSessions,
                vec![active_row(
                    4100,
                    "IPC",
                    "RecoveryConflictSnapshot",
                    "SELECT * FROM reports",
                    0.75,
                )],
            )
            .with_rows(
                ProbeKind::ReplicationSlots,
                vec![slot_row("standby_1", None, "physical", false)],
            )
            .with_rows(
                ProbeKind::WaitEventSummary,
                vec![summary_row("IPC", "RecoveryConflictSnapshot", 1)],
            )
            .with_rows(
                ProbeKind::WalReceiver,
                vec![wal_receiver_row(44444, "streaming", "0/3000148")],
            )
    }

    /// A database with a couple of extensions, one upgradable.
    pub fn with_extensions() -> Self {
        Self::new().with_rows(
            ProbeKind::Extensions,
            vec![
                extension_row("pg_stat_statements", "1.9", Some("1.10")),
                extension_row("plpgsql", "1.0", Some("1.0")),
            ],
        )
    }
}
