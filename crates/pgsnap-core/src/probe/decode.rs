//! Row-to-entity decoders.
//!
//! Every row is first checked against the probe's declared column list. A
//! shape mismatch (column count or type) aborts the whole probe: a result
//! set with an unrecognized schema can't be partially trusted. Rows with
//! the right shape but bad content (null key, self-block, duplicate key)
//! are skipped and recorded.
//!
//! Coercions:
//! - elapsed time: float seconds, negative clamped to 0
//! - timestamps: epoch seconds, null decodes to 0
//! - LSNs: kept as text
//! - pid arrays: server order preserved

use std::collections::HashSet;
use std::hash::Hash;

use super::{ProbeDef, ProbeKind, RawRow, Value};
use crate::error::{DecodeError, DecodeReason};
use crate::model::{
    ActiveSession, BlockedSession, Extension, ReplicationSlot, ReplicationStatus, SlotType,
    WaitEventSummary, WalReceiverStatus,
};

/// Entities decoded from one probe result, plus the rows that were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub items: Vec<T>,
    pub skipped: Vec<DecodeError>,
}

impl<T> Default for Decoded<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Checks one row against the declared column list.
pub fn check_shape(def: &ProbeDef, row_idx: usize, row: &RawRow) -> Result<(), DecodeError> {
    let error = |reason| DecodeError {
        probe: def.kind,
        row: row_idx,
        reason,
    };

    if row.len() != def.columns.len() {
        return Err(error(DecodeReason::ColumnCount {
            expected: def.columns.len(),
            found: row.len(),
        }));
    }

    for (column, value) in def.columns.iter().zip(row.values()) {
        if !column.ty.accepts(value) {
            return Err(error(DecodeReason::ColumnType {
                column: column.name.to_string(),
                expected: column.ty,
                found: value.type_name(),
            }));
        }
    }

    Ok(())
}

/// Typed access to a shape-checked row.
pub struct Fields<'a> {
    def: &'a ProbeDef,
    row: &'a RawRow,
}

impl<'a> Fields<'a> {
    fn value(&self, idx: usize) -> &'a Value {
        self.row.get(idx).unwrap_or(&Value::Null)
    }

    fn column(&self, idx: usize) -> String {
        self.def
            .columns
            .get(idx)
            .map(|c| c.name)
            .unwrap_or("?")
            .to_string()
    }

    fn null(&self, idx: usize) -> DecodeReason {
        DecodeReason::NullValue {
            column: self.column(idx),
        }
    }

    fn invalid(&self, idx: usize, value: impl ToString) -> DecodeReason {
        DecodeReason::InvalidValue {
            column: self.column(idx),
            value: value.to_string(),
        }
    }

    /// A positive process ID. Required.
    fn pid(&self, idx: usize) -> Result<i32, DecodeReason> {
        match self.value(idx) {
            Value::Int(v) => match i32::try_from(*v) {
                Ok(pid) if pid > 0 => Ok(pid),
                _ => Err(self.invalid(idx, v)),
            },
            _ => Err(self.null(idx)),
        }
    }

    /// An integer where null means 0 (timestamps, timeline IDs).
    fn int_or_zero(&self, idx: usize) -> i64 {
        match self.value(idx) {
            Value::Int(v) => *v,
            _ => 0,
        }
    }

    fn i32_or_zero(&self, idx: usize) -> Result<i32, DecodeReason> {
        let v = self.int_or_zero(idx);
        i32::try_from(v).map_err(|_| self.invalid(idx, v))
    }

    fn required_int(&self, idx: usize) -> Result<i64, DecodeReason> {
        match self.value(idx) {
            Value::Int(v) => Ok(*v),
            _ => Err(self.null(idx)),
        }
    }

    /// Elapsed seconds. Null decodes to 0, negative values clamp to 0.
    fn seconds(&self, idx: usize) -> Result<f64, DecodeReason> {
        match self.value(idx) {
            Value::Float(v) if v.is_finite() => Ok((*v).max(0.0)),
            Value::Float(v) => Err(self.invalid(idx, v)),
            _ => Ok(0.0),
        }
    }

    fn text(&self, idx: usize) -> String {
        match self.value(idx) {
            Value::Text(s) => s.clone(),
            _ => String::new(),
        }
    }

    fn required_text(&self, idx: usize) -> Result<String, DecodeReason> {
        match self.value(idx) {
            Value::Text(s) if !s.is_empty() => Ok(s.clone()),
            Value::Text(s) => Err(self.invalid(idx, s)),
            _ => Err(self.null(idx)),
        }
    }

    fn required_bool(&self, idx: usize) -> Result<bool, DecodeReason> {
        match self.value(idx) {
            Value::Bool(v) => Ok(*v),
            _ => Err(self.null(idx)),
        }
    }

    fn int_array(&self, idx: usize) -> Vec<i32> {
        match self.value(idx) {
            Value::IntArray(v) => v.clone(),
            _ => Vec::new(),
        }
    }
}

/// Decodes every row, rejecting the whole result on a shape mismatch.
///
/// `accept` runs after each successful row decode and may reject the entity
/// (e.g. a duplicate key); rejected rows are recorded as skipped.
fn decode_with<T>(
    def: &ProbeDef,
    rows: &[RawRow],
    decode: impl Fn(&Fields<'_>) -> Result<T, DecodeReason>,
    mut accept: impl FnMut(&T) -> Result<(), DecodeReason>,
) -> Result<Decoded<T>, DecodeError> {
    for (idx, row) in rows.iter().enumerate() {
        check_shape(def, idx, row)?;
    }

    let mut decoded = Decoded::default();
    for (idx, row) in rows.iter().enumerate() {
        let fields = Fields { def, row };
        match decode(&fields).and_then(|item| accept(&item).map(|_| item)) {
            Ok(item) => decoded.items.push(item),
            Err(reason) => decoded.skipped.push(DecodeError {
                probe: def.kind,
                row: idx,
                reason,
            }),
        }
    }
    Ok(decoded)
}

/// Like [`decode_with`], skipping rows whose key was already seen.
fn decode_unique<T, K: Eq + Hash>(
    kind: ProbeKind,
    rows: &[RawRow],
    key_column: usize,
    decode: impl Fn(&Fields<'_>) -> Result<T, DecodeReason>,
    key: impl Fn(&T) -> K,
    describe: impl Fn(&K) -> String,
) -> Result<Decoded<T>, DecodeError> {
    let def = kind.def();
    let mut seen = HashSet::new();
    decode_with(def, rows, decode, |item| {
        let k = key(item);
        let label = describe(&k);
        if seen.insert(k) {
            Ok(())
        } else {
            Err(DecodeReason::InvalidValue {
                column: def.columns[key_column].name.to_string(),
                value: format!("duplicate {}", label),
            })
        }
    })
}

pub fn active_sessions(rows: &[RawRow]) -> Result<Decoded<ActiveSession>, DecodeError> {
    decode_unique(
        ProbeKind::ActiveSessions,
        rows,
        0,
        |f| {
            Ok(ActiveSession {
                pid: f.pid(0)?,
                wait_event_type: f.text(1),
                wait_event: f.text(2),
                query: f.text(3),
                state: f.text(4),
                duration: f.seconds(5)?,
            })
        },
        |s| s.pid,
        |pid| pid.to_string(),
    )
}

pub fn replication_status(rows: &[RawRow]) -> Result<Decoded<ReplicationStatus>, DecodeError> {
    decode_unique(
        ProbeKind::ReplicationStatus,
        rows,
        0,
        |f| {
            Ok(ReplicationStatus {
                pid: f.pid(0)?,
                state: f.text(1),
                application_name: f.text(2),
                client_addr: f.text(3),
                backend_start: f.int_or_zero(4),
                sent_lsn: f.text(5),
                write_lsn: f.text(6),
                flush_lsn: f.text(7),
                replay_lsn: f.text(8),
            })
        },
        |r| r.pid,
        |pid| pid.to_string(),
    )
}

pub fn replication_slots(rows: &[RawRow]) -> Result<Decoded<ReplicationSlot>, DecodeError> {
    decode_unique(
        ProbeKind::ReplicationSlots,
        rows,
        0,
        |f| {
            let slot_type = f.text(2);
            Ok(ReplicationSlot {
                slot_name: f.required_text(0)?,
                plugin: f.text(1),
                slot_type: slot_type
                    .parse::<SlotType>()
                    .map_err(|value| f.invalid(2, value))?,
                active: f.required_bool(3)?,
                restart_lsn: f.text(4),
                confirmed_flush_lsn: f.text(5),
            })
        },
        |s| s.slot_name.clone(),
        |name| name.clone(),
    )
}

pub fn wait_event_summary(rows: &[RawRow]) -> Result<Decoded<WaitEventSummary>, DecodeError> {
    decode_unique(
        ProbeKind::WaitEventSummary,
        rows,
        1,
        |f| {
            let sessions = f.required_int(2)?;
            if sessions < 1 {
                return Err(f.invalid(2, sessions));
            }
            Ok(WaitEventSummary {
                wait_event_type: f.text(0),
                wait_event: f.text(1),
                sessions,
            })
        },
        |w| (w.wait_event_type.clone(), w.wait_event.clone()),
        |(ty, ev)| format!("{}/{}", ty, ev),
    )
}

pub fn blocked_sessions(rows: &[RawRow]) -> Result<Decoded<BlockedSession>, DecodeError> {
    decode_unique(
        ProbeKind::BlockedSessions,
        rows,
        0,
        |f| {
            let blocked_pid = f.pid(0)?;
            let blocking_pids = f.int_array(4);
            if blocking_pids.is_empty() {
                return Err(f.invalid(4, "{}"));
            }
            if blocking_pids.contains(&blocked_pid) {
                return Err(f.invalid(4, format!("{:?} contains {}", blocking_pids, blocked_pid)));
            }
            Ok(BlockedSession {
                blocked_pid,
                wait_event_type: f.text(1),
                wait_event: f.text(2),
                blocked_query: f.text(3),
                blocking_pids,
            })
        },
        |b| b.blocked_pid,
        |pid| pid.to_string(),
    )
}

/// At most one entity; any further rows are recorded as skipped.
pub fn wal_receiver(rows: &[RawRow]) -> Result<Decoded<WalReceiverStatus>, DecodeError> {
    let mut decoded = decode_with(
        ProbeKind::WalReceiver.def(),
        rows,
        |f| {
            Ok(WalReceiverStatus {
                pid: f.pid(0)?,
                status: f.text(1),
                receive_start_lsn: f.text(2),
                receive_start_tli: f.i32_or_zero(3)?,
                received_lsn: f.text(4),
                received_tli: f.i32_or_zero(5)?,
                last_msg_send_time: f.int_or_zero(6),
                last_msg_receipt_time: f.int_or_zero(7),
                latency: f.int_or_zero(8).max(0),
                latest_end_lsn: f.text(9),
                latest_end_time: f.int_or_zero(10),
                slot_name: f.text(11),
                conninfo: f.text(12),
            })
        },
        |_| Ok(()),
    )?;

    if decoded.items.len() > 1 {
        let extra = decoded.items.len() - 1;
        decoded.items.truncate(1);
        // Row indexes of the dropped entities aren't tracked; report them after the kept one.
        for n in 0..extra {
            decoded.skipped.push(DecodeError {
                probe: ProbeKind::WalReceiver,
                row: n + 1,
                reason: DecodeReason::UnexpectedRow,
            });
        }
    }
    Ok(decoded)
}

pub fn extensions(rows: &[RawRow]) -> Result<Decoded<Extension>, DecodeError> {
    decode_unique(
        ProbeKind::Extensions,
        rows,
        0,
        |f| {
            Ok(Extension {
                name: f.required_text(0)?,
                schema_name: f.text(1),
                installed_version: f.text(2),
                default_version: f.text(3),
                comment: f.text(4),
            })
        },
        |e| e.name.clone(),
        |name| name.clone(),
    )
}
