//! Error types for snapshot collection.
//!
//! Probe and decode errors are carried inside the [`Model`](crate::model::Model)
//! next to the entity sequence they affected, so they derive serde.
//! [`CollectError`] is the only error that aborts a collection run.

use serde::{Deserialize, Serialize};

use crate::probe::{ColumnType, ProbeKind};

/// Failure of a single probe. Never fatal to the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeError {
    /// The server lacks the backing view, column or function.
    Unsupported { message: String },
    /// The role cannot see the backing view.
    PermissionDenied { message: String },
    /// The collection deadline elapsed before the probe completed.
    Timeout,
    /// The result set did not match the probe schema.
    Decode { error: DecodeError },
    /// Any other server-side error.
    Query { message: String },
    /// A per-database session could not be opened.
    Connection { message: String },
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::Unsupported { message } => write!(f, "unsupported: {}", message),
            ProbeError::PermissionDenied { message } => write!(f, "permission denied: {}", message),
            ProbeError::Timeout => write!(f, "collection deadline elapsed"),
            ProbeError::Decode { error } => write!(f, "{}", error),
            ProbeError::Query { message } => write!(f, "query error: {}", message),
            ProbeError::Connection { message } => write!(f, "connection failed: {}", message),
        }
    }
}

impl std::error::Error for ProbeError {}

/// A probe row that could not be turned into an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeError {
    pub probe: ProbeKind,
    /// Zero-based row index within the probe result.
    pub row: usize,
    pub reason: DecodeReason,
}

impl DecodeError {
    /// Shape errors mean the whole result set can't be trusted.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self.reason,
            DecodeReason::ColumnCount { .. } | DecodeReason::ColumnType { .. }
        )
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} row {}: {}", self.probe, self.row, self.reason)
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecodeReason {
    ColumnCount {
        expected: usize,
        found: usize,
    },
    ColumnType {
        column: String,
        expected: ColumnType,
        found: String,
    },
    NullValue {
        column: String,
    },
    InvalidValue {
        column: String,
        value: String,
    },
    /// More rows than a singleton probe may return.
    UnexpectedRow,
}

impl std::fmt::Display for DecodeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeReason::ColumnCount { expected, found } => {
                write!(f, "expected {} columns, found {}", expected, found)
            }
            DecodeReason::ColumnType {
                column,
                expected,
                found,
            } => write!(f, "column {} expected {}, found {}", column, expected, found),
            DecodeReason::NullValue { column } => write!(f, "column {} is null", column),
            DecodeReason::InvalidValue { column, value } => {
                write!(f, "column {} has invalid value {:?}", column, value)
            }
            DecodeReason::UnexpectedRow => write!(f, "unexpected extra row"),
        }
    }
}

/// A blocking chain that loops back on itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleDetected {
    /// PID reachable from itself.
    pub pid: i32,
    /// The loop, starting and ending at `pid`.
    pub path: Vec<i32>,
}

impl std::fmt::Display for CycleDetected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path: Vec<String> = self.path.iter().map(|p| p.to_string()).collect();
        write!(f, "blocking cycle at pid {}: {}", self.pid, path.join(" -> "))
    }
}

impl std::error::Error for CycleDetected {}

/// Invalid or missing configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Environment variable not set.
    EnvNotSet(String),
    /// Environment variable or option has an unparsable value.
    InvalidValue { name: String, value: String },
    EmptyHost,
    EmptyUser,
    ZeroPort,
    ZeroTimeout,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvNotSet(var) => write!(f, "{} not set", var),
            ConfigError::InvalidValue { name, value } => {
                write!(f, "invalid value for {}: {:?}", name, value)
            }
            ConfigError::EmptyHost => write!(f, "host must not be empty"),
            ConfigError::EmptyUser => write!(f, "user must not be empty"),
            ConfigError::ZeroPort => write!(f, "port must be non-zero"),
            ConfigError::ZeroTimeout => write!(f, "timeout must be at least one second"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Fatal collection error. No model is produced.
#[derive(Debug)]
pub enum CollectError {
    /// Configuration rejected before probing.
    Config(ConfigError),
    /// Connection could not be established.
    Connection(String),
    /// The session became unusable mid-collection.
    SessionLost(String),
    /// The assembler already ran; it never re-enters probing.
    AlreadyCollected,
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Config(e) => write!(f, "configuration: {}", e),
            CollectError::Connection(msg) => write!(f, "PostgreSQL: {}", msg),
            CollectError::SessionLost(msg) => write!(f, "PostgreSQL session lost: {}", msg),
            CollectError::AlreadyCollected => write!(f, "snapshot already collected"),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CollectError {
    fn from(e: ConfigError) -> Self {
        CollectError::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_errors_are_distinguished() {
        let shape = DecodeError {
            probe: ProbeKind::ActiveSessions,
            row: 0,
            reason: DecodeReason::ColumnCount {
                expected: 6,
                found: 5,
            },
        };
        let row = DecodeError {
            probe: ProbeKind::ActiveSessions,
            row: 3,
            reason: DecodeReason::NullValue {
                column: "pid".to_string(),
            },
        };
        assert!(shape.is_shape_error());
        assert!(!row.is_shape_error());
        assert_eq!(row.to_string(), "active_sessions row 3: column pid is null");
    }

    #[test]
    fn cycle_display_lists_path() {
        let cycle = CycleDetected {
            pid: 1,
            path: vec![1, 2, 1],
        };
        assert_eq!(cycle.to_string(), "blocking cycle at pid 1: 1 -> 2 -> 1");
    }
}
