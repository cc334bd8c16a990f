//! Live PostgreSQL sessions.
//!
//! Each probe call runs in its own read-only transaction with
//! `statement_timeout` set to the time left before the collection deadline,
//! so a slow server cancels the statement itself instead of holding the run.

use std::time::Duration;

use native_tls::TlsConnector;
use postgres::error::SqlState;
use postgres::types::Type;
use postgres::{Client, NoTls, Row};
use postgres_native_tls::MakeTlsConnector;
use tracing::debug;

use super::traits::{ProbeSession, SessionError, SessionFactory};
use crate::config::{CollectConfig, SslMode};
use crate::error::{CollectError, ProbeError};
use crate::probe::{ProbeDef, RawRow, Value};

/// A session on one database.
pub struct PgSession {
    client: Client,
    dbname: String,
}

impl PgSession {
    /// Opens a session on `dbname` with the configured credentials.
    pub fn connect(config: &CollectConfig, dbname: &str) -> Result<Self, CollectError> {
        let conn_str = config.connection_string(dbname);

        let connected = if config.ssl_mode.uses_tls() {
            let verify = config.ssl_mode == SslMode::VerifyFull;
            let connector = TlsConnector::builder()
                .danger_accept_invalid_certs(!verify)
                .danger_accept_invalid_hostnames(!verify)
                .build()
                .map_err(|e| CollectError::Connection(format!("TLS setup failed: {}", e)))?;
            Client::connect(&conn_str, MakeTlsConnector::new(connector))
        } else {
            Client::connect(&conn_str, NoTls)
        };

        let client = connected.map_err(|e| CollectError::Connection(format_postgres_error(&e)))?;
        debug!(host = %config.host, port = config.port, database = %dbname, ssl_mode = %config.ssl_mode,
            "connected");

        Ok(Self {
            client,
            dbname: dbname.to_string(),
        })
    }

    pub fn dbname(&self) -> &str {
        &self.dbname
    }
}

impl ProbeSession for PgSession {
    fn query(&mut self, probe: &ProbeDef, timeout: Duration) -> Result<Vec<RawRow>, SessionError> {
        let timeout_ms = timeout.as_millis().max(1);

        let mut tx = self
            .client
            .build_transaction()
            .read_only(true)
            .start()
            .map_err(|e| classify(&e))?;
        tx.batch_execute(&format!("SET LOCAL statement_timeout = {}", timeout_ms))
            .map_err(|e| classify(&e))?;
        let rows = tx.query(probe.sql, &[]).map_err(|e| classify(&e))?;
        tx.commit().map_err(|e| classify(&e))?;

        rows.iter()
            .map(|row| {
                convert_row(row).map_err(|e| {
                    SessionError::Probe(ProbeError::Query {
                        message: format!("{} on {}: {}", probe.kind, probe.view, e),
                    })
                })
            })
            .collect()
    }
}

/// Converts a result row into untyped values by server column type.
///
/// Types the catalog never declares become [`Value::Unsupported`] and fail
/// the shape check in the decoder.
fn convert_row(row: &Row) -> Result<RawRow, postgres::Error> {
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value: Value = if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)?.map(i64::from).into()
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)?.into()
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)?.into()
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)?.map(f64::from).into()
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx)?.into()
        } else if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)?.into()
        } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::NAME || *ty == Type::BPCHAR {
            row.try_get::<_, Option<String>>(idx)?.into()
        } else if *ty == Type::INT4_ARRAY {
            row.try_get::<_, Option<Vec<i32>>>(idx)?.into()
        } else {
            Value::Unsupported(ty.name().to_string())
        };
        values.push(value);
    }
    Ok(RawRow::new(values))
}

/// Maps a driver error to a probe failure or a lost session.
pub(crate) fn classify(e: &postgres::Error) -> SessionError {
    let message = format_postgres_error(e);
    if e.is_closed() {
        return SessionError::Lost(message);
    }
    match e.code() {
        Some(code) => classify_sqlstate(code, message),
        // Not a server error: socket or protocol failure.
        None => SessionError::Lost(message),
    }
}

fn classify_sqlstate(code: &SqlState, message: String) -> SessionError {
    if *code == SqlState::UNDEFINED_TABLE
        || *code == SqlState::UNDEFINED_COLUMN
        || *code == SqlState::UNDEFINED_FUNCTION
    {
        SessionError::Probe(ProbeError::Unsupported { message })
    } else if *code == SqlState::INSUFFICIENT_PRIVILEGE {
        SessionError::Probe(ProbeError::PermissionDenied { message })
    } else if *code == SqlState::QUERY_CANCELED {
        SessionError::Probe(ProbeError::Timeout)
    } else if code.code().starts_with("08")
        || *code == SqlState::ADMIN_SHUTDOWN
        || *code == SqlState::CRASH_SHUTDOWN
    {
        SessionError::Lost(message)
    } else {
        SessionError::Probe(ProbeError::Query { message })
    }
}

/// Formats PostgreSQL error message for display.
pub(crate) fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else if msg.contains("does not exist") {
            msg.split("FATAL:")
                .last()
                .unwrap_or(&msg)
                .trim()
                .to_string()
        } else {
            msg
        }
    }
}

/// Opens per-database sessions with the main session's credentials.
pub struct PgConnector {
    config: CollectConfig,
}

impl PgConnector {
    pub fn new(config: CollectConfig) -> Self {
        Self { config }
    }
}

impl SessionFactory for PgConnector {
    fn open(&self, dbname: &str) -> Result<Box<dyn ProbeSession + Send>, SessionError> {
        match PgSession::connect(&self.config, dbname) {
            Ok(session) => Ok(Box::new(session)),
            Err(e) => Err(SessionError::Probe(ProbeError::Connection {
                message: e.to_string(),
            })),
        }
    }
}
