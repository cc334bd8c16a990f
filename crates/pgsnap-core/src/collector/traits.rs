//! Session abstractions, so the assembler runs against a live server or an
//! in-memory mock.

use std::time::Duration;

use crate::error::ProbeError;
use crate::probe::{ProbeDef, RawRow};

/// Failure reported by a session for one probe call.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The probe failed; the session is still usable.
    Probe(ProbeError),
    /// The session is gone. Fatal for the run that owns it.
    Lost(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Probe(e) => write!(f, "{}", e),
            SessionError::Lost(msg) => write!(f, "session lost: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ProbeError> for SessionError {
    fn from(e: ProbeError) -> Self {
        SessionError::Probe(e)
    }
}

/// An open database session able to run catalog probes.
pub trait ProbeSession {
    /// Runs `probe` and returns its rows in select-list column order.
    ///
    /// `timeout` is the time left before the collection deadline; the
    /// session must not keep the server busy beyond it.
    fn query(&mut self, probe: &ProbeDef, timeout: Duration) -> Result<Vec<RawRow>, SessionError>;
}

impl<S: ProbeSession + ?Sized> ProbeSession for Box<S> {
    fn query(&mut self, probe: &ProbeDef, timeout: Duration) -> Result<Vec<RawRow>, SessionError> {
        (**self).query(probe, timeout)
    }
}

/// Opens one session per target database for per-database probes.
///
/// Shared across worker threads.
pub trait SessionFactory: Sync {
    fn open(&self, dbname: &str) -> Result<Box<dyn ProbeSession + Send>, SessionError>;
}
