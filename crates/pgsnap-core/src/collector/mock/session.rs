//! In-memory session for testing the assembler without a server.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use crate::collector::traits::{ProbeSession, SessionError, SessionFactory};
use crate::error::ProbeError;
use crate::probe::{ProbeDef, ProbeKind, RawRow};

/// Canned reply for one probe.
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    Rows(Vec<RawRow>),
    Fail(ProbeError),
    /// The connection drops while running this probe.
    Lose(String),
}

/// Session that answers probes from a table of canned responses.
///
/// Probes without a configured response return no rows.
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    responses: HashMap<ProbeKind, MockResponse>,
    /// Simulated server time per call.
    delay: Duration,
    calls: Vec<ProbeKind>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rows(&mut self, kind: ProbeKind, rows: Vec<RawRow>) {
        self.responses.insert(kind, MockResponse::Rows(rows));
    }

    pub fn set_error(&mut self, kind: ProbeKind, error: ProbeError) {
        self.responses.insert(kind, MockResponse::Fail(error));
    }

    /// Drops the connection when `kind` runs.
    pub fn lose_session_at(&mut self, kind: ProbeKind) {
        self.responses
            .insert(kind, MockResponse::Lose("server closed the connection".to_string()));
    }

    pub fn with_rows(mut self, kind: ProbeKind, rows: Vec<RawRow>) -> Self {
        self.set_rows(kind, rows);
        self
    }

    pub fn with_error(mut self, kind: ProbeKind, error: ProbeError) -> Self {
        self.set_error(kind, error);
        self
    }

    /// Each call takes `delay`. A call whose timeout is shorter fails with
    /// [`ProbeError::Timeout`] after the timeout, as `statement_timeout` would.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Probes run so far, in call order.
    pub fn calls(&self) -> &[ProbeKind] {
        &self.calls
    }
}

impl ProbeSession for MockSession {
    fn query(&mut self, probe: &ProbeDef, timeout: Duration) -> Result<Vec<RawRow>, SessionError> {
        self.calls.push(probe.kind);

        if !self.delay.is_zero() {
            if self.delay >= timeout {
                thread::sleep(timeout);
                return Err(SessionError::Probe(ProbeError::Timeout));
            }
            thread::sleep(self.delay);
        }

        match self.responses.get(&probe.kind) {
            Some(MockResponse::Rows(rows)) => Ok(rows.clone()),
            Some(MockResponse::Fail(e)) => Err(SessionError::Probe(e.clone())),
            Some(MockResponse::Lose(msg)) => Err(SessionError::Lost(msg.clone())),
            None => Ok(Vec::new()),
        }
    }
}

/// Opens a copy of the session registered for each database.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    sessions: HashMap<String, MockSession>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, dbname: impl Into<String>, session: MockSession) -> Self {
        self.sessions.insert(dbname.into(), session);
        self
    }
}

impl SessionFactory for MockFactory {
    fn open(&self, dbname: &str) -> Result<Box<dyn ProbeSession + Send>, SessionError> {
        match self.sessions.get(dbname) {
            Some(session) => Ok(Box::new(session.clone())),
            None => Err(SessionError::Probe(ProbeError::Connection {
                message: format!("database \"{}\" does not exist", dbname),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Value;

    #[test]
    fn answers_from_table() {
        let rows = vec![RawRow::new(vec![Value::from("Lock"), "relation".into(), 1i64.into()])];
        let mut session = MockSession::new()
            .with_rows(ProbeKind::WaitEventSummary, rows.clone())
            .with_error(ProbeKind::WalReceiver, ProbeError::Timeout);

        let timeout = Duration::from_secs(1);
        assert_eq!(
            session.query(ProbeKind::WaitEventSummary.def(), timeout),
            Ok(rows)
        );
        assert_eq!(
            session.query(ProbeKind::WalReceiver.def(), timeout),
            Err(SessionError::Probe(ProbeError::Timeout))
        );
        assert_eq!(session.query(ProbeKind::ActiveSessions.def(), timeout), Ok(Vec::new()));
        assert_eq!(
            session.calls(),
            &[
                ProbeKind::WaitEventSummary,
                ProbeKind::WalReceiver,
                ProbeKind::ActiveSessions
            ]
        );
    }

    #[test]
    fn slow_call_times_out() {
        let mut session = MockSession::new().with_delay(Duration::from_millis(200));
        assert_eq!(
            session.query(ProbeKind::ActiveSessions.def(), Duration::from_millis(10)),
            Err(SessionError::Probe(ProbeError::Timeout))
        );
    }

    #[test]
    fn factory_rejects_unknown_database() {
        let factory = MockFactory::new().with_database("app", MockSession::new());
        assert!(factory.open("app").is_ok());
        assert!(matches!(
            factory.open("missing"),
            Err(SessionError::Probe(ProbeError::Connection { .. }))
        ));
    }
}
