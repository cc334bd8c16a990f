//! Snapshot assembly.
//!
//! Server-global probes run sequentially on the caller's session. The
//! per-database probe runs on one session per target database, one scoped
//! worker thread each; workers report over a channel and only this thread
//! writes the model. A single deadline bounds the whole run.

use std::collections::BTreeSet;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::traits::{ProbeSession, SessionError, SessionFactory};
use crate::config::CollectConfig;
use crate::error::{CollectError, DecodeError, ProbeError};
use crate::model::{Collected, Extension, Metadata, Model, SCHEMA_VERSION};
use crate::probe::decode::{self, Decoded};
use crate::probe::{ProbeDef, ProbeKind, RawRow};

/// Lifecycle of a [`SnapshotAssembler`]. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// Configuration validated, nothing probed yet.
    Initialized,
    Probing,
    /// A model was produced.
    Assembled,
    /// The main session was lost. No model.
    Failed,
}

/// Point in time after which no probe may start.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    pub(crate) fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Instant::now() + timeout,
        }
    }

    /// Time left, or `None` once expired.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        let left = self.expires_at.saturating_duration_since(Instant::now());
        (!left.is_zero()).then_some(left)
    }
}

type DecodeFn<T> = fn(&[RawRow]) -> Result<Decoded<T>, DecodeError>;

/// Runs one probe and decodes its rows.
///
/// Probe failures are recorded in the returned [`Collected`]. `Err` carries
/// the message of a lost session.
fn run_probe<S, T>(
    session: &mut S,
    def: &ProbeDef,
    deadline: &Deadline,
    decode: DecodeFn<T>,
) -> Result<Collected<Vec<T>>, String>
where
    S: ProbeSession + ?Sized,
{
    let Some(remaining) = deadline.remaining() else {
        warn!(probe = %def.kind, "deadline elapsed before probe started");
        return Ok(Collected::failed(ProbeError::Timeout));
    };

    let started = Instant::now();
    let rows = match session.query(def, remaining) {
        Ok(rows) => rows,
        Err(SessionError::Probe(e)) => {
            warn!(probe = %def.kind, view = def.view, error = %e, "probe failed");
            return Ok(Collected::failed(e));
        }
        Err(SessionError::Lost(msg)) => return Err(msg),
    };

    match decode(&rows) {
        Ok(decoded) => {
            if !decoded.skipped.is_empty() {
                warn!(probe = %def.kind, skipped = decoded.skipped.len(), "rows skipped");
            }
            debug!(
                probe = %def.kind,
                rows = decoded.items.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "probe completed"
            );
            Ok(Collected::with_skipped(decoded.items, decoded.skipped))
        }
        Err(error) => {
            warn!(probe = %def.kind, error = %error, "probe result rejected");
            Ok(Collected::failed(ProbeError::Decode { error }))
        }
    }
}

/// Outcome of the per-database probe. `Err` means the database was not
/// probed at all (session never opened, deadline already passed, or the
/// session dropped).
type DbOutcome = Result<Collected<Vec<Extension>>, ProbeError>;

fn probe_database(factory: &dyn SessionFactory, dbname: &str, deadline: &Deadline) -> DbOutcome {
    let mut session = factory.open(dbname).map_err(|e| match e {
        SessionError::Probe(e) => e,
        SessionError::Lost(message) => ProbeError::Connection { message },
    })?;
    if deadline.remaining().is_none() {
        return Err(ProbeError::Timeout);
    }
    run_probe(
        &mut session,
        ProbeKind::Extensions.def(),
        deadline,
        decode::extensions,
    )
    .map_err(|message| ProbeError::Connection { message })
}

fn record_database(model: &mut Model, dbname: &str, outcome: DbOutcome) {
    match outcome {
        Ok(collected) => {
            model.metadata.collected_dbs.insert(dbname.to_string());
            model.extensions.insert(dbname.to_string(), collected);
        }
        Err(e) => {
            warn!(database = %dbname, error = %e, "database not probed");
            model
                .extensions
                .insert(dbname.to_string(), Collected::failed(e));
        }
    }
}

/// Collects one snapshot from a borrowed session.
///
/// # Example
///
/// ```
/// use pgsnap_core::collector::MockSession;
/// use pgsnap_core::{CollectConfig, SnapshotAssembler};
///
/// let mut session = MockSession::standby();
/// let mut assembler = SnapshotAssembler::new(CollectConfig::default(), &mut session).unwrap();
/// let model = assembler.collect().unwrap();
/// assert_eq!(model.is_standby(), Some(true));
/// ```
pub struct SnapshotAssembler<'a, S: ProbeSession> {
    config: CollectConfig,
    session: &'a mut S,
    factory: Option<&'a dyn SessionFactory>,
    state: AssemblerState,
}

impl<'a, S: ProbeSession> SnapshotAssembler<'a, S> {
    /// Validates `config`; the session stays owned by the caller.
    pub fn new(config: CollectConfig, session: &'a mut S) -> Result<Self, CollectError> {
        config.validate()?;
        Ok(Self {
            config,
            session,
            factory: None,
            state: AssemblerState::Initialized,
        })
    }

    /// Opens per-database sessions through `factory`. Without one, only the
    /// main database is probed, on the borrowed session.
    pub fn with_session_factory(mut self, factory: &'a dyn SessionFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// Runs every probe once and assembles the model.
    ///
    /// Probe failures are recorded in the model. Errors only when the main
    /// session is lost or the assembler already ran.
    pub fn collect(&mut self) -> Result<Model, CollectError> {
        let deadline = Deadline::after(self.config.timeout());
        self.collect_with_deadline(deadline)
    }

    pub(crate) fn collect_with_deadline(&mut self, deadline: Deadline) -> Result<Model, CollectError> {
        if self.state != AssemblerState::Initialized {
            return Err(CollectError::AlreadyCollected);
        }
        self.state = AssemblerState::Probing;

        let at = Utc::now().timestamp();
        let started = Instant::now();
        info!(host = %self.config.host, port = self.config.port, timeout_sec = self.config.timeout_sec,
            "collecting snapshot");

        match self.probe_all(&deadline, at) {
            Ok(model) => {
                self.state = AssemblerState::Assembled;
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    probe_errors = model.probe_errors().len(),
                    skipped_rows = model.skipped_rows(),
                    databases = model.metadata.collected_dbs.len(),
                    "snapshot assembled"
                );
                Ok(model)
            }
            Err(e) => {
                self.state = AssemblerState::Failed;
                warn!(error = %e, "snapshot failed");
                Err(e)
            }
        }
    }

    fn global<T>(&mut self, kind: ProbeKind, deadline: &Deadline, decode: DecodeFn<T>) -> Result<Collected<Vec<T>>, CollectError> {
        run_probe(&mut *self.session, kind.def(), deadline, decode).map_err(CollectError::SessionLost)
    }

    fn probe_all(&mut self, deadline: &Deadline, at: i64) -> Result<Model, CollectError> {
        let mut model = Model {
            metadata: Metadata {
                version: SCHEMA_VERSION.to_string(),
                at,
                collected_dbs: BTreeSet::new(),
            },
            ..Model::default()
        };

        model.active_sessions = self.global(ProbeKind::ActiveSessions, deadline, decode::active_sessions)?;
        model.replication_status =
            self.global(ProbeKind::ReplicationStatus, deadline, decode::replication_status)?;
        model.replication_slots =
            self.global(ProbeKind::ReplicationSlots, deadline, decode::replication_slots)?;
        model.wait_event_summary =
            self.global(ProbeKind::WaitEventSummary, deadline, decode::wait_event_summary)?;
        model.blocked_sessions =
            self.global(ProbeKind::BlockedSessions, deadline, decode::blocked_sessions)?;
        model.wal_receiver = self
            .global(ProbeKind::WalReceiver, deadline, decode::wal_receiver)?
            .map(|rows| rows.into_iter().next());

        self.probe_databases(deadline, &mut model)?;
        Ok(model)
    }

    /// Target databases; the main database when none were requested.
    fn target_databases(&self) -> Vec<String> {
        let targets = self.config.target_databases();
        if targets.is_empty() {
            vec![self.config.main_database().to_string()]
        } else {
            targets.into_iter().map(String::from).collect()
        }
    }

    fn probe_databases(&mut self, deadline: &Deadline, model: &mut Model) -> Result<(), CollectError> {
        let databases = self.target_databases();

        let Some(factory) = self.factory else {
            let main = self.config.main_database().to_string();
            for db in &databases {
                if *db == main {
                    let outcome = if deadline.remaining().is_none() {
                        Err(ProbeError::Timeout)
                    } else {
                        run_probe(
                            &mut *self.session,
                            ProbeKind::Extensions.def(),
                            deadline,
                            decode::extensions,
                        )
                        .map(Ok)
                        .map_err(CollectError::SessionLost)?
                    };
                    record_database(model, db, outcome);
                } else {
                    record_database(
                        model,
                        db,
                        Err(ProbeError::Connection {
                            message: "no session factory for additional databases".to_string(),
                        }),
                    );
                }
            }
            return Ok(());
        };

        if deadline.remaining().is_none() {
            for db in &databases {
                record_database(model, db, Err(ProbeError::Timeout));
            }
            return Ok(());
        }

        debug!(databases = databases.len(), "probing databases");
        let (tx, rx) = mpsc::channel::<(String, DbOutcome)>();

        thread::scope(|scope| {
            for db in &databases {
                let tx = tx.clone();
                scope.spawn(move || {
                    let outcome = probe_database(factory, db, deadline);
                    // The receiver is gone once the deadline passed; the result is dropped.
                    let _ = tx.send((db.clone(), outcome));
                });
            }
            drop(tx);

            let mut pending: BTreeSet<&str> = databases.iter().map(String::as_str).collect();
            while !pending.is_empty() {
                let Some(remaining) = deadline.remaining() else {
                    break;
                };
                match rx.recv_timeout(remaining) {
                    Ok((db, outcome)) => {
                        pending.remove(db.as_str());
                        record_database(model, &db, outcome);
                    }
                    Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            for db in pending {
                record_database(model, db, Err(ProbeError::Timeout));
            }
            drop(rx);
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{self, MockFactory, MockSession};
    use crate::error::DecodeReason;
    use crate::probe::Value;

    fn config() -> CollectConfig {
        CollectConfig {
            user: "monitor".to_string(),
            ..CollectConfig::default()
        }
    }

    fn collect(session: &mut MockSession) -> Model {
        let mut assembler = SnapshotAssembler::new(config(), session).unwrap();
        let model = assembler.collect().unwrap();
        assert_eq!(assembler.state(), AssemblerState::Assembled);
        model
    }

    #[test]
    fn primary_snapshot() {
        let mut session = MockSession::primary();
        let model = collect(&mut session);

        assert_eq!(model.metadata.version, SCHEMA_VERSION);
        assert!(model.metadata.at > 0);
        assert_eq!(model.active_sessions.value.len(), 3);
        assert_eq!(model.replication_status.value.len(), 2);
        assert_eq!(model.replication_slots.value.len(), 3);
        assert_eq!(model.blocked_sessions.value.len(), 2);
        assert_eq!(model.is_standby(), Some(false));
        assert!(model.probe_errors().is_empty());

        let top = model.longest_waiting(1);
        assert_eq!(top[0].pid, 103);

        let graph = model.blocking_graph();
        assert_eq!(graph.resolve(103).blockers, vec![102, 101]);
        assert_eq!(graph.root_blockers(), vec![101]);
    }

    #[test]
    fn global_probes_run_once_in_catalog_order() {
        let mut session = MockSession::primary();
        collect(&mut session);
        let mut expected = ProbeKind::GLOBAL.to_vec();
        // No factory: the main database is probed on the same session.
        expected.push(ProbeKind::Extensions);
        assert_eq!(session.calls(), expected.as_slice());
    }

    #[test]
    fn standby_snapshot() {
        let mut session = MockSession::standby();
        let model = collect(&mut session);
        assert_eq!(model.is_standby(), Some(true));
        let wal = model.wal_receiver.value.as_ref().unwrap();
        assert_eq!(wal.pid, 44444);
        assert_eq!(wal.latency, 850);
        assert!(model.replication_status.value.is_empty());
        assert!(model.replication_status.is_ok());
    }

    #[test]
    fn probe_failures_are_recorded_not_fatal() {
        let mut session = MockSession::primary()
            .with_error(
                ProbeKind::ReplicationSlots,
                ProbeError::PermissionDenied {
                    message: "permission denied for view pg_replication_slots".to_string(),
                },
            )
            .with_error(
                ProbeKind::WalReceiver,
                ProbeError::Unsupported {
                    message: "relation \"pg_stat_wal_receiver\" does not exist".to_string(),
                },
            );
        let model = collect(&mut session);

        assert!(model.replication_slots.value.is_empty());
        assert!(matches!(
            model.replication_slots.error,
            Some(ProbeError::PermissionDenied { .. })
        ));
        assert_eq!(model.is_standby(), None);
        assert_eq!(model.active_sessions.value.len(), 3);

        let names: Vec<String> = model.probe_errors().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["replication_slots", "wal_receiver_status"]);
    }

    #[test]
    fn malformed_rows_abort_only_their_probe() {
        let mut session = MockSession::primary().with_rows(
            ProbeKind::ActiveSessions,
            vec![RawRow::new(vec![Value::from(1i32), Value::from("Lock")])],
        );
        let model = collect(&mut session);
        match &model.active_sessions.error {
            Some(ProbeError::Decode { error }) => {
                assert_eq!(error.probe, ProbeKind::ActiveSessions);
                assert!(matches!(error.reason, DecodeReason::ColumnCount { found: 2, .. }));
            }
            other => panic!("expected decode error, got {:?}", other),
        }
        assert_eq!(model.replication_status.value.len(), 2);
    }

    #[test]
    fn invalid_rows_are_skipped_and_recorded() {
        let mut session = MockSession::primary().with_rows(
            ProbeKind::BlockedSessions,
            vec![
                mock::blocked_row(10, "UPDATE t", &[20, 30]),
                mock::blocked_row(11, "UPDATE t", &[11]),
            ],
        );
        let model = collect(&mut session);
        assert!(model.blocked_sessions.is_ok());
        assert_eq!(model.blocked_sessions.value.len(), 1);
        assert_eq!(model.blocked_sessions.skipped.len(), 1);
        assert_eq!(model.skipped_rows(), 1);
        for blocked in &model.blocked_sessions.value {
            assert!(!blocked.blocking_pids.contains(&blocked.blocked_pid));
        }
    }

    #[test]
    fn lost_session_fails_the_run() {
        let mut session = MockSession::primary();
        session.lose_session_at(ProbeKind::WaitEventSummary);
        let mut assembler = SnapshotAssembler::new(config(), &mut session).unwrap();

        let err = assembler.collect().unwrap_err();
        assert!(matches!(err, CollectError::SessionLost(_)));
        assert_eq!(assembler.state(), AssemblerState::Failed);
        assert!(matches!(
            assembler.collect(),
            Err(CollectError::AlreadyCollected)
        ));
    }

    #[test]
    fn second_collect_is_rejected() {
        let mut session = MockSession::primary();
        let mut assembler = SnapshotAssembler::new(config(), &mut session).unwrap();
        assert!(assembler.collect().is_ok());
        assert!(matches!(
            assembler.collect(),
            Err(CollectError::AlreadyCollected)
        ));
        assert_eq!(assembler.state(), AssemblerState::Assembled);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut session = MockSession::primary();
        let bad = CollectConfig {
            timeout_sec: 0,
            ..config()
        };
        assert!(matches!(
            SnapshotAssembler::new(bad, &mut session),
            Err(CollectError::Config(_))
        ));
        assert!(session.calls().is_empty());
    }

    #[test]
    fn same_inputs_give_same_content() {
        let mut first = MockSession::primary();
        let mut second = MockSession::primary();
        let a = collect(&mut first);
        let b = collect(&mut second);
        assert!(a.same_content(&b));
    }

    #[test]
    fn expired_deadline_records_timeouts() {
        let mut session = MockSession::primary();
        let mut assembler = SnapshotAssembler::new(config(), &mut session).unwrap();
        let model = assembler
            .collect_with_deadline(Deadline::after(Duration::ZERO))
            .unwrap();

        assert_eq!(model.active_sessions.error, Some(ProbeError::Timeout));
        assert_eq!(model.wal_receiver.error, Some(ProbeError::Timeout));
        assert_eq!(model.probe_errors().len(), 7);
        assert!(model.metadata.collected_dbs.is_empty());
        drop(assembler);
        assert!(session.calls().is_empty());
    }

    #[test]
    fn per_database_probes_use_factory() {
        let factory = MockFactory::new()
            .with_database("app", MockSession::with_extensions())
            .with_database("reporting", MockSession::new());
        let config = CollectConfig {
            databases: vec![
                "app".to_string(),
                "reporting".to_string(),
                "gone".to_string(),
            ],
            ..config()
        };
        let mut session = MockSession::primary();
        let mut assembler = SnapshotAssembler::new(config, &mut session)
            .unwrap()
            .with_session_factory(&factory);
        let model = assembler.collect().unwrap();

        assert_eq!(
            model.metadata.collected_dbs,
            BTreeSet::from(["app".to_string(), "reporting".to_string()])
        );
        let app = &model.extensions["app"];
        assert_eq!(app.value.len(), 2);
        assert!(app.value[0].upgrade_available());
        assert!(model.extensions["reporting"].value.is_empty());
        assert!(matches!(
            model.extensions["gone"].error,
            Some(ProbeError::Connection { .. })
        ));

        drop(assembler);
        assert_eq!(session.calls(), &ProbeKind::GLOBAL);
    }

    #[test]
    fn slow_database_times_out() {
        let factory = MockFactory::new()
            .with_database("fast", MockSession::with_extensions())
            .with_database(
                "slow",
                MockSession::with_extensions().with_delay(Duration::from_secs(5)),
            );
        let config = CollectConfig {
            databases: vec!["fast".to_string(), "slow".to_string()],
            ..config()
        };
        let mut session = MockSession::new();
        let mut assembler = SnapshotAssembler::new(config, &mut session)
            .unwrap()
            .with_session_factory(&factory);
        let model = assembler
            .collect_with_deadline(Deadline::after(Duration::from_millis(300)))
            .unwrap();

        assert!(model.extensions["fast"].is_ok());
        assert_eq!(model.extensions["slow"].error, Some(ProbeError::Timeout));
        assert!(model.metadata.collected_dbs.contains("fast"));
    }

    #[test]
    fn main_database_without_factory() {
        let mut session = MockSession::with_extensions();
        let model = collect(&mut session);
        assert_eq!(
            model.metadata.collected_dbs,
            BTreeSet::from(["monitor".to_string()])
        );
        assert_eq!(model.extensions["monitor"].value.len(), 2);
    }
}
