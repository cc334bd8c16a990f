//! SQL text for the probe catalog.
//!
//! Every statement is read-only. LSN and inet columns are cast to text so
//! the decoders receive opaque tokens; EXTRACT(EPOCH ...) results are cast to
//! double precision or bigint because numeric has no native decoding.

/// Sessions currently waiting on a specific event while executing.
pub(super) const ACTIVE_SESSIONS: &str = r#"
    SELECT
        pid,
        COALESCE(wait_event_type, '') AS wait_event_type,
        COALESCE(wait_event, '') AS wait_event,
        COALESCE(query, '') AS query,
        COALESCE(state, '') AS state,
        EXTRACT(EPOCH FROM (now() - query_start))::double precision AS duration
    FROM pg_stat_activity
    WHERE wait_event IS NOT NULL AND state = 'active'
    ORDER BY duration DESC NULLS LAST
"#;

pub(super) const REPLICATION_STATUS: &str = r#"
    SELECT
        pid,
        COALESCE(state, '') AS state,
        COALESCE(application_name, '') AS application_name,
        COALESCE(client_addr::text, '') AS client_addr,
        EXTRACT(EPOCH FROM backend_start)::bigint AS backend_start,
        COALESCE(sent_lsn::text, '') AS sent_lsn,
        COALESCE(write_lsn::text, '') AS write_lsn,
        COALESCE(flush_lsn::text, '') AS flush_lsn,
        COALESCE(replay_lsn::text, '') AS replay_lsn
    FROM pg_stat_replication
    ORDER BY pid ASC
"#;

pub(super) const REPLICATION_SLOTS: &str = r#"
    SELECT
        slot_name::text AS slot_name,
        COALESCE(plugin::text, '') AS plugin,
        slot_type,
        active,
        COALESCE(restart_lsn::text, '') AS restart_lsn,
        COALESCE(confirmed_flush_lsn::text, '') AS confirmed_flush_lsn
    FROM pg_replication_slots
    ORDER BY slot_name ASC
"#;

/// Same filter as [`ACTIVE_SESSIONS`] so counts stay within the session set.
pub(super) const WAIT_EVENT_SUMMARY: &str = r#"
    SELECT
        COALESCE(wait_event_type, '') AS wait_event_type,
        COALESCE(wait_event, '') AS wait_event,
        COUNT(*)::bigint AS sessions
    FROM pg_stat_activity
    WHERE wait_event IS NOT NULL AND state = 'active'
    GROUP BY wait_event_type, wait_event
    ORDER BY COUNT(*) DESC, wait_event_type, wait_event
"#;

pub(super) const BLOCKED_SESSIONS: &str = r#"
    SELECT
        a.pid AS blocked_pid,
        COALESCE(a.wait_event_type, '') AS wait_event_type,
        COALESCE(a.wait_event, '') AS wait_event,
        COALESCE(a.query, '') AS blocked_query,
        pg_blocking_pids(a.pid) AS blocking_pids
    FROM pg_stat_activity AS a
    WHERE array_length(pg_blocking_pids(a.pid), 1) > 0
    ORDER BY a.pid ASC
"#;

/// PG 13+ column names (`flushed_lsn`); older servers report Unsupported.
pub(super) const WAL_RECEIVER: &str = r#"
    SELECT
        pid,
        COALESCE(status, '') AS status,
        COALESCE(receive_start_lsn::text, '') AS receive_start_lsn,
        receive_start_tli,
        COALESCE(flushed_lsn::text, '') AS received_lsn,
        received_tli,
        EXTRACT(EPOCH FROM last_msg_send_time)::bigint AS last_msg_send_time,
        EXTRACT(EPOCH FROM last_msg_receipt_time)::bigint AS last_msg_receipt_time,
        GREATEST(
            EXTRACT(EPOCH FROM (last_msg_receipt_time - last_msg_send_time)) * 1000000,
            0
        )::bigint AS latency,
        COALESCE(latest_end_lsn::text, '') AS latest_end_lsn,
        EXTRACT(EPOCH FROM latest_end_time)::bigint AS latest_end_time,
        COALESCE(slot_name, '') AS slot_name,
        COALESCE(conninfo, '') AS conninfo
    FROM pg_stat_wal_receiver
    LIMIT 1
"#;

/// Runs against each target database.
pub(super) const EXTENSIONS: &str = r#"
    SELECT
        e.extname::text AS name,
        n.nspname::text AS schema_name,
        e.extversion AS installed_version,
        COALESCE(x.default_version, '') AS default_version,
        COALESCE(x.comment, '') AS comment
    FROM pg_extension e
    JOIN pg_namespace n ON n.oid = e.extnamespace
    LEFT JOIN pg_available_extensions x ON x.name = e.extname
    ORDER BY e.extname
"#;
