//! Plain-text rendering of a snapshot.

use chrono::DateTime;

use pgsnap_core::Model;
use pgsnap_core::analytics::{LagThresholds, validate_wait_summary};
use pgsnap_core::model::Collected;

const QUERY_WIDTH: usize = 60;

fn truncate(s: &str, width: usize) -> String {
    let flat: String = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= width {
        flat
    } else {
        let cut: String = flat.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn format_epoch(at: i64) -> String {
    DateTime::from_timestamp(at, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| at.to_string())
}

/// Section header; failed probes say so instead of looking empty.
fn header<T>(out: &mut String, title: &str, collected: &Collected<T>, count: usize) {
    match &collected.error {
        Some(e) => out.push_str(&format!("\n== {} (unavailable: {}) ==\n", title, e)),
        None => out.push_str(&format!("\n== {} ({}) ==\n", title, count)),
    }
}

pub fn render_text(model: &Model, top: usize, thresholds: &LagThresholds) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "snapshot at {} (schema {})\n",
        format_epoch(model.metadata.at),
        model.metadata.version
    ));
    let role = match model.is_standby() {
        Some(true) => "standby",
        Some(false) => "primary",
        None => "unknown",
    };
    out.push_str(&format!("role: {}\n", role));
    let dbs: Vec<&str> = model.metadata.collected_dbs.iter().map(String::as_str).collect();
    out.push_str(&format!("databases: {}\n", dbs.join(", ")));

    let sessions = &model.active_sessions;
    header(&mut out, "longest waiting sessions", sessions, sessions.value.len());
    for s in model.longest_waiting(top) {
        out.push_str(&format!(
            "  {:>7} {:>9.3}s  {:<28} {}\n",
            s.pid,
            s.duration,
            format!("{}/{}", s.wait_event_type, s.wait_event),
            truncate(&s.query, QUERY_WIDTH)
        ));
    }

    let waits = &model.wait_event_summary;
    header(&mut out, "wait events", waits, waits.value.len());
    for w in &waits.value {
        out.push_str(&format!(
            "  {:>5}  {}/{}\n",
            w.sessions, w.wait_event_type, w.wait_event
        ));
    }
    if waits.is_ok() && sessions.is_ok() {
        for violation in validate_wait_summary(&waits.value, sessions.value.len()) {
            out.push_str(&format!("  warning: {}\n", violation));
        }
    }

    let blocked = &model.blocked_sessions;
    header(&mut out, "blocking chains", blocked, blocked.value.len());
    let graph = model.blocking_graph();
    for chain in graph.chains() {
        let direct: Vec<String> = graph
            .direct_blockers(chain.pid)
            .iter()
            .map(|p| p.to_string())
            .collect();
        let all: Vec<String> = chain.blockers.iter().map(|p| p.to_string()).collect();
        out.push_str(&format!(
            "  {:>7} blocked by {} (chain: {})\n",
            chain.pid,
            direct.join(", "),
            all.join(" <- ")
        ));
        if let Some(cycle) = &chain.cycle {
            out.push_str(&format!("          {}\n", cycle));
        }
    }
    if !graph.is_empty() {
        let roots: Vec<String> = graph.root_blockers().iter().map(|p| p.to_string()).collect();
        out.push_str(&format!("  root blockers: {}\n", roots.join(", ")));
    }

    let replication = &model.replication_status;
    header(&mut out, "replication", replication, replication.value.len());
    for (status, lag) in replication
        .value
        .iter()
        .zip(model.classify_replication(thresholds))
    {
        let bytes = lag
            .replay_lag_bytes
            .map(|b| format!("{} bytes", b))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "  {:>7} {:<20} {:<16} sent {} replay {} lag {} [{}]\n",
            status.pid,
            status.application_name,
            status.client_addr,
            status.sent_lsn,
            status.replay_lsn,
            bytes,
            lag.class
        ));
    }

    let slots = &model.replication_slots;
    header(&mut out, "replication slots", slots, slots.value.len());
    for slot in &slots.value {
        out.push_str(&format!(
            "  {:<24} {:<8} {:<10} restart {}{}\n",
            slot.slot_name,
            slot.slot_type,
            if slot.active { "active" } else { "inactive" },
            slot.restart_lsn,
            if slot.plugin.is_empty() {
                String::new()
            } else {
                format!(" plugin {}", slot.plugin)
            }
        ));
    }

    let wal = &model.wal_receiver;
    header(&mut out, "wal receiver", wal, usize::from(wal.value.is_some()));
    if let Some(w) = &wal.value {
        out.push_str(&format!(
            "  pid {} {} slot {} received {} (tli {}) latency {}us\n",
            w.pid, w.status, w.slot_name, w.received_lsn, w.received_tli, w.latency
        ));
        out.push_str(&format!("  last message {}\n", format_epoch(w.last_msg_receipt_time)));
    }

    for (db, extensions) in &model.extensions {
        header(
            &mut out,
            &format!("extensions in {}", db),
            extensions,
            extensions.value.len(),
        );
        for ext in &extensions.value {
            let upgrade = if ext.upgrade_available() {
                format!(" (upgrade to {})", ext.default_version)
            } else {
                String::new()
            };
            out.push_str(&format!(
                "  {:<24} {:<10} {}{}\n",
                ext.name, ext.installed_version, ext.schema_name, upgrade
            ));
        }
    }

    let errors = model.probe_errors();
    let skipped = model.skipped_rows();
    if !errors.is_empty() || skipped > 0 {
        out.push_str(&format!("\n== problems ({}) ==\n", errors.len()));
        for (name, error) in errors {
            out.push_str(&format!("  {}: {}\n", name, error));
        }
        if skipped > 0 {
            out.push_str(&format!("  {} malformed rows skipped\n", skipped));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgsnap_core::ProbeError;
    use pgsnap_core::model::{ActiveSession, BlockedSession, ReplicationStatus};

    fn model() -> Model {
        let mut model = Model::default();
        model.metadata.version = "1.0".to_string();
        model.metadata.at = 1640995200;
        model.active_sessions = Collected::ok(vec![
            ActiveSession {
                pid: 1,
                duration: 5.0,
                query: "SELECT   pg_sleep(10)".to_string(),
                ..ActiveSession::default()
            },
            ActiveSession {
                pid: 2,
                duration: 10.0,
                ..ActiveSession::default()
            },
        ]);
        model.blocked_sessions = Collected::ok(vec![BlockedSession {
            blocked_pid: 10,
            blocking_pids: vec![20, 30],
            ..BlockedSession::default()
        }]);
        model.replication_status = Collected::ok(vec![ReplicationStatus {
            pid: 300,
            state: "streaming".to_string(),
            application_name: "replica1".to_string(),
            sent_lsn: "0/12345678".to_string(),
            replay_lsn: "0/10000000".to_string(),
            ..ReplicationStatus::default()
        }]);
        model
    }

    #[test]
    fn renders_sections() {
        let text = render_text(&model(), 1, &LagThresholds::default());
        assert!(text.starts_with("snapshot at 2022-01-01 00:00:00 UTC (schema 1.0)\n"));
        assert!(text.contains("role: primary"));
        assert!(text.contains("      2    10.000s"));
        assert!(!text.contains("pg_sleep"));
        assert!(text.contains("     10 blocked by 20, 30 (chain: 20 <- 30)"));
        assert!(text.contains("root blockers: 20, 30"));
        assert!(text.contains("[streaming-lagging]"));
        assert!(!text.contains("problems"));
    }

    #[test]
    fn failed_probes_are_marked() {
        let mut model = model();
        model.replication_slots = Collected::failed(ProbeError::PermissionDenied {
            message: "pg_replication_slots".to_string(),
        });
        let text = render_text(&model, 5, &LagThresholds::default());
        assert!(text.contains("== replication slots (unavailable: permission denied: pg_replication_slots) =="));
        assert!(text.contains("== problems (1) =="));
    }

    #[test]
    fn long_queries_are_truncated() {
        let query = "SELECT ".repeat(20);
        let cut = truncate(&query, 20);
        assert_eq!(cut.chars().count(), 20);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate("SELECT\n  1", 20), "SELECT 1");
    }
}
