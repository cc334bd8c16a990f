use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::model::{ActiveSession, WaitEventSummary};

/// Groups sessions by (wait_event_type, wait_event), descending count.
/// Groups with equal counts keep first-seen order.
pub fn aggregate_wait_events(sessions: &[ActiveSession]) -> Vec<WaitEventSummary> {
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut summary: Vec<WaitEventSummary> = Vec::new();

    for s in sessions {
        let key = (s.wait_event_type.as_str(), s.wait_event.as_str());
        match index.get(&key) {
            Some(&idx) => summary[idx].sessions += 1,
            None => {
                index.insert(key, summary.len());
                summary.push(WaitEventSummary {
                    wait_event_type: s.wait_event_type.clone(),
                    wait_event: s.wait_event.clone(),
                    sessions: 1,
                });
            }
        }
    }

    summary.sort_by(|a, b| b.sessions.cmp(&a.sessions));
    summary
}

/// Inconsistency between a wait-event summary and the sessions it counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitSummaryViolation {
    DuplicatePair {
        wait_event_type: String,
        wait_event: String,
    },
    EmptyGroup {
        wait_event_type: String,
        wait_event: String,
    },
    CountExceedsSessions {
        total: i64,
        active: usize,
    },
}

impl std::fmt::Display for WaitSummaryViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitSummaryViolation::DuplicatePair {
                wait_event_type,
                wait_event,
            } => write!(f, "duplicate pair {}/{}", wait_event_type, wait_event),
            WaitSummaryViolation::EmptyGroup {
                wait_event_type,
                wait_event,
            } => write!(f, "empty group {}/{}", wait_event_type, wait_event),
            WaitSummaryViolation::CountExceedsSessions { total, active } => write!(
                f,
                "summary counts {} sessions, only {} active",
                total, active
            ),
        }
    }
}

/// Checks that summary pairs are distinct, each counts at least one session,
/// and the total doesn't exceed `active_sessions`.
///
/// The summary and the session list come from separate statements, so a
/// violation on a busy server can be a timing artifact rather than a bug.
pub fn validate_wait_summary(
    summary: &[WaitEventSummary],
    active_sessions: usize,
) -> Vec<WaitSummaryViolation> {
    let mut violations = Vec::new();
    let mut seen = HashSet::new();
    let mut total: i64 = 0;

    for entry in summary {
        let pair = (entry.wait_event_type.as_str(), entry.wait_event.as_str());
        if !seen.insert(pair) {
            violations.push(WaitSummaryViolation::DuplicatePair {
                wait_event_type: entry.wait_event_type.clone(),
                wait_event: entry.wait_event.clone(),
            });
        }
        if entry.sessions < 1 {
            violations.push(WaitSummaryViolation::EmptyGroup {
                wait_event_type: entry.wait_event_type.clone(),
                wait_event: entry.wait_event.clone(),
            });
        }
        total = total.saturating_add(entry.sessions.max(0));
    }

    let active = i64::try_from(active_sessions).unwrap_or(i64::MAX);
    if total > active {
        violations.push(WaitSummaryViolation::CountExceedsSessions {
            total,
            active: active_sessions,
        });
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting(pid: i32, ty: &str, event: &str) -> ActiveSession {
        ActiveSession {
            pid,
            wait_event_type: ty.to_string(),
            wait_event: event.to_string(),
            state: "active".to_string(),
            ..ActiveSession::default()
        }
    }

    fn entry(ty: &str, event: &str, sessions: i64) -> WaitEventSummary {
        WaitEventSummary {
            wait_event_type: ty.to_string(),
            wait_event: event.to_string(),
            sessions,
        }
    }

    #[test]
    fn aggregates_by_pair() {
        let sessions = vec![
            waiting(1, "IO", "DataFileRead"),
            waiting(2, "Lock", "relation"),
            waiting(3, "Lock", "relation"),
            waiting(4, "Client", "ClientRead"),
        ];
        let summary = aggregate_wait_events(&sessions);
        assert_eq!(
            summary,
            vec![
                entry("Lock", "relation", 2),
                entry("IO", "DataFileRead", 1),
                entry("Client", "ClientRead", 1),
            ]
        );

        let total: i64 = summary.iter().map(|s| s.sessions).sum();
        assert!(total as usize <= sessions.len());
        assert!(validate_wait_summary(&summary, sessions.len()).is_empty());
    }

    #[test]
    fn empty_sessions_give_empty_summary() {
        assert!(aggregate_wait_events(&[]).is_empty());
        assert!(validate_wait_summary(&[], 0).is_empty());
    }

    #[test]
    fn detects_violations() {
        let summary = vec![
            entry("Lock", "relation", 3),
            entry("Lock", "relation", 1),
            entry("IO", "DataFileRead", 0),
        ];
        let violations = validate_wait_summary(&summary, 2);
        assert_eq!(violations.len(), 3);
        assert!(matches!(violations[0], WaitSummaryViolation::DuplicatePair { .. }));
        assert!(matches!(violations[1], WaitSummaryViolation::EmptyGroup { .. }));
        assert_eq!(
            violations[2],
            WaitSummaryViolation::CountExceedsSessions {
                total: 4,
                active: 2
            }
        );
    }
}
