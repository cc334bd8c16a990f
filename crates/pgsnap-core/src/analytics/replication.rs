//! Replication lag classification.

use postgres::types::PgLsn;
use serde::{Deserialize, Serialize};

use crate::model::ReplicationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LagClass {
    StreamingCaughtUp,
    StreamingLagging,
    Catchup,
    Backup,
    Unknown,
}

impl LagClass {
    pub fn as_str(self) -> &'static str {
        match self {
            LagClass::StreamingCaughtUp => "streaming-caught-up",
            LagClass::StreamingLagging => "streaming-lagging",
            LagClass::Catchup => "catchup",
            LagClass::Backup => "backup",
            LagClass::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for LagClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LagThresholds {
    /// A streaming replica whose replay position trails the sent position by
    /// at most this many bytes counts as caught up.
    #[serde(default)]
    pub max_caught_up_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationLag {
    pub pid: i32,
    pub application_name: String,
    pub class: LagClass,
    /// sent - replay in bytes; `None` when either LSN is missing or malformed.
    pub replay_lag_bytes: Option<u64>,
}

/// Parses a textual `hi/lo` LSN into its 64-bit position.
///
/// Each half must be 1 to 8 hex digits.
pub fn parse_lsn(token: &str) -> Option<u64> {
    let (hi, lo) = token.split_once('/')?;
    let valid = |half: &str| {
        (1..=8).contains(&half.len()) && half.bytes().all(|b| b.is_ascii_hexdigit())
    };
    if !valid(hi) || !valid(lo) {
        return None;
    }
    token.parse::<PgLsn>().ok().map(u64::from)
}

pub fn classify(status: &ReplicationStatus, thresholds: &LagThresholds) -> ReplicationLag {
    let replay_lag_bytes = match (parse_lsn(&status.sent_lsn), parse_lsn(&status.replay_lsn)) {
        (Some(sent), Some(replay)) => Some(sent.saturating_sub(replay)),
        _ => None,
    };

    let class = match status.state.as_str() {
        "streaming" => match replay_lag_bytes {
            Some(lag) if lag <= thresholds.max_caught_up_bytes => LagClass::StreamingCaughtUp,
            Some(_) => LagClass::StreamingLagging,
            None => LagClass::Unknown,
        },
        "catchup" => LagClass::Catchup,
        "backup" => LagClass::Backup,
        _ => LagClass::Unknown,
    };

    ReplicationLag {
        pid: status.pid,
        application_name: status.application_name.clone(),
        class,
        replay_lag_bytes,
    }
}

pub fn classify_all(statuses: &[ReplicationStatus], thresholds: &LagThresholds) -> Vec<ReplicationLag> {
    statuses.iter().map(|s| classify(s, thresholds)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(state: &str, sent: &str, replay: &str) -> ReplicationStatus {
        ReplicationStatus {
            pid: 12345,
            state: state.to_string(),
            application_name: "replica1".to_string(),
            sent_lsn: sent.to_string(),
            replay_lsn: replay.to_string(),
            ..ReplicationStatus::default()
        }
    }

    #[test]
    fn parses_lsn_tokens() {
        assert_eq!(parse_lsn("0/12345678"), Some(0x12345678));
        assert_eq!(parse_lsn("1/0"), Some(1 << 32));
        assert_eq!(parse_lsn("FFFFFFFF/FFFFFFFF"), Some(u64::MAX));
        assert_eq!(parse_lsn(""), None);
        assert_eq!(parse_lsn("0/"), None);
        assert_eq!(parse_lsn("12345678"), None);
        assert_eq!(parse_lsn("0/+1"), None);
        assert_eq!(parse_lsn("0/123456789"), None);
        assert_eq!(parse_lsn("G/0"), None);
    }

    #[test]
    fn caught_up_and_lagging() {
        let t = LagThresholds::default();
        let caught_up = classify(&status("streaming", "0/12345678", "0/12345678"), &t);
        assert_eq!(caught_up.class, LagClass::StreamingCaughtUp);
        assert_eq!(caught_up.replay_lag_bytes, Some(0));

        let lagging = classify(&status("streaming", "0/12345678", "0/10000000"), &t);
        assert_eq!(lagging.class, LagClass::StreamingLagging);
        assert_eq!(lagging.replay_lag_bytes, Some(0x02345678));
    }

    #[test]
    fn threshold_tolerates_small_lag() {
        let t = LagThresholds {
            max_caught_up_bytes: 1024,
        };
        let near = classify(&status("streaming", "0/3000400", "0/3000000"), &t);
        assert_eq!(near.class, LagClass::StreamingCaughtUp);
        let far = classify(&status("streaming", "0/3000401", "0/3000000"), &t);
        assert_eq!(far.class, LagClass::StreamingLagging);
    }

    #[test]
    fn lag_crosses_segment_boundary() {
        let t = LagThresholds::default();
        let lag = classify(&status("streaming", "1/00000010", "0/FFFFFFF0"), &t);
        assert_eq!(lag.replay_lag_bytes, Some(0x20));
    }

    #[test]
    fn other_states_and_malformed_tokens() {
        let t = LagThresholds::default();
        assert_eq!(classify(&status("catchup", "0/2", "0/1"), &t).class, LagClass::Catchup);
        assert_eq!(classify(&status("backup", "", ""), &t).class, LagClass::Backup);
        assert_eq!(
            classify(&status("startup", "0/2", "0/1"), &t).class,
            LagClass::Unknown
        );
        let malformed = classify(&status("streaming", "garbage", "0/1"), &t);
        assert_eq!(malformed.class, LagClass::Unknown);
        assert_eq!(malformed.replay_lag_bytes, None);
        assert_eq!(
            classify(&status("streaming", "0/1", ""), &t).class,
            LagClass::Unknown
        );
    }
}
