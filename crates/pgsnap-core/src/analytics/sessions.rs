use crate::model::ActiveSession;

/// Top `limit` sessions by descending wait duration.
///
/// Ties keep their input order. `limit` larger than the input is clamped.
pub fn longest_waiting(sessions: &[ActiveSession], limit: usize) -> Vec<&ActiveSession> {
    let mut sorted: Vec<&ActiveSession> = sessions.iter().collect();
    sorted.sort_by(|a, b| b.duration.total_cmp(&a.duration));
    sorted.truncate(limit);
    sorted
}
