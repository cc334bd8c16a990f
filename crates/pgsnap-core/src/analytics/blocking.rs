//! Lock-wait graph built from blocked sessions.
//!
//! Edges point from a blocked pid to the pids blocking it. Transitive
//! resolution follows edges through other blocked sessions only; a pid with
//! no entry of its own is a leaf (it holds the lock and isn't waiting).

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::CycleDetected;
use crate::model::BlockedSession;

/// Transitive blockers of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockingChain {
    pub pid: i32,
    /// Every pid reachable through blocking edges, in depth-first discovery
    /// order. Never contains `pid` itself.
    pub blockers: Vec<i32>,
    /// First loop found while walking, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<CycleDetected>,
}

#[derive(Debug, Clone, Default)]
pub struct BlockingGraph<'a> {
    edges: BTreeMap<i32, &'a [i32]>,
}

impl<'a> BlockingGraph<'a> {
    pub fn from_sessions(sessions: &'a [BlockedSession]) -> Self {
        let edges = sessions
            .iter()
            .map(|s| (s.blocked_pid, s.blocking_pids.as_slice()))
            .collect();
        Self { edges }
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Blocked pids in ascending order.
    pub fn blocked_pids(&self) -> impl Iterator<Item = i32> + '_ {
        self.edges.keys().copied()
    }

    /// Direct blocking set as reported by the server. Empty for a pid that
    /// isn't blocked.
    pub fn direct_blockers(&self, pid: i32) -> &'a [i32] {
        self.edges.get(&pid).copied().unwrap_or(&[])
    }

    /// Walks blocking edges from `pid`. Terminates on cycles and reports the
    /// first one found.
    pub fn resolve(&self, pid: i32) -> BlockingChain {
        let mut blockers = Vec::new();
        let mut cycle = None;
        let mut visited = BTreeSet::from([pid]);
        // (node, index of the next child to visit); the stack is the current path.
        let mut stack: Vec<(i32, usize)> = vec![(pid, 0)];

        while let Some(frame) = stack.last_mut() {
            let children = self.direct_blockers(frame.0);
            let Some(&child) = children.get(frame.1) else {
                stack.pop();
                continue;
            };
            frame.1 += 1;

            if let Some(start) = stack.iter().position(|(p, _)| *p == child) {
                if cycle.is_none() {
                    let mut path: Vec<i32> = stack[start..].iter().map(|(p, _)| *p).collect();
                    path.push(child);
                    cycle = Some(CycleDetected { pid: child, path });
                }
                continue;
            }

            if visited.insert(child) {
                blockers.push(child);
                stack.push((child, 0));
            }
        }

        BlockingChain {
            pid,
            blockers,
            cycle,
        }
    }

    /// Resolved chain for every blocked pid, ascending.
    pub fn chains(&self) -> Vec<BlockingChain> {
        self.blocked_pids().map(|pid| self.resolve(pid)).collect()
    }

    /// Pids that block others but aren't blocked themselves, ascending.
    pub fn root_blockers(&self) -> Vec<i32> {
        let roots: BTreeSet<i32> = self
            .edges
            .values()
            .flat_map(|pids| pids.iter().copied())
            .filter(|pid| !self.edges.contains_key(pid))
            .collect();
        roots.into_iter().collect()
    }

    /// All cycles, one per blocked pid that lies on a loop.
    pub fn cycles(&self) -> Vec<CycleDetected> {
        self.chains()
            .into_iter()
            .filter_map(|chain| chain.cycle.filter(|c| c.pid == chain.pid))
            .collect()
    }
}
