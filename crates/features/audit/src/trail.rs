use fxhash::FxHashMap;
use parking_lot::Mutex;
use plm_domain::events::{EventKind, PlmEvent};
use plm_kernel::{now_millis, safe_nanoid};
use std::collections::VecDeque;

/// One recorded domain event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub id: String,
    pub at: i64,
    pub workspace: String,
    pub actor: String,
    pub event: EventKind,
}

/// Bounded trail of the most recent events, one ring per workspace; the oldest entry of a
/// workspace is evicted first.
#[derive(Debug)]
pub struct AuditTrail {
    capacity: usize,
    workspaces: Mutex<FxHashMap<String, VecDeque<AuditEntry>>>,
}

impl AuditTrail {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), workspaces: Mutex::new(FxHashMap::default()) }
    }

    /// Entries kept per workspace.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries kept across all workspaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workspaces.lock().values().map(VecDeque::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workspaces.lock().values().all(VecDeque::is_empty)
    }

    pub fn record(&self, event: &PlmEvent) {
        let entry = AuditEntry {
            id: safe_nanoid!(),
            at: now_millis(),
            workspace: event.workspace.clone(),
            actor: event.actor.clone(),
            event: event.kind.clone(),
        };

        let mut workspaces = self.workspaces.lock();
        let ring = workspaces
            .entry(entry.workspace.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(256)));
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(entry);
    }

    /// Up to `limit` entries of `workspace`, newest first.
    #[must_use]
    pub fn recent(&self, workspace: &str, limit: usize) -> Vec<AuditEntry> {
        self.workspaces
            .lock()
            .get(workspace)
            .map(|ring| ring.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(workspace: &str, id: u64) -> PlmEvent {
        PlmEvent::new(workspace, "alice", EventKind::IssueCreated { id })
    }

    #[test]
    fn oldest_entries_are_evicted() {
        let trail = AuditTrail::new(3);
        for id in 1..=5 {
            trail.record(&event("acme", id));
        }
        assert_eq!(trail.len(), 3);
        let ids: Vec<_> = trail
            .recent("acme", 10)
            .into_iter()
            .map(|entry| match entry.event {
                EventKind::IssueCreated { id } => id,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, [5, 4, 3]);
    }

    #[test]
    fn recent_filters_by_workspace_and_limit() {
        let trail = AuditTrail::new(16);
        trail.record(&event("acme", 1));
        trail.record(&event("globex", 2));
        trail.record(&event("acme", 3));

        let acme = trail.recent("acme", 1);
        assert_eq!(acme.len(), 1);
        assert_eq!(acme[0].event, EventKind::IssueCreated { id: 3 });
        assert_eq!(trail.recent("globex", 10).len(), 1);
        assert!(trail.recent("initech", 10).is_empty());
    }

    #[test]
    fn busy_workspace_does_not_evict_a_quiet_one() {
        let trail = AuditTrail::new(2);
        trail.record(&event("quiet", 1));
        for id in 2..=10 {
            trail.record(&event("busy", id));
        }

        assert_eq!(trail.recent("quiet", 10).len(), 1);
        assert_eq!(trail.recent("busy", 10).len(), 2);
        assert_eq!(trail.len(), 3);
    }

    #[test]
    fn zero_capacity_keeps_one_entry() {
        let trail = AuditTrail::new(0);
        trail.record(&event("acme", 1));
        trail.record(&event("acme", 2));
        assert_eq!(trail.capacity(), 1);
        assert_eq!(trail.recent("acme", 5)[0].event, EventKind::IssueCreated { id: 2 });
    }
}
