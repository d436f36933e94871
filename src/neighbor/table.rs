//! Shared neighbor table.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::identity::NodeKey;

use super::{Neighbor, NeighborState};

/// Authoritative per-peer state, keyed by public key.
///
/// The table is shared by every listener task; all read-modify-write on a
/// neighbor (lookup-or-create, replay check, field updates) goes through
/// [`update`](Self::update) so it executes as one atomic unit under the
/// table lock. The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct NeighborTable {
    inner: Mutex<HashMap<NodeKey, Neighbor>>,
}

impl NeighborTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known neighbors.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if no neighbors are known.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of a neighbor's current state.
    pub fn lookup(&self, public_key: &NodeKey) -> Option<Neighbor> {
        self.lock().get(public_key).cloned()
    }

    /// Run `f` against the neighbor record for `public_key`, creating a
    /// fresh record first if none exists.
    ///
    /// The whole call is one critical section: concurrent messages claiming
    /// the same public key serialize here, so sequence-number advancement is
    /// race-free.
    pub fn update<R>(&self, public_key: NodeKey, f: impl FnOnce(&mut Neighbor) -> R) -> R {
        let mut table = self.lock();
        let neighbor = table
            .entry(public_key)
            .or_insert_with(|| Neighbor::new(public_key));
        f(neighbor)
    }

    /// Snapshot of every neighbor, for diagnostics.
    pub fn snapshot(&self) -> Vec<Neighbor> {
        self.lock().values().cloned().collect()
    }

    /// Roll tunnel negotiations that have been parked in `TunnelProposed`
    /// or `TunnelConfirmed` for longer than `timeout` back to `Mutual`, so
    /// a fresh proposal can restart them. Returns the number of neighbors
    /// decayed.
    ///
    /// Records themselves are never evicted: forgetting a neighbor would
    /// reset its replay baseline.
    pub fn decay_stale_negotiations(&self, timeout: Duration) -> usize {
        let mut decayed = 0;
        for neighbor in self.lock().values_mut() {
            let parked = matches!(
                neighbor.state,
                NeighborState::TunnelProposed | NeighborState::TunnelConfirmed
            );
            if parked && neighbor.last_transition.elapsed() >= timeout {
                neighbor.state = NeighborState::Mutual;
                neighbor.last_transition = std::time::Instant::now();
                decayed += 1;
            }
        }
        decayed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<NodeKey, Neighbor>> {
        // A poisoned lock only means another handler panicked mid-update;
        // the table itself is still structurally sound.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
