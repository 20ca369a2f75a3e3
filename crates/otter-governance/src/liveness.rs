use crate::registry::RaftRegistry;
use chrono::{Duration, Utc};
use otter_storage::PersistenceStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodic background sweep marking long-inactive members expired.
///
/// Holds the raft registry exclusively for the duration of a sweep.
/// The task observes a shutdown signal and exits before the next sleep
/// completes.
pub struct LivenessMonitor {
    rafts: Arc<RaftRegistry>,
    store: PersistenceStore,
    expiry_window: Duration,
    tick: std::time::Duration,
    shutdown: watch::Receiver<bool>,
}

impl LivenessMonitor {
    pub fn new(
        rafts: Arc<RaftRegistry>,
        store: PersistenceStore,
        expiry_window: Duration,
        tick: std::time::Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            rafts,
            store,
            expiry_window,
            tick,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately;
        // consume it so the first sweep happens after one full period.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    sweep(&self.rafts, &self.store, self.expiry_window).await;
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Liveness monitor stopped");
    }
}

/// One expiry sweep over every raft. Returns how many members expired.
/// Persistence failures are logged and the sweep continues.
pub(crate) async fn sweep(
    rafts: &RaftRegistry,
    store: &PersistenceStore,
    expiry_window: Duration,
) -> usize {
    let cutoff = Utc::now() - expiry_window;
    let guard = rafts.lock_exclusive().await;

    let mut total = 0;
    for raft in guard.values() {
        let expired = raft.expire_stale_members(cutoff, expiry_window).await;
        if expired.is_empty() {
            continue;
        }
        total += expired.len();

        for member in &expired {
            info!(
                raft_id = %raft.raft_id(),
                member_id = %member.member_id,
                last_seen_at = %member.last_seen_at,
                "Member expired after inactivity"
            );
        }

        let snapshot = raft.snapshot().await;
        if let Err(err) = store.save_raft(&snapshot).await {
            warn!(raft_id = %raft.raft_id(), error = %err, "Failed to persist expiry sweep");
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Raft;
    use otter_storage::{MemoryBackend, PersistenceStore};
    use otter_types::{Member, MembershipState, PublicKey};

    fn store() -> PersistenceStore {
        PersistenceStore::from_backend(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn test_sweep_expires_and_persists() {
        let rafts = Arc::new(RaftRegistry::new());
        let store = store();
        let now = Utc::now();

        let raft = Raft::new("otter-a", now);
        let mut stale = Member::inducted("otter-b", PublicKey::from_bytes([2; 32]), "otter-a", now);
        stale.last_seen_at = now - Duration::days(91);
        raft.insert_member(Member::bootstrap("otter-a", PublicKey::from_bytes([1; 32]), now))
            .await;
        raft.insert_member(stale).await;
        rafts.insert(Arc::new(raft)).await;

        let expired = sweep(&rafts, &store, Duration::days(90)).await;
        assert_eq!(expired, 1);

        let persisted = &store.load_all().await.unwrap()[0];
        assert_eq!(
            persisted.members["otter-b"].state,
            MembershipState::Expired
        );
        assert_eq!(persisted.members["otter-a"].state, MembershipState::Active);

        // Nothing left to expire on the next pass.
        assert_eq!(sweep(&rafts, &store, Duration::days(90)).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_observes_shutdown() {
        let rafts = Arc::new(RaftRegistry::new());
        let (tx, rx) = watch::channel(false);

        let monitor = LivenessMonitor::new(
            rafts,
            store(),
            Duration::days(90),
            std::time::Duration::from_secs(3600),
            rx,
        );
        let handle = tokio::spawn(monitor.run());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
