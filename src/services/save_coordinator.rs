//! Per-key mutual exclusion for asynchronous work.
//!
//! Each key owns a lane: a fair async mutex that serves callers in submission order, plus an
//! `active` flag that must never be set when a new run starts. Lanes exist only while someone
//! holds or waits for them.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use dashmap::DashMap;
use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

/// A run started while another run for the same key was still marked active.
#[derive(Debug, Error)]
#[error("exclusive run for `{key}` ({reason}) started while another run was active")]
pub struct InvariantViolation {
    /// Key of the lane.
    pub key: String,
    /// Reason given by the overlapping run.
    pub reason: String,
}

#[derive(Default)]
struct Lane {
    gate: Mutex<()>,
    active: AtomicBool,
    users: AtomicUsize,
}

/// Serializes work per key while letting different keys proceed independently.
#[derive(Default)]
pub struct SaveCoordinator {
    lanes: DashMap<String, Arc<Lane>>,
}

impl SaveCoordinator {
    /// Coordinator with no lanes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` once every earlier call for `key` has finished.
    ///
    /// The output of `work` is handed back untouched, errors included; a failing run does not
    /// affect the calls queued behind it.
    pub async fn run_exclusive<F, Fut>(
        &self,
        key: &str,
        reason: &str,
        work: F,
    ) -> Result<Fut::Output, InvariantViolation>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let lane = {
            let entry = self.lanes.entry(key.to_owned()).or_default();
            entry.users.fetch_add(1, Ordering::AcqRel);
            entry.clone()
        };
        let _release = LaneRelease {
            lanes: &self.lanes,
            key,
            lane: &lane,
        };

        let _turn = lane.gate.lock().await;
        if lane.active.swap(true, Ordering::AcqRel) {
            return Err(InvariantViolation {
                key: key.to_owned(),
                reason: reason.to_owned(),
            });
        }
        let _active = ActiveMark(&lane.active);

        debug!(key, reason, "exclusive run started");
        let started = Instant::now();
        let output = work().await;
        debug!(
            key,
            reason,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "exclusive run finished"
        );

        Ok(output)
    }

    /// Number of keys currently holding or waiting for their lane.
    pub fn active_lanes(&self) -> usize {
        self.lanes.len()
    }
}

struct ActiveMark<'a>(&'a AtomicBool);

impl Drop for ActiveMark<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct LaneRelease<'a> {
    lanes: &'a DashMap<String, Arc<Lane>>,
    key: &'a str,
    lane: &'a Arc<Lane>,
}

impl Drop for LaneRelease<'_> {
    fn drop(&mut self) {
        if self.lane.users.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.lanes
                .remove_if(self.key, |_, lane| lane.users.load(Ordering::Acquire) == 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex as StdMutex, time::Duration};

    use tokio::sync::oneshot;

    use super::*;

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn same_key_runs_in_submission_order() {
        let coordinator = Arc::new(SaveCoordinator::new());
        let order = Arc::new(StdMutex::new(Vec::new()));
        let (release, hold) = oneshot::channel::<()>();

        let first = {
            let coordinator = coordinator.clone();
            let order = order.clone();
            tokio::spawn(async move {
                coordinator
                    .run_exclusive("player", "first", || async move {
                        let _ = hold.await;
                        order.lock().unwrap().push(0);
                    })
                    .await
            })
        };
        settle().await;

        let mut queued = Vec::new();
        for position in 1..=3 {
            let coordinator = coordinator.clone();
            let order = order.clone();
            queued.push(tokio::spawn(async move {
                coordinator
                    .run_exclusive("player", "queued", || async move {
                        order.lock().unwrap().push(position);
                    })
                    .await
            }));
            settle().await;
        }

        release.send(()).unwrap();
        first.await.unwrap().unwrap();
        for handle in queued {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(coordinator.active_lanes(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_never_overlap_for_one_key() {
        let coordinator = Arc::new(SaveCoordinator::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles = (0..16)
            .map(|_| {
                let coordinator = coordinator.clone();
                let running = running.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    coordinator
                        .run_exclusive("player", "save", || async move {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(2)).await;
                            running.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_do_not_poison_the_lane() {
        let coordinator = SaveCoordinator::new();

        let failed: Result<(), &str> = coordinator
            .run_exclusive("player", "save", || async { Err("boom") })
            .await
            .unwrap();
        assert_eq!(failed, Err("boom"));

        let next = coordinator
            .run_exclusive("player", "save", || async { 5 })
            .await
            .unwrap();
        assert_eq!(next, 5);
    }

    #[tokio::test]
    async fn other_keys_are_not_blocked() {
        let coordinator = Arc::new(SaveCoordinator::new());
        let (release, hold) = oneshot::channel::<()>();

        let blocked = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .run_exclusive("a", "save", || async move {
                        let _ = hold.await;
                    })
                    .await
            })
        };
        settle().await;

        let other = coordinator
            .run_exclusive("b", "save", || async { "done" })
            .await
            .unwrap();
        assert_eq!(other, "done");
        assert_eq!(coordinator.active_lanes(), 1);

        release.send(()).unwrap();
        blocked.await.unwrap().unwrap();
        assert_eq!(coordinator.active_lanes(), 0);
    }

    #[tokio::test]
    async fn lingering_active_mark_is_reported() {
        let coordinator = SaveCoordinator::new();
        coordinator
            .lanes
            .entry("player".into())
            .or_default()
            .active
            .store(true, Ordering::SeqCst);

        let result = coordinator
            .run_exclusive("player", "save", || async {})
            .await;
        let violation = result.unwrap_err();
        assert_eq!(violation.key, "player");
        assert_eq!(violation.reason, "save");
    }
}
