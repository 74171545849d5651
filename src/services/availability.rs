//! Availability breaker for optional storage objects.
//!
//! Sub-resource tables are deployed independently of the server. When a table turns out to be
//! missing, every player would otherwise pay a failing round-trip on each load and save, so the
//! breaker remembers the outage and short-circuits access until a cooldown elapses. After the
//! cooldown a single call is admitted as a probe; its outcome decides whether the breaker closes.

use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, warn};

use crate::dao::storage::StorageResult;

/// Cooldown applied when the configuration does not override it.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Observable state of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls go through.
    Available,
    /// Calls short-circuit until the cooldown has elapsed.
    Unavailable {
        /// When the object was found missing.
        marked_at: Instant,
    },
    /// One call is testing whether the object is back; others short-circuit.
    Probing {
        /// When the test call was admitted.
        started_at: Instant,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Proceed,
    Probe,
    ShortCircuit,
}

/// Tracks the availability of a single storage object (table, collection, or history store).
#[derive(Debug)]
pub struct AvailabilityBreaker {
    name: &'static str,
    cooldown: Duration,
    state: Mutex<BreakerState>,
    generation: AtomicU64,
}

impl AvailabilityBreaker {
    /// Breaker for `name`, starting available.
    pub fn new(name: &'static str, cooldown: Duration) -> Self {
        Self {
            name,
            cooldown,
            state: Mutex::new(BreakerState::Available),
            generation: AtomicU64::new(0),
        }
    }

    /// Name of the guarded storage object.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current state.
    pub async fn state(&self) -> BreakerState {
        *self.state.lock().await
    }

    /// Number of recoveries observed so far.
    ///
    /// Anything derived while the object was unavailable (signature baselines in particular) is
    /// stale once this value moves.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns `Ok(None)` without calling `operation` while the breaker is open, and also when
    /// the call itself reports the storage object as missing. Other errors are returned as-is.
    pub async fn run<T, F, Fut>(&self, operation: F) -> StorageResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let admission = self.admit().await;
        if admission == Admission::ShortCircuit {
            debug!(object = self.name, "storage object unavailable; skipping call");
            return Ok(None);
        }

        let probing = admission == Admission::Probe;
        match operation().await {
            Ok(value) => {
                if probing {
                    self.recover("probe succeeded").await;
                }
                Ok(Some(value))
            }
            Err(err) if err.is_schema_missing() => {
                self.trip(probing, &err.to_string()).await;
                Ok(None)
            }
            Err(err) => {
                if probing {
                    // Not evidence of a missing object; let the caller see the failure.
                    self.recover("probe reached storage").await;
                }
                Err(err)
            }
        }
    }

    async fn admit(&self) -> Admission {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        match *state {
            BreakerState::Available => Admission::Proceed,
            BreakerState::Unavailable { marked_at } if now.duration_since(marked_at) >= self.cooldown => {
                *state = BreakerState::Probing { started_at: now };
                debug!(object = self.name, "cooldown elapsed; admitting probe");
                Admission::Probe
            }
            // A probe that never reported back (its caller was cancelled) is replaced.
            BreakerState::Probing { started_at } if now.duration_since(started_at) >= self.cooldown => {
                *state = BreakerState::Probing { started_at: now };
                Admission::Probe
            }
            BreakerState::Unavailable { .. } | BreakerState::Probing { .. } => Admission::ShortCircuit,
        }
    }

    async fn trip(&self, probing: bool, error: &str) {
        let mut state = self.state.lock().await;
        match *state {
            BreakerState::Available => {
                *state = BreakerState::Unavailable {
                    marked_at: Instant::now(),
                };
                warn!(
                    object = self.name,
                    cooldown_secs = self.cooldown.as_secs(),
                    error,
                    "storage object missing; short-circuiting access"
                );
            }
            BreakerState::Probing { .. } if probing => {
                *state = BreakerState::Unavailable {
                    marked_at: Instant::now(),
                };
                debug!(object = self.name, "probe found storage object still missing");
            }
            BreakerState::Unavailable { .. } | BreakerState::Probing { .. } => {}
        }
    }

    async fn recover(&self, cause: &'static str) {
        let mut state = self.state.lock().await;
        if matches!(*state, BreakerState::Probing { .. }) {
            *state = BreakerState::Available;
            let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            info!(object = self.name, generation, cause, "storage object available again");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::dao::storage::StorageError;

    fn missing() -> StorageResult<u32> {
        Err(StorageError::schema_missing("player_pets"))
    }

    fn breaker() -> AvailabilityBreaker {
        AvailabilityBreaker::new("player_pets", DEFAULT_COOLDOWN)
    }

    #[tokio::test]
    async fn schema_missing_opens_the_breaker() {
        let breaker = breaker();

        assert_eq!(breaker.run(|| async { missing() }).await.unwrap(), None);
        assert!(matches!(breaker.state().await, BreakerState::Unavailable { .. }));

        let calls = AtomicUsize::new(0);
        let result = breaker
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .await
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_after_cooldown_closes_the_breaker() {
        let breaker = breaker();
        breaker.run(|| async { missing() }).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(breaker.run(|| async { Ok(1) }).await.unwrap(), None);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.run(|| async { Ok(7) }).await.unwrap(), Some(7));
        assert_eq!(breaker.state().await, BreakerState::Available);
        assert_eq!(breaker.generation(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_restarts_the_cooldown() {
        let breaker = breaker();
        breaker.run(|| async { missing() }).await.unwrap();

        tokio::time::advance(DEFAULT_COOLDOWN).await;
        assert_eq!(breaker.run(|| async { missing() }).await.unwrap(), None);
        assert!(matches!(breaker.state().await, BreakerState::Unavailable { .. }));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(breaker.run(|| async { Ok(1) }).await.unwrap(), None);
        assert_eq!(breaker.generation(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_probe_is_admitted() {
        let breaker = breaker();
        breaker.run(|| async { missing() }).await.unwrap();
        tokio::time::advance(DEFAULT_COOLDOWN).await;

        assert_eq!(breaker.admit().await, Admission::Probe);
        assert_eq!(breaker.admit().await, Admission::ShortCircuit);
        assert_eq!(breaker.admit().await, Admission::ShortCircuit);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_probe_failure_propagates_and_closes() {
        let breaker = breaker();
        breaker.run(|| async { missing() }).await.unwrap();
        tokio::time::advance(DEFAULT_COOLDOWN).await;

        let result = breaker
            .run(|| async {
                Err::<u32, _>(StorageError::unavailable(
                    "connection reset".into(),
                    std::io::Error::other("reset"),
                ))
            })
            .await;
        assert!(matches!(result, Err(StorageError::Unavailable { .. })));
        assert_eq!(breaker.state().await, BreakerState::Available);
    }

    #[tokio::test]
    async fn transient_failures_keep_the_breaker_closed() {
        let breaker = breaker();
        let result = breaker
            .run(|| async {
                Err::<u32, _>(StorageError::unavailable(
                    "timeout".into(),
                    std::io::Error::other("timeout"),
                ))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(breaker.state().await, BreakerState::Available);
    }
}
