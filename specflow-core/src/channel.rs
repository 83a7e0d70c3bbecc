//! Unreliable channel
//!
//! Simulates a remote backend between callers and the stores. Every call
//! waits a random latency, then either fails with a transient network error
//! (without evaluating the operation) or evaluates it. Write paths may also
//! relabel status values ("drift").

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::models::Status;

/// Randomness policy for the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelPolicy {
    /// Lower bound of the uniform latency distribution (inclusive)
    pub min_latency_ms: u64,
    /// Upper bound of the uniform latency distribution (inclusive)
    pub max_latency_ms: u64,
    /// Probability that a call fails before its operation runs
    pub failure_probability: f64,
    /// Probability that create stores the drifted form of the status
    pub create_drift_probability: f64,
    /// Probability that update stores the drifted form of the status
    pub update_drift_probability: f64,
    /// Seed for reproducible runs; entropy when absent
    pub seed: Option<u64>,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            min_latency_ms: 500,
            max_latency_ms: 3000,
            failure_probability: 0.25,
            create_drift_probability: 0.3,
            update_drift_probability: 0.2,
            seed: None,
        }
    }
}

impl ChannelPolicy {
    /// No latency, no failures, no drift
    pub fn reliable() -> Self {
        Self {
            min_latency_ms: 0,
            max_latency_ms: 0,
            failure_probability: 0.0,
            create_drift_probability: 0.0,
            update_drift_probability: 0.0,
            seed: None,
        }
    }

    /// Fixed latency, no failures, no drift
    pub fn fixed_latency(latency_ms: u64) -> Self {
        Self {
            min_latency_ms: latency_ms,
            max_latency_ms: latency_ms,
            ..Self::reliable()
        }
    }

    pub fn with_failure_probability(mut self, probability: f64) -> Self {
        self.failure_probability = probability;
        self
    }

    pub fn with_drift(mut self, create: f64, update: f64) -> Self {
        self.create_drift_probability = create;
        self.update_drift_probability = update;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Checks ranges; called when loading configuration
    pub fn validate(&self) -> Result<()> {
        if self.min_latency_ms > self.max_latency_ms {
            anyhow::bail!(
                "min_latency_ms ({}) must not exceed max_latency_ms ({})",
                self.min_latency_ms,
                self.max_latency_ms
            );
        }
        for (name, value) in [
            ("failure_probability", self.failure_probability),
            ("create_drift_probability", self.create_drift_probability),
            ("update_drift_probability", self.update_drift_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be between 0 and 1, got {}", name, value);
            }
        }
        Ok(())
    }
}

/// Write path on which drift may be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftSite {
    Create,
    Update,
}

/// Counters for calls made through a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub calls: u64,
    pub failures: u64,
    pub drifts: u64,
}

/// Simulated remote transport
pub struct UnreliableChannel {
    policy: ChannelPolicy,
    rng: Mutex<StdRng>,
    calls: AtomicU64,
    failures: AtomicU64,
    drifts: AtomicU64,
}

impl UnreliableChannel {
    pub fn new(policy: ChannelPolicy) -> Self {
        let rng = match policy.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            policy,
            rng: Mutex::new(rng),
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            drifts: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &ChannelPolicy {
        &self.policy
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            calls: self.calls.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
            drifts: self.drifts.load(Ordering::SeqCst),
        }
    }

    /// Runs `operation` after a random delay, unless the failure trial fires.
    ///
    /// The trial is drawn per call, after the delay and before the operation,
    /// so a failed call never touches a store.
    pub async fn execute<T, F>(&self, op: &'static str, operation: F) -> SyncResult<T>
    where
        F: FnOnce() -> SyncResult<T>,
    {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.sample_latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.roll(self.policy.failure_probability) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            warn!(op, latency_ms = latency.as_millis() as u64, "Simulated network failure");
            return Err(SyncError::TransientNetworkFailure);
        }

        debug!(op, latency_ms = latency.as_millis() as u64, "Channel call delivered");
        operation()
    }

    /// Returns `status` or, with the site's drift probability, its drifted form
    pub fn drift(&self, status: Status, site: DriftSite) -> Status {
        let probability = match site {
            DriftSite::Create => self.policy.create_drift_probability,
            DriftSite::Update => self.policy.update_drift_probability,
        };
        if self.roll(probability) {
            let drifted = status.drifted();
            if drifted != status {
                self.drifts.fetch_add(1, Ordering::SeqCst);
                debug!(?site, from = %status, to = %drifted, "Status drifted");
            }
            drifted
        } else {
            status
        }
    }

    fn sample_latency(&self) -> Duration {
        let (min, max) = (self.policy.min_latency_ms, self.policy.max_latency_ms);
        if max <= min {
            return Duration::from_millis(min);
        }
        let ms = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(min..=max);
        Duration::from_millis(ms)
    }

    fn roll(&self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_bool(probability)
    }
}

impl Default for UnreliableChannel {
    fn default() -> Self {
        Self::new(ChannelPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;

    #[test]
    fn test_default_policy_values() {
        let policy = ChannelPolicy::default();
        assert_eq!(policy.min_latency_ms, 500);
        assert_eq!(policy.max_latency_ms, 3000);
        assert_eq!(policy.failure_probability, 0.25);
        assert_eq!(policy.create_drift_probability, 0.3);
        assert_eq!(policy.update_drift_probability, 0.2);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_validation() {
        assert!(ChannelPolicy::reliable()
            .with_failure_probability(1.5)
            .validate()
            .is_err());
        let inverted = ChannelPolicy {
            min_latency_ms: 10,
            max_latency_ms: 5,
            ..ChannelPolicy::reliable()
        };
        assert!(inverted.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_never_runs_operation() {
        let channel = UnreliableChannel::new(ChannelPolicy::fixed_latency(10).with_failure_probability(1.0));
        let ran = Cell::new(false);

        let result = channel
            .execute("test", || {
                ran.set(true);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(SyncError::TransientNetworkFailure)));
        assert!(!ran.get());
        assert_eq!(channel.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_operation_result() {
        let channel = UnreliableChannel::new(ChannelPolicy::reliable());
        let value = channel.execute("test", || Ok(41 + 1)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_errors_propagate() {
        let channel = UnreliableChannel::new(ChannelPolicy::reliable());
        let result: SyncResult<()> = channel
            .execute("test", || Err(SyncError::NotFound("9".to_string())))
            .await;
        assert!(matches!(result, Err(SyncError::NotFound(id)) if id == "9"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_stays_within_bounds() {
        let channel = UnreliableChannel::new(ChannelPolicy::default().with_failure_probability(0.0).with_seed(7));
        for _ in 0..20 {
            let start = Instant::now();
            channel.execute("test", || Ok(())).await.unwrap();
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(500), "{:?}", elapsed);
            assert!(elapsed <= Duration::from_millis(3001), "{:?}", elapsed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_call_is_an_independent_trial() {
        let channel = UnreliableChannel::new(ChannelPolicy::reliable().with_failure_probability(0.5).with_seed(3));
        let mut failures = 0;
        for _ in 0..200 {
            if channel.execute("test", || Ok(())).await.is_err() {
                failures += 1;
            }
        }
        // Shared coin flips would give all-or-nothing
        assert!(failures > 0 && failures < 200);
        assert_eq!(channel.stats().calls, 200);
        assert_eq!(channel.stats().failures, failures);
    }

    #[test]
    fn test_drift_respects_probability() {
        let always = UnreliableChannel::new(ChannelPolicy::reliable().with_drift(1.0, 0.0));
        assert_eq!(
            always.drift(Status::from("In Progress"), DriftSite::Create),
            Status::from("in_progress")
        );
        assert_eq!(
            always.drift(Status::from("In Progress"), DriftSite::Update),
            Status::from("In Progress")
        );
        assert_eq!(always.stats().drifts, 1);
    }
}
