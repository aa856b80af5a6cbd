//! Reconciliation: re-reading authoritative state after a control command
//!
//! The worker never reports back, so after a start/stop the console has to
//! guess when to look again. Two strategies:
//! - fixed delay: wait the settle delay, reload once, judge what came back
//! - poll until settled: reload at a short interval until the expected
//!   status shows up, the worker reports `error`, or the timeout elapses
//!
//! Either way the caller gets a typed outcome instead of a silent refresh, so
//! "reconciled too early" is visible as `TimedOut`.

use crate::config::{ReconcileConf, ReconcileMode};
use crate::inventory::{FetchOutcome, InventoryStore};
use crate::models::{InverterId, InverterStatus};
use crate::state::CancelToken;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Registry shows the expected status
    Reached,
    /// Settle window elapsed and the registry still shows something else
    TimedOut,
    /// Control call rejected, registry unreachable, or worker in `error`
    Failed(String),
    /// Owner went away before the reconciliation ran
    Cancelled,
}

impl ReconcileOutcome {
    pub fn is_reached(&self) -> bool {
        matches!(self, ReconcileOutcome::Reached)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStrategy {
    FixedDelay,
    PollUntilSettled { interval: Duration, timeout: Duration },
}

impl From<&ReconcileConf> for ReconcileStrategy {
    fn from(conf: &ReconcileConf) -> Self {
        match conf.mode {
            ReconcileMode::FixedDelay => ReconcileStrategy::FixedDelay,
            ReconcileMode::PollUntilSettled => ReconcileStrategy::PollUntilSettled {
                interval: conf.poll_interval(),
                timeout: conf.poll_timeout(),
            },
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    inventory: InventoryStore,
    strategy: ReconcileStrategy,
}

impl Reconciler {
    pub fn new(inventory: InventoryStore, strategy: ReconcileStrategy) -> Self {
        Self { inventory, strategy }
    }

    pub fn strategy(&self) -> ReconcileStrategy {
        self.strategy
    }

    /// Brings the inventory in line with the worker after a control command
    /// and reports whether `expected` was observed. `settle_delay` is only
    /// used by the fixed-delay strategy.
    pub async fn settle(
        &self,
        id: &InverterId,
        expected: InverterStatus,
        settle_delay: Duration,
        cancel: &mut CancelToken,
    ) -> ReconcileOutcome {
        match self.strategy {
            ReconcileStrategy::FixedDelay => {
                if !cancel.sleep(settle_delay).await {
                    return ReconcileOutcome::Cancelled;
                }
                self.observe(id, expected).await.into()
            }
            ReconcileStrategy::PollUntilSettled { interval, timeout } => {
                self.poll(id, expected, interval, timeout, cancel).await
            }
        }
    }

    async fn poll(
        &self,
        id: &InverterId,
        expected: InverterStatus,
        interval: Duration,
        timeout: Duration,
        cancel: &mut CancelToken,
    ) -> ReconcileOutcome {
        let deadline = Instant::now() + timeout;
        let mut attempts = 0u32;

        loop {
            if !cancel.sleep(interval).await {
                return ReconcileOutcome::Cancelled;
            }
            attempts += 1;

            let observed = self.observe(id, expected).await;
            let in_time = Instant::now() < deadline;
            match observed {
                Observation::Elsewhere(_) if in_time => {
                    debug!(inverter = %id, attempts, "not settled yet");
                }
                // A failed reload is transient while polling
                Observation::ReloadFailed(ref error) if in_time => {
                    debug!(inverter = %id, attempts, %error, "reload failed, retrying");
                }
                Observation::Elsewhere(actual) => {
                    warn!(inverter = %id, attempts, expected = %expected, actual = %actual, "gave up waiting for status");
                    return ReconcileOutcome::TimedOut;
                }
                other => return other.into(),
            }
        }
    }

    /// One reload followed by a verdict on the record's status
    async fn observe(&self, id: &InverterId, expected: InverterStatus) -> Observation {
        if let FetchOutcome::Stale { error } = self.inventory.load().await {
            return Observation::ReloadFailed(error);
        }

        match self.inventory.get(id) {
            None => Observation::Unregistered(id.clone()),
            Some(record) => judge(record.status, expected),
        }
    }
}

/// What a single reload showed, before it is folded into an outcome
#[derive(Debug, Clone, PartialEq)]
enum Observation {
    Settled,
    Elsewhere(InverterStatus),
    WorkerError,
    ReloadFailed(String),
    Unregistered(InverterId),
}

impl From<Observation> for ReconcileOutcome {
    fn from(observation: Observation) -> Self {
        match observation {
            Observation::Settled => ReconcileOutcome::Reached,
            Observation::Elsewhere(_) => ReconcileOutcome::TimedOut,
            Observation::WorkerError => ReconcileOutcome::Failed("worker reported error".to_string()),
            Observation::ReloadFailed(error) => {
                ReconcileOutcome::Failed(format!("inventory reload failed: {error}"))
            }
            Observation::Unregistered(id) => {
                ReconcileOutcome::Failed(format!("inverter {id} no longer registered"))
            }
        }
    }
}

fn judge(actual: InverterStatus, expected: InverterStatus) -> Observation {
    if actual == expected {
        Observation::Settled
    } else if actual == InverterStatus::Error {
        Observation::WorkerError
    } else {
        Observation::Elsewhere(actual)
    }
}
