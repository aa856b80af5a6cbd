//! Detail session: the focused view of one inverter
//!
//! Holds two signals that are deliberately kept apart:
//! - `record()`: the registry's cached record, including its `status`
//! - `live_status()`: what the observability endpoint reported last
//!
//! They can disagree (the registry caches, the worker runtime does not), and
//! both are shown. The session also owns the composite restart, which talks to
//! the control API directly instead of going through `LifecycleController`.
//!
//! Every continuation spawned by the session holds its cancellation token;
//! after `close()` nothing writes into the session any more.

use crate::api::FleetApi;
use crate::config::{ConsoleConfig, LifecycleConf};
use crate::error::ApiError;
use crate::inventory::InventoryStore;
use crate::models::{InverterId, InverterRecord, InverterStatus};
use crate::reconcile::{ReconcileOutcome, ReconcileStrategy, Reconciler};
use crate::state::{new_state, CancelSource, CancelToken, Shared};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Debug, Default)]
struct SessionState {
    record: Option<InverterRecord>,
    live_status: Option<String>,
    logs_text: Option<String>,
    restarting: bool,
    closed: bool,
}

/// What happened during one composite restart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestartReport {
    pub inverter: InverterId,
    /// Set when the stop command was rejected; the chain went on regardless
    pub stop_error: Option<String>,
    pub start_error: Option<String>,
    /// Only reported when waiting for the stop is a poll
    pub stopped: Option<ReconcileOutcome>,
    pub outcome: ReconcileOutcome,
    pub live_status: Option<String>,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

impl RestartReport {
    fn cancelled(inverter: InverterId, elapsed: Duration) -> Self {
        Self {
            inverter,
            stop_error: None,
            start_error: None,
            stopped: None,
            outcome: ReconcileOutcome::Cancelled,
            live_status: None,
            elapsed,
        }
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

pub struct DetailSession {
    id: InverterId,
    api: Arc<dyn FleetApi>,
    inventory: InventoryStore,
    reconciler: Reconciler,
    conf: LifecycleConf,
    state: Shared<SessionState>,
    cancel: CancelSource,
}

impl DetailSession {
    /// Opens the view and fetches live status and logs once, concurrently.
    /// Fetch failures leave the corresponding field empty.
    pub async fn open(record: InverterRecord, inventory: InventoryStore, config: &ConsoleConfig) -> Self {
        let session = Self {
            id: record.id.clone(),
            api: inventory.api(),
            reconciler: Reconciler::new(inventory.clone(), ReconcileStrategy::from(&config.reconcile)),
            inventory,
            conf: config.lifecycle.clone(),
            state: new_state(SessionState { record: Some(record), ..SessionState::default() }),
            cancel: CancelSource::new(),
        };

        debug!(inverter = %session.id, "opening detail session");
        let (status, logs) = tokio::join!(session.refresh_status(), session.refresh_logs());
        if status.is_err() || logs.is_err() {
            debug!(inverter = %session.id, "detail session opened with missing data");
        }
        session
    }

    pub fn id(&self) -> &InverterId {
        &self.id
    }

    /// Registry view of the inverter, refreshed by restart reconciliation
    pub fn record(&self) -> Option<InverterRecord> {
        self.state.lock().record.clone()
    }

    /// Registry status, independent from `live_status`
    pub fn registry_status(&self) -> Option<InverterStatus> {
        self.state.lock().record.as_ref().map(|r| r.status)
    }

    pub fn live_status(&self) -> Option<String> {
        self.state.lock().live_status.clone()
    }

    pub fn logs_text(&self) -> Option<String> {
        self.state.lock().logs_text.clone()
    }

    pub fn is_restarting(&self) -> bool {
        self.state.lock().restarting
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Re-fetches the live status. On failure the previous value stays.
    pub async fn refresh_status(&self) -> Result<String, ApiError> {
        fetch_status(&*self.api, &self.id, &self.state).await
    }

    /// Re-fetches the log excerpt. On failure the previous text stays.
    pub async fn refresh_logs(&self) -> Result<String, ApiError> {
        match self.api.worker_logs(&self.id).await {
            Ok(logs) => {
                let mut st = self.state.lock();
                if !st.closed {
                    st.logs_text = Some(logs.clone());
                }
                Ok(logs)
            }
            Err(e) => {
                warn!(inverter = %self.id, error = %e, "failed to fetch logs");
                Err(e)
            }
        }
    }

    /// Composite restart: stop, wait, start, wait, reconcile.
    ///
    /// The restarting flag is set before this returns. Control failures are
    /// recorded in the report but never interrupt the chain, so a start can be
    /// issued after a stop that did not happen. The chain ends early only when
    /// the session is closed.
    pub fn restart(&self) -> JoinHandle<RestartReport> {
        {
            let mut st = self.state.lock();
            if st.closed || self.cancel.is_cancelled() {
                drop(st);
                debug!(inverter = %self.id, "restart ignored, session closed");
                let report = RestartReport::cancelled(self.id.clone(), Duration::ZERO);
                return tokio::spawn(async move { report });
            }
            st.restarting = true;
        }
        info!(inverter = %self.id, "restart requested");

        let chain = RestartChain {
            id: self.id.clone(),
            api: self.api.clone(),
            inventory: self.inventory.clone(),
            reconciler: self.reconciler.clone(),
            stop_settle: self.conf.stop_settle(),
            start_settle: self.conf.start_settle(),
            state: self.state.clone(),
            token: self.cancel.token(),
        };
        let span = info_span!("restart", inverter = %self.id);
        tokio::spawn(chain.run().instrument(span))
    }

    /// Ends the session. Pending continuations are cancelled and nothing is
    /// written into the session afterwards.
    pub fn close(&self) {
        let mut st = self.state.lock();
        if st.closed {
            return;
        }
        st.closed = true;
        st.restarting = false;
        drop(st);
        self.cancel.cancel();
        debug!(inverter = %self.id, "detail session closed");
    }
}

impl Drop for DetailSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn fetch_status(
    api: &dyn FleetApi,
    id: &InverterId,
    state: &Shared<SessionState>,
) -> Result<String, ApiError> {
    match api.worker_status(id).await {
        Ok(status) => {
            let mut st = state.lock();
            if !st.closed {
                st.live_status = Some(status.clone());
            }
            Ok(status)
        }
        Err(e) => {
            warn!(inverter = %id, error = %e, "failed to fetch live status");
            Err(e)
        }
    }
}

struct RestartChain {
    id: InverterId,
    api: Arc<dyn FleetApi>,
    inventory: InventoryStore,
    reconciler: Reconciler,
    stop_settle: Duration,
    start_settle: Duration,
    state: Shared<SessionState>,
    token: CancelToken,
}

impl RestartChain {
    async fn run(mut self) -> RestartReport {
        let began = Instant::now();
        let mut report = RestartReport::cancelled(self.id.clone(), Duration::ZERO);

        if self.token.is_cancelled() {
            debug!("session closed before restart ran, stop not sent");
            return report;
        }

        if let Err(e) = self.api.stop_worker(&self.id).await {
            warn!(error = %e, "stop command failed, continuing restart");
            report.stop_error = Some(e.to_string());
        }

        let stopped = match self.reconciler.strategy() {
            ReconcileStrategy::FixedDelay => {
                if self.token.sleep(self.stop_settle).await {
                    None
                } else {
                    Some(ReconcileOutcome::Cancelled)
                }
            }
            ReconcileStrategy::PollUntilSettled { .. } => Some(
                self.reconciler
                    .settle(&self.id, InverterStatus::Inactive, self.stop_settle, &mut self.token)
                    .await,
            ),
        };
        if stopped == Some(ReconcileOutcome::Cancelled) {
            debug!("session closed during restart, start not sent");
            report.elapsed = began.elapsed();
            return report;
        }
        report.stopped = stopped;

        if let Err(e) = self.api.start_worker(&self.id).await {
            warn!(error = %e, "start command failed, continuing restart");
            report.start_error = Some(e.to_string());
        }

        report.outcome = self
            .reconciler
            .settle(&self.id, InverterStatus::Active, self.start_settle, &mut self.token)
            .await;
        if report.outcome == ReconcileOutcome::Cancelled || self.token.is_cancelled() {
            report.outcome = ReconcileOutcome::Cancelled;
            report.elapsed = began.elapsed();
            return report;
        }

        // settle() already reloaded the inventory; only the live status is left
        report.live_status = fetch_status(&*self.api, &self.id, &self.state).await.ok();

        let record = self.inventory.get(&self.id);
        {
            let mut st = self.state.lock();
            if !st.closed {
                if record.is_some() {
                    st.record = record;
                }
                st.restarting = false;
            }
        }

        report.elapsed = began.elapsed();
        info!(outcome = ?report.outcome, elapsed_ms = report.elapsed.as_millis() as u64, "restart finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serialization() {
        let report = RestartReport {
            inverter: InverterId::new("9"),
            stop_error: Some("connection refused".into()),
            start_error: None,
            stopped: None,
            outcome: ReconcileOutcome::Reached,
            live_status: Some("running".into()),
            elapsed: Duration::from_millis(5_012),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["inverter"], "9");
        assert_eq!(json["elapsed"], 5_012);
        assert_eq!(json["outcome"]["outcome"], "reached");
        assert!(json["start_error"].is_null());
    }
}
