/**
 * LIFECYCLE CONTROLLER - Start/stop of inverter workers with a busy indicator
 *
 * ROLE:
 * Drives a worker from one control state to another and exposes a stable
 * "busy" signal while the real state is unknown. The registry's status is
 * never patched locally; busy lives beside the record, keyed by inverter id.
 *
 * HOW IT WORKS:
 * - start()/stop() mark the inverter busy synchronously, then spawn the
 *   operation: control call, then reconciliation (see reconcile.rs)
 * - control call rejected: busy cleared at once, no reconciliation
 * - control call accepted: settle (3s for start, 2s for stop by default),
 *   reload the inventory, clear busy, broadcast `Settled`
 * - exclusion "none": concurrent operations on the same inverter each clear
 *   busy on their own, even if a newer one is still running
 * - exclusion "generation": only the newest operation on an inverter may
 *   clear busy; older ones settle as `superseded`
 * - pending reconciliations belong to the controller: shutdown() or drop
 *   cancels them
 */

use crate::config::{ConsoleConfig, ExclusionMode, LifecycleConf};
use crate::inventory::InventoryStore;
use crate::models::{InverterId, InverterStatus};
use crate::reconcile::{ReconcileOutcome, ReconcileStrategy, Reconciler};
use crate::state::{new_state, CancelSource, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Start,
    Stop,
}

impl OperationKind {
    /// Registry status the operation is trying to reach
    pub fn expected(&self) -> InverterStatus {
        match self {
            OperationKind::Start => InverterStatus::Active,
            OperationKind::Stop => InverterStatus::Inactive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Start => "start",
            OperationKind::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Busy {
        inverter: InverterId,
        op: OperationKind,
        operation_id: Uuid,
    },
    Settled {
        inverter: InverterId,
        op: OperationKind,
        operation_id: Uuid,
        /// A newer operation owned the busy flag, so this one left it alone
        superseded: bool,
        outcome: ReconcileOutcome,
    },
}

#[derive(Debug, Clone)]
pub struct BusyEntry {
    pub op: OperationKind,
    pub operation_id: Uuid,
    pub generation: u64,
    pub since: Instant,
}

#[derive(Debug, Default)]
struct LifecycleState {
    busy: HashMap<InverterId, BusyEntry>,
    generations: HashMap<InverterId, u64>,
}

/// Handle on one start/stop invocation
#[derive(Debug)]
pub struct OperationHandle {
    pub inverter: InverterId,
    pub op: OperationKind,
    pub operation_id: Uuid,
    task: JoinHandle<ReconcileOutcome>,
}

impl OperationHandle {
    /// Waits for the reconciliation to finish
    pub async fn outcome(self) -> ReconcileOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => ReconcileOutcome::Cancelled,
            Err(e) => ReconcileOutcome::Failed(format!("operation task failed: {e}")),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub struct LifecycleController {
    inventory: InventoryStore,
    reconciler: Reconciler,
    conf: LifecycleConf,
    state: Shared<LifecycleState>,
    events: broadcast::Sender<LifecycleEvent>,
    cancel: CancelSource,
}

impl LifecycleController {
    pub fn new(inventory: InventoryStore, conf: LifecycleConf, strategy: ReconcileStrategy) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            reconciler: Reconciler::new(inventory.clone(), strategy),
            inventory,
            conf,
            state: new_state(LifecycleState::default()),
            events,
            cancel: CancelSource::new(),
        }
    }

    pub fn from_config(inventory: InventoryStore, config: &ConsoleConfig) -> Self {
        Self::new(
            inventory,
            config.lifecycle.clone(),
            ReconcileStrategy::from(&config.reconcile),
        )
    }

    pub fn inventory(&self) -> &InventoryStore {
        &self.inventory
    }

    /// Requests the worker to start. Busy is visible before this returns.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, id: &InverterId) -> OperationHandle {
        self.launch(id, OperationKind::Start, self.conf.start_settle())
    }

    /// Requests the worker to stop. Same shape as `start`, shorter settle.
    pub fn stop(&self, id: &InverterId) -> OperationHandle {
        self.launch(id, OperationKind::Stop, self.conf.stop_settle())
    }

    pub fn is_busy(&self, id: &InverterId) -> bool {
        self.state.lock().busy.contains_key(id)
    }

    pub fn busy_entry(&self, id: &InverterId) -> Option<BusyEntry> {
        self.state.lock().busy.get(id).cloned()
    }

    pub fn busy_ids(&self) -> Vec<InverterId> {
        let mut ids: Vec<_> = self.state.lock().busy.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Cancels every pending reconciliation. Nothing will settle after this,
    /// so the busy flags are dropped here.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let dropped = {
            let mut st = self.state.lock();
            let n = st.busy.len();
            st.busy.clear();
            n
        };
        info!(dropped, "lifecycle controller shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn launch(&self, id: &InverterId, op: OperationKind, settle_delay: Duration) -> OperationHandle {
        let operation_id = Uuid::new_v4();

        if self.cancel.is_cancelled() {
            warn!(inverter = %id, op = op.as_str(), "controller shut down, command not sent");
            return OperationHandle {
                inverter: id.clone(),
                op,
                operation_id,
                task: tokio::spawn(async { ReconcileOutcome::Cancelled }),
            };
        }

        let generation = {
            let mut st = self.state.lock();
            let generation = st.generations.entry(id.clone()).or_insert(0);
            *generation += 1;
            let generation = *generation;
            st.busy.insert(
                id.clone(),
                BusyEntry { op, operation_id, generation, since: Instant::now() },
            );
            generation
        };
        let _ = self.events.send(LifecycleEvent::Busy { inverter: id.clone(), op, operation_id });

        let api = self.inventory.api();
        let reconciler = self.reconciler.clone();
        let state = self.state.clone();
        let events = self.events.clone();
        let exclusion = self.conf.exclusion;
        let mut token = self.cancel.token();
        let inverter = id.clone();

        let span = info_span!("lifecycle", inverter = %id, op = op.as_str(), %operation_id);
        let task = tokio::spawn(
            async move {
                let accepted = match op {
                    OperationKind::Start => api.start_worker(&inverter).await,
                    OperationKind::Stop => api.stop_worker(&inverter).await,
                };

                let outcome = match accepted {
                    Err(e) => {
                        warn!(error = %e, "control call failed, clearing busy");
                        ReconcileOutcome::Failed(format!("{} command failed: {e}", op.as_str()))
                    }
                    Ok(()) => {
                        info!("command accepted, reconciling");
                        reconciler.settle(&inverter, op.expected(), settle_delay, &mut token).await
                    }
                };

                let superseded = match outcome {
                    ReconcileOutcome::Cancelled => false,
                    _ => !release(&state, &inverter, generation, exclusion),
                };

                info!(?outcome, superseded, "operation settled");
                let _ = events.send(LifecycleEvent::Settled {
                    inverter,
                    op,
                    operation_id,
                    superseded,
                    outcome: outcome.clone(),
                });
                outcome
            }
            .instrument(span),
        );

        OperationHandle { inverter: id.clone(), op, operation_id, task }
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Clears busy for `id` if this operation is allowed to. Returns false when
/// a newer generation owns the flag.
fn release(state: &Shared<LifecycleState>, id: &InverterId, generation: u64, exclusion: ExclusionMode) -> bool {
    let mut st = state.lock();
    match exclusion {
        ExclusionMode::None => {
            st.busy.remove(id);
            true
        }
        ExclusionMode::Generation => {
            let current = st.generations.get(id).copied().unwrap_or(0);
            if current != generation {
                return false;
            }
            st.busy.remove(id);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(id: &InverterId, generation: u64) -> Shared<LifecycleState> {
        let state = new_state(LifecycleState::default());
        {
            let mut st = state.lock();
            st.generations.insert(id.clone(), generation);
            st.busy.insert(
                id.clone(),
                BusyEntry {
                    op: OperationKind::Start,
                    operation_id: Uuid::new_v4(),
                    generation,
                    since: Instant::now(),
                },
            );
        }
        state
    }

    #[test]
    fn test_expected_status() {
        assert_eq!(OperationKind::Start.expected(), InverterStatus::Active);
        assert_eq!(OperationKind::Stop.expected(), InverterStatus::Inactive);
    }

    #[tokio::test]
    async fn test_release_without_exclusion_always_clears() {
        let id = InverterId::new("7");
        let state = state_with(&id, 2);

        assert!(release(&state, &id, 1, ExclusionMode::None));
        assert!(!state.lock().busy.contains_key(&id));
    }

    #[tokio::test]
    async fn test_release_with_generation_keeps_newer_flag() {
        let id = InverterId::new("7");
        let state = state_with(&id, 2);

        assert!(!release(&state, &id, 1, ExclusionMode::Generation));
        assert!(state.lock().busy.contains_key(&id));

        assert!(release(&state, &id, 2, ExclusionMode::Generation));
        assert!(!state.lock().busy.contains_key(&id));
    }

    #[test]
    fn test_settled_event_shape() {
        let event = LifecycleEvent::Settled {
            inverter: InverterId::new("3"),
            op: OperationKind::Stop,
            operation_id: Uuid::nil(),
            superseded: false,
            outcome: ReconcileOutcome::TimedOut,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "settled");
        assert_eq!(json["op"], "stop");
        assert_eq!(json["outcome"]["outcome"], "timed_out");
    }
}
