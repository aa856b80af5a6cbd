/**
 * INVENTORY STORE - Known list of inverters, refreshed by full re-fetch
 *
 * ROLE:
 * Holds the registry's inverter list plus a loading indicator. The list is
 * the only shared mutable resource of the console; it is always replaced
 * wholesale by the latest fetch, never patched field by field.
 *
 * HOW IT WORKS:
 * - load(): GET /inverters, swap the whole list in (last issued fetch wins)
 * - create(): POST then reload
 * - remove(): blocking operator confirmation, DELETE, reload
 * - failures are logged and kept as a dismissible notice, the last
 *   known-good list stays displayed
 */

use crate::api::FleetApi;
use crate::error::ConsoleError;
use crate::models::{FleetSummary, InverterConfig, InverterId, InverterRecord};
use crate::state::{new_state, Shared};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DELETE_PROMPT: &str = "Are you sure you want to delete this inverter?";

/// Blocking yes/no gate in front of destructive operations
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Result of one `load()`
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The list was replaced with `count` records
    Fresh { count: usize },
    /// A more recently issued load already landed; this answer was dropped
    Superseded,
    /// The fetch failed; the previous list is still displayed
    Stale { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoveOutcome {
    Declined,
    Removed,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeSource {
    Load,
    Create,
    Remove,
}

/// Dismissible banner describing the last failed inventory operation
#[derive(Debug, Clone)]
pub struct Notice {
    pub source: NoticeSource,
    pub message: String,
    pub raised_at: Instant,
}

#[derive(Debug, Default)]
struct InventoryState {
    records: Vec<InverterRecord>,
    loaded_once: bool,
    in_flight: usize,
    issued: u64,
    applied: u64,
    notice: Option<Notice>,
}

/// Holds one slot of the loading counter for the duration of a fetch
struct InFlight<'a> {
    store: &'a InventoryStore,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        {
            let mut st = self.store.state.lock();
            st.in_flight = st.in_flight.saturating_sub(1);
        }
        self.store.bump();
    }
}

#[derive(Clone)]
pub struct InventoryStore {
    api: Arc<dyn FleetApi>,
    state: Shared<InventoryState>,
    revision: Arc<watch::Sender<u64>>,
}

impl InventoryStore {
    pub fn new(api: Arc<dyn FleetApi>) -> Self {
        let (revision, _rx) = watch::channel(0);
        Self {
            api,
            state: new_state(InventoryState::default()),
            revision: Arc::new(revision),
        }
    }

    pub fn api(&self) -> Arc<dyn FleetApi> {
        self.api.clone()
    }

    /// Receiver bumped on every visible change (list, loading flag, notice)
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Full re-fetch. Never returns an error: failures are logged, recorded
    /// as a notice and leave the previous list in place.
    pub async fn load(&self) -> FetchOutcome {
        let ticket = {
            let mut st = self.state.lock();
            st.in_flight += 1;
            st.issued += 1;
            st.issued
        };
        self.bump();
        // released on completion and when this future is dropped mid-call
        let in_flight = InFlight { store: self };

        let result = self.api.list_inverters().await;

        let outcome = {
            let mut st = self.state.lock();
            match result {
                Ok(records) if ticket > st.applied => {
                    let count = records.len();
                    st.records = records;
                    st.applied = ticket;
                    st.loaded_once = true;
                    if matches!(&st.notice, Some(n) if n.source == NoticeSource::Load) {
                        st.notice = None;
                    }
                    FetchOutcome::Fresh { count }
                }
                Ok(_) => FetchOutcome::Superseded,
                Err(e) => {
                    warn!(error = %e, "failed to fetch inverters");
                    st.notice = Some(Notice {
                        source: NoticeSource::Load,
                        message: format!("Could not refresh inverters: {e}"),
                        raised_at: Instant::now(),
                    });
                    FetchOutcome::Stale { error: e.to_string() }
                }
            }
        };
        drop(in_flight);

        debug!(ticket, ?outcome, "inventory load finished");
        outcome
    }

    /// Registers a new inverter and reloads on success. On failure the
    /// list is untouched and the caller keeps its form open.
    pub async fn create(&self, config: InverterConfig) -> Result<InverterRecord, ConsoleError> {
        config.validate().map_err(ConsoleError::InvalidConfig)?;

        match self.api.create_inverter(&config).await {
            Ok(record) => {
                info!(inverter = %record.id, name = %record.name, "registered inverter");
                self.load().await;
                Ok(record)
            }
            Err(e) => {
                warn!(name = %config.name, error = %e, "failed to register inverter");
                self.raise(NoticeSource::Create, format!("Could not add inverter: {e}"));
                Err(e.into())
            }
        }
    }

    /// Deletes after the operator confirms; nothing goes over the wire when declined
    pub async fn remove(&self, id: &InverterId, confirm: &dyn Confirm) -> RemoveOutcome {
        if !confirm.confirm(DELETE_PROMPT) {
            debug!(inverter = %id, "deletion declined");
            return RemoveOutcome::Declined;
        }

        match self.api.delete_inverter(id).await {
            Ok(()) => {
                info!(inverter = %id, "deleted inverter");
                self.load().await;
                RemoveOutcome::Removed
            }
            Err(e) => {
                warn!(inverter = %id, error = %e, "failed to delete inverter");
                self.raise(NoticeSource::Remove, format!("Could not delete inverter {id}: {e}"));
                RemoveOutcome::Failed(e.to_string())
            }
        }
    }

    fn raise(&self, source: NoticeSource, message: String) {
        self.state.lock().notice = Some(Notice {
            source,
            message,
            raised_at: Instant::now(),
        });
        self.bump();
    }

    pub fn snapshot(&self) -> Vec<InverterRecord> {
        self.state.lock().records.clone()
    }

    pub fn get(&self, id: &InverterId) -> Option<InverterRecord> {
        self.state.lock().records.iter().find(|r| &r.id == id).cloned()
    }

    pub fn summary(&self) -> FleetSummary {
        FleetSummary::from_records(&self.state.lock().records)
    }

    /// True while at least one load is in flight
    pub fn is_loading(&self) -> bool {
        self.state.lock().in_flight > 0
    }

    pub fn has_loaded(&self) -> bool {
        self.state.lock().loaded_once
    }

    pub fn notice(&self) -> Option<Notice> {
        self.state.lock().notice.clone()
    }

    pub fn dismiss_notice(&self) {
        let dismissed = self.state.lock().notice.take().is_some();
        if dismissed {
            self.bump();
        }
    }
}
