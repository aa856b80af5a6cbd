/*!
Test Harness pour la console Helios

Assemble en une ligne ce dont un test d'orchestration a besoin :
- `MockFleet` pré-remplie
- `InventoryStore` branché dessus
- `ConsoleConfig` par défaut (modifiable avant `controller()`/`session()`)
- Logging de test via env_logger
*/

use crate::mock_fleet::{CallKind, MockFleet};
use anyhow::Result;
use helios_console::api::FleetApi;
use helios_console::config::{ConsoleConfig, ExclusionMode, ReconcileMode};
use helios_console::inventory::InventoryStore;
use helios_console::lifecycle::LifecycleController;
use helios_console::models::{InverterId, InverterRecord};
use helios_console::session::DetailSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub struct TestHarness {
    pub fleet: MockFleet,
    pub inventory: InventoryStore,
    pub config: ConsoleConfig,
    started: Instant,
}

impl TestHarness {
    pub fn new() -> Self {
        env_logger::builder().is_test(true).try_init().ok(); // Init logging pour tests
        Self::with_fleet(MockFleet::new())
    }

    pub fn with_records(records: Vec<InverterRecord>) -> Self {
        env_logger::builder().is_test(true).try_init().ok();
        Self::with_fleet(MockFleet::with_records(records))
    }

    pub fn with_fleet(fleet: MockFleet) -> Self {
        let api: Arc<dyn FleetApi> = Arc::new(fleet.clone());
        Self {
            inventory: InventoryStore::new(api),
            fleet,
            config: ConsoleConfig::default(),
            started: Instant::now(),
        }
    }

    /// Active la réconciliation par polling
    pub fn polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.config.reconcile.mode = ReconcileMode::PollUntilSettled;
        self.config.reconcile.poll_interval_ms = interval.as_millis() as u64;
        self.config.reconcile.poll_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn exclusion(mut self, mode: ExclusionMode) -> Self {
        self.config.lifecycle.exclusion = mode;
        self
    }

    pub fn controller(&self) -> LifecycleController {
        LifecycleController::from_config(self.inventory.clone(), &self.config)
    }

    /// Ouvre une session détail sur un onduleur connu de la flotte
    pub async fn session(&self, id: &str) -> Result<DetailSession> {
        let id = InverterId::new(id);
        let record = self
            .fleet
            .records()
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("No inverter {} in the mock fleet", id))?;
        Ok(DetailSession::open(record, self.inventory.clone(), &self.config).await)
    }

    /// Temps écoulé depuis la création du harness (horloge tokio)
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Instant d'un appel relatif au démarrage du harness
    pub fn offset_of(&self, kind: CallKind, nth: usize) -> Option<Duration> {
        self.fleet
            .calls_of(kind)
            .get(nth)
            .map(|call| call.at.duration_since(self.started))
    }

    pub fn print_calls(&self) {
        println!("📊 Mock fleet calls:");
        for call in self.fleet.calls() {
            println!(
                "  +{:>6}ms {:?} {}",
                call.at.duration_since(self.started).as_millis(),
                call.kind,
                call.inverter.as_ref().map(|id| id.as_str()).unwrap_or("-")
            );
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::RecordBuilder;

    #[tokio::test(start_paused = true)]
    async fn test_harness_tracks_call_offsets() {
        let harness = TestHarness::with_records(vec![RecordBuilder::new("1").build()]);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        harness.inventory.load().await;

        assert_eq!(harness.offset_of(CallKind::List, 0), Some(Duration::from_millis(1500)));
        assert_eq!(harness.inventory.snapshot().len(), 1);
        assert!(harness.elapsed() >= Duration::from_millis(1500));
    }
}
