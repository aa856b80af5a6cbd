/*!
Flotte simulée en mémoire - implémente `FleetApi` sans backend

Permet de tester le coeur de la console sans registre HTTP ni workers réels :
- Registre d'onduleurs en mémoire (CRUD)
- Workers simulés : start/stop acceptés tout de suite, le statut bascule
  après un délai de boot / d'arrêt configurable
- Journal de tous les appels (type, onduleur, instant tokio)
- Injection de latence et d'erreurs par type d'appel

Les instants utilisent `tokio::time::Instant` : sous `start_paused = true`
le journal est déterministe.
*/

use async_trait::async_trait;
use helios_console::api::FleetApi;
use helios_console::error::ApiError;
use helios_console::models::{InverterConfig, InverterId, InverterRecord, InverterStatus};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Type d'appel reçu par la flotte simulée
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    List,
    Get,
    Create,
    Delete,
    Templates,
    Start,
    Stop,
    Status,
    Logs,
}

/// Entrée du journal d'appels
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub inverter: Option<InverterId>,
    /// Instant de réception (avant la latence simulée)
    pub at: Instant,
}

#[derive(Debug, Clone)]
struct Failure {
    error: ApiError,
    /// None = permanent
    remaining: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    target: InverterStatus,
    at: Instant,
}

#[derive(Debug)]
struct FleetInner {
    records: Vec<InverterRecord>,
    next_id: u64,
    calls: Vec<RecordedCall>,
    latency: HashMap<CallKind, Duration>,
    scripted_latency: HashMap<CallKind, VecDeque<Duration>>,
    failures: HashMap<CallKind, Failure>,
    boot_delay: Duration,
    shutdown_delay: Duration,
    transitions: HashMap<InverterId, Transition>,
    live_status: HashMap<InverterId, String>,
    logs: HashMap<InverterId, String>,
    templates: Vec<String>,
}

impl Default for FleetInner {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            next_id: 1,
            calls: Vec::new(),
            latency: HashMap::new(),
            scripted_latency: HashMap::new(),
            failures: HashMap::new(),
            boot_delay: Duration::ZERO,
            shutdown_delay: Duration::ZERO,
            transitions: HashMap::new(),
            live_status: HashMap::new(),
            logs: HashMap::new(),
            templates: vec!["goodwe".to_string()],
        }
    }
}

impl FleetInner {
    /// Applique les bascules de statut dont l'échéance est passée
    fn apply_transitions(&mut self, now: Instant) {
        let due: Vec<(InverterId, InverterStatus)> = self
            .transitions
            .iter()
            .filter(|(_, t)| t.at <= now)
            .map(|(id, t)| (id.clone(), t.target))
            .collect();

        for (id, target) in due {
            self.transitions.remove(&id);
            if let Some(record) = self.records.iter_mut().find(|r| r.id == id) {
                record.status = target;
                record.container_id = match target {
                    InverterStatus::Active => Some(format!("c0ffee{:0>18}", id.as_str())),
                    _ => None,
                };
            }
        }
    }

    fn take_failure(&mut self, kind: CallKind) -> Option<ApiError> {
        let failure = self.failures.get_mut(&kind)?;
        let error = failure.error.clone();
        let exhausted = match failure.remaining.as_mut() {
            None => false,
            Some(n) => {
                *n = n.saturating_sub(1);
                *n == 0
            }
        };
        if exhausted {
            self.failures.remove(&kind);
        }
        Some(error)
    }

    fn latency_for(&mut self, kind: CallKind) -> Duration {
        if let Some(d) = self.scripted_latency.get_mut(&kind).and_then(|q| q.pop_front()) {
            return d;
        }
        self.latency.get(&kind).copied().unwrap_or(Duration::ZERO)
    }

    fn find(&self, id: &InverterId) -> Result<&InverterRecord, ApiError> {
        self.records
            .iter()
            .find(|r| &r.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("inverter {id}")))
    }
}

/// Backend simulé partagé (clonable, état commun)
#[derive(Clone, Default)]
pub struct MockFleet {
    inner: Arc<Mutex<FleetInner>>,
}

impl MockFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crée une flotte pré-remplie
    pub fn with_records(records: Vec<InverterRecord>) -> Self {
        let fleet = Self::new();
        for record in records {
            fleet.insert(record);
        }
        fleet
    }

    /// Ajoute (ou remplace) un enregistrement directement côté registre
    pub fn insert(&self, record: InverterRecord) {
        let mut inner = self.inner.lock();
        if let Ok(n) = record.id.as_str().parse::<u64>() {
            inner.next_id = inner.next_id.max(n + 1);
        }
        inner.records.retain(|r| r.id != record.id);
        inner.records.push(record);
    }

    /// Modifie le statut côté registre, comme le ferait le backend
    pub fn set_status(&self, id: &InverterId, status: InverterStatus) {
        let mut inner = self.inner.lock();
        inner.transitions.remove(id);
        if let Some(record) = inner.records.iter_mut().find(|r| &r.id == id) {
            record.status = status;
        }
    }

    /// Délai entre l'acceptation d'un start et le passage à `active`
    pub fn set_boot_delay(&self, delay: Duration) {
        self.inner.lock().boot_delay = delay;
    }

    /// Délai entre l'acceptation d'un stop et le passage à `inactive`
    pub fn set_shutdown_delay(&self, delay: Duration) {
        self.inner.lock().shutdown_delay = delay;
    }

    /// Latence appliquée à chaque appel de ce type
    pub fn set_latency(&self, kind: CallKind, latency: Duration) {
        self.inner.lock().latency.insert(kind, latency);
    }

    /// Latence consommée par le prochain appel de ce type uniquement
    pub fn queue_latency(&self, kind: CallKind, latency: Duration) {
        self.inner
            .lock()
            .scripted_latency
            .entry(kind)
            .or_default()
            .push_back(latency);
    }

    /// Tous les appels de ce type échouent jusqu'à `clear_failure`
    pub fn fail(&self, kind: CallKind, error: ApiError) {
        self.inner.lock().failures.insert(kind, Failure { error, remaining: None });
    }

    /// Les `times` prochains appels de ce type échouent
    pub fn fail_times(&self, kind: CallKind, error: ApiError, times: usize) {
        if times == 0 {
            return;
        }
        self.inner
            .lock()
            .failures
            .insert(kind, Failure { error, remaining: Some(times) });
    }

    pub fn clear_failure(&self, kind: CallKind) {
        self.inner.lock().failures.remove(&kind);
    }

    pub fn set_live_status(&self, id: &InverterId, status: impl Into<String>) {
        self.inner.lock().live_status.insert(id.clone(), status.into());
    }

    pub fn set_logs(&self, id: &InverterId, logs: impl Into<String>) {
        self.inner.lock().logs.insert(id.clone(), logs.into());
    }

    pub fn set_templates(&self, templates: Vec<String>) {
        self.inner.lock().templates = templates;
    }

    /// Statut courant côté registre (bascules échues appliquées)
    pub fn status_of(&self, id: &InverterId) -> Option<InverterStatus> {
        let mut inner = self.inner.lock();
        inner.apply_transitions(Instant::now());
        inner.find(id).ok().map(|r| r.status)
    }

    pub fn records(&self) -> Vec<InverterRecord> {
        let mut inner = self.inner.lock();
        inner.apply_transitions(Instant::now());
        inner.records.clone()
    }

    /// Journal complet des appels
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().calls.clone()
    }

    /// Appels d'un type donné, dans l'ordre de réception
    pub fn calls_of(&self, kind: CallKind) -> Vec<RecordedCall> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| c.kind == kind)
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.inner.lock().calls.iter().filter(|c| c.kind == kind).count()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Enregistre l'appel, applique latence et échec éventuel
    async fn enter(&self, kind: CallKind, inverter: Option<&InverterId>) -> Result<(), ApiError> {
        let latency = {
            let mut inner = self.inner.lock();
            inner.calls.push(RecordedCall {
                kind,
                inverter: inverter.cloned(),
                at: Instant::now(),
            });
            inner.latency_for(kind)
        };
        log::debug!("🛰️ [MOCK] {:?} {:?} (latency {:?})", kind, inverter, latency);

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let failure = self.inner.lock().take_failure(kind);
        match failure {
            Some(error) => {
                log::info!("💥 [MOCK] injected failure on {:?}: {}", kind, error);
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn schedule(&self, id: &InverterId, target: InverterStatus, delay: Duration) -> Result<(), ApiError> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.apply_transitions(now);
        inner.find(id)?;
        inner.transitions.insert(id.clone(), Transition { target, at: now + delay });
        inner.apply_transitions(now);
        Ok(())
    }
}

fn default_live_status(status: InverterStatus) -> &'static str {
    match status {
        InverterStatus::Active => "running",
        InverterStatus::Inactive => "inactive",
        InverterStatus::Error => "exited",
        InverterStatus::Pending => "created",
    }
}

#[async_trait]
impl FleetApi for MockFleet {
    async fn list_inverters(&self) -> Result<Vec<InverterRecord>, ApiError> {
        // La réponse reflète l'état au moment de la réception
        let snapshot = self.records();
        self.enter(CallKind::List, None).await?;
        Ok(snapshot)
    }

    async fn get_inverter(&self, id: &InverterId) -> Result<InverterRecord, ApiError> {
        self.enter(CallKind::Get, Some(id)).await?;
        let mut inner = self.inner.lock();
        inner.apply_transitions(Instant::now());
        let record = inner.find(id)?.clone();
        Ok(record)
    }

    async fn create_inverter(&self, config: &InverterConfig) -> Result<InverterRecord, ApiError> {
        self.enter(CallKind::Create, None).await?;
        let mut inner = self.inner.lock();
        let id = InverterId::new(inner.next_id.to_string());
        inner.next_id += 1;

        let record = InverterRecord {
            id,
            name: config.name.clone(),
            inverter_type: config.inverter_type,
            region: config.region,
            timezone: config.timezone.clone(),
            interval_seconds: config.interval_seconds,
            status: InverterStatus::Inactive,
            container_id: None,
            created_at: None,
            last_update: None,
        };
        inner.records.push(record.clone());
        log::info!("➕ [MOCK] registered inverter {} ({})", record.id, record.name);
        Ok(record)
    }

    async fn delete_inverter(&self, id: &InverterId) -> Result<(), ApiError> {
        self.enter(CallKind::Delete, Some(id)).await?;
        let mut inner = self.inner.lock();
        inner.find(id)?;
        inner.records.retain(|r| &r.id != id);
        inner.transitions.remove(id);
        log::info!("➖ [MOCK] deleted inverter {}", id);
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<String>, ApiError> {
        self.enter(CallKind::Templates, None).await?;
        Ok(self.inner.lock().templates.clone())
    }

    async fn start_worker(&self, id: &InverterId) -> Result<(), ApiError> {
        self.enter(CallKind::Start, Some(id)).await?;
        let delay = self.inner.lock().boot_delay;
        self.schedule(id, InverterStatus::Active, delay)
    }

    async fn stop_worker(&self, id: &InverterId) -> Result<(), ApiError> {
        self.enter(CallKind::Stop, Some(id)).await?;
        let delay = self.inner.lock().shutdown_delay;
        self.schedule(id, InverterStatus::Inactive, delay)
    }

    async fn worker_status(&self, id: &InverterId) -> Result<String, ApiError> {
        self.enter(CallKind::Status, Some(id)).await?;
        let mut inner = self.inner.lock();
        inner.apply_transitions(Instant::now());
        if let Some(status) = inner.live_status.get(id) {
            return Ok(status.clone());
        }
        let record = inner.find(id)?;
        Ok(default_live_status(record.status).to_string())
    }

    async fn worker_logs(&self, id: &InverterId) -> Result<String, ApiError> {
        self.enter(CallKind::Logs, Some(id)).await?;
        let inner = self.inner.lock();
        inner.find(id)?;
        let logs = inner.logs.get(id).cloned();
        Ok(logs.unwrap_or_else(|| "No container running".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::RecordBuilder;

    #[tokio::test(start_paused = true)]
    async fn test_start_flips_status_after_boot_delay() {
        let fleet = MockFleet::with_records(vec![RecordBuilder::new("x").build()]);
        let id = InverterId::new("x");
        fleet.set_boot_delay(Duration::from_secs(1));

        fleet.start_worker(&id).await.unwrap();
        assert_eq!(fleet.status_of(&id), Some(InverterStatus::Inactive));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fleet.status_of(&id), Some(InverterStatus::Active));
        assert_eq!(fleet.worker_status(&id).await.unwrap(), "running");
    }

    #[tokio::test]
    async fn test_fail_times_is_consumed() {
        let fleet = MockFleet::new();
        fleet.fail_times(CallKind::List, ApiError::Transport("down".into()), 1);

        assert!(fleet.list_inverters().await.is_err());
        assert!(fleet.list_inverters().await.is_ok());
        assert_eq!(fleet.count(CallKind::List), 2);
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let fleet = MockFleet::new();
        let record = fleet
            .create_inverter(&InverterConfig::new("Roof", "me", "pw"))
            .await
            .unwrap();
        assert_eq!(record.id, InverterId::new("1"));
        assert_eq!(fleet.records().len(), 1);

        fleet.delete_inverter(&record.id).await.unwrap();
        assert!(fleet.records().is_empty());
        assert!(matches!(
            fleet.delete_inverter(&record.id).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_logs_default_without_worker() {
        let fleet = MockFleet::with_records(vec![RecordBuilder::new("3").build()]);
        let logs = fleet.worker_logs(&InverterId::new("3")).await.unwrap();
        assert_eq!(logs, "No container running");
    }
}
