use helios_console::api::FleetApi;
use helios_console::config::ExclusionMode;
use helios_console::error::ApiError;
use helios_console::lifecycle::{LifecycleEvent, OperationKind};
use helios_console::models::{InverterId, InverterStatus};
use helios_console::reconcile::ReconcileOutcome;
use helios_devkit::{CallKind, RecordBuilder, TestHarness};
use std::time::Duration;
use tokio::time::sleep;

fn harness_with(status: InverterStatus) -> (TestHarness, InverterId) {
    let harness = TestHarness::with_records(vec![RecordBuilder::new("x").status(status).build()]);
    (harness, InverterId::new("x"))
}

#[tokio::test(start_paused = true)]
async fn test_start_sets_busy_synchronously_and_clears_after_settle() {
    let (harness, id) = harness_with(InverterStatus::Inactive);
    harness.fleet.set_latency(CallKind::Start, Duration::from_millis(500));
    let controller = harness.controller();

    let handle = controller.start(&id);
    assert!(controller.is_busy(&id));
    assert_eq!(controller.busy_entry(&id).unwrap().op, OperationKind::Start);

    sleep(Duration::from_millis(2999)).await;
    assert!(controller.is_busy(&id));

    let outcome = handle.outcome().await;
    assert_eq!(outcome, ReconcileOutcome::Reached);
    assert!(!controller.is_busy(&id));
    // settle delay runs from acceptance, so never earlier than 3s after invocation
    assert!(harness.elapsed() >= Duration::from_secs(3));
    assert_eq!(harness.offset_of(CallKind::List, 0), Some(Duration::from_millis(3500)));
}

#[tokio::test(start_paused = true)]
async fn test_inactive_to_active_scenario() {
    let (harness, id) = harness_with(InverterStatus::Inactive);
    harness.fleet.set_boot_delay(Duration::from_secs(1));
    harness.inventory.load().await;
    let controller = harness.controller();

    let handle = controller.start(&id);
    assert!(controller.is_busy(&id));
    assert_eq!(harness.inventory.get(&id).unwrap().status, InverterStatus::Inactive);

    assert_eq!(handle.outcome().await, ReconcileOutcome::Reached);
    assert_eq!(harness.inventory.get(&id).unwrap().status, InverterStatus::Active);
    assert!(!controller.is_busy(&id));
    assert_eq!(harness.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_stop_has_two_second_floor() {
    let (harness, id) = harness_with(InverterStatus::Active);
    let controller = harness.controller();

    let handle = controller.stop(&id);
    assert!(controller.is_busy(&id));

    sleep(Duration::from_millis(1999)).await;
    assert!(controller.is_busy(&id));

    assert_eq!(handle.outcome().await, ReconcileOutcome::Reached);
    assert!(!controller.is_busy(&id));
    assert!(harness.elapsed() >= Duration::from_secs(2));
    assert_eq!(harness.inventory.get(&id).unwrap().status, InverterStatus::Inactive);
}

#[tokio::test(start_paused = true)]
async fn test_control_failure_clears_busy_without_reconciling() {
    let (harness, id) = harness_with(InverterStatus::Inactive);
    harness.fleet.fail(CallKind::Start, ApiError::Transport("connection refused".into()));
    let controller = harness.controller();

    let handle = controller.start(&id);
    assert!(controller.is_busy(&id));

    let outcome = handle.outcome().await;
    assert!(matches!(outcome, ReconcileOutcome::Failed(_)));
    assert!(!controller.is_busy(&id));
    assert_eq!(harness.elapsed(), Duration::ZERO);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.fleet.count(CallKind::List), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_boot_is_reported_as_timed_out() {
    let (harness, id) = harness_with(InverterStatus::Inactive);
    harness.fleet.set_boot_delay(Duration::from_secs(5));
    let controller = harness.controller();

    let outcome = controller.start(&id).outcome().await;

    // reconciled too early: busy is gone but the registry still says inactive
    assert_eq!(outcome, ReconcileOutcome::TimedOut);
    assert!(!controller.is_busy(&id));
    assert_eq!(harness.inventory.get(&id).unwrap().status, InverterStatus::Inactive);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_starts_each_settle_without_exclusion() {
    let (harness, id) = harness_with(InverterStatus::Inactive);
    let controller = harness.controller();
    let mut events = controller.events();

    let first = controller.start(&id);
    sleep(Duration::from_secs(1)).await;
    let second = controller.start(&id);

    // at 3.5s the first operation has cleared busy while the second is still in flight
    sleep(Duration::from_millis(2500)).await;
    assert!(!controller.is_busy(&id));
    assert!(!second.is_finished());

    assert_eq!(first.outcome().await, ReconcileOutcome::Reached);
    assert_eq!(second.outcome().await, ReconcileOutcome::Reached);
    assert_eq!(harness.fleet.count(CallKind::Start), 2);
    assert_eq!(harness.fleet.count(CallKind::List), 2);

    let mut settled = 0;
    while let Ok(event) = events.try_recv() {
        if let LifecycleEvent::Settled { superseded, .. } = event {
            assert!(!superseded);
            settled += 1;
        }
    }
    assert_eq!(settled, 2);
}

#[tokio::test(start_paused = true)]
async fn test_generation_exclusion_keeps_busy_for_newest_operation() {
    let harness = TestHarness::with_records(vec![RecordBuilder::new("x").build()])
        .exclusion(ExclusionMode::Generation);
    let id = InverterId::new("x");
    let controller = harness.controller();
    let mut events = controller.events();

    let first = controller.start(&id);
    sleep(Duration::from_secs(1)).await;
    let second = controller.start(&id);

    sleep(Duration::from_millis(2500)).await;
    assert!(controller.is_busy(&id));
    assert_eq!(controller.busy_entry(&id).unwrap().operation_id, second.operation_id);

    first.outcome().await;
    second.outcome().await;
    assert!(!controller.is_busy(&id));

    let superseded: Vec<bool> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            LifecycleEvent::Settled { superseded, .. } => Some(superseded),
            LifecycleEvent::Busy { .. } => None,
        })
        .collect();
    assert_eq!(superseded, vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_operations_on_distinct_inverters_are_independent() {
    let harness = TestHarness::with_records(vec![
        RecordBuilder::new("a").build(),
        RecordBuilder::new("b").status(InverterStatus::Active).build(),
    ]);
    let (a, b) = (InverterId::new("a"), InverterId::new("b"));
    let controller = harness.controller();

    let start_a = controller.start(&a);
    let stop_b = controller.stop(&b);
    assert_eq!(controller.busy_ids(), vec![a.clone(), b.clone()]);

    assert_eq!(stop_b.outcome().await, ReconcileOutcome::Reached);
    assert!(controller.is_busy(&a));
    assert!(!controller.is_busy(&b));

    assert_eq!(start_a.outcome().await, ReconcileOutcome::Reached);
    assert!(controller.busy_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_poll_until_settled_waits_for_real_transition() {
    let harness = TestHarness::with_records(vec![RecordBuilder::new("x").build()])
        .polling(Duration::from_millis(500), Duration::from_secs(15));
    let id = InverterId::new("x");
    harness.fleet.set_boot_delay(Duration::from_secs(5));
    let controller = harness.controller();

    let outcome = controller.start(&id).outcome().await;

    assert_eq!(outcome, ReconcileOutcome::Reached);
    assert_eq!(harness.elapsed(), Duration::from_secs(5));
    assert_eq!(harness.inventory.get(&id).unwrap().status, InverterStatus::Active);
    assert_eq!(harness.fleet.count(CallKind::List), 10);
}

#[tokio::test(start_paused = true)]
async fn test_poll_until_settled_gives_up_at_timeout() {
    let harness = TestHarness::with_records(vec![RecordBuilder::new("x").build()])
        .polling(Duration::from_millis(500), Duration::from_secs(2));
    let id = InverterId::new("x");
    harness.fleet.set_boot_delay(Duration::from_secs(60));
    let controller = harness.controller();

    let outcome = controller.start(&id).outcome().await;

    assert_eq!(outcome, ReconcileOutcome::TimedOut);
    assert_eq!(harness.elapsed(), Duration::from_secs(2));
    assert!(!controller.is_busy(&id));
}

#[tokio::test(start_paused = true)]
async fn test_poll_stops_on_worker_error() {
    let harness = TestHarness::with_records(vec![RecordBuilder::new("x").build()])
        .polling(Duration::from_millis(500), Duration::from_secs(15));
    let id = InverterId::new("x");
    harness.fleet.set_boot_delay(Duration::from_secs(10));
    let controller = harness.controller();

    let handle = controller.start(&id);
    sleep(Duration::from_millis(1200)).await;
    harness.fleet.set_status(&id, InverterStatus::Error);

    let outcome = handle.outcome().await;
    assert!(matches!(outcome, ReconcileOutcome::Failed(_)));
    assert_eq!(harness.elapsed(), Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn test_poll_stops_when_inverter_is_deleted() {
    let harness = TestHarness::with_records(vec![RecordBuilder::new("x").build()])
        .polling(Duration::from_millis(500), Duration::from_secs(15));
    let id = InverterId::new("x");
    harness.fleet.set_boot_delay(Duration::from_secs(10));
    let controller = harness.controller();

    let handle = controller.start(&id);
    sleep(Duration::from_millis(1200)).await;
    harness.fleet.delete_inverter(&id).await.unwrap();

    let outcome = handle.outcome().await;
    assert_eq!(outcome, ReconcileOutcome::Failed("inverter x no longer registered".into()));
    assert_eq!(harness.elapsed(), Duration::from_millis(1500));
    assert_eq!(harness.fleet.count(CallKind::List), 3);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_reconciliation() {
    let (harness, id) = harness_with(InverterStatus::Inactive);
    let controller = harness.controller();

    let handle = controller.start(&id);
    sleep(Duration::from_secs(1)).await;
    controller.shutdown();

    assert_eq!(handle.outcome().await, ReconcileOutcome::Cancelled);
    assert!(!controller.is_busy(&id));

    sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.fleet.count(CallKind::List), 0);

    // nothing is sent once the controller is shut down
    assert_eq!(controller.start(&id).outcome().await, ReconcileOutcome::Cancelled);
    assert_eq!(harness.fleet.count(CallKind::Start), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_controller_cancels_pending_reconciliation() {
    let (harness, id) = harness_with(InverterStatus::Active);
    let controller = harness.controller();

    let handle = controller.stop(&id);
    sleep(Duration::from_millis(100)).await;
    drop(controller);

    assert_eq!(handle.outcome().await, ReconcileOutcome::Cancelled);
    assert_eq!(harness.fleet.count(CallKind::List), 0);
}
