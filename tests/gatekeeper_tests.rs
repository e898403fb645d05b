
use std::sync::Arc;
use std::time::Duration;

use oneshot_agent::config::RehydrationConfig;
use oneshot_agent::gatekeeper::{EnqueueOutcome, QueueGatekeeper};
use oneshot_agent::item::ExecutionRecord;
use oneshot_agent::node::{CauseOfBlockage, NodeState};
use oneshot_agent::provision::Provisioner;
use oneshot_agent::registry::Registry;

use test_harness::{oneshot_item, plain_item, test_gatekeeper, TestProvisioner};

#[tokio::test]
async fn enqueue_provisions_and_binds_a_dedicated_node() {
    let (gatekeeper, registry, _probe) = test_gatekeeper();
    let item = oneshot_item("build");

    let outcome = gatekeeper.on_enter_buildable(&item);
    let EnqueueOutcome::Provisioned(name) = outcome else {
        panic!("expected Provisioned, got {outcome:?}");
    };

    assert_eq!(registry.len(), 1);
    let node = registry.get_node(&name).unwrap();
    assert_eq!(node.queue_item_id(), item.id);
    assert_eq!(node.state(), NodeState::Assigned);
    assert_eq!(node.can_take(&item), None);

    let assignment = gatekeeper.assignments().get(item.id).unwrap();
    assert_eq!(assignment.node_name, name);
}

#[tokio::test]
async fn each_item_gets_its_own_node() {
    let (gatekeeper, registry, _probe) = test_gatekeeper();
    let a = oneshot_item("a");
    let b = oneshot_item("b");

    let EnqueueOutcome::Provisioned(node_a) = gatekeeper.on_enter_buildable(&a) else {
        panic!("a not provisioned");
    };
    let EnqueueOutcome::Provisioned(node_b) = gatekeeper.on_enter_buildable(&b) else {
        panic!("b not provisioned");
    };

    assert_ne!(node_a, node_b);
    assert_eq!(registry.len(), 2);

    // Exclusivity both ways: neither node admits the other's item.
    let na = registry.get_node(&node_a).unwrap();
    let nb = registry.get_node(&node_b).unwrap();
    assert_eq!(na.can_take(&b), Some(CauseOfBlockage::DedicatedToAnother));
    assert_eq!(nb.can_take(&a), Some(CauseOfBlockage::DedicatedToAnother));
}

#[tokio::test]
async fn unclaimed_items_are_left_to_the_generic_scheduler() {
    let (gatekeeper, registry, _probe) = test_gatekeeper();
    let item = plain_item("ordinary build");

    assert_eq!(gatekeeper.on_enter_buildable(&item), EnqueueOutcome::Unclaimed);
    assert!(registry.is_empty());
    assert!(gatekeeper.assignments().is_empty());
}

#[tokio::test]
async fn first_claiming_provisioner_wins() {
    let registry = Registry::new();
    let mut gatekeeper = QueueGatekeeper::new(registry.clone());
    gatekeeper.register_provisioner(Arc::new(
        TestProvisioner::new(registry.clone()).with_node_prefix("first"),
    ));
    gatekeeper.register_provisioner(Arc::new(
        TestProvisioner::new(registry.clone()).with_node_prefix("second"),
    ));

    let item = oneshot_item("claimed twice");
    let EnqueueOutcome::Provisioned(name) = gatekeeper.on_enter_buildable(&item) else {
        panic!("not provisioned");
    };
    assert!(name.starts_with("first-"));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn provisioning_failure_cancels_with_no_partial_state() {
    let registry = Registry::new();
    let mut gatekeeper = QueueGatekeeper::new(registry.clone());
    gatekeeper.register_provisioner(Arc::new(
        TestProvisioner::new(registry.clone()).failing_prepare(),
    ));

    let item = oneshot_item("doomed");
    assert_eq!(gatekeeper.on_enter_buildable(&item), EnqueueOutcome::Cancel);
    assert!(registry.is_empty());
    assert!(gatekeeper.assignments().is_empty());
}

#[tokio::test]
async fn admission_blocks_when_capacity_is_exhausted() {
    let registry = Registry::new();
    let mut gatekeeper = QueueGatekeeper::new(registry.clone());
    gatekeeper.register_provisioner(Arc::new(
        TestProvisioner::new(registry.clone()).with_cap(1),
    ));

    let first = oneshot_item("first");
    assert!(matches!(
        gatekeeper.on_enter_buildable(&first),
        EnqueueOutcome::Provisioned(_)
    ));

    // One active node fills the cap; the next item waits for resources.
    let second = oneshot_item("second");
    assert_eq!(gatekeeper.admission(&first), Some(CauseOfBlockage::WaitingForResources));
    assert_eq!(gatekeeper.admission(&second), Some(CauseOfBlockage::WaitingForResources));
    assert_eq!(
        CauseOfBlockage::WaitingForResources.to_string(),
        "Waiting for available resources"
    );

    // Ordinary items are never blocked by the one-shot admission gate.
    assert_eq!(gatekeeper.admission(&plain_item("ordinary")), None);

    // Capacity frees up once the first node is gone.
    gatekeeper.on_left_cancelled(&first);
    assert_eq!(gatekeeper.admission(&second), None);
}

#[tokio::test]
async fn cancellation_removes_node_and_assignment() {
    let (gatekeeper, registry, _probe) = test_gatekeeper();
    let item = oneshot_item("cancelled early");

    let EnqueueOutcome::Provisioned(name) = gatekeeper.on_enter_buildable(&item) else {
        panic!("not provisioned");
    };
    let node = registry.get_node(&name).unwrap();

    gatekeeper.on_left_cancelled(&item);

    assert!(registry.is_empty());
    assert!(gatekeeper.assignments().is_empty());
    assert_eq!(node.state(), NodeState::Terminated);

    // Cancelling again is not an error: already cleaned up.
    gatekeeper.on_left_cancelled(&item);
}

#[tokio::test]
async fn completion_tears_the_node_down_exactly_once() {
    let (gatekeeper, registry, probe) = test_gatekeeper();
    let item = oneshot_item("finishing build");

    let EnqueueOutcome::Provisioned(name) = gatekeeper.on_enter_buildable(&item) else {
        panic!("not provisioned");
    };
    let node = registry.get_node(&name).unwrap();
    node.bind_execution(ExecutionRecord::new(&item)).await;
    assert_eq!(node.state(), NodeState::Running);

    let teardown = gatekeeper.on_task_completed(&item).expect("teardown spawned");
    teardown.await.unwrap();

    assert!(registry.is_empty());
    assert!(gatekeeper.assignments().is_empty());
    assert_eq!(node.state(), NodeState::Terminated);
    assert!(probe.was_terminated());

    // The node's surface now rejects further work.
    let surface = node.surface();
    assert!(!surface.accepting_tasks());

    // A second completion notification finds nothing to tear down.
    assert!(gatekeeper.on_task_completed(&item).is_none());
}

#[tokio::test]
async fn completion_with_problems_reports_into_the_record() {
    let (gatekeeper, registry, _probe) = test_gatekeeper();
    let item = oneshot_item("flaky build");

    let EnqueueOutcome::Provisioned(name) = gatekeeper.on_enter_buildable(&item) else {
        panic!("not provisioned");
    };
    let node = registry.get_node(&name).unwrap();
    let record = ExecutionRecord::new(&item);
    node.bind_execution(record.clone()).await;

    let teardown = gatekeeper
        .on_task_completed_with_problems(&item, "executor thread died")
        .expect("teardown spawned");
    teardown.await.unwrap();

    assert!(registry.is_empty());
    assert!(record
        .log()
        .contents()
        .contains("Task completed with problems: executor thread died"));
}

#[tokio::test]
async fn rehydrated_item_skips_provisioning() {
    let (gatekeeper, registry, _probe) = test_gatekeeper();
    let item = oneshot_item("pipeline");

    let EnqueueOutcome::Provisioned(name) = gatekeeper.on_enter_buildable(&item) else {
        panic!("not provisioned");
    };

    // After a restart the item re-enters the queue pinned to its node by
    // exact name. No second node is prepared for it.
    let rehydrated = item.clone().with_affinity(&name);
    assert_eq!(
        gatekeeper.on_enter_buildable(&rehydrated),
        EnqueueOutcome::AlreadyBound(name.clone())
    );
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn rehydration_lookup_retries_until_node_reappears() {
    let registry = Registry::new();
    let provisioner = TestProvisioner::new(registry.clone()).with_node_prefix("rehydrated");
    let item = oneshot_item("pipeline");
    let node = Arc::new(provisioner.prepare_executor_for(&item).unwrap());
    let name = node.name().to_string();

    let late_registry = registry.clone();
    let late_node = node.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        late_registry.add_node(late_node).unwrap();
    });

    let cfg = RehydrationConfig {
        attempts: 20,
        interval: Duration::from_millis(10),
    };
    let resolved = registry
        .resolve_retrying(&name, &cfg)
        .await
        .expect("node re-registered");
    assert_eq!(resolved.name(), name);

    // And a node that never comes back resolves to nothing.
    let cfg = RehydrationConfig {
        attempts: 2,
        interval: Duration::from_millis(5),
    };
    assert!(registry.resolve_retrying("gone-forever", &cfg).await.is_none());
}
