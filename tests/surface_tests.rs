
use std::sync::Arc;

use oneshot_agent::config::NodeSettings;
use oneshot_agent::item::ExecutionRecord;
use oneshot_agent::node::EphemeralNode;
use oneshot_agent::registry::Registry;
use oneshot_agent::surface::ExecutionSurface;

use test_harness::{oneshot_item, LauncherProbe, ScriptedLauncher};

#[test]
fn offline_stand_in_rejects_everything() {
    let surface = ExecutionSurface::offline_stand_in("oneshot-dead");
    assert_eq!(surface.node_name(), "oneshot-dead");
    assert!(!surface.is_online());
    assert!(!surface.accepting_tasks());
    assert!(surface.log().is_none());
}

#[tokio::test]
async fn unregistered_node_has_no_live_surface() {
    let item = oneshot_item("build");
    let node = EphemeralNode::new(
        &item,
        &NodeSettings::default(),
        Box::new(ScriptedLauncher::ok(LauncherProbe::new())),
    );

    // The surface only comes to life at registration.
    assert!(!node.surface().is_online());
}

#[tokio::test]
async fn surface_carries_the_record_log_after_launch() {
    let item = oneshot_item("build");
    let node = Arc::new(EphemeralNode::new(
        &item,
        &NodeSettings::default(),
        Box::new(ScriptedLauncher::ok(LauncherProbe::new())),
    ));
    let registry = Registry::new();
    registry.add_node(node.clone()).unwrap();

    let surface = node.surface();
    assert!(surface.log().is_none());

    let record = ExecutionRecord::new(&item);
    node.bind_execution(record.clone()).await;

    let log = node.surface().log().expect("log attached at launch");
    assert_eq!(log.contents(), record.log().contents());
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let item = oneshot_item("build");
    let node = Arc::new(EphemeralNode::with_name(
        "oneshot-dup",
        &item,
        &NodeSettings::default(),
        Box::new(ScriptedLauncher::ok(LauncherProbe::new())),
    ));
    let registry = Registry::new();
    registry.add_node(node.clone()).unwrap();
    assert!(registry.add_node(node).is_err());
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn active_node_count_ignores_finished_nodes() {
    let registry = Registry::new();

    let running_item = oneshot_item("running");
    let running = Arc::new(EphemeralNode::new(
        &running_item,
        &NodeSettings::default(),
        Box::new(ScriptedLauncher::ok(LauncherProbe::new())),
    ));
    registry.add_node(running.clone()).unwrap();
    running.bind_execution(ExecutionRecord::new(&running_item)).await;

    let dead_item = oneshot_item("doomed");
    let dead = Arc::new(EphemeralNode::new(
        &dead_item,
        &NodeSettings::default(),
        Box::new(ScriptedLauncher::failing(LauncherProbe::new())),
    ));
    registry.add_node(dead.clone()).unwrap();
    dead.bind_execution(ExecutionRecord::new(&dead_item)).await;

    // Both are still registered, but only one still counts as active.
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.count_active_nodes(), 1);
}
