use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::error::OneShotError;
use crate::log::TaskLog;
use crate::node::EphemeralNode;
use crate::registry::Registry;

/// The session facade through which the scheduler observes and controls a
/// one-shot node.
///
/// A freshly created surface claims to be online before any real connection
/// exists. That illusion is what lets the scheduler assign the single bound
/// item to the node, which in turn creates the execution record the deferred
/// launch needs. Real connectivity is tracked separately and consulted only
/// by the node's own launch path.
#[derive(Debug)]
pub struct ExecutionSurface {
    node_name: String,
    accepting_tasks: AtomicBool,
    connected: AtomicBool,
    stand_in: bool,
    log: Mutex<Option<TaskLog>>,
}

impl ExecutionSurface {
    pub(crate) fn new(node_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            node_name: node_name.into(),
            accepting_tasks: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            stand_in: false,
            log: Mutex::new(None),
        })
    }

    /// A permanently-offline surface, handed out for nodes whose bootstrap
    /// failed and for nodes already torn down.
    pub fn offline_stand_in(node_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            node_name: node_name.into(),
            accepting_tasks: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            stand_in: true,
            log: Mutex::new(None),
        })
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// What the scheduler sees. Live surfaces always report online so the
    /// bound item gets dispatched without waiting for a real connection.
    pub fn is_online(&self) -> bool {
        !self.stand_in
    }

    /// True connectivity, reported by the launcher. Internal: the only
    /// consumer is the node's LAUNCHING-exit transition.
    pub(crate) fn is_actually_offline(&self) -> bool {
        !self.connected.load(Ordering::SeqCst)
    }

    /// Called by launcher implementations once the worker is reachable.
    pub fn mark_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn accepting_tasks(&self) -> bool {
        self.accepting_tasks.load(Ordering::SeqCst) && !self.stand_in
    }

    pub(crate) fn set_log(&self, log: TaskLog) {
        *self.log.lock().unwrap_or_else(|e| e.into_inner()) = Some(log);
    }

    pub fn log(&self) -> Option<TaskLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Completion-triggered teardown. Flips the surface to not-accepting
    /// synchronously, then hands the rest to its own task: the completion
    /// notification may run on a constrained scheduler pool, and removing
    /// the node inline there can deadlock with the scheduler tearing down
    /// its own execution slot.
    pub(crate) fn begin_teardown(
        self: &Arc<Self>,
        node: Arc<EphemeralNode>,
        registry: Arc<Registry>,
    ) -> JoinHandle<()> {
        self.accepting_tasks.store(false, Ordering::SeqCst);
        tokio::spawn(async move {
            if let Err(e) = registry.remove_node(node.name()) {
                // Best effort; a missing node was already cleaned up.
                let e = OneShotError::Deregistration {
                    name: node.name().to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!(node = %node.name(), error = %e, "Deregistration skipped");
            }
            node.release_surface();
            node.run_termination_hook().await;
            node.mark_terminated();
            tracing::info!(node = %node.name(), "Node torn down");
        })
    }
}
