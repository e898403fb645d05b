use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::assignment::{Assignment, AssignmentStore};
use crate::item::WorkItem;
use crate::node::{CauseOfBlockage, EphemeralNode};
use crate::provision::Provisioner;
use crate::registry::Registry;

/// What the host scheduler should do with an item after the enqueue hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The item is already exactly bound to a registered node (rehydration
    /// after restart); nothing to provision.
    AlreadyBound(String),
    /// A fresh node was prepared, bound and registered for the item.
    Provisioned(String),
    /// No provisioner claimed the item; the generic scheduler handles it.
    Unclaimed,
    /// Provisioning failed; the item must be cancelled, not retried.
    Cancel,
}

/// Orchestrates the one-shot life cycle around the host scheduler's queue
/// hooks: provisioning on enqueue, admission at dispatch time, cleanup on
/// cancellation, teardown on completion.
pub struct QueueGatekeeper {
    provisioners: Vec<Arc<dyn Provisioner>>,
    registry: Arc<Registry>,
    assignments: AssignmentStore,
}

impl QueueGatekeeper {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            provisioners: Vec::new(),
            registry,
            assignments: AssignmentStore::new(),
        }
    }

    /// Provisioners are consulted in registration order; the first claim
    /// wins.
    pub fn register_provisioner(&mut self, provisioner: Arc<dyn Provisioner>) {
        self.provisioners.push(provisioner);
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn assignments(&self) -> &AssignmentStore {
        &self.assignments
    }

    /// Enqueue hook: as an item becomes buildable, provision a dedicated
    /// node for it and pin the item to that node's name.
    pub fn on_enter_buildable(&self, item: &WorkItem) -> EnqueueOutcome {
        // An item whose affinity exactly names an existing one-shot node was
        // bound before a restart; its node re-registers on its own, so no
        // fresh one is prepared for it.
        if let Some(affinity) = &item.affinity {
            if let Some(node) = self.registry.get_node(affinity) {
                tracing::debug!(item = %item.id, node = %node.name(), "Item already bound");
                self.assignments.record(item.id, Assignment::new(node.name()));
                return EnqueueOutcome::AlreadyBound(node.name().to_string());
            }
        }

        for provisioner in &self.provisioners {
            if !provisioner.uses_one_shot_executor(item) {
                continue;
            }
            return match provisioner.prepare_executor_for(item) {
                Ok(node) => self.register(item, Arc::new(node)),
                Err(e) => {
                    tracing::error!(item = %item.id, error = %e, "Failed to create one-shot agent");
                    EnqueueOutcome::Cancel
                }
            };
        }

        EnqueueOutcome::Unclaimed
    }

    fn register(&self, item: &WorkItem, node: Arc<EphemeralNode>) -> EnqueueOutcome {
        let name = node.name().to_string();
        self.assignments.record(item.id, Assignment::new(&name));
        match self.registry.add_node(node) {
            Ok(()) => EnqueueOutcome::Provisioned(name),
            Err(e) => {
                // No partial state: the assignment goes away with the node.
                self.assignments.take(item.id);
                tracing::error!(item = %item.id, error = %e, "Failed to register one-shot node");
                EnqueueOutcome::Cancel
            }
        }
    }

    /// Dispatch-time admission, re-evaluated every scheduling pass. Every
    /// provisioner claiming the item must be able to afford it now.
    pub fn admission(&self, item: &WorkItem) -> Option<CauseOfBlockage> {
        for provisioner in &self.provisioners {
            if provisioner.uses_one_shot_executor(item) && !provisioner.can_run(item) {
                return Some(CauseOfBlockage::WaitingForResources);
            }
        }
        None
    }

    /// Cancellation hook: the item left the queue before running, so its
    /// node (if any) is deregistered. Best effort; a missing assignment or
    /// an already-removed node means cleanup happened elsewhere.
    pub fn on_left_cancelled(&self, item: &WorkItem) {
        let Some(assignment) = self.assignments.take(item.id) else {
            return;
        };
        match self.registry.remove_node(&assignment.node_name) {
            Ok(node) => {
                node.mark_cancelled();
                tracing::info!(item = %item.id, node = %assignment.node_name, "Cancelled unlaunched node");
            }
            Err(e) => {
                tracing::warn!(item = %item.id, error = %e, "Node already gone on cancellation");
            }
        }
    }

    /// Completion hook (clean finish). Returns the teardown task handle when
    /// a bound node was found.
    pub fn on_task_completed(&self, item: &WorkItem) -> Option<JoinHandle<()>> {
        self.finish(item)
    }

    /// Completion hook for tasks that finished with problems. The problem is
    /// reported into the bound record's log before the same teardown runs.
    pub fn on_task_completed_with_problems(
        &self,
        item: &WorkItem,
        problems: &str,
    ) -> Option<JoinHandle<()>> {
        if let Some(node) = self.node_for(item) {
            if let Some(record) = node.execution() {
                record.log().write_line(&format!("Task completed with problems: {problems}"));
            }
        }
        self.finish(item)
    }

    fn finish(&self, item: &WorkItem) -> Option<JoinHandle<()>> {
        let node = self.node_for(item);
        self.assignments.take(item.id);
        let node = node?;
        let surface = node.surface();
        Some(surface.begin_teardown(node, self.registry.clone()))
    }

    fn node_for(&self, item: &WorkItem) -> Option<Arc<EphemeralNode>> {
        if let Some(assignment) = self.assignments.get(item.id) {
            if let Some(node) = assignment.assigned_node(&self.registry) {
                return Some(node);
            }
        }
        self.registry.node_for_item(item.id)
    }
}
