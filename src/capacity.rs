use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::shutdown::QuiesceSignal;

/// Outcome of one strategy pass, in the host scheduler's terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyDecision {
    /// Demand is covered; the scheduler stops consulting further strategies.
    ProvisioningComplete,
    /// Capacity still short; remaining strategies get a chance.
    ConsultRemaining,
}

/// Load figures for one label, recomputed by the host every scheduling pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadSnapshot {
    pub idle_executors: usize,
    pub connecting_executors: usize,
    /// Capacity already planned by other strategies this pass.
    pub planned_capacity: usize,
    pub queue_length: usize,
}

/// A backend's promise of a future worker, counted toward available capacity
/// before the worker exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNode {
    pub name: String,
    pub executors: usize,
}

impl PlannedNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executors: 1,
        }
    }
}

/// An elastic infrastructure that can produce workers for a label on demand.
#[async_trait]
pub trait ElasticBackend: Send + Sync {
    fn can_provision(&self, label: &str) -> bool;

    /// Start provisioning up to `excess_workload` workers for `label`.
    /// Returns the planned nodes; actual workers connect later.
    async fn provision(&self, label: &str, excess_workload: usize) -> Vec<PlannedNode>;
}

/// Reconciles available capacity against queue demand, once per scheduling
/// pass per backend.
///
/// Because every item needs its own freshly provisioned node, the strategy
/// reacts to the raw queue length immediately instead of smoothing demand
/// over a sampling window the way a shared-worker provisioner would.
pub struct CapacityStrategy {
    backends: Vec<Arc<dyn ElasticBackend>>,
    enabled: AtomicBool,
    quiesce: QuiesceSignal,
    pending: RwLock<HashMap<String, Vec<PlannedNode>>>,
}

impl CapacityStrategy {
    pub fn new(quiesce: QuiesceSignal) -> Self {
        Self {
            backends: Vec::new(),
            enabled: AtomicBool::new(true),
            quiesce,
            pending: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_backend(&mut self, backend: Arc<dyn ElasticBackend>) {
        self.backends.push(backend);
    }

    /// Runtime toggle. Disabled, the strategy always defers to the
    /// remaining strategies.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Capacity planned by this strategy for `label` that has not yet
    /// materialized as connected workers.
    pub fn pending_capacity(&self, label: &str) -> usize {
        self.pending
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(label)
            .map(|planned| planned.iter().map(|p| p.executors).sum())
            .unwrap_or(0)
    }

    /// Hand the recorded promises for `label` back to the host, clearing
    /// them. Called once the planned workers have connected (or failed).
    pub fn take_pending(&self, label: &str) -> Vec<PlannedNode> {
        self.pending
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(label)
            .unwrap_or_default()
    }

    /// One strategy pass for `label`. Skipped entirely while the scheduler
    /// is quiescing.
    pub async fn apply(&self, label: &str, snapshot: LoadSnapshot) -> StrategyDecision {
        if self.quiesce.is_quiescing() || !self.is_enabled() {
            return StrategyDecision::ConsultRemaining;
        }

        let mut decision = StrategyDecision::ConsultRemaining;
        for backend in &self.backends {
            decision = self.apply_for_backend(backend.as_ref(), label, snapshot).await;
            if decision == StrategyDecision::ProvisioningComplete {
                break;
            }
        }
        decision
    }

    async fn apply_for_backend(
        &self,
        backend: &dyn ElasticBackend,
        label: &str,
        snapshot: LoadSnapshot,
    ) -> StrategyDecision {
        if !backend.can_provision(label) {
            return StrategyDecision::ConsultRemaining;
        }

        let mut available = snapshot.idle_executors
            + snapshot.connecting_executors
            + snapshot.planned_capacity
            + self.pending_capacity(label);
        let demand = snapshot.queue_length;
        tracing::debug!(label, available, demand, "Reconciling one-shot capacity");

        if available < demand {
            let planned = backend.provision(label, demand - available).await;
            tracing::debug!(label, planned = planned.len(), "Planned new nodes");
            available += planned.iter().map(|p| p.executors).sum::<usize>();
            self.record_pending(label, planned);
        }

        if available >= demand {
            tracing::debug!(label, "Provisioning complete");
            StrategyDecision::ProvisioningComplete
        } else {
            tracing::debug!(label, available, demand, "Capacity still short");
            StrategyDecision::ConsultRemaining
        }
    }

    fn record_pending(&self, label: &str, planned: Vec<PlannedNode>) {
        if planned.is_empty() {
            return;
        }
        self.pending
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(label.to_string())
            .or_default()
            .extend(planned);
    }
}
