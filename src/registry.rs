use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::RehydrationConfig;
use crate::error::{OneShotError, Result};
use crate::node::{EphemeralNode, NodeState};

/// The set of one-shot nodes currently known to the scheduler.
///
/// The host scheduler keeps a global view of its workers; this registry is
/// the injectable slice of it that the one-shot subsystem owns. It is passed
/// explicitly to the gatekeeper and surfaces rather than looked up through a
/// process-wide singleton, so tests can run isolated registries side by side.
#[derive(Debug, Default)]
pub struct Registry {
    nodes: RwLock<HashMap<String, Arc<EphemeralNode>>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a node and attach its execution surface. From this point the
    /// node is visible to the scheduler as an available worker.
    pub fn add_node(&self, node: Arc<EphemeralNode>) -> Result<()> {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        if nodes.contains_key(node.name()) {
            return Err(OneShotError::AlreadyRegistered(node.name().to_string()));
        }
        node.attach_surface();
        nodes.insert(node.name().to_string(), node.clone());
        tracing::info!(node = %node.name(), item = %node.queue_item_id(), "Node registered");
        Ok(())
    }

    /// Remove a node. Returns an error if it was not present; callers on the
    /// completion and cancellation paths treat that as already cleaned up.
    pub fn remove_node(&self, name: &str) -> Result<Arc<EphemeralNode>> {
        let removed = {
            let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
            nodes.remove(name)
        };
        match removed {
            Some(node) => {
                tracing::info!(node = %name, "Node removed");
                Ok(node)
            }
            None => Err(OneShotError::NodeNotFound(name.to_string())),
        }
    }

    pub fn get_node(&self, name: &str) -> Option<Arc<EphemeralNode>> {
        self.nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Look up the node bound to a queue item id.
    pub fn node_for_item(&self, item_id: uuid::Uuid) -> Option<Arc<EphemeralNode>> {
        self.nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|n| n.queue_item_id() == item_id)
            .cloned()
    }

    /// Count registered nodes that have not finished their life cycle.
    /// Provisioners use this to implement `can_run` as a plain instance cap.
    pub fn count_active_nodes(&self) -> usize {
        self.nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|n| !matches!(n.state(), NodeState::Terminated | NodeState::Dead))
            .count()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retry a lookup by name until the node shows up or attempts run out.
    ///
    /// After a restart the persisted assignment names a node that may not be
    /// re-registered yet; pipeline rehydration polls for it instead of
    /// failing the run outright.
    pub async fn resolve_retrying(
        &self,
        name: &str,
        cfg: &RehydrationConfig,
    ) -> Option<Arc<EphemeralNode>> {
        for attempt in 0..cfg.attempts {
            if let Some(node) = self.get_node(name) {
                return Some(node);
            }
            tracing::debug!(node = %name, attempt, "Waiting for node to re-register");
            tokio::time::sleep(cfg.interval).await;
        }
        None
    }
}
