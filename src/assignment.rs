use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::node::EphemeralNode;
use crate::registry::Registry;

/// The durable binding between a work item and its dedicated node.
///
/// Attached to the item's durable record by the host scheduler, and
/// serialized as the bare node-name string, so a restarted process can
/// re-locate the node by exact name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assignment {
    pub node_name: String,
}

impl Assignment {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Resolve the bound node, if it is still registered.
    pub fn assigned_node(&self, registry: &Registry) -> Option<Arc<EphemeralNode>> {
        registry.get_node(&self.node_name)
    }
}

/// In-memory index of live assignments, keyed by work item id.
#[derive(Debug, Default)]
pub struct AssignmentStore {
    inner: RwLock<HashMap<Uuid, Assignment>>,
}

impl AssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, item_id: Uuid, assignment: Assignment) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(item_id, assignment);
    }

    pub fn get(&self, item_id: Uuid) -> Option<Assignment> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&item_id)
            .cloned()
    }

    /// Remove and return the assignment for an item. A missing entry means
    /// the binding was already cleaned up, which is not an error.
    pub fn take(&self, item_id: Uuid) -> Option<Assignment> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&item_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
