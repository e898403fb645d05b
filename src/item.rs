use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::log::TaskLog;

/// Terminal and in-flight outcomes of a work item's execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    InProgress,
    Succeeded,
    Failed,
    /// The dedicated agent could not be bootstrapped, so the item never ran.
    NotBuilt,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::InProgress => write!(f, "in progress"),
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::NotBuilt => write!(f, "not built"),
        }
    }
}

/// A unit of queued work awaiting a dedicated agent.
///
/// This is the minimal view of the host scheduler's queue item that the
/// one-shot subsystem needs: a stable id, a display name, and the optional
/// affinity the scheduler uses to pin the item to a named worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub task_name: String,
    /// Exact worker name this item is pinned to, if any. Set when an
    /// assignment survives a restart and the item re-enters the queue.
    pub affinity: Option<String>,
}

impl WorkItem {
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_name: task_name.into(),
            affinity: None,
        }
    }

    pub fn with_affinity(mut self, node_name: impl Into<String>) -> Self {
        self.affinity = Some(node_name.into());
        self
    }
}

/// Shared handle to an execution record.
pub type ExecutionRef = Arc<ExecutionRecord>;

/// The durable record of one dispatched work item.
///
/// Created by the execution engine once the item starts; the one-shot agent
/// writes its bootstrap log into the record's own [`TaskLog`] so provisioning
/// failures show up next to the item's normal output.
#[derive(Debug)]
pub struct ExecutionRecord {
    pub item_id: Uuid,
    pub task_name: String,
    pub created_at: DateTime<Utc>,
    outcome: Mutex<Outcome>,
    log: TaskLog,
}

impl ExecutionRecord {
    pub fn new(item: &WorkItem) -> ExecutionRef {
        Self::with_log(item, TaskLog::new())
    }

    pub fn with_log(item: &WorkItem, log: TaskLog) -> ExecutionRef {
        Arc::new(Self {
            item_id: item.id,
            task_name: item.task_name.clone(),
            created_at: Utc::now(),
            outcome: Mutex::new(Outcome::InProgress),
            log,
        })
    }

    pub fn outcome(&self) -> Outcome {
        *self.outcome.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Force the record's outcome. Used by the node on launch failure to mark
    /// the item "not built"; a terminal outcome is never downgraded back to
    /// `InProgress`.
    pub fn set_outcome(&self, outcome: Outcome) {
        let mut cur = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        if *cur != Outcome::InProgress && outcome == Outcome::InProgress {
            return;
        }
        *cur = outcome;
    }

    pub fn log(&self) -> &TaskLog {
        &self.log
    }
}
