use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::config::NodeSettings;
use crate::item::{ExecutionRef, Outcome, WorkItem};
use crate::log::TaskLog;
use crate::provision::Launcher;
use crate::surface::ExecutionSurface;

/// Lifecycle states of an [`EphemeralNode`].
///
/// `Created → Assigned → Launching → {Running | Dead} → Terminated`, with a
/// direct jump to `Terminated` when the bound item is cancelled before
/// launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Assigned,
    Launching,
    Running,
    Dead,
    Terminated,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Created => write!(f, "created"),
            NodeState::Assigned => write!(f, "assigned"),
            NodeState::Launching => write!(f, "launching"),
            NodeState::Running => write!(f, "running"),
            NodeState::Dead => write!(f, "dead"),
            NodeState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Why a node refuses a candidate item at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CauseOfBlockage {
    /// The node is dedicated to another queue item.
    DedicatedToAnother,
    /// No capacity for a new dedicated agent right now.
    WaitingForResources,
}

impl std::fmt::Display for CauseOfBlockage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CauseOfBlockage::DedicatedToAnother => {
                write!(f, "Node is dedicated to another task")
            }
            CauseOfBlockage::WaitingForResources => {
                write!(f, "Waiting for available resources")
            }
        }
    }
}

/// Handle on a node's command channel.
///
/// Execution engines that bypass the normal record-initialized notification
/// ask the node for this instead; handing it out doubles as the second
/// launch-trigger signal.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    node_name: String,
    log: TaskLog,
}

impl CommandChannel {
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn log(&self) -> &TaskLog {
        &self.log
    }
}

/// A worker created for, and exclusively bound to, exactly one work item.
///
/// Preparing one must be cheap, so provisioners can build them concurrently
/// to match queue load. The node registers as available immediately; the
/// real, possibly slow bootstrap is deferred until the bound item's
/// execution record exists, so launch logs and launch failures land in the
/// item's own output and the node's life exactly brackets the item's.
pub struct EphemeralNode {
    name: String,
    queue_item_id: Uuid,
    task_description: Mutex<String>,
    description: String,
    charset: String,
    launcher: Box<dyn Launcher>,
    state: Mutex<NodeState>,
    // Launch guard: set at most once, under this lock. The bootstrap itself
    // runs outside the lock so a stuck launch never blocks other nodes.
    bound: Mutex<Option<ExecutionRef>>,
    dead: AtomicBool,
    surface: Mutex<Option<Arc<ExecutionSurface>>>,
}

impl EphemeralNode {
    /// Prepare (not launch) a node bound to `item`.
    pub fn new(item: &WorkItem, settings: &NodeSettings, launcher: Box<dyn Launcher>) -> Self {
        Self::with_name(
            format!("oneshot-{:016x}", rand::random::<u64>()),
            item,
            settings,
            launcher,
        )
    }

    pub fn with_name(
        name: impl Into<String>,
        item: &WorkItem,
        settings: &NodeSettings,
        launcher: Box<dyn Launcher>,
    ) -> Self {
        Self {
            name: name.into(),
            queue_item_id: item.id,
            task_description: Mutex::new(item.task_name.clone()),
            description: settings.description.clone(),
            charset: settings.charset.clone(),
            launcher,
            state: Mutex::new(NodeState::Created),
            bound: Mutex::new(None),
            dead: AtomicBool::new(false),
            surface: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue_item_id(&self) -> Uuid {
        self.queue_item_id
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    pub fn display_name(&self) -> String {
        let task = self.task_description.lock().unwrap_or_else(|e| e.into_inner());
        format!("Executor for {}", task)
    }

    pub fn description(&self) -> String {
        if self.has_execution() {
            let task = self.task_description.lock().unwrap_or_else(|e| e.into_inner());
            format!("executor for {}", task)
        } else {
            self.description.clone()
        }
    }

    /// The session facade the scheduler sees. Once the node is dead or torn
    /// down this is a permanently-offline stand-in.
    pub fn surface(&self) -> Arc<ExecutionSurface> {
        if self.is_dead() {
            return ExecutionSurface::offline_stand_in(&self.name);
        }
        self.surface
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(|| ExecutionSurface::offline_stand_in(&self.name))
    }

    /// Called by the registry when the node is added. From here the node is
    /// scheduler-visible as an available worker, real connectivity or not.
    pub(crate) fn attach_surface(&self) {
        let mut surface = self.surface.lock().unwrap_or_else(|e| e.into_inner());
        if surface.is_none() {
            *surface = Some(ExecutionSurface::new(&self.name));
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == NodeState::Created {
            *state = NodeState::Assigned;
        }
    }

    pub(crate) fn release_surface(&self) {
        *self.surface.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Exclusivity rule: admit only the exactly-bound item, or (after a
    /// restart) an item whose affinity exactly names this node. Never a
    /// fuzzy label-compatibility match; this overrides whatever best-fit
    /// matching the host scheduler would otherwise do.
    pub fn can_take(&self, item: &WorkItem) -> Option<CauseOfBlockage> {
        if item.id == self.queue_item_id {
            return None;
        }
        if item.affinity.as_deref() == Some(self.name.as_str()) {
            return None;
        }
        Some(CauseOfBlockage::DedicatedToAnother)
    }

    pub fn has_execution(&self) -> bool {
        self.bound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn execution(&self) -> Option<ExecutionRef> {
        self.bound.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Bind the item's execution record to this node and run the deferred
    /// bootstrap. First launch-trigger signal: fired when the host reports
    /// the record initialized. Safe to call again — only the first of the
    /// racing signals wins; the rest are no-ops.
    pub async fn bind_execution(&self, record: ExecutionRef) {
        if !self.claim_launch(&record) {
            return;
        }
        self.do_actual_launch(record).await;
    }

    /// Request the node's command channel. Second launch-trigger signal,
    /// covering execution engines that skip the record-initialized
    /// notification; falls through to the same idempotent guard.
    pub async fn command_channel(&self, record: ExecutionRef) -> CommandChannel {
        let log = record.log().clone();
        self.bind_execution(record).await;
        CommandChannel {
            node_name: self.name.clone(),
            log,
        }
    }

    /// Idempotent check-and-set for ASSIGNED → LAUNCHING. Returns true for
    /// the one caller that wins the race and must run the bootstrap.
    fn claim_launch(&self, record: &ExecutionRef) -> bool {
        let mut bound = self.bound.lock().unwrap_or_else(|e| e.into_inner());
        if bound.is_some() {
            tracing::debug!(node = %self.name, "Execution already bound");
            return false;
        }
        *bound = Some(record.clone());
        *self.task_description.lock().unwrap_or_else(|e| e.into_inner()) =
            record.task_name.clone();
        self.set_state(NodeState::Launching);
        true
    }

    /// The real bootstrap, run outside the launch guard. Failure is reported
    /// into the bound record (outcome forced to "not built") rather than a
    /// separate error channel, and the node is flagged dead — never retried,
    /// never reused.
    async fn do_actual_launch(&self, record: ExecutionRef) {
        let log = record.log().clone();
        log.write_line(&format!(
            "Launching a dedicated agent for {}",
            record.task_name
        ));

        let surface = self.surface();
        surface.set_log(log.clone());

        let result = self.launcher.launch(&surface, &log).await;
        let connected = result.is_ok() && !surface.is_actually_offline();

        if connected {
            self.set_state(NodeState::Running);
            tracing::info!(node = %self.name, item = %record.item_id, "Agent launched");
        } else {
            log.write_line("Failed to provision agent");
            if let Err(e) = result {
                log.write_line(&e.to_string());
            }
            record.set_outcome(Outcome::NotBuilt);
            self.dead.store(true, Ordering::SeqCst);
            self.set_state(NodeState::Dead);
            tracing::error!(node = %self.name, item = %record.item_id, "Agent launch failed");
        }
    }

    pub(crate) async fn run_termination_hook(&self) {
        let log = self.execution().map(|r| r.log().clone());
        if let Err(e) = self.launcher.terminate(log.as_ref()).await {
            tracing::warn!(node = %self.name, error = %e, "Termination hook failed");
        }
    }

    pub(crate) fn mark_terminated(&self) {
        self.set_state(NodeState::Terminated);
    }

    /// Pre-launch cancellation: best-effort jump to `Terminated`.
    pub(crate) fn mark_cancelled(&self) {
        self.release_surface();
        self.set_state(NodeState::Terminated);
    }

    fn set_state(&self, next: NodeState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        tracing::debug!(node = %self.name, from = %*state, to = %next, "Node transition");
        *state = next;
    }
}

impl std::fmt::Debug for EphemeralNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralNode")
            .field("name", &self.name)
            .field("queue_item_id", &self.queue_item_id)
            .field("state", &self.state())
            .field("dead", &self.is_dead())
            .finish()
    }
}
