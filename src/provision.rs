use async_trait::async_trait;

use crate::error::Result;
use crate::item::WorkItem;
use crate::log::TaskLog;
use crate::node::EphemeralNode;
use crate::surface::ExecutionSurface;

/// Bootstraps the real worker behind an [`EphemeralNode`].
///
/// The node defers calling `launch` until its work item's execution record
/// exists, so every line a launcher writes to `log` lands in the item's own
/// output. A launcher that brings the worker up successfully must call
/// [`ExecutionSurface::mark_connected`]; the node treats a launch that
/// returns `Ok` without a connected surface as a failure.
///
/// No cancellation or timeout is imposed on `launch`: once started it runs
/// to completion or failure unsupervised.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, surface: &ExecutionSurface, log: &TaskLog) -> Result<()>;

    /// Termination hook, invoked once during node teardown. Implementations
    /// override this to release backend resources; `log` is the bound
    /// record's log when one exists, so clean termination can be reported
    /// next to the item's output.
    async fn terminate(&self, log: Option<&TaskLog>) -> Result<()> {
        let _ = log;
        Ok(())
    }
}

/// Pluggable policy deciding which queue items get a dedicated agent and how
/// to build one.
///
/// Implementations are consulted by the [`QueueGatekeeper`] in registration
/// order; the first one claiming an item wins.
///
/// [`QueueGatekeeper`]: crate::gatekeeper::QueueGatekeeper
pub trait Provisioner: Send + Sync {
    /// Pure predicate over item metadata: does this item rely on a one-shot
    /// agent handled by this provisioner?
    fn uses_one_shot_executor(&self, item: &WorkItem) -> bool;

    /// Whether the underlying infrastructure can afford an agent for this
    /// item right now. Independent of binding; re-evaluated every scheduling
    /// pass. Implementations enforcing a static instance cap can compare
    /// against [`Registry::count_active_nodes`].
    ///
    /// [`Registry::count_active_nodes`]: crate::registry::Registry::count_active_nodes
    fn can_run(&self, item: &WorkItem) -> bool;

    /// Construct a node bound to `item`. The node is only *prepared* here,
    /// never launched, so this must be cheap: no blocking bootstrap I/O.
    /// A failure is fatal for the item; the caller cancels it and does not
    /// retry.
    fn prepare_executor_for(&self, item: &WorkItem) -> Result<EphemeralNode>;
}
