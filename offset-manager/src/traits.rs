use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Checkpoint, Offset, Ssp, Startpoint, TaskName};

/// Durable store of per-task checkpoints. Supplied by the container; the core
/// only ever sees the interface.
#[async_trait]
pub trait CheckpointManager: Send + Sync {
    async fn start(&self) -> Result<(), StoreError>;
    async fn stop(&self) -> Result<(), StoreError>;
    async fn register(&self, task: &TaskName) -> Result<(), StoreError>;
    async fn read_last_checkpoint(&self, task: &TaskName) -> Result<Option<Checkpoint>, StoreError>;
    async fn read_all_checkpoints(&self) -> Result<HashMap<TaskName, Checkpoint>, StoreError>;
    async fn write_checkpoint(&self, task: &TaskName, checkpoint: &Checkpoint) -> Result<(), StoreError>;
}

/// Durable store of pending startpoint fan-out entries, keyed by `(task, ssp)`.
/// Shared with the outer job-bootstrap: fan-out is produced outside this core
/// and absorbed here, so the core never owns the manager's lifecycle except
/// that it may opportunistically stop it once no startpoints remain pending.
#[async_trait]
pub trait StartpointManager: Send + Sync {
    async fn start(&self) -> Result<(), StoreError>;
    async fn stop(&self) -> Result<(), StoreError>;
    async fn get_fan_out_for_task(
        &self,
        task: &TaskName,
    ) -> Result<Option<HashMap<Ssp, Startpoint>>, StoreError>;
    async fn remove_fan_out_for_task(&self, task: &TaskName) -> Result<(), StoreError>;
}

/// Per-system broker adapter. The core treats offsets as opaque strings and
/// delegates all arithmetic and ordering to the admin that owns the system.
#[async_trait]
pub trait SystemAdmin: Send + Sync {
    /// Given last-processed offsets, return the next offset to read for each.
    /// May return fewer or more entries than were requested; only returned
    /// entries are adopted by Stage A.
    async fn get_offsets_after(
        &self,
        offsets: &HashMap<Ssp, Offset>,
    ) -> anyhow::Result<HashMap<Ssp, Offset>>;

    /// Resolve an operator-issued startpoint to a concrete offset. `Ok(None)`
    /// (a "blank" result) is treated the same as a resolution failure: the SSP
    /// falls through to Stage C.
    async fn resolve_startpoint_to_offset(
        &self,
        ssp: &Ssp,
        startpoint: &Startpoint,
    ) -> anyhow::Result<Option<Offset>>;

    /// Compare two offsets from this system. `None` means "incomparable", which
    /// callers must treat conservatively (never "less than").
    fn offset_comparator(&self, a: &Offset, b: &Offset) -> Option<Ordering>;
}

/// Per-system, optional hook invoked around commits. Listeners receive only
/// SSPs the core manages (never changelog/extra entries in a checkpoint) and
/// must be idempotent: they cannot veto a commit that already reached the
/// store, and `onCheckpoint` runs after the store write has already landed.
#[async_trait]
pub trait CheckpointListener: Send + Sync {
    /// Called before a commit if this system has not yet processed past its
    /// starting offset on at least one SSP. The returned map is merged into
    /// (and wins over) the caller's candidate offsets.
    async fn before_checkpoint(
        &self,
        offsets: HashMap<Ssp, Offset>,
    ) -> anyhow::Result<HashMap<Ssp, Offset>>;

    /// Called after the checkpoint has been durably written.
    async fn on_checkpoint(&self, offsets: HashMap<Ssp, Offset>) -> anyhow::Result<()>;
}

/// Injectable strategy for reshaping a prior deploy's checkpoint history onto a
/// task's current SSP set when that prior deploy used elasticity. The default
/// strategy is the identity: intersect and pass through unchanged.
#[async_trait]
pub trait ElasticityStrategy: Send + Sync {
    async fn remap(
        &self,
        task: &TaskName,
        ssps: &HashSet<Ssp>,
        historical_checkpoints: &HashMap<TaskName, Checkpoint>,
        admins: &HashMap<String, Arc<dyn SystemAdmin>>,
    ) -> HashMap<Ssp, Offset>;
}

/// `ssps ∩ historical[task]`, passed through unchanged. The safe default when
/// no prior deploy used elasticity.
pub struct IdentityElasticity;

#[async_trait]
impl ElasticityStrategy for IdentityElasticity {
    async fn remap(
        &self,
        task: &TaskName,
        ssps: &HashSet<Ssp>,
        historical_checkpoints: &HashMap<TaskName, Checkpoint>,
        _admins: &HashMap<String, Arc<dyn SystemAdmin>>,
    ) -> HashMap<Ssp, Offset> {
        let Some(checkpoint) = historical_checkpoints.get(task) else {
            return HashMap::new();
        };
        checkpoint
            .0
            .iter()
            .filter(|(ssp, _)| ssps.contains(*ssp))
            .map(|(ssp, offset)| (ssp.clone(), offset.clone()))
            .collect()
    }
}
