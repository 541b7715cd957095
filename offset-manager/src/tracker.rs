use std::collections::HashMap;

use dashmap::DashMap;

use crate::error::OffsetManagerError;
use crate::model::{Offset, Ssp, TaskName};
use crate::registry::PartitionRegistry;

/// Thread-safe store of last-processed offsets. A two-level
/// concurrent map: outer `task -> inner`, inner `ssp -> offset`. Concurrent
/// `update` calls on distinct tasks never contend; within a task, `DashMap`'s
/// internal sharding keeps concurrent updates safe without a crate-wide lock.
#[derive(Default)]
pub struct RuntimeTracker {
    by_task: DashMap<TaskName, DashMap<Ssp, Offset>>,
}

impl RuntimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the tracker with the offsets loaded at start-up (checkpoint load,
    /// minus reset-stripped streams). Called once by the controller thread
    /// before the tracker is exposed to reader threads.
    pub fn seed(&self, task: TaskName, offsets: HashMap<Ssp, Offset>) {
        let inner = DashMap::new();
        for (ssp, offset) in offsets {
            inner.insert(ssp, offset);
        }
        self.by_task.insert(task, inner);
    }

    /// Resolves `ssp` against `registry`, then writes `offset` unless it is
    /// the `END_OF_STREAM` sentinel. A `None` offset is a no-op, mirroring
    /// "update with null... is a no-op".
    pub fn update(
        &self,
        registry: &PartitionRegistry,
        task: &TaskName,
        ssp: &Ssp,
        offset: Option<Offset>,
    ) -> Result<(), OffsetManagerError> {
        let Some(offset) = offset else {
            return Ok(());
        };
        if offset.is_end_of_stream() {
            return Ok(());
        }

        let resolved = registry.resolve(task, ssp)?;
        let inner = self.by_task.entry(task.clone()).or_default();
        inner.insert(resolved, offset);
        Ok(())
    }

    /// Lock-free read of the last-processed offset for `(task, ssp)`.
    pub fn get_last_processed_offset(&self, task: &TaskName, ssp: &Ssp) -> Option<Offset> {
        self.by_task
            .get(task)
            .and_then(|inner| inner.get(ssp).map(|entry| entry.value().clone()))
    }

    /// A point-in-time copy of `task`'s last-processed offsets, filtered to
    /// SSPs currently registered to that task.
    pub fn snapshot(&self, registry: &PartitionRegistry, task: &TaskName) -> HashMap<Ssp, Offset> {
        let registered = registry.ssps_for_task(task);
        let Some(inner) = self.by_task.get(task) else {
            return HashMap::new();
        };
        inner
            .iter()
            .filter(|entry| registered.contains(entry.key()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
