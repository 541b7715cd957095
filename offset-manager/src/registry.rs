use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::RwLock;

use crate::error::OffsetManagerError;
use crate::metrics;
use crate::model::{Ssp, TaskName};

/// Records which `(task, partition)` pairs this container owns. `register` is
/// only legal before the registry is frozen (i.e. before `start()` completes);
/// every subsequent read is lock-free-by-convention since the map no longer
/// changes.
#[derive(Default)]
pub struct PartitionRegistry {
    by_task: RwLock<HashMap<TaskName, HashSet<Ssp>>>,
    frozen: AtomicBool,
}

impl PartitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union-inserts `ssps` into `taskName`'s registered set. Creates a
    /// per-SSP metrics gauge, initialized empty, for every newly seen SSP.
    pub fn register(
        &self,
        task: TaskName,
        ssps: impl IntoIterator<Item = Ssp>,
    ) -> Result<(), OffsetManagerError> {
        if self.frozen.load(AtomicOrdering::Acquire) {
            return Err(OffsetManagerError::Lifecycle {
                operation: "register",
                state: crate::model::LifecycleState::Started,
            });
        }

        let mut by_task = self.by_task.write().expect("registry lock poisoned");
        let entry = by_task.entry(task).or_default();
        for ssp in ssps {
            if entry.insert(ssp.clone()) {
                metrics::init_offset_gauge(&ssp);
            }
        }
        Ok(())
    }

    /// Freezes the registry. Called once, at the end of `start()`.
    pub fn freeze(&self) {
        self.frozen.store(true, AtomicOrdering::Release);
    }

    pub fn tasks(&self) -> Vec<TaskName> {
        self.by_task
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn ssps_for_task(&self, task: &TaskName) -> HashSet<Ssp> {
        self.by_task
            .read()
            .expect("registry lock poisoned")
            .get(task)
            .cloned()
            .unwrap_or_default()
    }

    pub fn all_ssps(&self) -> HashSet<Ssp> {
        self.by_task
            .read()
            .expect("registry lock poisoned")
            .values()
            .flat_map(|ssps| ssps.iter().cloned())
            .collect()
    }

    /// Resolves `candidate` (system/stream/partition, possibly missing a key
    /// bucket under elasticity) against the SSPs registered to `task`. Exactly
    /// one match must exist; zero or more than one is `UnknownPartition`.
    pub fn resolve(&self, task: &TaskName, candidate: &Ssp) -> Result<Ssp, OffsetManagerError> {
        let ssps = self.ssps_for_task(task);
        let mut matches = ssps.iter().filter(|ssp| {
            ssp.system_stream == candidate.system_stream
                && ssp.partition == candidate.partition
                && (candidate.key_bucket.is_none() || candidate.key_bucket == ssp.key_bucket)
        });

        let first = matches.next().cloned();
        match (first, matches.next()) {
            (Some(ssp), None) => Ok(ssp),
            _ => Err(OffsetManagerError::UnknownPartition {
                task: task.clone(),
                ssp: candidate.clone(),
            }),
        }
    }
}
