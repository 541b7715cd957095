use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{ListenerError, OffsetManagerError};
use crate::metrics;
use crate::model::{Checkpoint, Offset, Ssp, Startpoint, TaskName};
use crate::registry::PartitionRegistry;
use crate::traits::{CheckpointListener, CheckpointManager, StartpointManager, SystemAdmin};
use crate::tracker::RuntimeTracker;

fn group_by_system(offsets: HashMap<Ssp, Offset>) -> HashMap<String, HashMap<Ssp, Offset>> {
    let mut grouped: HashMap<String, HashMap<Ssp, Offset>> = HashMap::new();
    for (ssp, offset) in offsets {
        grouped
            .entry(ssp.system().to_string())
            .or_default()
            .insert(ssp, offset);
    }
    grouped
}

/// Writes the checkpoint to the store (if any), consults
/// `CheckpointListener::on_checkpoint` for registered SSPs, then prunes
/// startpoints absorbed by this commit. A `None` checkpoint is a no-op.
#[allow(clippy::too_many_arguments)]
pub async fn write_checkpoint(
    task: &TaskName,
    checkpoint: Option<&Checkpoint>,
    checkpoint_manager: Option<&Arc<dyn CheckpointManager>>,
    listeners: &HashMap<String, Arc<dyn CheckpointListener>>,
    startpoint_manager: Option<&Arc<dyn StartpointManager>>,
    startpoints: &DashMap<TaskName, HashMap<Ssp, Startpoint>>,
    registry: &PartitionRegistry,
) -> Result<(), OffsetManagerError> {
    let Some(checkpoint) = checkpoint else {
        return Ok(());
    };

    let registered = registry.ssps_for_task(task);

    // Step 1: durable write, including non-registered SSPs (e.g. changelog
    // partitions), then update the per-SSP gauge for every SSP that has one
    // (i.e. is registered); unknown SSPs have no gauge and are skipped.
    if let Some(manager) = checkpoint_manager {
        manager
            .write_checkpoint(task, checkpoint)
            .await
            .map_err(OffsetManagerError::Store)?;
        for (ssp, offset) in checkpoint.filtered(&registered) {
            metrics::record_offset(&ssp, offset.as_str());
        }
    }

    // Step 2: listener consultation, restricted to registered SSPs, grouped
    // by system. Runs after the store write per the documented ordering:
    // listener failures are not atomic with the commit.
    let managed = checkpoint.filtered(&registered);
    for (system, offsets) in group_by_system(managed) {
        if let Some(listener) = listeners.get(&system) {
            listener
                .on_checkpoint(offsets)
                .await
                .map_err(|source| {
                    OffsetManagerError::Listener(ListenerError { system: system.clone(), source })
                })?;
        }
    }

    // Step 3: startpoint cleanup. Only runs if this task actually had loaded
    // startpoints; stops the manager once nothing is left pending anywhere.
    if let Some(manager) = startpoint_manager {
        if startpoints.remove(task).is_some() {
            manager
                .remove_fan_out_for_task(task)
                .await
                .map_err(OffsetManagerError::Store)?;
            metrics::startpoint_fan_out_removed(&task.0);
            info!(task = %task, "removed absorbed startpoint fan-out");

            if startpoints.is_empty() {
                manager.stop().await.map_err(OffsetManagerError::Store)?;
                info!("all startpoints absorbed, stopping startpoint manager");
            }
        }
    }

    Ok(())
}

/// The pre-commit hook a container calls to ask listeners to
/// rewrite the offsets about to be checkpointed.
pub async fn get_modified_offsets(
    task: &TaskName,
    tracker: &RuntimeTracker,
    registry: &PartitionRegistry,
    starting_offsets: &HashMap<TaskName, HashMap<Ssp, Offset>>,
    listeners: &HashMap<String, Arc<dyn CheckpointListener>>,
    admins: &HashMap<String, Arc<dyn SystemAdmin>>,
) -> Result<HashMap<Ssp, Offset>, OffsetManagerError> {
    let base = tracker.snapshot(registry, task);
    let starting = starting_offsets.get(task).cloned().unwrap_or_default();

    let mut modified = base.clone();

    for (system, offsets) in group_by_system(base) {
        let Some(listener) = listeners.get(&system) else {
            continue;
        };
        let Some(admin) = admins.get(&system) else {
            continue;
        };

        let need_modified = offsets.iter().any(|(ssp, last_processed)| {
            let Some(start) = starting.get(ssp) else {
                return false;
            };
            matches!(
                admin.offset_comparator(last_processed, start),
                Some(Ordering::Greater)
            )
        });

        if !need_modified {
            debug!(system = %system, "no partition has processed past its starting offset yet, skipping beforeCheckpoint");
            continue;
        }

        let rewritten = listener
            .before_checkpoint(offsets)
            .await
            .map_err(|source| {
                OffsetManagerError::Listener(ListenerError { system: system.clone(), source })
            })?;
        for (ssp, offset) in rewritten {
            modified.insert(ssp, offset);
        }
    }

    Ok(modified)
}
