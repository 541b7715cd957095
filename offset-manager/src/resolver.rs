use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::OffsetManagerError;
use crate::metrics;
use crate::model::{Offset, OffsetSetting, Ssp, Startpoint, SystemStream, TaskName};
use crate::registry::PartitionRegistry;
use crate::traits::SystemAdmin;

/// Computes starting offsets via a three-stage, strict-precedence pipeline:
/// checkpoint → "offset after" (Stage A) → startpoint overwrite
/// (Stage B) → default fill (Stage C).
pub struct OffsetResolver<'a> {
    registry: &'a PartitionRegistry,
    admins: &'a HashMap<String, Arc<dyn SystemAdmin>>,
    offset_settings: &'a HashMap<SystemStream, OffsetSetting>,
}

impl<'a> OffsetResolver<'a> {
    pub fn new(
        registry: &'a PartitionRegistry,
        admins: &'a HashMap<String, Arc<dyn SystemAdmin>>,
        offset_settings: &'a HashMap<SystemStream, OffsetSetting>,
    ) -> Self {
        Self {
            registry,
            admins,
            offset_settings,
        }
    }

    pub async fn resolve(
        &self,
        last_processed: &HashMap<TaskName, HashMap<Ssp, Offset>>,
        startpoints: &HashMap<TaskName, HashMap<Ssp, Startpoint>>,
    ) -> Result<HashMap<TaskName, HashMap<Ssp, Offset>>, OffsetManagerError> {
        let mut starting: HashMap<Ssp, Offset> = HashMap::new();

        // Stage A: "offset after last processed", grouped by system. Every
        // SSP belongs to exactly one task (registry invariant), so global
        // system-grouping across tasks is safe.
        let mut by_system: HashMap<String, HashMap<Ssp, Offset>> = HashMap::new();
        for offsets in last_processed.values() {
            for (ssp, offset) in offsets {
                by_system
                    .entry(ssp.system().to_string())
                    .or_default()
                    .insert(ssp.clone(), offset.clone());
            }
        }

        for (system, group) in by_system {
            let Some(admin) = self.admins.get(&system) else {
                warn!(system = %system, "no SystemAdmin registered for system, skipping stage A for its partitions");
                continue;
            };
            let after = admin
                .get_offsets_after(&group)
                .await
                .map_err(|source| OffsetManagerError::Store(source.into()))?;
            for (ssp, offset) in after {
                starting.insert(ssp, offset);
            }
        }

        // Stage B: startpoint overwrite. Strictly higher precedence than
        // whatever Stage A produced.
        for offsets in startpoints.values() {
            for (ssp, startpoint) in offsets {
                let Some(admin) = self.admins.get(ssp.system()) else {
                    warn!(ssp = %ssp, "no SystemAdmin registered for system, skipping startpoint resolution");
                    metrics::startpoint_resolution_failed(ssp.system());
                    continue;
                };
                match admin.resolve_startpoint_to_offset(ssp, startpoint).await {
                    Ok(Some(offset)) if !offset.as_str().trim().is_empty() => {
                        starting.insert(ssp.clone(), offset);
                    }
                    Ok(_) => {
                        debug!(ssp = %ssp, "startpoint resolved to a blank offset, falling through to default fill");
                        metrics::startpoint_resolution_failed(ssp.system());
                    }
                    Err(error) => {
                        warn!(ssp = %ssp, error = %error, "startpoint resolution failed, falling through to default fill");
                        metrics::startpoint_resolution_failed(ssp.system());
                    }
                }
            }
        }

        // Stage C: default fill for anything still missing.
        for ssp in self.registry.all_ssps() {
            if starting.contains_key(&ssp) {
                continue;
            }
            let setting = self
                .offset_settings
                .get(&ssp.system_stream)
                .ok_or_else(|| OffsetManagerError::MetadataMissing(ssp.clone()))?;
            let Some(partition_metadata) = setting.metadata.per_partition.get(&ssp.partition)
            else {
                return Err(OffsetManagerError::MetadataMissing(ssp.clone()));
            };

            let offset = match partition_metadata.get_offset(setting.default_offset) {
                Some(offset) => offset,
                None => {
                    warn!(ssp = %ssp, default = %setting.default_offset, "requested default offset is unavailable (empty stream), falling back to upcoming");
                    partition_metadata
                        .get_offset(crate::model::OffsetType::Upcoming)
                        .ok_or_else(|| OffsetManagerError::MetadataMissing(ssp.clone()))?
                }
            };
            starting.insert(ssp, offset);
        }

        // Split back out per task.
        let mut result = HashMap::new();
        for task in self.registry.tasks() {
            let ssps = self.registry.ssps_for_task(&task);
            let mut per_task = HashMap::new();
            for ssp in ssps {
                if let Some(offset) = starting.get(&ssp) {
                    per_task.insert(ssp, offset.clone());
                }
            }
            result.insert(task, per_task);
        }

        Ok(result)
    }
}
