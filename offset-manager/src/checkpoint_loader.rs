use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::info;

use crate::config::StreamConfig;
use crate::error::OffsetManagerError;
use crate::model::{Checkpoint, Offset, OffsetSetting, Ssp, SystemStream, TaskName};
use crate::traits::{CheckpointManager, ElasticityStrategy, SystemAdmin};

/// Reads last committed offsets from the checkpoint store. If no
/// checkpoint store is configured, loading is skipped and every task starts
/// with empty last-processed offsets.
pub struct CheckpointLoader<'a> {
    checkpoint_manager: Option<&'a (dyn CheckpointManager)>,
    elasticity: &'a dyn ElasticityStrategy,
    elasticity_enabled: bool,
}

impl<'a> CheckpointLoader<'a> {
    pub fn new(
        checkpoint_manager: Option<&'a (dyn CheckpointManager)>,
        elasticity: &'a dyn ElasticityStrategy,
        elasticity_enabled: bool,
    ) -> Self {
        Self {
            checkpoint_manager,
            elasticity,
            elasticity_enabled,
        }
    }

    /// Loads last-processed offsets for every `(task, ssps)` pair, dropping
    /// entries whose stream has no `OffsetSetting` (the stream is no longer an
    /// input). Returns one map of last-processed offsets per task.
    pub async fn load(
        &self,
        tasks: &HashMap<TaskName, HashSet<Ssp>>,
        offset_settings: &HashMap<SystemStream, OffsetSetting>,
        admins: &HashMap<String, Arc<dyn SystemAdmin>>,
    ) -> Result<HashMap<TaskName, HashMap<Ssp, Offset>>, OffsetManagerError> {
        let Some(manager) = self.checkpoint_manager else {
            return Ok(HashMap::new());
        };

        for task in tasks.keys() {
            manager
                .register(task)
                .await
                .map_err(OffsetManagerError::Store)?;
        }

        // The full history is always read so the elasticity gate can be
        // derived from what it actually contains, rather than trusting a
        // static flag alone: a prior deploy that wrote key-bucketed SSPs is
        // evidence of elasticity regardless of the process config.
        let historical = manager
            .read_all_checkpoints()
            .await
            .map_err(OffsetManagerError::Store)?;
        let use_elasticity = self.elasticity_enabled || historical_checkpoints_use_elasticity(&historical);
        if use_elasticity && !self.elasticity_enabled {
            info!("checkpoint history shows prior elasticity usage, remapping despite elasticity_enabled=false");
        }

        let mut result = HashMap::new();
        for (task, ssps) in tasks {
            let raw = if use_elasticity {
                self.elasticity.remap(task, ssps, &historical, admins).await
            } else {
                historical
                    .get(task)
                    .map(|checkpoint| checkpoint.0.clone())
                    .unwrap_or_default()
            };

            let filtered = raw
                .into_iter()
                .filter(|(ssp, _)| {
                    let has_setting = offset_settings.contains_key(&ssp.system_stream);
                    if !has_setting {
                        info!(
                            task = %task,
                            ssp = %ssp,
                            "dropping checkpointed offset for stream with no offset setting, stream is no longer an input"
                        );
                    }
                    has_setting
                })
                .collect();

            result.insert(task.clone(), filtered);
        }

        Ok(result)
    }
}

/// `true` iff any SSP in the store's full checkpoint history carries a
/// `key_bucket`, the signal that a prior deploy had elasticity enabled.
fn historical_checkpoints_use_elasticity(historical: &HashMap<TaskName, Checkpoint>) -> bool {
    historical
        .values()
        .any(|checkpoint| checkpoint.0.keys().any(|ssp| ssp.key_bucket.is_some()))
}

/// Removes entries whose `SystemStream` has `resetOffset=true`.
/// Returns an error only when a reset was actually requested for a stream
/// with no configured `OffsetSetting`; a stream that is simply unconfigured
/// (and not being reset) is left alone here for `OffsetResolver`'s Stage C to
/// report as `MetadataMissing`.
pub fn strip_reset_offsets(
    last_processed: &mut HashMap<TaskName, HashMap<Ssp, Offset>>,
    offset_settings: &HashMap<SystemStream, OffsetSetting>,
    registered_streams: &HashSet<SystemStream>,
    stream_config: &StreamConfig,
) -> Result<(), OffsetManagerError> {
    for system_stream in registered_streams {
        let setting = offset_settings.get(system_stream);
        let reset_requested = match setting {
            Some(setting) => setting.reset_offset,
            None => stream_config.reset_offset_for(system_stream),
        };
        if !reset_requested {
            continue;
        }
        if setting.is_none() {
            return Err(OffsetManagerError::ConfigReset(system_stream.clone()));
        }
        for (task, offsets) in last_processed.iter_mut() {
            let before = offsets.len();
            offsets.retain(|ssp, _| ssp.system_stream != *system_stream);
            if offsets.len() != before {
                info!(
                    task = %task,
                    stream = %system_stream,
                    "reset requested for stream, discarding checkpointed offsets"
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PartitionMetadata, SystemStreamMetadata};

    fn offset_settings(reset: bool) -> HashMap<SystemStream, OffsetSetting> {
        let mut map = HashMap::new();
        map.insert(
            SystemStream::new("sysA", "topicX"),
            OffsetSetting {
                metadata: SystemStreamMetadata {
                    per_partition: HashMap::from([(0, PartitionMetadata::default())]),
                },
                default_offset: crate::model::OffsetType::Oldest,
                reset_offset: reset,
            },
        );
        map
    }

    #[test]
    fn strip_reset_offsets_removes_matching_stream() {
        let mut last_processed = HashMap::new();
        let mut offsets = HashMap::new();
        offsets.insert(Ssp::new("sysA", "topicX", 0), Offset::new("100"));
        last_processed.insert(TaskName::new("t0"), offsets);

        let settings = offset_settings(true);
        let registered = HashSet::from([SystemStream::new("sysA", "topicX")]);

        strip_reset_offsets(
            &mut last_processed,
            &settings,
            &registered,
            &StreamConfig::default(),
        )
        .unwrap();
        assert!(last_processed[&TaskName::new("t0")].is_empty());
    }

    #[test]
    fn strip_reset_offsets_leaves_non_reset_streams() {
        let mut last_processed = HashMap::new();
        let mut offsets = HashMap::new();
        offsets.insert(Ssp::new("sysA", "topicX", 0), Offset::new("100"));
        last_processed.insert(TaskName::new("t0"), offsets);

        let settings = offset_settings(false);
        let registered = HashSet::from([SystemStream::new("sysA", "topicX")]);

        strip_reset_offsets(
            &mut last_processed,
            &settings,
            &registered,
            &StreamConfig::default(),
        )
        .unwrap();
        assert_eq!(last_processed[&TaskName::new("t0")].len(), 1);
    }

    #[test]
    fn reset_on_unconfigured_stream_is_config_error() {
        let mut last_processed = HashMap::new();
        let settings = HashMap::new();
        let registered = HashSet::from([SystemStream::new("sysA", "topicX")]);
        let mut entries = HashMap::new();
        entries.insert(
            "streams.topicX.samza.reset.offset".to_string(),
            "true".to_string(),
        );
        let stream_config = StreamConfig::new(entries);

        let err = strip_reset_offsets(&mut last_processed, &settings, &registered, &stream_config)
            .unwrap_err();
        assert!(matches!(err, OffsetManagerError::ConfigReset(_)));
    }

    #[test]
    fn unconfigured_stream_without_reset_request_is_not_an_error() {
        let mut last_processed = HashMap::new();
        let settings = HashMap::new();
        let registered = HashSet::from([SystemStream::new("sysA", "topicX")]);

        strip_reset_offsets(
            &mut last_processed,
            &settings,
            &registered,
            &StreamConfig::default(),
        )
        .unwrap();
    }

    #[test]
    fn historical_checkpoints_use_elasticity_detects_key_bucket() {
        let without_bucket = Checkpoint::new(HashMap::from([(
            Ssp::new("sysA", "topicX", 0),
            Offset::new("1"),
        )]));
        let with_bucket = Checkpoint::new(HashMap::from([(
            Ssp::new("sysA", "topicX", 0).with_key_bucket(3),
            Offset::new("1"),
        )]));

        assert!(!historical_checkpoints_use_elasticity(&HashMap::from([(
            TaskName::new("t0"),
            without_bucket,
        )])));
        assert!(historical_checkpoints_use_elasticity(&HashMap::from([(
            TaskName::new("t0"),
            with_bucket,
        )])));
    }
}
