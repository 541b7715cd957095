use std::collections::HashMap;

use tracing::info;

use crate::config::{OffsetManagerConfig, StreamConfig};
use crate::error::OffsetManagerError;
use crate::model::{OffsetSetting, OffsetType, SystemStream, SystemStreamMetadata};

/// Derives an `OffsetSetting` per input stream from broker-fetched metadata and
/// configuration. Per-stream config takes precedence over per-system
/// config, which takes precedence over the process-wide `upcoming` default.
pub struct SettingsBuilder<'a> {
    process_config: &'a OffsetManagerConfig,
    stream_config: &'a StreamConfig,
}

impl<'a> SettingsBuilder<'a> {
    pub fn new(process_config: &'a OffsetManagerConfig, stream_config: &'a StreamConfig) -> Self {
        Self {
            process_config,
            stream_config,
        }
    }

    pub fn build(
        &self,
        metadata: HashMap<SystemStream, SystemStreamMetadata>,
    ) -> Result<HashMap<SystemStream, OffsetSetting>, OffsetManagerError> {
        let process_default = self.process_config.default_offset_type()?;
        metadata
            .into_iter()
            .map(|(system_stream, stream_metadata)| {
                let setting = self.build_one(&system_stream, stream_metadata, process_default)?;
                Ok((system_stream, setting))
            })
            .collect()
    }

    fn build_one(
        &self,
        system_stream: &SystemStream,
        metadata: SystemStreamMetadata,
        process_default: OffsetType,
    ) -> Result<OffsetSetting, OffsetManagerError> {
        let default_offset = match self.stream_config.default_offset_for(system_stream)? {
            Some(offset_type) => offset_type,
            None => {
                info!(
                    stream = %system_stream,
                    default = %process_default,
                    "no per-stream or per-system offset default configured, using process default"
                );
                process_default
            }
        };

        let reset_offset = self.stream_config.reset_offset_for(system_stream);

        Ok(OffsetSetting {
            metadata,
            default_offset,
            reset_offset,
        })
    }
}
