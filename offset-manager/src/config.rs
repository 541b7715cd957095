use std::collections::HashMap;
use std::str::FromStr;

use envconfig::Envconfig;

use crate::error::OffsetManagerError;
use crate::model::{OffsetType, SystemStream};

/// Process-wide static knobs, loaded the way the rest of the reference runtime
/// loads its `envconfig`-derived configuration structs.
#[derive(Envconfig, Clone, Debug)]
pub struct OffsetManagerConfig {
    /// Default offset policy used when neither a per-stream nor a per-system
    /// override is configured for a stream.
    #[envconfig(default = "upcoming")]
    pub default_offset: String,

    /// Whether a prior deploy of this job may have used elasticity, requiring
    /// the `CheckpointLoader` to remap historical checkpoints onto the current
    /// SSP set instead of reading them as-is.
    #[envconfig(default = "false")]
    pub elasticity_enabled: bool,
}

impl OffsetManagerConfig {
    pub fn default_offset_type(&self) -> Result<OffsetType, OffsetManagerError> {
        OffsetType::from_str(&self.default_offset).map_err(OffsetManagerError::Config)
    }
}

/// The dynamic, key-addressed configuration surface named in the external
/// interfaces section: `streams.<stream>.samza.offset.default`,
/// `systems.<system>.samza.offset.default`, and
/// `streams.<stream>.samza.reset.offset`. Unlike `OffsetManagerConfig` this
/// cannot be a fixed `envconfig` struct because the key set is open-ended
/// (one entry per configured stream/system), so it is modeled as a thin map
/// wrapper with typed accessors instead.
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    entries: HashMap<String, String>,
}

impl StreamConfig {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Per-stream config → per-system config → `None` (caller falls back to
    /// the process-wide default).
    pub fn default_offset_for(
        &self,
        system_stream: &SystemStream,
    ) -> Result<Option<OffsetType>, OffsetManagerError> {
        let per_stream_key = format!(
            "streams.{}.samza.offset.default",
            system_stream.stream
        );
        if let Some(value) = self.get(&per_stream_key) {
            return OffsetType::from_str(value)
                .map(Some)
                .map_err(OffsetManagerError::Config);
        }

        let per_system_key = format!("systems.{}.samza.offset.default", system_stream.system);
        if let Some(value) = self.get(&per_system_key) {
            return OffsetType::from_str(value)
                .map(Some)
                .map_err(OffsetManagerError::Config);
        }

        Ok(None)
    }

    /// `streams.<stream>.samza.reset.offset`, defaulting to `false`.
    pub fn reset_offset_for(&self, system_stream: &SystemStream) -> bool {
        let key = format!("streams.{}.samza.reset.offset", system_stream.stream);
        self.get(&key)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}
