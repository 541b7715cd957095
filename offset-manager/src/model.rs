use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sentinel last-processed offset meaning "the partition has been fully drained".
/// `RuntimeTracker::update` silently ignores writes of this value.
pub const END_OF_STREAM: &str = "END_OF_STREAM";

/// Identity of a partitioned input source: `(systemName, streamName)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemStream {
    pub system: String,
    pub stream: String,
}

impl SystemStream {
    pub fn new(system: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            stream: stream.into(),
        }
    }
}

impl fmt::Display for SystemStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.system, self.stream)
    }
}

/// One addressable partition of a `SystemStream`. Under the elasticity extension,
/// `key_bucket` is part of identity: two SSPs with the same system/stream/partition
/// but different buckets are distinct partitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ssp {
    pub system_stream: SystemStream,
    pub partition: u32,
    pub key_bucket: Option<u32>,
}

impl Ssp {
    pub fn new(system: impl Into<String>, stream: impl Into<String>, partition: u32) -> Self {
        Self {
            system_stream: SystemStream::new(system, stream),
            partition,
            key_bucket: None,
        }
    }

    pub fn with_key_bucket(mut self, key_bucket: u32) -> Self {
        self.key_bucket = Some(key_bucket);
        self
    }

    pub fn system(&self) -> &str {
        &self.system_stream.system
    }

    pub fn stream(&self) -> &str {
        &self.system_stream.stream
    }
}

impl fmt::Display for Ssp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key_bucket {
            Some(bucket) => write!(f, "{}[{}]#{}", self.system_stream, self.partition, bucket),
            None => write!(f, "{}[{}]", self.system_stream, self.partition),
        }
    }
}

/// Opaque broker-defined cursor. The core never parses it; ordering is delegated
/// to the owning `SystemAdmin`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Offset(pub String);

impl Offset {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.0 == END_OF_STREAM
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Offset {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Offset {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Default-offset policy. `Upcoming` is the safe default when configuration is
/// silent on the matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetType {
    Oldest,
    Newest,
    Upcoming,
}

impl Default for OffsetType {
    fn default() -> Self {
        OffsetType::Upcoming
    }
}

impl FromStr for OffsetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oldest" => Ok(OffsetType::Oldest),
            "newest" => Ok(OffsetType::Newest),
            "upcoming" => Ok(OffsetType::Upcoming),
            other => Err(format!(
                "unrecognized offset default '{other}', expected oldest, newest, or upcoming"
            )),
        }
    }
}

impl fmt::Display for OffsetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OffsetType::Oldest => "oldest",
            OffsetType::Newest => "newest",
            OffsetType::Upcoming => "upcoming",
        };
        write!(f, "{s}")
    }
}

/// Broker-reported bounds for a single partition: the oldest retained offset, the
/// newest written offset, and the "upcoming" offset a fresh consumer would start at.
/// Any of these may be unknown (e.g. an empty topic reports no newest offset).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionMetadata {
    pub oldest: Option<Offset>,
    pub newest: Option<Offset>,
    pub upcoming: Option<Offset>,
}

impl PartitionMetadata {
    pub fn get_offset(&self, offset_type: OffsetType) -> Option<Offset> {
        match offset_type {
            OffsetType::Oldest => self.oldest.clone(),
            OffsetType::Newest => self.newest.clone(),
            OffsetType::Upcoming => self.upcoming.clone(),
        }
    }
}

/// Broker-reported metadata for every partition of a `SystemStream`, as fetched
/// at start-up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemStreamMetadata {
    pub per_partition: HashMap<u32, PartitionMetadata>,
}

/// Per-stream offset policy, bound to the broker metadata it was derived against.
#[derive(Debug, Clone)]
pub struct OffsetSetting {
    pub metadata: SystemStreamMetadata,
    pub default_offset: OffsetType,
    pub reset_offset: bool,
}

/// Opaque identifier of a logical task. A task owns a set of SSPs disjoint across
/// tasks within a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskName(pub String);

impl TaskName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// An operator-issued override of the starting position for one SSP. Resolution
/// to a concrete `Offset` is always delegated to the owning `SystemAdmin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Startpoint {
    Specific(Offset),
    Timestamp(i64),
    Oldest,
    Upcoming,
    Custom(serde_json::Value),
}

/// A durable snapshot of `SSP -> Offset` for one task, captured at commit time.
/// May contain SSPs beyond the container's registered set (e.g. changelog
/// partitions owned by state management); those pass through to the store
/// untouched but never reach the listener or tracker paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint(pub HashMap<Ssp, Offset>);

impl Checkpoint {
    pub fn new(entries: HashMap<Ssp, Offset>) -> Self {
        Self(entries)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, ssp: &Ssp) -> Option<&Offset> {
        self.0.get(ssp)
    }

    /// Restricts this checkpoint to the SSPs present in `registered`, the shape
    /// listeners and the tracker are allowed to observe.
    pub fn filtered(&self, registered: &std::collections::HashSet<Ssp>) -> HashMap<Ssp, Offset> {
        self.0
            .iter()
            .filter(|(ssp, _)| registered.contains(ssp))
            .map(|(ssp, offset)| (ssp.clone(), offset.clone()))
            .collect()
    }
}

/// The container-local offset-manager state machine. Transitions are monotonic;
/// re-entry into an earlier state is a programmer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninit,
    Registering,
    Started,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Uninit => "UNINIT",
            LifecycleState::Registering => "REGISTERING",
            LifecycleState::Started => "STARTED",
            LifecycleState::Stopped => "STOPPED",
        };
        write!(f, "{s}")
    }
}
