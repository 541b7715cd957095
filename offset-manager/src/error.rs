use crate::model::{LifecycleState, Ssp, SystemStream, TaskName};

/// Any failure surfaced by a pluggable checkpoint or startpoint store. The core
/// never inspects the cause; it propagates the error unchanged so a retry can
/// succeed against untouched in-memory state.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct StoreError(#[from] pub anyhow::Error);

/// Failure of a `CheckpointListener` callback. Propagated to the caller of
/// `writeCheckpoint`; the commit is considered failed and `startpoints` is left
/// untouched, since cleanup only happens after listener consultation succeeds.
#[derive(Debug, thiserror::Error)]
#[error("checkpoint listener for system '{system}' failed: {source}")]
pub struct ListenerError {
    pub system: String,
    #[source]
    pub source: anyhow::Error,
}

/// Fatal errors the offset manager can raise. A startpoint-resolution
/// failure is intentionally absent here: it is caught per-entry inside the
/// resolver, logged, and folded back into Stage C, so it never escapes as a
/// public error.
#[derive(Debug, thiserror::Error)]
pub enum OffsetManagerError {
    #[error("{0}")]
    Config(String),

    #[error("reset requested for stream {0} which has no configured offset setting")]
    ConfigReset(SystemStream),

    #[error("no broker metadata for partition {0}")]
    MetadataMissing(Ssp),

    #[error("update for unregistered partition {ssp} in task {task}")]
    UnknownPartition { task: TaskName, ssp: Ssp },

    #[error("illegal call to {operation} while offset manager is {state}")]
    Lifecycle {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

pub type Result<T> = std::result::Result<T, OffsetManagerError>;
