//! In-memory fakes for the core's external collaborators, in the style of
//! the reference runtime's mock-cluster test helpers: plain structs backed
//! by a lock, with a handful of `seed`/`set_*` methods the test suite uses
//! to arrange state before exercising the crate under test. Exported
//! unconditionally so a container embedding this crate can reuse the same
//! fakes in its own tests instead of writing another set.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::model::{Checkpoint, Offset, Ssp, Startpoint, TaskName};
use crate::traits::{CheckpointListener, CheckpointManager, StartpointManager, SystemAdmin};

/// A `SystemAdmin` whose answers are whatever the test arranged ahead of
/// time. `get_offsets_after` and `resolve_startpoint_to_offset` return
/// nothing for any SSP that wasn't explicitly seeded; `offset_comparator`
/// always does plain numeric comparison, matching the Kafka-backed admin.
#[derive(Default)]
pub struct StaticSystemAdmin {
    offsets_after: Mutex<HashMap<Ssp, Offset>>,
    startpoint_resolutions: Mutex<HashMap<Ssp, Option<Offset>>>,
}

impl StaticSystemAdmin {
    pub fn set_offset_after(&self, ssp: Ssp, offset: Offset) {
        self.offsets_after
            .try_lock()
            .expect("StaticSystemAdmin is single-threaded in tests")
            .insert(ssp, offset);
    }

    pub fn set_startpoint_resolution(&self, ssp: Ssp, offset: Option<Offset>) {
        self.startpoint_resolutions
            .try_lock()
            .expect("StaticSystemAdmin is single-threaded in tests")
            .insert(ssp, offset);
    }
}

#[async_trait]
impl SystemAdmin for StaticSystemAdmin {
    async fn get_offsets_after(
        &self,
        offsets: &HashMap<Ssp, Offset>,
    ) -> anyhow::Result<HashMap<Ssp, Offset>> {
        let arranged = self.offsets_after.lock().await;
        Ok(offsets
            .keys()
            .filter_map(|ssp| arranged.get(ssp).map(|offset| (ssp.clone(), offset.clone())))
            .collect())
    }

    async fn resolve_startpoint_to_offset(
        &self,
        ssp: &Ssp,
        _startpoint: &Startpoint,
    ) -> anyhow::Result<Option<Offset>> {
        let arranged = self.startpoint_resolutions.lock().await;
        Ok(arranged.get(ssp).cloned().flatten())
    }

    fn offset_comparator(&self, a: &Offset, b: &Offset) -> Option<Ordering> {
        match (a.as_str().parse::<i64>(), b.as_str().parse::<i64>()) {
            (Ok(a), Ok(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }
}

/// A `CheckpointManager` backed by an in-process map. `read_all_checkpoints`
/// returns whatever has been written so far, mirroring a store that persists
/// every commit.
#[derive(Default)]
pub struct InMemoryCheckpointManager {
    checkpoints: Mutex<HashMap<TaskName, Checkpoint>>,
    registered: Mutex<Vec<TaskName>>,
    stopped: Mutex<bool>,
}

impl InMemoryCheckpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, task: TaskName, checkpoint: Checkpoint) {
        self.checkpoints.lock().await.insert(task, checkpoint);
    }

    pub async fn is_stopped(&self) -> bool {
        *self.stopped.lock().await
    }
}

#[async_trait]
impl CheckpointManager for InMemoryCheckpointManager {
    async fn start(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), StoreError> {
        *self.stopped.lock().await = true;
        Ok(())
    }

    async fn register(&self, task: &TaskName) -> Result<(), StoreError> {
        self.registered.lock().await.push(task.clone());
        Ok(())
    }

    async fn read_last_checkpoint(&self, task: &TaskName) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.checkpoints.lock().await.get(task).cloned())
    }

    async fn read_all_checkpoints(&self) -> Result<HashMap<TaskName, Checkpoint>, StoreError> {
        Ok(self.checkpoints.lock().await.clone())
    }

    async fn write_checkpoint(&self, task: &TaskName, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.checkpoints
            .lock()
            .await
            .insert(task.clone(), checkpoint.clone());
        Ok(())
    }
}

/// A `StartpointManager` backed by an in-process map. `seed` mimics the
/// fan-out records an outer job-bootstrap would have already written before
/// this core starts.
#[derive(Default)]
pub struct InMemoryStartpointManager {
    fan_out: Mutex<HashMap<TaskName, HashMap<Ssp, Startpoint>>>,
    stopped: Mutex<bool>,
}

impl InMemoryStartpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, task: TaskName, entries: HashMap<Ssp, Startpoint>) {
        self.fan_out.lock().await.insert(task, entries);
    }

    pub async fn is_stopped(&self) -> bool {
        *self.stopped.lock().await
    }
}

#[async_trait]
impl StartpointManager for InMemoryStartpointManager {
    async fn start(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), StoreError> {
        *self.stopped.lock().await = true;
        Ok(())
    }

    async fn get_fan_out_for_task(
        &self,
        task: &TaskName,
    ) -> Result<Option<HashMap<Ssp, Startpoint>>, StoreError> {
        Ok(self.fan_out.lock().await.get(task).cloned())
    }

    async fn remove_fan_out_for_task(&self, task: &TaskName) -> Result<(), StoreError> {
        self.fan_out.lock().await.remove(task);
        Ok(())
    }
}

/// A `CheckpointListener` that records every call it receives and optionally
/// rewrites `before_checkpoint`'s result, so a test can assert exactly what
/// the commit pipeline handed it.
#[derive(Default)]
pub struct RecordingCheckpointListener {
    before_checkpoint_calls: Mutex<Vec<HashMap<Ssp, Offset>>>,
    on_checkpoint_calls: Mutex<Vec<HashMap<Ssp, Offset>>>,
    before_checkpoint_result: Mutex<Option<HashMap<Ssp, Offset>>>,
}

impl RecordingCheckpointListener {
    pub fn set_before_checkpoint_result(&self, result: HashMap<Ssp, Offset>) {
        self.before_checkpoint_result
            .try_lock()
            .expect("RecordingCheckpointListener is single-threaded in tests")
            .replace(result);
    }

    pub fn before_checkpoint_calls(&self) -> usize {
        self.before_checkpoint_calls
            .try_lock()
            .expect("RecordingCheckpointListener is single-threaded in tests")
            .len()
    }

    pub fn on_checkpoint_calls(&self) -> Vec<HashMap<Ssp, Offset>> {
        self.on_checkpoint_calls
            .try_lock()
            .expect("RecordingCheckpointListener is single-threaded in tests")
            .clone()
    }
}

#[async_trait]
impl CheckpointListener for RecordingCheckpointListener {
    async fn before_checkpoint(
        &self,
        offsets: HashMap<Ssp, Offset>,
    ) -> anyhow::Result<HashMap<Ssp, Offset>> {
        self.before_checkpoint_calls.lock().await.push(offsets.clone());
        Ok(self
            .before_checkpoint_result
            .lock()
            .await
            .clone()
            .unwrap_or(offsets))
    }

    async fn on_checkpoint(&self, offsets: HashMap<Ssp, Offset>) -> anyhow::Result<()> {
        self.on_checkpoint_calls.lock().await.push(offsets);
        Ok(())
    }
}

/// A `CheckpointListener` whose `before_checkpoint`/`on_checkpoint` always
/// fail, for exercising the error paths in the commit pipeline.
pub struct FailingCheckpointListener;

#[async_trait]
impl CheckpointListener for FailingCheckpointListener {
    async fn before_checkpoint(
        &self,
        _offsets: HashMap<Ssp, Offset>,
    ) -> anyhow::Result<HashMap<Ssp, Offset>> {
        Err(anyhow::anyhow!("listener unavailable"))
    }

    async fn on_checkpoint(&self, _offsets: HashMap<Ssp, Offset>) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("listener unavailable"))
    }
}

/// Convenience constructor mirroring how the reference runtime's Kafka test
/// helper hands back a ready-to-use fake: an `Arc<dyn SystemAdmin>` with no
/// arranged answers, useful when a test only needs `offset_comparator`.
pub fn static_admin() -> Arc<dyn SystemAdmin> {
    Arc::new(StaticSystemAdmin::default())
}
