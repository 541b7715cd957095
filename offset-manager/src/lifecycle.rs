use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, RwLock};

use dashmap::DashMap;
use tracing::info;

use crate::checkpoint_loader::{strip_reset_offsets, CheckpointLoader};
use crate::commit;
use crate::config::{OffsetManagerConfig, StreamConfig};
use crate::error::OffsetManagerError;
use crate::model::{
    Checkpoint, LifecycleState, Offset, OffsetSetting, Ssp, Startpoint, SystemStream,
    SystemStreamMetadata, TaskName,
};
use crate::registry::PartitionRegistry;
use crate::resolver::OffsetResolver;
use crate::startpoint_loader::StartpointLoader;
use crate::traits::{
    CheckpointListener, CheckpointManager, ElasticityStrategy, IdentityElasticity,
    StartpointManager, SystemAdmin,
};
use crate::tracker::RuntimeTracker;

fn require_state(
    actual: LifecycleState,
    expected: LifecycleState,
    operation: &'static str,
) -> Result<(), OffsetManagerError> {
    if actual == expected {
        Ok(())
    } else {
        Err(OffsetManagerError::Lifecycle {
            operation,
            state: actual,
        })
    }
}

/// Drives the start/stop state machine and wires
/// together the components into the single object a container embeds.
///
/// `register` is legal only while `REGISTERING`; `update`,
/// `get_last_processed_offset`, `snapshot`, `get_modified_offsets`, and
/// `write_checkpoint` are legal only once `STARTED`. Transitions are
/// monotonic: `UNINIT -> REGISTERING` happens at construction (there is no
/// separate "ready to register" call in this port — the constructor itself
/// does the UNINIT->REGISTERING work), then `REGISTERING -> STARTED -> STOPPED`.
pub struct OffsetManager {
    state: RwLock<LifecycleState>,
    registry: PartitionRegistry,
    process_config: OffsetManagerConfig,
    stream_config: StreamConfig,
    admins: HashMap<String, Arc<dyn SystemAdmin>>,
    listeners: HashMap<String, Arc<dyn CheckpointListener>>,
    checkpoint_manager: Option<Arc<dyn CheckpointManager>>,
    startpoint_manager: Option<Arc<dyn StartpointManager>>,
    elasticity: Arc<dyn ElasticityStrategy>,
    tracker: RuntimeTracker,
    offset_settings: OnceLock<HashMap<SystemStream, OffsetSetting>>,
    starting_offsets: OnceLock<HashMap<TaskName, HashMap<Ssp, Offset>>>,
    startpoints: DashMap<TaskName, HashMap<Ssp, Startpoint>>,
}

impl OffsetManager {
    pub fn new(process_config: OffsetManagerConfig, stream_config: StreamConfig) -> Self {
        Self {
            state: RwLock::new(LifecycleState::Registering),
            registry: PartitionRegistry::new(),
            process_config,
            stream_config,
            admins: HashMap::new(),
            listeners: HashMap::new(),
            checkpoint_manager: None,
            startpoint_manager: None,
            elasticity: Arc::new(IdentityElasticity),
            tracker: RuntimeTracker::new(),
            offset_settings: OnceLock::new(),
            starting_offsets: OnceLock::new(),
            startpoints: DashMap::new(),
        }
    }

    pub fn with_checkpoint_manager(mut self, manager: Arc<dyn CheckpointManager>) -> Self {
        self.checkpoint_manager = Some(manager);
        self
    }

    pub fn with_startpoint_manager(mut self, manager: Arc<dyn StartpointManager>) -> Self {
        self.startpoint_manager = Some(manager);
        self
    }

    pub fn with_system_admin(mut self, system: impl Into<String>, admin: Arc<dyn SystemAdmin>) -> Self {
        self.admins.insert(system.into(), admin);
        self
    }

    pub fn with_checkpoint_listener(
        mut self,
        system: impl Into<String>,
        listener: Arc<dyn CheckpointListener>,
    ) -> Self {
        self.listeners.insert(system.into(), listener);
        self
    }

    pub fn with_elasticity_strategy(mut self, strategy: Arc<dyn ElasticityStrategy>) -> Self {
        self.elasticity = strategy;
        self
    }

    fn state(&self) -> LifecycleState {
        *self.state.read().expect("lifecycle lock poisoned")
    }

    /// Legal only in `REGISTERING`.
    pub fn register(
        &self,
        task: TaskName,
        ssps: impl IntoIterator<Item = Ssp>,
    ) -> Result<(), OffsetManagerError> {
        require_state(self.state(), LifecycleState::Registering, "register")?;
        self.registry.register(task, ssps)
    }

    /// Runs CheckpointLoader -> reset-strip -> OffsetResolver ->
    /// StartpointLoader -> default-fill (the latter folded into the resolver's
    /// Stage C), then transitions `REGISTERING -> STARTED`.
    pub async fn start(
        &self,
        metadata: HashMap<SystemStream, SystemStreamMetadata>,
    ) -> Result<(), OffsetManagerError> {
        require_state(self.state(), LifecycleState::Registering, "start")?;

        if let Some(manager) = &self.checkpoint_manager {
            manager.start().await.map_err(OffsetManagerError::Store)?;
        }
        if let Some(manager) = &self.startpoint_manager {
            manager.start().await.map_err(OffsetManagerError::Store)?;
        }

        self.registry.freeze();

        let settings_builder =
            crate::settings::SettingsBuilder::new(&self.process_config, &self.stream_config);
        let offset_settings = settings_builder.build(metadata)?;

        let tasks: HashMap<TaskName, HashSet<Ssp>> = self
            .registry
            .tasks()
            .into_iter()
            .map(|task| {
                let ssps = self.registry.ssps_for_task(&task);
                (task, ssps)
            })
            .collect();

        let registered_streams: HashSet<SystemStream> = self
            .registry
            .all_ssps()
            .into_iter()
            .map(|ssp| ssp.system_stream)
            .collect();

        let loader = CheckpointLoader::new(
            self.checkpoint_manager.as_deref(),
            self.elasticity.as_ref(),
            self.process_config.elasticity_enabled,
        );
        let mut last_processed = loader.load(&tasks, &offset_settings, &self.admins).await?;
        strip_reset_offsets(
            &mut last_processed,
            &offset_settings,
            &registered_streams,
            &self.stream_config,
        )?;

        let startpoint_loader = StartpointLoader::new(self.startpoint_manager.as_deref());
        let startpoints = startpoint_loader.load(&tasks).await?;

        let resolver = OffsetResolver::new(&self.registry, &self.admins, &offset_settings);
        let starting_offsets = resolver.resolve(&last_processed, &startpoints).await?;

        for (task, offsets) in last_processed {
            self.tracker.seed(task, offsets);
        }
        for (task, offsets) in startpoints {
            self.startpoints.insert(task, offsets);
        }

        self.offset_settings
            .set(offset_settings)
            .map_err(|_| ())
            .expect("offset_settings published twice");
        self.starting_offsets
            .set(starting_offsets)
            .map_err(|_| ())
            .expect("starting_offsets published twice");

        *self.state.write().expect("lifecycle lock poisoned") = LifecycleState::Started;
        info!("offset manager started");
        Ok(())
    }

    /// The starting offset computed at `start()` time for `(task, ssp)`. This
    /// is always `Some` for a registered SSP once `start()` has completed.
    pub fn starting_offset(&self, task: &TaskName, ssp: &Ssp) -> Option<Offset> {
        self.starting_offsets
            .get()
            .and_then(|map| map.get(task))
            .and_then(|offsets| offsets.get(ssp))
            .cloned()
    }

    pub fn update(
        &self,
        task: &TaskName,
        ssp: &Ssp,
        offset: Option<Offset>,
    ) -> Result<(), OffsetManagerError> {
        require_state(self.state(), LifecycleState::Started, "update")?;
        self.tracker.update(&self.registry, task, ssp, offset)
    }

    pub fn get_last_processed_offset(
        &self,
        task: &TaskName,
        ssp: &Ssp,
    ) -> Result<Option<Offset>, OffsetManagerError> {
        require_state(self.state(), LifecycleState::Started, "getLastProcessedOffset")?;
        Ok(self.tracker.get_last_processed_offset(task, ssp))
    }

    pub fn snapshot(&self, task: &TaskName) -> Result<HashMap<Ssp, Offset>, OffsetManagerError> {
        require_state(self.state(), LifecycleState::Started, "getLastProcessedOffsets")?;
        if self.checkpoint_manager.is_none() && self.listeners.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self.tracker.snapshot(&self.registry, task))
    }

    pub async fn get_modified_offsets(
        &self,
        task: &TaskName,
    ) -> Result<HashMap<Ssp, Offset>, OffsetManagerError> {
        require_state(self.state(), LifecycleState::Started, "getModifiedOffsets")?;
        let starting_offsets = self.starting_offsets.get().cloned().unwrap_or_default();
        commit::get_modified_offsets(
            task,
            &self.tracker,
            &self.registry,
            &starting_offsets,
            &self.listeners,
            &self.admins,
        )
        .await
    }

    pub async fn write_checkpoint(
        &self,
        task: &TaskName,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<(), OffsetManagerError> {
        require_state(self.state(), LifecycleState::Started, "writeCheckpoint")?;
        commit::write_checkpoint(
            task,
            checkpoint,
            self.checkpoint_manager.as_ref(),
            &self.listeners,
            self.startpoint_manager.as_ref(),
            &self.startpoints,
            &self.registry,
        )
        .await
    }

    /// Idempotent once started. Stops the checkpoint and startpoint stores
    /// if configured and transitions to `STOPPED`; does not interrupt
    /// in-flight calls. Illegal before `start()` has completed.
    pub async fn stop(&self) -> Result<(), OffsetManagerError> {
        if self.state() == LifecycleState::Stopped {
            return Ok(());
        }
        require_state(self.state(), LifecycleState::Started, "stop")?;

        if let Some(manager) = &self.checkpoint_manager {
            manager.stop().await.map_err(OffsetManagerError::Store)?;
        }
        if let Some(manager) = &self.startpoint_manager {
            manager.stop().await.map_err(OffsetManagerError::Store)?;
        }

        *self.state.write().expect("lifecycle lock poisoned") = LifecycleState::Stopped;
        info!("offset manager stopped");
        Ok(())
    }
}
