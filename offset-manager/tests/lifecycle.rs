//! End-to-end exercise of the `OffsetManager` state machine against the
//! in-memory fakes in `offset_manager::testing`, covering the concrete
//! scenarios a container driving this core relies on: cold start, warm
//! start, reset-overrides-checkpoint, startpoint-overrides-checkpoint,
//! listener rewrite at commit time, and illegal out-of-order calls.

use std::collections::HashMap;
use std::sync::Arc;

use offset_manager::model::{
    Checkpoint, Offset, OffsetType, PartitionMetadata, Ssp, Startpoint, SystemStream,
    SystemStreamMetadata, TaskName,
};
use offset_manager::testing::{
    InMemoryCheckpointManager, InMemoryStartpointManager, RecordingCheckpointListener,
    StaticSystemAdmin,
};
use offset_manager::traits::{CheckpointListener, CheckpointManager, StartpointManager, SystemAdmin};
use offset_manager::{OffsetManager, OffsetManagerConfig, OffsetManagerError, StreamConfig};

fn metadata_for(
    system_stream: SystemStream,
    oldest: Option<&str>,
    newest: Option<&str>,
    upcoming: Option<&str>,
) -> HashMap<SystemStream, SystemStreamMetadata> {
    let mut per_partition = HashMap::new();
    per_partition.insert(
        0,
        PartitionMetadata {
            oldest: oldest.map(Offset::new),
            newest: newest.map(Offset::new),
            upcoming: upcoming.map(Offset::new),
        },
    );
    HashMap::from([(system_stream, SystemStreamMetadata { per_partition })])
}

fn process_config() -> OffsetManagerConfig {
    OffsetManagerConfig {
        default_offset: "oldest".into(),
        elasticity_enabled: false,
    }
}

#[tokio::test]
async fn cold_start_with_no_checkpoint_uses_configured_default() {
    let task = TaskName::new("t0");
    let ssp = Ssp::new("sysA", "topicX", 0);

    let manager = OffsetManager::new(process_config(), StreamConfig::default())
        .with_system_admin("sysA", Arc::new(StaticSystemAdmin::default()));
    manager.register(task.clone(), vec![ssp.clone()]).unwrap();

    let metadata = metadata_for(ssp.system_stream.clone(), Some("10"), Some("40"), Some("42"));
    manager.start(metadata).await.unwrap();

    assert_eq!(manager.starting_offset(&task, &ssp), Some(Offset::new("10")));
}

#[tokio::test]
async fn warm_start_resumes_after_checkpoint_and_commit_removes_startpoint() {
    let task = TaskName::new("t0");
    let ssp = Ssp::new("sysA", "topicX", 0);

    let checkpoint_manager = Arc::new(InMemoryCheckpointManager::new());
    checkpoint_manager
        .seed(
            task.clone(),
            Checkpoint::new(HashMap::from([(ssp.clone(), Offset::new("100"))])),
        )
        .await;

    let startpoint_manager = Arc::new(InMemoryStartpointManager::new());
    startpoint_manager
        .seed(
            task.clone(),
            HashMap::from([(ssp.clone(), Startpoint::Oldest)]),
        )
        .await;

    let admin = StaticSystemAdmin::default();
    admin.set_offset_after(ssp.clone(), Offset::new("101"));
    admin.set_startpoint_resolution(ssp.clone(), Some(Offset::new("250")));

    let manager = OffsetManager::new(process_config(), StreamConfig::default())
        .with_checkpoint_manager(checkpoint_manager.clone() as Arc<dyn CheckpointManager>)
        .with_startpoint_manager(startpoint_manager.clone() as Arc<dyn StartpointManager>)
        .with_system_admin("sysA", Arc::new(admin) as Arc<dyn SystemAdmin>);
    manager.register(task.clone(), vec![ssp.clone()]).unwrap();

    let metadata = metadata_for(ssp.system_stream.clone(), Some("10"), Some("40"), Some("42"));
    manager.start(metadata).await.unwrap();

    // Startpoint strictly overwrites the checkpoint-derived "offset after".
    assert_eq!(manager.starting_offset(&task, &ssp), Some(Offset::new("250")));

    manager.update(&task, &ssp, Some(Offset::new("260"))).unwrap();
    let checkpoint = Checkpoint::new(HashMap::from([(ssp.clone(), Offset::new("260"))]));
    manager.write_checkpoint(&task, Some(&checkpoint)).await.unwrap();

    let stored = checkpoint_manager.read_last_checkpoint(&task).await.unwrap().unwrap();
    assert_eq!(stored.get(&ssp), Some(&Offset::new("260")));

    // The absorbed startpoint fan-out must be gone after the commit.
    assert!(startpoint_manager
        .is_stopped()
        .await);
}

#[tokio::test]
async fn reset_offset_discards_checkpoint_and_reapplies_default() {
    let task = TaskName::new("t0");
    let ssp = Ssp::new("sysA", "topicX", 0);

    let checkpoint_manager = Arc::new(InMemoryCheckpointManager::new());
    checkpoint_manager
        .seed(
            task.clone(),
            Checkpoint::new(HashMap::from([(ssp.clone(), Offset::new("100"))])),
        )
        .await;

    let mut entries = HashMap::new();
    entries.insert("streams.topicX.samza.reset.offset".to_string(), "true".to_string());
    entries.insert(
        "streams.topicX.samza.offset.default".to_string(),
        "newest".to_string(),
    );
    let stream_config = StreamConfig::new(entries);

    let manager = OffsetManager::new(process_config(), stream_config)
        .with_checkpoint_manager(checkpoint_manager as Arc<dyn CheckpointManager>)
        .with_system_admin("sysA", Arc::new(StaticSystemAdmin::default()));
    manager.register(task.clone(), vec![ssp.clone()]).unwrap();

    let metadata = metadata_for(ssp.system_stream.clone(), Some("10"), Some("500"), Some("501"));
    manager.start(metadata).await.unwrap();

    assert_eq!(manager.starting_offset(&task, &ssp), Some(Offset::new("500")));
}

#[tokio::test]
async fn listener_rewrite_is_reflected_in_get_modified_offsets() {
    let task = TaskName::new("t0");
    let ssp = Ssp::new("sysA", "topicX", 0);

    let listener = Arc::new(RecordingCheckpointListener::default());
    listener.set_before_checkpoint_result(HashMap::from([(ssp.clone(), Offset::new("6"))]));

    let manager = OffsetManager::new(process_config(), StreamConfig::default())
        .with_system_admin("sysA", Arc::new(StaticSystemAdmin::default()))
        .with_checkpoint_listener("sysA", listener.clone() as Arc<dyn CheckpointListener>);
    manager.register(task.clone(), vec![ssp.clone()]).unwrap();

    let metadata = metadata_for(ssp.system_stream.clone(), Some("5"), Some("40"), Some("42"));
    manager.start(metadata).await.unwrap();

    manager.update(&task, &ssp, Some(Offset::new("7"))).unwrap();
    let modified = manager.get_modified_offsets(&task).await.unwrap();

    assert_eq!(modified.get(&ssp), Some(&Offset::new("6")));
}

#[tokio::test]
async fn out_of_order_calls_are_lifecycle_errors() {
    let task = TaskName::new("t0");
    let ssp = Ssp::new("sysA", "topicX", 0);

    let manager = OffsetManager::new(process_config(), StreamConfig::default())
        .with_system_admin("sysA", Arc::new(StaticSystemAdmin::default()));

    // update before start.
    let err = manager.update(&task, &ssp, Some(Offset::new("1"))).unwrap_err();
    assert!(matches!(err, OffsetManagerError::Lifecycle { .. }));

    // stop before start.
    let err = manager.stop().await.unwrap_err();
    assert!(matches!(err, OffsetManagerError::Lifecycle { .. }));

    manager.register(task.clone(), vec![ssp.clone()]).unwrap();
    let metadata = metadata_for(ssp.system_stream.clone(), Some("10"), Some("40"), Some("42"));
    manager.start(metadata).await.unwrap();

    // register after start.
    let err = manager
        .register(TaskName::new("t1"), vec![Ssp::new("sysA", "topicX", 1)])
        .unwrap_err();
    assert!(matches!(err, OffsetManagerError::Lifecycle { .. }));

    manager.stop().await.unwrap();

    // write_checkpoint after stop.
    let checkpoint = Checkpoint::new(HashMap::from([(ssp.clone(), Offset::new("1"))]));
    let err = manager
        .write_checkpoint(&task, Some(&checkpoint))
        .await
        .unwrap_err();
    assert!(matches!(err, OffsetManagerError::Lifecycle { .. }));

    // stop is idempotent.
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn missing_metadata_for_a_registered_partition_fails_start() {
    let task = TaskName::new("t0");
    let ssp = Ssp::new("sysA", "topicX", 1);

    let manager = OffsetManager::new(process_config(), StreamConfig::default())
        .with_system_admin("sysA", Arc::new(StaticSystemAdmin::default()));
    manager.register(task, vec![ssp.clone()]).unwrap();

    // Only partition 0 has metadata; the registered SSP is on partition 1.
    let metadata = metadata_for(ssp.system_stream.clone(), Some("10"), Some("40"), Some("42"));
    let err = manager.start(metadata).await.unwrap_err();
    assert!(matches!(err, OffsetManagerError::MetadataMissing(_)));
}

#[tokio::test]
async fn default_offset_empty_stream_falls_back_to_upcoming() {
    let task = TaskName::new("t0");
    let ssp = Ssp::new("sysA", "topicX", 0);

    let mut entries = HashMap::new();
    entries.insert(
        "streams.topicX.samza.offset.default".to_string(),
        "newest".to_string(),
    );
    let stream_config = StreamConfig::new(entries);

    let manager = OffsetManager::new(process_config(), stream_config)
        .with_system_admin("sysA", Arc::new(StaticSystemAdmin::default()));
    manager.register(task.clone(), vec![ssp.clone()]).unwrap();

    // Empty topic: no newest offset, but upcoming is "0".
    let metadata = metadata_for(ssp.system_stream.clone(), None, None, Some("0"));
    manager.start(metadata).await.unwrap();

    assert_eq!(manager.starting_offset(&task, &ssp), Some(Offset::new("0")));
}
