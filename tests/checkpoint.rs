mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use taskengine::{
    Container, ContainerStatus, EngineError, EngineSnapshot, EniAttachment, InitError,
    MemorySaver, PersistenceError, RuntimeEvent, SNAPSHOT_VERSION, Saver, SnapshotError,
    StateChangeEvent, Task, TaskEngine, TaskStatus, ValidationError,
};

use common::{FakeRuntime, events_until, eventually, fast_config};

fn web_task(arn: &str) -> Task {
    Task::new(
        arn,
        vec![
            Container::new("a", "img-a"),
            Container::new("b", "img-b").depends_on("a").essential(false),
        ],
    )
}

fn is_task(status: TaskStatus) -> impl Fn(&StateChangeEvent) -> bool {
    move |e| e.task_status() == Some(status)
}

async fn engine_with(rt: &Arc<FakeRuntime>, saver: Arc<dyn Saver>) -> Arc<TaskEngine> {
    let engine = TaskEngine::builder(rt.clone())
        .with_config(fast_config())
        .with_saver(saver)
        .build();
    engine.init().await.unwrap();
    engine
}

#[tokio::test]
async fn test_state_changes_trigger_checkpoints() {
    let rt = FakeRuntime::new();
    let saver = Arc::new(MemorySaver::new());
    let engine = engine_with(&rt, saver.clone()).await;
    let mut events = engine.task_events().unwrap();

    engine.add_task(web_task("t1")).await.unwrap();
    events_until(&mut events.tasks, is_task(TaskStatus::Running)).await;

    eventually(|| {
        saver
            .latest()
            .and_then(|s| s.tasks.into_iter().next())
            .is_some_and(|t| t.known_status() == TaskStatus::Running)
    })
    .await;

    engine.disable().await;
}

#[tokio::test]
async fn test_restart_resumes_from_saved_snapshot() {
    let rt = FakeRuntime::new();
    let saver = Arc::new(MemorySaver::new());

    let first = engine_with(&rt, saver.clone()).await;
    let mut events = first.task_events().unwrap();
    first.add_task(web_task("t1")).await.unwrap();
    first
        .add_eni_attachment(EniAttachment::new("0a:58:a9:fe:ac:02", Duration::from_secs(300)))
        .await
        .unwrap();
    events_until(&mut events.tasks, is_task(TaskStatus::Running)).await;
    first.disable().await;

    let saved = saver.latest().unwrap();
    assert_eq!(saved.version, SNAPSHOT_VERSION);
    assert_eq!(saved.tasks.len(), 1);
    assert_eq!(saved.attachments.len(), 1);

    let second = engine_with(&rt, saver.clone()).await;
    let mut events = second.task_events().unwrap();

    let task = second.get_task_by_arn("t1").await.unwrap();
    assert_eq!(task.known_status(), TaskStatus::Running);
    assert_eq!(task.container("a").unwrap().runtime_id(), Some("t1/a"));
    assert!(second.eni_attachment("0a:58:a9:fe:ac:02").is_some());

    // The restored manager resyncs instead of starting containers again.
    eventually(|| rt.count("inspect t1/a") == 1).await;
    assert_eq!(rt.count("start t1/a"), 1);

    // And it reacts to runtime events.
    rt.inject(RuntimeEvent::new("t1/a", ContainerStatus::Stopped));
    events_until(&mut events.tasks, is_task(TaskStatus::Stopped)).await;

    second.disable().await;
}

#[tokio::test]
async fn test_restore_json_marks_vanished_containers_stopped() {
    let rt = FakeRuntime::new();
    let source = engine_with(&rt, Arc::new(MemorySaver::new())).await;
    let mut events = source.task_events().unwrap();
    source.add_task(web_task("t1")).await.unwrap();
    events_until(&mut events.tasks, is_task(TaskStatus::Running)).await;
    let json = source.export_json().await.unwrap();
    source.disable().await;

    // A different host: the runtime knows none of the containers.
    let other = FakeRuntime::new();
    let target = engine_with(&other, Arc::new(MemorySaver::new())).await;
    let mut events = target.task_events().unwrap();
    target.restore_json(&json).await.unwrap();

    let tasks = events_until(&mut events.tasks, is_task(TaskStatus::Stopped)).await;
    assert_eq!(
        tasks.last().unwrap().reason(),
        Some("essential container 'a' is STOPPED")
    );
    let task = target.get_task_by_arn("t1").await.unwrap();
    assert_eq!(
        task.container("a").unwrap().reason(),
        Some("container no longer exists in the runtime")
    );

    let err = target.restore_json(&json).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::DuplicateTask { .. })
    ));

    target.disable().await;
}

#[tokio::test]
async fn test_newer_snapshot_versions_are_refused() {
    let rt = FakeRuntime::new();
    let engine = engine_with(&rt, Arc::new(MemorySaver::new())).await;

    let json = format!(
        r#"{{"version":{},"tasks":[],"attachments":[]}}"#,
        SNAPSHOT_VERSION + 1
    );
    let err = engine.restore_json(&json).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Snapshot(SnapshotError::UnsupportedVersion { .. })
    ));

    engine.disable().await;
}

struct FutureSaver;

#[async_trait]
impl Saver for FutureSaver {
    async fn save(&self, _snapshot: &EngineSnapshot) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn load(&self) -> Result<Option<EngineSnapshot>, PersistenceError> {
        let mut snapshot = EngineSnapshot::new(Vec::new(), Vec::new());
        snapshot.version = SNAPSHOT_VERSION + 1;
        Ok(Some(snapshot))
    }
}

#[tokio::test]
async fn test_init_fails_on_unsupported_saved_snapshot() {
    let rt = FakeRuntime::new();
    let engine = TaskEngine::builder(rt.clone())
        .with_saver(Arc::new(FutureSaver))
        .build();

    let err = engine.init().await.unwrap_err();
    assert!(matches!(
        err,
        InitError::Restore(SnapshotError::UnsupportedVersion { found, supported })
            if found == SNAPSHOT_VERSION + 1 && supported == SNAPSHOT_VERSION
    ));
    assert!(matches!(
        engine.capabilities(),
        Err(EngineError::NotInitialized)
    ));
}

struct BrokenSaver;

#[async_trait]
impl Saver for BrokenSaver {
    async fn save(&self, _snapshot: &EngineSnapshot) -> Result<(), PersistenceError> {
        Err(PersistenceError::Save {
            error: "disk full".to_string(),
        })
    }
}

#[tokio::test]
async fn test_save_failures_do_not_stop_the_engine() {
    let rt = FakeRuntime::new();
    let engine = engine_with(&rt, Arc::new(BrokenSaver)).await;
    let mut events = engine.task_events().unwrap();

    engine.add_task(web_task("t1")).await.unwrap();
    events_until(&mut events.tasks, is_task(TaskStatus::Running)).await;

    let err = engine.checkpoint().await.unwrap_err();
    assert_eq!(err.as_label(), "persistence_save");
    engine.add_task(web_task("t2")).await.unwrap();
    events_until(&mut events.tasks, is_task(TaskStatus::Running)).await;

    engine.disable().await;
}

#[tokio::test]
async fn test_snapshot_lists_tasks_and_attachments_in_order() {
    let rt = FakeRuntime::new();
    let engine = engine_with(&rt, Arc::new(MemorySaver::new())).await;

    engine.add_task(web_task("t2")).await.unwrap();
    engine.add_task(web_task("t1")).await.unwrap();
    for mac in ["0a:00:00:00:00:02", "0a:00:00:00:00:01"] {
        engine
            .add_eni_attachment(EniAttachment::new(mac, Duration::from_secs(300)))
            .await
            .unwrap();
    }

    let snapshot = engine.snapshot().await;
    let arns: Vec<&str> = snapshot.tasks.iter().map(Task::arn).collect();
    let macs: Vec<&str> = snapshot.attachments.iter().map(EniAttachment::mac).collect();
    assert_eq!(arns, ["t1", "t2"]);
    assert_eq!(macs, ["0a:00:00:00:00:01", "0a:00:00:00:00:02"]);

    engine.disable().await;
}

#[tokio::test]
async fn test_rejected_restore_installs_nothing() {
    let rt = FakeRuntime::new();
    let engine = engine_with(&rt, Arc::new(MemorySaver::new())).await;
    let mut events = engine.task_events().unwrap();

    let held = "0a:00:00:00:00:01";
    let fresh = "0a:00:00:00:00:02";
    engine
        .add_task(web_task("x").with_eni_reference(held))
        .await
        .unwrap();
    events_until(&mut events.tasks, is_task(TaskStatus::Running)).await;

    let snapshot = EngineSnapshot::new(
        vec![web_task("y").with_eni_reference(held)],
        vec![EniAttachment::new(fresh, Duration::from_secs(300))],
    );
    let err = engine.restore(snapshot).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::AttachmentClaimed { ref mac, ref owner })
            if mac == held && owner == "x"
    ));
    assert!(engine.eni_attachment(fresh).is_none());
    assert!(engine.get_task_by_arn("y").await.is_none());

    // The same attachment can still be restored once the conflict is gone.
    let retry = EngineSnapshot::new(
        Vec::new(),
        vec![EniAttachment::new(fresh, Duration::from_secs(300))],
    );
    engine.restore(retry).await.unwrap();
    assert!(engine.eni_attachment(fresh).is_some());

    engine.disable().await;
}

#[tokio::test]
async fn test_restore_rejects_attachment_held_by_registered_task() {
    let rt = FakeRuntime::new();
    let engine = engine_with(&rt, Arc::new(MemorySaver::new())).await;

    let mac = "0a:00:00:00:00:01";
    engine
        .add_task(web_task("x").with_eni_reference(mac))
        .await
        .unwrap();

    let snapshot = EngineSnapshot::new(
        vec![web_task("y")],
        vec![EniAttachment::new(mac, Duration::from_secs(300))],
    );
    let err = engine.restore(snapshot).await.unwrap_err();
    assert_eq!(err.as_label(), "attachment_claimed");
    assert!(engine.eni_attachment(mac).is_none());
    assert!(engine.get_task_by_arn("y").await.is_none());

    engine.disable().await;
}
