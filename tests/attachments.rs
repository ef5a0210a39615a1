mod common;

use std::sync::Arc;
use std::time::Duration;

use taskengine::{
    AttachmentStatus, Container, EngineError, EniAttachment, EventKind, Task, TaskEngine,
    ValidationError,
};

use common::{FakeRuntime, fast_config, next_event};

const MAC: &str = "0a:58:a9:fe:ac:02";

async fn started() -> Arc<TaskEngine> {
    let engine = TaskEngine::builder(FakeRuntime::new())
        .with_config(fast_config())
        .build();
    engine.init().await.unwrap();
    engine
}

fn task_with_eni(arn: &str) -> Task {
    Task::new(arn, vec![Container::new("a", "img-a")]).with_eni_reference(MAC)
}

#[tokio::test(start_paused = true)]
async fn test_unclaimed_attachment_expires() {
    let engine = started().await;
    let mut events = engine.task_events().unwrap();

    engine
        .add_eni_attachment(EniAttachment::new(MAC, Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(
        engine.eni_attachment(MAC).map(|a| a.status()),
        Some(AttachmentStatus::Pending)
    );

    let ev = next_event(&mut events.tasks).await;
    assert_eq!(ev.kind(), EventKind::Attachment);
    assert_eq!(ev.mac(), Some(MAC));
    assert_eq!(ev.attachment_status(), Some(AttachmentStatus::Expired));
    assert_eq!(ev.task_arn(), None);
    assert!(engine.eni_attachment(MAC).is_none());

    engine.disable().await;
}

#[tokio::test(start_paused = true)]
async fn test_claim_cancels_expiration() {
    let engine = started().await;
    let mut events = engine.task_events().unwrap();

    engine
        .add_task(Task::new("t1", vec![Container::new("a", "img-a")]))
        .await
        .unwrap();
    engine
        .add_eni_attachment(EniAttachment::new(MAC, Duration::from_secs(1)))
        .await
        .unwrap();
    engine.claim_eni_attachment(MAC, "t1").await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;

    let attachment = engine.eni_attachment(MAC).unwrap();
    assert_eq!(attachment.status(), AttachmentStatus::Attached);
    assert_eq!(attachment.task_arn(), Some("t1"));

    let mut attachment_events = Vec::new();
    while let Ok(ev) = events.tasks.try_recv() {
        if ev.kind() == EventKind::Attachment {
            attachment_events.push(ev);
        }
    }
    assert_eq!(attachment_events.len(), 1);
    assert_eq!(
        attachment_events[0].attachment_status(),
        Some(AttachmentStatus::Attached)
    );

    // Claiming again by the owner is a no-op.
    engine.claim_eni_attachment(MAC, "t1").await.unwrap();

    engine.disable().await;
}

#[tokio::test]
async fn test_attachment_is_claimed_once() {
    let engine = started().await;

    engine.add_task(task_with_eni("t1")).await.unwrap();
    engine
        .add_task(Task::new("t2", vec![Container::new("a", "img-a")]))
        .await
        .unwrap();
    engine
        .add_eni_attachment(EniAttachment::new(MAC, Duration::from_secs(60)))
        .await
        .unwrap();

    let err = engine.claim_eni_attachment(MAC, "t2").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::AttachmentClaimed { ref owner, .. }) if owner == "t1"
    ));

    let err = engine.add_task(task_with_eni("t3")).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::AttachmentClaimed { .. })
    ));
    assert!(engine.get_task_by_arn("t3").await.is_none());

    engine.disable().await;
}

#[tokio::test(start_paused = true)]
async fn test_late_attachment_is_claimed_by_referencing_task() {
    let engine = started().await;
    let mut events = engine.task_events().unwrap();

    engine.add_task(task_with_eni("t1")).await.unwrap();
    engine
        .add_eni_attachment(EniAttachment::new(MAC, Duration::from_secs(1)))
        .await
        .unwrap();

    let attachment = engine.eni_attachment(MAC).unwrap();
    assert_eq!(attachment.status(), AttachmentStatus::Attached);
    assert_eq!(attachment.task_arn(), Some("t1"));

    let ev = loop {
        let ev = next_event(&mut events.tasks).await;
        if ev.kind() == EventKind::Attachment {
            break ev;
        }
    };
    assert_eq!(ev.attachment_status(), Some(AttachmentStatus::Attached));
    assert_eq!(ev.task_arn(), Some("t1"));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(engine.eni_attachment(MAC).is_some());

    engine.disable().await;
}

#[tokio::test]
async fn test_duplicate_and_unknown_attachments() {
    let engine = started().await;

    engine
        .add_eni_attachment(EniAttachment::new(MAC, Duration::from_secs(60)))
        .await
        .unwrap();
    let err = engine
        .add_eni_attachment(EniAttachment::new(MAC, Duration::from_secs(60)))
        .await
        .unwrap_err();
    assert_eq!(err.as_label(), "duplicate_attachment");

    engine
        .add_task(Task::new("t1", vec![Container::new("a", "img-a")]))
        .await
        .unwrap();
    let err = engine
        .claim_eni_attachment("0a:00:00:00:00:99", "t1")
        .await
        .unwrap_err();
    assert_eq!(err.as_label(), "unknown_attachment");

    let err = engine.claim_eni_attachment(MAC, "nobody").await.unwrap_err();
    assert_eq!(err.as_label(), "unknown_task");

    engine.disable().await;
}
