use super::*;
use crate::schedule::Schedule;
use crate::task::{ExecutionResult, ExecutionStatus, NotificationTargets, Task};
use chrono::Utc;
use uuid::Uuid;

fn result_for(task: &Task) -> ExecutionResult {
    ExecutionResult {
        id: Uuid::new_v4(),
        task_id: task.id,
        due_at: Utc::now(),
        started_at: Utc::now(),
        duration_ms: 12,
        status: ExecutionStatus::Failure,
        exit_code: Some(1),
        output: "boom".to_string(),
        server_id: "node-a".to_string(),
    }
}

#[tokio::test]
async fn test_publish_subscribe() {
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    let task_id = Uuid::new_v4();
    bus.publish(SchedulerEvent::TaskDeferred {
        task_id,
        due_at: Utc::now(),
        reason: DeferReason::Maintenance,
    });

    let event = rx.recv().await.unwrap();
    assert_eq!(event.task_id(), task_id);
    match event {
        SchedulerEvent::TaskDeferred { reason, .. } => {
            assert_eq!(reason, DeferReason::Maintenance);
        }
        _ => panic!("unexpected event type"),
    }
}

#[tokio::test]
async fn test_multiple_subscribers() {
    let bus = EventBus::new(16);
    let mut rx1 = bus.subscribe();
    let mut rx2 = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);

    let task_id = Uuid::new_v4();
    let count = bus.publish(SchedulerEvent::RetentionApplied {
        task_id,
        deleted: 3,
    });
    assert_eq!(count, 2);

    assert_eq!(rx1.recv().await.unwrap().task_id(), task_id);
    assert_eq!(rx2.recv().await.unwrap().task_id(), task_id);
}

#[test]
fn test_publish_without_subscribers() {
    let bus = EventBus::default();
    let delivered = bus.publish(SchedulerEvent::RetentionApplied {
        task_id: Uuid::nil(),
        deleted: 0,
    });
    assert_eq!(delivered, 0);
}

#[test]
fn test_notification_intent_requires_targets() {
    let mut task = Task::new("Nightly", "nightly:run", Schedule::frequency("daily"));
    let result = result_for(&task);
    assert!(NotificationIntent::for_result(&task, &result).is_none());

    task.notifications = NotificationTargets {
        webhook: Some("https://example.com/hook".to_string()),
        ..Default::default()
    };
    let intent = NotificationIntent::for_result(&task, &result).unwrap();
    assert_eq!(intent.task_id, task.id);
    assert_eq!(intent.result.status, ExecutionStatus::Failure);
}

#[test]
fn test_event_serialization() {
    let event = SchedulerEvent::TaskDeferred {
        task_id: Uuid::nil(),
        due_at: Utc::now(),
        reason: DeferReason::LockHeld,
    };
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("\"type\":\"task_deferred\""));
    assert!(json.contains("\"reason\":\"lock_held\""));
}

#[tokio::test]
async fn test_notification_receiver_skips_other_events() {
    let bus = EventBus::new(16);
    let mut notifications = bus.notifications();

    let mut task = Task::new("Alerts", "alerts:run", Schedule::frequency("hourly"));
    task.notifications = NotificationTargets {
        email: Some("ops@example.com".to_string()),
        ..Default::default()
    };
    let result = result_for(&task);

    bus.publish(SchedulerEvent::ExecutionFinished {
        task_id: task.id,
        result: result.clone(),
    });
    bus.publish(SchedulerEvent::NotificationRequested(
        NotificationIntent::for_result(&task, &result).unwrap(),
    ));

    let intent = notifications.recv().await.unwrap();
    assert_eq!(intent.task_id, task.id);
    assert_eq!(intent.targets.email.as_deref(), Some("ops@example.com"));

    drop(bus);
    assert!(notifications.recv().await.is_none());
}

#[tokio::test]
async fn test_notification_receiver_survives_lag() {
    let bus = EventBus::new(1);
    let mut notifications = bus.notifications();

    let task = Task::new("Lagged", "noop", Schedule::frequency("hourly"));
    for deleted in 0..3 {
        bus.publish(SchedulerEvent::RetentionApplied {
            task_id: task.id,
            deleted,
        });
    }
    let mut result = result_for(&task);
    result.status = ExecutionStatus::Success;
    bus.publish(SchedulerEvent::NotificationRequested(NotificationIntent {
        task_id: task.id,
        description: task.description.clone(),
        targets: NotificationTargets::default(),
        result,
    }));

    let intent = notifications.recv().await.unwrap();
    assert_eq!(intent.result.status, ExecutionStatus::Success);
}
