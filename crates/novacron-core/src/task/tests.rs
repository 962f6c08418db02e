use super::*;
use chrono::TimeZone;

fn sample_task(schedule: Schedule) -> Task {
    let mut task = Task::new("Prune sessions", "sessions:prune", schedule);
    task.parameters = Some("--days=7".to_string());
    task
}

fn result_at(start_secs: i64, duration_ms: i64) -> ExecutionResult {
    let started_at = Utc.timestamp_opt(1_700_000_000 + start_secs, 0).unwrap();
    ExecutionResult {
        id: Uuid::new_v4(),
        task_id: Uuid::nil(),
        due_at: started_at,
        started_at,
        duration_ms,
        status: ExecutionStatus::Success,
        exit_code: Some(0),
        output: String::new(),
        server_id: "node-a".to_string(),
    }
}

#[test]
fn test_notification_targets_normalized() {
    let targets = NotificationTargets {
        email: Some("  ".to_string()),
        phone: Some(" 441234567890 ".to_string()),
        webhook: None,
    }
    .normalized();

    assert_eq!(targets.email, None);
    assert_eq!(targets.phone.as_deref(), Some("441234567890"));
    assert!(!targets.is_empty());
    assert!(NotificationTargets::default().is_empty());
}

#[test]
fn test_notification_targets_valid() {
    let targets = NotificationTargets {
        email: Some("ops@example.com".to_string()),
        phone: Some("14155552671".to_string()),
        webhook: Some("https://hooks.slack.com/services/T000/B000/XXX".to_string()),
    };
    assert!(targets.validate().is_ok());
}

#[test]
fn test_notification_targets_validated_independently() {
    let bad_email = NotificationTargets {
        email: Some("not-an-email".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        bad_email.validate(),
        Err(SchedulerError::Validation { ref field, .. }) if field == "notification_email"
    ));

    let bad_phone = NotificationTargets {
        phone: Some("+1 415 555".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        bad_phone.validate(),
        Err(SchedulerError::Validation { ref field, .. }) if field == "notification_phone"
    ));

    let bad_webhook = NotificationTargets {
        webhook: Some("ftp://example.com/hook".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        bad_webhook.validate(),
        Err(SchedulerError::Validation { ref field, .. }) if field == "notification_webhook"
    ));

    let relative_webhook = NotificationTargets {
        webhook: Some("/hooks/1".to_string()),
        ..Default::default()
    };
    assert!(relative_webhook.validate().is_err());
}

#[test]
fn test_auto_cleanup() {
    assert!(!AutoCleanup::default().is_enabled());
    assert_eq!(AutoCleanup::default().kind, CleanupType::Days);
    assert!(AutoCleanup::by_age(30).is_enabled());
    assert_eq!(AutoCleanup::by_count(5).kind, CleanupType::Results);
    assert!(!AutoCleanup::by_count(0).is_enabled());

    let json = serde_json::to_string(&AutoCleanup::by_count(5)).unwrap();
    assert_eq!(json, r#"{"type":"results","threshold":5}"#);
}

#[test]
fn test_status_round_trip_through_storage_names() {
    for status in [
        TaskStatus::Idle,
        TaskStatus::Running,
        TaskStatus::Succeeded,
        TaskStatus::Failed,
    ] {
        assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
    }
    assert!("paused".parse::<TaskStatus>().is_err());
    assert_eq!("timeout".parse::<ExecutionStatus>().unwrap(), ExecutionStatus::Timeout);
    assert!(!ExecutionStatus::Timeout.is_success());
}

#[test]
fn test_command_line_and_label() {
    let task = sample_task(Schedule::frequency("everyFiveMinutes"));
    assert_eq!(task.command_line(), "sessions:prune --days=7");
    assert_eq!(task.schedule_label(), "Prune sessions - everyFiveMinutes");

    let mut task = sample_task(Schedule::cron("0 3 * * *"));
    task.parameters = None;
    assert_eq!(task.command_line(), "sessions:prune");
    assert_eq!(task.schedule_label(), "0 3 * * *");
}

#[test]
fn test_result_overlap_windows() {
    let first = result_at(0, 10_000);
    let inside = result_at(5, 1_000);
    let adjacent = result_at(10, 1_000);

    assert!(first.overlaps(&inside));
    assert!(inside.overlaps(&first));
    // [start, finish) windows: touching is not overlapping
    assert!(!first.overlaps(&adjacent));
    assert_eq!(first.finished_at(), adjacent.started_at);
}

#[test]
fn test_draft_schedule_builders_clear_the_other_representation() {
    let draft = TaskDraft::new("Backup", "backup:run")
        .with_frequency("dailyAt")
        .with_frequency_parameters(vec!["02:00".to_string()])
        .with_cron("0 2 * * *");
    assert_eq!(draft.expression.as_deref(), Some("0 2 * * *"));
    assert!(draft.frequency.is_none());
    assert!(draft.frequency_parameters.is_empty());

    let draft = draft.with_frequency("hourly");
    assert!(draft.expression.is_none());
    assert_eq!(draft.frequency.as_deref(), Some("hourly"));
}

#[test]
fn test_draft_from_task() {
    let mut task = sample_task(Schedule::frequency_with("dailyAt", vec!["13:00".into()]));
    task.dont_overlap = true;
    task.auto_cleanup = AutoCleanup::by_count(10);

    let draft = TaskDraft::from_task(&task);
    assert_eq!(draft.frequency.as_deref(), Some("dailyAt"));
    assert_eq!(draft.frequency_parameters, vec!["13:00".to_string()]);
    assert!(draft.expression.is_none());
    assert!(draft.dont_overlap);
    assert_eq!(draft.auto_cleanup, AutoCleanup::by_count(10));
}

#[test]
fn test_outcome_result_accessor() {
    let result = result_at(0, 5);
    assert_eq!(
        ExecutionOutcome::Completed(result.clone()).result(),
        Some(&result)
    );
    assert!(ExecutionOutcome::SkippedOverlap.result().is_none());
}
