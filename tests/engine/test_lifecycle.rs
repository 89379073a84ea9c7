//! Execution lifecycle: create, reset, field and status edits, step edits.

use chrono::{Duration, Utc};

use tcms_lib::error::AppError;
use tcms_lib::models::{
    CreateExecutionRequest, Execution, ExecutionQuery, ExecutionStatus, ExecutionStep,
    ExecutionType, ExecutionUpdate, ObjectId,
};
use tcms_lib::store::EntityStore;

use super::test_helpers::*;

#[actix_rt::test]
async fn test_create_snapshots_template_steps() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Login", 3);

    let execution = fx
        .executions
        .create("alice", fx.create_request(&test_case))
        .await
        .unwrap();

    assert_eq!(execution.test_steps.len(), 3);
    for (step, template) in execution.test_steps.iter().zip(&test_case.test_steps) {
        assert_eq!(step.action, template.action);
        assert_eq!(step.payload, template.payload);
        assert_eq!(step.expected, template.expected);
        assert_eq!(step.status, ExecutionStatus::Pending);
        assert!(step.artifacts.is_empty(), "template artifacts leaked");
    }
    assert_eq!(execution.status, ExecutionStatus::Pending);
    assert_eq!(execution.execution_type, ExecutionType::Manual);
    assert_eq!(execution.title, "Login");
    assert_eq!(execution.test_case_id, test_case.id);
    assert_eq!(execution.cycle_id, fx.cycle.id);
    assert_eq!(execution.test_set_execution_id, None);
    assert_eq!(execution.user.as_deref(), Some("alice"));

    let stored = fx.executions.get(execution.id).await.unwrap();
    assert_eq!(stored, execution);
}

#[actix_rt::test]
async fn test_create_with_explicit_initial_status() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Checkout", 1);

    let execution = fx
        .executions
        .create(
            "bot",
            CreateExecutionRequest {
                status: Some(ExecutionStatus::Working),
                execution_type: Some(ExecutionType::Automated),
                ..fx.create_request(&test_case)
            },
        )
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Working);
    assert_eq!(execution.execution_type, ExecutionType::Automated);
    assert!(execution.started_at.is_some());
}

#[actix_rt::test]
async fn test_create_requires_valid_references() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Search", 1);

    let missing_cycle = CreateExecutionRequest {
        cycle_id: None,
        ..fx.create_request(&test_case)
    };
    assert!(matches!(
        fx.executions.create("alice", missing_cycle).await,
        Err(AppError::InvalidInput(_))
    ));

    let malformed = CreateExecutionRequest {
        test_case_id: Some("not-an-id".to_string()),
        ..fx.create_request(&test_case)
    };
    assert!(matches!(
        fx.executions.create("alice", malformed).await,
        Err(AppError::InvalidInput(_))
    ));

    let unknown = CreateExecutionRequest {
        test_case_id: Some(ObjectId::new().to_string()),
        ..fx.create_request(&test_case)
    };
    assert!(matches!(
        fx.executions.create("alice", unknown).await,
        Err(AppError::NotFound(_))
    ));
}

#[actix_rt::test]
async fn test_template_edits_do_not_touch_existing_executions() {
    let fx = Fixture::new();
    let mut test_case = fx.seed_test_case("Profile", 2);
    let execution = fx
        .executions
        .create("alice", fx.create_request(&test_case))
        .await
        .unwrap();

    test_case.test_steps = make_steps(5);
    test_case.title = "Profile v2".to_string();
    fx.store.put_test_case(test_case).unwrap();

    let stored = fx.executions.get(execution.id).await.unwrap();
    assert_eq!(stored.test_steps.len(), 2);
    assert_eq!(stored.title, "Profile");
}

#[actix_rt::test]
async fn test_reset_is_idempotent() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Logout", 2);
    let execution = fx
        .executions
        .create("alice", fx.create_request(&test_case))
        .await
        .unwrap();
    fx.executions
        .update_step_status(execution.id, 1, ExecutionStatus::Failed)
        .await
        .unwrap();
    fx.executions
        .update_status(execution.id, ExecutionStatus::Failed, "alice")
        .await
        .unwrap();

    let first = fx.executions.reset(execution.id, "bob").await.unwrap();
    let second = fx.executions.reset(execution.id, "bob").await.unwrap();

    assert_eq!(first.test_steps, second.test_steps);
    assert_eq!(first.status, second.status);
    assert_eq!(second.status, ExecutionStatus::Pending);
    assert!(
        second
            .test_steps
            .iter()
            .all(|s| s.status == ExecutionStatus::Pending)
    );
    assert!(second.started_at.is_none());
    assert!(second.finished_at.is_none());
    assert_eq!(second.user.as_deref(), Some("bob"));
}

#[actix_rt::test]
async fn test_reset_pulls_current_template_but_field_edits_do_not() {
    let fx = Fixture::new();
    let mut test_case = fx.seed_test_case("Upload", 2);
    let execution = fx
        .executions
        .create("alice", fx.create_request(&test_case))
        .await
        .unwrap();

    test_case.test_steps = make_steps(4);
    fx.store.put_test_case(test_case).unwrap();

    let edited = fx
        .executions
        .update_fields(
            execution.id,
            ExecutionUpdate {
                title: Some("Renamed".to_string()),
                ..Default::default()
            },
            "alice",
        )
        .await
        .unwrap();
    assert_eq!(edited.test_steps.len(), 2);
    assert_eq!(edited.title, "Renamed");

    let reset = fx.executions.reset(execution.id, "alice").await.unwrap();
    assert_eq!(reset.test_steps.len(), 4);
    assert!(reset.test_steps.iter().all(|s| s.artifacts.is_empty()));
}

#[actix_rt::test]
async fn test_reset_fails_when_test_case_is_gone() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Legacy", 1);
    let execution = fx
        .executions
        .create("alice", fx.create_request(&test_case))
        .await
        .unwrap();
    fx.executions
        .update_status(execution.id, ExecutionStatus::Successful, "alice")
        .await
        .unwrap();

    assert!(fx.store.remove_test_case(test_case.id).unwrap());

    let result = fx.executions.reset(execution.id, "alice").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    // Nothing was touched
    let stored = fx.executions.get(execution.id).await.unwrap();
    assert_eq!(stored.status, ExecutionStatus::Successful);
    assert_eq!(stored.test_steps.len(), 1);
}

#[actix_rt::test]
async fn test_field_update_ignores_ownership_fields() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Cart", 1);
    let execution = fx
        .executions
        .create("alice", fx.create_request(&test_case))
        .await
        .unwrap();

    let update: ExecutionUpdate = serde_json::from_value(serde_json::json!({
        "_id": ObjectId::new().to_string(),
        "cycleId": ObjectId::new().to_string(),
        "testCaseId": ObjectId::new().to_string(),
        "testSetExecutionId": ObjectId::new().to_string(),
        "createdAt": "2000-01-01T00:00:00Z",
        "description": null
    }))
    .unwrap();

    let updated = fx
        .executions
        .update_fields(execution.id, update, "bob")
        .await
        .unwrap();

    assert_eq!(updated.id, execution.id);
    assert_eq!(updated.cycle_id, execution.cycle_id);
    assert_eq!(updated.test_case_id, execution.test_case_id);
    assert_eq!(updated.test_set_execution_id, None);
    assert_eq!(updated.created_at, execution.created_at);
    assert_eq!(updated.description, None);
    assert_eq!(updated.user.as_deref(), Some("bob"));
    assert!(updated.updated_at >= execution.updated_at);
}

#[actix_rt::test]
async fn test_update_status_stamps_times() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Payment", 1);
    let execution = fx
        .executions
        .create("alice", fx.create_request(&test_case))
        .await
        .unwrap();

    let working = fx
        .executions
        .update_status(execution.id, ExecutionStatus::Working, "bob")
        .await
        .unwrap();
    let started_at = working.started_at.expect("startedAt set on WORKING");
    assert_eq!(working.user.as_deref(), Some("bob"));

    let done = fx
        .executions
        .update_status(execution.id, ExecutionStatus::Warning, "bob")
        .await
        .unwrap();
    assert_eq!(done.started_at, Some(started_at));
    assert!(done.finished_at.is_some());
    assert_eq!(done.test_steps, working.test_steps);

    // No transition guard, and going back to PENDING clears finishedAt
    let pending = fx
        .executions
        .update_status(execution.id, ExecutionStatus::Pending, "bob")
        .await
        .unwrap();
    assert_eq!(pending.status, ExecutionStatus::Pending);
    assert!(pending.finished_at.is_none());
}

#[actix_rt::test]
async fn test_update_step_status_touches_only_that_status() {
    let fx = Fixture::new();
    let before = Utc::now() - Duration::minutes(5);
    let execution = Execution {
        id: ObjectId::new(),
        test_case_id: ObjectId::new(),
        cycle_id: fx.cycle.id,
        test_set_execution_id: None,
        title: "Seeded".to_string(),
        description: None,
        test_steps: vec![ExecutionStep {
            action: "click".to_string(),
            payload: "#submit".to_string(),
            expected: "saved".to_string(),
            status: ExecutionStatus::Pending,
            comment: Some("flaky".to_string()),
            artifacts: vec![],
        }],
        status: ExecutionStatus::Working,
        execution_type: ExecutionType::Manual,
        user: Some("alice".to_string()),
        created_at: before,
        updated_at: before,
        started_at: Some(before),
        finished_at: None,
    };
    fx.store.insert_execution(&execution).await.unwrap();

    let updated = fx
        .executions
        .update_step_status(execution.id, 0, ExecutionStatus::Successful)
        .await
        .unwrap();

    let step = &updated.test_steps[0];
    assert_eq!(step.status, ExecutionStatus::Successful);
    assert_eq!(step.action, "click");
    assert_eq!(step.payload, "#submit");
    assert_eq!(step.expected, "saved");
    assert_eq!(step.comment.as_deref(), Some("flaky"));
    assert!(updated.updated_at > before);
    assert_eq!(updated.status, ExecutionStatus::Working);
}

#[actix_rt::test]
async fn test_update_step_replaces_whole_step() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Settings", 2);
    let execution = fx
        .executions
        .create("alice", fx.create_request(&test_case))
        .await
        .unwrap();

    let replacement = ExecutionStep {
        action: "toggle".to_string(),
        payload: "dark mode".to_string(),
        expected: "theme changes".to_string(),
        status: ExecutionStatus::Failed,
        comment: Some("stays light".to_string()),
        artifacts: vec![],
    };
    let updated = fx
        .executions
        .update_step(execution.id, 1, replacement.clone())
        .await
        .unwrap();

    assert_eq!(updated.test_steps.len(), 2);
    assert_eq!(updated.test_steps[1], replacement);
    assert_eq!(updated.test_steps[0], execution.test_steps[0]);
}

#[actix_rt::test]
async fn test_step_index_out_of_range_is_rejected() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Tiny", 1);
    let execution = fx
        .executions
        .create("alice", fx.create_request(&test_case))
        .await
        .unwrap();

    assert!(matches!(
        fx.executions
            .update_step_status(execution.id, 1, ExecutionStatus::Failed)
            .await,
        Err(AppError::InvalidInput(_))
    ));
    assert!(matches!(
        fx.executions
            .update_step(execution.id, 7, ExecutionStep::default())
            .await,
        Err(AppError::InvalidInput(_))
    ));
    assert!(matches!(
        fx.executions
            .update_step_status(ObjectId::new(), 0, ExecutionStatus::Failed)
            .await,
        Err(AppError::NotFound(_))
    ));
}

#[actix_rt::test]
async fn test_list_filters_and_delete() {
    let fx = Fixture::new();
    let a = fx.seed_test_case("A", 1);
    let b = fx.seed_test_case("B", 1);
    let first = fx
        .executions
        .create("alice", fx.create_request(&a))
        .await
        .unwrap();
    let second = fx
        .executions
        .create("alice", fx.create_request(&b))
        .await
        .unwrap();
    fx.executions
        .update_status(second.id, ExecutionStatus::Failed, "alice")
        .await
        .unwrap();

    let all = fx
        .executions
        .list(&ExecutionQuery {
            cycle_id: Some(fx.cycle.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(
        all.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );

    let failed = fx
        .executions
        .list(&ExecutionQuery {
            status: Some(ExecutionStatus::Failed),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, second.id);

    fx.executions.delete(first.id).await.unwrap();
    assert!(matches!(
        fx.executions.delete(first.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        fx.executions.get(first.id).await,
        Err(AppError::NotFound(_))
    ));
}
