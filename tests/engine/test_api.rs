//! HTTP boundary: status codes, body shapes and the acting-user header.

use actix_web::test;
use serde_json::json;

use tcms_lib::models::ObjectId;

use super::test_helpers::*;

#[actix_rt::test]
async fn test_health_and_ready() {
    let fx = Fixture::new();
    let app = create_test_app(&fx).await;

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");

    let req = test::TestRequest::get().uri("/api/v1/ready").to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ready");
}

#[actix_rt::test]
async fn test_create_get_and_delete_execution() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Signup", 2);
    let app = create_test_app(&fx).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/executions")
        .insert_header(("X-User", "carol"))
        .set_json(json!({
            "testCaseId": test_case.id.to_string(),
            "cycleId": fx.cycle.id.to_string(),
        }))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 201);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["user"], "carol");
    assert_eq!(body["testSteps"].as_array().unwrap().len(), 2);
    assert_eq!(body["testSteps"][0]["artifacts"], json!([]));
    let id = body["_id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/executions/{}", id))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["_id"], id.as_str());

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/executions?cycleId={}", fx.cycle.id))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/executions/{}", id))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 204);
    assert_eq!(body, serde_json::Value::Null);
}

#[actix_rt::test]
async fn test_error_bodies() {
    let fx = Fixture::new();
    let app = create_test_app(&fx).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/executions/not-an-object-id")
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "INVALID_INPUT");

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/executions/{}", ObjectId::new()))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "NOT_FOUND");

    let req = test::TestRequest::post()
        .uri("/api/v1/executions")
        .set_json(json!({ "testCaseId": ObjectId::new().to_string() }))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "INVALID_INPUT");
}

#[actix_rt::test]
async fn test_put_ignores_ownership_and_empty_put_resets() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Search", 2);
    let execution = fx
        .executions
        .create("carol", fx.create_request(&test_case))
        .await
        .unwrap();
    fx.executions
        .update_step_status(execution.id, 0, tcms_lib::models::ExecutionStatus::Failed)
        .await
        .unwrap();
    let app = create_test_app(&fx).await;
    let uri = format!("/api/v1/executions/{}", execution.id);

    let req = test::TestRequest::put()
        .uri(&uri)
        .insert_header(("X-User", "dave"))
        .set_json(json!({
            "title": "Search (mobile)",
            "cycleId": ObjectId::new().to_string(),
            "testSteps": [],
        }))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["title"], "Search (mobile)");
    assert_eq!(body["cycleId"], fx.cycle.id.to_string());
    assert_eq!(body["testSteps"].as_array().unwrap().len(), 2);
    assert_eq!(body["testSteps"][0]["status"], "FAILED");
    assert_eq!(body["user"], "dave");

    let req = test::TestRequest::put().uri(&uri).to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["testSteps"][0]["status"], "PENDING");
    assert_eq!(body["user"], "anonymous");

    let req = test::TestRequest::put()
        .uri(&uri)
        .insert_header(("Content-Type", "application/json"))
        .set_payload("[1, 2]")
        .to_request();
    let (status, _) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 400);
}

#[actix_rt::test]
async fn test_step_routes() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Steps", 2);
    let execution = fx
        .executions
        .create("carol", fx.create_request(&test_case))
        .await
        .unwrap();
    let app = create_test_app(&fx).await;

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/executions/{}/steps/1/status", execution.id))
        .set_json(json!({ "status": "WARNING" }))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["testSteps"][1]["status"], "WARNING");
    assert_eq!(body["testSteps"][1]["action"], "action 1");

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/executions/{}/steps/2/status", execution.id))
        .set_json(json!({ "status": "WARNING" }))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "INVALID_INPUT");

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/executions/{}/steps/-1/status", execution.id))
        .set_json(json!({ "status": "WARNING" }))
        .to_request();
    let (status, _) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 400);

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/executions/{}/status", execution.id))
        .insert_header(("X-User", "erin"))
        .set_json(json!({ "status": "SUCCESSFUL" }))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "SUCCESSFUL");
    assert_eq!(body["user"], "erin");
    assert!(body["finishedAt"].is_string());
}

#[actix_rt::test]
async fn test_multipart_attach() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Upload", 1);
    let execution = fx
        .executions
        .create("carol", fx.create_request(&test_case))
        .await
        .unwrap();
    let app = create_test_app(&fx).await;
    let boundary = "----tcms-boundary";

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/executions/{}/steps/0/artifacts", execution.id))
        .insert_header(("X-User", "frank"))
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={}", boundary),
        ))
        .set_payload(multipart_body(
            boundary,
            &[("shot.png", &b"png"[..]), ("..evil.txt", &b"x"[..])],
        ))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], false);
    assert_eq!(body["files"][0]["success"], true);
    assert_eq!(body["files"][1]["success"], false);

    let artifact_id = body["files"][0]["artifactId"].as_str().unwrap();
    let stored = fx.executions.get(execution.id).await.unwrap();
    assert_eq!(stored.test_steps[0].artifacts.len(), 1);
    assert_eq!(stored.test_steps[0].artifacts[0].to_string(), artifact_id);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/executions/{}/steps/0/artifacts", execution.id))
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={}", boundary),
        ))
        .set_payload(multipart_body(boundary, &[]))
        .to_request();
    let (status, _) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 400);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/artifacts/{}", artifact_id))
        .to_request();
    let (status, _) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 204);
}

#[actix_rt::test]
async fn test_multipart_limits() {
    let fx = Fixture::new();
    let test_case = fx.seed_test_case("Limits", 1);
    let execution = fx
        .executions
        .create("carol", fx.create_request(&test_case))
        .await
        .unwrap();
    let app = create_test_app(&fx).await;
    let boundary = "----tcms-boundary";
    let uri = format!("/api/v1/executions/{}/steps/0/artifacts", execution.id);
    let content_type = format!("multipart/form-data; boundary={}", boundary);

    // An oversized file fails on its own; the file after it is still read
    let oversized = vec![b'x'; TEST_MAX_ARTIFACT_SIZE * 8];
    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(("Content-Type", content_type.clone()))
        .set_payload(multipart_body(
            boundary,
            &[("big.bin", &oversized[..]), ("small.txt", &b"ok"[..])],
        ))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["files"][0]["success"], false);
    assert_eq!(
        body["files"][0]["error"],
        format!(
            "Invalid input: File exceeds the {} byte limit",
            TEST_MAX_ARTIFACT_SIZE
        )
    );
    assert_eq!(body["files"][1]["success"], true);

    let stored = fx.executions.get(execution.id).await.unwrap();
    assert_eq!(stored.test_steps[0].artifacts.len(), 1);

    // One file past the per-request cap rejects the whole request
    let names: Vec<String> = (0..=fx.executions.max_files_per_request())
        .map(|i| format!("{}.txt", i))
        .collect();
    let parts: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), &b"f"[..])).collect();
    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(("Content-Type", content_type))
        .set_payload(multipart_body(boundary, &parts))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "INVALID_INPUT");

    let stored = fx.executions.get(execution.id).await.unwrap();
    assert_eq!(stored.test_steps[0].artifacts.len(), 1);
}

#[actix_rt::test]
async fn test_pool_over_http() {
    let fx = Fixture::new();
    let first = fx.seed_test_case("First", 1);
    let second = fx.seed_test_case("Second", 1);
    let test_set = fx.seed_test_set(&[&first, &second]);
    let app = create_test_app(&fx).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/test-set-executions")
        .insert_header(("X-User", "lead"))
        .set_json(json!({
            "testSetId": test_set.id.to_string(),
            "projectId": fx.cycle.project_id.to_string(),
        }))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 201);
    assert_eq!(body["status"], "PLANNED");
    let run_id = body["_id"].as_str().unwrap().to_string();

    let pending_uri = format!("/api/v1/test-set-executions/{}/pending", run_id);
    let claim_uri = format!("/api/v1/test-set-executions/{}/claim", run_id);

    let req = test::TestRequest::get().uri(&pending_uri).to_request();
    let (_, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(body["hasPending"], true);

    let mut claimed = Vec::new();
    for _ in 0..2 {
        let req = test::TestRequest::post().uri(&claim_uri).to_request();
        let (status, body) = into_json(test::call_service(&app, req).await).await;
        assert_eq!(status, 200);
        assert_eq!(body["done"], false);
        assert_eq!(body["execution"]["status"], "WORKING");
        claimed.push(body["execution"]["_id"].as_str().unwrap().to_string());
    }
    assert_ne!(claimed[0], claimed[1]);

    let req = test::TestRequest::post().uri(&claim_uri).to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "done": true }));

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/test-set-executions/{}", run_id))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "FINISHED");
    assert_eq!(body["progress"]["working"], 2);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/test-set-executions/{}/abandon", run_id))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ABANDONED");

    let req = test::TestRequest::get().uri(&pending_uri).to_request();
    let (_, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(body["hasPending"], false);

    let req = test::TestRequest::post()
        .uri(&format!(
            "/api/v1/test-set-executions/{}/claim",
            ObjectId::new()
        ))
        .to_request();
    let (status, body) = into_json(test::call_service(&app, req).await).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "NOT_FOUND");
}
