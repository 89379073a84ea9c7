//! Test-set execution (pooled run) endpoints.

use actix_web::{HttpResponse, web};

use crate::api::actor::Actor;
use crate::error::AppResult;
use crate::models::{
    ClaimResponse, HasPendingResponse, ObjectId, SpawnTestSetExecutionRequest, TestSetExecution,
    TestSetExecutionDetail,
};
use crate::services::PoolManager;

/// Spawn a run of a test set.
///
/// Creates one PENDING execution per test case currently in the set.
#[utoipa::path(
    post,
    path = "/api/v1/test-set-executions",
    tag = "Test Set Executions",
    request_body = SpawnTestSetExecutionRequest,
    responses(
        (status = 201, description = "Run created", body = TestSetExecution),
        (status = 400, description = "Missing or malformed reference", body = crate::error::ErrorResponse),
        (status = 404, description = "Test set or one of its test cases not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn spawn_test_set_execution(
    actor: Actor,
    pool: web::Data<PoolManager>,
    body: web::Json<SpawnTestSetExecutionRequest>,
) -> AppResult<HttpResponse> {
    let run = pool.spawn(body.into_inner(), actor.name()).await?;
    Ok(HttpResponse::Created().json(run))
}

/// Get a run with its progress.
#[utoipa::path(
    get,
    path = "/api/v1/test-set-executions/{id}",
    tag = "Test Set Executions",
    params(("id" = String, Path, description = "Test set execution id")),
    responses(
        (status = 200, description = "Run with progress counts", body = TestSetExecutionDetail),
        (status = 404, description = "Run not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_test_set_execution(
    pool: web::Data<PoolManager>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = ObjectId::parse(&path)?;
    Ok(HttpResponse::Ok().json(pool.get(id).await?))
}

/// Claim the next pending execution.
///
/// Returns `{done: true}` once the pool is exhausted; workers should stop
/// polling then.
#[utoipa::path(
    post,
    path = "/api/v1/test-set-executions/{id}/claim",
    tag = "Test Set Executions",
    params(("id" = String, Path, description = "Test set execution id")),
    responses(
        (status = 200, description = "Claimed execution or end of pool", body = ClaimResponse),
        (status = 404, description = "Run not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn claim_next(
    pool: web::Data<PoolManager>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = ObjectId::parse(&path)?;
    let claim = pool.claim_next(id).await?;
    Ok(HttpResponse::Ok().json(ClaimResponse::from(claim)))
}

/// Check for pending executions without claiming.
#[utoipa::path(
    get,
    path = "/api/v1/test-set-executions/{id}/pending",
    tag = "Test Set Executions",
    params(("id" = String, Path, description = "Test set execution id")),
    responses(
        (status = 200, description = "Pending check", body = HasPendingResponse),
        (status = 404, description = "Run not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn has_pending(
    pool: web::Data<PoolManager>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = ObjectId::parse(&path)?;
    let has_pending = pool.has_pending(id).await?;
    Ok(HttpResponse::Ok().json(HasPendingResponse { has_pending }))
}

/// Abandon a run. Claims stop; existing executions keep their state.
#[utoipa::path(
    post,
    path = "/api/v1/test-set-executions/{id}/abandon",
    tag = "Test Set Executions",
    params(("id" = String, Path, description = "Test set execution id")),
    responses(
        (status = 200, description = "Abandoned run", body = TestSetExecution),
        (status = 404, description = "Run not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn abandon_test_set_execution(
    actor: Actor,
    pool: web::Data<PoolManager>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = ObjectId::parse(&path)?;
    Ok(HttpResponse::Ok().json(pool.abandon(id, actor.name()).await?))
}

/// Configure test set execution routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/test-set-executions").route(web::post().to(spawn_test_set_execution)),
    )
    .service(
        web::resource("/test-set-executions/{id}").route(web::get().to(get_test_set_execution)),
    )
    .service(web::resource("/test-set-executions/{id}/claim").route(web::post().to(claim_next)))
    .service(web::resource("/test-set-executions/{id}/pending").route(web::get().to(has_pending)))
    .service(
        web::resource("/test-set-executions/{id}/abandon")
            .route(web::post().to(abandon_test_set_execution)),
    );
}
