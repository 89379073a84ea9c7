//! Execution endpoints.

use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures_util::StreamExt;

use crate::api::actor::Actor;
use crate::error::{AppError, AppResult};
use crate::models::{
    AttachArtifactsResponse, CreateExecutionRequest, Execution, ExecutionQuery, ExecutionStep,
    ExecutionUpdate, ObjectId, StatusRequest, UploadedFile,
};
use crate::services::ExecutionService;

/// Decode a `PUT /executions/{id}` body.
///
/// `None` means the body asks for a reset: empty, `null` or `{}`.
pub fn parse_update_body(body: &[u8]) -> AppResult<Option<ExecutionUpdate>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    match serde_json::from_slice::<serde_json::Value>(body)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) if map.is_empty() => Ok(None),
        value @ serde_json::Value::Object(_) => Ok(Some(serde_json::from_value(value)?)),
        _ => Err(AppError::InvalidInput(
            "Update body must be a JSON object".to_string(),
        )),
    }
}

fn parse_step_index(raw: &str) -> AppResult<usize> {
    raw.parse::<usize>()
        .map_err(|_| AppError::InvalidInput(format!("Invalid step index: {}", raw)))
}

/// Create an execution from a test case.
#[utoipa::path(
    post,
    path = "/api/v1/executions",
    tag = "Executions",
    request_body = CreateExecutionRequest,
    responses(
        (status = 201, description = "Execution created", body = Execution),
        (status = 400, description = "Missing or malformed reference", body = crate::error::ErrorResponse),
        (status = 404, description = "Test case not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn create_execution(
    actor: Actor,
    service: web::Data<ExecutionService>,
    body: web::Json<CreateExecutionRequest>,
) -> AppResult<HttpResponse> {
    let execution = service.create(actor.name(), body.into_inner()).await?;
    Ok(HttpResponse::Created().json(execution))
}

/// List executions.
#[utoipa::path(
    get,
    path = "/api/v1/executions",
    tag = "Executions",
    params(
        ("cycleId" = Option<String>, Query, description = "Filter by cycle"),
        ("testCaseId" = Option<String>, Query, description = "Filter by test case"),
        ("testSetExecutionId" = Option<String>, Query, description = "Filter by test set execution"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("limit" = Option<u64>, Query, description = "Page size (default 100, max 500)"),
        ("offset" = Option<u64>, Query, description = "Rows to skip"),
    ),
    responses(
        (status = 200, description = "Executions ordered by id", body = Vec<Execution>),
        (status = 400, description = "Invalid query", body = crate::error::ErrorResponse),
    )
)]
pub async fn list_executions(
    service: web::Data<ExecutionService>,
    query: web::Query<ExecutionQuery>,
) -> AppResult<HttpResponse> {
    let executions = service.list(&query).await?;
    Ok(HttpResponse::Ok().json(executions))
}

/// Get an execution.
#[utoipa::path(
    get,
    path = "/api/v1/executions/{id}",
    tag = "Executions",
    params(("id" = String, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Execution", body = Execution),
        (status = 404, description = "Execution not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_execution(
    service: web::Data<ExecutionService>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = ObjectId::parse(&path)?;
    Ok(HttpResponse::Ok().json(service.get(id).await?))
}

/// Update allow-listed fields, or reset when the body is empty.
///
/// An empty body, `null` or `{}` resets the execution from its test case.
/// Otherwise only title, description, status, executionType, startedAt and
/// finishedAt are applied; every other key is ignored.
#[utoipa::path(
    put,
    path = "/api/v1/executions/{id}",
    tag = "Executions",
    params(("id" = String, Path, description = "Execution id")),
    request_body(content = ExecutionUpdate, description = "Fields to change; empty resets"),
    responses(
        (status = 200, description = "Updated execution", body = Execution),
        (status = 400, description = "Invalid body", body = crate::error::ErrorResponse),
        (status = 404, description = "Execution or its test case not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn update_execution(
    actor: Actor,
    service: web::Data<ExecutionService>,
    path: web::Path<String>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let id = ObjectId::parse(&path)?;
    let execution = match parse_update_body(&body)? {
        None => service.reset(id, actor.name()).await?,
        Some(update) => service.update_fields(id, update, actor.name()).await?,
    };
    Ok(HttpResponse::Ok().json(execution))
}

/// Reset an execution from the current test case template.
#[utoipa::path(
    post,
    path = "/api/v1/executions/{id}/reset",
    tag = "Executions",
    params(("id" = String, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Reset execution", body = Execution),
        (status = 404, description = "Execution or its test case not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn reset_execution(
    actor: Actor,
    service: web::Data<ExecutionService>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = ObjectId::parse(&path)?;
    Ok(HttpResponse::Ok().json(service.reset(id, actor.name()).await?))
}

/// Set the execution status.
#[utoipa::path(
    put,
    path = "/api/v1/executions/{id}/status",
    tag = "Executions",
    params(("id" = String, Path, description = "Execution id")),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Updated execution", body = Execution),
        (status = 404, description = "Execution not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn update_execution_status(
    actor: Actor,
    service: web::Data<ExecutionService>,
    path: web::Path<String>,
    body: web::Json<StatusRequest>,
) -> AppResult<HttpResponse> {
    let id = ObjectId::parse(&path)?;
    let execution = service.update_status(id, body.status, actor.name()).await?;
    Ok(HttpResponse::Ok().json(execution))
}

/// Replace one step.
#[utoipa::path(
    put,
    path = "/api/v1/executions/{id}/steps/{index}",
    tag = "Executions",
    params(
        ("id" = String, Path, description = "Execution id"),
        ("index" = usize, Path, description = "Zero-based step index"),
    ),
    request_body = ExecutionStep,
    responses(
        (status = 200, description = "Updated execution", body = Execution),
        (status = 400, description = "Step index out of range", body = crate::error::ErrorResponse),
        (status = 404, description = "Execution not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn update_step(
    service: web::Data<ExecutionService>,
    path: web::Path<(String, String)>,
    body: web::Json<ExecutionStep>,
) -> AppResult<HttpResponse> {
    let (id, index) = path.into_inner();
    let id = ObjectId::parse(&id)?;
    let index = parse_step_index(&index)?;
    let execution = service.update_step(id, index, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(execution))
}

/// Set the status of one step.
#[utoipa::path(
    put,
    path = "/api/v1/executions/{id}/steps/{index}/status",
    tag = "Executions",
    params(
        ("id" = String, Path, description = "Execution id"),
        ("index" = usize, Path, description = "Zero-based step index"),
    ),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Updated execution", body = Execution),
        (status = 400, description = "Step index out of range", body = crate::error::ErrorResponse),
        (status = 404, description = "Execution not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn update_step_status(
    service: web::Data<ExecutionService>,
    path: web::Path<(String, String)>,
    body: web::Json<StatusRequest>,
) -> AppResult<HttpResponse> {
    let (id, index) = path.into_inner();
    let id = ObjectId::parse(&id)?;
    let index = parse_step_index(&index)?;
    let execution = service.update_step_status(id, index, body.status).await?;
    Ok(HttpResponse::Ok().json(execution))
}

/// Attach files to one step.
///
/// Accepts multipart form data. Each file is stored independently and
/// reported in `files`; `ok` is true only when every file was stored.
#[utoipa::path(
    post,
    path = "/api/v1/executions/{id}/steps/{index}/artifacts",
    tag = "Executions",
    params(
        ("id" = String, Path, description = "Execution id"),
        ("index" = usize, Path, description = "Zero-based step index"),
    ),
    responses(
        (status = 200, description = "Per-file results", body = AttachArtifactsResponse),
        (status = 400, description = "Step index out of range or too many files", body = crate::error::ErrorResponse),
        (status = 404, description = "Execution or cycle not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn attach_step_artifacts(
    actor: Actor,
    service: web::Data<ExecutionService>,
    path: web::Path<(String, String)>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let (id, index) = path.into_inner();
    let id = ObjectId::parse(&id)?;
    let index = parse_step_index(&index)?;

    let max_size = service.max_artifact_size();
    let max_files = service.max_files_per_request();

    let mut files = Vec::new();
    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::InvalidInput(format!("Multipart error: {}", e)))?;

        // Plain form fields carry no filename
        let Some(filename) = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string)
        else {
            continue;
        };
        if files.len() == max_files {
            return Err(AppError::InvalidInput(format!(
                "Too many files (max {} per request)",
                max_files
            )));
        }
        let content_type = field.content_type().map(|m| m.to_string());

        // Past the limit the rest of the field is drained, not buffered; the
        // service rejects the file on its size.
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::InvalidInput(format!("Read error: {}", e)))?;
            if data.len() <= max_size {
                let take = chunk.len().min(max_size + 1 - data.len());
                data.extend_from_slice(&chunk[..take]);
            }
        }

        files.push(UploadedFile {
            filename,
            content_type,
            data,
        });
    }

    if files.is_empty() {
        return Err(AppError::InvalidInput(
            "No files in multipart body".to_string(),
        ));
    }

    let response = service
        .attach_step_artifacts(id, index, files, actor.name())
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Delete an execution.
#[utoipa::path(
    delete,
    path = "/api/v1/executions/{id}",
    tag = "Executions",
    params(("id" = String, Path, description = "Execution id")),
    responses(
        (status = 204, description = "Execution deleted"),
        (status = 404, description = "Execution not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn delete_execution(
    service: web::Data<ExecutionService>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = ObjectId::parse(&path)?;
    service.delete(id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Delete an artifact and its stored file.
#[utoipa::path(
    delete,
    path = "/api/v1/artifacts/{id}",
    tag = "Executions",
    params(("id" = String, Path, description = "Artifact id")),
    responses(
        (status = 204, description = "Artifact deleted"),
        (status = 404, description = "Artifact not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn delete_artifact(
    service: web::Data<ExecutionService>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = ObjectId::parse(&path)?;
    service.delete_artifact(id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Configure execution routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/executions")
            .route(web::get().to(list_executions))
            .route(web::post().to(create_execution)),
    )
    .service(
        web::resource("/executions/{id}")
            .route(web::get().to(get_execution))
            .route(web::put().to(update_execution))
            .route(web::delete().to(delete_execution)),
    )
    .service(web::resource("/executions/{id}/reset").route(web::post().to(reset_execution)))
    .service(
        web::resource("/executions/{id}/status").route(web::put().to(update_execution_status)),
    )
    .service(web::resource("/executions/{id}/steps/{index}").route(web::put().to(update_step)))
    .service(
        web::resource("/executions/{id}/steps/{index}/status")
            .route(web::put().to(update_step_status)),
    )
    .service(
        web::resource("/executions/{id}/steps/{index}/artifacts")
            .route(web::post().to(attach_step_artifacts)),
    )
    .service(web::resource("/artifacts/{id}").route(web::delete().to(delete_artifact)));
}
