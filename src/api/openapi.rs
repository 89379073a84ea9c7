//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Test Case Management Server",
        version = "0.1.0",
        description = "Execution lifecycle and pooled test-set runs"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Execution endpoints
        api::executions::create_execution,
        api::executions::list_executions,
        api::executions::get_execution,
        api::executions::update_execution,
        api::executions::reset_execution,
        api::executions::update_execution_status,
        api::executions::update_step,
        api::executions::update_step_status,
        api::executions::attach_step_artifacts,
        api::executions::delete_execution,
        api::executions::delete_artifact,
        // Test set execution endpoints
        api::test_set_executions::spawn_test_set_execution,
        api::test_set_executions::get_test_set_execution,
        api::test_set_executions::claim_next,
        api::test_set_executions::has_pending,
        api::test_set_executions::abandon_test_set_execution,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Executions
            models::ExecutionStatus,
            models::ExecutionType,
            models::ExecutionStep,
            models::Execution,
            models::CreateExecutionRequest,
            models::ExecutionUpdate,
            models::StatusRequest,
            models::ArtifactType,
            models::Artifact,
            models::AttachedFile,
            models::AttachArtifactsResponse,
            // Test set executions
            models::TestSetExecutionStatus,
            models::TestSetExecution,
            models::SpawnTestSetExecutionRequest,
            models::PoolProgress,
            models::TestSetExecutionDetail,
            models::ClaimResponse,
            models::HasPendingResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Executions", description = "Execution lifecycle, steps and artifacts"),
        (name = "Test Set Executions", description = "Pooled runs of a test set"),
    ),
    modifiers(&UserHeaderAddon)
)]
pub struct ApiDoc;

/// Document the acting-user header.
struct UserHeaderAddon;

impl utoipa::Modify for UserHeaderAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "user",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new(crate::config::USER_HEADER),
                    ),
                ),
            );
        }
    }
}
