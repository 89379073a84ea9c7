//! API endpoint modules.

pub mod actor;
pub mod executions;
pub mod health;
pub mod openapi;
pub mod test_set_executions;

pub use actor::Actor;
pub use executions::configure_routes as configure_execution_routes;
pub use health::configure_health_routes;
pub use openapi::ApiDoc;
pub use test_set_executions::configure_routes as configure_test_set_execution_routes;

use actix_web::web;

/// Mount every API route under `/api/v1`.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(configure_health_routes)
            .configure(configure_execution_routes)
            .configure(configure_test_set_execution_routes),
    );
}
