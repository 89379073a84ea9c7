//! Test case management server - main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use actix_web::{App, HttpServer, web};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tcms_lib::api::{self, ApiDoc};
use tcms_lib::config::{ArtifactBackend, Config};
use tcms_lib::db::DbPool;
use tcms_lib::error::{AppError, AppResult};
use tcms_lib::middleware::RequestLogger;
use tcms_lib::services::{
    ArtifactStorage, ClaimReaperConfig, ExecutionService, LocalStorage, PoolManager, S3Storage,
    start_claim_reaper,
};
use tcms_lib::store::{EntityStore, MemoryStore};

/// Open the entity store selected by `DATABASE_URL`.
async fn open_store(config: &Config) -> AppResult<Arc<dyn EntityStore>> {
    if config.uses_memory_store() {
        warn!("Using the in-memory entity store - data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = DbPool::connect(&config.database_url, config.db_max_connections).await?;
    info!("Database connection established");
    pool.run_migrations().await?;
    Ok(Arc::new(pool))
}

/// Open the artifact storage backend.
async fn open_storage(config: &Config) -> AppResult<Arc<dyn ArtifactStorage>> {
    match config.artifact_backend {
        ArtifactBackend::S3 => Ok(Arc::new(S3Storage::new(&config.s3).await?)),
        ArtifactBackend::Local => {
            tokio::fs::create_dir_all(&config.artifact_dir)
                .await
                .map_err(|e| {
                    AppError::Storage(format!(
                        "Failed to create artifact directory {}: {}",
                        config.artifact_dir.display(),
                        e
                    ))
                })?;
            info!(
                "Local artifact storage at {}",
                config.artifact_dir.display()
            );
            Ok(Arc::new(LocalStorage::new(&config.artifact_dir)))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        std::process::exit(if Config::from_env().is_ok() { 0 } else { 1 });
    }

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL must point at PostgreSQL");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Test Case Management Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    let store = match open_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to initialize entity store: {}", e);
            std::process::exit(1);
        }
    };
    let storage = match open_storage(&config).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to initialize artifact storage: {}", e);
            std::process::exit(1);
        }
    };

    let executions = Arc::new(
        ExecutionService::new(store.clone(), storage, config.max_artifact_size)
            .with_max_files_per_request(config.max_files_per_request),
    );
    let pool = Arc::new(PoolManager::new(store.clone()));

    start_claim_reaper(
        pool.clone(),
        ClaimReaperConfig {
            timeout_secs: config.claim_timeout_secs,
            interval_secs: config.claim_sweep_interval_secs,
        },
    );

    let bind_address = config.bind_address();
    let is_development = config.is_development();
    let max_artifact_size = config.max_artifact_size;

    let worker_count = if is_development { 4 } else { num_cpus::get() };
    info!(
        "Starting server at http://{} ({} workers)",
        bind_address, worker_count
    );

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
                HeaderName::from_static("x-user"),
            ])
            .max_age(3600);
        let cors = if is_development {
            cors.allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
        } else {
            cors
        };

        App::new()
            // CORS must wrap before other middleware
            .wrap(cors)
            .wrap(RequestLogger)
            .app_data(web::Data::from(store.clone()))
            .app_data(web::Data::from(executions.clone()))
            .app_data(web::Data::from(pool.clone()))
            .app_data(web::PayloadConfig::new(max_artifact_size))
            .configure(api::configure_api)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    });

    server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await
}
