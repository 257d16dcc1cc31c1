//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{BroadcastPublisher, DbAdapter, OpenAiContractAdapter, S3Storage},
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, signup_handler},
        middleware::require_auth,
        rest::ApiDoc,
        state::AppState,
        ws_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use signflow_core::templates::TemplateCatalog;
use signflow_core::workflow::WorkflowEngine;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);
    let ai_adapter = Arc::new(OpenAiContractAdapter::new(
        openai_client,
        config.analysis_model.clone(),
        config.generation_model.clone(),
        Duration::from_secs(config.ai_timeout_secs),
    ));

    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await;
    let s3_client = aws_sdk_s3::Client::new(&aws_config);
    let storage = Arc::new(S3Storage::new(s3_client, config.s3_bucket.clone()));

    let events = BroadcastPublisher::new(256);

    // --- 4. Build the Engine and the Shared AppState ---
    let engine = WorkflowEngine::new(
        db_adapter.clone(),
        db_adapter.clone(),
        Arc::new(events.clone()),
    );

    let templates = TemplateCatalog::new(db_adapter.clone());

    let app_state = Arc::new(AppState {
        engine,
        templates,
        repo: db_adapter.clone(),
        auth: db_adapter,
        storage,
        ai: ai_adapter,
        events,
        config: config.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>().map_err(
            |e| ApiError::Internal(format!("Invalid CORS origin: {}", e)),
        )?)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/documents",
            post(api_lib::web::upload_document_handler).get(api_lib::web::list_documents_handler),
        )
        .route("/documents/{id}", get(api_lib::web::get_document_handler))
        .route(
            "/documents/{id}/fields",
            post(api_lib::web::replace_fields_handler),
        )
        .route(
            "/documents/{id}/send",
            post(api_lib::web::send_document_handler),
        )
        .route(
            "/documents/{id}/sign",
            post(api_lib::web::sign_document_handler),
        )
        .route(
            "/templates",
            get(api_lib::web::list_templates_handler).post(api_lib::web::create_template_handler),
        )
        .route(
            "/ai/analyze/{document_id}",
            post(api_lib::web::analyze_document_handler),
        )
        .route(
            "/ai/detect-fields/{document_id}",
            post(api_lib::web::detect_fields_handler),
        )
        .route(
            "/ai/generate-contract",
            post(api_lib::web::generate_contract_handler),
        )
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
