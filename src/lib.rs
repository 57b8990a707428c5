pub mod api;
pub mod client;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::ServerConfig;
use crate::services::conversion_service::ConversionService;
use crate::services::decoder::Decoder;
use crate::services::rate_limiter::{RateLimiter, WindowCount};
use crate::services::staging::StagingStore;
use crate::utils::kv_store::MemoryKvStore;
use axum::{
    Router,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::convert::convert_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::convert::ConvertUpload,
            api::handlers::convert::ErrorResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "convert", description = "Container to audio conversion"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub conversion: Arc<ConversionService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig, staging: Arc<StagingStore>, decoder: Arc<dyn Decoder>) -> Self {
        let conversion = Arc::new(ConversionService::new(
            staging,
            decoder,
            config.max_concurrent_decodes,
            config.formats.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::per_hour(
            Arc::new(MemoryKvStore::<WindowCount>::new()),
            config.conversions_per_hour,
        ));

        Self {
            conversion,
            rate_limiter,
            config,
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}

pub fn create_app(state: AppState) -> Router {
    // Runs inside the request-id layer, so every span carries the final id
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(&api::middleware::request_id::REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>, latency: Duration, _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/api/convert",
            post(api::handlers::convert::convert_file)
                .layer(axum::extract::DefaultBodyLimit::max(
                    state.config.max_file_size + 1024 * 1024, // Add 1MB buffer for multipart overhead
                ))
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::rate_limit::rate_limit_middleware,
                )),
        )
        .layer(trace_layer)
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config.allowed_origins))
        .with_state(state)
}
