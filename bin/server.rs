// Attribute Resolver - Web Server
// REST API with Axum so a remote policy engine can resolve attributes

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use attr_resolver::{
    AttributeError, AttributeResolver, AttributeStore, DesignatorKind, EvaluationContext,
    ResolverConfig, Status, TypedAttributeValue,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    resolver: AttributeResolver,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Status>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    fn fail(data: T, status: Status) -> Self {
        Self {
            success: false,
            data,
            error: Some(status),
        }
    }
}

/// POST /api/resolve body; the identity lists stand in for the engine's
/// evaluation context.
#[derive(Debug, Deserialize)]
struct ResolveRequest {
    attribute_id: String,
    designator: String,
    #[serde(default)]
    subject_ids: Vec<String>,
    #[serde(default)]
    resource_ids: Vec<String>,
    #[serde(default)]
    issuer: Option<String>,
    #[serde(default)]
    subject_category: Option<String>,
}

impl EvaluationContext for ResolveRequest {
    fn identity_values(
        &self,
        kind: DesignatorKind,
        _attribute_id: &str,
        _issuer: Option<&str>,
        _subject_category: Option<&str>,
    ) -> Result<Vec<String>, Status> {
        Ok(match kind {
            DesignatorKind::Subject => self.subject_ids.clone(),
            DesignatorKind::Resource => self.resource_ids.clone(),
            DesignatorKind::Environment => Vec::new(),
        })
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/designators - Supported designator kinds
async fn get_designators(State(state): State<AppState>) -> impl IntoResponse {
    let kinds: Vec<DesignatorKind> = state.resolver.supported_designator_kinds().into_iter().collect();
    Json(ApiResponse::ok(kinds))
}

/// GET /api/attributes - Supported attribute identifiers
async fn get_attributes(State(state): State<AppState>) -> impl IntoResponse {
    let resolver = state.resolver.clone();
    let result = tokio::task::spawn_blocking(move || resolver.supported_identifiers()).await;

    match result {
        Ok(Ok(ids)) => {
            let ids: Vec<String> = ids.into_iter().collect();
            (StatusCode::OK, Json(ApiResponse::ok(ids))).into_response()
        }
        Ok(Err(e)) => {
            error!("Error getting attribute identifiers: {}", e);
            (
                http_status(&e),
                Json(ApiResponse::fail(Vec::<String>::new(), e.to_status())),
            )
                .into_response()
        }
        Err(e) => join_failure(e),
    }
}

/// POST /api/resolve - Resolve one attribute
async fn resolve(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> impl IntoResponse {
    let resolver = state.resolver.clone();
    let result = tokio::task::spawn_blocking(move || {
        let kind: DesignatorKind = request.designator.parse()?;
        resolver.resolve_with(
            &request.attribute_id,
            kind,
            &request,
            request.issuer.as_deref(),
            request.subject_category.as_deref(),
        )
    })
    .await;

    match result {
        Ok(Ok(values)) => (StatusCode::OK, Json(ApiResponse::ok(values))).into_response(),
        Ok(Err(e)) => {
            let code = match &e {
                AttributeError::StoreUnavailable(_) | AttributeError::Query(_) => http_status(&e),
                _ => StatusCode::OK,
            };
            (
                code,
                Json(ApiResponse::fail(Vec::<TypedAttributeValue>::new(), e.to_status())),
            )
                .into_response()
        }
        Err(e) => join_failure(e),
    }
}

/// Store failures map to 503 (unavailable) or 500 (query fault).
fn http_status(e: &AttributeError) -> StatusCode {
    match e {
        AttributeError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn join_failure(e: tokio::task::JoinError) -> axum::response::Response {
    error!("Resolution task failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::fail((), Status::processing_error(e.to_string()))),
    )
        .into_response()
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = ResolverConfig::from_env()?;
    if !config.database_path.exists() {
        anyhow::bail!(
            "Database not found at {} (run: attr-resolver import <families.csv> <values.csv>)",
            config.database_path.display()
        );
    }

    let store = AttributeStore::from_config(&config)?;
    info!("Database opened: {}", config.database_path.display());

    let state = AppState {
        resolver: AttributeResolver::new(store),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/designators", get(get_designators))
        .route("/attributes", get(get_attributes))
        .route("/resolve", post(resolve))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = env_or("ATTR_SERVER_ADDR", "0.0.0.0:3000");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
