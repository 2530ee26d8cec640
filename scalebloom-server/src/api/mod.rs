//! HTTP API endpoints

use crate::catalog::{CatalogError, CatalogStats, FilterCatalog};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use scalebloom_core::{BloomError, FilterConfig, FilterInfo, Profile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state
pub type AppState = Arc<FilterCatalog>;

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// Create the API router
pub fn create_router(catalog: Arc<FilterCatalog>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health))
        .route("/ping", get(ping))

        // Filter management
        .route("/filters", get(list_filters))
        .route(
            "/filters/:name",
            get(filter_info).put(create_filter).delete(drop_filter),
        )

        // Membership operations
        .route("/filters/:name/insert", post(insert))
        .route("/filters/:name/insertnx", post(insertnx))
        .route("/filters/:name/remove", post(remove))
        .route("/filters/:name/check", get(check))

        // Persistence
        .route("/snapshot", post(snapshot))

        // Stats
        .route("/stats", get(stats))
        .route("/metrics", get(metrics))

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(catalog)
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateFilterRequest {
    pub entries: Option<u64>,
    pub precision: Option<f64>,
    pub profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
pub struct DataRequest {
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckParams {
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct OperationResponse {
    pub result: bool,
}

#[derive(Debug, Serialize)]
pub struct DropResponse {
    pub deleted_keys: usize,
}

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub path: String,
    pub keys: usize,
    pub bytes: usize,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(err: CatalogError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        CatalogError::FilterNotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::FilterExists(_) => StatusCode::CONFLICT,
        CatalogError::NoSnapshotPath => StatusCode::PRECONDITION_FAILED,
        CatalogError::Core(e) => core_status(e),
        CatalogError::Manifest(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: err.to_string() }))
}

fn core_status(err: &BloomError) -> StatusCode {
    match err {
        BloomError::Config(_) | BloomError::Sizing { .. } => StatusCode::BAD_REQUEST,
        BloomError::UnitNotFound(_) | BloomError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn core_error(err: BloomError) -> (StatusCode, Json<ErrorResponse>) {
    error_response(CatalogError::Core(err))
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: scalebloom_core::VERSION.to_string(),
    })
}

async fn ping() -> &'static str {
    "pong"
}

async fn list_filters(State(catalog): State<AppState>) -> Json<Vec<String>> {
    Json(catalog.list_filters())
}

async fn create_filter(
    State(catalog): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<CreateFilterRequest>,
) -> ApiResult<(StatusCode, Json<FilterInfo>)> {
    let defaults = catalog.default_config();
    let config = FilterConfig::new(
        req.entries.unwrap_or(defaults.entries()),
        req.precision.unwrap_or(defaults.precision()),
    )
    .map_err(core_error)?
    .with_profile(req.profile.unwrap_or(defaults.profile()));

    let filter = catalog.create_filter(&name, config).map_err(error_response)?;
    let info = filter.info().map_err(core_error)?;

    Ok((StatusCode::CREATED, Json(info)))
}

async fn filter_info(
    State(catalog): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<FilterInfo>> {
    let filter = catalog
        .get_filter(&name)
        .ok_or_else(|| error_response(CatalogError::FilterNotFound(name.clone())))?;
    let info = filter.info().map_err(core_error)?;
    Ok(Json(info))
}

async fn drop_filter(
    State(catalog): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<DropResponse>> {
    let deleted_keys = catalog.drop_filter(&name).map_err(error_response)?;
    Ok(Json(DropResponse { deleted_keys }))
}

async fn insert(
    State(catalog): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DataRequest>,
) -> ApiResult<Json<OperationResponse>> {
    let filter = catalog.get_or_create_filter(&name).map_err(error_response)?;
    let result = filter.insert(req.data.as_bytes()).map_err(core_error)?;
    Ok(Json(OperationResponse { result }))
}

async fn insertnx(
    State(catalog): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DataRequest>,
) -> ApiResult<Json<OperationResponse>> {
    let filter = catalog.get_or_create_filter(&name).map_err(error_response)?;
    let result = filter.insertnx(req.data.as_bytes()).map_err(core_error)?;
    Ok(Json(OperationResponse { result }))
}

async fn remove(
    State(catalog): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DataRequest>,
) -> ApiResult<Json<OperationResponse>> {
    let filter = catalog
        .get_filter(&name)
        .ok_or_else(|| error_response(CatalogError::FilterNotFound(name.clone())))?;
    let result = filter.remove(req.data.as_bytes()).map_err(core_error)?;
    Ok(Json(OperationResponse { result }))
}

async fn check(
    State(catalog): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<CheckParams>,
) -> ApiResult<Json<OperationResponse>> {
    // An unknown filter holds nothing
    let result = match catalog.get_filter(&name) {
        Some(filter) => filter.check(params.data.as_bytes()).map_err(core_error)?,
        None => false,
    };
    Ok(Json(OperationResponse { result }))
}

async fn snapshot(State(catalog): State<AppState>) -> ApiResult<Json<SnapshotResponse>> {
    let info = catalog.save_snapshot().map_err(error_response)?;
    Ok(Json(SnapshotResponse {
        path: info.path.display().to_string(),
        keys: info.keys,
        bytes: info.bytes,
        created_at: info.created_at.to_rfc3339(),
    }))
}

async fn stats(State(catalog): State<AppState>) -> Json<CatalogStats> {
    Json(catalog.stats())
}

async fn metrics(State(catalog): State<AppState>) -> String {
    render_metrics(&catalog)
}

/// Render catalog metrics in Prometheus text format
pub fn render_metrics(catalog: &FilterCatalog) -> String {
    let stats = catalog.stats();

    let mut output = String::new();
    output.push_str("# HELP scalebloom_filters_total Number of hosted filters\n");
    output.push_str("# TYPE scalebloom_filters_total gauge\n");
    output.push_str(&format!("scalebloom_filters_total {}\n", stats.filter_count));

    output.push_str("# HELP scalebloom_store_keys_total Keys held by the store\n");
    output.push_str("# TYPE scalebloom_store_keys_total gauge\n");
    output.push_str(&format!("scalebloom_store_keys_total {}\n", stats.store.keys));

    output.push_str("# HELP scalebloom_bitmap_bytes_total Bytes held by segment bit arrays\n");
    output.push_str("# TYPE scalebloom_bitmap_bytes_total gauge\n");
    output.push_str(&format!("scalebloom_bitmap_bytes_total {}\n", stats.store.bitmap_bytes));

    output.push_str("# HELP scalebloom_filter_inserts Inserts performed per filter\n");
    output.push_str("# TYPE scalebloom_filter_inserts counter\n");
    for name in catalog.list_filters() {
        let Some(filter) = catalog.get_filter(&name) else {
            continue;
        };
        match filter.info() {
            Ok(info) => {
                let label = escape_label(&name);
                output.push_str(&format!(
                    "scalebloom_filter_inserts{{filter=\"{}\"}} {}\n",
                    label, info.count
                ));
                output.push_str(&format!(
                    "scalebloom_filter_segments{{filter=\"{}\"}} {}\n",
                    label, info.current_segment
                ));
            }
            Err(e) => tracing::warn!("Failed to read filter {} for metrics: {}", name, e),
        }
    }

    output
}

/// Escape a Prometheus label value
fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}
