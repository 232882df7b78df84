//! Counseling service routes

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tracing::error;

use crate::{
    error::ApiResult,
    extract::{IdPath, JsonBody, QueryParams},
    middleware::request_logging,
    models::{
        ApiResponse,
        extension::{
            AdminDecisionRequest, ConfirmPaymentRequest, CreateExtensionRequest, ExtensionQuery,
        },
        mapping::{CreateMappingRequest, MappingQuery},
    },
    state::AppState,
};

/// Create the router for the counseling service
pub fn create_router(state: AppState) -> Router {
    let extension_routes = Router::new()
        .route(
            "/extension-requests",
            post(create_extension_request).get(list_extension_requests),
        )
        .route("/extension-requests/pending-payment", get(pending_payment))
        .route("/extension-requests/pending-approval", get(pending_approval))
        .route("/extension-requests/statistics", get(extension_statistics))
        .route("/extension-requests/:id", get(get_extension_request))
        .route("/extension-requests/:id/confirm-payment", post(confirm_payment))
        .route("/extension-requests/:id/approve", post(approve_extension))
        .route("/extension-requests/:id/reject", post(reject_extension))
        .route("/extension-requests/:id/complete", post(complete_extension));

    let mapping_routes = Router::new()
        .route("/mappings", post(create_mapping).get(list_mappings))
        .route("/mappings/:id", get(get_mapping))
        .route("/mappings/:id/use-session", post(use_session));

    let code_routes = Router::new()
        .route("/common-codes/:group", get(get_code_group))
        .route("/common-codes/cache/invalidate", post(invalidate_code_cache));

    Router::new()
        .route("/health", get(health_check))
        .merge(extension_routes)
        .merge(mapping_routes)
        .merge(code_routes)
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database_up = match state.store.health_check().await {
        Ok(up) => up,
        Err(e) => {
            error!("Store health check failed: {}", e);
            false
        }
    };

    let status = if database_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ApiResponse {
            success: database_up,
            data: Some(json!({
                "status": if database_up { "ok" } else { "degraded" },
                "service": "counseling-service",
                "database": if database_up { "up" } else { "down" }
            })),
            message: None,
        }),
    )
}

/// Create a session-extension request
pub async fn create_extension_request(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateExtensionRequest>,
) -> ApiResult<impl IntoResponse> {
    let request = state.workflow.create(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(
            request,
            "Extension request created",
        )),
    ))
}

/// List extension requests
pub async fn list_extension_requests(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ExtensionQuery>,
) -> ApiResult<impl IntoResponse> {
    let response = state.workflow.list(&query).await?;
    Ok(Json(ApiResponse::ok(response)))
}

/// Requests waiting for payment confirmation
pub async fn pending_payment(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let requests = state.workflow.pending_payment().await?;
    Ok(Json(ApiResponse::ok(requests)))
}

/// Requests waiting for an administrator decision
pub async fn pending_approval(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let requests = state.workflow.pending_approval().await?;
    Ok(Json(ApiResponse::ok(requests)))
}

/// Request statistics
pub async fn extension_statistics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let statistics = state.workflow.statistics().await?;
    Ok(Json(ApiResponse::ok(statistics)))
}

/// Get an extension request by ID
pub async fn get_extension_request(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<impl IntoResponse> {
    let request = state.workflow.get(id).await?;
    Ok(Json(ApiResponse::ok(request)))
}

/// Confirm the payment of a pending request
pub async fn confirm_payment(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    JsonBody(payload): JsonBody<ConfirmPaymentRequest>,
) -> ApiResult<impl IntoResponse> {
    let request = state.workflow.confirm_payment(id, payload).await?;
    Ok(Json(ApiResponse::ok_with_message(request, "Payment confirmed")))
}

/// Approve a paid request
pub async fn approve_extension(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    JsonBody(payload): JsonBody<AdminDecisionRequest>,
) -> ApiResult<impl IntoResponse> {
    let request = state.workflow.approve(id, payload).await?;
    Ok(Json(ApiResponse::ok_with_message(request, "Extension approved")))
}

/// Reject a paid request
pub async fn reject_extension(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    JsonBody(payload): JsonBody<AdminDecisionRequest>,
) -> ApiResult<impl IntoResponse> {
    let request = state.workflow.reject(id, payload).await?;
    Ok(Json(ApiResponse::ok_with_message(request, "Extension rejected")))
}

/// Complete an approved request and credit its mapping
pub async fn complete_extension(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<impl IntoResponse> {
    let request = state.workflow.complete(id).await?;
    Ok(Json(ApiResponse::ok_with_message(request, "Extension completed")))
}

/// Create a mapping
pub async fn create_mapping(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateMappingRequest>,
) -> ApiResult<impl IntoResponse> {
    let mapping = state.mappings.create(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(mapping, "Mapping created")),
    ))
}

/// List mappings
pub async fn list_mappings(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<MappingQuery>,
) -> ApiResult<impl IntoResponse> {
    let mappings = state.mappings.list(&query).await?;
    Ok(Json(ApiResponse::ok(mappings)))
}

/// Get a mapping by ID
pub async fn get_mapping(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<impl IntoResponse> {
    let mapping = state.mappings.get(id).await?;
    Ok(Json(ApiResponse::ok(mapping)))
}

/// Consume one session of a mapping
pub async fn use_session(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<impl IntoResponse> {
    let mapping = state.mappings.use_session(id).await?;
    Ok(Json(ApiResponse::ok_with_message(mapping, "Session used")))
}

/// Codes of a group
pub async fn get_code_group(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let codes = state.codes.get_group(&group).await?;
    Ok(Json(ApiResponse::ok(codes)))
}

/// Drop every cached code group
pub async fn invalidate_code_cache(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.codes.invalidate_all().await?;
    Ok(Json(ApiResponse::ok_with_message(
        json!({ "invalidated": true }),
        "Code cache invalidated",
    )))
}
