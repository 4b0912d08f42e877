//! Service registry endpoints
//!
//! Mutations go straight to the registry and are picked up by the next tick;
//! the storage writer persists them in order with the per-tick saves.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::warn;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{CreateServiceRequest, ServiceDetailResponse, ServicesResponse, UpdateServiceRequest},
};
use crate::registry::ServiceRecord;

fn require(field: &str, value: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

async fn persist(state: &ApiState, record: &ServiceRecord) {
    if let Some(storage) = &state.storage
        && let Err(e) = storage.save(record.clone()).await
    {
        warn!("failed to queue save of {}: {e}", record.name);
    }
}

/// GET /api/v1/services
///
/// Snapshot of every service, in registration order
pub async fn list_services(State(state): State<ApiState>) -> Json<ServicesResponse> {
    let services = state.registry.snapshot().await;
    let count = services.len();
    Json(ServicesResponse { services, count })
}

/// POST /api/v1/services
pub async fn create_service(
    State(state): State<ApiState>,
    Json(request): Json<CreateServiceRequest>,
) -> ApiResult<(StatusCode, Json<ServiceRecord>)> {
    let name = require("name", &request.name)?;
    let target = require("target", &request.target)?;

    let record = state.registry.add(&name, &target).await?;
    persist(&state, &record).await;

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/v1/services/:name
///
/// Record plus derived aggregates
pub async fn get_service(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ServiceDetailResponse>> {
    let service = state
        .registry
        .get(&name)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("service '{name}' not found")))?;
    let aggregate = service.aggregate();

    Ok(Json(ServiceDetailResponse { service, aggregate }))
}

/// PUT /api/v1/services/:name
///
/// Retarget a service, keeping its counters and history
pub async fn update_service(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(request): Json<UpdateServiceRequest>,
) -> ApiResult<Json<ServiceRecord>> {
    let target = require("target", &request.target)?;

    let record = state.registry.update(&name, &target).await?;
    persist(&state, &record).await;

    Ok(Json(record))
}

/// DELETE /api/v1/services/:name
pub async fn delete_service(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.registry.remove(&name).await?;

    if let Some(storage) = &state.storage
        && let Err(e) = storage.delete(name.as_str()).await
    {
        warn!("failed to queue delete of {name}: {e}");
    }

    Ok(StatusCode::NO_CONTENT)
}
