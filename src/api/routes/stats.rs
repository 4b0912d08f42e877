//! System statistics endpoint

use axum::{Json, extract::State};

use crate::api::{state::ApiState, types::StatsResponse};

/// GET /api/v1/stats
///
/// Fleet statistics plus the state of the actors that are running
pub async fn get_stats(State(state): State<ApiState>) -> Json<StatsResponse> {
    let services = state.registry.snapshot().await;
    let system = state.live.stats_for(&services);

    let scheduler = match &state.scheduler {
        Some(scheduler) => Some(scheduler.state().await),
        None => None,
    };
    let storage = match &state.storage {
        Some(storage) => storage.get_stats().await,
        None => None,
    };
    let notifier = match &state.notifier {
        Some(notifier) => notifier.get_stats().await,
        None => None,
    };

    Json(StatsResponse {
        timestamp: chrono::Utc::now().to_rfc3339(),
        system,
        scheduler,
        storage,
        notifier,
    })
}
