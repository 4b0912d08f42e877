//! API request and response types

use serde::{Deserialize, Serialize};

use crate::actors::messages::{NotifierStats, SchedulerState, StorageStats};
use crate::history::Aggregate;
use crate::registry::{ServiceRecord, SystemStats};

/// Response for GET /api/v1/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Number of registered services
    pub services: usize,
    pub timestamp: String,
}

/// Response for GET /api/v1/services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesResponse {
    pub services: Vec<ServiceRecord>,
    pub count: usize,
}

/// Response for GET /api/v1/services/:name
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDetailResponse {
    pub service: ServiceRecord,
    pub aggregate: Aggregate,
}

/// Body of POST /api/v1/services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub target: String,
}

/// Body of PUT /api/v1/services/:name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateServiceRequest {
    pub target: String,
}

/// Response for GET /api/v1/stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub timestamp: String,

    #[serde(flatten)]
    pub system: SystemStats,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageStats>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifier: Option<NotifierStats>,
}
