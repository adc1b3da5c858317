use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;

use crate::features::queue::QueueStats;
use crate::state::AppState;

/// 健康检查响应
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// 服务状态
    #[schema(example = "healthy")]
    pub status: String,
    /// 服务名称
    #[schema(example = "avatar-backend")]
    pub service: String,
    /// 当前版本（Cargo package version）
    #[schema(example = "0.1.0")]
    pub version: String,
    /// 渲染队列统计
    pub queue: QueueStats,
    /// 缓存统计
    pub cache: CacheHealth,
    /// 熔断器状态
    pub breakers: BreakerHealth,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheHealth {
    pub result_memory_entries: usize,
    pub result_memory_bytes: u64,
    pub part_memory_entries: u64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BreakerHealth {
    pub object_store: String,
    pub cdn: String,
}

/// 存活探针
pub async fn liveness() -> &'static str {
    "avatar-backend ok"
}

#[utoipa::path(
    get,
    path = "/health",
    summary = "健康检查",
    description = "就绪探针：返回队列 / 缓存 / 熔断器状态，退出流程中返回 503。",
    responses(
        (status = 200, description = "服务健康", body = HealthResponse),
        (status = 503, description = "服务退出中", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let shutting_down = state.shutdown.is_shutting_down();
    let body = HealthResponse {
        status: if shutting_down {
            "shutting_down".to_string()
        } else {
            "healthy".to_string()
        },
        service: "avatar-backend".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        queue: state.coordinator.stats(),
        cache: CacheHealth {
            result_memory_entries: state.results.memory.len(),
            result_memory_bytes: state.results.memory.bytes(),
            part_memory_entries: state.parts.memory_entries(),
        },
        breakers: BreakerHealth {
            object_store: format!("{:?}", state.store.breaker_state()),
            cdn: format!("{:?}", state.parts.breaker_state()),
        },
    };
    let status = if shutting_down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(body))
}

pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/", get(liveness))
        .route("/health", get(health_check))
}
