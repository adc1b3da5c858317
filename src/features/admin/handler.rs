//! 运维端点
//!
//! `/clear-cache` 清空内存 + 磁盘缓存并取消全部渲染任务；
//! `/queue/*` 暴露队列统计与暂停/恢复开关。

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use tracing::info;

use crate::features::queue::QueueStats;
use crate::state::AppState;

/// 清缓存汇总
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClearCacheSummary {
    pub result_memory_cleared: usize,
    pub result_disk_removed: usize,
    pub part_memory_cleared: u64,
    pub jobs_cancelled: usize,
}

#[utoipa::path(
    get,
    path = "/clear-cache",
    summary = "清空缓存",
    description = "清空结果内存层与磁盘层、部件内存层，并取消排队与在途渲染任务（等待者收到取消错误）。",
    responses((status = 200, description = "清理汇总", body = ClearCacheSummary)),
    tag = "Admin"
)]
pub async fn clear_cache(State(state): State<AppState>) -> Json<ClearCacheSummary> {
    // 先取消任务再清缓存，避免在途任务完成后又写回
    let jobs_cancelled = state.coordinator.cancel_all("缓存已清空");
    let result_memory_cleared = state.results.memory.purge();
    let result_disk_removed = state.results.disk.remove_all().await;
    let part_memory_cleared = state.parts.purge_memory().await;

    let summary = ClearCacheSummary {
        result_memory_cleared,
        result_disk_removed,
        part_memory_cleared,
        jobs_cancelled,
    };
    info!(
        memory = result_memory_cleared,
        disk = result_disk_removed,
        parts = part_memory_cleared,
        jobs = jobs_cancelled,
        "缓存清理完成"
    );
    Json(summary)
}

#[utoipa::path(
    get,
    path = "/queue/stats",
    summary = "队列统计",
    responses((status = 200, description = "队列统计", body = QueueStats)),
    tag = "Admin"
)]
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.coordinator.stats())
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct QueueToggleResponse {
    pub paused: bool,
}

#[utoipa::path(
    post,
    path = "/queue/pause",
    summary = "暂停队列",
    description = "暂停出队；在途任务继续执行完毕。",
    responses((status = 200, body = QueueToggleResponse)),
    tag = "Admin"
)]
pub async fn queue_pause(State(state): State<AppState>) -> Json<QueueToggleResponse> {
    state.coordinator.pause();
    Json(QueueToggleResponse { paused: true })
}

#[utoipa::path(
    post,
    path = "/queue/resume",
    summary = "恢复队列",
    responses((status = 200, body = QueueToggleResponse)),
    tag = "Admin"
)]
pub async fn queue_resume(State(state): State<AppState>) -> Json<QueueToggleResponse> {
    state.coordinator.resume();
    Json(QueueToggleResponse { paused: false })
}

pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route("/clear-cache", get(clear_cache))
        .route("/queue/stats", get(queue_stats))
        .route("/queue/pause", post(queue_pause))
        .route("/queue/resume", post(queue_resume))
}
