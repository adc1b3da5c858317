use axum::body::Bytes;
use std::sync::Arc;

use crate::features::cache::ResultCache;
use crate::features::parts::PartLoader;
use crate::features::queue::RenderCoordinator;
use crate::features::render::RenderPipeline;
use crate::features::storage::SpacesClient;
use crate::features::users::{ItemCatalog, UserDirectory};
use crate::shutdown::ShutdownManager;

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserDirectory>,
    pub items: Arc<ItemCatalog>,
    pub parts: Arc<PartLoader>,
    pub results: Arc<ResultCache>,
    pub store: Arc<SpacesClient>,
    pub coordinator: RenderCoordinator,
    pub pipeline: Arc<RenderPipeline>,
    /// 内置默认资产（队列过载且无历史渲染时兜底返回）
    pub default_asset: Option<Bytes>,
    pub shutdown: ShutdownManager,
}
