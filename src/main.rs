use std::sync::Arc;

use avatar_backend::features::admin::{self, handler as admin_handler};
use avatar_backend::features::avatar::{self, models};
use avatar_backend::features::cache::ResultCache;
use avatar_backend::features::health::{self, handler as health_handler};
use avatar_backend::features::parts::PartLoader;
use avatar_backend::features::queue::{QueueStats, RenderCoordinator};
use avatar_backend::features::render::RenderPipeline;
use avatar_backend::features::storage::SpacesClient;
use avatar_backend::features::users::{ItemCatalog, UserDirectory};
use avatar_backend::startup::{load_default_asset, run_startup_checks};
use avatar_backend::state::AppState;
use avatar_backend::{AppError, CircuitBreaker, ShutdownManager, config::AppConfig, request_id};
use axum::Router;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn compression_predicate() -> impl tower_http::compression::predicate::Predicate {
    use tower_http::compression::predicate::{NotForContentType, Predicate, SizeAbove};

    // 压缩策略：明确排除不该压缩的响应。
    //
    // - 图片（WebP 渲染产物）：本身已压缩，再压缩只浪费 CPU。
    // - SSE/流式响应：压缩可能引入缓冲，影响实时性。
    // - application/octet-stream 等常见二进制下载：收益不确定。
    //
    // 保留默认的最小大小阈值，避免压缩开销覆盖收益。
    SizeAbove::default()
        .and(NotForContentType::GRPC)
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::SSE)
        .and(NotForContentType::const_new("application/octet-stream"))
}


#[derive(OpenApi)]
#[openapi(
    paths(
        avatar_backend::features::avatar::handler::get_avatar,
        avatar_backend::features::health::handler::health_check,
        avatar_backend::features::admin::handler::clear_cache,
        avatar_backend::features::admin::handler::queue_stats,
        avatar_backend::features::admin::handler::queue_pause,
        avatar_backend::features::admin::handler::queue_resume,
    ),
    components(
        schemas(
            AppError,
            avatar_backend::error::ProblemDetails,
            models::Customization,
            models::TattooSet,
            models::ItemSelection,
            models::UserRecord,
            models::ItemInfo,
            models::ViewKind,
            QueueStats,
            health_handler::HealthResponse,
            health_handler::CacheHealth,
            health_handler::BreakerHealth,
            admin_handler::ClearCacheSummary,
            admin_handler::QueueToggleResponse,
        )
    ),
    tags(
        (name = "Avatar", description = "Avatar rendering APIs"),
        (name = "Admin", description = "Cache / queue admin APIs"),
        (name = "Health", description = "Health APIs"),
    ),
    info(
        title = "Avatar Backend API",
        version = "0.1.0",
        description = "Avatar rendering service (Axum)"
    )
)]
pub struct ApiDoc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avatar_backend=info,tower_http=info".into()),
        )
        .init();

    // 创建优雅退出管理器
    let shutdown_manager = ShutdownManager::new();

    // Load config
    if let Err(e) = AppConfig::init_global() {
        tracing::error!("Config init failed: {}", e);
        std::process::exit(1);
    }
    let config = AppConfig::global();

    // 启动信号处理器
    if let Err(e) = shutdown_manager.start_signal_handler().await {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    // Run startup checks
    if let Err(e) = run_startup_checks(config).await {
        tracing::error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    // 用户 / 物品投影
    let users = match UserDirectory::load(config.users_file_path()).await {
        Ok(d) => Arc::new(d),
        Err(e) => {
            tracing::error!("用户投影载入失败: {}", e);
            std::process::exit(1);
        }
    };
    let items = match ItemCatalog::load(config.items_file_path()).await {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("物品投影载入失败: {}", e);
            std::process::exit(1);
        }
    };

    // 远端依赖各配一个熔断器
    let cdn_breaker = CircuitBreaker::new(
        "cdn",
        config.breaker.failure_threshold,
        config.breaker.open_duration(),
    );
    let store_breaker = CircuitBreaker::new(
        "object-store",
        config.breaker.failure_threshold,
        config.breaker.open_duration(),
    );

    let parts = Arc::new(PartLoader::new(config, cdn_breaker));
    let store = Arc::new(SpacesClient::new(&config.spaces, store_breaker));
    let results = Arc::new(ResultCache::new(&config.cache, config.avatars_path()));
    results.start_sweeper(Duration::from_secs(config.cache.sweep_interval_secs));

    let pipeline = Arc::new(RenderPipeline::new(
        parts.clone(),
        results.clone(),
        store.clone(),
        users.clone(),
        items.clone(),
    ));
    let coordinator = RenderCoordinator::start(&config.render, &config.queue);

    // 过载兜底资产
    let default_asset = load_default_asset(config).await;
    if default_asset.is_none() {
        tracing::warn!("默认资产不可用，过载且无历史渲染时将返回 503");
    }

    let app_state = AppState {
        users,
        items,
        parts,
        results,
        store,
        coordinator: coordinator.clone(),
        pipeline,
        default_asset,
        shutdown: shutdown_manager.clone(),
    };

    // Routes
    let mut app = Router::<AppState>::new()
        .merge(health::create_health_router())
        .merge(avatar::create_avatar_router())
        .merge(admin::create_admin_router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state);

    // 全局 request_id 中间件
    app = app.layer(axum::middleware::from_fn(request_id::request_id_middleware));

    // 应用内响应压缩：JSON/文本启用，图片与二进制排除
    app = app.layer(CompressionLayer::new().compress_when(compression_predicate()));

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("Avatar API: http://{}/avatar/{{type}}/{{username}}.webp", addr);
    tracing::info!("Data dir: {:?}", config.data_path());

    // 启动服务器并等待优雅退出信号
    let shutdown_config = &config.shutdown;
    let shutdown_timeout = shutdown_config.timeout_duration();

    let coordinator_for_shutdown = coordinator.clone();
    let manager_for_shutdown = shutdown_manager.clone();
    let shutdown_signal = async move {
        let reason = manager_for_shutdown.wait_for_shutdown().await;
        tracing::info!("接收到退出信号: {:?}，开始优雅退出...", reason);

        // 暂停收新活，限时等待在途渲染落盘
        match manager_for_shutdown
            .drain_with_timeout(coordinator_for_shutdown.drain(), shutdown_timeout)
            .await
        {
            Ok(_) => tracing::info!("渲染队列已排空，优雅退出完成"),
            Err(_) => {
                tracing::warn!("优雅退出超时，强制退出");
                if shutdown_config.force_quit {
                    tracing::info!("等待 {} 秒后强制退出", shutdown_config.force_delay_secs);
                    tokio::time::sleep(shutdown_config.force_delay_duration()).await;
                }
            }
        }
    };

    // 运行服务器直到收到退出信号
    let graceful = axum::serve(listener, app).with_graceful_shutdown(async {
        shutdown_signal.await;
        tracing::info!("开始优雅关闭HTTP服务器...");
    });

    if let Err(e) = graceful.await {
        tracing::error!("服务器运行错误: {}", e);
        std::process::exit(1);
    }

    tracing::info!("服务器已优雅关闭");
}
