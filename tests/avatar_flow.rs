//! 端到端链路测试
//!
//! 起一个假 CDN（按物品名返回纯色贴图）和一个假对象存储网关
//! （内存 HashMap），把完整服务装配起来用真实 HTTP 驱动：
//! 冷命中 → 内存命中 → 定制变更重渲 → 单飞 → 远端重定向 → 过载回退。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path as FsPath;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use avatar_backend::CircuitBreaker;
use avatar_backend::config::AppConfig;
use avatar_backend::features::avatar::models::{
    Customization, ItemInfo, ItemSelection, UserRecord,
};
use avatar_backend::features::cache::ResultCache;
use avatar_backend::features::compositor;
use avatar_backend::features::parts::PartLoader;
use avatar_backend::features::queue::RenderCoordinator;
use avatar_backend::features::render::RenderPipeline;
use avatar_backend::features::storage::SpacesClient;
use avatar_backend::features::users::{ItemCatalog, UserDirectory};
use avatar_backend::features::{admin, avatar, health};
use avatar_backend::shutdown::ShutdownManager;
use avatar_backend::startup::{load_default_asset, run_startup_checks};
use avatar_backend::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::Router;

// ---------------------------------------------------------------------------
// 假上游
// ---------------------------------------------------------------------------

fn item_color(name: &str) -> [u8; 4] {
    match name {
        "H1" => [220, 200, 40, 255],
        "T1" => [20, 40, 220, 255],
        "T2" => [180, 20, 20, 255],
        "B1" | "BX" => [10, 10, 200, 255],
        "S1" => [200, 10, 10, 255],
        _ => [128, 128, 128, 255],
    }
}

async fn cdn_sprite(Path(file): Path<String>) -> impl IntoResponse {
    let name = file.strip_suffix(".webp").unwrap_or(&file);
    let frame = image::RgbaImage::from_pixel(425, 850, image::Rgba(item_color(name)));
    let bytes = compositor::encode_webp(&frame).unwrap();
    ([("content-type", "image/webp")], bytes)
}

async fn spawn_cdn() -> String {
    let app = Router::new().route("/item-sprite/{file}", get(cdn_sprite));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[derive(Clone, Default)]
struct MockStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

async fn store_object(
    State(store): State<MockStore>,
    method: Method,
    Path((_bucket, key)): Path<(String, String)>,
    body: Bytes,
) -> impl IntoResponse {
    let mut objects = store.objects.lock().unwrap();
    match method {
        Method::PUT => {
            objects.insert(key, body.to_vec());
            StatusCode::OK.into_response()
        }
        Method::HEAD => {
            if objects.contains_key(&key) {
                StatusCode::OK.into_response()
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }
        Method::GET => match objects.get(&key) {
            Some(data) => {
                ([("content-type", "image/webp")], data.clone()).into_response()
            }
            None => StatusCode::NOT_FOUND.into_response(),
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn spawn_store() -> (String, MockStore) {
    let store = MockStore::default();
    let app = Router::new()
        .route("/{bucket}/{*key}", any(store_object))
        .with_state(store.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), store)
}

// ---------------------------------------------------------------------------
// 服务装配
// ---------------------------------------------------------------------------

async fn build_state(
    data_dir: &FsPath,
    cdn: &str,
    store_endpoint: &str,
    queue_capacity: usize,
) -> AppState {
    let mut cfg = AppConfig::default();
    cfg.resources.base_path = data_dir.to_string_lossy().to_string();
    cfg.cdn.base_url = cdn.to_string();
    cfg.spaces.endpoint = store_endpoint.to_string();
    cfg.spaces.space_name = "avatars".to_string();
    cfg.spaces.space_id = "test-id".to_string();
    cfg.spaces.space_key = "test-secret".to_string();
    cfg.render.workers = 2;
    cfg.render.retry_base_secs = 0;
    cfg.queue.capacity = queue_capacity;

    run_startup_checks(&cfg).await.unwrap();

    let users = Arc::new(UserDirectory::empty());
    let items = Arc::new(ItemCatalog::from_items(vec![
        ItemInfo {
            id: "BX".into(),
            description: "直筒工装裤 !x".into(),
        },
        ItemInfo {
            id: "B1".into(),
            description: "普通短裤".into(),
        },
    ]));

    let parts = Arc::new(PartLoader::new(
        &cfg,
        CircuitBreaker::new("cdn", 5, Duration::from_secs(60)),
    ));
    let store = Arc::new(SpacesClient::new(
        &cfg.spaces,
        CircuitBreaker::new("object-store", 5, Duration::from_secs(60)),
    ));
    let results = Arc::new(ResultCache::new(&cfg.cache, cfg.avatars_path()));
    let pipeline = Arc::new(RenderPipeline::new(
        parts.clone(),
        results.clone(),
        store.clone(),
        users.clone(),
        items.clone(),
    ));
    let coordinator = RenderCoordinator::start(&cfg.render, &cfg.queue);
    let default_asset = load_default_asset(&cfg).await;

    AppState {
        users,
        items,
        parts,
        results,
        store,
        coordinator,
        pipeline,
        default_asset,
        shutdown: ShutdownManager::new(),
    }
}

async fn spawn_app(state: AppState) -> String {
    let app = Router::new()
        .merge(health::create_health_router())
        .merge(avatar::create_avatar_router())
        .merge(admin::create_admin_router())
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

fn user(username: &str, customize: impl FnOnce(&mut Customization)) -> UserRecord {
    let mut c = Customization::default();
    customize(&mut c);
    UserRecord {
        username: username.to_string(),
        customization: c,
        customization_hash: None,
        avatar_key: None,
        clothing_key: None,
        thumbnail_key: None,
    }
}

// ---------------------------------------------------------------------------
// 场景
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cold_hit_then_memory_hit_then_customization_change() {
    let cdn = spawn_cdn().await;
    let (store_url, _store) = spawn_store().await;
    let tmp = tempfile::tempdir().unwrap();
    let state = build_state(tmp.path(), &cdn, &store_url, 1000).await;
    let users = state.users.clone();
    users
        .upsert(user("alice", |c| {
            c.hair = Some(ItemSelection::new("H1"));
            c.top = Some(ItemSelection::new("T1"));
        }))
        .await;
    let base = spawn_app(state).await;
    let client = no_redirect_client();

    // 冷命中：触发渲染
    let resp = client
        .get(format!("{base}/avatar/avatar/alice.webp"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/webp");
    assert_eq!(resp.headers()["x-cache"], "RENDER");
    let first_body = resp.bytes().await.unwrap();
    let decoded = compositor::decode_rgba(&first_body).unwrap();
    assert_eq!(decoded.dimensions(), (425, 850));

    // 渲染完成后哈希已登记
    let alice = users.get("alice").await.unwrap();
    assert!(alice.customization_hash.is_some());
    assert!(alice.has_previous_render());

    // 第二次：内存命中
    let resp = client
        .get(format!("{base}/avatar/avatar/alice.webp"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-cache"], "HIT");
    assert_eq!(resp.bytes().await.unwrap(), first_body);

    // 定制变更：top 换色 → 重新渲染且字节不同
    let mut changed = users.get("alice").await.unwrap();
    changed.customization.top = Some(ItemSelection::new("T2"));
    let old_hash = changed.customization_hash;
    users.upsert(changed).await;

    let resp = client
        .get(format!("{base}/avatar/avatar/alice.webp"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-cache"], "RENDER");
    let second_body = resp.bytes().await.unwrap();
    assert_ne!(second_body, first_body);

    let alice = users.get("alice").await.unwrap();
    assert!(alice.customization_hash.is_some());
    assert_ne!(alice.customization_hash, old_hash);
}

#[tokio::test]
async fn fifty_concurrent_requests_share_one_render() {
    let cdn = spawn_cdn().await;
    let (store_url, _store) = spawn_store().await;
    let tmp = tempfile::tempdir().unwrap();
    let state = build_state(tmp.path(), &cdn, &store_url, 1000).await;
    state
        .users
        .upsert(user("bob", |c| {
            c.hair = Some(ItemSelection::new("H1"));
        }))
        .await;
    let coordinator = state.coordinator.clone();
    let base = spawn_app(state).await;
    let client = no_redirect_client();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let client = client.clone();
        let url = format!("{base}/avatar/avatar/bob.webp");
        handles.push(tokio::spawn(async move {
            let resp = client.get(url).send().await.unwrap();
            (resp.status().as_u16(), resp.bytes().await.unwrap())
        }));
    }

    let mut bodies = Vec::new();
    for h in handles {
        let (status, body) = h.await.unwrap();
        assert_eq!(status, 200);
        bodies.push(body);
    }
    assert!(
        bodies.windows(2).all(|w| w[0] == w[1]),
        "all 50 bodies must be byte-identical"
    );
    // 50 个请求只执行了一次渲染
    assert_eq!(coordinator.stats().completed, 1);
}

#[tokio::test]
async fn sprite_and_thumbnail_redirect_to_signed_remote_objects() {
    let cdn = spawn_cdn().await;
    let (store_url, _store) = spawn_store().await;
    let tmp = tempfile::tempdir().unwrap();
    let state = build_state(tmp.path(), &cdn, &store_url, 1000).await;
    state
        .users
        .upsert(user("carol", |c| {
            c.top = Some(ItemSelection::new("T1"));
        }))
        .await;
    let base = spawn_app(state).await;
    let client = no_redirect_client();

    // 先渲染一次，填充远端对象并登记哈希
    let resp = client
        .get(format!("{base}/avatar/avatar/carol.webp"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // 精灵表：307 到签名链接
    let resp = client
        .get(format!("{base}/avatar/sprite/carol.webp"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 307);
    let location = resp.headers()["location"].to_str().unwrap().to_string();
    assert!(location.contains("/avatars/user-clothing/carol.webp?"));
    assert!(location.contains("X-Expires="));
    assert!(location.contains("X-Signature="));

    // 跟随签名链接取回对象：完整 2550×850 精灵表
    let sheet = client.get(&location).send().await.unwrap();
    assert_eq!(sheet.status(), 200);
    let sheet_img = compositor::decode_rgba(&sheet.bytes().await.unwrap()).unwrap();
    assert_eq!(sheet_img.dimensions(), (2550, 850));

    // 缩略图同理，尺寸 218×218
    let resp = client
        .get(format!("{base}/avatar/t/carol.webp"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 307);
    let location = resp.headers()["location"].to_str().unwrap().to_string();
    assert!(location.contains("/avatars/user-thumbnail/carol.webp?"));
    let thumb = client.get(&location).send().await.unwrap();
    let thumb_img = compositor::decode_rgba(&thumb.bytes().await.unwrap()).unwrap();
    assert_eq!(thumb_img.dimensions(), (218, 218));
}

#[tokio::test]
async fn layout_flag_from_item_description_controls_occlusion() {
    let cdn = spawn_cdn().await;
    let (store_url, _store) = spawn_store().await;
    let tmp = tempfile::tempdir().unwrap();
    let state = build_state(tmp.path(), &cdn, &store_url, 1000).await;
    // dana 的 bottom 带 !x：裤装遮鞋；erin 的不带：鞋在外
    state
        .users
        .upsert(user("dana", |c| {
            c.bottom = Some(ItemSelection::new("BX"));
            c.shoes = Some(ItemSelection::new("S1"));
        }))
        .await;
    state
        .users
        .upsert(user("erin", |c| {
            c.bottom = Some(ItemSelection::new("B1"));
            c.shoes = Some(ItemSelection::new("S1"));
        }))
        .await;
    let base = spawn_app(state).await;
    let client = no_redirect_client();

    let bottom_color = item_color("BX");
    let shoes_color = item_color("S1");

    let dana = client
        .get(format!("{base}/avatar/avatar/dana.webp"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let dana_img = compositor::decode_rgba(&dana).unwrap();
    assert_eq!(dana_img.get_pixel(200, 700).0[..3], bottom_color[..3]);

    let erin = client
        .get(format!("{base}/avatar/avatar/erin.webp"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let erin_img = compositor::decode_rgba(&erin).unwrap();
    assert_eq!(erin_img.get_pixel(200, 700).0[..3], shoes_color[..3]);
}

#[tokio::test]
async fn overload_falls_back_to_previous_object_or_default_asset() {
    let cdn = spawn_cdn().await;
    let (store_url, store) = spawn_store().await;
    let tmp = tempfile::tempdir().unwrap();
    // 队列容量 0：所有提交立即过载
    let state = build_state(tmp.path(), &cdn, &store_url, 0).await;

    // eve 有上一代渲染：哈希与当前指纹不一致，但对象键齐全
    let mut eve = user("eve", |c| {
        c.top = Some(ItemSelection::new("T1"));
    });
    eve.customization_hash = Some(0xDEAD_BEEF);
    eve.avatar_key = Some("user-avatar/eve.webp".into());
    eve.clothing_key = Some("user-clothing/eve.webp".into());
    eve.thumbnail_key = Some("user-thumbnail/eve.webp".into());
    store
        .objects
        .lock()
        .unwrap()
        .insert("user-avatar/eve.webp".into(), b"stale-webp".to_vec());
    state.users.upsert(eve).await;

    // frank 无历史渲染
    state.users.upsert(user("frank", |_| {})).await;

    let base = spawn_app(state).await;
    let client = no_redirect_client();

    // eve → 307 到上一代对象
    let resp = client
        .get(format!("{base}/avatar/avatar/eve.webp"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 307);
    assert_eq!(resp.headers()["x-cache"], "STALE");
    let location = resp.headers()["location"].to_str().unwrap();
    assert!(location.contains("/avatars/user-avatar/eve.webp?"));

    // frank → 200 内置默认资产
    let resp = client
        .get(format!("{base}/avatar/avatar/frank.webp"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-cache"], "DEFAULT");
    let img = compositor::decode_rgba(&resp.bytes().await.unwrap()).unwrap();
    assert_eq!(img.dimensions(), (425, 850));
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_any_lookup() {
    let cdn = spawn_cdn().await;
    let (store_url, _store) = spawn_store().await;
    let tmp = tempfile::tempdir().unwrap();
    let state = build_state(tmp.path(), &cdn, &store_url, 1000).await;
    let base = spawn_app(state).await;
    let client = no_redirect_client();

    // 未知视图类型
    let resp = client
        .get(format!("{base}/avatar/banner/alice.webp"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(
        resp.headers()["content-type"],
        "application/problem+json"
    );

    // 非法用户名
    let resp = client
        .get(format!("{base}/avatar/avatar/..%2Fetc.webp"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // 未知用户
    let resp = client
        .get(format!("{base}/avatar/avatar/ghost.webp"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn clear_cache_purges_tiers_and_falls_back_to_remote() {
    let cdn = spawn_cdn().await;
    let (store_url, _store) = spawn_store().await;
    let tmp = tempfile::tempdir().unwrap();
    let state = build_state(tmp.path(), &cdn, &store_url, 1000).await;
    state
        .users
        .upsert(user("gail", |c| {
            c.hair = Some(ItemSelection::new("H1"));
        }))
        .await;
    let base = spawn_app(state).await;
    let client = no_redirect_client();

    // 渲染并确认内存命中
    client
        .get(format!("{base}/avatar/avatar/gail.webp"))
        .send()
        .await
        .unwrap();
    let resp = client
        .get(format!("{base}/avatar/avatar/gail.webp"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-cache"], "HIT");

    // 清缓存
    let resp = client
        .get(format!("{base}/clear-cache"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let summary: serde_json::Value = resp.json().await.unwrap();
    assert!(summary["resultMemoryCleared"].as_u64().unwrap() >= 1);
    assert!(summary["resultDiskRemoved"].as_u64().unwrap() >= 1);

    // 哈希仍一致，但本地两层已空 → 回退远端 307
    let resp = client
        .get(format!("{base}/avatar/avatar/gail.webp"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 307);
    assert_eq!(resp.headers()["x-cache"], "REMOTE");

    // 队列统计端点
    let stats: serde_json::Value = client
        .get(format!("{base}/queue/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(stats["completed"].as_u64().unwrap() >= 1);
    assert_eq!(stats["waiting"].as_u64().unwrap(), 0);
}

#[tokio::test]
async fn queue_pause_and_resume_roundtrip() {
    let cdn = spawn_cdn().await;
    let (store_url, _store) = spawn_store().await;
    let tmp = tempfile::tempdir().unwrap();
    let state = build_state(tmp.path(), &cdn, &store_url, 1000).await;
    let base = spawn_app(state).await;
    let client = no_redirect_client();

    let resp: serde_json::Value = client
        .post(format!("{base}/queue/pause"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["paused"], true);

    let health: serde_json::Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["queue"]["paused"], true);

    let resp: serde_json::Value = client
        .post(format!("{base}/queue/resume"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["paused"], false);
}
