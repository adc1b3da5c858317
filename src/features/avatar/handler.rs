//! 头像请求解析
//!
//! `GET /avatar/{type}/{username}.webp` 的完整解析路径：
//! 规范化视图类型 → 用户名白名单校验 → 用户查询 → 指纹比对 →
//! 按视图走缓存/重定向/渲染提交，响应头 `X-Cache` 标注命中层。

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::debug;

use super::fingerprint::fingerprint;
use super::models::{UserRecord, ViewKind};
use crate::error::AppError;
use crate::features::queue::{JobError, JobPriority};
use crate::state::AppState;

/// 用户名只允许 `[A-Za-z0-9_-]`，1..=64 位
fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// 去掉路径段里的 `.webp` 后缀（带不带都接受）
fn strip_webp_suffix(file: &str) -> &str {
    file.strip_suffix(".webp").unwrap_or(file)
}

fn webp_response(data: Bytes, cache_tag: &'static str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/webp")),
            (
                header::HeaderName::from_static("x-cache"),
                HeaderValue::from_static(cache_tag),
            ),
        ],
        data,
    )
        .into_response()
}

fn redirect_response(url: &str, cache_tag: &'static str) -> Result<Response, AppError> {
    let location = HeaderValue::from_str(url)
        .map_err(|e| AppError::Internal(format!("非法重定向地址: {e}")))?;
    Ok((
        StatusCode::TEMPORARY_REDIRECT,
        [
            (header::LOCATION, location),
            (
                header::HeaderName::from_static("x-cache"),
                HeaderValue::from_static(cache_tag),
            ),
        ],
    )
        .into_response())
}

/// 上一次成功渲染里该视图对应的对象键
fn previous_key(user: &UserRecord, view: ViewKind) -> Option<&String> {
    match view {
        ViewKind::Avatar => user.avatar_key.as_ref(),
        ViewKind::Sprite => user.clothing_key.as_ref(),
        ViewKind::Thumbnail => user.thumbnail_key.as_ref(),
    }
}

#[utoipa::path(
    get,
    path = "/avatar/{type}/{username}.webp",
    summary = "获取用户渲染图",
    description = "按视图类型返回用户头像/精灵表/缩略图。命中本地缓存直接回 WebP 字节，远端命中回 307 签名链接，未命中触发渲染并等待结果。",
    params(
        ("type" = String, Path, description = "视图类型：avatar|sprite|thumbnail（别名 a/s/t）"),
        ("username" = String, Path, description = "用户名，仅限 [A-Za-z0-9_-]")
    ),
    responses(
        (status = 200, description = "WebP bytes"),
        (status = 307, description = "Redirect to signed object URL"),
        (status = 400, description = "Bad request", body = AppError),
        (status = 404, description = "User not found", body = AppError),
        (status = 503, description = "Overloaded", body = AppError)
    ),
    tag = "Avatar"
)]
pub async fn get_avatar(
    State(state): State<AppState>,
    Path((view_raw, file)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let view = ViewKind::parse(&view_raw)
        .ok_or_else(|| AppError::Validation(format!("未知视图类型: {view_raw}")))?;
    let username = strip_webp_suffix(&file);
    if !is_valid_username(username) {
        return Err(AppError::Validation("非法用户名".into()));
    }

    let user = state
        .users
        .get(username)
        .await
        .ok_or_else(|| AppError::NotFound(username.to_string()))?;

    let fp = fingerprint(username, &user.customization);

    // 指纹一致：按视图走缓存层
    if user.customization_hash == Some(fp) {
        match view {
            ViewKind::Sprite | ViewKind::Thumbnail => {
                let key = view.object_key(username);
                if state.store.is_configured()
                    && state.store.head(&key).await.unwrap_or(false)
                {
                    return redirect_response(&state.store.signed_get_url(&key), "REMOTE");
                }
            }
            ViewKind::Avatar => {
                if let Some(data) = state.results.memory.get(fp) {
                    return Ok(webp_response(data, "HIT"));
                }
                if let Some(data) = state.results.disk.read(fp).await {
                    state.results.memory.insert(fp, data.clone());
                    return Ok(webp_response(data, "DISK"));
                }
                let key = view.object_key(username);
                if state.store.is_configured()
                    && state.store.head(&key).await.unwrap_or(false)
                {
                    return redirect_response(&state.store.signed_get_url(&key), "REMOTE");
                }
            }
        }
        debug!(user = username, fingerprint = fp, "指纹一致但各层未命中，触发重渲");
    }

    // 未命中或指纹不一致：提交渲染
    let pipeline = state.pipeline.clone();
    let job_user = user.clone();
    let factory: crate::features::queue::JobFactory = Box::new(move || {
        let pipeline = pipeline.clone();
        let user = job_user.clone();
        Box::pin(async move { pipeline.render_user(user, fp).await })
    });

    let submitted = match state
        .coordinator
        .submit((username.to_string(), fp), JobPriority::from(view), factory)
    {
        Ok(s) => s,
        Err(JobError::Overloaded) => {
            // 过载回退：历史对象 → 内置默认资产 → 503
            if user.has_previous_render()
                && state.store.is_configured()
                && let Some(key) = previous_key(&user, view)
            {
                return redirect_response(&state.store.signed_get_url(key), "STALE");
            }
            if let Some(default) = &state.default_asset {
                return Ok(webp_response(default.clone(), "DEFAULT"));
            }
            return Err(AppError::Overloaded("渲染队列已满且无可用回退".into()));
        }
        Err(e) => return Err(e.into()),
    };

    // 已有同键渲染在途且存在上一代产物时，直接回退到旧对象，
    // 不让请求挂在渲染上
    if !submitted.newly_queued
        && user.customization_hash != Some(fp)
        && user.has_previous_render()
        && state.store.is_configured()
        && let Some(key) = previous_key(&user, view)
    {
        return redirect_response(&state.store.signed_get_url(key), "STALE");
    }

    let artifacts = submitted.handle.wait().await.map_err(AppError::from)?;
    Ok(webp_response(artifacts.for_view(view), "RENDER"))
}

pub fn create_avatar_router() -> Router<AppState> {
    Router::new().route("/avatar/{type}/{file}", get(get_avatar))
}
