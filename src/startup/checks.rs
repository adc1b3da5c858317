use axum::body::Bytes;
use std::fs;
use std::path::Path;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::features::compositor::{self, FRAME_HEIGHT, FRAME_WIDTH};

/// 执行启动检查
///
/// 1. 检查并创建 avatars/、cache/、_bases/ 目录
/// 2. 校验对象存储与 CDN 配置（仅告警，不阻断启动）
pub async fn run_startup_checks(config: &AppConfig) -> Result<(), AppError> {
    tracing::info!("🔍 开始执行启动检查...");

    ensure_dir(&config.avatars_path())?;
    ensure_dir(&config.parts_cache_path())?;
    ensure_dir(&config.bases_path())?;

    if !config.spaces.is_configured() {
        tracing::warn!("对象存储网关未配置（DO_ENDPOINT / DO_SPACE_NAME），远端层将被跳过");
    }
    if config.cdn.base_url.is_empty() {
        tracing::warn!("部件 CDN 未配置（DO_SPACE_ENDPOINT），冷部件将无法回源");
    }
    if config.server.tls_cert_path.is_some() || config.server.tls_key_path.is_some() {
        tracing::info!("检测到 TLS 证书路径配置，本构建由边缘代理终结 TLS，证书仅供部署侧使用");
    }

    tracing::info!("✅ 启动检查完成");
    Ok(())
}

/// 确保目录存在
fn ensure_dir(path: &Path) -> Result<(), AppError> {
    if !path.exists() {
        tracing::warn!("📁 目录缺失，正在创建: {:?}", path);
        fs::create_dir_all(path)
            .map_err(|e| AppError::Internal(format!("创建目录失败 {path:?}: {e}")))?;
    }
    Ok(())
}

/// 加载内置默认资产。
///
/// 优先读 `_default.webp`；缺失时合成一张透明单帧并落盘，
/// 保证过载兜底路径始终有内容可回。
pub async fn load_default_asset(config: &AppConfig) -> Option<Bytes> {
    let path = config.default_asset_path();
    match tokio::fs::read(&path).await {
        Ok(data) => {
            tracing::info!("默认资产已载入: {:?} ({} bytes)", path, data.len());
            return Some(Bytes::from(data));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!("读取默认资产失败 {:?}: {}", path, e);
            return None;
        }
    }

    // 合成透明单帧
    let encoded = tokio::task::spawn_blocking(|| {
        let blank = image::RgbaImage::new(FRAME_WIDTH, FRAME_HEIGHT);
        compositor::encode_webp(&blank)
    })
    .await
    .ok()?
    .ok()?;

    if let Err(e) = crate::features::cache::write_atomic(&path, &encoded).await {
        tracing::warn!("默认资产落盘失败 {:?}: {}", path, e);
    } else {
        tracing::info!("默认资产已合成: {:?}", path);
    }
    Some(Bytes::from(encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn startup_creates_data_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.resources.base_path = tmp.path().to_string_lossy().to_string();

        run_startup_checks(&cfg).await.unwrap();
        assert!(cfg.avatars_path().is_dir());
        assert!(cfg.parts_cache_path().is_dir());
        assert!(cfg.bases_path().is_dir());
    }

    #[tokio::test]
    async fn default_asset_is_synthesized_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.resources.base_path = tmp.path().to_string_lossy().to_string();

        let asset = load_default_asset(&cfg).await.expect("synthesized asset");
        assert!(!asset.is_empty());
        // 合成产物可解码且尺寸正确
        let img = compositor::decode_rgba(&asset).unwrap();
        assert_eq!(img.dimensions(), (FRAME_WIDTH, FRAME_HEIGHT));
        // 第二次调用读取落盘副本
        let again = load_default_asset(&cfg).await.unwrap();
        assert_eq!(asset, again);
    }
}
