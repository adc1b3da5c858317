//! 部件贴图加载器
//!
//! 两层缓存 + 回源：内存层（moka，按解码后字节加权）、磁盘层
//! `cache/<md5(key)>.png`、CDN 回源 `item-sprite/<itemRef>.webp`。
//! 缺失引用与任何回源失败一律返回 None，缺部件不允许让渲染失败。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use md5::{Digest, Md5};
use moka::future::Cache;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::config::AppConfig;
use crate::features::cache::write_atomic;
use crate::features::compositor;
use crate::http;

/// 部件加载器。clone 共享缓存与限流器。
#[derive(Clone)]
pub struct PartLoader {
    cdn_base: String,
    cache_dir: PathBuf,
    bases_dir: PathBuf,
    memory: Cache<String, Arc<RgbaImage>>,
    fetch_limit: Arc<Semaphore>,
    breaker: CircuitBreaker,
}

impl PartLoader {
    pub fn new(config: &AppConfig, breaker: CircuitBreaker) -> Self {
        let memory = Cache::builder()
            .weigher(|_k, v: &Arc<RgbaImage>| {
                v.as_raw().len().min(u32::MAX as usize) as u32
            })
            .max_capacity(config.cache.part_memory_max_bytes)
            .time_to_live(Duration::from_secs(config.cache.part_memory_ttl_secs))
            .build();

        Self {
            cdn_base: config.cdn.base_url.trim_end_matches('/').to_string(),
            cache_dir: config.parts_cache_path(),
            bases_dir: config.bases_path(),
            memory,
            fetch_limit: Arc::new(Semaphore::new(config.render.part_fetch_parallel as usize)),
            breaker,
        }
    }

    /// 磁盘层文件名：key 的 128 位摘要，保证扁平且文件名安全
    fn disk_path(&self, key: &str) -> PathBuf {
        let digest = Md5::digest(key.as_bytes());
        self.cache_dir.join(format!("{}.png", hex::encode(digest)))
    }

    /// 按物品引用加载部件贴图。
    ///
    /// 命中顺序：内存 → 磁盘（回填内存）→ CDN 回源（回填两层，磁盘为
    /// fire-and-forget）。所有失败路径都被吸收为 None。
    pub async fn load_part(&self, item_ref: &str) -> Option<Arc<RgbaImage>> {
        let key = item_ref.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }

        if let Some(img) = self.memory.get(&key).await {
            return Some(img);
        }

        if let Some(img) = self.load_from_disk(&key).await {
            self.memory.insert(key, img.clone()).await;
            return Some(img);
        }

        let img = self.fetch_from_origin(&key, item_ref).await?;
        self.memory.insert(key, img.clone()).await;
        Some(img)
    }

    async fn load_from_disk(&self, key: &str) -> Option<Arc<RgbaImage>> {
        let path = self.disk_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("读取部件磁盘缓存失败 {:?}: {}", path, e);
                return None;
            }
        };
        let decoded = tokio::task::spawn_blocking(move || compositor::decode_rgba(&bytes))
            .await
            .ok()?
            .ok()?;
        debug!("部件磁盘缓存命中: {}", key);
        Some(Arc::new(decoded))
    }

    async fn fetch_from_origin(&self, key: &str, item_ref: &str) -> Option<Arc<RgbaImage>> {
        if self.cdn_base.is_empty() {
            return None;
        }
        if let Err(e) = self.breaker.try_acquire() {
            debug!("CDN 熔断中，跳过回源 {}: {}", item_ref, e);
            return None;
        }

        // 限制在途回源数量，冷启动风暴不能打满上游
        let _permit = self.fetch_limit.clone().acquire_owned().await.ok()?;

        let url = format!("{}/item-sprite/{}.webp", self.cdn_base, item_ref);
        let result = async {
            let client = http::client_fetch_30s()?;
            let resp = client.get(&url).send().await?;
            resp.error_for_status()?.bytes().await
        }
        .await;

        let body = match result {
            Ok(b) => {
                self.breaker.record_success();
                b
            }
            Err(e) => {
                self.breaker.record_failure();
                warn!("部件回源失败 {}: {}", url, e);
                return None;
            }
        };

        // 统一转码为 PNG 供下游使用；解码/编码都是 CPU 活，移出 runtime
        let decoded = tokio::task::spawn_blocking(move || {
            let img = compositor::decode_rgba(&body)?;
            let png = compositor::encode_png(&img)?;
            Ok::<_, crate::error::AppError>((img, png))
        })
        .await
        .ok()?;
        let (img, png) = match decoded {
            Ok(v) => v,
            Err(e) => {
                warn!("部件解码失败 {}: {}", item_ref, e);
                return None;
            }
        };

        // 磁盘写是 fire-and-forget，不阻塞渲染
        let path = self.disk_path(key);
        tokio::spawn(async move {
            if let Err(e) = write_atomic(&path, &png).await {
                warn!("部件磁盘缓存写入失败 {:?}: {}", path, e);
            }
        });

        debug!("部件回源成功: {}", item_ref);
        Some(Arc::new(img))
    }

    /// 加载身体基底图（本地 _bases/ 目录，内存层以 base: 前缀复用）
    pub async fn load_base(&self, file_name: &str) -> Option<Arc<RgbaImage>> {
        let key = format!("base:{}", file_name.to_lowercase());
        if let Some(img) = self.memory.get(&key).await {
            return Some(img);
        }
        let path = self.bases_dir.join(file_name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => {
                warn!("读取基底图失败 {:?}: {}", path, e);
                return None;
            }
        };
        let decoded = tokio::task::spawn_blocking(move || compositor::decode_rgba(&bytes))
            .await
            .ok()?
            .ok()?;
        let img = Arc::new(decoded);
        self.memory.insert(key, img.clone()).await;
        Some(img)
    }

    /// 清空内存层，返回清理前的条目数
    pub async fn purge_memory(&self) -> u64 {
        let n = self.memory.entry_count();
        self.memory.invalidate_all();
        self.memory.run_pending_tasks().await;
        n
    }

    /// 内存层条目数（健康检查用）
    pub fn memory_entries(&self) -> u64 {
        self.memory.entry_count()
    }

    /// CDN 熔断器状态（健康检查用）
    pub fn breaker_state(&self) -> crate::breaker::BreakerState {
        self.breaker.state()
    }
}
