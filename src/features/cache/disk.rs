//! 结果磁盘层
//!
//! 一指纹一文件：`avatars/<fingerprint>.webp`。写入走临时文件 + rename，
//! 读者要么看到完整旧文件要么看到完整新文件。超过保留期的文件由
//! 周期清扫任务回收。

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use axum::body::Bytes;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 原子落盘：同目录临时文件写完后 rename 替换目标
pub async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("tmp.{}", Uuid::new_v4().simple()));
    tokio::fs::write(&tmp, data).await?;
    match tokio::fs::rename(&tmp, path).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            Err(e)
        }
    }
}

/// 磁盘层
pub struct DiskTier {
    dir: PathBuf,
    retention: Duration,
}

impl DiskTier {
    pub fn new(dir: PathBuf, retention: Duration) -> Self {
        Self { dir, retention }
    }

    fn path_for(&self, fingerprint: u32) -> PathBuf {
        self.dir.join(format!("{fingerprint}.webp"))
    }

    /// 读取；缺失或读取失败都按未命中处理
    pub async fn read(&self, fingerprint: u32) -> Option<Bytes> {
        match tokio::fs::read(self.path_for(fingerprint)).await {
            Ok(data) => Some(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("读取磁盘缓存失败 fp={}: {}", fingerprint, e);
                None
            }
        }
    }

    pub async fn write(&self, fingerprint: u32, data: &[u8]) -> std::io::Result<()> {
        write_atomic(&self.path_for(fingerprint), data).await
    }

    /// 清空磁盘层，返回删除的文件数
    pub async fn remove_all(&self) -> usize {
        let mut removed = 0usize;
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return 0;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("webp")
                && tokio::fs::remove_file(&path).await.is_ok()
            {
                removed += 1;
            }
        }
        removed
    }

    /// 单轮清扫：删除修改时间早于保留期的条目
    pub async fn sweep_once(&self) -> usize {
        let cutoff = SystemTime::now()
            .checked_sub(self.retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0usize;
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return 0;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("webp") {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let Ok(modified) = meta.modified() else {
                continue;
            };
            if modified < cutoff {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        removed += 1;
                        debug!("清扫过期缓存: {:?}", path);
                    }
                    Err(e) => warn!("清扫删除失败 {:?}: {}", path, e),
                }
            }
        }
        removed
    }

    /// 当前条目数（健康检查用，尽力而为）
    pub async fn entry_count(&self) -> usize {
        let mut n = 0usize;
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return 0;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("webp") {
                n += 1;
            }
        }
        n
    }
}

/// 启动周期清扫任务（每天一轮）
pub fn spawn_sweeper(tier: std::sync::Arc<DiskTier>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // 第一次 tick 立即返回，先跳过，避免启动即全盘扫描
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = tier.sweep_once().await;
            if removed > 0 {
                info!("磁盘缓存清扫完成，删除 {} 个过期条目", removed);
            }
        }
    });
}
