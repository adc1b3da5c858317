/// 结果磁盘层（原子写 + 周期清扫）
pub mod disk;
/// 结果内存层（条目数 + 字节双上限 LRU）
pub mod memory;

pub use disk::{DiskTier, spawn_sweeper, write_atomic};
pub use memory::MemoryTier;

use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

/// 本地两层结果缓存。远端对象存储是规范副本，由渲染管线直写。
pub struct ResultCache {
    pub memory: MemoryTier,
    pub disk: Arc<DiskTier>,
}

impl ResultCache {
    pub fn new(cfg: &CacheConfig, avatars_dir: std::path::PathBuf) -> Self {
        Self {
            memory: MemoryTier::new(
                cfg.memory_max_entries,
                cfg.memory_max_bytes,
                cfg.memory_ttl(),
            ),
            disk: Arc::new(DiskTier::new(avatars_dir, cfg.disk_retention())),
        }
    }

    /// 启动磁盘清扫任务
    pub fn start_sweeper(&self, interval: Duration) {
        spawn_sweeper(self.disk.clone(), interval);
    }
}
