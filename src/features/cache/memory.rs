//! 结果内存层
//!
//! 指纹 → 头像字节的 LRU，同时受条目数和字节预算约束，条目 TTL 随访问
//! 续期。读写都只短暂持锁，锁内不做任何 I/O。

use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use lru::LruCache;

struct Entry {
    data: Bytes,
    touched: Instant,
}

struct Inner {
    lru: LruCache<u32, Entry>,
    bytes: u64,
}

/// 条目数 + 字节双上限的 LRU 缓存
pub struct MemoryTier {
    max_entries: usize,
    max_bytes: u64,
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl MemoryTier {
    pub fn new(max_entries: usize, max_bytes: u64, ttl: Duration) -> Self {
        Self {
            max_entries: max_entries.max(1),
            max_bytes,
            ttl,
            inner: Mutex::new(Inner {
                // 容量交给手动逐出管理，字节记账才能保持准确
                lru: LruCache::unbounded(),
                bytes: 0,
            }),
        }
    }

    /// 命中即续期；过期条目在读取时惰性回收
    pub fn get(&self, fingerprint: u32) -> Option<Bytes> {
        let mut inner = self.inner.lock().expect("memory tier lock");
        let expired = match inner.lru.get_mut(&fingerprint) {
            Some(entry) => {
                if entry.touched.elapsed() <= self.ttl {
                    entry.touched = Instant::now();
                    return Some(entry.data.clone());
                }
                true
            }
            None => false,
        };
        if expired
            && let Some(entry) = inner.lru.pop(&fingerprint)
        {
            inner.bytes -= entry.data.len() as u64;
        }
        None
    }

    pub fn insert(&self, fingerprint: u32, data: Bytes) {
        // 单条超过总预算的条目直接放弃，避免立刻被自己逐出
        if data.len() as u64 > self.max_bytes {
            return;
        }
        let mut inner = self.inner.lock().expect("memory tier lock");
        if let Some(old) = inner.lru.pop(&fingerprint) {
            inner.bytes -= old.data.len() as u64;
        }
        inner.bytes += data.len() as u64;
        inner.lru.push(
            fingerprint,
            Entry {
                data,
                touched: Instant::now(),
            },
        );
        while inner.lru.len() > self.max_entries || inner.bytes > self.max_bytes {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => inner.bytes -= evicted.data.len() as u64,
                None => break,
            }
        }
    }

    /// 清空全部条目，返回清掉的条目数
    pub fn purge(&self) -> usize {
        let mut inner = self.inner.lock().expect("memory tier lock");
        let n = inner.lru.len();
        inner.lru.clear();
        inner.bytes = 0;
        n
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("memory tier lock").lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> u64 {
        self.inner.lock().expect("memory tier lock").bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(n: usize) -> Bytes {
        Bytes::from(vec![0u8; n])
    }

    #[test]
    fn entry_bound_evicts_least_recently_used() {
        let tier = MemoryTier::new(2, u64::MAX, Duration::from_secs(60));
        tier.insert(1, bytes(10));
        tier.insert(2, bytes(10));
        // 访问 1，使 2 成为 LRU
        assert!(tier.get(1).is_some());
        tier.insert(3, bytes(10));
        assert!(tier.get(2).is_none());
        assert!(tier.get(1).is_some());
        assert!(tier.get(3).is_some());
    }

    #[test]
    fn byte_bound_evicts_until_under_budget() {
        let tier = MemoryTier::new(100, 30, Duration::from_secs(60));
        tier.insert(1, bytes(15));
        tier.insert(2, bytes(15));
        tier.insert(3, bytes(15));
        assert!(tier.bytes() <= 30, "bytes={}", tier.bytes());
        assert!(tier.get(1).is_none());
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let tier = MemoryTier::new(10, 100, Duration::from_secs(60));
        tier.insert(1, bytes(101));
        assert!(tier.get(1).is_none());
        assert_eq!(tier.bytes(), 0);
    }

    #[test]
    fn replacing_entry_keeps_byte_accounting() {
        let tier = MemoryTier::new(10, 100, Duration::from_secs(60));
        tier.insert(1, bytes(40));
        tier.insert(1, bytes(20));
        assert_eq!(tier.bytes(), 20);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn ttl_expires_without_access() {
        let tier = MemoryTier::new(10, 100, Duration::from_millis(0));
        tier.insert(1, bytes(10));
        std::thread::sleep(Duration::from_millis(5));
        assert!(tier.get(1).is_none());
        assert_eq!(tier.bytes(), 0);
    }

    #[test]
    fn purge_clears_everything() {
        let tier = MemoryTier::new(10, 1000, Duration::from_secs(60));
        tier.insert(1, bytes(10));
        tier.insert(2, bytes(10));
        assert_eq!(tier.purge(), 2);
        assert!(tier.is_empty());
        assert_eq!(tier.bytes(), 0);
    }
}
