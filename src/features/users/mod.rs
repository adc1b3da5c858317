//! 用户与物品投影
//!
//! 外部用户库 / 物品库对本服务只是只读键值查询，启动时从 JSON 投影
//! 文件整体载入内存。渲染成功后的哈希与对象键登记写回内存投影，
//! 并尽力持久化回文件（失败只记日志，下次请求会重新渲染）。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::AppError;
use crate::features::avatar::models::{Customization, ItemInfo, UserRecord};
use crate::features::cache::write_atomic;

/// 用户投影目录
pub struct UserDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
    persist_path: Option<PathBuf>,
}

impl UserDirectory {
    /// 空目录（测试用）
    pub fn empty() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            persist_path: None,
        }
    }

    /// 从投影文件载入；文件缺失按空目录处理（服务仍可启动）
    pub async fn load(path: PathBuf) -> Result<Self, AppError> {
        let users = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let list: Vec<UserRecord> = serde_json::from_slice(&raw)
                    .map_err(|e| AppError::Internal(format!("用户投影解析失败: {e}")))?;
                list.into_iter()
                    .map(|u| (u.username.clone(), u))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("用户投影文件缺失 {:?}，以空目录启动", path);
                HashMap::new()
            }
            Err(e) => return Err(AppError::Internal(format!("读取用户投影失败: {e}"))),
        };
        info!("用户投影载入完成: {} 个用户", users.len());
        Ok(Self {
            users: RwLock::new(users),
            persist_path: Some(path),
        })
    }

    pub async fn get(&self, username: &str) -> Option<UserRecord> {
        self.users.read().await.get(username).cloned()
    }

    /// 写入或覆盖一条用户记录（投影同步 / 测试装配）
    pub async fn upsert(&self, user: UserRecord) {
        self.users.write().await.insert(user.username.clone(), user);
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// 渲染成功后的单次登记：哈希与三个对象键一起更新。
    ///
    /// 这是「要么全更新、要么哈希不变」不变量的唯一写入点。
    pub async fn record_render(
        &self,
        username: &str,
        fingerprint: u32,
        avatar_key: String,
        clothing_key: String,
        thumbnail_key: String,
    ) -> Result<(), AppError> {
        {
            let mut users = self.users.write().await;
            let user = users
                .get_mut(username)
                .ok_or_else(|| AppError::NotFound(username.to_string()))?;
            user.customization_hash = Some(fingerprint);
            user.avatar_key = Some(avatar_key);
            user.clothing_key = Some(clothing_key);
            user.thumbnail_key = Some(thumbnail_key);
        }
        self.persist().await;
        Ok(())
    }

    /// 尽力持久化投影；失败只告警
    async fn persist(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let snapshot: Vec<UserRecord> = {
            let users = self.users.read().await;
            users.values().cloned().collect()
        };
        match serde_json::to_vec_pretty(&snapshot) {
            Ok(raw) => {
                if let Err(e) = write_atomic(path, &raw).await {
                    warn!("用户投影持久化失败 {:?}: {}", path, e);
                }
            }
            Err(e) => warn!("用户投影序列化失败: {}", e),
        }
    }
}

/// 物品投影目录。只有 description 中的两个布局标记会被读取。
pub struct ItemCatalog {
    items: HashMap<String, ItemInfo>,
}

impl ItemCatalog {
    pub fn empty() -> Self {
        Self {
            items: HashMap::new(),
        }
    }

    pub fn from_items(list: Vec<ItemInfo>) -> Self {
        Self {
            items: list.into_iter().map(|i| (i.id.clone(), i)).collect(),
        }
    }

    /// 从投影文件载入；缺失按空目录处理（布局标记全部回退 false）
    pub async fn load(path: PathBuf) -> Result<Self, AppError> {
        match tokio::fs::read(&path).await {
            Ok(raw) => {
                let list: Vec<ItemInfo> = serde_json::from_slice(&raw)
                    .map_err(|e| AppError::Internal(format!("物品投影解析失败: {e}")))?;
                info!("物品投影载入完成: {} 个物品", list.len());
                Ok(Self::from_items(list))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("物品投影文件缺失 {:?}，布局标记将全部默认 false", path);
                Ok(Self::empty())
            }
            Err(e) => Err(AppError::Internal(format!("读取物品投影失败: {e}"))),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ItemInfo> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 从定制记录解析两个布局标记：
    /// `!x` 取自 bottom 物品，`!s` 取自 hair 物品；查不到一律 false。
    pub fn layout_flags(&self, customization: &Customization) -> (bool, bool) {
        let shoes_behind_pants = customization
            .bottom
            .as_ref()
            .and_then(|sel| self.get(&sel.item))
            .map(|item| item.shoes_behind_pants())
            .unwrap_or(false);
        let hair_in_front_of_top = customization
            .hair
            .as_ref()
            .and_then(|sel| self.get(&sel.item))
            .map(|item| item.hair_in_front_of_top())
            .unwrap_or(false);
        (shoes_behind_pants, hair_in_front_of_top)
    }
}

/// 共享句柄别名
pub type SharedUserDirectory = Arc<UserDirectory>;
pub type SharedItemCatalog = Arc<ItemCatalog>;
