//! 渲染管线
//!
//! worker 实际执行的任务体：解析布局标记 → 并发拉取部件 → 合并纹身 →
//! 阻塞线程上合成 + 编码 → 本地落盘 → 远端直写 → 用户记录登记。
//!
//! 错误吸收策略：部件缺失/拉取失败直接跳过该层；本地缓存写失败只记
//! 日志；远端写失败跳过登记（customizationHash 保持不变，下次请求会
//! 重新触发渲染）。只有合成/编码本身的失败才让任务失败。

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use image::RgbaImage;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::features::avatar::models::{Customization, UserRecord, ViewKind};
use crate::features::cache::ResultCache;
use crate::features::compositor::{
    self, ComposeOptions, LayerKind,
};
use crate::features::parts::PartLoader;
use crate::features::queue::JobError;
use crate::features::storage::SpacesClient;
use crate::features::users::{SharedItemCatalog, SharedUserDirectory};

/// 一次渲染的三件产物（均为 WebP 字节）
#[derive(Debug, Clone)]
pub struct RenderArtifacts {
    /// 425×850 正面头像
    pub avatar: Bytes,
    /// 2550×850 六朝向精灵表
    pub sheet: Bytes,
    /// 218×218 缩略图
    pub thumbnail: Bytes,
}

impl RenderArtifacts {
    pub fn for_view(&self, view: ViewKind) -> Bytes {
        match view {
            ViewKind::Avatar => self.avatar.clone(),
            ViewKind::Sprite => self.sheet.clone(),
            ViewKind::Thumbnail => self.thumbnail.clone(),
        }
    }
}

/// 渲染管线。clone 共享各组件句柄。
#[derive(Clone)]
pub struct RenderPipeline {
    parts: Arc<PartLoader>,
    results: Arc<ResultCache>,
    store: Arc<SpacesClient>,
    users: SharedUserDirectory,
    items: SharedItemCatalog,
}

/// 命名槽位 → 图层的固定映射
fn slot_layers(c: &Customization) -> Vec<(LayerKind, String)> {
    use LayerKind::*;
    let pairs: [(LayerKind, Option<&crate::features::avatar::models::ItemSelection>); 26] = [
        (Makeup, c.makeup.as_ref()),
        (Hair, c.hair.as_ref()),
        (Beard, c.beard.as_ref()),
        (Eyes, c.eyes.as_ref()),
        (Eyebrows, c.eyebrows.as_ref()),
        (Head, c.head.as_ref()),
        (Nose, c.nose.as_ref()),
        (Mouth, c.mouth.as_ref()),
        (Hat, c.hat.as_ref()),
        (Piercings, c.piercings.as_ref()),
        (EarPiece, c.ear_piece.as_ref()),
        (Glasses, c.glasses.as_ref()),
        (Horns, c.horns.as_ref()),
        (Top, c.top.as_ref()),
        (Necklace, c.necklace.as_ref()),
        (Neckwear, c.neckwear.as_ref()),
        (Coat, c.coat.as_ref()),
        (Belt, c.belt.as_ref()),
        (Bottom, c.bottom.as_ref()),
        (Socks, c.socks.as_ref()),
        (Shoes, c.shoes.as_ref()),
        (Bracelets, c.bracelets.as_ref()),
        (Wings, c.wings.as_ref()),
        (Bag, c.bag.as_ref()),
        (Gloves, c.gloves.as_ref()),
        (Handheld, c.handheld.as_ref()),
    ];
    pairs
        .into_iter()
        .filter_map(|(kind, sel)| sel.map(|s| (kind, s.item.clone())))
        .collect()
}

impl RenderPipeline {
    pub fn new(
        parts: Arc<PartLoader>,
        results: Arc<ResultCache>,
        store: Arc<SpacesClient>,
        users: SharedUserDirectory,
        items: SharedItemCatalog,
    ) -> Self {
        Self {
            parts,
            results,
            store,
            users,
            items,
        }
    }

    /// 渲染一个用户并完成全部写回。
    pub async fn render_user(&self, user: UserRecord, fingerprint: u32) -> Result<RenderArtifacts, JobError> {
        let c = &user.customization;
        let (shoes_behind_pants, hair_in_front_of_top) = self.items.layout_flags(c);
        let opts = ComposeOptions {
            shoes_behind_pants,
            hair_in_front_of_top,
            chroma_key: c.chroma_key,
        };

        // 基底 + 命名槽位并发拉取；回源并发由加载器内部的限流器约束
        let mut set: JoinSet<(LayerKind, Option<Arc<RgbaImage>>)> = JoinSet::new();
        {
            let parts = self.parts.clone();
            let base_name = c.base_image_name();
            set.spawn(async move { (LayerKind::Base, parts.load_base(&base_name).await) });
        }
        for (kind, item_ref) in slot_layers(c) {
            let parts = self.parts.clone();
            set.spawn(async move { (kind, parts.load_part(&item_ref).await) });
        }

        let mut loaded: Vec<(LayerKind, Arc<RgbaImage>)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((kind, Some(img))) => loaded.push((kind, img)),
                Ok((kind, None)) => debug!("图层缺失，跳过: {:?}", kind),
                Err(e) => warn!("部件加载任务失败: {}", e),
            }
        }

        // 纹身十个子槽位按声明序拉取后合并为单层
        let mut tattoo_images: Vec<Arc<RgbaImage>> = Vec::new();
        for (_, sel) in user.customization.tattoos.slots() {
            if let Some(sel) = sel
                && let Some(img) = self.parts.load_part(&sel.item).await
            {
                tattoo_images.push(img);
            }
        }

        // 合成 + 编码是纯 CPU 活，整体移出 runtime
        let artifacts = tokio::task::spawn_blocking(move || {
            let mut layers: HashMap<LayerKind, RgbaImage> = HashMap::new();
            for (kind, img) in loaded {
                layers.insert(kind, compositor::normalize_to_sheet((*img).clone()));
            }
            let tattoo_sheets: Vec<RgbaImage> = tattoo_images
                .iter()
                .map(|img| compositor::normalize_to_sheet((**img).clone()))
                .collect();
            if let Some(merged) = compositor::merge_tattoos(&tattoo_sheets) {
                layers.insert(LayerKind::Tattoos, merged);
            }

            let sheet = compositor::compose_sheet(&layers, opts);
            let avatar = compositor::avatar_frame(&sheet);
            let thumbnail = compositor::thumbnail_frame(&sheet);

            Ok::<_, crate::error::AppError>(RenderArtifacts {
                avatar: Bytes::from(compositor::encode_webp(&avatar)?),
                sheet: Bytes::from(compositor::encode_webp(&sheet)?),
                thumbnail: Bytes::from(compositor::encode_webp(&thumbnail)?),
            })
        })
        .await
        .map_err(|e| JobError::Failed(format!("合成任务执行失败: {e}")))?
        .map_err(|e| JobError::Failed(e.to_string()))?;

        self.write_back(&user, fingerprint, &artifacts).await;

        Ok(artifacts)
    }

    /// 写回顺序固定：本地磁盘 → 三个远端对象 → 用户记录单次更新。
    /// 任何一步失败都不影响已生成的产物返回给客户端。
    async fn write_back(&self, user: &UserRecord, fingerprint: u32, artifacts: &RenderArtifacts) {
        // 本地磁盘先写，下一次本节点命中免费
        if let Err(e) = self.results.disk.write(fingerprint, &artifacts.avatar).await {
            warn!("结果磁盘写入失败 fp={}: {}", fingerprint, e);
        }
        self.results.memory.insert(fingerprint, artifacts.avatar.clone());

        let avatar_key = ViewKind::Avatar.object_key(&user.username);
        let clothing_key = ViewKind::Sprite.object_key(&user.username);
        let thumbnail_key = ViewKind::Thumbnail.object_key(&user.username);

        if self.store.is_configured() {
            let puts = [
                (&avatar_key, &artifacts.avatar),
                (&clothing_key, &artifacts.sheet),
                (&thumbnail_key, &artifacts.thumbnail),
            ];
            for (key, data) in puts {
                if let Err(e) = self.store.put(key, data.clone(), "image/webp").await {
                    // 远端没写全就不登记哈希，下次请求会重试整个渲染
                    warn!("远端对象写入失败 {}: {}", key, e);
                    return;
                }
            }
        }

        if let Err(e) = self
            .users
            .record_render(
                &user.username,
                fingerprint,
                avatar_key,
                clothing_key,
                thumbnail_key,
            )
            .await
        {
            warn!("用户记录更新失败 {}: {}", user.username, e);
            return;
        }
        info!(
            user = %user.username,
            fingerprint,
            "渲染写回完成"
        );
    }
}
