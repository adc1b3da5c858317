//! 纯函数合成器
//!
//! 输入：图层 → 已归一化精灵表的映射 + 两个布局标记 + chroma 模式。
//! 输出：2550×850 RGBA 精灵表；正面头像与缩略图都是它的确定性裁剪。
//! 全程无副作用，逐字节可复现。

use std::collections::HashMap;
use std::io::Cursor;

use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageFormat, RgbaImage};

use super::chroma;
use super::layers::{LayerKind, layer_order};
use crate::error::AppError;

/// 单帧宽度
pub const FRAME_WIDTH: u32 = 425;
/// 单帧高度
pub const FRAME_HEIGHT: u32 = 850;
/// 朝向数
pub const DIRECTION_COUNT: u32 = 6;
/// 精灵表宽度
pub const SHEET_WIDTH: u32 = FRAME_WIDTH * DIRECTION_COUNT;
/// 缩略图边长
pub const THUMBNAIL_SIZE: u32 = 218;
/// 缩略图在正面帧内的偏移
pub const THUMBNAIL_OFFSET: (u32, u32) = (103, 42);

/// 合成开关
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposeOptions {
    /// 鞋子画在裤装之下（来自 bottom 物品的 `!x` 标记）
    pub shoes_behind_pants: bool,
    /// 头发画在上衣/外套之上（来自 hair 物品的 `!s` 标记）
    pub hair_in_front_of_top: bool,
    /// 历史 chroma-key 模式；逐像素掩膜开销大，仅对旧资产启用
    pub chroma_key: bool,
}

/// 把任意部件贴图归一化为 2550×850 精灵表。
///
/// 合同内的两种尺寸：整表原样使用；单帧平铺 6 份（每个朝向同一画面）。
/// 合同外的尺寸先缩放到单帧再平铺，异常部件不允许让渲染失败。
pub fn normalize_to_sheet(img: RgbaImage) -> RgbaImage {
    let (w, h) = img.dimensions();
    if (w, h) == (SHEET_WIDTH, FRAME_HEIGHT) {
        return img;
    }
    let frame = if (w, h) == (FRAME_WIDTH, FRAME_HEIGHT) {
        img
    } else {
        imageops::resize(&img, FRAME_WIDTH, FRAME_HEIGHT, FilterType::Lanczos3)
    };
    let mut sheet = RgbaImage::new(SHEET_WIDTH, FRAME_HEIGHT);
    for dir in 0..DIRECTION_COUNT {
        imageops::replace(&mut sheet, &frame, (dir * FRAME_WIDTH) as i64, 0);
    }
    sheet
}

/// 十个部位纹身合并为单层（直通 alpha，按声明序叠放）。
pub fn merge_tattoos(sheets: &[RgbaImage]) -> Option<RgbaImage> {
    if sheets.is_empty() {
        return None;
    }
    let mut merged = RgbaImage::new(SHEET_WIDTH, FRAME_HEIGHT);
    for sheet in sheets {
        imageops::overlay(&mut merged, sheet, 0, 0);
    }
    Some(merged)
}

/// 合成六朝向精灵表。
///
/// 每个朝向独立走自己的次序表：从图层表中取整表、裁出该朝向的帧、
/// alpha-over 叠进画布对应的列。chroma 模式下先对帧做单图掩膜。
pub fn compose_sheet(
    layers: &HashMap<LayerKind, RgbaImage>,
    opts: ComposeOptions,
) -> RgbaImage {
    let mut canvas = RgbaImage::new(SHEET_WIDTH, FRAME_HEIGHT);

    for dir in 0..DIRECTION_COUNT {
        let x0 = (dir * FRAME_WIDTH) as i64;
        for slot in layer_order(dir as usize) {
            let Some(kind) = slot.resolve(opts.shoes_behind_pants, opts.hair_in_front_of_top)
            else {
                continue;
            };
            let Some(sheet) = layers.get(&kind) else {
                continue;
            };
            let mut frame =
                imageops::crop_imm(sheet, dir * FRAME_WIDTH, 0, FRAME_WIDTH, FRAME_HEIGHT)
                    .to_image();
            if opts.chroma_key {
                chroma::erase_self(&mut frame);
            }
            imageops::overlay(&mut canvas, &frame, x0, 0);
        }
    }

    canvas
}

/// 正面头像：帧 0 的整帧裁剪
pub fn avatar_frame(sheet: &RgbaImage) -> RgbaImage {
    imageops::crop_imm(sheet, 0, 0, FRAME_WIDTH, FRAME_HEIGHT).to_image()
}

/// 缩略图：帧 0 内 (103, 42) 处的 218×218 裁剪
pub fn thumbnail_frame(sheet: &RgbaImage) -> RgbaImage {
    imageops::crop_imm(
        sheet,
        THUMBNAIL_OFFSET.0,
        THUMBNAIL_OFFSET.1,
        THUMBNAIL_SIZE,
        THUMBNAIL_SIZE,
    )
    .to_image()
}

/// WebP 编码（无损）
pub fn encode_webp(img: &RgbaImage) -> Result<Vec<u8>, AppError> {
    let mut out = Vec::new();
    let enc = WebPEncoder::new_lossless(&mut out);
    enc.encode(
        img.as_raw(),
        img.width(),
        img.height(),
        ExtendedColorType::Rgba8,
    )
    .map_err(|e| AppError::Render(format!("WebP 编码失败: {e}")))?;
    Ok(out)
}

/// PNG 编码（部件缓存的统一落盘格式）
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, AppError> {
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img.clone())
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| AppError::Render(format!("PNG 编码失败: {e}")))?;
    Ok(out)
}

/// 解码任意受支持格式（CDN 的 webp、缓存的 png）为 RGBA
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, AppError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| AppError::Render(format!("图片解码失败: {e}")))?;
    Ok(img.to_rgba8())
}
