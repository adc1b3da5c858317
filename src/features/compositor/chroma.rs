//! 历史 chroma-key 掩膜
//!
//! 旧资产用近似绿幕色标记需要抠除的区域：目标色 (0, 255, 4)，
//! 逐通道容差 (±50, ±150, ±50)。仅完全不透明的像素参与匹配，
//! 命中后把对应像素的 alpha 置零。新资产已预抠好，不会走到这条路径。

use image::RgbaImage;

/// 目标色
pub const CHROMA_TARGET: [u8; 3] = [0, 255, 4];
/// 逐通道容差
pub const CHROMA_TOLERANCE: [u8; 3] = [50, 150, 50];

#[inline]
fn in_target_box(r: u8, g: u8, b: u8) -> bool {
    let hit = |v: u8, target: u8, tol: u8| {
        let lo = target.saturating_sub(tol);
        let hi = target.saturating_add(tol);
        v >= lo && v <= hi
    };
    hit(r, CHROMA_TARGET[0], CHROMA_TOLERANCE[0])
        && hit(g, CHROMA_TARGET[1], CHROMA_TOLERANCE[1])
        && hit(b, CHROMA_TARGET[2], CHROMA_TOLERANCE[2])
}

/// 双图形式：mask 中完全不透明且命中目标色盒的像素，
/// 让 src 的同位置像素完全透明。两图尺寸必须一致。
pub fn erase_masked(src: &mut RgbaImage, mask: &RgbaImage) {
    debug_assert_eq!(src.dimensions(), mask.dimensions());
    for (src_px, mask_px) in src.pixels_mut().zip(mask.pixels()) {
        let [r, g, b, a] = mask_px.0;
        if a == 255 && in_target_box(r, g, b) {
            src_px.0[3] = 0;
        }
    }
}

/// 单图形式：抠除图像自身命中目标色盒的完全不透明像素。
pub fn erase_self(img: &mut RgbaImage) {
    for px in img.pixels_mut() {
        let [r, g, b, a] = px.0;
        if a == 255 && in_target_box(r, g, b) {
            px.0[3] = 0;
        }
    }
}
