//! 分层次序表
//!
//! 精灵表共 6 个朝向，帧索引与物理朝向的对应关系固定为：
//!
//! | 帧 | 朝向 |
//! |---|---|
//! | 0 | 正面 front |
//! | 1 | 左侧面 side-left |
//! | 2 | 左前四分之三 three-quarter-left |
//! | 3 | 背面 back |
//! | 4 | 右侧面 side-right |
//! | 5 | 右前四分之三 three-quarter-right |
//!
//! 四张次序表（自底向上）分别服务于正面 / 侧面 {1,4} / 四分之三 {2,5} /
//! 背面。除固定槽位外还有六个条件伪层：
//!
//! - `shoes_before` / `shoes_after`：同一张鞋子贴图只画入其中一个位置。
//!   后缀沿用旧资产清单的自顶向下书写顺序，因此 `shoes_after` 位于
//!   `bottom` 之下、`shoes_before` 位于其上；`shoes_behind_pants` 为真时
//!   选 `shoes_after`（裤装遮住鞋子），为假时选 `shoes_before`。
//! - `hair_behind` / `hair_in_front`：头发相对上衣/外套的前后位置，
//!   `hair_in_front_of_top` 为真时选 `hair_in_front`。
//! - `tattoos`：十个部位纹身先以直通 alpha 合并为一层，再按单层参与排序。
//!
//! | # | front | sides {1,4} | three-quarters {2,5} | back |
//! |---|-------|-------------|----------------------|------|
//! | 1 | wings | wings | wings | handheld |
//! | 2 | bag | base | bag | makeup |
//! | 3 | base | tattoos | base | eyes |
//! | 4 | tattoos | socks | tattoos | eyebrows |
//! | 5 | socks | shoes_after | socks | nose |
//! | 6 | shoes_after | bottom | shoes_after | mouth |
//! | 7 | bottom | shoes_before | bottom | beard |
//! | 8 | shoes_before | belt | shoes_before | piercings |
//! | 9 | belt | hair_behind | belt | ear_piece |
//! | 10 | hair_behind | top | hair_behind | glasses |
//! | 11 | top | necklace | top | head |
//! | 12 | necklace | coat | necklace | base |
//! | 13 | coat | neckwear | coat | tattoos |
//! | 14 | neckwear | bag | neckwear | socks |
//! | 15 | gloves | gloves | bracelets | shoes_after |
//! | 16 | bracelets | bracelets | gloves | bottom |
//! | 17 | head | head | head | shoes_before |
//! | 18 | makeup | makeup | makeup | belt |
//! | 19 | eyes | eyes | eyes | top |
//! | 20 | eyebrows | eyebrows | eyebrows | necklace |
//! | 21 | nose | nose | nose | coat |
//! | 22 | mouth | mouth | mouth | neckwear |
//! | 23 | beard | beard | beard | gloves |
//! | 24 | piercings | piercings | piercings | bracelets |
//! | 25 | ear_piece | ear_piece | ear_piece | hair_behind |
//! | 26 | hair_in_front | hair_in_front | hair_in_front | hair_in_front |
//! | 27 | horns | horns | horns | hat |
//! | 28 | glasses | glasses | glasses | horns |
//! | 29 | hat | hat | hat | bag |
//! | 30 | handheld | handheld | handheld | wings |

/// 可绘制图层。`Hair` 与 `Shoes` 只经由伪层进入次序表。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Base,
    Tattoos,
    Makeup,
    Hair,
    Beard,
    Eyes,
    Eyebrows,
    Head,
    Nose,
    Mouth,
    Hat,
    Piercings,
    EarPiece,
    Glasses,
    Horns,
    Top,
    Necklace,
    Neckwear,
    Coat,
    Belt,
    Bottom,
    Socks,
    Shoes,
    Bracelets,
    Wings,
    Bag,
    Gloves,
    Handheld,
}

/// 次序表条目：固定槽位或条件伪层
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerSlot {
    Fixed(LayerKind),
    ShoesBefore,
    ShoesAfter,
    HairBehind,
    HairInFront,
}

use LayerKind::*;
use LayerSlot::*;

/// 正面（帧 0），自底向上
pub static FRONT_ORDER: &[LayerSlot] = &[
    Fixed(Wings),
    Fixed(Bag),
    Fixed(Base),
    Fixed(Tattoos),
    Fixed(Socks),
    ShoesAfter,
    Fixed(Bottom),
    ShoesBefore,
    Fixed(Belt),
    HairBehind,
    Fixed(Top),
    Fixed(Necklace),
    Fixed(Coat),
    Fixed(Neckwear),
    Fixed(Gloves),
    Fixed(Bracelets),
    Fixed(Head),
    Fixed(Makeup),
    Fixed(Eyes),
    Fixed(Eyebrows),
    Fixed(Nose),
    Fixed(Mouth),
    Fixed(Beard),
    Fixed(Piercings),
    Fixed(EarPiece),
    HairInFront,
    Fixed(Horns),
    Fixed(Glasses),
    Fixed(Hat),
    Fixed(Handheld),
];

/// 侧面（帧 1、4），自底向上。背包在侧视时位于外套之上。
pub static SIDE_ORDER: &[LayerSlot] = &[
    Fixed(Wings),
    Fixed(Base),
    Fixed(Tattoos),
    Fixed(Socks),
    ShoesAfter,
    Fixed(Bottom),
    ShoesBefore,
    Fixed(Belt),
    HairBehind,
    Fixed(Top),
    Fixed(Necklace),
    Fixed(Coat),
    Fixed(Neckwear),
    Fixed(Bag),
    Fixed(Gloves),
    Fixed(Bracelets),
    Fixed(Head),
    Fixed(Makeup),
    Fixed(Eyes),
    Fixed(Eyebrows),
    Fixed(Nose),
    Fixed(Mouth),
    Fixed(Beard),
    Fixed(Piercings),
    Fixed(EarPiece),
    HairInFront,
    Fixed(Horns),
    Fixed(Glasses),
    Fixed(Hat),
    Fixed(Handheld),
];

/// 四分之三（帧 2、5），自底向上。手镯压在手套之下。
pub static THREE_QUARTER_ORDER: &[LayerSlot] = &[
    Fixed(Wings),
    Fixed(Bag),
    Fixed(Base),
    Fixed(Tattoos),
    Fixed(Socks),
    ShoesAfter,
    Fixed(Bottom),
    ShoesBefore,
    Fixed(Belt),
    HairBehind,
    Fixed(Top),
    Fixed(Necklace),
    Fixed(Coat),
    Fixed(Neckwear),
    Fixed(Bracelets),
    Fixed(Gloves),
    Fixed(Head),
    Fixed(Makeup),
    Fixed(Eyes),
    Fixed(Eyebrows),
    Fixed(Nose),
    Fixed(Mouth),
    Fixed(Beard),
    Fixed(Piercings),
    Fixed(EarPiece),
    HairInFront,
    Fixed(Horns),
    Fixed(Glasses),
    Fixed(Hat),
    Fixed(Handheld),
];

/// 背面（帧 3），自底向上。面部图层几乎全部被身体遮挡，
/// 头发盖住外套衣领，背包与翅膀最后绘制。
pub static BACK_ORDER: &[LayerSlot] = &[
    Fixed(Handheld),
    Fixed(Makeup),
    Fixed(Eyes),
    Fixed(Eyebrows),
    Fixed(Nose),
    Fixed(Mouth),
    Fixed(Beard),
    Fixed(Piercings),
    Fixed(EarPiece),
    Fixed(Glasses),
    Fixed(Head),
    Fixed(Base),
    Fixed(Tattoos),
    Fixed(Socks),
    ShoesAfter,
    Fixed(Bottom),
    ShoesBefore,
    Fixed(Belt),
    Fixed(Top),
    Fixed(Necklace),
    Fixed(Coat),
    Fixed(Neckwear),
    Fixed(Gloves),
    Fixed(Bracelets),
    HairBehind,
    HairInFront,
    Fixed(Hat),
    Fixed(Horns),
    Fixed(Bag),
    Fixed(Wings),
];

/// 朝向 → 次序表
pub fn layer_order(direction: usize) -> &'static [LayerSlot] {
    match direction {
        0 => FRONT_ORDER,
        1 | 4 => SIDE_ORDER,
        2 | 5 => THREE_QUARTER_ORDER,
        3 => BACK_ORDER,
        _ => unreachable!("direction out of range: {direction}"),
    }
}

impl LayerSlot {
    /// 按两个布局标记把条目解析成实际要画的图层；
    /// 伪层在不匹配的分支返回 None（同一贴图绝不画两次）。
    pub fn resolve(
        &self,
        shoes_behind_pants: bool,
        hair_in_front_of_top: bool,
    ) -> Option<LayerKind> {
        match self {
            Fixed(kind) => Some(*kind),
            ShoesBefore => (!shoes_behind_pants).then_some(Shoes),
            ShoesAfter => shoes_behind_pants.then_some(Shoes),
            HairBehind => (!hair_in_front_of_top).then_some(Hair),
            HairInFront => hair_in_front_of_top.then_some(Hair),
        }
    }
}
