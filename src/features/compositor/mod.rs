/// 历史 chroma-key 掩膜
pub mod chroma;
/// 纯函数合成
pub mod compose;
/// 分层次序表与朝向约定
pub mod layers;

pub use compose::{
    ComposeOptions, DIRECTION_COUNT, FRAME_HEIGHT, FRAME_WIDTH, SHEET_WIDTH, THUMBNAIL_OFFSET,
    THUMBNAIL_SIZE, avatar_frame, compose_sheet, decode_rgba, encode_png, encode_webp,
    merge_tattoos, normalize_to_sheet, thumbnail_frame,
};
pub use layers::{LayerKind, LayerSlot, layer_order};
