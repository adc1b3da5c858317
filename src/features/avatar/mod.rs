/// 定制记录指纹
pub mod fingerprint;
/// 请求解析
pub mod handler;
/// 数据模型（定制记录 / 用户与物品投影 / 视图类型）
pub mod models;

pub use fingerprint::{canonical_form, fingerprint};
pub use handler::create_avatar_router;
pub use models::{Customization, ItemInfo, ItemSelection, TattooSet, UserRecord, ViewKind};
