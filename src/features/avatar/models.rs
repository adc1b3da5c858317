use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 性别，与基底图文件名的第一段对应
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    #[default]
    Male,
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }
}

/// 体型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BodyVariant {
    Slim,
    #[default]
    Average,
    Broad,
}

impl BodyVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyVariant::Slim => "slim",
            BodyVariant::Average => "average",
            BodyVariant::Broad => "broad",
        }
    }
}

/// 槽位取值：物品引用 + 槽位专属的附加属性。
///
/// 属性对合成器完全不透明，但参与指纹计算（BTreeMap 保证键序稳定）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, utoipa::ToSchema)]
pub struct ItemSelection {
    /// 物品引用（对端数据库主键的字符串形式）
    pub item: String,
    /// 槽位专属属性（颜色、变体等），原样进指纹
    #[serde(flatten)]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

impl ItemSelection {
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// 规范化片段：`item` 后跟按键排序的属性对
    pub fn canonical_fragment(&self) -> String {
        if self.attrs.is_empty() {
            return self.item.clone();
        }
        let mut out = self.item.clone();
        for (k, v) in &self.attrs {
            out.push('|');
            out.push_str(k);
            out.push('=');
            out.push_str(&v.to_string());
        }
        out
    }
}

/// 纹身子记录：十个按身体部位命名的子槽位
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct TattooSet {
    pub head: Option<ItemSelection>,
    pub neck: Option<ItemSelection>,
    pub chest: Option<ItemSelection>,
    pub stomach: Option<ItemSelection>,
    pub back_upper: Option<ItemSelection>,
    pub back_lower: Option<ItemSelection>,
    pub arm_right: Option<ItemSelection>,
    pub arm_left: Option<ItemSelection>,
    pub leg_right: Option<ItemSelection>,
    pub leg_left: Option<ItemSelection>,
}

impl TattooSet {
    /// 固定声明序遍历（指纹与渲染共用同一顺序）
    pub fn slots(&self) -> [(&'static str, Option<&ItemSelection>); 10] {
        [
            ("head", self.head.as_ref()),
            ("neck", self.neck.as_ref()),
            ("chest", self.chest.as_ref()),
            ("stomach", self.stomach.as_ref()),
            ("backUpper", self.back_upper.as_ref()),
            ("backLower", self.back_lower.as_ref()),
            ("armRight", self.arm_right.as_ref()),
            ("armLeft", self.arm_left.as_ref()),
            ("legRight", self.leg_right.as_ref()),
            ("legLeft", self.leg_left.as_ref()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.slots().iter().all(|(_, v)| v.is_none())
    }
}

/// 用户形象定制记录。
///
/// 固定槽位集合的类型化版本：声明顺序即规范化顺序，新增槽位必须同时
/// 更新 `slots()`，否则指纹会漏掉该槽位。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Customization {
    pub sex: Sex,
    pub body_variant: BodyVariant,
    /// 肤色序号，与 _bases/ 下的基底图一一对应
    pub skin_tone: u8,
    /// 历史 chroma-key 合成模式；不同模式的产物不能共用缓存，因此进指纹
    pub chroma_key: bool,

    pub makeup: Option<ItemSelection>,
    pub hair: Option<ItemSelection>,
    pub beard: Option<ItemSelection>,
    pub eyes: Option<ItemSelection>,
    pub eyebrows: Option<ItemSelection>,
    pub head: Option<ItemSelection>,
    pub nose: Option<ItemSelection>,
    pub mouth: Option<ItemSelection>,
    pub hat: Option<ItemSelection>,
    pub piercings: Option<ItemSelection>,
    pub ear_piece: Option<ItemSelection>,
    pub glasses: Option<ItemSelection>,
    pub horns: Option<ItemSelection>,
    pub top: Option<ItemSelection>,
    pub necklace: Option<ItemSelection>,
    pub neckwear: Option<ItemSelection>,
    pub coat: Option<ItemSelection>,
    pub belt: Option<ItemSelection>,
    pub bottom: Option<ItemSelection>,
    pub socks: Option<ItemSelection>,
    pub shoes: Option<ItemSelection>,
    pub bracelets: Option<ItemSelection>,
    pub wings: Option<ItemSelection>,
    pub bag: Option<ItemSelection>,
    pub gloves: Option<ItemSelection>,
    pub handheld: Option<ItemSelection>,

    pub tattoos: TattooSet,
}

impl Customization {
    /// 固定声明序遍历全部命名槽位
    pub fn slots(&self) -> [(&'static str, Option<&ItemSelection>); 26] {
        [
            ("makeup", self.makeup.as_ref()),
            ("hair", self.hair.as_ref()),
            ("beard", self.beard.as_ref()),
            ("eyes", self.eyes.as_ref()),
            ("eyebrows", self.eyebrows.as_ref()),
            ("head", self.head.as_ref()),
            ("nose", self.nose.as_ref()),
            ("mouth", self.mouth.as_ref()),
            ("hat", self.hat.as_ref()),
            ("piercings", self.piercings.as_ref()),
            ("earPiece", self.ear_piece.as_ref()),
            ("glasses", self.glasses.as_ref()),
            ("horns", self.horns.as_ref()),
            ("top", self.top.as_ref()),
            ("necklace", self.necklace.as_ref()),
            ("neckwear", self.neckwear.as_ref()),
            ("coat", self.coat.as_ref()),
            ("belt", self.belt.as_ref()),
            ("bottom", self.bottom.as_ref()),
            ("socks", self.socks.as_ref()),
            ("shoes", self.shoes.as_ref()),
            ("bracelets", self.bracelets.as_ref()),
            ("wings", self.wings.as_ref()),
            ("bag", self.bag.as_ref()),
            ("gloves", self.gloves.as_ref()),
            ("handheld", self.handheld.as_ref()),
        ]
    }

    /// 基底图文件名：<male|female>_<skinTone>.png
    pub fn base_image_name(&self) -> String {
        format!("{}_{}.png", self.sex.as_str(), self.skin_tone)
    }
}

/// 用户投影（外部用户库的只读快照 + 最近一次渲染登记）
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub username: String,
    pub customization: Customization,
    /// 最近一次成功渲染对应的指纹；与当前指纹不一致表示需要重渲
    #[serde(default)]
    pub customization_hash: Option<u32>,
    /// 最近一次渲染写入的对象存储键
    #[serde(default)]
    pub avatar_key: Option<String>,
    #[serde(default)]
    pub clothing_key: Option<String>,
    #[serde(default)]
    pub thumbnail_key: Option<String>,
}

impl UserRecord {
    /// 三个远端键是否齐全（回退 307 的前提）
    pub fn has_previous_render(&self) -> bool {
        self.avatar_key.is_some() && self.clothing_key.is_some() && self.thumbnail_key.is_some()
    }
}

/// 物品投影。description 为自由文本，核心只认两个子串标记。
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ItemInfo {
    pub id: String,
    #[serde(default)]
    pub description: String,
}

impl ItemInfo {
    /// `!x`：鞋子画在裤装之后（被裤装遮挡）
    pub fn shoes_behind_pants(&self) -> bool {
        self.description.contains("!x")
    }

    /// `!s`：头发画在上衣/外套之前（盖住衣领）
    pub fn hair_in_front_of_top(&self) -> bool {
        self.description.contains("!s")
    }
}

/// 请求的视图类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Avatar,
    Sprite,
    Thumbnail,
}

impl ViewKind {
    /// 解析路径段，接受完整名与单字母别名
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "avatar" | "a" => Some(ViewKind::Avatar),
            "sprite" | "s" => Some(ViewKind::Sprite),
            "thumbnail" | "t" => Some(ViewKind::Thumbnail),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Avatar => "avatar",
            ViewKind::Sprite => "sprite",
            ViewKind::Thumbnail => "thumbnail",
        }
    }

    /// 对应的对象存储键前缀
    pub fn object_prefix(&self) -> &'static str {
        match self {
            ViewKind::Avatar => "user-avatar",
            ViewKind::Sprite => "user-clothing",
            ViewKind::Thumbnail => "user-thumbnail",
        }
    }

    /// 对象存储键：<prefix>/<username>.webp
    pub fn object_key(&self, username: &str) -> String {
        format!("{}/{}.webp", self.object_prefix(), username)
    }
}
