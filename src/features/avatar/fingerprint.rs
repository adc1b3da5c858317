//! 定制记录指纹
//!
//! 把 (username, customization) 规范化为一段稳定文本，再取 SHA-256 的前
//! 4 个字节作为 32 位指纹。规范化形式的要求：
//! - 槽位键按声明序输出，空槽位用 `-` 哨兵占位；
//! - 纹身子槽位按固定顺序跟在 `tattoo.` 前缀后；
//! - 槽位附加属性按键排序；
//! - chroma-key 模式进指纹，避免两种合成模式共用缓存。
//!
//! 任何可观察变化都会改变规范化文本；字节相同的文本必然得到相同指纹。
//! 32 位截断的碰撞概率（~2^-32）在本场景可接受。

use sha2::{Digest, Sha256};

use super::models::Customization;

/// 规范化序列化（指纹的预镜像，测试与排障时也直接使用）
pub fn canonical_form(username: &str, customization: &Customization) -> String {
    let mut out = String::with_capacity(256);
    out.push_str("v1;user=");
    out.push_str(username);
    out.push_str(";sex=");
    out.push_str(customization.sex.as_str());
    out.push_str(";body=");
    out.push_str(customization.body_variant.as_str());
    out.push_str(";skin=");
    out.push_str(&customization.skin_tone.to_string());
    out.push_str(";chroma=");
    out.push(if customization.chroma_key { '1' } else { '0' });

    for (name, sel) in customization.slots() {
        out.push(';');
        out.push_str(name);
        out.push('=');
        match sel {
            Some(sel) => out.push_str(&sel.canonical_fragment()),
            None => out.push('-'),
        }
    }

    for (name, sel) in customization.tattoos.slots() {
        out.push_str(";tattoo.");
        out.push_str(name);
        out.push('=');
        match sel {
            Some(sel) => out.push_str(&sel.canonical_fragment()),
            None => out.push('-'),
        }
    }

    out
}

/// 计算 32 位内容指纹
pub fn fingerprint(username: &str, customization: &Customization) -> u32 {
    let canonical = canonical_form(username, customization);
    let digest = Sha256::digest(canonical.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}
