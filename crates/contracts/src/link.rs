//! 链接规范化
//!
//! 源与目标在存储中以用户名形式保存：去掉 `https://t.me/` 前缀与 `@`。

const LINK_PREFIXES: [&str; 3] = ["https://t.me/", "http://t.me/", "t.me/"];

/// 规范化频道/群组链接，返回裸用户名
pub fn normalize_link(link: &str) -> String {
    let mut s = link.trim();
    for prefix in LINK_PREFIXES {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest;
            break;
        }
    }
    s.replace('@', "").trim().to_string()
}

/// 拆分帖子链接 `https://t.me/<chat>/<id>`
///
/// 返回 (chat, message_id)；格式不合法时返回 None。
pub fn split_post_link(link: &str) -> Option<(String, i64)> {
    let trimmed = link.trim().trim_end_matches('/');
    let (chat, id) = trimmed.rsplit_once('/')?;
    let message_id = id.parse::<i64>().ok()?;
    let chat = chat.rsplit('/').next()?;
    let chat = normalize_link(chat);
    if chat.is_empty() {
        return None;
    }
    Some((chat, message_id))
}
