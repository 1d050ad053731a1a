// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 请求参数规范化流水线中 `strip_tags` 与 `xss` 两个算子的实现。

use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// 生成允许字符之间夹杂控制字符/空白的匹配串，如 `j\s*a\s*v\s*a`
fn spaced(word: &str) -> String {
    word.chars()
        .map(|c| regex::escape(&c.to_string()))
        .collect::<Vec<_>>()
        .join(r"[\x00-\x20]*")
}

lazy_static! {
    static ref TAGS: Regex = Regex::new(r"(?s)<!--.*?-->|<[^>]*>").unwrap();
    static ref ENTITY_GAP: Regex = Regex::new(r"(&#*\w+)[\x00-\x20]+;").unwrap();
    static ref HEX_ENTITY: Regex = Regex::new(r"(?i)(&#x*[0-9A-F]+);*").unwrap();
    static ref ENTITY: Regex = Regex::new(r"(?i)&(#x[0-9a-f]+|#[0-9]+|amp|lt|gt|quot|apos);").unwrap();
    static ref EVENT_ATTR: Regex =
        Regex::new(r#"(?i)(<[^>]+?[\x00-\x20"'])(?:on|xmlns)[^>]*>"#).unwrap();
    static ref JAVASCRIPT: Regex = Regex::new(&format!(
        r#"(?i)([a-z]*)[\x00-\x20]*=[\x00-\x20]*([`'"]*)[\x00-\x20]*{}[\x00-\x20]*:"#,
        spaced("javascript")
    ))
    .unwrap();
    static ref VBSCRIPT: Regex = Regex::new(&format!(
        r#"(?i)([a-z]*)[\x00-\x20]*=(['"]*)[\x00-\x20]*{}[\x00-\x20]*:"#,
        spaced("vbscript")
    ))
    .unwrap();
    static ref MOZ_BINDING: Regex =
        Regex::new(r#"([a-z]*)[\x00-\x20]*=(['"]*)[\x00-\x20]*-moz-binding[\x00-\x20]*:"#).unwrap();
    static ref STYLE_EXPRESSION: Regex = Regex::new(
        r#"(?i)(<[^>]+?)style[\x00-\x20]*=[\x00-\x20]*[`'"]*.*?expression[\x00-\x20]*\([^>]*>"#
    )
    .unwrap();
    static ref STYLE_BEHAVIOUR: Regex = Regex::new(
        r#"(?i)(<[^>]+?)style[\x00-\x20]*=[\x00-\x20]*[`'"]*.*?behaviour[\x00-\x20]*\([^>]*>"#
    )
    .unwrap();
    static ref STYLE_SCRIPT: Regex = Regex::new(&format!(
        r#"(?i)(<[^>]+?)style[\x00-\x20]*=[\x00-\x20]*[`'"]*.*?{}:*[^>]*>"#,
        spaced("script")
    ))
    .unwrap();
    static ref NAMESPACED: Regex = Regex::new(r"(?i)</*\w+:\w[^>]*>").unwrap();
    static ref UNWANTED: Regex = Regex::new(
        r"(?i)</*(?:applet|b(?:ase|gsound|link)|embed|frame(?:set)?|i(?:frame|layer)|l(?:ayer|ink)|meta|object|s(?:cript|tyle)|title|xml)[^>]*>"
    )
    .unwrap();
}

/// 去除 HTML 标签与注释
pub fn strip_tags(data: &str) -> String {
    TAGS.replace_all(data, "").into_owned()
}

fn decode_entities(data: &str) -> String {
    ENTITY
        .replace_all(data, |caps: &Captures| {
            let entity = caps[1].to_lowercase();
            let decoded = match entity.as_str() {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                e if e.starts_with("#x") => u32::from_str_radix(&e[2..], 16)
                    .ok()
                    .and_then(char::from_u32),
                e => e[1..].parse::<u32>().ok().and_then(char::from_u32),
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// 清除常见的跨站脚本载荷：事件属性、脚本协议、样式表达式和危险标签
pub fn xss_clean(data: &str) -> String {
    // 修正 &entity\n; 之类的写法
    let data = data
        .replace("&amp;", "&amp;amp;")
        .replace("&lt;", "&amp;lt;")
        .replace("&gt;", "&amp;gt;");
    let data = ENTITY_GAP.replace_all(&data, "${1};");
    let data = HEX_ENTITY.replace_all(&data, "${1};");
    let data = decode_entities(&data);

    // 移除 on* 与 xmlns 属性
    let data = EVENT_ATTR.replace_all(&data, "${1}>");

    // 移除 javascript: 与 vbscript: 协议
    let data = JAVASCRIPT.replace_all(&data, "${1}=${2}nojavascript...");
    let data = VBSCRIPT.replace_all(&data, "${1}=${2}novbscript...");
    let data = MOZ_BINDING.replace_all(&data, "${1}=${2}nomozbinding...");

    let data = STYLE_EXPRESSION.replace_all(&data, "${1}>");
    let data = STYLE_BEHAVIOUR.replace_all(&data, "${1}>");
    let data = STYLE_SCRIPT.replace_all(&data, "${1}>");

    // 带命名空间的元素一律移除
    let mut data = NAMESPACED.replace_all(&data, "").into_owned();

    loop {
        let cleaned = UNWANTED.replace_all(&data, "").into_owned();
        if cleaned == data {
            break;
        }
        data = cleaned;
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<b>bold</b> <!-- note -->text"), "bold text");
        assert_eq!(strip_tags("no markup"), "no markup");
    }

    #[test]
    fn test_xss_removes_script_tags() {
        let cleaned = xss_clean("<script>alert(1)</script>hello");
        assert!(!cleaned.to_lowercase().contains("<script"));
        assert!(cleaned.contains("hello"));
    }

    #[test]
    fn test_xss_removes_event_attributes() {
        let cleaned = xss_clean(r#"<img src="a.png" onerror="alert(1)">"#);
        assert!(!cleaned.contains("onerror"));
        assert!(cleaned.starts_with("<img"));
    }

    #[test]
    fn test_xss_neutralises_javascript_protocol() {
        let cleaned = xss_clean(r#"<a href="java script:alert(1)">x</a>"#);
        assert!(cleaned.contains("nojavascript..."));
    }

    #[test]
    fn test_xss_decodes_encoded_tags_before_filtering() {
        let cleaned = xss_clean("&#60;iframe src=x&#62;");
        assert!(!cleaned.to_lowercase().contains("<iframe"));
    }

    #[test]
    fn test_xss_leaves_plain_text() {
        assert_eq!(xss_clean("just words"), "just words");
    }
}
