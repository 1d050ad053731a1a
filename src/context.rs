// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求上下文模块
//!
//! `RequestContext` 是一次请求的只读数据袋，包含四张互相独立的键值表：
//! 查询参数（get）、请求体参数（post）、Cookie 以及服务器环境变量（server）。
//!
//! 每个访问器都接受一个可选的、以 `|` 分隔的规范化算子列表和一个默认值：
//! - 键不存在时原样返回默认值，默认值永远不会被规范化；
//! - 键存在时按列表顺序依次对原始值应用算子，未知算子被静默忽略。

use std::collections::HashMap;

use log::warn;
use serde_json::Value;

use crate::param::HttpVersion;
use crate::request::Request;
use crate::sanitize::{strip_tags, xss_clean};

type Bag = HashMap<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    get: Bag,
    post: Bag,
    cookies: Bag,
    server: Bag,
}

impl RequestContext {
    /// 直接由四张表构造，主要供测试与嵌入场景使用
    pub fn new(get: Bag, post: Bag, cookies: Bag, server: Bag) -> Self {
        Self {
            get,
            post,
            cookies,
            server,
        }
    }

    /// 从已解析的 HTTP 请求构建上下文
    pub fn from_request(request: &Request) -> Self {
        let get = parse_form(request.query_string().as_bytes());
        let post = parse_body(request);
        let cookies = request
            .cookies()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();

        let mut server = Bag::new();
        let mut put = |k: &str, v: &str| {
            server.insert(k.to_string(), Value::String(v.to_string()));
        };
        put("REQUEST_METHOD", &request.method().to_string());
        put("REQUEST_URI", request.target());
        put("QUERY_STRING", request.query_string());
        put(
            "SERVER_PROTOCOL",
            match request.version() {
                HttpVersion::V1_0 => "HTTP/1.0",
                HttpVersion::V1_1 => "HTTP/1.1",
            },
        );
        put("REQUEST_SCHEME", "http");
        if let Some(addr) = request.remote_addr() {
            put("REMOTE_ADDR", addr);
        }
        for (name, value) in request.headers() {
            let key = format!("HTTP_{}", name.to_uppercase().replace('-', "_"));
            put(&key, value);
        }

        Self {
            get,
            post,
            cookies,
            server,
        }
    }
}

fn parse_body(request: &Request) -> Bag {
    let content_type = request.header("content-type").unwrap_or("");
    if content_type.starts_with("application/json") {
        match serde_json::from_slice::<Value>(request.body()) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            Ok(_) => Bag::new(),
            Err(e) => {
                warn!("无法解析JSON请求体：{}", e);
                Bag::new()
            }
        }
    } else if content_type.is_empty()
        || content_type.starts_with("application/x-www-form-urlencoded")
    {
        parse_form(request.body())
    } else {
        Bag::new()
    }
}

/// 按 form-urlencoded 规则解码；`key[]` 形式的重复键收集为数组
pub fn parse_form(input: &[u8]) -> Bag {
    let mut bag = Bag::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        let value = Value::String(value.into_owned());
        match key.strip_suffix("[]") {
            Some(base) => match bag
                .entry(base.to_string())
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                Value::Array(items) => items.push(value),
                other => *other = Value::Array(vec![other.clone(), value]),
            },
            None => {
                bag.insert(key.into_owned(), value);
            }
        }
    }
    bag
}

fn fetch(bag: &Bag, key: &str, normalize: Option<&str>, default: Value) -> Value {
    match bag.get(key) {
        Some(v) => match normalize {
            Some(types) => normalize_value(v.clone(), types),
            None => v.clone(),
        },
        None => default,
    }
}

impl RequestContext {
    pub fn has_get<K: ToString>(&self, key: K) -> bool {
        self.get.contains_key(&key.to_string())
    }

    pub fn has_post<K: ToString>(&self, key: K) -> bool {
        self.post.contains_key(&key.to_string())
    }

    pub fn has_cookie<K: ToString>(&self, key: K) -> bool {
        self.cookies.contains_key(&key.to_string())
    }

    pub fn has_server<K: ToString>(&self, key: K) -> bool {
        self.server.contains_key(&key.to_string())
    }

    /// 读取查询参数。整数键按十进制文本查找。
    pub fn get<K: ToString>(&self, key: K, normalize: Option<&str>, default: Value) -> Value {
        fetch(&self.get, &key.to_string(), normalize, default)
    }

    /// 读取请求体参数
    pub fn post<K: ToString>(&self, key: K, normalize: Option<&str>, default: Value) -> Value {
        fetch(&self.post, &key.to_string(), normalize, default)
    }

    /// 读取 Cookie
    pub fn cookie<K: ToString>(&self, key: K, normalize: Option<&str>, default: Value) -> Value {
        fetch(&self.cookies, &key.to_string(), normalize, default)
    }

    /// 读取服务器环境变量
    pub fn server<K: ToString>(&self, key: K, normalize: Option<&str>, default: Value) -> Value {
        fetch(&self.server, &key.to_string(), normalize, default)
    }

    pub fn get_all(&self) -> &Bag {
        &self.get
    }

    pub fn post_all(&self) -> &Bag {
        &self.post
    }

    pub fn cookies_all(&self) -> &Bag {
        &self.cookies
    }

    pub fn server_all(&self) -> &Bag {
        &self.server
    }

    /// 请求协议，缺省为 `http`
    pub fn scheme(&self) -> String {
        as_text(&self.server("REQUEST_SCHEME", None, Value::from("http")))
    }

    /// `Host` 标头，缺失时为空串
    pub fn host(&self) -> String {
        as_text(&self.server("HTTP_HOST", None, Value::Null))
    }
}

/// 按 `|` 分隔的算子列表依次规范化一个值
///
/// 识别的算子：`int`、`float`、`double`、`bool`、`string`、`trim`、`array`、
/// `strip_tags`、`xss`。其余算子忽略。
pub fn normalize_value(mut data: Value, types: &str) -> Value {
    for op in types.split('|') {
        data = match op {
            "int" => Value::from(as_int(&data)),
            "float" | "double" => float_value(as_float(&data)),
            "bool" => Value::Bool(as_bool(&data)),
            "string" => Value::String(as_text(&data)),
            "trim" => Value::String(trim(&as_text(&data)).to_string()),
            "array" => match data {
                Value::Array(_) | Value::Object(_) => data,
                Value::Null => Value::Array(Vec::new()),
                scalar => Value::Array(vec![scalar]),
            },
            "strip_tags" => Value::String(strip_tags(&as_text(&data))),
            "xss" => Value::String(xss_clean(&as_text(&data))),
            _ => data,
        };
    }
    data
}

fn trim(s: &str) -> &str {
    s.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r' | '\0' | '\x0B'))
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// 取数值前缀，如 `" 42abc"` 得到 `"42"`；没有数值前缀时返回空串
fn numeric_prefix(s: &str, allow_fraction: bool) -> &str {
    let s = s.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if allow_fraction {
        if end < bytes.len() && bytes[end] == b'.' {
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
        if end > digits_start && end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E')
        {
            let mut exp = end + 1;
            if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
                exp += 1;
            }
            let exp_digits = exp;
            while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                exp += 1;
            }
            if exp > exp_digits {
                end = exp;
            }
        }
    }
    if end == digits_start || (end == digits_start + 1 && bytes[digits_start] == b'.') {
        return "";
    }
    &s[..end]
}

fn as_int(data: &Value) -> i64 {
    match data {
        Value::Null => 0,
        Value::Bool(b) => *b as i64,
        Value::Number(n) => n
            .as_i64()
            .unwrap_or_else(|| n.as_f64().map(|f| f as i64).unwrap_or(0)),
        Value::String(s) => {
            let prefix = numeric_prefix(s, true);
            prefix
                .parse::<i64>()
                .unwrap_or_else(|_| prefix.parse::<f64>().map(|f| f as i64).unwrap_or(0))
        }
        Value::Array(items) => !items.is_empty() as i64,
        Value::Object(map) => !map.is_empty() as i64,
    }
}

fn as_float(data: &Value) -> f64 {
    match data {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => numeric_prefix(s, true).parse::<f64>().unwrap_or(0.0),
        other => as_int(other) as f64,
    }
}

fn as_bool(data: &Value) -> bool {
    match data {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// 值的文本形式：布尔真为 `"1"`、假与空值为空串，复合值输出 JSON
pub fn as_text(data: &Value) -> String {
    match data {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        composite => composite.to_string(),
    }
}
