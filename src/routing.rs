// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由模块
//!
//! 路由表按声明顺序保存，匹配时取**第一个**满足接受规则的路由。
//!
//! ## 匹配规则
//! 1. 没有 `pattern` 或没有 `Controller::action` 目标的路由被跳过；
//! 2. 以 `/*` 结尾的 pattern 是通配路由，有效前缀为去掉末尾 `*` 后的串（保留末尾 `/`）；
//!    其余为字面路由，pattern 原样作为前缀；
//! 3. 前缀比较大小写不敏感；
//! 4. 前缀之后的剩余部分按 `/` 切分，丢弃空段，逐段 URL 解码，得到路径参数；
//! 5. 字面路由仅在路径参数为空时接受，通配路由仅在路径参数非空时接受。

use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::exception::Exception;

/// 路由目标中控制器与动作之间的分隔符
pub const TARGET_SEPARATOR: &str = "::";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Route {
    pub name: String,
    #[serde(default)]
    pub pattern: Option<String>,
    /// `Controller::action` 形式的目标
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl Route {
    pub fn new(name: &str, pattern: &str, action: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: Some(pattern.to_string()),
            action: Some(action.to_string()),
            options: Map::new(),
        }
    }

    /// 拆分后的 (控制器, 动作)；目标缺失或不含 `::` 时为 `None`
    pub fn target(&self) -> Option<(&str, &str)> {
        // 多余的 `::` 段被忽略，只取前两段
        let mut parts = self.action.as_deref()?.splitn(3, TARGET_SEPARATOR);
        Some((parts.next()?, parts.next()?))
    }

    /// pattern 是否以 `/*` 结尾
    pub fn is_wildcard(&self) -> bool {
        self.pattern
            .as_deref()
            .map_or(false, |p| p.ends_with("/*"))
    }
}

#[derive(Deserialize)]
struct RouteFile {
    #[serde(default, rename = "route")]
    routes: Vec<Route>,
}

/// 有序路由表
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// 从 TOML 文件加载路由表。文件不存在时返回 `Ok(None)`，无法读取或解析时返回配置错误。
    pub fn from_toml(filename: &Path) -> Result<Option<Self>, Exception> {
        if !filename.exists() {
            warn!("路由文件{}不存在", filename.display());
            return Ok(None);
        }
        let contents = fs::read_to_string(filename).map_err(|e| {
            Exception::ConfigUnreadable(format!("{}: {}", filename.display(), e))
        })?;
        Self::parse(&contents).map(Some)
    }

    /// 解析 `[[route]]` 数组
    pub fn parse(contents: &str) -> Result<Self, Exception> {
        let file: RouteFile = toml::from_str(contents)
            .map_err(|e| Exception::ConfigUnreadable(format!("routes: {}", e)))?;
        debug!("共载入{}条路由", file.routes.len());
        Ok(Self::new(file.routes))
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Route> {
        self.routes.iter()
    }

    /// 按名称查找路由，重名时取第一个
    pub fn find(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name == name)
    }
}

/// 一次成功匹配的结果
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub route_name: String,
    pub controller: String,
    pub action: String,
    /// 前缀之后经解码、去空段的路径段
    pub path_params: Vec<String>,
    /// 路由选项，已合并默认值
    pub options: Map<String, Value>,
}

pub struct Router<'a> {
    table: &'a RouteTable,
}

impl<'a> Router<'a> {
    pub fn new(table: &'a RouteTable) -> Self {
        Self { table }
    }

    /// 按声明顺序查找第一个接受 `path` 的路由
    pub fn resolve(&self, path: &str) -> Option<MatchResult> {
        for route in self.table.iter() {
            let (pattern, (controller, action)) = match (route.pattern.as_deref(), route.target())
            {
                (Some(p), Some(t)) => (p, t),
                _ => continue,
            };

            let wildcard = pattern.ends_with("/*");
            let prefix = if wildcard {
                pattern.trim_end_matches('*')
            } else {
                pattern
            };

            let rest = match strip_prefix_ignore_case(path, prefix) {
                Some(rest) => rest,
                None => continue,
            };

            let path_params = split_params(rest);
            if wildcard == path_params.is_empty() {
                continue;
            }

            debug!(
                "路径{}匹配路由{}（{}::{}），参数：{:?}",
                path, route.name, controller, action, path_params
            );
            let mut options = Map::new();
            options.insert("ajax_only".to_string(), Value::Bool(false));
            for (k, v) in &route.options {
                options.insert(k.clone(), v.clone());
            }
            return Some(MatchResult {
                route_name: route.name.clone(),
                controller: controller.to_string(),
                action: action.to_string(),
                path_params,
                options,
            });
        }
        None
    }
}

fn strip_prefix_ignore_case<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    let mut chars = path.chars();
    let mut consumed = 0;
    for expected in prefix.chars() {
        let actual = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
        consumed += actual.len_utf8();
    }
    Some(&path[consumed..])
}

/// 按 `/` 切分、丢弃空段，再逐段 URL 解码（`+` 视为空格）
///
/// 先切分后解码，编码过的 `%2F` 保留在段内而不会产生新的分段。
pub fn split_params(rest: &str) -> Vec<String> {
    rest.split('/')
        .filter(|s| !s.is_empty())
        .map(decode_segment)
        .collect()
}

fn decode_segment(segment: &str) -> String {
    let plus_decoded = segment.replace('+', " ");
    let decoded = urlencoding::decode_binary(plus_decoded.as_bytes());
    String::from_utf8_lossy(&decoded).into_owned()
}

/// 把原始请求路径规范化为以 `/` 开头
pub fn normalize_path(raw: &str) -> String {
    format!("/{}", raw.trim_start_matches('/'))
}
