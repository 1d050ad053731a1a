// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! URL 生成与其他请求级辅助函数。
//!
//! `Utils` 显式持有路由表与请求上下文，不再回头访问任何全局状态。

use std::cell::RefCell;
use std::rc::Rc;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::context::{as_text, RequestContext};
use crate::controller::Reply;
use crate::exception::Exception;
use crate::routing::RouteTable;

lazy_static! {
    static ref BROWSER: Regex = Regex::new(r"^(Mozilla|Opera|PSP|Bunjalloo|wii)").unwrap();
    static ref ROBOT: Regex =
        Regex::new(r"(?i)bot|crawl|fetch|slurp|spider|google|twitter|facebook").unwrap();
}

/// 控制器追加的响应标头，与分发器共享
pub type HeaderBuffer = Rc<RefCell<Vec<(String, String)>>>;

#[derive(Clone)]
pub struct Utils {
    routes: Rc<RouteTable>,
    request: Rc<RequestContext>,
    headers: HeaderBuffer,
}

impl Utils {
    pub fn new(routes: Rc<RouteTable>, request: Rc<RequestContext>, headers: HeaderBuffer) -> Self {
        Self {
            routes,
            request,
            headers,
        }
    }

    /// 按路由名生成站内相对 URL
    ///
    /// 路由名不存在时返回 `/`。通配路由必须至少提供一个路径参数。
    pub fn generate_url(
        &self,
        route_name: &str,
        path_params: &[&str],
        query: &[(&str, &str)],
    ) -> Result<String, Exception> {
        let route = match self.routes.find(route_name) {
            Some(route) => route,
            None => return Ok("/".to_string()),
        };
        let pattern = route.pattern.as_deref().ok_or_else(|| {
            Exception::UrlGeneration(format!("No pattern for route: {}", route_name))
        })?;

        let trimmed = pattern.trim_end_matches('*');
        if trimmed.len() < pattern.len() && path_params.is_empty() {
            return Err(Exception::UrlGeneration(format!(
                "No uri parameters provided for route: {}",
                route_name
            )));
        }

        let mut url = trimmed.trim_end_matches('/').to_string();
        for param in path_params {
            url.push('/');
            url.push_str(&urlencoding::encode(param));
        }
        for (i, (key, value)) in query.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.extend(url::form_urlencoded::byte_serialize(value.as_bytes()));
        }

        if url.is_empty() {
            url.push('/');
        }
        Ok(url)
    }

    pub fn generate_full_url(
        &self,
        route_name: &str,
        path_params: &[&str],
        query: &[(&str, &str)],
    ) -> Result<String, Exception> {
        Ok(format!(
            "{}{}",
            self.base_url(),
            self.generate_url(route_name, path_params, query)?
        ))
    }

    /// `scheme://host`
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.request.scheme(), self.request.host())
    }

    /// 生成跳转到指定路由的回复，动作应直接返回它
    pub fn redirect_to(
        &self,
        route_name: &str,
        path_params: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Reply, Exception> {
        self.generate_url(route_name, path_params, query)
            .map(Reply::Redirect)
    }

    /// 根据 User-Agent 判断请求是否来自真实浏览器而非爬虫
    pub fn is_browser(&self) -> bool {
        let agent = as_text(&self.request.server("HTTP_USER_AGENT", None, Value::Null));
        BROWSER.is_match(&agent) && !ROBOT.is_match(&agent)
    }

    /// 追加一个响应标头，同名标头会被替换
    pub fn header(&self, name: &str, value: &str) {
        let mut headers = self.headers.borrow_mut();
        headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        headers.push((name.to_string(), value.to_string()));
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.headers.borrow().clone()
    }
}

/// 消解路径中的 `.` 与 `..`，保留开头的 `/`
pub fn absolute_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']).filter(|p| !p.is_empty()) {
        match part {
            "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let prefix = if path.starts_with('/') { "/" } else { "" };
    format!("{}{}", prefix, parts.join("/"))
}
