// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体。它涵盖了：
//! 1. 请求行（Request-Line）的解析（方法、请求目标、版本）。
//! 2. 全部标头（Headers）的保留，以及 Cookie、Accept-Encoding 的提取。
//! 3. 按 `Content-Length` 截取请求体。
//!
//! 查询串与表单的解码交给 [`crate::context::RequestContext`]。

use crate::{exception::Exception, param::*};
use log::error;
use std::collections::HashMap;

/// 表示一个完整的 HTTP 请求。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法（GET, POST 等）
    method: HttpRequestMethod,
    /// 请求目标（包含查询字符串）
    target: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 按出现顺序保存的标头，名称保留原始大小写
    headers: Vec<(String, String)>,
    /// 客户端支持的压缩编码列表（按解析顺序排列）
    accept_encoding: Vec<HttpEncoding>,
    /// 请求体原始字节
    body: Vec<u8>,
    /// 对端地址，由宿主在接受连接后填写
    remote_addr: Option<String>,
}

impl Request {
    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 参数
    /// * `buffer` - 从网络 Socket 读取的原始数据。
    /// * `id` - 全局请求 ID，用于在多线程环境下追踪日志。
    ///
    /// # 错误处理
    /// 如果请求格式不符合 HTTP 规范或使用了不支持的方法/版本，将返回相应的 `Exception`。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let (head_bytes, rest) = match header_end(buffer) {
            Some(end) => (&buffer[..end], &buffer[end + 4..]),
            None => (buffer, &buffer[buffer.len()..]),
        };

        // 1. 标头部分必须是合法的 UTF-8
        let head = match std::str::from_utf8(head_bytes) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };
        let request_lines: Vec<&str> = head.split(CRLF).collect();

        // 2. 解析请求行 (e.g., "GET /index HTTP/1.1")
        let first_line_parts: Vec<&str> = request_lines[0].split(' ').collect();
        if first_line_parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_lines[0]);
            return Err(Exception::UnSupportedRequestMethod);
        }

        let method_str = first_line_parts[0].to_uppercase();
        let method = match method_str.as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            "PUT" => HttpRequestMethod::Put,
            "PATCH" => HttpRequestMethod::Patch,
            "DELETE" => HttpRequestMethod::Delete,
            _ => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, &method_str);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = first_line_parts[first_line_parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 路径中可能包含空格，虽然不规范但通过 join 尝试恢复
        let target = if first_line_parts.len() == 3 {
            first_line_parts[1].to_string()
        } else {
            first_line_parts[1..first_line_parts.len() - 1].join(" ")
        };

        // 3. 解析 Headers
        let mut headers = Vec::new();
        for line in request_lines.iter().skip(1) {
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        let mut accept_encoding = vec![];
        if let Some(encoding) = find_header(&headers, "accept-encoding") {
            if encoding.contains("gzip") {
                accept_encoding.push(HttpEncoding::Gzip);
            }
            if encoding.contains("deflate") {
                accept_encoding.push(HttpEncoding::Deflate);
            }
            if encoding.contains("br") {
                accept_encoding.push(HttpEncoding::Br);
            }
        }

        // 4. 按 Content-Length 截取请求体，缺省时视为无请求体
        let length = find_header(&headers, "content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let body = rest[..length.min(rest.len())].to_vec();

        Ok(Self {
            method,
            target,
            version,
            headers,
            accept_encoding,
            body,
            remote_addr: None,
        })
    }

    /// 填写对端地址
    pub fn with_remote_addr(mut self, addr: &str) -> Self {
        self.remote_addr = Some(addr.to_string());
        self
    }
}

/// 返回标头结束标记 `\r\n\r\n` 的起始下标
pub fn header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}

/// 从标头部分读出 `Content-Length`。缺失或非数字时为 0，超出 `usize` 的数字饱和到 `usize::MAX`。
pub fn content_length(head: &[u8]) -> usize {
    let head = String::from_utf8_lossy(head);
    let value = match head
        .split(CRLF)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
    {
        Some((_, value)) => value.trim().to_string(),
        None => return 0,
    };
    match value.parse::<usize>() {
        Ok(length) => length,
        Err(_) if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => usize::MAX,
        Err(_) => 0,
    }
}

/// 宿主读取一个请求时的进度
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadState {
    /// 报文尚不完整，继续读取
    Incomplete,
    /// 报文完整，共 n 字节
    Complete(usize),
    /// 标头部分超过 [`MAX_HEADER_SIZE`]，对应 431
    HeaderTooLarge,
    /// 声明的请求体超过上限，对应 413
    BodyTooLarge,
}

impl ReadState {
    /// 拒绝时应返回的状态码
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ReadState::HeaderTooLarge => Some(431),
            ReadState::BodyTooLarge => Some(413),
            _ => None,
        }
    }
}

/// 判断已读入的字节是否构成完整请求，或应当拒绝
pub fn read_state(buffer: &[u8], max_body_size: usize) -> ReadState {
    let end = match header_end(buffer) {
        Some(end) => end,
        None if buffer.len() > MAX_HEADER_SIZE => return ReadState::HeaderTooLarge,
        None => return ReadState::Incomplete,
    };
    if end + 4 > MAX_HEADER_SIZE {
        return ReadState::HeaderTooLarge;
    }
    let length = content_length(&buffer[..end]);
    if length > max_body_size {
        return ReadState::BodyTooLarge;
    }
    match (end + 4).checked_add(length) {
        Some(total) if buffer.len() >= total => ReadState::Complete(total),
        Some(_) => ReadState::Incomplete,
        None => ReadState::BodyTooLarge,
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取 HTTP 协议版本
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 获取请求目标（含查询参数）
    pub fn target(&self) -> &str {
        &self.target
    }

    /// 获取去掉查询串后的路径
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    /// 获取查询串（不含 `?`）
    pub fn query_string(&self) -> &str {
        match self.target.split_once('?') {
            Some((_, query)) => query,
            None => "",
        }
    }

    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 获取全部标头
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// 按名称（大小写不敏感）获取标头
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// 获取用户代理字符串
    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    /// 获取客户端支持的压缩算法列表
    pub fn accept_encoding(&self) -> &[HttpEncoding] {
        &self.accept_encoding
    }

    /// 获取请求体
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// 获取对端地址
    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    /// 解析 `Cookie` 标头
    pub fn cookies(&self) -> HashMap<String, String> {
        let mut cookies = HashMap::new();
        for header in self
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("cookie"))
        {
            for pair in header.1.split(';') {
                if let Some((name, value)) = pair.split_once('=') {
                    let value = urlencoding::decode(value.trim())
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| value.trim().to_string());
                    cookies.insert(name.trim().to_string(), value);
                }
            }
        }
        cookies
    }
}
