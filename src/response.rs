// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应模块
//!
//! 分发结果（状态码、文本、附加标头）在这里序列化为 HTTP 报文。
//! 文本响应按 `Accept-Encoding` 协商压缩，HEAD 请求只发送标头。

use std::io::{self, Write};

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::Bytes;
use chrono::prelude::*;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, warn};

use crate::param::*;
use crate::util::{status_for, HtmlBuilder};

pub const DEFAULT_CONTENT_TYPE: &str = "text/html;charset=utf-8";

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: Option<String>,
    date: DateTime<Utc>,
    content_encoding: Option<HttpEncoding>,
    server_name: String,
    /// `Location`、`Set-Cookie` 以及控制器追加的标头，按加入顺序输出
    headers: Vec<(String, String)>,
    content: Bytes,
    head_only: bool,
}

impl Response {
    pub fn new(version: HttpVersion) -> Self {
        Self {
            version,
            status_code: 200,
            information: "OK".to_string(),
            content_type: None,
            date: Utc::now(),
            content_encoding: None,
            server_name: SERVER_NAME.to_string(),
            headers: Vec::new(),
            content: Bytes::new(),
            head_only: false,
        }
    }

    /// 请求无法解析时由宿主直接返回的状态页
    pub fn from_status_code(code: u16, version: HttpVersion) -> Self {
        let mut response = Self::new(version);
        response
            .set_code(code)
            .set_body(HtmlBuilder::from_status_code(code, None).build());
        response
    }

    /// 设置状态码，不在状态码表中的按 500 处理
    pub fn set_code(&mut self, code: u16) -> &mut Self {
        let (code, reason) = status_for(code);
        self.status_code = code;
        self.information = reason.to_string();
        self
    }

    pub fn set_body(&mut self, body: String) -> &mut Self {
        if self.content_type.is_none() {
            self.content_type = Some(DEFAULT_CONTENT_TYPE.to_string());
        }
        self.content = Bytes::from(body);
        self.content_encoding = None;
        self
    }

    pub fn set_content_type(&mut self, content_type: &str) -> &mut Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// 追加一个标头；`Content-Type` 会替换缺省值而不是重复输出
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        if name.eq_ignore_ascii_case("content-type") {
            self.content_type = Some(value.to_string());
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
        self
    }

    pub fn set_head_only(&mut self, head_only: bool) -> &mut Self {
        self.head_only = head_only;
        self
    }

    /// 按客户端支持的编码压缩响应体，压缩失败时保留原文
    pub fn compress(&mut self, accept_encoding: &[HttpEncoding], id: u128) -> &mut Self {
        if self.content.is_empty() || self.content_encoding.is_some() {
            return self;
        }
        let mode = match decide_encoding(accept_encoding) {
            Some(mode) => mode,
            None => return self,
        };
        match compress(self.content.to_vec(), Some(mode)) {
            Ok(compressed) => {
                self.content = Bytes::from(compressed);
                self.content_encoding = Some(mode);
            }
            Err(e) => warn!("[ID{}]压缩响应体失败，按原文发送：{}", id, e),
        }
        self
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let mut header = format!(
            "HTTP/{} {} {}{}",
            self.version, self.status_code, self.information, CRLF
        );
        if let Some(t) = &self.content_type {
            header.push_str(&["Content-Type: ", t, CRLF].concat());
        }
        if let Some(e) = self.content_encoding {
            header.push_str(&format!("Content-Encoding: {}{}", e, CRLF));
        }
        header.push_str(&format!("Content-Length: {}{}", self.content.len(), CRLF));
        header.push_str(&["Date: ", &format_date(&self.date), CRLF].concat());
        header.push_str(&["Server: ", &self.server_name, CRLF].concat());
        for (name, value) in &self.headers {
            header.push_str(&[name.as_str(), ": ", value.as_str(), CRLF].concat());
        }
        header.push_str(CRLF);

        if self.head_only {
            header.into_bytes()
        } else {
            [header.as_bytes(), &self.content[..]].concat()
        }
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_encoding(&self) -> Option<HttpEncoding> {
        self.content_encoding
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// 按名称（大小写不敏感）取第一个附加标头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 响应体原始字节（可能已压缩）
    pub fn body(&self) -> &[u8] {
        &self.content
    }

    /// 未压缩时的响应体文本
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn compress(data: Vec<u8>, mode: Option<HttpEncoding>) -> io::Result<Vec<u8>> {
    let original_size = data.len();
    let result = match mode {
        Some(HttpEncoding::Gzip) => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Deflate) => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Br) => {
            let params = BrotliEncoderParams::default();
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
        None => Ok(data),
    };

    if let Ok(ref compressed) = result {
        debug!(
            "压缩完成: {:?}, 原始大小: {} bytes, 压缩后: {} bytes",
            mode,
            original_size,
            compressed.len()
        );
    }

    result
}

/// gzip 优先，其次 deflate，最后 br
fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    [HttpEncoding::Gzip, HttpEncoding::Deflate, HttpEncoding::Br]
        .into_iter()
        .find(|e| accept_encoding.contains(e))
}
