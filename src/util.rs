// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use chrono::Local;

use crate::exception::Exception;
use crate::param::{HttpVersion, FALLBACK_STATUS, STATUS_CODES};
use crate::view::escape_html;

/// 把任意状态码归一化为状态码表中的一项，未知的状态码按 500 处理
pub fn status_for(code: u16) -> (u16, &'static str) {
    match STATUS_CODES.get(&code) {
        Some(reason) => (code, *reason),
        None => (
            FALLBACK_STATUS,
            STATUS_CODES
                .get(&FALLBACK_STATUS)
                .copied()
                .unwrap_or("Internal Server Error"),
        ),
    }
}

/// `HTTP/1.1 404 Not Found`
pub fn status_line(version: HttpVersion, code: u16) -> String {
    let (code, reason) = status_for(code);
    format!("HTTP/{} {} {}", version, code, reason)
}

pub struct HtmlBuilder {
    title: String,
    css: String,
    script: String,
    body: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let (code, reason) = status_for(code);
        let title = format!("{}", code);
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let description = note.unwrap_or(reason);
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code,
            escape_html(description)
        );
        Self {
            title,
            css,
            script: "".to_string(),
            body,
        }
    }

    /// 开启 `display_exceptions` 时使用的诊断页
    pub fn from_exception(error: &Exception, path: &str) -> Self {
        let (code, reason) = status_for(error.code());
        let title = format!("{} {}", code, reason);
        let css = r"
            body {
                margin: 2em;
                font-family: Menlo, Consolas, monospace;
            }

            h1 {
                color: #b0413e;
            }

            table {
                border-collapse: collapse;
            }

            td {
                padding: 4px 12px;
                vertical-align: top;
                border-bottom: 1px solid #ddd;
            }

            pre {
                background: #f5f5f5;
                padding: 1em;
                white-space: pre-wrap;
            }"
        .to_string();
        let body = format!(
            r#"
            <h1>{}</h1>
            <table>
                <tr><td>状态码</td><td>{}</td></tr>
                <tr><td>原始状态码</td><td>{}</td></tr>
                <tr><td>请求路径</td><td>{}</td></tr>
                <tr><td>时间</td><td>{}</td></tr>
            </table>
            <h2>详细信息</h2>
            <pre>{}</pre>
            "#,
            escape_html(&error.to_string()),
            code,
            error.code(),
            escape_html(path),
            Local::now().format("%Y-%m-%d %H:%M:%S %Z"),
            escape_html(&format!("{:#?}", error)),
        );
        Self {
            title,
            css,
            script: "".to_string(),
            body,
        }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <html>
                <head>
                    <meta charset="utf-8">
                    <script>{}</script>
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.script, self.title, self.css, self.body
        )
    }
}
