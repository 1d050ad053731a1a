// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了前端控制器在请求分发生命周期中可能抛出的各类异常情况。
//!
//! ## 设计意图
//! - **状态码携带**：每个变体都通过 `code()` 映射到一个 HTTP 状态码，由全局错误处理器统一写出状态行。
//! - **原样传播**：异常在检测点抛出后经 `?` 原样传播到 `Application`，中途不做本地恢复或重试。
//! - **用户友好**：通过实现 `std::fmt::Display`，确保错误信息可以被安全地记录到日志或渲染到诊断页。

use std::fmt;

/// 请求处理过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 客户端使用了不支持的 HTTP 方法，或请求行格式不正确。
    UnSupportedRequestMethod,
    /// 客户端使用了不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 请求中缺少可用的 URI（请求目标为空或不是以 `/` 开头的路径）。
    InvalidUri,
    /// 路由表不存在或为空。
    NoRoutes,
    /// 路由表中没有任何路由接受该路径。
    RouteNotFound(String),
    /// 路由指向的控制器没有在注册表中登记。对外表现与 `NoRoutes` 一致，属于配置错误。
    UnknownController(String),
    /// 控制器没有实现路由指定的动作。
    ActionNotImplemented(String),
    /// 动作没有返回文本响应。
    InvalidResponse,
    /// 配置文件中缺少必填项，携带全部缺失项的点分路径。
    MissingConfig(Vec<String>),
    /// 配置文件或路由文件无法读取或解析。
    ConfigUnreadable(String),
    /// 通过路由名生成 URL 失败（路由没有 pattern，或通配路由缺少路径参数）。
    UrlGeneration(String),
    /// 数据库连接失败，状态码原样透传。
    Database { code: u16, message: String },
    /// 模板加载、编译或渲染失败。
    Template(String),
    /// 会话存储读写失败。
    Session(String),
    /// 由业务代码主动抛出的带状态码异常。
    Status { code: u16, message: String },
}

use Exception::*;

impl Exception {
    /// 该异常对应的 HTTP 状态码。
    ///
    /// 返回值不保证出现在状态码表中，写状态行前需经 [`crate::util::status_line`] 归一化。
    pub fn code(&self) -> u16 {
        match self {
            RequestIsNotUtf8 => 400,
            UnSupportedRequestMethod => 405,
            UnsupportedHttpVersion => 505,
            InvalidUri => 500,
            NoRoutes => 500,
            RouteNotFound(_) => 404,
            UnknownController(_) => 500,
            ActionNotImplemented(_) => 501,
            InvalidResponse => 500,
            MissingConfig(_) => 500,
            ConfigUnreadable(_) => 500,
            UrlGeneration(_) => 500,
            Database { code, .. } => *code,
            Template(_) => 500,
            Session(_) => 500,
            Status { code, .. } => *code,
        }
    }

    /// 便于业务代码构造带状态码的异常。
    pub fn status(code: u16, message: &str) -> Self {
        Status {
            code,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            InvalidUri => write!(
                f,
                "Invalid URI. The request target must be sent with the request line"
            ),
            NoRoutes => write!(f, "No routes available"),
            RouteNotFound(path) => write!(f, "Route not found: {}", path),
            UnknownController(_) => write!(f, "No routes available"),
            ActionNotImplemented(action) => {
                write!(f, "The {} action is not implemented yet", action)
            }
            InvalidResponse => write!(f, "Not valid response"),
            MissingConfig(keys) => write!(f, "Missing Config params: {}", keys.join(", ")),
            ConfigUnreadable(reason) => write!(f, "Configuration is unreadable: {}", reason),
            UrlGeneration(reason) => write!(f, "{}", reason),
            Database { message, .. } => write!(f, "Database error: {}", message),
            Template(reason) => write!(f, "Template error: {}", reason),
            Session(reason) => write!(f, "Session error: {}", reason),
            Status { message, .. } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_taxonomy() {
        assert_eq!(NoRoutes.code(), 500);
        assert_eq!(RouteNotFound("/x".to_string()).code(), 404);
        assert_eq!(UnknownController("Users".to_string()).code(), 500);
        assert_eq!(ActionNotImplemented("show".to_string()).code(), 501);
        assert_eq!(InvalidResponse.code(), 500);
        assert_eq!(MissingConfig(vec!["db.username".to_string()]).code(), 500);
    }

    #[test]
    fn test_database_code_is_passed_through() {
        let e = Database {
            code: 2002,
            message: "connection refused".to_string(),
        };
        assert_eq!(e.code(), 2002);
    }

    #[test]
    fn test_unknown_controller_reads_like_no_routes() {
        assert_eq!(
            UnknownController("Ghost".to_string()).to_string(),
            NoRoutes.to_string()
        );
    }

    #[test]
    fn test_action_message() {
        let e = ActionNotImplemented("edit".to_string());
        assert_eq!(e.to_string(), "The edit action is not implemented yet");
    }
}
