// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 数据库边界
//!
//! 每次分发都会用配置中的连接串、用户名、密码和选项打开一个连接，交由控制器独占。
//! 查询构建不在本框架范围内，这里只负责按 DSN 建立并校验连接，失败时抛出
//! [`Exception::Database`]，不做重试。

use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use log::{debug, error};
use serde_json::{Map, Value};

use crate::config::DbConfig;
use crate::exception::Exception;

/// 连接超时的缺省秒数
const DEFAULT_TIMEOUT: u64 = 5;

/// 一个已打开的数据库连接
///
/// 这里只是连接的描述：驱动、DSN、用户名与选项。`DsnConnector` 产生的实现
/// 不做认证，也不持有会话，真正的数据库驱动可以通过自定义 `Connector` 接入。
pub trait Connection {
    fn driver(&self) -> &str;
    fn dsn(&self) -> &str;
    fn username(&self) -> &str;
    fn option(&self, name: &str) -> Option<&Value>;
}

/// 按配置打开连接
pub trait Connector: Send + Sync {
    fn connect(&self, db: &DbConfig) -> Result<Box<dyn Connection>, Exception>;
}

/// `driver:key=value;key=value` 形式的数据源名
#[derive(Debug, Clone, PartialEq)]
pub struct Dsn {
    pub driver: String,
    pub body: String,
    pub params: Vec<(String, String)>,
}

impl Dsn {
    pub fn parse(uri: &str) -> Result<Self, Exception> {
        let (driver, body) = match uri.split_once(':') {
            Some((d, b)) if !d.is_empty() => (d.to_lowercase(), b.to_string()),
            _ => {
                return Err(Exception::Database {
                    code: 0,
                    message: "invalid data source name".to_string(),
                })
            }
        };
        let params = body
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .collect();
        Ok(Self {
            driver,
            body,
            params,
        })
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn default_port(driver: &str) -> Option<u16> {
    match driver {
        "mysql" => Some(3306),
        "pgsql" => Some(5432),
        "sqlsrv" | "dblib" => Some(1433),
        _ => None,
    }
}

pub struct DsnConnection {
    uri: String,
    dsn: Dsn,
    username: String,
    options: Map<String, Value>,
}

impl Connection for DsnConnection {
    fn driver(&self) -> &str {
        &self.dsn.driver
    }

    fn dsn(&self) -> &str {
        &self.uri
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }
}

/// 缺省连接器：校验 DSN，SQLite 检查目标目录，网络数据库探测端口可达
///
/// 只做 TCP 可达性检查，不读取 `db.password`，也不会与服务器握手认证。
#[derive(Debug, Default)]
pub struct DsnConnector;

impl Connector for DsnConnector {
    fn connect(&self, db: &DbConfig) -> Result<Box<dyn Connection>, Exception> {
        let dsn = Dsn::parse(&db.connection_uri)?;
        match dsn.driver.as_str() {
            "sqlite" => check_sqlite(&dsn.body)?,
            driver => {
                let port = match default_port(driver) {
                    Some(port) => port,
                    None => {
                        error!("不支持的数据库驱动：{}", driver);
                        return Err(Exception::Database {
                            code: 0,
                            message: "could not find driver".to_string(),
                        });
                    }
                };
                let host = dsn.param("host").unwrap_or("localhost");
                let port = dsn
                    .param("port")
                    .and_then(|p| p.parse::<u16>().ok())
                    .unwrap_or(port);
                let timeout = db
                    .options
                    .get("timeout")
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_TIMEOUT);
                probe(host, port, Duration::from_secs(timeout))?;
            }
        }
        debug!("数据库连接已建立：{}", dsn.driver);
        Ok(Box::new(DsnConnection {
            uri: db.connection_uri.clone(),
            dsn,
            username: db.username.clone(),
            options: db.options.clone(),
        }))
    }
}

fn check_sqlite(target: &str) -> Result<(), Exception> {
    if target == ":memory:" {
        return Ok(());
    }
    let dir = Path::new(target).parent().unwrap_or(Path::new(""));
    if dir.as_os_str().is_empty() || dir.is_dir() {
        Ok(())
    } else {
        Err(Exception::Database {
            code: 14,
            message: format!("unable to open database file: {}", target),
        })
    }
}

fn probe(host: &str, port: u16, timeout: Duration) -> Result<(), Exception> {
    let unreachable = |reason: String| Exception::Database {
        code: 2002,
        message: format!("Can't connect to {}:{} ({})", host, port, reason),
    };
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| unreachable(e.to_string()))?;
    let mut last = String::from("no address");
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return Ok(()),
            Err(e) => last = e.to_string(),
        }
    }
    Err(unreachable(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn db(uri: &str) -> DbConfig {
        DbConfig {
            connection_uri: uri.to_string(),
            username: "app".to_string(),
            password: "secret".to_string(),
            options: Map::new(),
        }
    }

    #[test]
    fn test_parse_dsn() {
        let dsn = Dsn::parse("mysql:host=db.local;port=3307;dbname=shop").unwrap();
        assert_eq!(dsn.driver, "mysql");
        assert_eq!(dsn.param("host"), Some("db.local"));
        assert_eq!(dsn.param("port"), Some("3307"));
        assert_eq!(dsn.param("user"), None);
        assert!(Dsn::parse("no-driver").is_err());
    }

    #[test]
    fn test_sqlite_memory() {
        let conn = DsnConnector.connect(&db("sqlite::memory:")).unwrap();
        assert_eq!(conn.driver(), "sqlite");
        assert_eq!(conn.username(), "app");
    }

    #[test]
    fn test_sqlite_missing_directory() {
        let result = DsnConnector.connect(&db("sqlite:/definitely/not/here/app.db"));
        assert!(matches!(result, Err(Exception::Database { code: 14, .. })));
    }

    #[test]
    fn test_unknown_driver() {
        let result = DsnConnector.connect(&db("oracle:host=x"));
        assert!(matches!(result, Err(Exception::Database { code: 0, .. })));
    }

    #[test]
    fn test_probe_reachable_and_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let uri = format!("mysql:host=127.0.0.1;port={}", port);
        assert!(DsnConnector.connect(&db(&uri)).is_ok());

        drop(listener);
        let mut config = db(&uri);
        config.options.insert("timeout".to_string(), Value::from(1));
        let result = DsnConnector.connect(&config);
        match result {
            Err(e) => assert_eq!(e.code(), 2002),
            Ok(_) => panic!("connection to a closed port succeeded"),
        }
    }
}
