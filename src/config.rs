// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::{Map, Value};

use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::exception::Exception;

/// 加载配置时必须存在的键（点分路径）
pub const REQUIRED_KEYS: &[&str] = &[
    "display_exceptions",
    "templates_dir",
    "templates_dir_cache",
    "template_extensions",
    "session.name",
    "session.lifetime",
    "session.path",
    "session.domain",
    "session.secure",
    "db.connection_uri",
    "db.username",
    "db.password",
    "db.options",
];

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    display_exceptions: bool,
    templates_dir: PathBuf,
    templates_dir_cache: PathBuf,
    template_extensions: Vec<String>,
    #[serde(default = "default_template_cache_size")]
    template_cache_size: usize,
    session: SessionConfig,
    db: DbConfig,
    #[serde(default)]
    globals: Map<String, Value>,
    #[serde(default)]
    server: ServerConfig,
    #[serde(skip)]
    raw: toml::Table,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionConfig {
    pub name: String,
    pub lifetime: i64,
    pub path: String,
    pub domain: String,
    pub secure: bool,
    #[serde(default)]
    pub save_path: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbConfig {
    pub connection_uri: String,
    pub username: String,
    pub password: String,
    pub options: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_local")]
    pub local: bool,
    #[serde(default)]
    pub worker_threads: usize,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_template_cache_size() -> usize {
    32
}

fn default_port() -> u16 {
    7878
}

fn default_local() -> bool {
    true
}

fn default_max_body_size() -> usize {
    1048576 // 1MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            local: default_local(),
            worker_threads: num_cpus::get(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Config {
    /// 从 TOML 文件加载并校验配置。
    ///
    /// 相对目录以配置文件所在目录为基准解析。缺失的必填项会被一次性全部列出。
    pub fn from_toml(filename: &Path) -> Result<Self, Exception> {
        let str_val = fs::read_to_string(filename).map_err(|e| {
            Exception::ConfigUnreadable(format!("{}: {}", filename.display(), e))
        })?;
        let table: toml::Table = toml::from_str(&str_val)
            .map_err(|e| Exception::ConfigUnreadable(format!("{}: {}", filename.display(), e)))?;

        let missing = missing_keys(&table);
        if !missing.is_empty() {
            return Err(Exception::MissingConfig(missing));
        }

        let mut raw_config: Config = toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| {
                Exception::ConfigUnreadable(format!("{}: {}", filename.display(), e))
            })?;
        raw_config.raw = table;

        let base = filename.parent().unwrap_or(Path::new("."));
        raw_config.templates_dir = base.join(&raw_config.templates_dir);
        raw_config.templates_dir_cache = base.join(&raw_config.templates_dir_cache);
        raw_config.session.save_path = Some(match raw_config.session.save_path.take() {
            Some(p) => base.join(p),
            None => base.join("var").join("sessions"),
        });

        if raw_config.server.worker_threads == 0 {
            raw_config.server.worker_threads = num_cpus::get();
        }
        if raw_config.template_cache_size == 0 {
            warn!("template_cache_size被设置为0，但目前尚不支持禁用模板缓存，因此该值将被改为32。");
            raw_config.template_cache_size = default_template_cache_size();
        }
        debug!("配置文件{}已载入", filename.display());
        Ok(raw_config)
    }
}

/// 返回 `table` 中缺失的必填键
pub fn missing_keys(table: &toml::Table) -> Vec<String> {
    REQUIRED_KEYS
        .iter()
        .filter(|key| lookup(table, key).is_none())
        .map(|key| key.to_string())
        .collect()
}

fn lookup<'a>(table: &'a toml::Table, dotted: &str) -> Option<&'a toml::Value> {
    let mut parts = dotted.split('.');
    let mut current = table.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

impl Config {
    pub fn display_exceptions(&self) -> bool {
        self.display_exceptions
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    pub fn templates_dir_cache(&self) -> &Path {
        &self.templates_dir_cache
    }

    pub fn template_extensions(&self) -> &[String] {
        &self.template_extensions
    }

    pub fn template_cache_size(&self) -> usize {
        self.template_cache_size
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn db(&self) -> &DbConfig {
        &self.db
    }

    pub fn globals(&self) -> &Map<String, Value> {
        &self.globals
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    /// 按点分路径读取任意配置项，转换为 JSON 值
    pub fn parameter(&self, dotted: &str) -> Option<Value> {
        lookup(&self.raw, dotted).and_then(|v| serde_json::to_value(v).ok())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const SAMPLE: &str = r#"
display_exceptions = false
templates_dir = "templates"
templates_dir_cache = "cache/templates"
template_extensions = ["common"]

[session]
name = "sid"
lifetime = 3600
path = "/"
domain = ""
secure = false

[db]
connection_uri = "sqlite::memory:"
username = ""
password = ""
options = {}

[globals]
site = "demo"
"#;

    fn write_config(contents: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut f = fs::File::create(dir.path().join("config.toml")).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        dir
    }

    #[test]
    fn test_load_resolves_relative_dirs() {
        let dir = write_config(SAMPLE);
        let config = Config::from_toml(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.templates_dir(), dir.path().join("templates"));
        assert_eq!(
            config.session().save_path.as_deref(),
            Some(dir.path().join("var").join("sessions").as_path())
        );
        assert!(!config.display_exceptions());
        assert_eq!(config.template_extensions(), ["common".to_string()]);
        assert_eq!(config.globals().get("site"), Some(&Value::from("demo")));
        assert_eq!(config.server().port, 7878);
        assert!(config.server().worker_threads > 0);
    }

    #[test]
    fn test_missing_keys_are_all_reported() {
        let dir = write_config("display_exceptions = true\n[session]\nname = \"x\"\n");
        match Config::from_toml(&dir.path().join("config.toml")) {
            Err(Exception::MissingConfig(keys)) => {
                assert!(keys.contains(&"templates_dir".to_string()));
                assert!(keys.contains(&"session.lifetime".to_string()));
                assert!(keys.contains(&"db.connection_uri".to_string()));
                assert!(!keys.contains(&"session.name".to_string()));
                assert!(!keys.contains(&"display_exceptions".to_string()));
            }
            other => panic!("Expected MissingConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_absent_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::from_toml(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(Exception::ConfigUnreadable(_))));
    }

    #[test]
    fn test_wrong_type_is_unreadable() {
        let dir = write_config(&SAMPLE.replace("lifetime = 3600", "lifetime = \"soon\""));
        let result = Config::from_toml(&dir.path().join("config.toml"));
        assert!(matches!(result, Err(Exception::ConfigUnreadable(_))));
    }

    #[test]
    fn test_parameter_lookup() {
        let dir = write_config(SAMPLE);
        let config = Config::from_toml(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.parameter("session.name"), Some(Value::from("sid")));
        assert_eq!(config.parameter("globals.site"), Some(Value::from("demo")));
        assert_eq!(config.parameter("nothing.here"), None);
    }
}
