// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 会话模块
//!
//! 会话由 Cookie 中的会话 ID 标识，数据保存在服务端的 [`SessionStore`] 中。
//! 每次请求开始时打开一次，请求结束时恰好刷写一次。

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, warn};
use serde_json::{Map, Value};

use crate::config::SessionConfig;
use crate::exception::Exception;
use crate::param::DEFAULT_SESSION_NAME;

pub type SessionData = Map<String, Value>;

/// 会话存储后端
#[cfg_attr(test, mockall::automock)]
pub trait SessionStore: Send + Sync {
    /// 读取会话数据，会话不存在时返回 `None`
    fn load(&self, id: &str) -> Result<Option<SessionData>, Exception>;
    fn save(&self, id: &str, data: &SessionData) -> Result<(), Exception>;
    fn destroy(&self, id: &str) -> Result<(), Exception>;
}

/// 每个会话一个 JSON 文件
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn file(&self, id: &str) -> PathBuf {
        self.dir.join(format!("sess_{}.json", id))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, id: &str) -> Result<Option<SessionData>, Exception> {
        let path = self.file(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).map_err(|e| Exception::Session(e.to_string()))?;
        match serde_json::from_str::<SessionData>(&contents) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                warn!("会话文件{}已损坏，视为新会话：{}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn save(&self, id: &str, data: &SessionData) -> Result<(), Exception> {
        fs::create_dir_all(&self.dir).map_err(|e| Exception::Session(e.to_string()))?;
        let contents =
            serde_json::to_string(data).map_err(|e| Exception::Session(e.to_string()))?;
        fs::write(self.file(id), contents).map_err(|e| Exception::Session(e.to_string()))
    }

    fn destroy(&self, id: &str) -> Result<(), Exception> {
        let path = self.file(id);
        if path.exists() {
            fs::remove_file(path).map_err(|e| Exception::Session(e.to_string()))?;
        }
        Ok(())
    }
}

/// 会话 ID 只允许字母、数字、`-` 与 `_`，防止借 Cookie 构造路径
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub struct Session {
    name: String,
    id: String,
    data: SessionData,
    is_new: bool,
    saved: bool,
    destroyed: bool,
    params: SessionConfig,
    store: Arc<dyn SessionStore>,
}

impl Session {
    /// 依据请求中的 Cookie 打开会话；没有可用的会话时分配新 ID
    pub fn open(
        params: &SessionConfig,
        cookies: &HashMap<String, String>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, Exception> {
        let name = if params.name.is_empty() {
            DEFAULT_SESSION_NAME.to_string()
        } else {
            params.name.clone()
        };

        let existing = match cookies.get(&name) {
            Some(id) if is_valid_id(id) => store.load(id)?.map(|data| (id.clone(), data)),
            Some(id) => {
                warn!("忽略非法的会话ID：{}", id);
                None
            }
            None => None,
        };

        let (id, data, is_new) = match existing {
            Some((id, data)) => (id, data, false),
            None => (uuid::Uuid::new_v4().simple().to_string(), SessionData::new(), true),
        };
        debug!("会话{}已打开，新会话：{}", id, is_new);

        Ok(Self {
            name,
            id,
            data,
            is_new,
            saved: false,
            destroyed: false,
            params: params.clone(),
            store,
        })
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// 清空全部数据，会话本身保留
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// 销毁会话：删除存储中的数据，之后的刷写不再写入
    pub fn destroy(&mut self) -> Result<(), Exception> {
        self.data.clear();
        self.destroyed = true;
        self.store.destroy(&self.id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// 把会话数据刷写到存储。重复调用不会再次写入。
    pub fn save(&mut self) -> Result<(), Exception> {
        if self.saved {
            return Ok(());
        }
        self.saved = true;
        if self.destroyed {
            return Ok(());
        }
        debug!("刷写会话{}", self.id);
        self.store.save(&self.id, &self.data)
    }

    /// 新会话需要下发的 `Set-Cookie` 值
    pub fn cookie_header(&self) -> Option<String> {
        if !self.is_new || self.destroyed {
            return None;
        }
        let mut cookie = format!("{}={}", self.name, self.id);
        if self.params.lifetime > 0 {
            let expires = Utc::now() + Duration::seconds(self.params.lifetime);
            cookie.push_str(&format!(
                "; Max-Age={}; Expires={}",
                self.params.lifetime,
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }
        if !self.params.path.is_empty() {
            cookie.push_str(&format!("; Path={}", self.params.path));
        }
        if !self.params.domain.is_empty() {
            cookie.push_str(&format!("; Domain={}", self.params.domain));
        }
        if self.params.secure {
            cookie.push_str("; Secure");
        }
        cookie.push_str("; HttpOnly");
        Some(cookie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use serde_json::json;

    fn params() -> SessionConfig {
        SessionConfig {
            name: "sid".to_string(),
            lifetime: 3600,
            path: "/".to_string(),
            domain: "".to_string(),
            secure: false,
            save_path: None,
        }
    }

    #[test]
    fn test_new_session_without_cookie() {
        let mut store = MockSessionStore::new();
        store.expect_load().never();
        let session = Session::open(&params(), &HashMap::new(), Arc::new(store)).unwrap();

        assert!(session.is_new());
        assert_eq!(session.name(), "sid");
        let cookie = session.cookie_header().unwrap();
        assert!(cookie.starts_with(&format!("sid={}", session.id())));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.ends_with("HttpOnly"));
        assert!(!cookie.contains("Domain"));
    }

    #[test]
    fn test_existing_session_is_loaded() {
        let mut store = MockSessionStore::new();
        let mut data = SessionData::new();
        data.insert("user".to_string(), json!(7));
        store
            .expect_load()
            .with(eq("abc123"))
            .times(1)
            .returning(move |_| Ok(Some(data.clone())));

        let mut cookies = HashMap::new();
        cookies.insert("sid".to_string(), "abc123".to_string());
        let session = Session::open(&params(), &cookies, Arc::new(store)).unwrap();

        assert!(!session.is_new());
        assert_eq!(session.get("user"), Some(&json!(7)));
        assert_eq!(session.cookie_header(), None);
    }

    #[test]
    fn test_invalid_id_is_not_looked_up() {
        let mut store = MockSessionStore::new();
        store.expect_load().never();
        let mut cookies = HashMap::new();
        cookies.insert("sid".to_string(), "../../etc/passwd".to_string());
        let session = Session::open(&params(), &cookies, Arc::new(store)).unwrap();
        assert!(session.is_new());
    }

    #[test]
    fn test_save_writes_exactly_once() {
        let mut store = MockSessionStore::new();
        store.expect_save().times(1).returning(|_, _| Ok(()));
        let mut session = Session::open(&params(), &HashMap::new(), Arc::new(store)).unwrap();
        session.set("k", json!("v"));
        session.save().unwrap();
        session.save().unwrap();
    }

    #[test]
    fn test_destroyed_session_is_not_saved() {
        let mut store = MockSessionStore::new();
        store.expect_destroy().times(1).returning(|_| Ok(()));
        store.expect_save().never();
        let mut session = Session::open(&params(), &HashMap::new(), Arc::new(store)).unwrap();
        session.destroy().unwrap();
        session.save().unwrap();
        assert_eq!(session.cookie_header(), None);
    }

    #[test]
    fn test_empty_name_falls_back() {
        let mut p = params();
        p.name = String::new();
        let session =
            Session::open(&p, &HashMap::new(), Arc::new(MockSessionStore::new())).unwrap();
        assert_eq!(session.name(), DEFAULT_SESSION_NAME);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions"));
        let mut data = SessionData::new();
        data.insert("cart".to_string(), json!([1, 2]));
        store.save("abc", &data).unwrap();
        assert_eq!(store.load("abc").unwrap(), Some(data));
        store.destroy("abc").unwrap();
        assert_eq!(store.load("abc").unwrap(), None);
    }
}
