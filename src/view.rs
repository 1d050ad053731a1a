// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 视图模块
//!
//! 模板由 [`minijinja`] 渲染，文件位于 `templates_dir` 下，支持循环、条件、
//! `include`、`extends` 与过滤器。`.html` 模板默认 HTML 转义，`|raw`（或 `|safe`）原样输出。
//! 全局变量统一挂在 `globals` 名下，上下文中的同名键优先。
//!
//! 模板源码经进程级的 [`TemplateCache`] 缓存，以文件修改时间判断是否失效。

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use serde_json::{Map, Value};

use crate::cache::TemplateCache;
use crate::config::Config;
use crate::exception::Exception;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// 递归合并：对象逐键合并，同名的非对象值收集为列表
pub fn merge_recursive(base: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match base.remove(&key) {
            None => {
                base.insert(key, value);
            }
            Some(Value::Object(mut existing)) if value.is_object() => {
                if let Value::Object(map) = value {
                    merge_recursive(&mut existing, map);
                }
                base.insert(key, Value::Object(existing));
            }
            Some(existing) => {
                let mut list = match existing {
                    Value::Array(list) => list,
                    other => vec![other],
                };
                match value {
                    Value::Array(more) => list.extend(more),
                    other => list.push(other),
                }
                base.insert(key, Value::Array(list));
            }
        }
    }
}

/// 视图扩展：向模板发布一组全局变量
pub trait ViewExtension {
    fn name(&self) -> &str;
    fn globals(&self) -> Map<String, Value>;
}

/// 内置的 `common` 扩展，发布配置中的 `globals` 表
pub struct CommonExtension {
    globals: Map<String, Value>,
}

impl CommonExtension {
    pub fn new(config: &Config) -> Self {
        Self {
            globals: config.globals().clone(),
        }
    }
}

impl ViewExtension for CommonExtension {
    fn name(&self) -> &str {
        "common"
    }

    fn globals(&self) -> Map<String, Value> {
        self.globals.clone()
    }
}

/// 一次请求使用的视图渲染器
pub struct View {
    templates_dir: PathBuf,
    globals: Map<String, Value>,
    cache: Arc<Mutex<TemplateCache>>,
}

impl View {
    pub fn new(config: &Config, cache: Arc<Mutex<TemplateCache>>) -> Self {
        let mut view = Self {
            templates_dir: config.templates_dir().to_path_buf(),
            globals: Map::new(),
            cache,
        };
        for name in config.template_extensions() {
            match name.as_str() {
                "common" => view.add_extension(&CommonExtension::new(config)),
                other => warn!("未知的视图扩展{}，已忽略", other),
            }
        }
        view
    }

    pub fn add_extension(&mut self, extension: &dyn ViewExtension) {
        debug!("载入视图扩展{}", extension.name());
        merge_recursive(&mut self.globals, extension.globals());
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        let mut incoming = Map::new();
        incoming.insert(name.to_string(), value);
        merge_recursive(&mut self.globals, incoming);
    }

    pub fn get_global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn globals(&self) -> &Map<String, Value> {
        &self.globals
    }

    /// 渲染模板。`context` 中的同名键覆盖 `globals`。
    pub fn render(&self, name: &str, context: &Map<String, Value>) -> Result<String, Exception> {
        if template_path(&self.templates_dir, name).is_none() {
            return Err(Exception::Template(format!("Invalid template name \"{}\"", name)));
        }
        let env = self.environment();
        let template = env
            .get_template(name)
            .map_err(|e| template_error(name, e))?;
        debug!("渲染模板{}", name);
        template.render(context).map_err(|e| template_error(name, e))
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);

        let dir = self.templates_dir.clone();
        let cache = Arc::clone(&self.cache);
        env.set_loader(move |name: &str| load_source(&dir, &cache, name));

        env.add_filter("raw", |value: minijinja::Value| {
            minijinja::Value::from_safe_string(value.to_string())
        });
        env.add_global("globals", minijinja::Value::from_serialize(&self.globals));
        env
    }
}

fn template_error(name: &str, e: minijinja::Error) -> Exception {
    match e.kind() {
        ErrorKind::TemplateNotFound => {
            Exception::Template(format!("Unable to find template \"{}\"", name))
        }
        _ => Exception::Template(format!("{}: {}", name, e)),
    }
}

/// 模板名只允许普通路径段，拒绝 `..`、绝对路径等
fn template_path(dir: &Path, name: &str) -> Option<PathBuf> {
    let relative = Path::new(name);
    let valid = !name.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    valid.then(|| dir.join(relative))
}

fn lock(cache: &Mutex<TemplateCache>) -> MutexGuard<'_, TemplateCache> {
    match cache.lock() {
        Ok(lock) => lock,
        Err(poisoned) => {
            warn!("模板缓存锁被污染，恢复并继续");
            poisoned.into_inner()
        }
    }
}

// 找不到的模板返回 Ok(None)，由 minijinja 报告 TemplateNotFound
fn load_source(
    dir: &Path,
    cache: &Mutex<TemplateCache>,
    name: &str,
) -> Result<Option<String>, minijinja::Error> {
    let path = match template_path(dir, name) {
        Some(path) => path,
        None => return Ok(None),
    };
    let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return Ok(None),
    };

    let mut cache = lock(cache);
    if let Some(source) = cache.find(&path, modified) {
        debug!("模板{}命中缓存", name);
        return Ok(Some(source.to_string()));
    }
    let source = fs::read_to_string(&path).map_err(|e| {
        minijinja::Error::new(ErrorKind::InvalidOperation, format!("无法读取模板{}", name))
            .with_source(e)
    })?;
    cache.push(&path, Arc::from(source.as_str()), modified);
    Ok(Some(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::{Duration, SystemTime};

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        cache: Arc<Mutex<TemplateCache>>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join("templates")).unwrap();
            fs::write(dir.path().join("config.toml"), crate::config::tests::SAMPLE).unwrap();
            Self {
                dir,
                cache: Arc::new(Mutex::new(TemplateCache::from_capacity(4))),
            }
        }

        fn template(&self, name: &str, source: &str) -> PathBuf {
            let path = self.dir.path().join("templates").join(name);
            fs::write(&path, source).unwrap();
            path
        }

        fn view(&self) -> View {
            let config = Config::from_toml(&self.dir.path().join("config.toml")).unwrap();
            View::new(&config, Arc::clone(&self.cache))
        }
    }

    #[test]
    fn test_html_is_escaped_unless_raw() {
        let f = Fixture::new();
        f.template("p.html", "<p>{{ user.name }}</p>{{ html|raw }}{{ html|safe }}");
        let out = f
            .view()
            .render(
                "p.html",
                &object(json!({ "user": { "name": "<Tom & Jerry>" }, "html": "<b>hi</b>" })),
            )
            .unwrap();
        assert_eq!(out, "<p>&lt;Tom &amp; Jerry&gt;</p><b>hi</b><b>hi</b>");
    }

    #[test]
    fn test_loops_and_conditions() {
        let f = Fixture::new();
        f.template(
            "list.html",
            "{% for u in users %}<li>{{ u }}</li>{% endfor %}{% if admin %}!{% endif %}",
        );
        let out = f
            .view()
            .render("list.html", &object(json!({ "users": ["a", "b"], "admin": true })))
            .unwrap();
        assert_eq!(out, "<li>a</li><li>b</li>!");
    }

    #[test]
    fn test_layout_inheritance_and_include() {
        let f = Fixture::new();
        f.template(
            "layout.html",
            "<title>{{ globals.site }}</title>{% block body %}{% endblock %}",
        );
        f.template("footer.html", "<footer>{{ year }}</footer>");
        f.template(
            "page.html",
            "{% extends \"layout.html\" %}{% block body %}<h1>{{ title }}</h1>{% include \"footer.html\" %}{% endblock %}",
        );
        let out = f
            .view()
            .render("page.html", &object(json!({ "title": "Home", "year": 2026 })))
            .unwrap();
        assert_eq!(out, "<title>demo</title><h1>Home</h1><footer>2026</footer>");
    }

    #[test]
    fn test_missing_variables_render_empty() {
        let f = Fixture::new();
        f.template("m.html", "[{{ nothing }}][{{ nothing.deeper.still }}][{{ items[1] }}]");
        let out = f
            .view()
            .render("m.html", &object(json!({ "items": ["a", "b"] })))
            .unwrap();
        assert_eq!(out, "[][][b]");
    }

    #[test]
    fn test_globals_merge_and_context_override() {
        let f = Fixture::new();
        f.template("g.html", "{{ globals.site }}/{{ globals.lang }}");
        let mut view = f.view();
        view.set_global("lang", json!("en"));
        assert_eq!(view.get_global("site"), Some(&json!("demo")));
        assert_eq!(view.render("g.html", &Map::new()).unwrap(), "demo/en");

        let out = view
            .render("g.html", &object(json!({ "globals": { "site": "own" } })))
            .unwrap();
        assert_eq!(out, "own/");
    }

    #[test]
    fn test_merge_recursive_collects_scalars() {
        let mut base = object(json!({ "menu": { "home": "/" }, "title": "a" }));
        merge_recursive(
            &mut base,
            object(json!({ "menu": { "about": "/about" }, "title": "b" })),
        );
        assert_eq!(
            Value::Object(base),
            json!({ "menu": { "home": "/", "about": "/about" }, "title": ["a", "b"] })
        );
    }

    #[test]
    fn test_source_cache_follows_modified_time() {
        let f = Fixture::new();
        let path = f.template("c.html", "one");
        let view = f.view();
        assert_eq!(view.render("c.html", &Map::new()).unwrap(), "one");
        assert_eq!(f.cache.lock().unwrap().len(), 1);

        fs::write(&path, "two").unwrap();
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        assert_eq!(view.render("c.html", &Map::new()).unwrap(), "two");
    }

    #[test]
    fn test_missing_invalid_and_broken_templates() {
        let f = Fixture::new();
        f.template("broken.html", "{% for x in %}");
        let view = f.view();
        match view.render("absent.html", &Map::new()) {
            Err(Exception::Template(msg)) => assert!(msg.contains("Unable to find template")),
            other => panic!("Expected Template error, got {:?}", other),
        }
        assert!(matches!(
            view.render("../config.toml", &Map::new()),
            Err(Exception::Template(_))
        ));
        assert!(matches!(
            view.render("broken.html", &Map::new()),
            Err(Exception::Template(_))
        ));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href='x'>&\"</a>"), "&lt;a href=&#039;x&#039;&gt;&amp;&quot;&lt;/a&gt;");
    }
}
