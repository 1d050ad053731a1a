// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 应用上下文
//!
//! [`Kernel`] 是进程级、只读的部分：Web 根目录、配置与路由文件位置、控制器注册表、
//! 数据库连接器和模板缓存。它只安装一次，之后在所有请求间共享。
//!
//! [`Application`] 是请求级的部分，持有本次请求的配置、会话与上下文。
//! 状态机为 `Uninitialized → Running → Terminated`，进入 `Terminated` 时
//! 会话恰好刷写一次，无论分发成功与否。

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;

use crate::cache::TemplateCache;
use crate::config::Config;
use crate::context::RequestContext;
use crate::controller::{ControllerRegistry, Reply};
use crate::database::{Connector, DsnConnector};
use crate::dispatcher::{Dispatcher, Output};
use crate::exception::Exception;
use crate::param::{HttpRequestMethod, ERROR_ACTION, ERROR_CONTROLLER};
use crate::request::Request;
use crate::response::Response;
use crate::routing::RouteTable;
use crate::session::{FileSessionStore, Session, SessionStore};
use crate::util::HtmlBuilder;

static KERNEL: OnceCell<Kernel> = OnceCell::new();

pub const CONFIG_FILE: &str = "config.toml";
pub const ROUTES_FILE: &str = "routes.toml";

pub struct Kernel {
    web_root: PathBuf,
    config_path: PathBuf,
    routes_path: PathBuf,
    registry: ControllerRegistry,
    connector: Box<dyn Connector>,
    session_store: Option<Arc<dyn SessionStore>>,
    template_cache: OnceCell<Arc<Mutex<TemplateCache>>>,
}

impl Kernel {
    /// 以 Web 根目录构造。配置与路由文件位于根目录的上一级。
    pub fn new(web_root: &Path, registry: ControllerRegistry) -> Self {
        let web_root = web_root
            .canonicalize()
            .unwrap_or_else(|_| web_root.to_path_buf());
        let base = match web_root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => web_root.join(".."),
        };
        Self {
            config_path: base.join(CONFIG_FILE),
            routes_path: base.join(ROUTES_FILE),
            web_root,
            registry,
            connector: Box::new(DsnConnector),
            session_store: None,
            template_cache: OnceCell::new(),
        }
    }

    pub fn with_connector(mut self, connector: Box<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// 替换缺省的文件会话存储
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// 安装为进程级单例。重复安装不生效，返回已安装的实例。
    pub fn install(self) -> &'static Kernel {
        if let Some(existing) = KERNEL.get() {
            warn!("Kernel已安装，忽略重复的安装请求");
            return existing;
        }
        KERNEL.get_or_init(|| self)
    }

    pub fn instance() -> Option<&'static Kernel> {
        KERNEL.get()
    }

    /// 处理一个请求。每次调用都使用全新的 [`Application`]。
    pub fn handle(&self, request: &Request, id: u128) -> Response {
        Application::new(self, request, id).run()
    }

    /// 检查路由表中的每个目标是否已登记，返回发现的问题
    pub fn audit_routes(&self) -> Result<Vec<String>, Exception> {
        let routes = RouteTable::from_toml(&self.routes_path)?.ok_or(Exception::NoRoutes)?;
        let mut problems = Vec::new();
        for route in routes.iter() {
            let problem = match (route.pattern.as_deref(), route.target()) {
                (None, _) => format!("路由{}没有pattern，将被跳过", route.name),
                (_, None) => format!("路由{}没有Controller::action目标，将被跳过", route.name),
                (_, Some((controller, _))) if !self.registry.contains(controller) => {
                    format!("路由{}指向未登记的控制器{}", route.name, controller)
                }
                (_, Some((controller, action)))
                    if !self.registry.has_action(controller, action) =>
                {
                    format!("路由{}指向的动作{}::{}不存在", route.name, controller, action)
                }
                _ => continue,
            };
            warn!("{}", problem);
            problems.push(problem);
        }
        if !self.registry.has_error_controller() {
            warn!(
                "没有登记错误控制器{}::{}，错误页将使用最简输出",
                ERROR_CONTROLLER, ERROR_ACTION
            );
        }
        Ok(problems)
    }

    pub fn web_root(&self) -> &Path {
        &self.web_root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn routes_path(&self) -> &Path {
        &self.routes_path
    }

    pub fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    fn template_cache(&self, config: &Config) -> Arc<Mutex<TemplateCache>> {
        Arc::clone(self.template_cache.get_or_init(|| {
            Arc::new(Mutex::new(TemplateCache::from_capacity(
                config.template_cache_size(),
            )))
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lifecycle {
    Uninitialized,
    Running,
    Terminated,
}

/// 一次请求的应用上下文
pub struct Application<'k> {
    kernel: &'k Kernel,
    request: &'k Request,
    id: u128,
    state: Lifecycle,
    config: Option<Rc<Config>>,
    session: Option<Rc<RefCell<Session>>>,
}

impl<'k> Application<'k> {
    pub fn new(kernel: &'k Kernel, request: &'k Request, id: u128) -> Self {
        Self {
            kernel,
            request,
            id,
            state: Lifecycle::Uninitialized,
            config: None,
            session: None,
        }
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// 运行到结束并返回响应。失败统一在这里转换为错误页。
    pub fn run(mut self) -> Response {
        self.state = Lifecycle::Running;
        let mut response = Response::new(*self.request.version());

        match self.execute() {
            Ok((output, headers)) => {
                match output {
                    Output::Body(body) => {
                        response.set_code(200).set_body(body);
                    }
                    Output::Redirect(location) => {
                        response
                            .set_code(302)
                            .add_header("Location", &location)
                            .set_body(String::new());
                    }
                }
                for (name, value) in &headers {
                    response.add_header(name, value);
                }
            }
            Err(e) => self.report(&e, &mut response),
        }

        if let Some(cookie) = self
            .session
            .as_ref()
            .and_then(|s| s.borrow().cookie_header())
        {
            response.add_header("Set-Cookie", &cookie);
        }
        self.terminate();

        response
            .set_head_only(self.request.method() == HttpRequestMethod::Head)
            .compress(self.request.accept_encoding(), self.id);
        info!(
            "[ID{}]HTTP/{}, {}, {}, {} {}, {}",
            self.id,
            self.request.version(),
            self.request.method(),
            self.request.target(),
            response.status_code(),
            response.information(),
            self.request.user_agent()
        );
        response
    }

    fn execute(&mut self) -> Result<(Output, Vec<(String, String)>), Exception> {
        let target = self.request.target();
        if !target.starts_with('/') {
            return Err(Exception::InvalidUri);
        }
        let raw_path = self.request.path().trim_start_matches('/').to_string();

        let config = Rc::new(Config::from_toml(self.kernel.config_path())?);
        self.config = Some(Rc::clone(&config));

        let store: Arc<dyn SessionStore> = match &self.kernel.session_store {
            Some(store) => Arc::clone(store),
            None => Arc::new(FileSessionStore::new(
                config.session().save_path.clone().unwrap_or_default(),
            )),
        };
        let session = Rc::new(RefCell::new(Session::open(
            config.session(),
            &self.request.cookies(),
            store,
        )?));
        self.session = Some(Rc::clone(&session));

        let context = Rc::new(RequestContext::from_request(self.request));
        let routes = RouteTable::from_toml(self.kernel.routes_path())?.map(Rc::new);

        let dispatcher = Dispatcher::new(
            Rc::clone(&config),
            routes,
            &self.kernel.registry,
            self.kernel.connector.as_ref(),
            self.kernel.template_cache(&config),
        );
        let dispatched = dispatcher.dispatch(&raw_path, context, session, self.id)?;
        Ok((dispatched.output, dispatched.headers))
    }

    /// 写状态行，再按配置输出诊断页或交给错误控制器
    fn report(&self, e: &Exception, response: &mut Response) {
        error!("[ID{}]请求处理失败（{}）：{}", self.id, e.code(), e);
        response.set_code(e.code());

        let display = self
            .config
            .as_ref()
            .map_or(false, |c| c.display_exceptions());
        if display {
            response.set_body(HtmlBuilder::from_exception(e, self.request.target()).build());
            return;
        }

        let body = match self.kernel.registry.invoke_error(e) {
            Some(Ok(Reply::Text(body))) => body,
            Some(Ok(_)) => {
                warn!("[ID{}]错误控制器没有返回文本", self.id);
                format!("<h1>{}</h1>", e.code())
            }
            Some(Err(inner)) => {
                warn!("[ID{}]错误控制器失败：{}", self.id, inner);
                format!("<h1>{}</h1>", e.code())
            }
            None => format!("<h1>{}</h1>", e.code()),
        };
        response.set_body(body);
    }

    /// 进入 `Terminated` 并刷写会话，重复调用无效
    pub fn terminate(&mut self) {
        if self.state == Lifecycle::Terminated {
            return;
        }
        self.state = Lifecycle::Terminated;
        if let Some(session) = self.session.take() {
            if let Err(e) = session.borrow_mut().save() {
                error!("[ID{}]会话刷写失败：{}", self.id, e);
            } else {
                debug!("[ID{}]会话已刷写", self.id);
            }
        }
    }
}

impl Drop for Application<'_> {
    fn drop(&mut self) {
        self.terminate();
    }
}
