// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 控制器模块
//!
//! 控制器类型在启动时登记到 [`ControllerRegistry`]，每个类型通过
//! [`Controller::ACTIONS`] 给出自己的动作表。分发时按路由目标中的名字查找，
//! 名字不存在属于配置错误，动作不存在则返回 501。

use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, warn};
use serde_json::{Map, Value};

use crate::config::Config;
use crate::context::RequestContext;
use crate::database::Connection;
use crate::exception::Exception;
use crate::helper::Utils;
use crate::session::Session;
use crate::view::View;

/// 动作的返回值
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// 文本响应体
    Text(String),
    /// 跳转到给定 URL
    Redirect(String),
    /// 没有产生文本，分发器视为无效响应
    Nothing,
}

impl From<String> for Reply {
    fn from(body: String) -> Self {
        Reply::Text(body)
    }
}

impl From<&str> for Reply {
    fn from(body: &str) -> Self {
        Reply::Text(body.to_string())
    }
}

/// 动作签名：路径参数为空时传入 `None`
pub type Action<C> = fn(&mut C, Option<Vec<String>>) -> Result<Reply, Exception>;

pub trait Controller: Sized + 'static {
    /// 动作表：动作名到方法的映射
    const ACTIONS: &'static [(&'static str, Action<Self>)];

    fn construct(base: BaseController) -> Self;
}

/// 错误控制器：以失败本身构造，在不显示诊断信息时渲染错误页
pub trait ErrorController: Sized + 'static {
    const ACTIONS: &'static [(&'static str, Action<Self>)];

    fn construct(error: &Exception) -> Self;
}

/// 注入给每个控制器的请求级依赖
pub struct BaseController {
    config: Rc<Config>,
    request: Rc<RequestContext>,
    session: Rc<RefCell<Session>>,
    view: View,
    db: Box<dyn Connection>,
    utils: Utils,
    options: Map<String, Value>,
}

impl BaseController {
    pub fn new(
        config: Rc<Config>,
        request: Rc<RequestContext>,
        session: Rc<RefCell<Session>>,
        view: View,
        db: Box<dyn Connection>,
        utils: Utils,
        options: Map<String, Value>,
    ) -> Self {
        Self {
            config,
            request,
            session,
            view,
            db,
            utils,
            options,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn session(&self) -> RefMut<'_, Session> {
        self.session.borrow_mut()
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut View {
        &mut self.view
    }

    pub fn db(&self) -> &dyn Connection {
        self.db.as_ref()
    }

    pub fn utils(&self) -> &Utils {
        &self.utils
    }

    /// 当前路由的选项，已包含 `ajax_only` 缺省值
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// 读取配置项，不存在时返回 `default`
    pub fn parameter(&self, name: &str, default: Value) -> Value {
        self.config.parameter(name).unwrap_or(default)
    }

    pub fn render(&self, name: &str, context: &Map<String, Value>) -> Result<String, Exception> {
        self.view.render(name, context)
    }

    pub fn generate_url(
        &self,
        route_name: &str,
        path_params: &[&str],
        query: &[(&str, &str)],
    ) -> Result<String, Exception> {
        self.utils.generate_url(route_name, path_params, query)
    }

    pub fn generate_full_url(
        &self,
        route_name: &str,
        path_params: &[&str],
        query: &[(&str, &str)],
    ) -> Result<String, Exception> {
        self.utils.generate_full_url(route_name, path_params, query)
    }

    pub fn base_url(&self) -> String {
        self.utils.base_url()
    }

    pub fn redirect_to(
        &self,
        route_name: &str,
        path_params: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Reply, Exception> {
        self.utils.redirect_to(route_name, path_params, query)
    }
}

type Invoker =
    Box<dyn Fn(BaseController, &str, Option<Vec<String>>) -> Result<Reply, Exception> + Send + Sync>;

type ErrorInvoker = Box<dyn Fn(&Exception) -> Result<Reply, Exception> + Send + Sync>;

struct Entry {
    actions: Vec<&'static str>,
    invoke: Invoker,
}

/// 控制器名到构造函数与动作表的映射，启动时构建，之后只读
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Entry>,
    error: Option<ErrorInvoker>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以 `name` 登记控制器类型 `C`，重复登记时后者覆盖前者
    pub fn register<C: Controller>(&mut self, name: &str) -> &mut Self {
        let table: HashMap<&'static str, Action<C>> = C::ACTIONS.iter().copied().collect();
        let mut actions: Vec<&'static str> = table.keys().copied().collect();
        actions.sort_unstable();
        debug!("登记控制器{}，动作：{:?}", name, actions);

        let invoke: Invoker = Box::new(
            move |base: BaseController, action: &str, params: Option<Vec<String>>| {
                let mut controller = C::construct(base);
                match table.get(action) {
                    Some(f) => f(&mut controller, params),
                    None => Err(Exception::ActionNotImplemented(action.to_string())),
                }
            },
        );
        if self
            .controllers
            .insert(name.to_string(), Entry { actions, invoke })
            .is_some()
        {
            warn!("控制器{}被重复登记", name);
        }
        self
    }

    pub fn register_error<C: ErrorController>(&mut self) -> &mut Self {
        let table: HashMap<&'static str, Action<C>> = C::ACTIONS.iter().copied().collect();
        let invoke: ErrorInvoker = Box::new(move |error: &Exception| {
            let mut controller = C::construct(error);
            match table.get(crate::param::ERROR_ACTION) {
                Some(f) => f(&mut controller, None),
                None => Err(Exception::ActionNotImplemented(
                    crate::param::ERROR_ACTION.to_string(),
                )),
            }
        });
        self.error = Some(invoke);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.controllers.contains_key(name)
    }

    pub fn has_action(&self, name: &str, action: &str) -> bool {
        self.controllers
            .get(name)
            .map_or(false, |e| e.actions.iter().any(|a| *a == action))
    }

    pub fn actions(&self, name: &str) -> Option<&[&'static str]> {
        self.controllers.get(name).map(|e| e.actions.as_slice())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.controllers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// 构造控制器并调用动作；控制器未登记时返回 `None`
    pub fn invoke(
        &self,
        name: &str,
        base: BaseController,
        action: &str,
        params: Option<Vec<String>>,
    ) -> Option<Result<Reply, Exception>> {
        self.controllers
            .get(name)
            .map(|entry| (entry.invoke)(base, action, params))
    }

    pub fn has_error_controller(&self) -> bool {
        self.error.is_some()
    }

    /// 调用错误控制器；未登记时返回 `None`
    pub fn invoke_error(&self, error: &Exception) -> Option<Result<Reply, Exception>> {
        self.error.as_ref().map(|invoke| invoke(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pages;

    impl Pages {
        fn home(&mut self, _: Option<Vec<String>>) -> Result<Reply, Exception> {
            Ok("home".into())
        }

        fn echo(&mut self, params: Option<Vec<String>>) -> Result<Reply, Exception> {
            Ok(Reply::Text(params.unwrap_or_default().join(",")))
        }
    }

    impl Controller for Pages {
        const ACTIONS: &'static [(&'static str, Action<Self>)] =
            &[("home", Self::home), ("echo", Self::echo)];

        fn construct(_: BaseController) -> Self {
            Pages
        }
    }

    struct Oops {
        code: u16,
    }

    impl Oops {
        fn show(&mut self, _: Option<Vec<String>>) -> Result<Reply, Exception> {
            Ok(Reply::Text(format!("oops {}", self.code)))
        }
    }

    impl ErrorController for Oops {
        const ACTIONS: &'static [(&'static str, Action<Self>)] = &[("show", Self::show)];

        fn construct(error: &Exception) -> Self {
            Oops { code: error.code() }
        }
    }

    #[test]
    fn test_register_builds_action_table() {
        let mut registry = ControllerRegistry::new();
        registry.register::<Pages>("Pages");

        assert!(registry.contains("Pages"));
        assert!(!registry.contains("pages"));
        assert!(registry.has_action("Pages", "echo"));
        assert!(!registry.has_action("Pages", "delete"));
        assert_eq!(registry.actions("Pages"), Some(&["echo", "home"][..]));
        assert_eq!(registry.names(), vec!["Pages"]);
    }

    #[test]
    fn test_error_controller() {
        let mut registry = ControllerRegistry::new();
        assert!(registry.invoke_error(&Exception::NoRoutes).is_none());

        registry.register_error::<Oops>();
        assert!(registry.has_error_controller());
        let reply = registry
            .invoke_error(&Exception::RouteNotFound("/x".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(reply, Reply::Text("oops 404".to_string()));
    }

    #[test]
    fn test_reply_conversions() {
        assert_eq!(Reply::from("a"), Reply::Text("a".to_string()));
        assert_eq!(Reply::from(String::from("b")), Reply::Text("b".to_string()));
    }
}
