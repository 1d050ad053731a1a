// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 分发器
//!
//! 一次分发的步骤：
//! 1. 把请求路径规范化为以 `/` 开头；
//! 2. 路由表缺失或为空时直接失败（500）；
//! 3. 用路由器匹配路径，未命中返回 404；
//! 4. 按名字查找控制器，未登记视为配置错误（500）；
//! 5. 打开数据库连接，失败原样上抛；
//! 6. 构造控制器并调用动作，动作不存在返回 501；
//! 7. 动作必须产生文本或跳转，否则视为无效响应。
//!
//! 任何一步失败都不重试，直接交给 [`crate::app::Application`] 的错误处理。

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::cache::TemplateCache;
use crate::config::Config;
use crate::context::RequestContext;
use crate::controller::{BaseController, ControllerRegistry, Reply};
use crate::database::Connector;
use crate::exception::Exception;
use crate::helper::Utils;
use crate::routing::{normalize_path, MatchResult, RouteTable, Router};
use crate::session::Session;
use crate::view::View;

/// 动作的输出
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Body(String),
    Redirect(String),
}

/// 一次成功分发的结果
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub output: Output,
    /// 控制器通过 `Utils::header` 追加的标头
    pub headers: Vec<(String, String)>,
    pub matched: MatchResult,
}

pub struct Dispatcher<'a> {
    config: Rc<Config>,
    routes: Option<Rc<RouteTable>>,
    registry: &'a ControllerRegistry,
    connector: &'a dyn Connector,
    template_cache: Arc<Mutex<TemplateCache>>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        config: Rc<Config>,
        routes: Option<Rc<RouteTable>>,
        registry: &'a ControllerRegistry,
        connector: &'a dyn Connector,
        template_cache: Arc<Mutex<TemplateCache>>,
    ) -> Self {
        Self {
            config,
            routes,
            registry,
            connector,
            template_cache,
        }
    }

    pub fn dispatch(
        &self,
        raw_path: &str,
        request: Rc<RequestContext>,
        session: Rc<RefCell<Session>>,
        id: u128,
    ) -> Result<Dispatched, Exception> {
        let path = normalize_path(raw_path);

        let routes = match &self.routes {
            Some(routes) if !routes.is_empty() => Rc::clone(routes),
            _ => return Err(Exception::NoRoutes),
        };

        let matched = Router::new(&routes)
            .resolve(&path)
            .ok_or_else(|| Exception::RouteNotFound(path.clone()))?;
        debug!(
            "[ID{}]路由{}：{}::{}",
            id, matched.route_name, matched.controller, matched.action
        );

        if !self.registry.contains(&matched.controller) {
            return Err(Exception::UnknownController(matched.controller.clone()));
        }

        let db = self.connector.connect(self.config.db())?;

        let headers = Rc::new(RefCell::new(Vec::new()));
        let utils = Utils::new(Rc::clone(&routes), Rc::clone(&request), Rc::clone(&headers));
        let view = View::new(&self.config, Arc::clone(&self.template_cache));
        let base = BaseController::new(
            Rc::clone(&self.config),
            request,
            session,
            view,
            db,
            utils,
            matched.options.clone(),
        );

        let params = action_params(&matched.path_params);
        let reply = self
            .registry
            .invoke(&matched.controller, base, &matched.action, params)
            .ok_or_else(|| Exception::UnknownController(matched.controller.clone()))??;

        let output = match reply {
            Reply::Text(body) => Output::Body(body),
            Reply::Redirect(location) => Output::Redirect(location),
            Reply::Nothing => return Err(Exception::InvalidResponse),
        };
        let headers = headers.borrow().clone();
        Ok(Dispatched {
            output,
            headers,
            matched,
        })
    }
}

/// 路径参数为空或首段为空时，动作收到 `None`
pub fn action_params(path_params: &[String]) -> Option<Vec<String>> {
    match path_params.first() {
        Some(first) if !first.is_empty() => Some(path_params.to_vec()),
        _ => None,
    }
}
