// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 演示站点的控制器

use serde_json::{json, Map, Value};

use webfront::{Action, BaseController, Controller, ControllerRegistry, ErrorController, Exception, Reply};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub struct Home {
    base: BaseController,
}

impl Home {
    fn index(&mut self, _: Option<Vec<String>>) -> Result<Reply, Exception> {
        let visits = {
            let mut session = self.base.session();
            let visits = session.get("visits").and_then(Value::as_u64).unwrap_or(0) + 1;
            session.set("visits", json!(visits));
            visits
        };
        let users_url = self.base.generate_url("users", &[], &[])?;
        let body = self.base.render(
            "home.html",
            &object(json!({
                "visits": visits,
                "users_url": users_url,
                "base_url": self.base.base_url(),
                "is_browser": self.base.utils().is_browser(),
            })),
        )?;
        Ok(Reply::Text(body))
    }
}

impl Controller for Home {
    const ACTIONS: &'static [(&'static str, Action<Self>)] = &[("index", Self::index)];

    fn construct(base: BaseController) -> Self {
        Self { base }
    }
}

pub struct Users {
    base: BaseController,
}

impl Users {
    fn list(&mut self, _: Option<Vec<String>>) -> Result<Reply, Exception> {
        let page = self
            .base
            .request()
            .get("page", Some("int"), Value::from(1));
        let first = self.base.generate_url("user", &["1"], &[("tab", "profile")])?;
        let body = self.base.render(
            "users.html",
            &object(json!({
                "page": page,
                "first": first,
                "users": [
                    { "id": 1, "name": "Ada" },
                    { "id": 2, "name": "Linus" },
                ],
            })),
        )?;
        Ok(Reply::Text(body))
    }

    fn show(&mut self, params: Option<Vec<String>>) -> Result<Reply, Exception> {
        let params = params.unwrap_or_default();
        let id = params.first().cloned().unwrap_or_default();
        let tab = self
            .base
            .request()
            .get("tab", Some("trim|xss"), Value::from("overview"));
        self.base.utils().header("X-User-Id", &id);
        let body = self.base.render(
            "user.html",
            &object(json!({ "id": id, "tab": tab, "rest": params.join("/") })),
        )?;
        Ok(Reply::Text(body))
    }

    fn back(&mut self, _: Option<Vec<String>>) -> Result<Reply, Exception> {
        self.base.redirect_to("users", &[], &[])
    }
}

impl Controller for Users {
    const ACTIONS: &'static [(&'static str, Action<Self>)] =
        &[("list", Self::list), ("show", Self::show), ("back", Self::back)];

    fn construct(base: BaseController) -> Self {
        Self { base }
    }
}

pub struct Error {
    code: u16,
    message: String,
}

impl Error {
    fn show(&mut self, _: Option<Vec<String>>) -> Result<Reply, Exception> {
        Ok(Reply::Text(format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title></head>\
             <body><h1>{}</h1><p>{}</p></body></html>",
            self.code,
            self.code,
            webfront::view::escape_html(&self.message)
        )))
    }
}

impl ErrorController for Error {
    const ACTIONS: &'static [(&'static str, Action<Self>)] = &[("show", Self::show)];

    fn construct(error: &Exception) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

pub fn registry() -> ControllerRegistry {
    let mut registry = ControllerRegistry::new();
    registry
        .register::<Home>("Home")
        .register::<Users>("Users")
        .register_error::<Error>();
    registry
}
