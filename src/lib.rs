// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

pub mod app;
pub mod cache;
pub mod config;
pub mod context;
pub mod controller;
pub mod database;
pub mod dispatcher;
pub mod exception;
pub mod helper;
pub mod param;
pub mod request;
pub mod response;
pub mod routing;
pub mod sanitize;
pub mod session;
pub mod util;
pub mod view;

pub use app::{Application, Kernel, Lifecycle};
pub use config::Config;
pub use context::RequestContext;
pub use controller::{Action, BaseController, Controller, ControllerRegistry, ErrorController, Reply};
pub use database::{Connection, Connector, DsnConnector};
pub use exception::Exception;
pub use helper::Utils;
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use response::Response;
pub use routing::{MatchResult, Route, RouteTable, Router};
pub use session::{FileSessionStore, Session, SessionStore};
pub use view::View;
