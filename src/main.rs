// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 前端控制器宿主
//!
//! 基于 Tokio 运行时的 HTTP 宿主：
//! - 接收 TCP 连接并按 `Content-Length` 读取完整请求，标头与请求体均有大小上限
//! - 每个请求在阻塞线程池上运行一个全新的 `Application`
//! - 后台管理控制台（`stop` / `status` / `help`）
//!
//! 用法：`webfront [WEB_ROOT]`，缺省为 `demo/public`。配置文件与路由文件位于
//! Web 根目录的上一级。

mod controllers;

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    path::PathBuf,
    process,
    sync::{Arc, Mutex},
    time::Instant,
};

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    runtime::Builder,
    sync::Notify,
};

use webfront::config::{Config, ServerConfig};
use webfront::request::{read_state, ReadState};
use webfront::{HttpVersion, Kernel, Request, Response};

const DEFAULT_WEB_ROOT: &str = "demo/public";
const READ_CHUNK: usize = 4096;

fn main() {
    // 1. 初始化日志系统
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法载入日志配置config/log4rs.yaml：{}", e);
    }

    // 2. 安装进程级 Kernel
    let web_root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WEB_ROOT));
    let kernel = Kernel::new(&web_root, controllers::registry()).install();
    info!("web root: {}", kernel.web_root().display());

    // 3. 宿主参数来自配置文件中的 [server] 表，配置无法载入时使用缺省值
    let server = match Config::from_toml(kernel.config_path()) {
        Ok(config) => config.server().clone(),
        Err(e) => {
            warn!("无法载入{}：{}，宿主使用缺省参数", kernel.config_path().display(), e);
            ServerConfig::default()
        }
    };

    match kernel.audit_routes() {
        Ok(problems) if problems.is_empty() => info!("路由表检查通过"),
        Ok(problems) => warn!("路由表中有{}处问题", problems.len()),
        Err(e) => warn!("无法检查路由表：{}", e),
    }

    // 4. 按配置的工作线程数构建运行时
    let runtime = match Builder::new_multi_thread()
        .worker_threads(server.worker_threads.max(1))
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建Tokio运行时：{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(kernel, server)) {
        error!("服务端异常退出：{}", e);
        process::exit(1);
    }
}

async fn serve(kernel: &'static Kernel, server: ServerConfig) -> std::io::Result<()> {
    let address = match server.local {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    let socket = SocketAddrV4::new(address, server.port);
    let listener = TcpListener::bind(socket).await?;
    info!("服务端在{}上监听Socket连接", socket);

    // shutdown: 控制台发出停机信号；active_connection: 当前并发连接数
    let shutdown = Arc::new(Notify::new());
    let active_connection = Arc::new(Mutex::new(0u32));

    tokio::spawn(console(Arc::clone(&shutdown), Arc::clone(&active_connection)));

    let mut id: u128 = 0;
    loop {
        let (mut stream, addr) = tokio::select! {
            _ = shutdown.notified() => {
                info!("主循环接收到停机指令，正在退出...");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!("接受连接失败：{}", e);
                    continue;
                }
            },
        };
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        let active_connection = Arc::clone(&active_connection);
        let max_body_size = server.max_body_size;
        tokio::spawn(async move {
            *lock(&active_connection) += 1;
            handle_connection(&mut stream, addr.to_string(), id, kernel, max_body_size).await;
            *lock(&active_connection) -= 1;
        });
        id += 1;
    }
}

fn lock(counter: &Mutex<u32>) -> std::sync::MutexGuard<'_, u32> {
    counter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn console(shutdown: Arc<Notify>, active_connection: Arc<Mutex<u32>>) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match input.trim() {
            "stop" => {
                println!("停机指令已激活，服务器将停止接受新连接...");
                shutdown.notify_one();
                break;
            }
            "help" => {
                println!("== webfront Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("help   - 显示此帮助信息");
                println!("===================");
            }
            "status" => {
                println!("== webfront 状态 ===");
                println!("当前活跃连接数: {}", *lock(&active_connection));
                println!("====================");
            }
            "" => {}
            cmd => println!("无效的命令：{}", cmd),
        }
    }
}

/// 读取完整请求，交给 Kernel 处理并写回响应
async fn handle_connection(
    stream: &mut TcpStream,
    peer: String,
    id: u128,
    kernel: &'static Kernel,
    max_body_size: usize,
) {
    let start_time = Instant::now();
    let mut buffer = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        match read_state(&buffer, max_body_size) {
            ReadState::Complete(_) => break,
            ReadState::Incomplete => {}
            rejected => {
                let code = rejected.status_code().unwrap_or(400);
                warn!("[ID{}]请求超出大小限制（{:?}），返回{}", id, rejected, code);
                write_response(stream, Response::from_status_code(code, HttpVersion::V1_1), id)
                    .await;
                return;
            }
        }
        match stream.read(&mut chunk).await {
            Ok(0) if buffer.is_empty() => return, // 客户端主动关闭连接
            Ok(0) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) => {
                error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
                return;
            }
        }
    }
    debug!("[ID{}]HTTP请求接收完毕，共{}字节", id, buffer.len());

    let request = match Request::try_from(&buffer, id) {
        Ok(request) => request.with_remote_addr(&peer),
        Err(e) => {
            error!("[ID{}]解析HTTP请求失败: {}", id, e);
            write_response(stream, Response::from_status_code(e.code(), HttpVersion::V1_1), id)
                .await;
            return;
        }
    };

    // Application 使用 Rc，只在阻塞线程上创建与销毁
    let response = match tokio::task::spawn_blocking(move || kernel.handle(&request, id)).await {
        Ok(response) => response,
        Err(e) => {
            error!("[ID{}]请求处理线程异常退出：{}", id, e);
            Response::from_status_code(500, HttpVersion::V1_1)
        }
    };
    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );
    write_response(stream, response, id).await;
}

async fn write_response(stream: &mut TcpStream, response: Response, id: u128) {
    let bytes = response.as_bytes();
    debug!("[ID{}]发送响应，长度: {}", id, bytes.len());
    if let Err(e) = stream.write_all(&bytes).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    let _ = stream.flush().await;
}
