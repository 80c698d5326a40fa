// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

use clap::Parser;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::signal;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoConnBuilder;
use serde_json::json;
use tracing::{error, info, warn};

use probe_http::api::ProbeBody;
use probe_http::config::Options;
use probe_http::scanner::{LayerNode, RouteTable};
use probe_http::service::ApiProbe;

#[derive(Parser, Debug)]
#[command(name = "probe-http")]
struct Args {
    /// Listen port; overrides the configured one
    #[arg(long)]
    port: Option<u16>,

    /// Optional config TOML path
    #[arg(long)]
    config: Option<String>,
}

type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response<ProbeBody>, Infallible>> + Send>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut options = match args.config {
        Some(ref p) => Options::load_from_path(p).await.unwrap_or_else(|e| {
            warn!(%p, %e, "failed to load config, using defaults");
            Options::default()
        }),
        None => Options::default(),
    };
    if let Some(port) = args.port {
        options.port = port;
    }
    let listen: SocketAddr = ([127, 0, 0, 1], options.port).into();

    let probe = ApiProbe::new(options);
    probe.startup(&sample_routes()).await;
    let probe = Arc::new(probe);

    let server = run_server(listen, probe);

    tokio::select! {
        res = server => {
            if let Err(e) = res {
                error!(%e, "server error");
            }
        }
        _ = signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    Ok(())
}

async fn run_server(listen: SocketAddr, probe: Arc<ApiProbe>) -> anyhow::Result<()> {
    run_server_with_limit(listen, probe, None).await
}

/// Accept loop. When `accept_limit` is `Some(n)` the loop returns after
/// accepting the nth connection, which lets tests bound it.
async fn run_server_with_limit(
    listen: SocketAddr,
    probe: Arc<ApiProbe>,
    accept_limit: Option<usize>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(%listen, "listening");

    let server_builder = AutoConnBuilder::new(TokioExecutor::new());

    let mut remaining = accept_limit;
    loop {
        if let Some(0) = remaining {
            break;
        }
        let (stream, _remote_addr) = listener.accept().await?;
        if let Some(ref mut n) = remaining {
            *n -= 1;
        }

        let probe = probe.clone();
        let builder_clone = server_builder.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let probe = probe.clone();
                let fut: ServiceFuture =
                    Box::pin(async move { Ok(probe.handle(req, demo_app).await) });
                fut
            });
            let io = TokioIo::new(stream);
            if let Err(e) = builder_clone.serve_connection(io, service).await {
                error!(%e, "connection error");
            }
        });
    }

    Ok(())
}

/// Tiny host application the probe is mounted on.
async fn demo_app(req: Request<Full<Bytes>>) -> Response<ProbeBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    match (method, path.as_str()) {
        (Method::GET, "/users") => json_reply(
            StatusCode::OK,
            json!([
                { "id": 1, "name": "Ada" },
                { "id": 2, "name": "Grace" },
            ]),
        ),
        (Method::POST, "/users") => {
            let bytes = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(never) => match never {},
            };
            let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or(json!({}));
            json_reply(StatusCode::CREATED, json!({ "id": 3, "user": payload }))
        }
        (Method::GET, p) if p.starts_with("/users/") => {
            let id = p.trim_start_matches("/users/");
            json_reply(StatusCode::OK, json!({ "id": id, "name": "Ada" }))
        }
        (Method::GET, "/health") => json_reply(StatusCode::OK, json!({ "ok": true })),
        _ => json_reply(StatusCode::NOT_FOUND, json!({ "error": "no such route" })),
    }
}

fn json_reply(status: StatusCode, value: serde_json::Value) -> Response<ProbeBody> {
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(value.to_string())).boxed())
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()).boxed()))
}

/// Route table of the demo app. The POST carries a zod-style schema handle
/// so its documented request gets an example body.
fn sample_routes() -> RouteTable {
    let create_user = json!({
        "zodSchema": {
            "_def": {
                "typeName": "ZodObject",
                "shape": {
                    "name": { "_def": { "typeName": "ZodString" } },
                    "email": { "_def": { "typeName": "ZodString" } },
                    "age": { "_def": { "typeName": "ZodNumber" } }
                }
            }
        }
    });
    RouteTable {
        stack: vec![
            LayerNode::Route {
                path: "/users".to_string(),
                methods: vec!["get".to_string(), "post".to_string()],
                handles: vec![create_user],
            },
            LayerNode::Route {
                path: "/users/:id".to_string(),
                methods: vec!["get".to_string()],
                handles: vec![],
            },
            LayerNode::Route {
                path: "/health".to_string(),
                methods: vec!["get".to_string()],
                handles: vec![],
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_http::scanner::RouteScanner;
    use tokio::fs;
    use uuid::Uuid;

    #[test]
    fn sample_routes_document_a_user_schema() {
        let scanner = RouteScanner::new();
        let routes = scanner.scan(&sample_routes());
        let post = routes
            .iter()
            .find(|r| r.method == "POST" && r.path == "/users")
            .expect("post route");
        let schema = post.schema.as_ref().expect("schema");
        assert_eq!(schema.get("name"), Some(&json!("string")));
        assert_eq!(schema.get("email"), Some(&json!("string")));
        assert_eq!(schema.get("age"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn demo_app_serves_users_and_404s() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/users")
            .body(Full::new(Bytes::new()))
            .expect("request");
        let res = demo_app(req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let req = Request::builder()
            .method(Method::GET)
            .uri("/nowhere")
            .body(Full::new(Bytes::new()))
            .expect("request");
        let res = demo_app(req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    fn free_addr() -> SocketAddr {
        // Bind then drop so the port is free for the server to claim.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);
        addr
    }

    fn temp_probe() -> Arc<ApiProbe> {
        let storage = std::env::temp_dir().join(format!("probe-http_main_{}.json", Uuid::new_v4()));
        Arc::new(ApiProbe::new(Options {
            storage_path: storage.to_string_lossy().into_owned(),
            ..Options::default()
        }))
    }

    #[tokio::test]
    async fn run_server_with_limit_accepts_zero_and_returns_immediately() -> anyhow::Result<()> {
        let addr = free_addr();
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            run_server_with_limit(addr, temp_probe(), Some(0)),
        )
        .await
        .expect("run_server_with_limit did not return within timeout")?;
        Ok(())
    }

    #[tokio::test]
    async fn run_server_with_limit_accepts_one_connection_and_returns() -> anyhow::Result<()> {
        use tokio::net::TcpStream;

        let addr = free_addr();
        let task = tokio::spawn(run_server_with_limit(addr, temp_probe(), Some(1)));

        // Server startup may be slightly delayed; retry until it listens.
        let mut stream = None;
        for _ in 0..20 {
            match TcpStream::connect(addr).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(50)).await,
            }
        }
        assert!(stream.is_some(), "failed to connect to server");

        let res = tokio::time::timeout(std::time::Duration::from_secs(2), task).await??;
        assert!(res.is_ok());
        drop(stream);
        Ok(())
    }

    #[tokio::test]
    async fn main_cli_port_overrides_config() {
        let tmp = std::env::temp_dir().join(format!("probe-http_main_cfg_{}.toml", Uuid::new_v4()));
        fs::write(&tmp, "port = 9999\n").await.expect("write tmp");

        let args = Args {
            port: Some(4000),
            config: Some(tmp.to_str().expect("utf8 path").to_string()),
        };

        let mut options = match args.config {
            Some(ref p) => Options::load_from_path(p).await.expect("load config"),
            None => Options::default(),
        };
        assert_eq!(options.port, 9999);
        if let Some(port) = args.port {
            options.port = port;
        }
        assert_eq!(options.port, 4000);

        let _ = fs::remove_file(&tmp).await;
    }
}
