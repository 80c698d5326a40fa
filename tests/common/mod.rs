// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use probe_http::api::ProbeBody;
use probe_http::config::Options;
use probe_http::model::HistoryEntry;
use probe_http::scanner::{LayerNode, RouteTable};
use probe_http::service::ApiProbe;

/// Options pointing at uuid-keyed temp files, so parallel tests never share
/// storage.
pub fn temp_options() -> Options {
    let key = Uuid::new_v4();
    let storage = std::env::temp_dir().join(format!("probe-http_it_{key}.json"));
    let custom = std::env::temp_dir().join(format!("probe-http_it_{key}_custom.json"));
    Options {
        storage_path: storage.to_string_lossy().into_owned(),
        customization_path: Some(custom.to_string_lossy().into_owned()),
        ..Options::default()
    }
}

pub fn temp_probe() -> ApiProbe {
    ApiProbe::new(temp_options())
}

/// Widget routes with one zod-style body schema on the POST, plus an order
/// route documented without any schema.
pub fn widget_routes() -> RouteTable {
    let create_widget = json!({
        "zodSchema": {
            "_def": {
                "typeName": "ZodObject",
                "shape": {
                    "name": { "_def": { "typeName": "ZodString" } }
                }
            }
        }
    });
    RouteTable {
        stack: vec![
            LayerNode::Route {
                path: "/widgets".to_string(),
                methods: vec!["get".to_string(), "post".to_string()],
                handles: vec![create_widget],
            },
            LayerNode::Route {
                path: "/widgets/:id".to_string(),
                methods: vec!["get".to_string()],
                handles: vec![],
            },
            LayerNode::Route {
                path: "/orders".to_string(),
                methods: vec!["post".to_string()],
                handles: vec![],
            },
        ],
    }
}

pub fn request(method: Method, path: &str, body: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(path)
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("build request")
}

fn app_response() -> Response<ProbeBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from_static(b"{\"served\":true}")).boxed())
        .expect("build response")
}

/// Push one request through the probe with a canned host app behind it and
/// decode whatever comes back.
pub async fn drive(
    probe: &ApiProbe,
    method: Method,
    path: &str,
    body: &str,
) -> (StatusCode, Value) {
    let response = probe
        .handle(request(method, path, body), |_req| async { app_response() })
        .await;
    read_json(response).await
}

pub async fn read_json(response: Response<ProbeBody>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse response json")
    };
    (status, value)
}

/// Recording runs on a spawned task; poll until at least `want` entries are
/// visible (bounded at two seconds).
pub async fn wait_for_history(probe: &ApiProbe, want: usize) -> Vec<HistoryEntry> {
    let store = probe.store();
    for _ in 0..200 {
        let history = store.get_history("system").await;
        if history.len() >= want {
            return history;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    store.get_history("system").await
}
