// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Live traffic recording and documentation backfill.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::http::request::Parts;
use hyper::{HeaderMap, Request, Response};
use tokio::time::Instant;

use crate::api::{ProbeBody, INTERNAL_NAMESPACE};
use crate::config::Options;
use crate::model::HistoryInput;
use crate::store::JsonStore;
use crate::vars::BASE_URL_PLACEHOLDER;

/// Request headers never copied into documentation during backfill.
const SENSITIVE_HEADERS: &[&str] = &[
    "cookie",
    "authorization",
    "host",
    "connection",
    "content-length",
];

/// Observes every host request passing the facade, records it to history
/// and fills gaps in the documented requests. Work beyond buffering runs
/// off the response path.
pub struct TrafficInterceptor {
    store: Arc<JsonStore>,
    options: Options,
}

impl TrafficInterceptor {
    pub fn new(store: Arc<JsonStore>, options: Options) -> Self {
        Self { store, options }
    }

    pub(crate) fn should_skip(&self, path: &str) -> bool {
        path.starts_with(&self.options.mount_path)
            || self
                .options
                .exclude_paths
                .iter()
                .any(|prefix| path.starts_with(prefix))
            || path.contains(INTERNAL_NAMESPACE)
    }

    /// Run `next` with recording around it. The request body arrives
    /// already buffered; the response body is buffered here only when
    /// response capture is on, otherwise it streams through untouched.
    pub async fn intercept<F, Fut>(
        &self,
        parts: Parts,
        body: Bytes,
        registered_pattern: Option<String>,
        next: F,
    ) -> Response<ProbeBody>
    where
        F: FnOnce(Request<Full<Bytes>>) -> Fut,
        Fut: Future<Output = Response<ProbeBody>>,
    {
        let path = parts.uri.path().to_string();
        if !self.options.auto_capture || self.should_skip(&path) {
            return next(Request::from_parts(parts, Full::new(body))).await;
        }

        let method = parts.method.to_string();
        let url = parts.uri.to_string();
        let request_headers = serialize_headers(&parts.headers);
        let request_body = String::from_utf8_lossy(&body).into_owned();

        let started = Instant::now();
        let response = next(Request::from_parts(parts, Full::new(body))).await;
        let duration = started.elapsed().as_millis() as u64;

        let (response, response_body) = if self.options.capture_response {
            let (head, tail) = response.into_parts();
            let collected = match tail.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(never) => match never {},
            };
            let text = String::from_utf8_lossy(&collected).into_owned();
            (
                Response::from_parts(head, Full::new(collected).boxed()),
                text,
            )
        } else {
            (response, String::new())
        };

        let live = LiveTraffic {
            method,
            url,
            path,
            status: response.status().as_u16(),
            duration,
            request_headers,
            request_body,
            response_headers: serialize_headers(response.headers()),
            response_body,
            registered_pattern,
        };
        let store = self.store.clone();
        let user_id = self.options.user_id.clone();
        let collection_name = store.auto_collection_name();
        tokio::spawn(async move {
            record_traffic(&store, &user_id, &collection_name, &live).await;
        });

        response
    }
}

/// One observed request/response exchange.
#[derive(Debug, Clone)]
pub(crate) struct LiveTraffic {
    pub method: String,
    pub url: String,
    pub path: String,
    pub status: u16,
    pub duration: u64,
    pub request_headers: String,
    pub request_body: String,
    pub response_headers: String,
    pub response_body: String,
    pub registered_pattern: Option<String>,
}

/// History first, backfill second. Both are best-effort; a failure in one
/// never reaches the host request.
pub(crate) async fn record_traffic(
    store: &JsonStore,
    user_id: &str,
    collection_name: &str,
    live: &LiveTraffic,
) {
    let entry = HistoryInput {
        method: live.method.clone(),
        url: live.url.clone(),
        status: live.status,
        duration: live.duration,
        request_headers: live.request_headers.clone(),
        request_body: live.request_body.clone(),
        response_headers: live.response_headers.clone(),
        response_body: live.response_body.clone(),
    };
    if let Err(e) = store.add_to_history(user_id, entry).await {
        tracing::warn!(error = %e, "failed to record history entry");
    }
    if let Err(e) = backfill_documentation(store, user_id, collection_name, live).await {
        tracing::warn!(error = %e, "documentation backfill failed");
    }
}

async fn backfill_documentation(
    store: &JsonStore,
    user_id: &str,
    collection_name: &str,
    live: &LiveTraffic,
) -> anyhow::Result<()> {
    let Some(view) = store
        .get_collections(user_id)
        .await
        .into_iter()
        .find(|view| view.collection.name == collection_name)
    else {
        return Ok(());
    };
    let Some(request) = view
        .requests
        .into_iter()
        .find(|request| request.method == live.method && url_matches(&request.url, live))
    else {
        return Ok(());
    };

    let body = if body_is_empty(request.body.as_deref()) {
        meaningful_json_body(&live.request_body)
    } else {
        None
    };
    let headers = if headers_are_empty(request.headers.as_deref()) {
        let filtered = filter_sensitive_headers(&live.request_headers);
        if filtered == "{}" {
            None
        } else {
            Some(filtered)
        }
    } else {
        None
    };
    if body.is_none() && headers.is_none() {
        return Ok(());
    }
    // The authoritative emptiness check runs inside the store, under its locks.
    store.backfill_request(&request.id, body, headers).await
}

fn url_matches(stored_url: &str, live: &LiveTraffic) -> bool {
    let stripped = stored_url
        .strip_prefix(BASE_URL_PLACEHOLDER)
        .unwrap_or(stored_url);
    if let Some(pattern) = &live.registered_pattern {
        if stripped == pattern || stored_url == pattern {
            return true;
        }
    }
    stripped == live.path
}

fn body_is_empty(body: Option<&str>) -> bool {
    matches!(body, None | Some("") | Some("{}") | Some("null"))
}

fn headers_are_empty(headers: Option<&str>) -> bool {
    matches!(headers, None | Some("") | Some("{}"))
}

/// A captured body worth documenting: valid JSON that is neither null nor
/// an empty object. Returned verbatim, not re-serialized.
fn meaningful_json_body(text: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(text).ok()?;
    match &parsed {
        serde_json::Value::Null => None,
        serde_json::Value::Object(map) if map.is_empty() => None,
        _ => Some(text.to_string()),
    }
}

fn filter_sensitive_headers(serialized: &str) -> String {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str(serialized) else {
        return "{}".to_string();
    };
    let filtered: serde_json::Map<String, serde_json::Value> = map
        .into_iter()
        .filter(|(name, _)| !SENSITIVE_HEADERS.contains(&name.to_lowercase().as_str()))
        .collect();
    serde_json::to_string(&filtered).unwrap_or_else(|_| "{}".to_string())
}

fn serialize_headers(headers: &HeaderMap) -> String {
    let mut map = serde_json::Map::new();
    for (name, value) in headers.iter() {
        if let Ok(text) = value.to_str() {
            map.insert(name.as_str().to_string(), text.into());
        }
    }
    serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
}
