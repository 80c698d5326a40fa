// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! The probe's own HTTP API, served under the mount path.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Options;
use crate::executor::{ExecuteRequest, Executor};
use crate::model::{
    CreateCollectionInput, CreateEnvironmentInput, CreateRequestInput, HistoryInput,
    UpdateCollectionInput, UpdateEnvironmentInput, UpdateRequestInput,
};
use crate::store::JsonStore;
use crate::vars::{load_variables, parse_variable_map, resolve_variables, BASE_URL_PLACEHOLDER};

/// Namespace segment all API routes live under, also used to recognize
/// probe traffic that must never be captured.
pub const INTERNAL_NAMESPACE: &str = "/__api__/";

pub type ProbeBody = BoxBody<Bytes, Infallible>;

const POSTMAN_SCHEMA: &str =
    "https://schema.getpostman.com/json/collection/v2.1.0/collection.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteInput {
    method: String,
    url: String,
    #[serde(default)]
    headers: serde_json::Map<String, Value>,
    body: Option<String>,
    #[serde(default)]
    variables: serde_json::Map<String, Value>,
    environment_id: Option<String>,
    request_id: Option<String>,
}

/// Dispatches requests under `<mount_path>/__api__/`. Routing is a plain
/// match over (method, path segments); everything answers JSON.
pub struct ToolApi {
    store: Arc<JsonStore>,
    executor: Executor,
    options: Options,
}

impl ToolApi {
    pub fn new(store: Arc<JsonStore>, options: Options) -> Self {
        Self {
            store,
            executor: Executor::new(),
            options,
        }
    }

    /// `subpath` is the request path with the mount prefix already removed.
    pub async fn dispatch(&self, method: &Method, subpath: &str, body: Bytes) -> Response<ProbeBody> {
        let Some(route) = subpath.strip_prefix("/__api__") else {
            return not_found();
        };
        let segments: Vec<&str> = route
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        match (method, segments.as_slice()) {
            (&Method::GET, ["settings"]) => {
                json_response(StatusCode::OK, json!({ "ignoreSegments": self.options.ignore_segments }))
            }

            (&Method::GET, ["collections"]) => {
                let collections = self.store.get_collections(&self.options.user_id).await;
                json_response(StatusCode::OK, json!({ "collections": collections }))
            }
            (&Method::POST, ["collections"]) => {
                let input: CreateCollectionInput = match parse_body(&body) {
                    Ok(input) => input,
                    Err(response) => return response,
                };
                match self.store.create_collection(&self.options.user_id, input).await {
                    Ok(collection) => {
                        json_response(StatusCode::CREATED, json!({ "collection": collection }))
                    }
                    Err(e) => internal_error(&e),
                }
            }
            (&Method::PUT, ["collections", id]) => {
                let input: UpdateCollectionInput = match parse_body(&body) {
                    Ok(input) => input,
                    Err(response) => return response,
                };
                match self.store.update_collection(id, input).await {
                    Ok(()) => json_response(StatusCode::OK, json!({ "success": true })),
                    Err(e) => internal_error(&e),
                }
            }

            (&Method::POST, ["requests"]) => {
                let input: CreateRequestInput = match parse_body(&body) {
                    Ok(input) => input,
                    Err(response) => return response,
                };
                match self.store.create_request(input).await {
                    Ok(request) => json_response(StatusCode::CREATED, json!({ "request": request })),
                    Err(e) => internal_error(&e),
                }
            }
            (&Method::GET, ["requests", id]) => match self.store.get_request(id).await {
                Some(request) => json_response(StatusCode::OK, json!({ "request": request })),
                None => not_found(),
            },
            (&Method::PUT, ["requests", id]) => {
                let input: UpdateRequestInput = match parse_body(&body) {
                    Ok(input) => input,
                    Err(response) => return response,
                };
                match self.store.update_request(id, input).await {
                    Ok(()) => json_response(StatusCode::OK, json!({ "success": true })),
                    Err(e) => internal_error(&e),
                }
            }
            (&Method::DELETE, ["requests", id]) => match self.store.delete_request(id).await {
                Ok(()) => no_content(),
                Err(e) => internal_error(&e),
            },

            (&Method::POST, ["execute"]) => self.execute(&body).await,

            (&Method::GET, ["history"]) => {
                let history = self.store.get_history(&self.options.user_id).await;
                json_response(StatusCode::OK, json!({ "history": history }))
            }
            (&Method::DELETE, ["history"]) => {
                match self.store.clear_history(&self.options.user_id).await {
                    Ok(()) => no_content(),
                    Err(e) => internal_error(&e),
                }
            }
            (&Method::DELETE, ["history", id]) => {
                match self.store.delete_history_item(id).await {
                    Ok(()) => no_content(),
                    Err(e) => internal_error(&e),
                }
            }

            (&Method::GET, ["environments"]) => {
                let environments = self.store.get_environments().await;
                json_response(StatusCode::OK, json!({ "environments": environments }))
            }
            (&Method::POST, ["environments"]) => {
                let input: CreateEnvironmentInput = match parse_body(&body) {
                    Ok(input) => input,
                    Err(response) => return response,
                };
                match self.store.create_environment(input).await {
                    Ok(environment) => {
                        json_response(StatusCode::CREATED, json!({ "environment": environment }))
                    }
                    Err(e) => internal_error(&e),
                }
            }
            (&Method::PUT, ["environments", id]) => {
                let input: UpdateEnvironmentInput = match parse_body(&body) {
                    Ok(input) => input,
                    Err(response) => return response,
                };
                match self.store.update_environment(id, input).await {
                    Ok(()) => json_response(StatusCode::OK, json!({ "success": true })),
                    Err(e) => internal_error(&e),
                }
            }
            (&Method::DELETE, ["environments", id]) => {
                match self.store.delete_environment(id).await {
                    Ok(()) => no_content(),
                    Err(e) => internal_error(&e),
                }
            }

            (&Method::GET, ["export-openapi", id]) => self.export_openapi(id).await,
            (&Method::GET, ["export-postman", id]) => self.export_postman(id).await,

            (&Method::POST, ["auth", "logout"]) => {
                json_response(StatusCode::OK, json!({ "success": true }))
            }

            _ => not_found(),
        }
    }

    async fn execute(&self, body: &Bytes) -> Response<ProbeBody> {
        let input: ExecuteInput = match parse_body(body) {
            Ok(input) => input,
            Err(response) => return response,
        };

        let mut vars = load_variables(&self.store, input.environment_id.as_deref()).await;
        for (key, value) in &input.variables {
            vars.insert(key.clone(), render_value(value));
        }

        // Collection shared headers sit under the explicit ones.
        let mut headers: HashMap<String, String> = HashMap::new();
        if let Some(request_id) = &input.request_id {
            if let Some(shared) = self.collection_headers(request_id).await {
                for (name, value) in parse_variable_map(&shared) {
                    headers.insert(name, resolve_variables(&value, &vars));
                }
            }
        }
        for (name, value) in &input.headers {
            headers.insert(name.clone(), resolve_variables(&render_value(value), &vars));
        }

        let url = resolve_variables(&input.url, &vars);
        let request_body = input.body.as_deref().map(|b| resolve_variables(b, &vars));

        let request = ExecuteRequest {
            method: input.method.clone(),
            url: url.clone(),
            headers: headers.clone(),
            body: request_body.clone(),
            timeout_ms: None,
        };
        match self.executor.execute(request).await {
            Ok(response) => {
                let entry = HistoryInput {
                    method: input.method,
                    url,
                    status: response.status,
                    duration: response.time,
                    request_headers: serde_json::to_string(&headers)
                        .unwrap_or_else(|_| "{}".to_string()),
                    request_body: request_body.unwrap_or_default(),
                    response_headers: serde_json::to_string(&response.headers)
                        .unwrap_or_else(|_| "{}".to_string()),
                    response_body: response.body.clone(),
                };
                if let Err(e) = self.store.add_to_history(&self.options.user_id, entry).await {
                    tracing::warn!(error = %e, "failed to record execution history");
                }
                let payload = serde_json::to_value(&response).unwrap_or_else(|_| json!({}));
                json_response(StatusCode::OK, payload)
            }
            Err(e) => internal_error(&e),
        }
    }

    async fn collection_headers(&self, request_id: &str) -> Option<String> {
        let request = self.store.get_request(request_id).await?;
        self.store
            .get_collections(&self.options.user_id)
            .await
            .into_iter()
            .find(|view| view.collection.id == request.collection_id)
            .and_then(|view| view.collection.headers)
    }

    async fn export_openapi(&self, collection_id: &str) -> Response<ProbeBody> {
        let Some(view) = self.find_collection(collection_id).await else {
            return not_found();
        };
        let mut paths = serde_json::Map::new();
        for request in &view.requests {
            let path = openapi_path(&request.url);
            let entry = paths
                .entry(path)
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Value::Object(methods) = entry {
                methods.insert(
                    request.method.to_lowercase(),
                    json!({
                        "summary": request.name,
                        "responses": { "200": { "description": "Success" } }
                    }),
                );
            }
        }
        json_response(
            StatusCode::OK,
            json!({
                "openapi": "3.0.0",
                "info": { "title": "Exported Collection", "version": "1.0.0" },
                "paths": paths,
            }),
        )
    }

    async fn export_postman(&self, collection_id: &str) -> Response<ProbeBody> {
        let Some(view) = self.find_collection(collection_id).await else {
            return not_found();
        };
        let items: Vec<Value> = view
            .requests
            .iter()
            .map(|request| {
                let headers: Vec<Value> = request
                    .headers
                    .as_deref()
                    .map(parse_variable_map)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(key, value)| json!({ "key": key, "value": value, "type": "text" }))
                    .collect();
                let mut item = json!({
                    "name": request.name,
                    "request": {
                        "method": request.method,
                        "header": headers,
                        "url": postman_url(&request.url),
                    }
                });
                if let Some(body) = request.body.as_deref().filter(|b| !b.is_empty()) {
                    item["request"]["body"] = json!({
                        "mode": "raw",
                        "raw": body,
                        "options": { "raw": { "language": "json" } }
                    });
                }
                item
            })
            .collect();

        let document = json!({
            "info": { "name": view.collection.name, "schema": POSTMAN_SCHEMA },
            "item": items,
        });
        let filename = format!(
            "{}.postman_collection.json",
            sanitize_filename(&view.collection.name)
        );
        let body = serde_json::to_string(&document).unwrap_or_else(|_| "{}".to_string());
        Response::builder()
            .status(StatusCode::OK)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .header(
                hyper::header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            )
            .body(Full::new(Bytes::from(body)).boxed())
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()).boxed()))
    }

    async fn find_collection(&self, id: &str) -> Option<crate::model::CollectionView> {
        self.store
            .get_collections(&self.options.user_id)
            .await
            .into_iter()
            .find(|view| view.collection.id == id)
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn openapi_path(url: &str) -> String {
    let path = url.strip_prefix(BASE_URL_PLACEHOLDER).unwrap_or(url);
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn postman_url(url: &str) -> Value {
    let without_scheme = match url.split_once("://") {
        Some((_, rest)) => rest,
        None => url,
    };
    let mut segments = without_scheme.split('/');
    let host = segments.next().unwrap_or("");
    let path: Vec<&str> = segments.collect();
    json!({ "raw": url, "host": [host], "path": path })
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, Response<ProbeBody>> {
    serde_json::from_slice(body).map_err(|e| {
        json_response(
            StatusCode::BAD_REQUEST,
            json!({ "error": format!("invalid body: {e}") }),
        )
    })
}

fn json_response(status: StatusCode, value: Value) -> Response<ProbeBody> {
    let body = serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)).boxed())
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()).boxed()))
}

fn internal_error(error: &anyhow::Error) -> Response<ProbeBody> {
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": error.to_string() }),
    )
}

fn not_found() -> Response<ProbeBody> {
    json_response(StatusCode::NOT_FOUND, json!({ "error": "not found" }))
}

fn no_content() -> Response<ProbeBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Full::new(Bytes::new()).boxed())
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()).boxed()))
}
