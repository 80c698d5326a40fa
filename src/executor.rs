// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Outbound request execution for documented endpoints.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client as LegacyClient;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub cookies: Vec<String>,
    pub body: String,
    /// Elapsed wall time in milliseconds.
    pub time: u64,
    /// Response body length in bytes.
    pub size: u64,
}

/// Stateless fetch-and-normalize client. One instance is shared by all
/// executions; connections are pooled underneath.
pub struct Executor {
    client: LegacyClient<
        hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
        Full<Bytes>,
    >,
}

impl Executor {
    pub fn new() -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let client: LegacyClient<_, Full<Bytes>> =
            LegacyClient::builder(TokioExecutor::new()).build(https);
        Self { client }
    }

    pub async fn execute(&self, request: ExecuteRequest) -> anyhow::Result<ExecuteResponse> {
        let started = Instant::now();
        let method = Method::from_bytes(request.method.as_bytes())?;
        let uri: Uri = request.url.parse()?;

        let mut builder = Request::builder().method(method.clone()).uri(uri);
        let mut has_content_type = false;
        for (name, value) in &request.headers {
            if name.eq_ignore_ascii_case("content-type") {
                has_content_type = true;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        let body_allowed = matches!(
            method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        );
        let body_bytes = match &request.body {
            Some(body) if body_allowed => {
                if !has_content_type && serde_json::from_str::<serde_json::Value>(body).is_ok() {
                    builder = builder.header(hyper::header::CONTENT_TYPE, "application/json");
                }
                Bytes::from(body.clone())
            }
            _ => Bytes::new(),
        };
        let upstream = builder.body(Full::new(body_bytes))?;

        let timeout = Duration::from_millis(request.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
        let (status, header_map, bytes) = tokio::time::timeout(timeout, async {
            let response = self.client.request(upstream).await?;
            let status = response.status();
            let header_map = response.headers().clone();
            let bytes = response.into_body().collect().await?.to_bytes();
            Ok::<_, anyhow::Error>((status, header_map, bytes))
        })
        .await
        .map_err(|_| anyhow::anyhow!("request timed out after {}ms", timeout.as_millis()))??;

        let mut headers = HashMap::new();
        let mut cookies = Vec::new();
        for (name, value) in header_map.iter() {
            let Ok(text) = value.to_str() else { continue };
            if name == &hyper::header::SET_COOKIE {
                cookies.push(text.to_string());
            } else {
                headers.insert(name.as_str().to_string(), text.to_string());
            }
        }

        let size = bytes.len() as u64;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(parsed) => serde_json::to_string_pretty(&parsed).unwrap_or(text),
            Err(_) => text,
        };

        Ok(ExecuteResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            cookies,
            body,
            time: started.elapsed().as_millis() as u64,
            size,
        })
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}
