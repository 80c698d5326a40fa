// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Embeddable facade tying the scanner, store, capture pass, interceptor and
//! tool API together behind a single mount point.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::api::{ProbeBody, ToolApi};
use crate::capture::CaptureService;
use crate::config::{self, Options};
use crate::interceptor::TrafficInterceptor;
use crate::scanner::{matches_template, RouteScanner, RouteTable, ScannedRoute};
use crate::schema::SchemaMap;
use crate::store::JsonStore;

/// One instance per host application. Construct it, register any custom
/// schema extractors, run [`ApiProbe::startup`] once against the host's
/// route table, then call [`ApiProbe::handle`] for every request.
pub struct ApiProbe {
    store: Arc<JsonStore>,
    options: Options,
    scanner: RouteScanner,
    capture: CaptureService,
    interceptor: TrafficInterceptor,
    api: ToolApi,
    routes: RwLock<Vec<ScannedRoute>>,
}

impl ApiProbe {
    pub fn new(options: Options) -> Self {
        let custom_path = options.customization_path.as_ref().map(PathBuf::from);
        let store = Arc::new(JsonStore::new(
            options.storage_path.as_str(),
            custom_path,
            config::project_name(),
        ));
        Self {
            capture: CaptureService::new(Arc::clone(&store), options.clone()),
            interceptor: TrafficInterceptor::new(Arc::clone(&store), options.clone()),
            api: ToolApi::new(Arc::clone(&store), options.clone()),
            scanner: RouteScanner::new(),
            routes: RwLock::new(Vec::new()),
            store,
            options,
        }
    }

    /// Register a schema extractor tried before the built-in shape parsers.
    pub fn use_extractor<F>(&mut self, extractor: F)
    where
        F: Fn(&Value) -> Option<SchemaMap> + Send + Sync + 'static,
    {
        self.scanner.use_extractor(extractor);
    }

    pub fn store(&self) -> Arc<JsonStore> {
        Arc::clone(&self.store)
    }

    /// Load the store, drop stale generated documentation and re-document the
    /// current route table. Capture failures are logged, never fatal to the
    /// host application.
    pub async fn startup(&self, table: &RouteTable) {
        self.store.init().await;
        if let Err(e) = self.store.clear_cache().await {
            tracing::warn!(error = %e, "failed to reset generated documentation");
        }
        let collection_name = self.store.auto_collection_name();
        match self
            .capture
            .capture(&self.scanner, table, &self.options.user_id, &collection_name)
            .await
        {
            Ok(routes) => *self.routes.write().await = routes,
            Err(e) => tracing::warn!(error = %e, "route capture failed"),
        }
        tracing::info!(
            "API Probe ready at http://localhost:{}{}",
            self.options.port,
            self.options.mount_path
        );
    }

    /// Handle one request. Paths under the mount go to the tool API, the rest
    /// is forwarded to `next` with the interceptor around it.
    pub async fn handle<B, F, Fut>(&self, req: Request<B>, next: F) -> Response<ProbeBody>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
        F: FnOnce(Request<Full<Bytes>>) -> Fut,
        Fut: Future<Output = Response<ProbeBody>>,
    {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to buffer request body");
                Bytes::new()
            }
        };

        let path = parts.uri.path().to_string();
        if let Some(subpath) = self.mount_subpath(&path) {
            return self.api.dispatch(&parts.method, subpath, body).await;
        }

        let registered_pattern = self.registered_pattern(&path).await;
        self.interceptor
            .intercept(parts, body, registered_pattern, next)
            .await
    }

    /// Path below the mount point, only when the prefix ends on a whole
    /// segment. Sibling routes such as `/api-probette` belong to the host.
    fn mount_subpath<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(&self.options.mount_path)?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }

    /// Template the concrete path was served by, if the scan knows one.
    async fn registered_pattern(&self, path: &str) -> Option<String> {
        let routes = self.routes.read().await;
        routes
            .iter()
            .find(|route| matches_template(&route.path, path))
            .map(|route| route.path.clone())
    }
}
