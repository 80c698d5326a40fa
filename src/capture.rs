// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Seeding of the auto-capture collection from scanned routes.

use std::sync::Arc;

use crate::api::INTERNAL_NAMESPACE;
use crate::config::Options;
use crate::model::{CreateCollectionInput, CreateEnvironmentInput, CreateRequestInput};
use crate::scanner::{RouteScanner, RouteTable, ScannedRoute};
use crate::store::JsonStore;
use crate::vars::BASE_URL_PLACEHOLDER;

pub const DEFAULT_ENVIRONMENT_NAME: &str = "Local Environment";

/// Documents scanned routes into the store. Running it again against an
/// unchanged route set writes nothing.
pub struct CaptureService {
    store: Arc<JsonStore>,
    options: Options,
}

impl CaptureService {
    pub fn new(store: Arc<JsonStore>, options: Options) -> Self {
        Self { store, options }
    }

    /// Scan the table and document every route not belonging to the probe
    /// itself. Returns the routes that were considered, for later
    /// concrete-path-to-template lookup.
    pub async fn capture(
        &self,
        scanner: &RouteScanner,
        table: &RouteTable,
        user_id: &str,
        collection_name: &str,
    ) -> anyhow::Result<Vec<ScannedRoute>> {
        let routes: Vec<ScannedRoute> = scanner
            .scan(table)
            .into_iter()
            .filter(|route| {
                !route.path.contains(&self.options.mount_path)
                    && !route.path.contains(INTERNAL_NAMESPACE)
            })
            .collect();

        let collection_id = self
            .find_or_create_collection(user_id, collection_name)
            .await?;

        let mut documented: Vec<(String, String)> = self
            .store
            .get_requests(&collection_id)
            .await
            .into_iter()
            .map(|request| (request.method, request.url))
            .collect();

        let seed_headers = serde_json::to_string_pretty(&serde_json::json!({
            "Content-Type": "application/json"
        }))?;
        let mut created = 0usize;
        for route in &routes {
            // Registered paths may lack the leading slash; canonical urls
            // are always rooted.
            let canonical = if route.path.starts_with('/') {
                format!("{BASE_URL_PLACEHOLDER}{}", route.path)
            } else {
                format!("{BASE_URL_PLACEHOLDER}/{}", route.path)
            };
            // Both forms are accepted so hand-edited overlay urls still count.
            let already = documented.iter().any(|(method, url)| {
                method == &route.method && (url == &canonical || url == &route.path)
            });
            if already {
                continue;
            }
            let body = match route.method.as_str() {
                "POST" | "PUT" | "PATCH" => Some(match &route.schema {
                    Some(schema) => serde_json::to_string(schema)?,
                    None => "{}".to_string(),
                }),
                _ => None,
            };
            self.store
                .create_request(CreateRequestInput {
                    collection_id: collection_id.clone(),
                    name: route.name.clone(),
                    method: route.method.clone(),
                    url: canonical.clone(),
                    headers: Some(seed_headers.clone()),
                    body,
                })
                .await?;
            documented.push((route.method.clone(), canonical));
            created += 1;
        }
        if created > 0 {
            tracing::info!(count = created, collection = collection_name, "documented routes");
        }

        self.ensure_default_environment().await?;
        Ok(routes)
    }

    async fn find_or_create_collection(
        &self,
        user_id: &str,
        name: &str,
    ) -> anyhow::Result<String> {
        let existing = self
            .store
            .get_collections(user_id)
            .await
            .into_iter()
            .find(|view| view.collection.name == name);
        if let Some(view) = existing {
            return Ok(view.collection.id);
        }
        let created = self
            .store
            .create_collection(
                user_id,
                CreateCollectionInput {
                    name: name.to_string(),
                    headers: None,
                },
            )
            .await?;
        Ok(created.id)
    }

    /// Seed the default environment once. An existing one is never touched,
    /// even when the configured port has changed since.
    async fn ensure_default_environment(&self) -> anyhow::Result<()> {
        let exists = self
            .store
            .get_environments()
            .await
            .iter()
            .any(|environment| environment.name == DEFAULT_ENVIRONMENT_NAME);
        if exists {
            return Ok(());
        }
        let variables = serde_json::json!({
            "BASE_URL": format!("http://localhost:{}", self.options.port),
            "ENV": self.options.mode,
        });
        self.store
            .create_environment(CreateEnvironmentInput {
                name: DEFAULT_ENVIRONMENT_NAME.to_string(),
                variables: serde_json::to_string(&variables)?,
            })
            .await?;
        Ok(())
    }
}
