// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Two-layer JSON persistence: a system-owned cache document and an optional
//! user-owned overlay document.
//!
//! The cache layer holds everything the probe generates (the auto-captured
//! collection, its requests, history); the custom layer holds user edits.
//! Reads see an id-keyed merge with custom fields winning; writes route to a
//! layer by ownership, decided at write time from the target collection's
//! name. Every mutation rewrites the affected layer's whole document, so an
//! interrupted process loses at most the last unwritten change. Writes are
//! plain file overwrites, not atomic renames; a crash mid-write can corrupt a
//! layer, which is accepted for a developer-tool cache.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};

use crate::model::{
    generate_id, now_timestamp, Collection, CollectionView, CreateCollectionInput,
    CreateEnvironmentInput, CreateRequestInput, Environment, HistoryEntry, HistoryInput,
    StoredRequest, UpdateCollectionInput, UpdateEnvironmentInput, UpdateRequestInput,
};

pub(crate) type JsonObject = serde_json::Map<String, Value>;

/// One layer's on-disk document. Unknown top-level keys are ignored on load;
/// records are kept as raw JSON objects so fields this version does not know
/// about survive merges and rewrites.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct LayerData {
    #[serde(default)]
    collections: Vec<JsonObject>,
    #[serde(default)]
    requests: Vec<JsonObject>,
    #[serde(default)]
    environments: Vec<JsonObject>,
    #[serde(default)]
    history: Vec<JsonObject>,
}

#[derive(Clone, Copy, Debug)]
enum EntityKind {
    Collections,
    Requests,
    Environments,
}

impl EntityKind {
    fn items(self, layer: &LayerData) -> &Vec<JsonObject> {
        match self {
            EntityKind::Collections => &layer.collections,
            EntityKind::Requests => &layer.requests,
            EntityKind::Environments => &layer.environments,
        }
    }

    fn items_mut(self, layer: &mut LayerData) -> &mut Vec<JsonObject> {
        match self {
            EntityKind::Collections => &mut layer.collections,
            EntityKind::Requests => &mut layer.requests,
            EntityKind::Environments => &mut layer.environments,
        }
    }
}

/// Dual-layer store over two JSON documents.
///
/// A missing or malformed backing file is an empty layer, never an error.
/// Each layer's read-modify-write-persist sequence runs under that layer's
/// lock, so concurrent writers settle as last-write-wins without losing
/// records.
pub struct JsonStore {
    cache_path: PathBuf,
    custom_path: Option<PathBuf>,
    auto_collection_name: std::sync::RwLock<String>,
    initialized: OnceCell<()>,
    cache: Mutex<LayerData>,
    custom: Mutex<LayerData>,
}

impl JsonStore {
    pub fn new<P: Into<PathBuf>>(
        cache_path: P,
        custom_path: Option<PathBuf>,
        auto_collection_name: impl Into<String>,
    ) -> Self {
        Self {
            cache_path: cache_path.into(),
            custom_path,
            auto_collection_name: std::sync::RwLock::new(auto_collection_name.into()),
            initialized: OnceCell::new(),
            cache: Mutex::new(LayerData::default()),
            custom: Mutex::new(LayerData::default()),
        }
    }

    /// Install the reserved name marking system ownership (usually the host
    /// project's name).
    pub fn set_auto_collection_name(&self, name: impl Into<String>) {
        let mut guard = self
            .auto_collection_name
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = name.into();
    }

    pub fn auto_collection_name(&self) -> String {
        self.auto_collection_name
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Load both layers from disk. Idempotent and memoized: concurrent callers
    /// before the first completion all await the same in-flight load.
    pub async fn init(&self) {
        self.initialized
            .get_or_init(|| async {
                if let Some(parent) = self.cache_path.parent() {
                    if !parent.as_os_str().is_empty() {
                        let _ = tokio::fs::create_dir_all(parent).await;
                    }
                }
                *self.cache.lock().await = load_layer(&self.cache_path).await;
                if let Some(custom_path) = &self.custom_path {
                    *self.custom.lock().await = load_layer(custom_path).await;
                }
            })
            .await;
    }

    /// Re-read the custom layer so out-of-process edits to the overlay file
    /// are observed. The in-memory data is kept when the file cannot be read.
    pub async fn reload_custom_data(&self) {
        let Some(custom_path) = &self.custom_path else {
            return;
        };
        let Ok(content) = tokio::fs::read_to_string(custom_path).await else {
            return;
        };
        match serde_json::from_str::<LayerData>(&content) {
            Ok(data) => *self.custom.lock().await = data,
            Err(e) => {
                tracing::warn!(path = %custom_path.display(), error = %e, "overlay file malformed, keeping in-memory data");
            }
        }
    }

    async fn ensure_fresh(&self) {
        self.init().await;
        self.reload_custom_data().await;
    }

    /// Merged view of one entity list: id-keyed map seeded from the cache
    /// layer, custom records shallow-merged over (custom fields win, cache-only
    /// fields survive).
    async fn merged(&self, pick: fn(&LayerData) -> &Vec<JsonObject>) -> Vec<JsonObject> {
        let cache_items = pick(&*self.cache.lock().await).clone();
        let custom_items = pick(&*self.custom.lock().await).clone();

        let mut order: Vec<String> = Vec::new();
        let mut by_id: std::collections::HashMap<String, JsonObject> =
            std::collections::HashMap::new();
        for item in cache_items {
            let Some(id) = object_id(&item) else { continue };
            if !by_id.contains_key(&id) {
                order.push(id.clone());
            }
            by_id.insert(id, item);
        }
        for item in custom_items {
            let Some(id) = object_id(&item) else { continue };
            match by_id.get_mut(&id) {
                Some(existing) => {
                    merge_into(existing, item);
                }
                None => {
                    order.push(id.clone());
                    by_id.insert(id, item);
                }
            }
        }
        order
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .collect()
    }

    pub async fn get_collections(&self, user_id: &str) -> Vec<CollectionView> {
        self.ensure_fresh().await;
        let collections: Vec<Collection> = parse_items(self.merged(|l| &l.collections).await);
        let requests: Vec<StoredRequest> = parse_items(self.merged(|l| &l.requests).await);

        collections
            .into_iter()
            .filter(|c| c.user_id == user_id && !c.is_deleted)
            .map(|c| {
                let own = requests
                    .iter()
                    .filter(|r| r.collection_id == c.id && !r.is_deleted)
                    .cloned()
                    .collect();
                CollectionView {
                    collection: c,
                    requests: own,
                }
            })
            .collect()
    }

    pub async fn get_requests(&self, collection_id: &str) -> Vec<StoredRequest> {
        self.ensure_fresh().await;
        let requests: Vec<StoredRequest> = parse_items(self.merged(|l| &l.requests).await);
        requests
            .into_iter()
            .filter(|r| r.collection_id == collection_id && !r.is_deleted)
            .collect()
    }

    pub async fn get_request(&self, id: &str) -> Option<StoredRequest> {
        self.ensure_fresh().await;
        let requests: Vec<StoredRequest> = parse_items(self.merged(|l| &l.requests).await);
        requests.into_iter().find(|r| r.id == id && !r.is_deleted)
    }

    pub async fn get_environments(&self) -> Vec<Environment> {
        self.ensure_fresh().await;
        let environments: Vec<Environment> = parse_items(self.merged(|l| &l.environments).await);
        environments.into_iter().filter(|e| !e.is_deleted).collect()
    }

    /// The user's history, newest first, capped at the 50 most recent.
    pub async fn get_history(&self, user_id: &str) -> Vec<HistoryEntry> {
        self.ensure_fresh().await;
        let mut history: Vec<HistoryEntry> = parse_items(self.merged(|l| &l.history).await)
            .into_iter()
            .filter(|h: &HistoryEntry| h.user_id == user_id)
            .collect();
        history.sort_by_key(|h| std::cmp::Reverse(timestamp_sort_key(&h.created_at)));
        history.truncate(50);
        history
    }

    pub async fn create_collection(
        &self,
        user_id: &str,
        input: CreateCollectionInput,
    ) -> anyhow::Result<Collection> {
        self.init().await;
        let now = now_timestamp();
        let collection = Collection {
            id: generate_id(),
            user_id: user_id.to_string(),
            name: input.name,
            headers: input.headers,
            is_deleted: false,
            created_at: now.clone(),
            updated_at: now,
        };
        let obj = to_object(&collection)?;

        if collection.name == self.auto_collection_name() {
            let mut cache = self.cache.lock().await;
            cache.collections.push(obj);
            self.persist_cache(&cache).await?;
        } else {
            let mut custom = self.custom.lock().await;
            custom.collections.push(obj);
            self.persist_custom(&custom).await?;
        }
        Ok(collection)
    }

    pub async fn update_collection(
        &self,
        id: &str,
        input: UpdateCollectionInput,
    ) -> anyhow::Result<()> {
        self.update_entity(EntityKind::Collections, id, to_object(&input)?, true)
            .await
    }

    pub async fn delete_collection(&self, id: &str) -> anyhow::Result<()> {
        self.update_entity(EntityKind::Collections, id, deleted_patch(), false)
            .await
    }

    /// Create a request, routed by the owning collection's name: requests in
    /// the auto-capture collection belong to the cache layer, everything else
    /// to the overlay.
    pub async fn create_request(&self, input: CreateRequestInput) -> anyhow::Result<StoredRequest> {
        self.init().await;
        let now = now_timestamp();
        let request = StoredRequest {
            id: generate_id(),
            collection_id: input.collection_id,
            name: input.name,
            method: input.method,
            url: input.url,
            headers: input.headers,
            body: input.body,
            is_deleted: false,
            created_at: now.clone(),
            updated_at: now,
        };
        let obj = to_object(&request)?;
        let auto_name = self.auto_collection_name();

        let mut cache = self.cache.lock().await;
        let mut custom = self.custom.lock().await;
        let owner_name = find_merged(&cache.collections, &custom.collections, &request.collection_id)
            .and_then(|col| col.get("name").and_then(Value::as_str).map(str::to_string));

        if owner_name.as_deref() == Some(auto_name.as_str()) {
            cache.requests.push(obj);
            self.persist_cache(&cache).await?;
        } else {
            custom.requests.push(obj);
            self.persist_custom(&custom).await?;
        }
        Ok(request)
    }

    pub async fn update_request(&self, id: &str, input: UpdateRequestInput) -> anyhow::Result<()> {
        self.update_entity(EntityKind::Requests, id, to_object(&input)?, true)
            .await
    }

    pub async fn delete_request(&self, id: &str) -> anyhow::Result<()> {
        self.update_entity(EntityKind::Requests, id, deleted_patch(), false)
            .await
    }

    /// Conditional documentation fill: set body/headers only where the record
    /// is still empty. The emptiness check runs under the layer locks, so a
    /// user edit racing with live traffic is never overwritten.
    pub async fn backfill_request(
        &self,
        id: &str,
        body: Option<String>,
        headers: Option<String>,
    ) -> anyhow::Result<()> {
        self.init().await;

        let cache = self.cache.lock().await;
        let mut custom = self.custom.lock().await;

        let custom_index = custom
            .requests
            .iter()
            .position(|o| object_id(o).as_deref() == Some(id));
        let cache_item = cache
            .requests
            .iter()
            .find(|o| object_id(o).as_deref() == Some(id));
        let Some(current) = custom_index.map(|i| &custom.requests[i]).or(cache_item) else {
            return Ok(());
        };

        let mut patch = JsonObject::new();
        if let Some(body) = body {
            if stored_body_is_empty(current.get("body")) {
                patch.insert("body".to_string(), Value::String(body));
            }
        }
        if let Some(headers) = headers {
            if stored_headers_are_empty(current.get("headers")) {
                patch.insert("headers".to_string(), Value::String(headers));
            }
        }
        if patch.is_empty() {
            return Ok(());
        }
        patch.insert("updatedAt".to_string(), Value::String(now_timestamp()));

        match custom_index {
            Some(index) => merge_into(&mut custom.requests[index], patch),
            None => {
                if let Some(item) = cache_item {
                    let mut copy = item.clone();
                    merge_into(&mut copy, patch);
                    custom.requests.push(copy);
                }
            }
        }
        drop(cache);
        self.persist_custom(&custom).await
    }

    pub async fn create_environment(
        &self,
        input: CreateEnvironmentInput,
    ) -> anyhow::Result<Environment> {
        self.init().await;
        let now = now_timestamp();
        let environment = Environment {
            id: generate_id(),
            name: input.name,
            variables: input.variables,
            is_deleted: false,
            created_at: now.clone(),
            updated_at: now,
        };
        let obj = to_object(&environment)?;
        let mut custom = self.custom.lock().await;
        custom.environments.push(obj);
        self.persist_custom(&custom).await?;
        Ok(environment)
    }

    pub async fn update_environment(
        &self,
        id: &str,
        input: UpdateEnvironmentInput,
    ) -> anyhow::Result<()> {
        self.update_entity(EntityKind::Environments, id, to_object(&input)?, true)
            .await
    }

    pub async fn delete_environment(&self, id: &str) -> anyhow::Result<()> {
        self.update_entity(EntityKind::Environments, id, deleted_patch(), false)
            .await
    }

    pub async fn add_to_history(
        &self,
        user_id: &str,
        input: HistoryInput,
    ) -> anyhow::Result<HistoryEntry> {
        self.init().await;
        let entry = HistoryEntry {
            id: generate_id(),
            user_id: user_id.to_string(),
            method: input.method,
            url: input.url,
            status: input.status,
            duration: input.duration,
            request_headers: input.request_headers,
            request_body: input.request_body,
            response_headers: input.response_headers,
            response_body: input.response_body,
            created_at: now_timestamp(),
        };
        let obj = to_object(&entry)?;
        let mut cache = self.cache.lock().await;
        cache.history.push(obj);
        self.persist_cache(&cache).await?;
        Ok(entry)
    }

    pub async fn clear_history(&self, user_id: &str) -> anyhow::Result<()> {
        self.init().await;
        {
            let mut cache = self.cache.lock().await;
            cache
                .history
                .retain(|h| h.get("userId").and_then(Value::as_str) != Some(user_id));
            self.persist_cache(&cache).await?;
        }
        if self.custom_path.is_some() {
            let mut custom = self.custom.lock().await;
            custom
                .history
                .retain(|h| h.get("userId").and_then(Value::as_str) != Some(user_id));
            self.persist_custom(&custom).await?;
        }
        Ok(())
    }

    pub async fn delete_history_item(&self, id: &str) -> anyhow::Result<()> {
        self.init().await;
        {
            let mut cache = self.cache.lock().await;
            cache
                .history
                .retain(|h| h.get("id").and_then(Value::as_str) != Some(id));
            self.persist_cache(&cache).await?;
        }
        if self.custom_path.is_some() {
            let mut custom = self.custom.lock().await;
            custom
                .history
                .retain(|h| h.get("id").and_then(Value::as_str) != Some(id));
            self.persist_custom(&custom).await?;
        }
        Ok(())
    }

    /// Reset the system-owned layer to empty and persist it. The overlay is
    /// untouched, which is what keeps user edits safe across re-captures.
    pub async fn clear_cache(&self) -> anyhow::Result<()> {
        self.init().await;
        let mut cache = self.cache.lock().await;
        *cache = LayerData::default();
        self.persist_cache(&cache).await?;
        Ok(())
    }

    /// Copy-on-write update: a record already in the overlay is patched in
    /// place; a record only in the cache gets a patched copy pushed into the
    /// overlay, leaving the cache record intact.
    async fn update_entity(
        &self,
        kind: EntityKind,
        id: &str,
        mut patch: JsonObject,
        touch_updated_at: bool,
    ) -> anyhow::Result<()> {
        self.init().await;
        if touch_updated_at {
            patch.insert("updatedAt".to_string(), Value::String(now_timestamp()));
        }

        let cache = self.cache.lock().await;
        let mut custom = self.custom.lock().await;

        let items = kind.items_mut(&mut custom);
        if let Some(existing) = items
            .iter_mut()
            .find(|o| object_id(o).as_deref() == Some(id))
        {
            merge_into(existing, patch);
        } else if let Some(cache_item) = kind
            .items(&cache)
            .iter()
            .find(|o| object_id(o).as_deref() == Some(id))
        {
            let mut copy = cache_item.clone();
            merge_into(&mut copy, patch);
            items.push(copy);
        }
        drop(cache);
        self.persist_custom(&custom).await
    }

    async fn persist_cache(&self, data: &LayerData) -> anyhow::Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let serialized = serde_json::to_string_pretty(data)?;
        tokio::fs::write(&self.cache_path, serialized).await?;
        Ok(())
    }

    async fn persist_custom(&self, data: &LayerData) -> anyhow::Result<()> {
        // Without a configured overlay file the custom layer is memory-only.
        let Some(custom_path) = &self.custom_path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(data)?;
        tokio::fs::write(custom_path, serialized).await?;
        Ok(())
    }
}

async fn load_layer(path: &Path) -> LayerData {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => match serde_json::from_str::<LayerData>(&content) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed store file, starting empty");
                LayerData::default()
            }
        },
        Err(_) => LayerData::default(),
    }
}

fn object_id(obj: &JsonObject) -> Option<String> {
    obj.get("id").and_then(Value::as_str).map(str::to_string)
}

fn merge_into(target: &mut JsonObject, patch: JsonObject) {
    for (k, v) in patch {
        target.insert(k, v);
    }
}

fn find_merged<'a>(
    cache: &'a [JsonObject],
    custom: &'a [JsonObject],
    id: &str,
) -> Option<JsonObject> {
    let base = cache.iter().find(|o| object_id(o).as_deref() == Some(id));
    let over = custom.iter().find(|o| object_id(o).as_deref() == Some(id));
    match (base, over) {
        (Some(b), Some(o)) => {
            let mut merged = b.clone();
            merge_into(&mut merged, o.clone());
            Some(merged)
        }
        (Some(b), None) => Some(b.clone()),
        (None, Some(o)) => Some(o.clone()),
        (None, None) => None,
    }
}

fn to_object<T: Serialize>(value: &T) -> anyhow::Result<JsonObject> {
    match serde_json::to_value(value)? {
        Value::Object(obj) => Ok(obj),
        other => anyhow::bail!("expected a JSON object, got {other}"),
    }
}

fn deleted_patch() -> JsonObject {
    let mut patch = JsonObject::new();
    patch.insert("is_deleted".to_string(), Value::Bool(true));
    patch
}

/// A serialized body counts as empty when absent, null, or one of the
/// placeholder forms written at capture time.
fn stored_body_is_empty(value: Option<&Value>) -> bool {
    match value.and_then(Value::as_str) {
        Some(text) => matches!(text, "" | "{}" | "null"),
        None => true,
    }
}

fn stored_headers_are_empty(value: Option<&Value>) -> bool {
    match value.and_then(Value::as_str) {
        Some(text) => matches!(text, "" | "{}"),
        None => true,
    }
}

fn parse_items<T: serde::de::DeserializeOwned>(items: Vec<JsonObject>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|obj| match serde_json::from_value(Value::Object(obj)) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable store record");
                None
            }
        })
        .collect()
}

fn timestamp_sort_key(raw: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_nanos_opt().unwrap_or(i64::MIN))
        .unwrap_or(i64::MIN)
}
