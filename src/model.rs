// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Persisted entity types and their create/update inputs.
//!
//! Field names follow the on-disk document spelling (`userId`, `collectionId`,
//! `is_deleted`), so serialized entities stay byte-compatible with stores
//! written by earlier versions and with hand-edited overlay files.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named group of saved requests, optionally carrying shared headers
/// (a serialized JSON object applied to every request executed from it).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Collection {
    pub id: String,
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,
}

/// Read-side view of a collection with its live requests embedded.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CollectionView {
    #[serde(flatten)]
    pub collection: Collection,
    pub requests: Vec<StoredRequest>,
}

/// A saved, documented endpoint. The `url` may carry `{{VARIABLE}}`
/// placeholders; `headers` and `body` are serialized JSON strings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoredRequest {
    pub id: String,
    #[serde(rename = "collectionId", default)]
    pub collection_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,
}

/// A named set of `{{VARIABLE}}` values; `variables` is a serialized JSON
/// object of key/value strings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Environment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub variables: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,
}

/// One recorded request/response exchange.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HistoryEntry {
    pub id: String,
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: u16,
    /// Elapsed milliseconds.
    #[serde(default)]
    pub duration: u64,
    #[serde(rename = "requestHeaders", default)]
    pub request_headers: String,
    #[serde(rename = "requestBody", default)]
    pub request_body: String,
    #[serde(rename = "responseHeaders", default)]
    pub response_headers: String,
    #[serde(rename = "responseBody", default)]
    pub response_body: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateCollectionInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<String>,
}

/// Partial update; absent fields leave the stored record untouched.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateCollectionInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateRequestInput {
    #[serde(rename = "collectionId")]
    pub collection_id: String,
    pub name: String,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateRequestInput {
    #[serde(rename = "collectionId", skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateEnvironmentInput {
    pub name: String,
    #[serde(default)]
    pub variables: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateEnvironmentInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HistoryInput {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub duration: u64,
    #[serde(rename = "requestHeaders", default)]
    pub request_headers: String,
    #[serde(rename = "requestBody", default)]
    pub request_body: String,
    #[serde(rename = "responseHeaders", default)]
    pub response_headers: String,
    #[serde(rename = "responseBody", default)]
    pub response_body: String,
}

/// Fresh opaque entity id.
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Current timestamp in the store's wire format (RFC 3339).
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
