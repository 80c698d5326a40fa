// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Parser for description-style validator metadata.

use serde_json::Value;

use crate::schema::{SchemaMap, ShapeParser};

pub struct DescribedShape;

impl ShapeParser for DescribedShape {
    fn id(&self) -> &'static str {
        "described_shape"
    }

    fn recognizes(&self, candidate: &Value) -> bool {
        candidate.is_object()
            && (candidate.get("isJoi").is_some()
                || candidate.get("type").and_then(Value::as_str) == Some("object"))
    }

    fn extract(&self, candidate: &Value) -> Option<SchemaMap> {
        // Field types are opaque here; only the declared keys are known.
        let declared = candidate
            .get("keys")
            .and_then(Value::as_object)
            .or_else(|| {
                candidate
                    .get("_ids")
                    .and_then(|ids| ids.get("_byKey"))
                    .and_then(Value::as_object)
            })?;
        Some(
            declared
                .keys()
                .map(|key| (key.clone(), Value::from("any")))
                .collect(),
        )
    }
}
