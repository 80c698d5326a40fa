// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Best-effort schema inference over route handler metadata.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

/// Inferred body shape: field name to example value.
pub type SchemaMap = serde_json::Map<String, Value>;

/// Application-supplied extractor, consulted before the built-in parsers.
pub type Extractor = Arc<dyn Fn(&Value) -> Option<SchemaMap> + Send + Sync>;

pub trait ShapeParser: Send + Sync {
    fn id(&self) -> &'static str;

    /// Cheap structural test. Only recognized candidates are parsed.
    fn recognizes(&self, candidate: &Value) -> bool;

    /// Extract a field map. Returning `None` passes the candidate on to
    /// the next parser.
    fn extract(&self, candidate: &Value) -> Option<SchemaMap>;
}

pub mod builder;
pub mod described;
pub mod fields;
pub mod json_schema;

pub const PARSERS: &[&dyn ShapeParser] = &[
    &builder::BuilderShape,
    &described::DescribedShape,
    &fields::FieldsMap,
    &json_schema::JsonSchemaShape,
];

/// Paths probed on a handler's metadata, in priority order.
const CANDIDATE_PATHS: &[&[&str]] = &[
    &["zodSchema"],
    &["schema", "zodSchema"],
    &["params", "zodSchema"],
    &["schema"],
    &["validator", "schema"],
    &["bodySchema"],
];

fn lookup<'a>(handle: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = handle;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

/// Infer a request body schema from a single handler value.
///
/// Custom extractors run first, in registration order. A panicking
/// extractor is treated as a miss. Built-in parsers then probe the
/// candidate paths; the handle itself is the fallback candidate for
/// description and JSON-Schema shapes. Returns `None` when nothing
/// matches.
pub fn infer(handle: &Value, extractors: &[Extractor]) -> Option<SchemaMap> {
    for extractor in extractors {
        let outcome = catch_unwind(AssertUnwindSafe(|| extractor(handle)));
        match outcome {
            Ok(Some(map)) => return Some(map),
            Ok(None) => {}
            Err(_) => {
                tracing::warn!("schema extractor panicked, skipping");
            }
        }
    }

    for path in CANDIDATE_PATHS {
        let Some(candidate) = lookup(handle, path) else {
            continue;
        };
        if !candidate.is_object() {
            continue;
        }
        for parser in PARSERS {
            if parser.recognizes(candidate) {
                if let Some(map) = parser.extract(candidate) {
                    return Some(map);
                }
            }
        }
    }

    // The handle itself may be the described or JSON-Schema shape.
    for parser in [
        &described::DescribedShape as &dyn ShapeParser,
        &json_schema::JsonSchemaShape,
    ] {
        if parser.recognizes(handle) {
            if let Some(map) = parser.extract(handle) {
                return Some(map);
            }
        }
    }

    None
}
