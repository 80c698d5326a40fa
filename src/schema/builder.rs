// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Parser for builder-style validator metadata (`_def` trees).

use serde_json::Value;

use crate::schema::{SchemaMap, ShapeParser};

pub struct BuilderShape;

impl ShapeParser for BuilderShape {
    fn id(&self) -> &'static str {
        "builder_shape"
    }

    fn recognizes(&self, candidate: &Value) -> bool {
        candidate.is_object()
            && (candidate.get("_def").is_some()
                || candidate.get("safeParse").is_some()
                || candidate.get("parse").is_some())
    }

    fn extract(&self, candidate: &Value) -> Option<SchemaMap> {
        let map = parse_builder(candidate);
        if map.is_empty() {
            None
        } else {
            Some(map)
        }
    }
}

/// Follow `_def.schema` / `_def.innerType` links until the innermost
/// node. Wrappers such as optional, default and effects nest the real
/// schema one level down.
fn unwrap_wrappers(schema: &Value) -> &Value {
    let mut current = schema;
    loop {
        let Some(def) = current.get("_def") else {
            return current;
        };
        let inner = def
            .get("schema")
            .filter(|v| !v.is_null())
            .or_else(|| def.get("innerType").filter(|v| !v.is_null()));
        match inner {
            Some(next) => current = next,
            None => return current,
        }
    }
}

pub(crate) fn parse_builder(schema: &Value) -> SchemaMap {
    let current = unwrap_wrappers(schema);
    let shape = current
        .get("_def")
        .and_then(|def| def.get("shape"))
        .filter(|v| !v.is_null())
        .or_else(|| current.get("shape"));
    let Some(shape) = shape.and_then(Value::as_object) else {
        return SchemaMap::new();
    };
    // Routes validated as `{ body: ... }` describe the body one level down.
    if let Some(body) = shape.get("body") {
        return parse_builder(body);
    }
    shape
        .iter()
        .map(|(key, field)| (key.clone(), example_value(field)))
        .collect()
}

fn example_value(field: &Value) -> Value {
    let current = unwrap_wrappers(field);
    let type_name = current
        .get("_def")
        .and_then(|def| def.get("typeName"))
        .and_then(Value::as_str);
    match type_name {
        Some("ZodString") => Value::from("string"),
        Some("ZodNumber") => Value::from(0),
        Some("ZodBoolean") => Value::from(true),
        Some("ZodArray") => Value::Array(Vec::new()),
        Some("ZodObject") => Value::Object(parse_builder(current)),
        Some("ZodEnum") => current
            .get("_def")
            .and_then(|def| def.get("values"))
            .and_then(Value::as_array)
            .and_then(|values| values.first())
            .cloned()
            .unwrap_or_else(|| Value::from("enum")),
        Some("ZodDate") => Value::from(chrono::Utc::now().to_rfc3339()),
        _ => Value::Null,
    }
}
