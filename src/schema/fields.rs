// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Parser for plain field maps (`{ "name": "string", "age": "number" }`).

use serde_json::Value;

use crate::schema::{SchemaMap, ShapeParser};

/// Keys that mark a candidate as belonging to another parser.
const STRUCTURAL_KEYS: &[&str] = &[
    "_def",
    "parse",
    "safeParse",
    "properties",
    "isJoi",
    "keys",
    "_ids",
];

pub struct FieldsMap;

impl ShapeParser for FieldsMap {
    fn id(&self) -> &'static str {
        "fields_map"
    }

    fn recognizes(&self, candidate: &Value) -> bool {
        match candidate.as_object() {
            Some(map) => !map.is_empty() && is_field_map(map),
            None => false,
        }
    }

    fn extract(&self, candidate: &Value) -> Option<SchemaMap> {
        let map = candidate.as_object()?;
        Some(
            map.iter()
                .map(|(key, field)| (key.clone(), example_value(field)))
                .collect(),
        )
    }
}

fn is_field_map(map: &serde_json::Map<String, Value>) -> bool {
    if STRUCTURAL_KEYS.iter().any(|key| map.contains_key(*key)) {
        return false;
    }
    map.values().all(|field| match field {
        Value::String(_) => true,
        Value::Object(nested) => is_field_map(nested),
        _ => false,
    })
}

fn example_value(field: &Value) -> Value {
    match field {
        Value::Object(nested) => Value::Object(
            nested
                .iter()
                .map(|(key, inner)| (key.clone(), example_value(inner)))
                .collect(),
        ),
        Value::String(name) => match name.as_str() {
            "string" => Value::from("string"),
            "number" => Value::from(0),
            "boolean" => Value::from(true),
            "array" => Value::Array(Vec::new()),
            "date" => Value::from(chrono::Utc::now().to_rfc3339()),
            _ => Value::from("any"),
        },
        _ => Value::from("any"),
    }
}
