// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Parser for JSON-Schema-like candidates (`properties` maps).

use serde_json::Value;

use crate::schema::{SchemaMap, ShapeParser};

pub struct JsonSchemaShape;

impl ShapeParser for JsonSchemaShape {
    fn id(&self) -> &'static str {
        "json_schema_shape"
    }

    fn recognizes(&self, candidate: &Value) -> bool {
        candidate
            .get("properties")
            .map(Value::is_object)
            .unwrap_or(false)
    }

    fn extract(&self, candidate: &Value) -> Option<SchemaMap> {
        let properties = candidate.get("properties")?.as_object()?;
        Some(
            properties
                .iter()
                .map(|(key, property)| (key.clone(), example_value(property)))
                .collect(),
        )
    }
}

fn example_value(property: &Value) -> Value {
    let type_name = property.get("type").and_then(Value::as_str);
    match type_name {
        Some("string") => Value::from("string"),
        Some("number") | Some("integer") => Value::from(0),
        Some("boolean") => Value::from(true),
        Some("array") => Value::Array(Vec::new()),
        Some("object") => match JsonSchemaShape.extract(property) {
            Some(nested) => Value::Object(nested),
            None => Value::from("any"),
        },
        _ => Value::from("any"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(candidate: Value) -> Option<Value> {
        JsonSchemaShape.extract(&candidate).map(Value::Object)
    }

    #[test]
    fn property_types_map_to_examples() {
        let candidate = json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "age": { "type": "integer" },
                "score": { "type": "number" },
                "ok": { "type": "boolean" },
                "tags": { "type": "array" }
            }
        });
        assert_eq!(
            extract(candidate).unwrap(),
            json!({ "name": "string", "age": 0, "score": 0, "ok": true, "tags": [] })
        );
    }

    #[test]
    fn nested_properties_recurse() {
        let candidate = json!({
            "properties": {
                "address": {
                    "type": "object",
                    "properties": { "city": { "type": "string" } }
                },
                "meta": { "type": "object" }
            }
        });
        assert_eq!(
            extract(candidate).unwrap(),
            json!({ "address": { "city": "string" }, "meta": "any" })
        );
    }

    #[test]
    fn untyped_property_maps_to_any() {
        let candidate = json!({ "properties": { "anything": {} } });
        assert_eq!(extract(candidate).unwrap(), json!({ "anything": "any" }));
    }

    #[test]
    fn recognizes_only_object_properties() {
        assert!(JsonSchemaShape.recognizes(&json!({ "properties": {} })));
        assert!(!JsonSchemaShape.recognizes(&json!({ "properties": "oops" })));
        assert!(!JsonSchemaShape.recognizes(&json!({ "type": "object" })));
        assert!(!JsonSchemaShape.recognizes(&json!(null)));
    }
}
