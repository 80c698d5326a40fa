// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! `{{VARIABLE}}` placeholder resolution against environments.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::capture::DEFAULT_ENVIRONMENT_NAME;
use crate::store::JsonStore;

pub const BASE_URL_PLACEHOLDER: &str = "{{BASE_URL}}";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([^}]+)\}\}").expect("Failed to compile placeholder regex"))
}

/// Replace every `{{KEY}}` with its value. Keys are trimmed before lookup;
/// unknown placeholders stay verbatim.
pub fn resolve_variables(text: &str, vars: &HashMap<String, String>) -> String {
    if text.is_empty() || vars.is_empty() {
        return text.to_string();
    }
    placeholder_pattern()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let key = caps[1].trim();
            match vars.get(key) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Variables of the environment with the given id, falling back to the
/// default environment, falling back to none.
pub async fn load_variables(
    store: &JsonStore,
    environment_id: Option<&str>,
) -> HashMap<String, String> {
    let environments = store.get_environments().await;
    let environment = environment_id
        .and_then(|id| environments.iter().find(|e| e.id == id))
        .or_else(|| {
            environments
                .iter()
                .find(|e| e.name == DEFAULT_ENVIRONMENT_NAME)
        });
    match environment {
        Some(environment) => parse_variable_map(&environment.variables),
        None => HashMap::new(),
    }
}

/// Parse a serialized `{"KEY": "value"}` variables document. Malformed input
/// yields no variables. Non-string values keep their JSON rendering.
pub(crate) fn parse_variable_map(raw: &str) -> HashMap<String, String> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) else {
        return HashMap::new();
    };
    map.into_iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, rendered)
        })
        .collect()
}
