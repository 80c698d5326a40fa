// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Route table traversal and path recovery.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::schema::{self, Extractor, SchemaMap};

/// Snapshot of a host application's routing tree.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    pub stack: Vec<LayerNode>,
}

#[derive(Debug, Clone)]
pub enum LayerNode {
    /// Terminal route: a path template, its methods and the middleware
    /// chain's attached metadata.
    Route {
        path: String,
        methods: Vec<String>,
        handles: Vec<Value>,
    },
    /// Nested mount. The pattern is the compiled matcher source string,
    /// not a plain path.
    Mount {
        pattern: String,
        stack: Vec<LayerNode>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScannedRoute {
    pub path: String,
    pub method: String,
    pub schema: Option<SchemaMap>,
    pub name: String,
}

/// Walks a [`RouteTable`] and lists every route with its inferred body
/// schema. Scanning never mutates the table.
#[derive(Default)]
pub struct RouteScanner {
    extractors: Vec<Extractor>,
}

impl RouteScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom schema extractor. Extractors run before the
    /// built-in parsers, in registration order.
    pub fn use_extractor<F>(&mut self, extractor: F)
    where
        F: Fn(&Value) -> Option<SchemaMap> + Send + Sync + 'static,
    {
        self.extractors.push(std::sync::Arc::new(extractor));
    }

    pub fn scan(&self, table: &RouteTable) -> Vec<ScannedRoute> {
        let mut routes = Vec::new();
        self.walk(&table.stack, "", &mut routes);
        routes
    }

    fn walk(&self, stack: &[LayerNode], prefix: &str, out: &mut Vec<ScannedRoute>) {
        for node in stack {
            match node {
                LayerNode::Route {
                    path,
                    methods,
                    handles,
                } => {
                    let full = collapse_slashes(&format!("{prefix}{path}"));
                    // One inference pass per route, shared by all methods.
                    let schema = handles
                        .iter()
                        .find_map(|handle| schema::infer(handle, &self.extractors));
                    for method in methods {
                        out.push(ScannedRoute {
                            path: full.clone(),
                            method: method.to_uppercase(),
                            schema: schema.clone(),
                            name: full.clone(),
                        });
                    }
                }
                LayerNode::Mount { pattern, stack } => {
                    let nested = format!("{prefix}{}", literal_prefix(pattern));
                    self.walk(stack, &nested, out);
                }
            }
        }
    }
}

fn prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\^?((?:\\/[\w\-.:*]+)+)").expect("Failed to compile prefix regex")
    })
}

fn unescape_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\\(.)").expect("Failed to compile unescape regex"))
}

/// Recover the literal path prefix from a compiled matcher source.
///
/// `^\/api\/v1\/?(?=\/|$)` yields `/api/v1`. Parametric segments
/// (`:id`, `*`) survive verbatim. Patterns with no recoverable literal
/// run contribute an empty prefix.
pub fn literal_prefix(pattern: &str) -> String {
    let Some(escaped) = prefix_pattern()
        .captures(pattern)
        .and_then(|captures| captures.get(1))
    else {
        return String::new();
    };
    unescape_pattern()
        .replace_all(escaped.as_str(), "$1")
        .into_owned()
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(ch);
    }
    out
}

/// Whether a concrete request path matches a scanned route template.
/// `:param` segments match any single segment, `*` matches the rest.
pub fn matches_template(template: &str, path: &str) -> bool {
    if template == path {
        return true;
    }
    let template_segments: Vec<&str> = template.trim_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    for (index, segment) in template_segments.iter().enumerate() {
        if *segment == "*" {
            return true;
        }
        let Some(concrete) = path_segments.get(index) else {
            return false;
        };
        if segment.starts_with(':') {
            if concrete.is_empty() {
                return false;
            }
        } else if segment != concrete {
            return false;
        }
    }
    template_segments.len() == path_segments.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn route(path: &str, methods: &[&str], handles: Vec<Value>) -> LayerNode {
        LayerNode::Route {
            path: path.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            handles,
        }
    }

    fn zod_handle(shape: Value) -> Value {
        json!({ "zodSchema": { "_def": { "typeName": "ZodObject", "shape": shape } } })
    }

    #[rstest]
    #[case(r"^\/api\/v1\/?(?=\/|$)", "/api/v1")]
    #[case(r"^\/api\/?(?=\/|$)", "/api")]
    #[case(r"\/admin", "/admin")]
    #[case(r"^\/users\/:id\/?(?=\/|$)", "/users/:id")]
    #[case(r"^\/files\/*\/?(?=\/|$)", "/files/*")]
    #[case(r"^\/?(?=\/|$)", "")]
    #[case("/plain", "")]
    #[case(".*", "")]
    #[case("", "")]
    fn recovers_literal_prefix(#[case] pattern: &str, #[case] expected: &str) {
        assert_eq!(literal_prefix(pattern), expected);
    }

    #[test]
    fn mounted_route_gets_full_path() {
        let table = RouteTable {
            stack: vec![LayerNode::Mount {
                pattern: r"^\/api\/v1\/?(?=\/|$)".to_string(),
                stack: vec![route("/users", &["get"], vec![])],
            }],
        };
        let routes = RouteScanner::new().scan(&table);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path, "/api/v1/users");
        assert_eq!(routes[0].method, "GET");
        assert_eq!(routes[0].name, "/api/v1/users");
    }

    #[test]
    fn nested_mounts_accumulate() {
        let table = RouteTable {
            stack: vec![LayerNode::Mount {
                pattern: r"^\/api\/?(?=\/|$)".to_string(),
                stack: vec![LayerNode::Mount {
                    pattern: r"^\/v2\/?(?=\/|$)".to_string(),
                    stack: vec![route("/things/:id", &["get", "delete"], vec![])],
                }],
            }],
        };
        let routes = RouteScanner::new().scan(&table);
        let paths: Vec<_> = routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/api/v2/things/:id", "/api/v2/things/:id"]);
        let methods: Vec<_> = routes.iter().map(|r| r.method.as_str()).collect();
        assert_eq!(methods, vec!["GET", "DELETE"]);
    }

    #[test]
    fn duplicate_slashes_collapse() {
        let table = RouteTable {
            stack: vec![LayerNode::Mount {
                pattern: r"^\/api\/?(?=\/|$)".to_string(),
                stack: vec![route("//users", &["get"], vec![])],
            }],
        };
        let routes = RouteScanner::new().scan(&table);
        assert_eq!(routes[0].path, "/api/users");
    }

    #[test]
    fn unrecoverable_mount_contributes_nothing() {
        let table = RouteTable {
            stack: vec![LayerNode::Mount {
                pattern: ".*".to_string(),
                stack: vec![route("/health", &["get"], vec![])],
            }],
        };
        let routes = RouteScanner::new().scan(&table);
        assert_eq!(routes[0].path, "/health");
    }

    #[test]
    fn schema_shared_across_methods() {
        let handle = zod_handle(json!({ "name": { "_def": { "typeName": "ZodString" } } }));
        let table = RouteTable {
            stack: vec![route("/widgets", &["post", "put"], vec![handle])],
        };
        let routes = RouteScanner::new().scan(&table);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].schema, routes[1].schema);
        let schema = routes[0].schema.as_ref().unwrap();
        assert_eq!(Value::Object(schema.clone()), json!({ "name": "string" }));
    }

    #[test]
    fn first_handle_with_schema_wins() {
        let plain = json!({ "name": "logger" });
        let first = zod_handle(json!({ "a": { "_def": { "typeName": "ZodNumber" } } }));
        let second = zod_handle(json!({ "b": { "_def": { "typeName": "ZodString" } } }));
        let table = RouteTable {
            stack: vec![route("/x", &["post"], vec![plain, first, second])],
        };
        let routes = RouteScanner::new().scan(&table);
        let schema = routes[0].schema.as_ref().unwrap();
        assert_eq!(Value::Object(schema.clone()), json!({ "a": 0 }));
    }

    #[test]
    fn custom_extractor_applies_during_scan() {
        let mut scanner = RouteScanner::new();
        scanner.use_extractor(|handle| {
            handle.get("marker")?;
            let mut map = SchemaMap::new();
            map.insert("flag".into(), json!(true));
            Some(map)
        });
        let table = RouteTable {
            stack: vec![route("/marked", &["post"], vec![json!({ "marker": 1 })])],
        };
        let routes = scanner.scan(&table);
        let schema = routes[0].schema.as_ref().unwrap();
        assert_eq!(Value::Object(schema.clone()), json!({ "flag": true }));
    }

    #[test]
    fn widget_scenario_yields_two_routes() {
        let handle = zod_handle(json!({ "name": { "_def": { "typeName": "ZodString" } } }));
        let table = RouteTable {
            stack: vec![
                route("/widgets", &["get"], vec![]),
                route("/widgets", &["post"], vec![handle]),
            ],
        };
        let routes = RouteScanner::new().scan(&table);
        assert_eq!(routes.len(), 2);
        assert!(routes[0].schema.is_none());
        let schema = routes[1].schema.as_ref().unwrap();
        assert_eq!(Value::Object(schema.clone()), json!({ "name": "string" }));
    }

    #[rstest]
    #[case("/users", "/users", true)]
    #[case("/users/:id", "/users/42", true)]
    #[case("/users/:id", "/users", false)]
    #[case("/users/:id", "/users/42/posts", false)]
    #[case("/files/*", "/files/a/b/c", true)]
    #[case("/users", "/orders", false)]
    #[case("/", "/", true)]
    fn template_matching(#[case] template: &str, #[case] path: &str, #[case] expected: bool) {
        assert_eq!(matches_template(template, path), expected);
    }
}
