// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Request execution through the tool API against a mock upstream.

use hyper::{Method, StatusCode};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{drive, temp_probe, widget_routes};

use probe_http::service::ApiProbe;

async fn create_environment(probe: &ApiProbe, name: &str, variables: serde_json::Value) -> String {
    let (status, created) = drive(
        probe,
        Method::POST,
        "/api-probe/__api__/environments",
        &json!({ "name": name, "variables": variables.to_string() }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    created["environment"]["id"]
        .as_str()
        .expect("environment id")
        .to_string()
}

#[tokio::test]
async fn execute_resolves_environment_variables_and_records_history() {
    let probe = temp_probe();
    probe.startup(&widget_routes()).await;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pong": true })))
        .mount(&server)
        .await;

    let env_id =
        create_environment(&probe, "Mock", json!({ "BASE_URL": server.uri() })).await;

    let (status, reply) = drive(
        &probe,
        Method::POST,
        "/api-probe/__api__/execute",
        &json!({ "method": "GET", "url": "{{BASE_URL}}/ping", "environmentId": env_id })
            .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], 200);
    assert!(reply["body"].as_str().expect("body").contains("pong"));
    assert!(reply["size"].as_u64().expect("size") > 0);

    let history = probe.store().get_history("system").await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].url, format!("{}/ping", server.uri()));
    assert_eq!(history[0].status, 200);
}

#[tokio::test]
async fn execute_merges_collection_headers_under_explicit_ones() {
    let probe = temp_probe();
    probe.startup(&widget_routes()).await;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header("x-api-key", "k1"))
        .and(header("x-tenant", "override"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let env_id = create_environment(
        &probe,
        "Mock",
        json!({ "BASE_URL": server.uri(), "KEY": "k1" }),
    )
    .await;

    let (_, created) = drive(
        &probe,
        Method::POST,
        "/api-probe/__api__/collections",
        &json!({
            "name": "Secure",
            "headers": json!({ "x-api-key": "{{KEY}}", "x-tenant": "team-a" }).to_string()
        })
        .to_string(),
    )
    .await;
    let collection_id = created["collection"]["id"].as_str().expect("id").to_string();

    let (_, created) = drive(
        &probe,
        Method::POST,
        "/api-probe/__api__/requests",
        &json!({
            "collectionId": collection_id,
            "name": "read secure",
            "method": "GET",
            "url": "{{BASE_URL}}/secure"
        })
        .to_string(),
    )
    .await;
    let request_id = created["request"]["id"].as_str().expect("id").to_string();

    let (status, reply) = drive(
        &probe,
        Method::POST,
        "/api-probe/__api__/execute",
        &json!({
            "method": "GET",
            "url": "{{BASE_URL}}/secure",
            "environmentId": env_id,
            "requestId": request_id,
            "headers": { "x-tenant": "override" }
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // The mock only matches when the collection key resolved through {{KEY}}
    // and the explicit x-tenant replaced the collection's value.
    assert_eq!(reply["status"], 200);
}

#[tokio::test]
async fn execute_inline_variables_override_environment_ones() {
    let probe = temp_probe();
    probe.startup(&widget_routes()).await;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hello/inline"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let env_id = create_environment(
        &probe,
        "Mock",
        json!({ "BASE_URL": server.uri(), "WHO": "env" }),
    )
    .await;

    let (status, reply) = drive(
        &probe,
        Method::POST,
        "/api-probe/__api__/execute",
        &json!({
            "method": "GET",
            "url": "{{BASE_URL}}/hello/{{WHO}}",
            "environmentId": env_id,
            "variables": { "WHO": "inline" }
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], 200);
}

#[tokio::test]
async fn execute_failure_answers_500_without_history() {
    let probe = temp_probe();
    probe.startup(&widget_routes()).await;

    // Bind then drop so the port is known to refuse connections.
    let closed_port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);
        port
    };

    let (status, reply) = drive(
        &probe,
        Method::POST,
        "/api-probe/__api__/execute",
        &json!({ "method": "GET", "url": format!("http://127.0.0.1:{closed_port}/unreachable") })
            .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!reply["error"].as_str().expect("error").is_empty());

    assert!(probe.store().get_history("system").await.is_empty());
}
