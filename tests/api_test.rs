use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use redisboard_core::memory::{MemoryStore, MemoryValue};
use redisboard_core::types::ServerConfig;
use redisboard_core::{BoardSettings, Redisboard, ServerHandle};
use redisboard_lib::api::AdminApi;
use redisboard_lib::registry::StaticRegistry;

fn router_with(config: ServerConfig, store: &MemoryStore) -> Router {
    let server = ServerHandle::new(config, Arc::new(store.clone()));
    let registry = StaticRegistry::new([server]);
    let board = Arc::new(Redisboard::new(BoardSettings::default()).unwrap());
    Arc::new(AdminApi::new(Arc::new(registry), board)).create_router()
}

fn router(store: &MemoryStore) -> Router {
    router_with(ServerConfig::new(1, "localhost", 6379), store)
}

async fn call(router: Router, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn call_json(router: Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let (status, body) = call(router, method, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health() {
    let (status, body) = call_json(router(&MemoryStore::new()), Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_server_list_columns() {
    let store = MemoryStore::new();
    store.set_string(0, "k", "v");

    let (status, body) = call_json(router(&store), Method::GET, "/servers/").await;
    assert_eq!(status, StatusCode::OK);
    let row = &body["servers"][0];
    assert_eq!(row["id"], 1);
    assert_eq!(row["name"], "localhost:6379");
    assert_eq!(row["status"], "UP");
    assert_eq!(row["memory"], "1.00M (peak: 2.00M)");
    assert_eq!(row["cpu"]["cpu_utilization"], "0.004%");
    assert_eq!(row["slowlog"]["lines"][0], "Total: 0 items");
}

#[tokio::test]
async fn test_server_list_down_server() {
    let store = MemoryStore::new();
    store.set_down(true);

    let (status, body) = call_json(router(&store), Method::GET, "/servers/").await;
    assert_eq!(status, StatusCode::OK);
    let row = &body["servers"][0];
    assert_eq!(row["status"], "DOWN");
    assert_eq!(row["memory"], "n/a");
    assert_eq!(row["cpu"], "n/a");
}

#[tokio::test]
async fn test_inspect_small_server() {
    let store = MemoryStore::new();
    store
        .set_string(0, "greeting", "hello")
        .hset(1, "user:1", &[("name", "ada")])
        .expire(1, "user:1", 300);

    let (status, body) = call_json(router(&store), Method::GET, "/servers/1/inspect/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["status"], "UP");
    assert_eq!(body["databases"]["0"]["active"], true);
    assert_eq!(body["databases"]["0"]["keys"]["greeting"]["type"], "string");
    assert_eq!(body["databases"]["1"]["keys"]["user:1"]["ttl"], 300);
    assert_eq!(body["databases"]["1"]["persistent_memory"], 0.0);
    assert!(body["original"].get("password").is_none());
}

#[tokio::test]
async fn test_inspect_lists_binary_key_names() {
    let store = MemoryStore::new();
    store
        .insert(0, [b'b', 0xff], MemoryValue::List(vec!["x".into(), "y".into()]))
        .set_string(0, "plain", "v");

    let (status, body) = call_json(router(&store), Method::GET, "/servers/1/inspect/").await;
    assert_eq!(status, StatusCode::OK);
    let key = &body["databases"]["0"]["keys"]["b\\xff"];
    assert_eq!(key["type"], "list");
    assert_eq!(key["length"], 2);
    assert_eq!(body["databases"]["0"]["size"], 2);
    assert!(body["databases"]["0"]["total_memory"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_inspect_key_page() {
    let store = MemoryStore::new();
    let items: Vec<String> = (0..250).map(|i| i.to_string()).collect();
    let refs: Vec<&str> = items.iter().map(String::as_str).collect();
    store.rpush(0, "big", &refs);

    let (status, body) = call_json(
        router(&store),
        Method::GET,
        "/servers/1/inspect/?key=big&db=0&page=2",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let details = &body["key_details"];
    assert_eq!(details["type"], "list");
    assert_eq!(details["length"], 250);
    assert_eq!(details["data"]["number"], 2);
    assert_eq!(details["data"]["num_pages"], 3);
    assert_eq!(details["data"]["items"][0], serde_json::json!([100, "100"]));
    assert_eq!(details["data"]["items"].as_array().unwrap().len(), 100);
}

#[tokio::test]
async fn test_inspect_missing_key() {
    let store = MemoryStore::new();

    let (status, body) =
        call_json(router(&store), Method::GET, "/servers/1/inspect/?key=ghost").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key_details"]["type"], "none");
    assert_eq!(body["key_details"]["length"], "n/a");
    assert_eq!(body["key_details"]["error"], "The key does not exist");
}

#[tokio::test]
async fn test_inspect_unknown_database() {
    let store = MemoryStore::new();
    store.set_string(0, "a", "1").set_string(0, "b", "2");
    let mut config = ServerConfig::new(1, "localhost", 6379);
    config.sampling_threshold = 1;

    let (status, body) =
        call(router_with(config, &store), Method::GET, "/servers/1/inspect/?db=9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"Unknown database.");
}

#[tokio::test]
async fn test_inspect_down_server_still_renders() {
    let store = MemoryStore::new();
    store.set_down(true);

    let (status, body) = call_json(router(&store), Method::GET, "/servers/1/inspect/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["status"], "DOWN");
    assert_eq!(body["databases"], serde_json::json!({}));
}

#[tokio::test]
async fn test_unknown_server() {
    let (status, body) =
        call(router(&MemoryStore::new()), Method::GET, "/servers/42/inspect/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"Unknown server.");
}

#[tokio::test]
async fn test_delete_key() {
    let store = MemoryStore::new();
    store.set_string(3, "session", "x").set_string(3, "other", "y");

    let (status, body) = call_json(
        router(&store),
        Method::POST,
        "/servers/1/delete/?key=session&db=3",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["level"], "success");
    assert_eq!(body["message"], "Key session deleted.");
    assert_eq!(body["redirect"], "/servers/");
    assert!(!store.exists(3, "session"));
    assert_eq!(store.key_count(3), 1);
}

#[tokio::test]
async fn test_delete_missing_key() {
    let store = MemoryStore::new();
    store.set_string(0, "keep", "1");

    let (_, body) = call_json(router(&store), Method::POST, "/servers/1/delete/?key=nope").await;
    assert_eq!(body["level"], "error");
    assert_eq!(body["message"], "Unable to delete key nope");
    assert_eq!(body["outcome"], "key_not_found");
    assert_eq!(store.key_count(0), 1);
}

#[tokio::test]
async fn test_delete_requires_post() {
    let (status, _) = call(
        router(&MemoryStore::new()),
        Method::GET,
        "/servers/1/delete/?key=k",
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
