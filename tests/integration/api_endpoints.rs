//! REST surface over a running scheduler

use std::net::SocketAddr;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use uptime_monitor::{
    actors::storage::StorageHandle,
    api::{ApiState, spawn_api_server},
    config::ApiSettings,
    registry::ServiceRegistry,
    storage::{RecordStore, memory::MemoryStore},
};

use crate::helpers::{ScriptedProbe, spawn_scheduler};

struct TestServer {
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }
}

async fn start(state: ApiState, auth_token: Option<&str>) -> TestServer {
    let settings = ApiSettings {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        auth_token: auth_token.map(str::to_string),
        enable_cors: true,
    };
    let addr = spawn_api_server(&settings, state).await.unwrap();
    TestServer {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn test_registered_service_is_probed_on_next_tick() {
    let registry = Arc::new(ServiceRegistry::new(20));
    let probe = ScriptedProbe::new();
    let (scheduler, live) = spawn_scheduler(registry.clone(), probe.clone(), None).await;
    let store = Arc::new(MemoryStore::new());
    let storage = StorageHandle::spawn(store.clone());
    let state = ApiState::new(registry.clone(), live)
        .with_scheduler(scheduler.clone())
        .with_storage(storage.clone());
    let server = start(state, None).await;

    let response = server
        .client
        .post(server.url("/api/v1/services"))
        .json(&json!({ "name": "api", "target": "http://api.test" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    scheduler.tick_now().await.unwrap();

    let (status, body) = server.get("/api/v1/services/api").await;
    assert_eq!(status, 200);
    assert_eq!(body["service"]["checks"], 1);
    assert_eq!(body["service"]["status"], true);
    assert_eq!(body["aggregate"]["uptime_percentage"], 100.0);

    let (_, stats) = server.get("/api/v1/stats").await;
    assert_eq!(stats["online_count"], 1);
    assert_eq!(stats["scheduler"], "idle");
    assert!(stats["storage"]["records_written"].as_u64().unwrap() >= 1);

    storage.flush().await.unwrap();
    assert!(store.find_one("api").await.unwrap().is_some());

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delete_removes_service_and_record() {
    let registry = Arc::new(ServiceRegistry::new(20));
    let probe = ScriptedProbe::new();
    let (scheduler, live) = spawn_scheduler(registry.clone(), probe.clone(), None).await;
    let store = Arc::new(MemoryStore::new());
    let storage = StorageHandle::spawn(store.clone());
    let state = ApiState::new(registry.clone(), live).with_storage(storage.clone());
    let server = start(state, None).await;

    server
        .client
        .post(server.url("/api/v1/services"))
        .json(&json!({ "name": "old", "target": "http://old.test" }))
        .send()
        .await
        .unwrap();
    scheduler.tick_now().await.unwrap();

    let response = server
        .client
        .delete(server.url("/api/v1/services/old"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let report = scheduler.tick_now().await.unwrap();
    assert_eq!(report.probed, 0);

    let (status, body) = server.get("/api/v1/services").await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 0);

    storage.flush().await.unwrap();
    assert!(store.find_one("old").await.unwrap().is_none());

    let (status, _) = server.get("/api/v1/services/old").await;
    assert_eq!(status, 404);

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bearer_token_is_required() {
    let registry = Arc::new(ServiceRegistry::new(20));
    let live = uptime_monitor::live::LiveBroadcaster::new(registry.clone(), 16);
    let server = start(ApiState::new(registry, live), Some("s3cret")).await;

    let (status, _) = server.get("/api/v1/health").await;
    assert_eq!(status, 401);

    let response = server
        .client
        .get(server.url("/api/v1/health"))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}
