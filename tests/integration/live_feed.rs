//! WebSocket live feed against a running API server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use uptime_monitor::{
    api::{ApiState, spawn_api_server},
    config::ApiSettings,
    live::LiveBroadcaster,
    registry::ServiceRegistry,
};

use crate::helpers::{ScriptedProbe, spawn_scheduler};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn local_settings() -> ApiSettings {
    ApiSettings {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..ApiSettings::default()
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/api/v1/stream"))
        .await
        .unwrap();
    client
}

async fn next_event(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no live event within 5s")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn next_event_of(client: &mut Client, kind: &str) -> Value {
    loop {
        let event = next_event(client).await;
        if event["type"] == kind {
            return event;
        }
    }
}

#[tokio::test]
async fn test_late_joiner_gets_current_snapshot() {
    let registry = Arc::new(ServiceRegistry::new(20));
    let probe = ScriptedProbe::new();
    let (scheduler, live) = spawn_scheduler(registry.clone(), probe.clone(), None).await;

    registry.add("api", "http://api.test").await.unwrap();
    registry.add("db", "10.0.0.2:5432").await.unwrap();
    probe.always("10.0.0.2:5432", false);
    scheduler.tick_now().await.unwrap();
    scheduler.tick_now().await.unwrap();

    let addr = spawn_api_server(&local_settings(), ApiState::new(registry.clone(), live))
        .await
        .unwrap();
    let mut client = connect(addr).await;

    let first = next_event(&mut client).await;
    assert_eq!(first["type"], "initial_state");
    assert_eq!(
        first["services"],
        serde_json::to_value(registry.snapshot().await).unwrap()
    );
    assert_eq!(first["stats"]["online_count"], 1);
    assert_eq!(first["stats"]["total_services"], 2);
    assert_eq!(first["services"][0]["checks"], 2);

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ticks_and_transitions_are_pushed() {
    let registry = Arc::new(ServiceRegistry::new(20));
    let probe = ScriptedProbe::new();
    let (scheduler, live) = spawn_scheduler(registry.clone(), probe.clone(), None).await;

    let addr = spawn_api_server(
        &local_settings(),
        ApiState::new(registry.clone(), live.clone()),
    )
    .await
    .unwrap();
    let mut client = connect(addr).await;

    let first = next_event(&mut client).await;
    assert_eq!(first["type"], "initial_state");
    assert_eq!(first["services"].as_array().unwrap().len(), 0);

    registry.add("api", "http://api.test").await.unwrap();
    scheduler.tick_now().await.unwrap();

    let snapshot = next_event_of(&mut client, "snapshot").await;
    assert_eq!(snapshot["services"][0]["name"], "api");
    assert_eq!(snapshot["services"][0]["status"], true);

    let transition = next_event_of(&mut client, "transition").await;
    assert_eq!(transition["event"]["name"], "api");
    assert_eq!(transition["event"]["new_status"], true);

    assert_eq!(live.connected_clients(), 1);

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_session_count_drops_on_disconnect() {
    let registry = Arc::new(ServiceRegistry::new(20));
    let live = LiveBroadcaster::new(registry.clone(), 16);

    let addr = spawn_api_server(
        &local_settings(),
        ApiState::new(registry.clone(), live.clone()),
    )
    .await
    .unwrap();

    let mut client = connect(addr).await;
    next_event(&mut client).await;
    assert_eq!(live.connected_clients(), 1);

    client.close(None).await.unwrap();
    drop(client);

    // The server notices the close asynchronously
    for _ in 0..50 {
        if live.connected_clients() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(live.connected_clients(), 0);
}
