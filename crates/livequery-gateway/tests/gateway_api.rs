// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway routes against a real campaign manager with in-memory collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::{Duration as ChronoDuration, Utc};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::{Message, client::IntoClientRequest};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use livequery_campaign::{CampaignManager, CampaignService, Collaborators};
use livequery_config::CampaignConfig;
use livequery_core::{HostId, HostTargets, QueryRef, Viewer};
use livequery_gateway::{AuthConfig, GatewayState, HealthState, Sessions, router, serve};
use livequery_test_utils::{AllowAll, MemoryDatastore, MemoryPersistence};

const TOKEN: &str = "test-token";
const WAIT: Duration = Duration::from_secs(5);

async fn manager() -> Arc<CampaignManager> {
    let now = Utc::now();
    let datastore = Arc::new(
        MemoryDatastore::new()
            .with_host(7, "web-7", now - ChronoDuration::minutes(1))
            .with_host(9, "web-9", now - ChronoDuration::minutes(1))
            .with_label(2, "web", &[7, 9])
            .with_query(5, "processes", "SELECT * FROM processes"),
    );
    let manager = CampaignManager::open(
        &CampaignConfig::default(),
        Collaborators {
            datastore: datastore.clone(),
            queries: datastore,
            persistence: Arc::new(MemoryPersistence::new()),
            authorizer: Arc::new(AllowAll),
        },
    )
    .await
    .unwrap();
    Arc::new(manager)
}

fn state(manager: Arc<CampaignManager>) -> GatewayState {
    let mut tokens = BTreeMap::new();
    tokens.insert(TOKEN.to_string(), "alice".to_string());
    GatewayState {
        service: manager,
        auth: AuthConfig::new(tokens),
        health: HealthState::new(Some(Arc::new(|| "livequery_up 1\n".to_string()))),
        sessions: Sessions::new(),
    }
}

fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_and_metrics_are_public() {
    let app = router(state(manager().await));

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&text).contains("livequery_up"));
}

#[tokio::test]
async fn api_requires_known_bearer_token() {
    let app = router(state(manager().await));

    let response = app
        .clone()
        .oneshot(Request::get("/v1/campaigns/1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::get("/v1/campaigns/1")
                .header("authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_fetch_ingest_and_close() {
    let app = router(state(manager().await));

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            "/v1/campaigns",
            Some(json!({"query": "SELECT 1", "targets": {"label_ids": [2]}})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let campaign = json_body(response).await;
    assert_eq!(campaign["created_by"], "alice");
    assert_eq!(campaign["metrics"]["total_hosts"], 2);
    let id = campaign["id"].as_u64().unwrap();

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/v1/campaigns/{id}/results"),
            Some(json!({"host_id": 7, "rows": [{"pid": "1"}]})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["outcome"], "published");

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/v1/campaigns/{id}/results"),
            Some(json!({"host_id": 42, "error": "no such table"})),
        ))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["outcome"], "not_targeted");

    let response = app
        .clone()
        .oneshot(authed("GET", &format!("/v1/campaigns/{id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["metrics"]["active_hosts"], 1);

    let response = app
        .clone()
        .oneshot(authed("DELETE", &format!("/v1/campaigns/{id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let closed = json_body(response).await;
    assert_eq!(closed["status"], "completed");
    assert_eq!(closed["close_reason"], "explicit");
}

#[tokio::test]
async fn create_by_names_uses_saved_query() {
    let app = router(state(manager().await));

    let response = app
        .oneshot(authed(
            "POST",
            "/v1/campaigns/by-names",
            Some(json!({"query_id": 5, "host_names": ["web-7", "nope"], "label_names": []})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let campaign = json_body(response).await;
    assert_eq!(campaign["query_text"], "SELECT * FROM processes");
    assert_eq!(campaign["metrics"]["total_hosts"], 2);
    assert_eq!(campaign["metrics"]["missing_hosts"], 1);
}

#[tokio::test]
async fn errors_map_to_http_status() {
    let app = router(state(manager().await));

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            "/v1/campaigns",
            Some(json!({"query": "SELECT 1", "targets": {}})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());

    let response = app
        .oneshot(authed("GET", "/v1/campaigns/999", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn next_json(socket: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(WAIT, socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn websocket_streams_results_until_close() {
    let manager = manager().await;
    let viewer = Viewer::new("alice");
    let campaign = manager
        .create_campaign(
            &viewer,
            QueryRef {
                id: None,
                text: "SELECT 1".into(),
            },
            HostTargets {
                host_ids: vec![HostId(7)],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let server = tokio::spawn(serve(listener, state(manager.clone()), cancel.clone()));

    let mut request = format!("ws://{addr}/v1/campaigns/{}/stream", campaign.id)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("authorization", format!("Bearer {TOKEN}").parse().unwrap());
    let (mut socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    assert_eq!(next_json(&mut socket).await["type"], "totals");
    assert_eq!(next_json(&mut socket).await["type"], "status");

    manager
        .ingest_result(campaign.id, HostId(7), vec![], None)
        .await
        .unwrap();
    let result = next_json(&mut socket).await;
    assert_eq!(result["type"], "result");
    assert_eq!(result["data"]["host_id"], 7);

    manager.close_campaign(&viewer, campaign.id).await.unwrap();
    let end = next_json(&mut socket).await;
    assert_eq!(end["type"], "end_of_stream");
    assert_eq!(end["data"]["reason"], "explicit");

    drop(socket);
    cancel.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn websocket_cancel_leaves_campaign_open() {
    let manager = manager().await;
    let viewer = Viewer::new("alice");
    let campaign = manager
        .create_campaign(
            &viewer,
            QueryRef {
                id: None,
                text: "SELECT 1".into(),
            },
            HostTargets {
                host_ids: vec![HostId(9)],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let server = tokio::spawn(serve(listener, state(manager.clone()), cancel.clone()));

    let mut request = format!("ws://{addr}/v1/campaigns/{}/stream", campaign.id)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("authorization", format!("Bearer {TOKEN}").parse().unwrap());
    let (mut socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    // totals + status arrive on attach
    for _ in 0..2 {
        tokio::time::timeout(WAIT, socket.next()).await.unwrap();
    }
    socket
        .send(Message::Text(r#"{"type":"cancel"}"#.into()))
        .await
        .unwrap();

    // the server closes its side after the viewer cancels
    let closed = tokio::time::timeout(WAIT, async {
        while let Some(Ok(frame)) = socket.next().await {
            if frame.is_close() {
                return true;
            }
        }
        true
    })
    .await
    .unwrap();
    assert!(closed);
    drop(socket);

    let fetched = manager.get_campaign(&viewer, campaign.id).await.unwrap();
    assert!(!fetched.status.is_terminal());

    cancel.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_ends_open_websocket_sessions() {
    let manager = manager().await;
    let viewer = Viewer::new("alice");
    let campaign = manager
        .create_campaign(
            &viewer,
            QueryRef {
                id: None,
                text: "SELECT 1".into(),
            },
            HostTargets {
                host_ids: vec![HostId(7)],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let state = state(manager.clone());
    let sessions = state.sessions.clone();
    let server = tokio::spawn(serve(listener, state, cancel.clone()));

    let mut request = format!("ws://{addr}/v1/campaigns/{}/stream", campaign.id)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("authorization", format!("Bearer {TOKEN}").parse().unwrap());
    let (mut socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    assert_eq!(next_json(&mut socket).await["type"], "totals");
    assert_eq!(sessions.len(), 1);

    // the viewer stays attached while the server shuts down
    cancel.cancel();
    tokio::time::timeout(WAIT, server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(sessions.is_empty());
    // no session task holds the service any more
    tokio::time::timeout(WAIT, async {
        while Arc::strong_count(&manager) > 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let ended = tokio::time::timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok());

    let fetched = manager.get_campaign(&viewer, campaign.id).await.unwrap();
    assert!(!fetched.status.is_terminal());
}
