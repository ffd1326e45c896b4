//! Admin HTTP API integration tests.
//!
//! Runs the axum server on an ephemeral port and drives it with reqwest.

#[allow(dead_code)]
mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chaosengine::admin::AdminState;
use chaosengine::api::{self, AdminApi};
use chaosengine::experiment::ExperimentManager;
use chaosengine::shutdown::ShutdownCoordinator;
use common::*;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    manager: Arc<ExperimentManager>,
    platform: Arc<ScriptedPlatform>,
    shutdown: ShutdownCoordinator,
    handle: JoinHandle<chaosengine::Result<()>>,
}

impl TestServer {
    async fn start(probability: f64) -> Self {
        let platform = ScriptedPlatform::new("alpha", probability);
        platform.add_target("a");
        let manager = Arc::new(manager_for(vec![platform.as_platform()]));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownCoordinator::new();
        let handle = tokio::spawn(api::serve(
            listener,
            AdminApi::new(Arc::clone(&manager)),
            shutdown.clone(),
        ));
        assert!(wait_for_server(&addr.to_string(), 5).await);

        Self {
            addr,
            manager,
            platform,
            shutdown,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) {
        self.shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

#[tokio::test]
async fn test_health_reflects_platforms() {
    let server = TestServer::start(0.0).await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "UNKNOWN");

    server.manager.start_experiments().await;
    let response = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "OK");
    assert_eq!(body["components"][0]["name"], "alpha");

    server.platform.set_api_available(false);
    server.manager.start_experiments().await;
    let response = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 500);

    server.stop().await;
}

#[tokio::test]
async fn test_admin_state_roundtrip() {
    let server = TestServer::start(1.0).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(server.url("/admin/state"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["state"], "started");

    let response = client
        .post(server.url("/admin/state?state=drain"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["state"], "drain");
    assert_eq!(server.manager.admin().state(), AdminState::Drain);

    let response = client
        .post(server.url("/admin/state?state=sideways"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(server.manager.admin().state(), AdminState::Drain);

    server.stop().await;
}

#[tokio::test]
async fn test_manual_trigger_and_abort() {
    let server = TestServer::start(0.0).await;
    let client = reqwest::Client::new();

    server.manager.start_experiments().await;
    let fingerprint = server.manager.registry().containers()[0].fingerprint();

    let response = client
        .post(server.url(&format!("/experiments/container/{}?kind=network", fingerprint)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .post(server.url(&format!("/experiments/container/{}?kind=state", fingerprint)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let created: Vec<Value> = response.json().await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["container"], "a");
    assert_eq!(created[0]["experiment_type"], "state");

    let pending: Vec<Value> = client
        .get(server.url("/experiments/pending"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    server.manager.update_experiment_status().await;
    let active: Vec<Value> = client
        .get(server.url("/experiments"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(active.len(), 1);

    let id = active[0]["id"].as_str().unwrap().to_string();
    let response = client
        .post(server.url(&format!("/experiments/{}/abort", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let aborted: Value = response.json().await.unwrap();
    assert_eq!(aborted["state"], "finished");
    assert_eq!(aborted["failed"], true);

    server.stop().await;
}

#[tokio::test]
async fn test_bad_requests() {
    let server = TestServer::start(1.0).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/experiments/not-a-uuid/abort"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .post(server.url(&format!("/experiments/{}/abort", uuid::Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .post(server.url("/experiments/container/xyz"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // No recorder installed
    let response = client.get(server.url("/metrics")).send().await.unwrap();
    assert_eq!(response.status(), 404);

    server.stop().await;
}
