// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote control endpoint trust gating.

use parking_lot::Mutex;
use qm_httpd::{AgentHandle, HttpdConfig, Server};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;

struct RecordingHandle {
    urls: Vec<String>,
    run_now: Mutex<Vec<String>>,
}

impl AgentHandle for RecordingHandle {
    fn status(&self) -> String {
        "waiting".to_string()
    }

    fn server_urls(&self) -> Vec<String> {
        self.urls.clone()
    }

    fn target_descriptions(&self) -> Vec<String> {
        self.urls.iter().map(|u| format!("server: {u}")).collect()
    }

    fn storage_dirs(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    fn run_now_url(&self, url: &str) {
        self.run_now.lock().push(url.to_string());
    }

    fn run_now_all(&self) {
        self.run_now.lock().push("*".to_string());
    }
}

async fn started(urls: Vec<String>, trust: Vec<String>) -> (Server, Arc<RecordingHandle>, String) {
    let handle = Arc::new(RecordingHandle { urls, run_now: Mutex::new(Vec::new()) });
    let config = HttpdConfig {
        ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        trust,
    };
    let mut server = Server::new(config, Arc::clone(&handle) as Arc<dyn AgentHandle>, Vec::new());
    server.init().await.unwrap();
    let addr = server.bound_addrs()[0];
    (server, handle, format!("http://{addr}"))
}

#[tokio::test]
async fn now_from_a_server_peer_advances_that_target_only() {
    // The loopback peer resolves as the server target's address
    let (mut server, handle, base) =
        started(vec!["http://127.0.0.1/glpi/".to_string()], Vec::new()).await;

    let response = reqwest::get(format!("{base}/now")).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(*handle.run_now.lock(), vec!["http://127.0.0.1/glpi/".to_string()]);
    server.stop().await;
}

#[tokio::test]
async fn now_from_a_generally_trusted_peer_advances_all_targets() {
    let (mut server, handle, base) = started(
        vec!["http://203.0.113.7/".to_string()],
        vec!["127.0.0.0/8".to_string()],
    )
    .await;

    let response = reqwest::get(format!("{base}/now")).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(*handle.run_now.lock(), vec!["*".to_string()]);
    server.stop().await;
}

#[tokio::test]
async fn now_from_an_untrusted_peer_is_denied() {
    let (mut server, handle, base) =
        started(vec!["http://203.0.113.7/".to_string()], Vec::new()).await;

    let response = reqwest::get(format!("{base}/now")).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    assert!(handle.run_now.lock().is_empty());
    server.stop().await;
}

#[tokio::test]
async fn status_route_reports_agent_status() {
    let (mut server, _handle, base) = started(Vec::new(), Vec::new()).await;

    let body = reqwest::get(format!("{base}/status"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(body, "status: waiting");
    server.stop().await;
}
