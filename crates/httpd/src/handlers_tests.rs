// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::server::AgentHandle;
use crate::trust::TrustCache;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;

pub(crate) struct FakeHandle {
    pub storage: Vec<PathBuf>,
    pub urls: Vec<String>,
    pub run_now: Mutex<Vec<String>>,
}

impl FakeHandle {
    pub(crate) fn new(urls: Vec<String>) -> Self {
        Self {
            storage: Vec::new(),
            urls,
            run_now: Mutex::new(Vec::new()),
        }
    }
}

impl AgentHandle for FakeHandle {
    fn status(&self) -> String {
        "waiting".to_string()
    }

    fn server_urls(&self) -> Vec<String> {
        self.urls.clone()
    }

    fn target_descriptions(&self) -> Vec<String> {
        vec!["server: http://srv/".to_string(), "local: /out".to_string()]
    }

    fn storage_dirs(&self) -> Vec<PathBuf> {
        self.storage.clone()
    }

    fn run_now_url(&self, url: &str) {
        self.run_now.lock().push(url.to_string());
    }

    fn run_now_all(&self) {
        self.run_now.lock().push("*".to_string());
    }
}

fn ctx(handle: FakeHandle, trust: Vec<String>) -> (ServerCtx, Arc<FakeHandle>) {
    let urls = handle.server_urls();
    let handle = Arc::new(handle);
    let ctx = ServerCtx {
        handle: Arc::clone(&handle) as Arc<dyn AgentHandle>,
        plugins: Vec::new(),
        trust: Arc::new(TrustCache::new(trust, urls)),
    };
    (ctx, handle)
}

fn request(path: &str, peer: &str, trusted: bool) -> PluginRequest {
    PluginRequest {
        method: "GET".to_string(),
        path: path.to_string(),
        peer: peer.parse::<IpAddr>().unwrap(),
        trusted,
    }
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_status_route() {
    let (ctx, _handle) = ctx(FakeHandle::new(Vec::new()), Vec::new());
    let response = builtin(&ctx, &request("/status", "8.8.8.8", false)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "status: waiting");
}

#[tokio::test]
async fn test_index_hides_targets_from_untrusted() {
    let (ctx, _handle) = ctx(FakeHandle::new(Vec::new()), Vec::new());

    let page = body_text(builtin(&ctx, &request("/", "8.8.8.8", false)).await).await;
    assert!(!page.contains("http://srv/"));

    let page = body_text(builtin(&ctx, &request("/", "8.8.8.8", true)).await).await;
    assert!(page.contains("http://srv/"));
    assert!(page.contains("local: /out"));
}

#[tokio::test]
async fn test_unknown_route_404() {
    let (ctx, _handle) = ctx(FakeHandle::new(Vec::new()), Vec::new());
    let response = builtin(&ctx, &request("/bogus", "8.8.8.8", false)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_rejected() {
    let (ctx, _handle) = ctx(FakeHandle::new(Vec::new()), Vec::new());
    let mut request = request("/status", "8.8.8.8", false);
    request.method = "POST".to_string();
    let response = builtin(&ctx, &request).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_now_untrusted_is_403() {
    let (ctx, _handle) = ctx(FakeHandle::new(Vec::new()), Vec::new());
    let response = builtin(&ctx, &request("/now", "8.8.8.8", false)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_now_server_peer_advances_one_target() {
    let handle = FakeHandle::new(vec!["http://127.0.0.1/".to_string()]);
    let (ctx, fake) = ctx(handle, Vec::new());

    let response = builtin(&ctx, &request("/now", "127.0.0.1", false)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(*fake.run_now.lock(), vec!["http://127.0.0.1/".to_string()]);
}

#[tokio::test]
async fn test_now_generally_trusted_advances_all() {
    let handle = FakeHandle::new(vec!["http://10.99.99.99/".to_string()]);
    let (ctx, fake) = ctx(handle, vec!["192.168.0.0/24".to_string()]);

    let response = builtin(&ctx, &request("/now", "192.168.0.5", true)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(*fake.run_now.lock(), vec!["*".to_string()]);
}

#[tokio::test]
async fn test_deploy_get_file_serves_verified_content() {
    let dir = tempfile::tempdir().unwrap();
    let payload = b"filepart-content";
    let sha512 = format!("{:x}", Sha512::digest(payload));
    let path = dir
        .path()
        .join("deploy/fileparts/shared/9999999999")
        .join(&sha512[0..1])
        .join(&sha512[1..2])
        .join(&sha512[2..8]);
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join(&sha512), payload).unwrap();

    let mut handle = FakeHandle::new(Vec::new());
    handle.storage = vec![dir.path().to_path_buf()];
    let (ctx, _handle) = ctx(handle, Vec::new());

    let response = builtin(&ctx, &request(&format!("/deploy/getFile/{sha512}"), "8.8.8.8", false)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "filepart-content");
}

#[tokio::test]
async fn test_deploy_get_file_rejects_digest_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let sha512 = format!("{:x}", Sha512::digest(b"expected"));
    let path = dir
        .path()
        .join("deploy/fileparts/shared/9999999999")
        .join(&sha512[0..1])
        .join(&sha512[1..2])
        .join(&sha512[2..8]);
    std::fs::create_dir_all(&path).unwrap();
    // Content does not hash to the requested digest
    std::fs::write(path.join(&sha512), b"tampered").unwrap();

    let mut handle = FakeHandle::new(Vec::new());
    handle.storage = vec![dir.path().to_path_buf()];
    let (ctx, _handle) = ctx(handle, Vec::new());

    let response = builtin(&ctx, &request(&format!("/deploy/getFile/{sha512}"), "8.8.8.8", false)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deploy_get_file_rejects_bad_digest_shape() {
    let (ctx, _handle) = ctx(FakeHandle::new(Vec::new()), Vec::new());
    let response = builtin(&ctx, &request("/deploy/getFile/abc", "8.8.8.8", false)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
