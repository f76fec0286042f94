// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in routes: `/`, `/deploy/getFile/{sha512}`, `/now`, `/status`.

use hyper::{Body, Response, StatusCode};
use sha2::{Digest, Sha512};
use std::path::PathBuf;

use crate::plugin::PluginRequest;
use crate::server::ServerCtx;

pub(crate) async fn builtin(ctx: &ServerCtx, request: &PluginRequest) -> Response<Body> {
    if request.method != "GET" {
        return text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }
    match request.path.as_str() {
        "/" => index(ctx, request.trusted),
        "/now" => now(ctx, request),
        "/status" => status(ctx),
        path => match path.strip_prefix("/deploy/getFile/") {
            Some(sha512) => deploy_get_file(ctx, sha512).await,
            None => text(StatusCode::NOT_FOUND, "Not found"),
        },
    }
}

fn text(status: StatusCode, body: &str) -> Response<Body> {
    #[allow(clippy::expect_used)]
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "text/plain")
        .body(Body::from(body.to_string()))
        .expect("static response is valid")
}

fn html(body: String) -> Response<Body> {
    #[allow(clippy::expect_used)]
    Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, "text/html")
        .body(Body::from(body))
        .expect("static response is valid")
}

/// Status page. Target URLs and paths are only disclosed to trusted
/// peers.
fn index(ctx: &ServerCtx, trusted: bool) -> Response<Body> {
    let mut page = String::from(
        "<html><head><title>Quartermaster Agent</title></head><body>\n<h1>Quartermaster Agent</h1>\n",
    );
    page.push_str(&format!("<p>status: {}</p>\n", ctx.handle.status()));
    if trusted {
        page.push_str("<ul>\n");
        for target in ctx.handle.target_descriptions() {
            page.push_str(&format!("<li>{}</li>\n", escape(&target)));
        }
        page.push_str("</ul>\n");
    }
    page.push_str("</body></html>\n");
    html(page)
}

/// `/now`: a peer trusted as a specific server target advances that
/// target; a generally trusted peer advances every target.
fn now(ctx: &ServerCtx, request: &PluginRequest) -> Response<Body> {
    if let Some(url) = ctx.trust.trusted_server_url(request.peer) {
        tracing::debug!("rescheduling next contact for target {url} right now");
        ctx.handle.run_now_url(&url);
        return text(StatusCode::OK, "OK");
    }
    if request.trusted {
        tracing::debug!("rescheduling next contact for all targets right now");
        ctx.handle.run_now_all();
        return text(StatusCode::OK, "OK");
    }
    tracing::debug!("invalid request (untrusted address {})", request.peer);
    text(StatusCode::FORBIDDEN, "Access denied")
}

fn status(ctx: &ServerCtx) -> Response<Body> {
    text(StatusCode::OK, &format!("status: {}", ctx.handle.status()))
}

/// Serve a content-addressed deploy file part.
///
/// The path is derived from the first eight digest characters
/// (`a/b/cdefgh`), and the body is only served when its own SHA-512
/// matches the requested digest.
async fn deploy_get_file(ctx: &ServerCtx, sha512: &str) -> Response<Body> {
    if sha512.len() != 128 || !sha512.bytes().all(|b| b.is_ascii_hexdigit()) {
        return text(StatusCode::NOT_FOUND, "Not found");
    }
    let subpath: PathBuf = [&sha512[0..1], &sha512[1..2], &sha512[2..8], sha512]
        .iter()
        .collect();

    for storage_dir in ctx.handle.storage_dirs() {
        let shared = storage_dir.join("deploy").join("fileparts").join("shared");
        let Ok(entries) = std::fs::read_dir(&shared) else {
            continue;
        };
        for entry in entries.flatten() {
            let candidate = entry.path().join(&subpath);
            if !candidate.is_file() {
                continue;
            }
            let Ok(bytes) = tokio::fs::read(&candidate).await else {
                continue;
            };
            let digest = format!("{:x}", Sha512::digest(&bytes));
            if digest == sha512 {
                #[allow(clippy::expect_used)]
                return Response::builder()
                    .status(StatusCode::OK)
                    .header(hyper::header::CONTENT_TYPE, "application/octet-stream")
                    .body(Body::from(bytes))
                    .expect("static response is valid");
            }
            tracing::debug!("filepart {} digest mismatch", candidate.display());
        }
    }
    text(StatusCode::NOT_FOUND, "Not found")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
pub(crate) mod tests;
