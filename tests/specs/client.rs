// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol client behavior against a scripted server.

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use parking_lot::Mutex;
use qm_proto::{Client, ClientError, ClientOptions, Pending};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    path: String,
    authorization: Option<String>,
}

type Log = Arc<Mutex<Vec<Seen>>>;

/// Start a scripted server; the handler decides the response from the
/// request log so far.
async fn scripted_server<F>(handler: F) -> (String, Log)
where
    F: Fn(&Seen, usize) -> Response<Body> + Send + Sync + Clone + 'static,
{
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let service_log = Arc::clone(&log);
    let make_service = make_service_fn(move |_| {
        let handler = handler.clone();
        let log = Arc::clone(&service_log);
        async move {
            Ok::<_, Infallible>(service_fn(move |request: Request<Body>| {
                let handler = handler.clone();
                let log = Arc::clone(&log);
                async move {
                    let seen = Seen {
                        method: request.method().to_string(),
                        path: request.uri().path().to_string(),
                        authorization: request
                            .headers()
                            .get(hyper::header::AUTHORIZATION)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string),
                    };
                    let index = {
                        let mut log = log.lock();
                        log.push(seen.clone());
                        log.len() - 1
                    };
                    Ok::<_, Infallible>(handler(&seen, index))
                }
            }))
        }
    });

    let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
    let server = Server::bind(&addr).serve(make_service);
    let local = server.local_addr();
    tokio::spawn(server);
    (format!("http://{local}/"), log)
}

fn json_response(status: StatusCode, body: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn client(options: ClientOptions) -> Client {
    Client::new(uuid_for_tests(), None, options).unwrap()
}

fn uuid_for_tests() -> uuid::Uuid {
    uuid::Uuid::new_v4()
}

#[tokio::test]
async fn pending_then_ok_retries_once_as_get() {
    let (url, log) = scripted_server(|seen, _| {
        if seen.method == "POST" {
            json_response(StatusCode::OK, r#"{"status":"pending","expiration":1}"#)
        } else {
            json_response(StatusCode::OK, r#"{"status":"ok"}"#)
        }
    })
    .await;

    let started = Instant::now();
    let answer = client(ClientOptions::default())
        .send(&url, &serde_json::json!({"action": "contact"}), Pending::Retry)
        .await
        .unwrap();

    assert_eq!(answer.status, qm_proto::AnswerStatus::Ok);
    // One pending sleep of the advertised second
    assert!(started.elapsed().as_millis() >= 1_000);
    let log = log.lock();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].method, "POST");
    assert_eq!(log[1].method, "GET");
}

#[tokio::test]
async fn pending_pass_returns_pending_answer() {
    let (url, log) = scripted_server(|_, _| {
        json_response(StatusCode::OK, r#"{"status":"pending","expiration":30}"#)
    })
    .await;

    let answer = client(ClientOptions::default())
        .send(&url, &serde_json::json!({"action": "contact"}), Pending::Pass)
        .await
        .unwrap();

    assert_eq!(answer.status, qm_proto::AnswerStatus::Pending);
    assert_eq!(log.lock().len(), 1);
}

#[tokio::test]
async fn pending_budget_is_twelve_retries() {
    let (url, log) = scripted_server(|_, _| {
        json_response(StatusCode::OK, r#"{"status":"pending","expiration":0}"#)
    })
    .await;

    let result = client(ClientOptions::default())
        .send(&url, &serde_json::json!({"action": "contact"}), Pending::Retry)
        .await;

    assert!(matches!(result, Err(ClientError::TooManyPending)));
    // The initial POST plus twelve GET retries
    assert_eq!(log.lock().len(), 13);
}

#[tokio::test]
async fn server_error_status_is_surfaced() {
    let (url, _log) = scripted_server(|_, _| {
        json_response(
            StatusCode::OK,
            r#"{"status":"error","message":"inventory is disabled"}"#,
        )
    })
    .await;

    let result = client(ClientOptions::default())
        .send(&url, &serde_json::json!({"action": "inventory"}), Pending::Retry)
        .await;

    match result {
        Err(ClientError::ServerError(message)) => {
            assert!(message.contains("inventory is disabled"));
        }
        other => panic!("expected server error, got {other:?}"),
    }
}

#[tokio::test]
async fn oauth_refresh_on_401_caches_token() {
    let (url, log) = scripted_server(|seen, _| match seen.path.as_str() {
        "/api.php/token" => json_response(
            StatusCode::OK,
            r#"{"token_type":"Bearer","access_token":"T","expires_in":60}"#,
        ),
        _ => match seen.authorization.as_deref() {
            Some("Bearer T") => json_response(StatusCode::OK, r#"{"status":"ok"}"#),
            _ => json_response(StatusCode::UNAUTHORIZED, r#"{"status":"error"}"#),
        },
    })
    .await;

    let options = ClientOptions {
        oauth_client_id: Some("client-id".to_string()),
        oauth_client_secret: Some("client-secret".to_string()),
        ..ClientOptions::default()
    };

    let message = serde_json::json!({"action": "inventory"});
    let answer = client(options.clone()).send(&url, &message, Pending::Retry).await.unwrap();
    assert_eq!(answer.status, qm_proto::AnswerStatus::Ok);

    let token_requests = |log: &Log| {
        log.lock()
            .iter()
            .filter(|seen| seen.path == "/api.php/token")
            .count()
    };
    assert_eq!(token_requests(&log), 1);

    // A later send inside the TTL reuses the cached token
    let answer = client(options).send(&url, &message, Pending::Retry).await.unwrap();
    assert_eq!(answer.status, qm_proto::AnswerStatus::Ok);
    assert_eq!(token_requests(&log), 1);

    // The cached token was attached up front: no second 401 round-trip
    let log = log.lock();
    let last = log.last().unwrap();
    assert_eq!(last.authorization.as_deref(), Some("Bearer T"));
}

#[tokio::test]
async fn basic_auth_retry_on_401() {
    let (url, log) = scripted_server(|seen, _| match seen.authorization.as_deref() {
        Some(auth) if auth.starts_with("Basic ") => {
            json_response(StatusCode::OK, r#"{"status":"ok"}"#)
        }
        _ => json_response(StatusCode::UNAUTHORIZED, r#"{"status":"error"}"#),
    })
    .await;

    let options = ClientOptions {
        user: Some("agent".to_string()),
        password: Some("secret".to_string()),
        ..ClientOptions::default()
    };
    let answer = client(options)
        .send(&url, &serde_json::json!({"action": "contact"}), Pending::Retry)
        .await
        .unwrap();

    assert_eq!(answer.status, qm_proto::AnswerStatus::Ok);
    assert_eq!(log.lock().len(), 2);
}

#[tokio::test]
async fn missing_credentials_is_an_auth_error() {
    let (url, _log) = scripted_server(|_, _| {
        json_response(StatusCode::UNAUTHORIZED, r#"{"status":"error"}"#)
    })
    .await;

    let result = client(ClientOptions::default())
        .send(&url, &serde_json::json!({"action": "contact"}), Pending::Retry)
        .await;

    match result {
        Err(ClientError::AuthRequired(message)) => {
            assert!(message.contains("no credentials available"));
        }
        other => panic!("expected auth error, got {other:?}"),
    }
}
