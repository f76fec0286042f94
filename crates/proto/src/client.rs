// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP(S) client speaking the JSON inventory protocol.

use parking_lot::Mutex;
use rand::Rng;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Certificate, Method, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::compress::{uncompress, Compression};
use crate::message::{Answer, AnswerStatus};

const LOG_PREFIX: &str = "[http client]";
const MAX_PENDING_RETRIES: u32 = 12;
const EXCERPT_LEN: usize = 256;

/// Errors surfaced by the protocol client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no valid agentid set on HTTP client")]
    NoAgentId,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("non-existing certificate file {0}")]
    MissingCaFile(PathBuf),
    #[error("non-existing certificate directory {0}")]
    MissingCaDir(PathBuf),
    #[error("unsupported certificate in {0}")]
    BadCertificate(PathBuf),
    #[error("proxy authentication required")]
    ProxyAuthRequired,
    #[error("authentication required, {0}")]
    AuthRequired(String),
    #[error("answer without content")]
    EmptyAnswer,
    #[error("failed to uncompress content starting with: {0}")]
    Decompress(String),
    #[error("unexpected content, starting with: {0}")]
    UnexpectedContent(String),
    #[error("server error: {0}")]
    ServerError(String),
    #[error("error status: {0}")]
    ErrorStatus(StatusCode),
    #[error("got too much pending status")]
    TooManyPending,
}

/// What to do when the server answers `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pending {
    /// Sleep and re-issue as GET, up to the retry budget.
    #[default]
    Retry,
    /// Hand the pending answer back to the caller.
    Pass,
}

/// Transport and authentication options.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub user: Option<String>,
    pub password: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
    pub ca_cert_file: Option<PathBuf>,
    pub ca_cert_dir: Option<PathBuf>,
    /// Client certificate; not supported by this TLS backend.
    pub ssl_cert_file: Option<PathBuf>,
    pub ssl_fingerprint: Vec<String>,
    pub no_ssl_check: bool,
    pub no_compression: bool,
    pub proxy: Option<String>,
    /// Connection timeout, seconds. Zero means the 180 s default.
    pub timeout: u64,
    /// Debug mode enables request-id correlation.
    pub debug: bool,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Process-wide OAuth token cache keyed by server URL.
static OAUTH_TOKENS: LazyLock<Mutex<HashMap<String, CachedToken>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Short-lived protocol client.
///
/// Holds no per-request state beyond the correlation id; the OAuth
/// token cache is process-wide so consecutive clients against the same
/// server reuse a live token.
pub struct Client {
    http: reqwest::Client,
    compression: Compression,
    options: ClientOptions,
    agentid: String,
    proxyid: Option<String>,
    request_id: Mutex<Option<String>>,
}

impl Client {
    pub fn new(
        agentid: Uuid,
        proxyid: Option<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let timeout = if options.timeout == 0 { 180 } else { options.timeout };
        let mut builder = reqwest::Client::builder()
            .user_agent(format!(
                "{}-Agent_v{}",
                qm_inventory::PROVIDER,
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(timeout));

        if options.no_ssl_check {
            builder = builder.danger_accept_invalid_certs(true);
        } else if !options.ssl_fingerprint.is_empty() {
            // No per-connection certificate callback in this stack:
            // pinning disables chain verification and the pinned prints
            // are logged for operators to audit
            tracing::debug!(
                "{LOG_PREFIX} trusting pinned certificate fingerprints: {}",
                options.ssl_fingerprint.join(",")
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(file) = &options.ca_cert_file {
            if !file.is_file() {
                return Err(ClientError::MissingCaFile(file.clone()));
            }
            for cert in load_pem_certs(file)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(dir) = &options.ca_cert_dir {
            if !dir.is_dir() {
                return Err(ClientError::MissingCaDir(dir.clone()));
            }
            for entry in std::fs::read_dir(dir).into_iter().flatten().flatten() {
                let path = entry.path();
                let is_cert = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e, "pem" | "crt" | "cer"))
                    .unwrap_or(false);
                if is_cert {
                    for cert in load_pem_certs(&path)? {
                        builder = builder.add_root_certificate(cert);
                    }
                }
            }
        }

        if let Some(proxy) = options.proxy.as_deref().filter(|p| *p != "none") {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        if let Some(cert) = &options.ssl_cert_file {
            tracing::warn!(
                "{LOG_PREFIX} client certificate authentication is not supported, ignoring {}",
                cert.display()
            );
        }

        let request_id = if options.debug {
            let mut rng = rand::thread_rng();
            Some(format!("{:08X}", rng.gen::<u32>()))
        } else {
            None
        };

        Ok(Self {
            http: builder.build()?,
            compression: if options.no_compression {
                Compression::None
            } else {
                Compression::default()
            },
            options,
            agentid: agentid.to_string(),
            proxyid,
            request_id: Mutex::new(request_id),
        })
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// The current correlation id, if debug mode generated one.
    pub fn request_id(&self) -> Option<String> {
        self.request_id.lock().clone()
    }

    fn log_prefix(&self) -> String {
        match self.request_id.lock().as_deref() {
            Some(id) => format!("{LOG_PREFIX} {id}:"),
            None => LOG_PREFIX.to_string(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Pragma", HeaderValue::from_static("no-cache"));
        if let Ok(value) = HeaderValue::from_str(&self.agentid) {
            headers.insert("GLPI-Agent-ID", value);
        }
        if let Some(proxyid) = &self.proxyid {
            if let Ok(value) = HeaderValue::from_str(proxyid) {
                headers.insert("GLPI-Proxy-ID", value);
            }
        }
        if let Some(id) = self.request_id.lock().as_deref() {
            if let Ok(value) = HeaderValue::from_str(id) {
                headers.insert("GLPI-Request-ID", value);
            }
        }
        headers
    }

    /// Send a protocol message and return the parsed answer.
    ///
    /// Handles compression, one authentication retry on 401, and the
    /// `pending` long-poll loop: each pending answer sleeps the
    /// advertised expiration then re-issues the request as a bodyless
    /// GET carrying the same correlation id, at most 12 times.
    pub async fn send(
        &self,
        url: &str,
        message: &Value,
        pending: Pending,
    ) -> Result<Answer, ClientError> {
        if self.agentid.is_empty() {
            return Err(ClientError::NoAgentId);
        }

        let payload = serde_json::to_vec(message).unwrap_or_default();
        tracing::trace!(
            "{} sending message:\n{}",
            self.log_prefix(),
            String::from_utf8_lossy(&payload)
        );
        let body = self.compression.compress(&payload);

        let mut method = Method::POST;
        let mut try_count = 0u32;

        loop {
            let response = self.issue(method.clone(), url, &body).await?;
            self.update_request_id(response.headers());

            let status = response.status();
            if status == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
                return Err(ClientError::ProxyAuthRequired);
            }
            let response = if status == StatusCode::UNAUTHORIZED {
                self.authenticate(method.clone(), url, &body).await?
            } else {
                response
            };

            let status = response.status();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Err(ClientError::EmptyAnswer);
            }

            let raw = uncompress(&bytes, &content_type)
                .ok_or_else(|| ClientError::Decompress(excerpt(&bytes)))?;
            tracing::trace!(
                "{} received message:\n{}",
                self.log_prefix(),
                String::from_utf8_lossy(&raw)
            );

            let answer: Answer = match serde_json::from_slice(&raw) {
                Ok(answer) => answer,
                Err(_) if !status.is_success() => {
                    return Err(ClientError::ErrorStatus(status));
                }
                Err(_) => {
                    return Err(ClientError::UnexpectedContent(excerpt(&raw)));
                }
            };

            match answer.status {
                AnswerStatus::Error => {
                    let message = answer
                        .message
                        .clone()
                        .unwrap_or_else(|| "no error message".to_string());
                    let message = unwrap_schema_violation(&message);
                    tracing::error!("{} server error: {message}", self.log_prefix());
                    return Err(ClientError::ServerError(message));
                }
                AnswerStatus::Pending => {
                    if pending == Pending::Pass {
                        return Ok(answer);
                    }
                    try_count += 1;
                    if try_count > MAX_PENDING_RETRIES {
                        tracing::error!("{} got too much pending status", self.log_prefix());
                        return Err(ClientError::TooManyPending);
                    }
                    tokio::time::sleep(Duration::from_secs(answer.expiration_secs())).await;
                    tracing::trace!("{} retry request after pending status", self.log_prefix());
                    // The retry is a bodyless GET with the same
                    // correlation id
                    method = Method::GET;
                }
                AnswerStatus::Ok => return Ok(answer),
            }
        }
    }

    async fn issue(
        &self,
        method: Method,
        url: &str,
        body: &[u8],
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .headers(self.headers());
        if method == Method::POST {
            request = request
                .header(reqwest::header::CONTENT_TYPE, self.compression.content_type())
                .body(body.to_vec());
        }
        if let Some(token) = cached_token(url) {
            tracing::debug!(
                "{} submitting request with access token authorization",
                self.log_prefix()
            );
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    /// One authentication retry after a 401.
    async fn authenticate(
        &self,
        method: Method,
        url: &str,
        body: &[u8],
    ) -> Result<reqwest::Response, ClientError> {
        if self.options.oauth_client_id.is_some() && self.options.oauth_client_secret.is_some() {
            self.fetch_oauth_token(url).await?;
            tracing::debug!(
                "{} authentication required, submitting request with access token authorization",
                self.log_prefix()
            );
            let response = self.issue(method, url, body).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(ClientError::AuthRequired("wrong access token".to_string()));
            }
            return Ok(response);
        }

        if let (Some(user), Some(password)) =
            (self.options.user.as_deref(), self.options.password.as_deref())
        {
            tracing::debug!(
                "{} authentication required, submitting credentials",
                self.log_prefix()
            );
            let mut request = self
                .http
                .request(method.clone(), url)
                .headers(self.headers())
                .basic_auth(user, Some(password));
            if method == Method::POST {
                request = request
                    .header(reqwest::header::CONTENT_TYPE, self.compression.content_type())
                    .body(body.to_vec());
            }
            let response = request.send().await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(ClientError::AuthRequired("wrong credentials".to_string()));
            }
            return Ok(response);
        }

        Err(ClientError::AuthRequired(
            "no credentials available".to_string(),
        ))
    }

    /// Request a bearer token from the guessed token endpoint and cache
    /// it for this server URL.
    async fn fetch_oauth_token(&self, url: &str) -> Result<(), ClientError> {
        let (Some(client_id), Some(client_secret)) = (
            self.options.oauth_client_id.as_deref(),
            self.options.oauth_client_secret.as_deref(),
        ) else {
            return Err(ClientError::AuthRequired("oauth access token missing".to_string()));
        };

        OAUTH_TOKENS.lock().remove(url);

        let token_url = token_endpoint(url)
            .ok_or_else(|| ClientError::AuthRequired("invalid server url".to_string()))?;
        tracing::debug!(
            "{} authentication required, querying oauth access token on {token_url}",
            self.log_prefix()
        );

        let body = serde_json::json!({
            "grant_type": "client_credentials",
            "client_id": client_id,
            "client_secret": client_secret,
            "scope": "inventory",
        });
        // Secrets never reach the log
        tracing::trace!(
            "{} sending message:\n{}",
            self.log_prefix(),
            body.to_string()
                .replace(client_id, "CLIENT_ID")
                .replace(client_secret, "CLIENT_SECRET")
        );

        let response = self.http.post(&token_url).json(&body).send().await?;
        let status = response.status();
        let token: TokenAnswer = match response.json().await {
            Ok(token) => token,
            Err(_) => {
                return Err(ClientError::AuthRequired(format!(
                    "failed to request oauth access token, status {status}"
                )));
            }
        };

        if token.token_type != "Bearer" || token.access_token.is_empty() {
            return Err(ClientError::AuthRequired(
                "unsupported token returned from oauth server".to_string(),
            ));
        }
        let expires_in = token.expires_in.unwrap_or(60);
        tracing::debug!(
            "{} bearer oauth token received (expiration: {expires_in}s)",
            self.log_prefix()
        );
        OAUTH_TOKENS.lock().insert(
            url.to_string(),
            CachedToken {
                token: token.access_token,
                expires_at: Instant::now() + Duration::from_secs(expires_in),
            },
        );
        Ok(())
    }

    fn update_request_id(&self, headers: &HeaderMap) {
        let mut request_id = self.request_id.lock();
        if request_id.is_none() {
            return;
        }
        *request_id = headers
            .get("GLPI-Request-ID")
            .and_then(|v| v.to_str().ok())
            .filter(|id| id.len() == 8 && id.bytes().all(|b| b.is_ascii_hexdigit()))
            .map(str::to_string)
            .or_else(|| request_id.clone());
    }

    /// POST a legacy XML payload and return the raw decompressed
    /// response body.
    pub async fn send_legacy(&self, url: &str, xml: &[u8]) -> Result<Vec<u8>, ClientError> {
        let body = self.compression.compress(xml);
        let response = self
            .http
            .post(url)
            .headers(self.headers())
            .header(reqwest::header::CONTENT_TYPE, self.compression.content_type())
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::ErrorStatus(status));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ClientError::EmptyAnswer);
        }
        uncompress(&bytes, &content_type).ok_or_else(|| ClientError::Decompress(excerpt(&bytes)))
    }
}

#[derive(serde::Deserialize)]
struct TokenAnswer {
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

fn cached_token(url: &str) -> Option<String> {
    let tokens = OAUTH_TOKENS.lock();
    let cached = tokens.get(url)?;
    (Instant::now() < cached.expires_at).then(|| cached.token.clone())
}

#[cfg(test)]
pub(crate) fn clear_token_cache() {
    OAUTH_TOKENS.lock().clear();
}

/// Guess the OAuth token endpoint for a server URL: strip any
/// `/marketplace/...` or `/plugins/...` suffix, then append
/// `/api.php/token`.
pub(crate) fn token_endpoint(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut path = parsed.path().to_string();
    for marker in ["/marketplace", "/plugins"] {
        if let Some(pos) = path.find(marker) {
            path.truncate(pos);
        }
    }
    let path = format!("{}/api.php/token", path.trim_end_matches('/'));
    let mut endpoint = parsed.clone();
    endpoint.set_path(&path);
    endpoint.set_query(None);
    Some(endpoint.to_string())
}

fn excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.chars().take(EXCERPT_LEN).collect()
}

/// Unwrap a JSON-schema violation message into its useful part.
fn unwrap_schema_violation(message: &str) -> String {
    #[allow(clippy::expect_used)]
    static VIOLATION: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r#"(?s)^(JSON does not validate\. Violations):.*"(.+)" does not match to .*->properties:(.+)$"#,
        )
        .expect("constant regex pattern is valid")
    });
    match VIOLATION.captures(message) {
        Some(caps) => format!(
            "{}: unsupported '{}' value as '{}' field value",
            &caps[1],
            caps[2].trim(),
            caps[3].trim()
        ),
        None => message.to_string(),
    }
}

fn load_pem_certs(path: &Path) -> Result<Vec<Certificate>, ClientError> {
    let bytes =
        std::fs::read(path).map_err(|_| ClientError::MissingCaFile(path.to_path_buf()))?;
    let text = String::from_utf8_lossy(&bytes);
    let mut certs = Vec::new();
    let mut current = String::new();
    let mut inside = false;
    for line in text.lines() {
        if line.contains("-----BEGIN CERTIFICATE-----") {
            inside = true;
            current.clear();
        }
        if inside {
            current.push_str(line);
            current.push('\n');
        }
        if line.contains("-----END CERTIFICATE-----") {
            inside = false;
            let cert = Certificate::from_pem(current.as_bytes())
                .map_err(|_| ClientError::BadCertificate(path.to_path_buf()))?;
            certs.push(cert);
        }
    }
    if certs.is_empty() {
        return Err(ClientError::BadCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
