// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server plugins.
//!
//! Plugins are tried per request in descending priority before the
//! built-in routes. A plugin advertising a non-default port gets its
//! own listener; the SSL plugin wraps a listener instead of serving
//! routes.

use async_trait::async_trait;
use hyper::{Body, Response};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_rustls::TlsAcceptor;

use crate::server::HttpdError;

/// The request view handed to plugins.
#[derive(Debug, Clone)]
pub struct PluginRequest {
    pub method: String,
    pub path: String,
    pub peer: IpAddr,
    pub trusted: bool,
}

/// A server plugin.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Dispatch order; higher runs first.
    fn priority(&self) -> i32 {
        0
    }

    /// A non-default port gives this plugin its own listener.
    fn port(&self) -> Option<u16> {
        None
    }

    fn disabled(&self) -> bool {
        false
    }

    fn init(&self) -> Result<(), HttpdError> {
        Ok(())
    }

    /// Handle the request, or None to fall through.
    async fn handle(&self, request: &PluginRequest) -> Option<Response<Body>>;

    /// When this plugin next wants its timer fired.
    fn timer_event(&self) -> Option<Instant> {
        None
    }

    fn on_timer(&self) {}

    /// A TLS acceptor when this plugin wraps listeners.
    fn tls_acceptor(&self) -> Option<TlsAcceptor> {
        None
    }

    /// True when this plugin wraps the listener on `port`.
    fn wraps_port(&self, _port: u16) -> bool {
        false
    }
}

/// TLS listener wrap.
///
/// Loads a PEM certificate chain and private key at init; the server
/// wraps accepted connections on the plugin's ports with the acceptor.
pub struct SslPlugin {
    cert_file: PathBuf,
    key_file: PathBuf,
    ports: Vec<u16>,
    acceptor: parking_lot::Mutex<Option<TlsAcceptor>>,
}

impl SslPlugin {
    pub fn new(cert_file: PathBuf, key_file: PathBuf, ports: Vec<u16>) -> Self {
        Self {
            cert_file,
            key_file,
            ports,
            acceptor: parking_lot::Mutex::new(None),
        }
    }

    /// Ports whose listeners this plugin wraps.
    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    fn load(&self) -> Result<TlsAcceptor, HttpdError> {
        let certs = {
            let mut reader = std::io::BufReader::new(
                std::fs::File::open(&self.cert_file)
                    .map_err(|e| HttpdError::Ssl(format!("can't read certificate: {e}")))?,
            );
            rustls_pemfile::certs(&mut reader)
                .map_err(|e| HttpdError::Ssl(format!("bad certificate: {e}")))?
                .into_iter()
                .map(rustls::Certificate)
                .collect::<Vec<_>>()
        };
        if certs.is_empty() {
            return Err(HttpdError::Ssl("no certificate found".to_string()));
        }

        let key = {
            let mut reader = std::io::BufReader::new(
                std::fs::File::open(&self.key_file)
                    .map_err(|e| HttpdError::Ssl(format!("can't read key: {e}")))?,
            );
            let mut keys = rustls_pemfile::pkcs8_private_keys(&mut reader)
                .map_err(|e| HttpdError::Ssl(format!("bad key: {e}")))?;
            match keys.pop() {
                Some(key) => rustls::PrivateKey(key),
                None => return Err(HttpdError::Ssl("no private key found".to_string())),
            }
        };

        let config = rustls::ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| HttpdError::Ssl(e.to_string()))?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

#[async_trait]
impl Plugin for SslPlugin {
    fn name(&self) -> &'static str {
        "ssl"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn init(&self) -> Result<(), HttpdError> {
        let acceptor = self.load()?;
        *self.acceptor.lock() = Some(acceptor);
        Ok(())
    }

    async fn handle(&self, _request: &PluginRequest) -> Option<Response<Body>> {
        None
    }

    fn tls_acceptor(&self) -> Option<TlsAcceptor> {
        self.acceptor.lock().clone()
    }

    fn wraps_port(&self, port: u16) -> bool {
        self.ports.contains(&port)
    }
}
