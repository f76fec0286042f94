// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener lifecycle and request dispatch.

use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Request, Response};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::handlers;
use crate::plugin::{Plugin, PluginRequest};
use crate::trust::TrustCache;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 62_354;

/// Keep-alive requests served per connection before closing.
const MAX_KEEPALIVE: u32 = 8;

/// Errors from the embedded server
#[derive(Debug, Error)]
pub enum HttpdError {
    #[error("failed to start server: {0}")]
    Bind(std::io::Error),
    #[error("ssl plugin error: {0}")]
    Ssl(String),
}

/// What the server needs from the agent runtime.
///
/// Handlers carry this handle instead of a back-pointer into the
/// runtime; the runtime implements it over its target arena.
pub trait AgentHandle: Send + Sync {
    /// Agent status string for `/status`.
    fn status(&self) -> String;

    /// Server target URLs, in target order.
    fn server_urls(&self) -> Vec<String>;

    /// Human descriptions of all targets, for the trusted index page.
    fn target_descriptions(&self) -> Vec<String>;

    /// Per-target storage directories, for deploy filepart lookups.
    fn storage_dirs(&self) -> Vec<PathBuf>;

    /// Advance the server target with this URL to run now.
    fn run_now_url(&self, url: &str);

    /// Advance every target to run now.
    fn run_now_all(&self);
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpdConfig {
    pub ip: IpAddr,
    pub port: u16,
    pub trust: Vec<String>,
}

impl Default for HttpdConfig {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            trust: Vec::new(),
        }
    }
}

pub(crate) struct ServerCtx {
    pub handle: Arc<dyn AgentHandle>,
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub trust: Arc<TrustCache>,
}

/// The embedded HTTP server.
pub struct Server {
    config: HttpdConfig,
    ctx: Arc<ServerCtx>,
    shutdown: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    bound: Vec<SocketAddr>,
}

impl Server {
    pub fn new(
        config: HttpdConfig,
        handle: Arc<dyn AgentHandle>,
        mut plugins: Vec<Arc<dyn Plugin>>,
    ) -> Self {
        // Dispatch order is priority descending
        plugins.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        let trust = Arc::new(TrustCache::new(config.trust.clone(), handle.server_urls()));
        Self {
            config,
            ctx: Arc::new(ServerCtx { handle, plugins, trust }),
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
            bound: Vec::new(),
        }
    }

    /// The addresses actually bound, main listener first.
    pub fn bound_addrs(&self) -> &[SocketAddr] {
        &self.bound
    }

    pub fn trust(&self) -> Arc<TrustCache> {
        Arc::clone(&self.ctx.trust)
    }

    /// Bind all listeners and start serving.
    ///
    /// A bind failure is fatal to the server component only; the agent
    /// continues without it.
    pub async fn init(&mut self) -> Result<(), HttpdError> {
        let mut listeners: Vec<(SocketAddr, Option<tokio_rustls::TlsAcceptor>)> = Vec::new();
        let main_addr = SocketAddr::new(self.config.ip, self.config.port);
        listeners.push((main_addr, self.acceptor_for(self.config.port)));

        for plugin in &self.ctx.plugins {
            if plugin.disabled() {
                continue;
            }
            if let Err(e) = plugin.init() {
                tracing::error!("plugin {} failed to initialize: {e}", plugin.name());
                continue;
            }
            if let Some(port) = plugin.port() {
                if port != self.config.port {
                    listeners.push((SocketAddr::new(self.config.ip, port), self.acceptor_for(port)));
                }
            }
        }

        for (addr, acceptor) in listeners {
            let listener = TcpListener::bind(addr).await.map_err(HttpdError::Bind)?;
            #[allow(clippy::expect_used)]
            let local = listener.local_addr().expect("bound listener has an address");
            tracing::info!("listening on {local}");
            self.bound.push(local);
            self.tasks
                .push(tokio::spawn(Self::accept_loop(
                    listener,
                    acceptor,
                    Arc::clone(&self.ctx),
                    self.shutdown.clone(),
                )));
        }

        self.tasks.push(tokio::spawn(Self::timer_loop(
            Arc::clone(&self.ctx),
            self.shutdown.clone(),
        )));
        Ok(())
    }

    fn acceptor_for(&self, port: u16) -> Option<tokio_rustls::TlsAcceptor> {
        self.ctx
            .plugins
            .iter()
            .filter(|plugin| !plugin.disabled() && plugin.wraps_port(port))
            .find_map(|plugin| plugin.tls_acceptor())
    }

    async fn accept_loop(
        listener: TcpListener,
        acceptor: Option<tokio_rustls::TlsAcceptor>,
        ctx: Arc<ServerCtx>,
        shutdown: CancellationToken,
    ) {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::debug!("accept error: {e}");
                    continue;
                }
            };
            let ctx = Arc::clone(&ctx);
            let acceptor = acceptor.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let served = AtomicU32::new(0);
                let service = service_fn(move |request| {
                    let ctx = Arc::clone(&ctx);
                    let count = served.fetch_add(1, Ordering::Relaxed) + 1;
                    async move { handle_request(ctx, peer, request, count).await }
                });
                let result = match acceptor {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(tls) => Http::new().serve_connection(tls, service).await,
                        Err(e) => {
                            tracing::debug!("tls handshake with {peer} failed: {e}");
                            return;
                        }
                    },
                    None => Http::new().serve_connection(stream, service).await,
                };
                if let Err(e) = result {
                    if !shutdown.is_cancelled() {
                        tracing::debug!("connection from {peer} ended: {e}");
                    }
                }
            });
        }
    }

    async fn timer_loop(ctx: Arc<ServerCtx>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let now = Instant::now();
            for plugin in &ctx.plugins {
                if let Some(when) = plugin.timer_event() {
                    if when <= now {
                        plugin.on_timer();
                    }
                }
            }
        }
    }

    /// True when the new parameters require rebinding: the address
    /// changed, or any plugin's enabled state or port changed.
    /// Otherwise the trust inputs are updated in place.
    pub fn need_to_restart(&self, config: &HttpdConfig, plugins: &[Arc<dyn Plugin>]) -> bool {
        if config.ip != self.config.ip || config.port != self.config.port {
            return true;
        }
        let current: Vec<(&str, bool, Option<u16>)> = self
            .ctx
            .plugins
            .iter()
            .map(|p| (p.name(), p.disabled(), p.port()))
            .collect();
        let proposed: Vec<(&str, bool, Option<u16>)> = plugins
            .iter()
            .map(|p| (p.name(), p.disabled(), p.port()))
            .collect();
        if current != proposed {
            return true;
        }
        self.ctx
            .trust
            .update(config.trust.clone(), self.ctx.handle.server_urls());
        false
    }

    /// Stop accepting and drain.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
        self.bound.clear();
    }
}

pub(crate) async fn handle_request(
    ctx: Arc<ServerCtx>,
    peer: SocketAddr,
    request: Request<Body>,
    served: u32,
) -> Result<Response<Body>, Infallible> {
    let trusted = ctx.trust.is_trusted(peer.ip());
    let plugin_request = PluginRequest {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        peer: peer.ip(),
        trusted,
    };

    let mut response = None;
    for plugin in &ctx.plugins {
        if plugin.disabled() {
            continue;
        }
        if let Some(handled) = plugin.handle(&plugin_request).await {
            response = Some(handled);
            break;
        }
    }
    let mut response =
        match response {
            Some(response) => response,
            None => handlers::builtin(&ctx, &plugin_request).await,
        };

    if served >= MAX_KEEPALIVE {
        response
            .headers_mut()
            .insert(hyper::header::CONNECTION, hyper::header::HeaderValue::from_static("close"));
    }
    Ok(response)
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
