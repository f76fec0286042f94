// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trust evaluation with cached address resolution.
//!
//! The trust set is the union of every configured server URL's
//! resolved addresses and the `httpd-trust` entries (plain IPs and
//! CIDRs). Resolutions are cached and revalidated lazily after 60 s.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, ToSocketAddrs};
use std::time::{Duration, Instant};
use url::Url;

const TRUSTED_CACHE_TIMEOUT: Duration = Duration::from_secs(60);

/// One compiled trust source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrustSpec {
    Single(IpAddr),
    /// Network address plus prefix length.
    Cidr(IpAddr, u8),
}

impl TrustSpec {
    pub(crate) fn matches(&self, addr: IpAddr) -> bool {
        match self {
            TrustSpec::Single(ip) => *ip == addr,
            TrustSpec::Cidr(network, prefix) => in_network(addr, *network, *prefix),
        }
    }
}

fn ip_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn in_network(addr: IpAddr, network: IpAddr, prefix: u8) -> bool {
    let width: u8 = match network {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    if addr.is_ipv4() != network.is_ipv4() || prefix > width {
        return false;
    }
    if prefix == 0 {
        return true;
    }
    let shift = u32::from(width - prefix);
    (ip_bits(addr) >> shift) == (ip_bits(network) >> shift)
}

/// Compile a trust string: IP literal, CIDR, or resolvable hostname.
pub(crate) fn compile_address(input: &str) -> Vec<TrustSpec> {
    let input = input.trim();
    if input.is_empty() {
        return Vec::new();
    }
    if let Some((network, prefix)) = input.split_once('/') {
        if let (Ok(network), Ok(prefix)) = (network.parse::<IpAddr>(), prefix.parse::<u8>()) {
            return vec![TrustSpec::Cidr(network, prefix)];
        }
        return Vec::new();
    }
    if let Ok(ip) = input.parse::<IpAddr>() {
        return vec![TrustSpec::Single(ip)];
    }
    // Hostname; port is irrelevant for resolution
    match (input, 0u16).to_socket_addrs() {
        Ok(addrs) => addrs.map(|a| TrustSpec::Single(a.ip())).collect(),
        Err(_) => Vec::new(),
    }
}

/// Host part of a server URL, for resolution.
pub(crate) fn url_host(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

#[derive(Default)]
struct CacheState {
    /// source string → compiled addresses
    entries: HashMap<String, Vec<TrustSpec>>,
    expires_at: Option<Instant>,
}

/// Lazily revalidated trust set.
pub struct TrustCache {
    /// `httpd-trust` inputs.
    trust_inputs: Mutex<Vec<String>>,
    /// Configured server URLs, trusted implicitly.
    server_urls: Mutex<Vec<String>>,
    state: Mutex<CacheState>,
}

impl TrustCache {
    pub fn new(trust_inputs: Vec<String>, server_urls: Vec<String>) -> Self {
        Self {
            trust_inputs: Mutex::new(trust_inputs),
            server_urls: Mutex::new(server_urls),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Swap the inputs in place, invalidating the cache.
    pub fn update(&self, trust_inputs: Vec<String>, server_urls: Vec<String>) {
        *self.trust_inputs.lock() = trust_inputs;
        *self.server_urls.lock() = server_urls;
        self.state.lock().expires_at = None;
    }

    fn refresh_if_stale(&self) {
        let mut state = self.state.lock();
        if let Some(expires_at) = state.expires_at {
            if Instant::now() <= expires_at {
                return;
            }
        }

        let mut lost: HashMap<String, ()> =
            state.entries.keys().map(|k| (k.clone(), ())).collect();
        let mut entries: HashMap<String, Vec<TrustSpec>> = HashMap::new();

        for url in self.server_urls.lock().iter() {
            let Some(host) = url_host(url) else { continue };
            if entries.contains_key(url) {
                continue;
            }
            let addresses = compile_address(&host);
            if !addresses.is_empty() {
                tracing::debug!("trusted target ip: {addresses:?}");
                lost.remove(url);
                entries.insert(url.clone(), addresses);
            }
        }
        for input in self.trust_inputs.lock().iter() {
            if entries.contains_key(input) {
                lost.remove(input);
                continue;
            }
            let addresses = compile_address(input);
            if !addresses.is_empty() {
                tracing::debug!("trusted client ip/range: {addresses:?}");
                lost.remove(input);
                entries.insert(input.clone(), addresses);
            }
        }

        for source in lost.keys() {
            tracing::debug!("'{source}' client no more trusted");
        }

        state.entries = entries;
        state.expires_at = Some(Instant::now() + TRUSTED_CACHE_TIMEOUT);
    }

    /// True iff the address is in the trust union.
    pub fn is_trusted(&self, addr: IpAddr) -> bool {
        let addr = canonical(addr);
        self.refresh_if_stale();
        self.state
            .lock()
            .entries
            .values()
            .any(|specs| specs.iter().any(|spec| spec.matches(addr)))
    }

    /// The server URL whose resolved addresses include this peer.
    pub fn trusted_server_url(&self, addr: IpAddr) -> Option<String> {
        let addr = canonical(addr);
        self.refresh_if_stale();
        let state = self.state.lock();
        for url in self.server_urls.lock().iter() {
            if let Some(specs) = state.entries.get(url) {
                if specs.iter().any(|spec| spec.matches(addr)) {
                    return Some(url.clone());
                }
            }
        }
        None
    }
}

/// Unmap IPv4-in-IPv6 peers so v4 trust entries match them.
fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

#[cfg(test)]
#[path = "trust_tests.rs"]
mod tests;
