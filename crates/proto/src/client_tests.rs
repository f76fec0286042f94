// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn options() -> ClientOptions {
    ClientOptions::default()
}

#[parameterized(
    plain = { "https://srv.example.com/", "https://srv.example.com/api.php/token" },
    subpath = { "https://srv.example.com/glpi/", "https://srv.example.com/glpi/api.php/token" },
    marketplace = {
        "https://srv.example.com/glpi/marketplace/glpiinventory/",
        "https://srv.example.com/glpi/api.php/token"
    },
    plugins = {
        "https://srv.example.com/plugins/fusioninventory/",
        "https://srv.example.com/api.php/token"
    },
)]
fn token_endpoint_guessing(url: &str, expected: &str) {
    assert_eq!(token_endpoint(url).unwrap(), expected);
}

#[test]
fn test_request_id_only_in_debug_mode() {
    let client = Client::new(uuid::Uuid::new_v4(), None, options()).unwrap();
    assert!(client.request_id().is_none());

    let client = Client::new(
        uuid::Uuid::new_v4(),
        None,
        ClientOptions { debug: true, ..options() },
    )
    .unwrap();
    let id = client.request_id().unwrap();
    assert_eq!(id.len(), 8);
    assert!(id.bytes().all(|b| b.is_ascii_hexdigit()));
}

#[test]
fn test_headers_carry_agent_identity() {
    let agentid = uuid::Uuid::new_v4();
    let client = Client::new(agentid, Some("proxy-1".into()), options()).unwrap();
    let headers = client.headers();

    assert_eq!(
        headers.get("GLPI-Agent-ID").unwrap().to_str().unwrap(),
        agentid.to_string()
    );
    assert_eq!(headers.get("GLPI-Proxy-ID").unwrap(), "proxy-1");
    assert_eq!(headers.get("Pragma").unwrap(), "no-cache");
}

#[test]
fn test_compression_disabled_by_option() {
    let client = Client::new(
        uuid::Uuid::new_v4(),
        None,
        ClientOptions { no_compression: true, ..options() },
    )
    .unwrap();
    assert_eq!(client.compression(), Compression::None);

    let client = Client::new(uuid::Uuid::new_v4(), None, options()).unwrap();
    assert_eq!(client.compression(), Compression::Zlib);
}

#[test]
fn test_missing_ca_file_is_an_error() {
    let result = Client::new(
        uuid::Uuid::new_v4(),
        None,
        ClientOptions {
            ca_cert_file: Some("/nonexistent/ca.pem".into()),
            ..options()
        },
    );
    assert!(matches!(result, Err(ClientError::MissingCaFile(_))));
}

#[test]
fn test_unwrap_schema_violation() {
    let message = "JSON does not validate. Violations:\n\"weird\" does not match to inventory.schema.json#->properties:itemtype";
    assert_eq!(
        unwrap_schema_violation(message),
        "JSON does not validate. Violations: unsupported 'weird' value as 'itemtype' field value"
    );

    // Anything else passes through
    assert_eq!(unwrap_schema_violation("boom"), "boom");
}

#[test]
fn test_excerpt_bounded() {
    let long = vec![b'x'; 1000];
    assert_eq!(excerpt(&long).len(), 256);
}

#[test]
fn test_cached_token_expiry() {
    clear_token_cache();
    OAUTH_TOKENS.lock().insert(
        "https://a/".to_string(),
        CachedToken {
            token: "T".into(),
            expires_at: Instant::now() + Duration::from_secs(60),
        },
    );
    OAUTH_TOKENS.lock().insert(
        "https://b/".to_string(),
        CachedToken {
            token: "U".into(),
            expires_at: Instant::now() - Duration::from_secs(1),
        },
    );

    assert_eq!(cached_token("https://a/").as_deref(), Some("T"));
    assert_eq!(cached_token("https://b/"), None);
    assert_eq!(cached_token("https://c/"), None);
    clear_token_cache();
}
