//! Robustness tests for the chat server.
//!
//! Malformed input, vanished peers, and oversized lines must only ever
//! affect the connection that caused them.

mod common;

use std::time::Duration;

use common::TestServer;
use minichat_core::DisplayName;
use minichat_protocol::{NAME_EMPTY, REGISTRATION_PROMPT};
use minichatd::config::ServerConfig;
use minichatd::registry::RegistryEvent;

// ============================================================================
// Malformed Input
// ============================================================================

#[tokio::test]
async fn test_empty_name_is_rejected() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    assert_eq!(client.line().await, REGISTRATION_PROMPT);

    client.send("username =").await;
    assert_eq!(client.line().await, NAME_EMPTY);

    client.send("username =    ").await;
    assert_eq!(client.line().await, NAME_EMPTY);

    assert_eq!(server.registry.session_count().await, 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_invalid_utf8_is_not_fatal() {
    let server = TestServer::spawn().await;
    let mut uno = server.join("UNO").await;

    uno.send_raw(b"caf\xff\n").await;
    uno.expect_suffix(" UNO: caf\u{fffd}").await;

    uno.send("still here").await;
    uno.expect_suffix(" UNO: still here").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_crlf_line_endings() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    assert_eq!(client.line().await, REGISTRATION_PROMPT);

    client.send_raw(b"username = UNO\r\n").await;
    client.expect_suffix("Server: Welcome UNO").await;

    client.send_raw(b"AllUsers\r\n").await;
    assert_eq!(client.line().await, "");

    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_line_closes_only_offender() {
    let config = ServerConfig {
        max_line_length: 64,
        ..ServerConfig::default()
    };
    let server = TestServer::spawn_with(config).await;

    let mut uno = server.join("UNO").await;
    let mut flood = server.join("flood").await;
    uno.expect_suffix("Server: Welcome flood").await;

    flood.send(&"x".repeat(1024)).await;

    flood.expect_closed().await;
    uno.expect_suffix("Server: Goodbye flood").await;

    uno.send("fine").await;
    uno.expect_suffix(" UNO: fine").await;

    server.shutdown().await;
}

// ============================================================================
// Vanished Peers
// ============================================================================

#[tokio::test]
async fn test_abrupt_disconnect_says_goodbye_once() {
    let server = TestServer::spawn().await;
    let mut events = server.registry.subscribe();

    let mut uno = server.join("UNO").await;
    let cs = server.join("CS").await;
    uno.expect_suffix("Server: Welcome CS").await;

    drop(cs);

    uno.expect_suffix("Server: Goodbye CS").await;
    uno.expect_silence().await;

    assert!(!server.registry.is_registered(DisplayName::new("CS")).await);

    let mut removals = 0;
    while let Ok(event) = events.try_recv() {
        if let RegistryEvent::Removed { name, .. } = event {
            assert_eq!(name.as_str(), "CS");
            removals += 1;
        }
    }
    assert_eq!(removals, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_hang_up_before_registration_is_silent() {
    let server = TestServer::spawn().await;
    let mut uno = server.join("UNO").await;

    let mut stranger = server.connect().await;
    assert_eq!(stranger.line().await, REGISTRATION_PROMPT);
    stranger.hang_up().await;
    stranger.expect_closed().await;

    uno.expect_silence().await;
    assert_eq!(server.registry.session_count().await, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_remove_closes_connection_and_frees_name() {
    let server = TestServer::spawn().await;
    let mut uno = server.join("UNO").await;
    let mut cs = server.join("CS").await;
    uno.expect_suffix("Server: Welcome CS").await;

    assert!(server.registry.remove(DisplayName::new("UNO")).await.unwrap());
    assert!(!server.registry.remove(DisplayName::new("UNO")).await.unwrap());

    // The removed connection stops speaking as UNO and leaves
    uno.expect_closed().await;
    cs.expect_suffix("Server: Goodbye UNO").await;

    let mut other = server.join("UNO").await;
    cs.expect_suffix("Server: Welcome UNO").await;

    other.send("Hi").await;
    other.expect_suffix(" UNO: Hi").await;
    cs.expect_suffix(" UNO: Hi").await;
    assert_eq!(server.registry.session_count().await, 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_stalled_reader_is_reaped() {
    let config = ServerConfig {
        outbound_capacity: 2,
        write_timeout: Duration::from_millis(100),
        ..ServerConfig::default()
    };
    let server = TestServer::spawn_with(config).await;

    // Never reads again after registering
    let _stalled = server.join("stalled").await;

    let mut talker = server.join("talker").await;
    let payload = "y".repeat(32 * 1024);
    let goodbye = "Server: Goodbye stalled";

    let mut goodbye_seen = false;
    let mut rounds = 0;
    while server
        .registry
        .is_registered(DisplayName::new("stalled"))
        .await
    {
        assert!(rounds < 2000, "stalled reader was never reaped");
        rounds += 1;

        talker.send(&payload).await;
        loop {
            let line = talker.line().await;
            if line.ends_with(goodbye) {
                goodbye_seen = true;
                continue;
            }
            assert!(line.ends_with(&payload));
            break;
        }
    }

    if !goodbye_seen {
        talker.expect_suffix(goodbye).await;
    }
    assert!(server.registry.is_registered(DisplayName::new("talker")).await);

    server.shutdown().await;
}

#[tokio::test]
async fn test_many_concurrent_participants() {
    let server = TestServer::spawn().await;

    let mut joins = Vec::new();
    for i in 0..20 {
        let addr = server.addr;
        joins.push(tokio::spawn(async move {
            let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            let mut client = common::TestClient::new(stream);
            assert_eq!(client.line().await, REGISTRATION_PROMPT);

            // Other participants' welcomes may arrive first
            let name = format!("user{i:02}");
            client.send(&format!("username = {name}")).await;
            let welcome = format!("Server: Welcome {name}");
            while !client.line().await.ends_with(&welcome) {}
            client
        }));
    }

    let mut clients = Vec::new();
    for join in joins {
        clients.push(join.await.unwrap());
    }

    assert_eq!(server.registry.session_count().await, 20);

    let roster = server
        .registry
        .roster(DisplayName::new("user00"))
        .await
        .unwrap();
    let names: Vec<&str> = roster.names().collect();
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);

    server.shutdown().await;
}
