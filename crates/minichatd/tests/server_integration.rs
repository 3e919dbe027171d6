//! Integration tests for the TCP chat server.
//!
//! These tests run a real `ChatServer` on a loopback port and drive it with
//! raw TCP clients, covering registration, broadcast, listing, departure,
//! and graceful shutdown.

mod common;

use common::{TestServer, LINE_TIMEOUT};
use minichat_core::DisplayName;
use minichat_protocol::{NAME_TAKEN, REGISTRATION_PROMPT};

// ============================================================================
// Full Scenario
// ============================================================================

#[tokio::test]
async fn test_three_participant_scenario() {
    let server = TestServer::spawn().await;

    let mut uno = server.join("UNO").await;

    let mut cs = server.join("CS").await;
    uno.expect_suffix("Server: Welcome CS").await;

    let mut unocc = server.join("UNOCC").await;
    uno.expect_suffix("Server: Welcome UNOCC").await;
    cs.expect_suffix("Server: Welcome UNOCC").await;

    // Chat reaches everyone, the sender included
    uno.send("Hi").await;
    uno.expect_suffix(" UNO: Hi").await;
    cs.expect_suffix(" UNO: Hi").await;
    unocc.expect_suffix(" UNO: Hi").await;

    // Listing goes to the requester only
    uno.send("AllUsers").await;
    assert_eq!(uno.line().await, "");
    assert!(uno
        .line()
        .await
        .starts_with("List of users connected at time: "));
    assert!(uno.line().await.starts_with("\t1) CS since "));
    assert!(uno.line().await.starts_with("\t2) UNO since "));
    assert!(uno.line().await.starts_with("\t3) UNOCC since "));
    assert_eq!(uno.line().await, "");
    cs.expect_silence().await;
    unocc.expect_silence().await;

    // Departure is announced to those who remain
    unocc.send("Bye").await;
    uno.expect_suffix("Server: Goodbye UNOCC").await;
    cs.expect_suffix("Server: Goodbye UNOCC").await;
    unocc.expect_closed().await;

    assert_eq!(server.registry.session_count().await, 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_broadcast_line_format() {
    let server = TestServer::spawn().await;
    let mut uno = server.join("UNO").await;

    uno.send("  spaced out  ").await;
    let line = uno.line().await;

    // "HH:MM:SS UNO: spaced out"
    let (stamp, rest) = line.split_at(8);
    assert_eq!(stamp.len(), 8);
    assert!(stamp
        .chars()
        .enumerate()
        .all(|(i, c)| if i == 2 || i == 5 { c == ':' } else { c.is_ascii_digit() }));
    assert_eq!(rest, " UNO: spaced out");

    server.shutdown().await;
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_concurrent_same_name_registration() {
    let server = TestServer::spawn().await;

    let mut first = server.connect().await;
    let mut second = server.connect().await;
    assert_eq!(first.line().await, REGISTRATION_PROMPT);
    assert_eq!(second.line().await, REGISTRATION_PROMPT);

    tokio::join!(first.send("username = UNO"), second.send("username = UNO"));

    let first_reply = first.line().await;
    let second_reply = second.line().await;

    let winners = [&first_reply, &second_reply]
        .iter()
        .filter(|line| line.ends_with("Server: Welcome UNO"))
        .count();
    let losers = [&first_reply, &second_reply]
        .iter()
        .filter(|line| line.as_str() == NAME_TAKEN)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(losers, 1);
    assert_eq!(server.registry.session_count().await, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_name_reusable_after_bye() {
    let server = TestServer::spawn().await;

    let mut first = server.join("UNO").await;
    first.send("Bye").await;
    first.expect_closed().await;

    let mut second = server.connect().await;
    assert_eq!(second.line().await, REGISTRATION_PROMPT);
    second.send("username = UNO").await;
    second.expect_suffix("Server: Welcome UNO").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_pre_registration_lines_are_not_broadcast() {
    let server = TestServer::spawn().await;
    let mut uno = server.join("UNO").await;

    let mut stranger = server.connect().await;
    assert_eq!(stranger.line().await, REGISTRATION_PROMPT);
    stranger.send("hello?").await;
    assert_eq!(stranger.line().await, REGISTRATION_PROMPT);
    stranger.send("AllUsers").await;
    assert_eq!(stranger.line().await, REGISTRATION_PROMPT);

    uno.expect_silence().await;
    assert!(
        !server
            .registry
            .is_registered(DisplayName::new("hello?"))
            .await
    );

    server.shutdown().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_closes_every_connection() {
    let server = TestServer::spawn().await;
    let registry = server.registry.clone();

    let mut uno = server.join("UNO").await;
    let mut cs = server.join("CS").await;
    uno.expect_suffix("Server: Welcome CS").await;
    let mut stranger = server.connect().await;
    assert_eq!(stranger.line().await, REGISTRATION_PROMPT);

    tokio::time::timeout(LINE_TIMEOUT, server.shutdown())
        .await
        .expect("shutdown hung");

    uno.expect_closed().await;
    cs.expect_closed().await;
    stranger.expect_closed().await;
    assert_eq!(registry.session_count().await, 0);
}
