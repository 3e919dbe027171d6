//! Shared helpers for the server integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use minichat_protocol::REGISTRATION_PROMPT;
use minichatd::config::ServerConfig;
use minichatd::registry::{spawn_registry, RegistryHandle};
use minichatd::server::{ChatServer, ServerError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Maximum time to wait for an expected line
pub const LINE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to watch for lines that must not arrive
pub const SILENCE: Duration = Duration::from_millis(200);

/// Test server context that manages server lifecycle.
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: RegistryHandle,
    cancel_token: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Spawns a server on an ephemeral loopback port.
    pub async fn spawn() -> Self {
        Self::spawn_with(ServerConfig::default()).await
    }

    /// Spawns a server with `config`, overriding the bind address.
    pub async fn spawn_with(mut config: ServerConfig) -> Self {
        config.bind_addr = "127.0.0.1:0".parse().unwrap();

        let registry = spawn_registry();
        let cancel_token = CancellationToken::new();

        let server = ChatServer::bind(config, registry.clone(), cancel_token.clone())
            .await
            .expect("bind test server");
        let addr = server.local_addr().expect("local addr");

        let task = tokio::spawn(server.run());

        Self {
            addr,
            registry,
            cancel_token,
            task,
        }
    }

    /// Opens a raw TCP client.
    pub async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("connect to server");
        TestClient::new(stream)
    }

    /// Connects and registers `name`, consuming the prompt and welcome.
    pub async fn join(&self, name: &str) -> TestClient {
        let mut client = self.connect().await;
        client.register(name).await;
        client
    }

    /// Cancels the server and waits for `run` to return.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        timeout(LINE_TIMEOUT, self.task)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
            .expect("server returned error");
    }
}

/// Raw line-oriented TCP client.
pub struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    /// Sends one line.
    pub async fn send(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Next line, or `None` once the server closed the connection.
    pub async fn next(&mut self) -> Option<String> {
        match timeout(LINE_TIMEOUT, self.lines.next_line()).await {
            Ok(Ok(line)) => line,
            // A reset counts as closed
            Ok(Err(_)) => None,
            Err(_) => panic!("no line within {LINE_TIMEOUT:?}"),
        }
    }

    /// Next line, which must exist.
    pub async fn line(&mut self) -> String {
        self.next().await.expect("connection closed unexpectedly")
    }

    /// Asserts the next line ends with `suffix` and returns it.
    pub async fn expect_suffix(&mut self, suffix: &str) -> String {
        let line = self.line().await;
        assert!(line.ends_with(suffix), "expected ...{suffix:?}, got {line:?}");
        line
    }

    /// Asserts nothing arrives for a short while.
    pub async fn expect_silence(&mut self) {
        if let Ok(result) = timeout(SILENCE, self.lines.next_line()).await {
            panic!("expected silence, got {result:?}");
        }
    }

    /// Asserts the server closed the connection.
    pub async fn expect_closed(&mut self) {
        assert_eq!(self.next().await, None);
    }

    /// Consumes the prompt, claims `name`, and consumes the welcome.
    pub async fn register(&mut self, name: &str) {
        assert_eq!(self.line().await, REGISTRATION_PROMPT);
        self.send(&format!("username = {name}")).await;
        self.expect_suffix(&format!("Server: Welcome {name}")).await;
    }

    /// Half-closes the write side, as a client exiting would.
    pub async fn hang_up(&mut self) {
        self.writer.shutdown().await.unwrap();
    }
}
