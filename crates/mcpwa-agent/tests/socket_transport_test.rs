#![cfg(unix)]
//! The gateway served over a Unix socket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mcpwa::simulator::{sample_chats, SimulatorOptions, WhatsAppSimulator};
use mcpwa::{AutomationConfig, PollConfig, WhatsApp};
use mcpwa_agent::transport::transport_factory;
use mcpwa_agent::{GatewayServer, Phase, ServerOptions, StartError, TransportError, TransportKind};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(path: &Path) -> Client {
        let stream = UnixStream::connect(path).await.unwrap();
        let (read, writer) = stream.into_split();
        Client {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn call(&mut self, line: &str) -> Value {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        let reply = timeout(WAIT, self.lines.next_line())
            .await
            .expect("no reply in time")
            .unwrap()
            .expect("connection closed");
        serde_json::from_str(&reply).unwrap()
    }
}

fn server(sim: &WhatsAppSimulator, path: PathBuf) -> GatewayServer {
    server_with(sim, path, AutomationConfig::immediate())
}

fn server_with(sim: &WhatsAppSimulator, path: PathBuf, config: AutomationConfig) -> GatewayServer {
    GatewayServer::new(
        WhatsApp::new(sim.engine(), config),
        transport_factory(TransportKind::Socket, path),
        ServerOptions::default(),
    )
}

/// Keep connecting until the server takes a new client, which it does once it has seen the
/// previous one leave.
async fn connect_when_free(path: &Path) -> Client {
    for _ in 0..50 {
        let mut client = Client::connect(path).await;
        client
            .writer
            .write_all(b"{\"id\":0,\"method\":\"list-tools\"}\n")
            .await
            .ok();
        if let Ok(Ok(Some(_))) =
            timeout(Duration::from_millis(200), client.lines.next_line()).await
        {
            return client;
        }
    }
    panic!("server never accepted a new client");
}

#[tokio::test]
async fn test_second_client_is_rejected_without_disturbing_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.sock");
    let sim = WhatsAppSimulator::new(sample_chats());
    let server = server(&sim, path.clone());
    server.start().await.unwrap();

    let mut first = Client::connect(&path).await;
    let reply = first.call(r#"{"id":1,"method":"list-tools"}"#).await;
    assert!(reply["result"].is_array());

    let mut second = UnixStream::connect(&path).await.unwrap();
    let mut buf = [0u8; 16];
    let read = timeout(WAIT, second.read(&mut buf))
        .await
        .expect("rejected client was left hanging");
    assert!(matches!(read, Ok(0) | Err(_)));

    let reply = first.call(r#"{"id":2,"method":"status"}"#).await;
    assert_eq!(
        reply["result"]["server"],
        json!({"running": true, "transportConnected": true})
    );

    // Once the first client leaves, the next one is served.
    drop(first);
    let mut third = connect_when_free(&path).await;
    let reply = third
        .call(r#"{"id":"3","method":"list-chats","params":{"filter":"groups"}}"#)
        .await;
    assert_eq!(reply["result"][0]["name"], "Team");

    server.stop().await;
    assert_eq!(server.phase(), Phase::Stopped);
    assert!(!path.exists());
}

/// Connect once the server has let the previous client go. A rejected connection is closed
/// right away; an accepted one stays open and quiet.
async fn connect_as_next_client(path: &Path) -> Client {
    for _ in 0..100 {
        let mut client = Client::connect(path).await;
        match timeout(Duration::from_millis(50), client.lines.next_line()).await {
            Err(_) => return client,
            Ok(_) => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    panic!("server never accepted a new client");
}

#[tokio::test]
async fn test_reply_for_departed_client_is_not_delivered_to_the_next() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handover.sock");
    let sim = WhatsAppSimulator::with_options(
        sample_chats(),
        SimulatorOptions {
            drop_outgoing: true,
            ..SimulatorOptions::default()
        },
    );
    sim.open("Alice");
    // The unconfirmed send keeps the worker busy well past the first client's departure.
    let config = AutomationConfig {
        send_verify: PollConfig::new(15, 30),
        ..AutomationConfig::immediate()
    };
    let server = server_with(&sim, path.clone(), config);
    server.start().await.unwrap();

    let mut first = Client::connect(&path).await;
    first
        .writer
        .write_all(b"{\"id\":\"from-first\",\"method\":\"send-message\",\"params\":{\"text\":\"hi\"}}\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(first);

    let mut second = connect_as_next_client(&path).await;
    let reply = second.call(r#"{"id":"from-second","method":"status"}"#).await;
    assert_eq!(reply["id"], "from-second", "{reply}");
    assert_eq!(reply["result"]["available"], true);

    server.stop().await;
}

#[tokio::test]
async fn test_stale_socket_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stale.sock");
    // Bound and dropped: the file stays, nobody listens.
    drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
    assert!(path.exists());

    let sim = WhatsAppSimulator::new(sample_chats());
    let server = server(&sim, path.clone());
    server.start().await.unwrap();

    let mut client = Client::connect(&path).await;
    let reply = client.call(r#"{"id":1,"method":"list-tools"}"#).await;
    assert!(reply["result"].is_array());
    server.stop().await;
}

#[tokio::test]
async fn test_live_socket_is_not_taken_over() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live.sock");
    let _live = tokio::net::UnixListener::bind(&path).unwrap();

    let sim = WhatsAppSimulator::new(sample_chats());
    let server = server(&sim, path.clone());
    let err = server.start().await.unwrap_err();

    assert!(matches!(
        err,
        StartError::Transport(TransportError::AddressInUse(_))
    ));
    assert_eq!(server.phase(), Phase::Stopped);
    assert!(path.exists());
}

#[tokio::test]
async fn test_restart_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("restart.sock");
    let sim = WhatsAppSimulator::new(sample_chats());
    let server = server(&sim, path.clone());

    server.start().await.unwrap();
    server.stop().await;
    server.start().await.unwrap();

    let mut client = Client::connect(&path).await;
    let reply = client.call(r#"{"id":1,"method":"start-session"}"#).await;
    assert_eq!(reply["result"], json!({"started": true, "processId": 4242}));
    server.stop().await;
}
