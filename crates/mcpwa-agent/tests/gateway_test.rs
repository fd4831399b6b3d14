//! End-to-end requests through the gateway over an in-memory stream transport.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mcpwa::simulator::{sample_chats, SimulatorOptions, WhatsAppSimulator};
use mcpwa::{AutomationConfig, PollConfig, WhatsApp};
use mcpwa_agent::transport::{StreamTransport, MAX_LINE_LENGTH};
use mcpwa_agent::{
    GatewayServer, Phase, ServerOptions, StartError, Transport, TransportError, TransportFactory,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::time::timeout;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    sim: WhatsAppSimulator,
    server: GatewayServer,
    input: DuplexStream,
    output: Lines<BufReader<DuplexStream>>,
}

async fn start(sim: WhatsAppSimulator) -> Harness {
    start_with(sim, AutomationConfig::immediate()).await
}

async fn start_with(sim: WhatsAppSimulator, config: AutomationConfig) -> Harness {
    let (input, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, output) = tokio::io::duplex(64 * 1024);
    let transport: Arc<dyn Transport> = Arc::new(StreamTransport::new(server_in, server_out));
    let factory: TransportFactory =
        Arc::new(move || -> Result<Arc<dyn Transport>, TransportError> { Ok(transport.clone()) });

    let whatsapp = WhatsApp::new(sim.engine(), config);
    let server = GatewayServer::new(whatsapp, factory, ServerOptions::default());
    server.start().await.unwrap();
    Harness {
        sim,
        server,
        input,
        output: BufReader::new(output).lines(),
    }
}

impl Harness {
    async fn send(&mut self, line: &str) {
        self.input.write_all(line.as_bytes()).await.unwrap();
        self.input.write_all(b"\n").await.unwrap();
    }

    async fn reply(&mut self) -> Value {
        read_reply(&mut self.output).await
    }

    async fn call(&mut self, line: &str) -> Value {
        self.send(line).await;
        self.reply().await
    }
}

async fn read_reply(output: &mut Lines<BufReader<DuplexStream>>) -> Value {
    let line = timeout(REPLY_TIMEOUT, output.next_line())
        .await
        .expect("no reply in time")
        .unwrap()
        .expect("output closed");
    serde_json::from_str(&line).unwrap()
}

/// Sends are never confirmed and take a noticeable while to give up.
fn slow_unconfirmed_sends() -> (WhatsAppSimulator, AutomationConfig) {
    let sim = WhatsAppSimulator::with_options(
        sample_chats(),
        SimulatorOptions {
            drop_outgoing: true,
            ..SimulatorOptions::default()
        },
    );
    let config = AutomationConfig {
        send_verify: PollConfig::new(10, 30),
        ..AutomationConfig::immediate()
    };
    (sim, config)
}

fn assert_single_outcome(reply: &Value) {
    let object = reply.as_object().unwrap();
    assert!(object.contains_key("id"));
    assert_ne!(
        object.contains_key("result"),
        object.contains_key("error"),
        "{reply}"
    );
    assert_eq!(object.len(), 2, "{reply}");
}

#[tokio::test]
async fn test_list_chats_with_groups_filter() {
    let mut h = start(WhatsAppSimulator::new(sample_chats())).await;
    let reply = h
        .call(r#"{"id":"1","method":"list-chats","params":{"filter":"groups"}}"#)
        .await;

    assert_single_outcome(&reply);
    assert_eq!(reply["id"], "1");
    let chats = reply["result"].as_array().unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["name"], "Team");
    assert_eq!(chats[0]["isGroup"], true);
    assert_eq!(chats[0]["lastMessagePreview"], "deploy is done");
}

#[tokio::test]
async fn test_open_chat_without_match_is_not_found() {
    let mut h = start(WhatsAppSimulator::new(sample_chats())).await;
    let reply = h
        .call(r#"{"id":"2","method":"open-chat","params":{"name":"Nobody"}}"#)
        .await;

    assert_single_outcome(&reply);
    assert_eq!(reply["id"], "2");
    assert_eq!(reply["error"]["code"], "not-found");
    assert!(reply["error"]["message"].as_str().unwrap().contains("Nobody"));
}

#[tokio::test]
async fn test_open_chat_then_read_it() {
    let mut h = start(WhatsAppSimulator::new(sample_chats())).await;
    let reply = h
        .call(r#"{"id":1,"method":"open-chat","params":{"name":"alice"}}"#)
        .await;
    assert_eq!(reply, json!({"id": 1, "result": true}));

    let reply = h.call(r#"{"id":2,"method":"get-current-chat"}"#).await;
    let chat = &reply["result"];
    assert_eq!(chat["name"], "Alice");
    assert_eq!(chat["lastSeenText"], "online");
    assert_eq!(chat["messages"].as_array().unwrap().len(), 2);
    assert_eq!(chat["messages"][1]["direction"], "outgoing");
}

#[tokio::test]
async fn test_unverified_send_returns_false() {
    let sim = WhatsAppSimulator::with_options(
        sample_chats(),
        SimulatorOptions {
            drop_outgoing: true,
            ..SimulatorOptions::default()
        },
    );
    sim.open("Alice");
    let mut h = start(sim).await;

    let reply = h
        .call(r#"{"id":"s","method":"send-message","params":{"text":"hello?"}}"#)
        .await;
    assert_eq!(reply, json!({"id": "s", "result": false}));
}

#[tokio::test]
async fn test_send_message_is_delivered() {
    let sim = WhatsAppSimulator::new(sample_chats());
    sim.open("Bob");
    let mut h = start(sim).await;

    let reply = h
        .call(r#"{"id":"s","method":"send-message","params":{"text":"see you there"}}"#)
        .await;
    assert_eq!(reply, json!({"id": "s", "result": true}));
    let last = h.sim.messages("Bob").pop().unwrap();
    assert_eq!(last.text, "see you there");
}

#[tokio::test]
async fn test_malformed_and_unknown_requests() {
    let mut h = start(WhatsAppSimulator::new(sample_chats())).await;

    // No id to correlate: logged, never answered.
    h.send("this is not json").await;
    h.send(r#"{"method":"status"}"#).await;

    let reply = h.call(r#"{"id":"m","params":{}}"#).await;
    assert_single_outcome(&reply);
    assert_eq!(reply["id"], "m");
    assert_eq!(reply["error"]["code"], "malformed-request");

    let reply = h.call(r#"{"id":6,"method":"format-disk"}"#).await;
    assert_eq!(reply["id"], 6);
    assert_eq!(reply["error"]["code"], "unknown-tool");

    let reply = h
        .call(r#"{"id":7,"method":"list-chats","params":{"filter":"archived"}}"#)
        .await;
    assert_eq!(reply["error"]["code"], "invalid-params");
}

#[tokio::test]
async fn test_every_request_gets_one_correlated_reply() {
    let mut h = start(WhatsAppSimulator::new(sample_chats())).await;
    let requests = [
        r#"{"id":"a","method":"list-tools"}"#,
        r#"{"id":"b","method":"status"}"#,
        r#"{"id":"c","method":"list-chats"}"#,
        r#"{"id":"d","method":"search","params":{"query":"deploy"}}"#,
        r#"{"id":"e","method":"get-search-results"}"#,
        r#"{"id":"f","method":"nope"}"#,
        r#"{"id":10,"method":"navigate","params":{"tab":"calls"}}"#,
    ];
    for request in requests {
        h.send(request).await;
    }

    let mut seen = HashSet::new();
    for _ in 0..requests.len() {
        let reply = h.reply().await;
        assert_single_outcome(&reply);
        assert!(seen.insert(reply["id"].to_string()), "duplicate reply {reply}");
    }
    let expected: HashSet<String> = ["\"a\"", "\"b\"", "\"c\"", "\"d\"", "\"e\"", "\"f\"", "10"]
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_status_reports_server_state() {
    let mut h = start(WhatsAppSimulator::new(sample_chats())).await;
    // Starting again is a no-op.
    h.server.start().await.unwrap();

    let reply = h.call(r#"{"id":1,"method":"status"}"#).await;
    assert_eq!(
        reply["result"]["server"],
        json!({"running": true, "transportConnected": true})
    );
    assert_eq!(reply["result"]["available"], true);
    assert_eq!(h.server.phase(), Phase::Running);
}

#[tokio::test]
async fn test_end_of_input_stops_the_server() {
    let h = start(WhatsAppSimulator::new(sample_chats())).await;
    let server = h.server.clone();
    drop(h.input);

    timeout(REPLY_TIMEOUT, server.wait_stopped())
        .await
        .expect("server did not stop");
    assert_eq!(server.phase(), Phase::Stopped);
    assert!(!server.state().running);
    assert!(!server.state().transport_connected);
}

#[tokio::test]
async fn test_request_before_end_of_input_is_answered() {
    let (sim, config) = slow_unconfirmed_sends();
    sim.open("Alice");
    let mut h = start_with(sim, config).await;

    h.send(r#"{"id":"last","method":"send-message","params":{"text":"bye"}}"#)
        .await;
    let Harness {
        server,
        input,
        mut output,
        ..
    } = h;
    drop(input);

    let reply = read_reply(&mut output).await;
    assert_eq!(reply, json!({"id": "last", "result": false}));
    timeout(REPLY_TIMEOUT, server.wait_stopped())
        .await
        .expect("server did not stop");
    assert_eq!(output.next_line().await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pipelined_calls_run_in_arrival_order() {
    let sim = WhatsAppSimulator::new(sample_chats());
    sim.open("Bob");
    let mut h = start(sim).await;

    let texts: Vec<String> = (0..60).map(|i| format!("note {i}")).collect();
    let mut batch = String::new();
    for (i, text) in texts.iter().enumerate() {
        batch.push_str(&format!(
            "{{\"id\":{i},\"method\":\"send-message\",\"params\":{{\"text\":\"{text}\"}}}}\n"
        ));
    }
    h.input.write_all(batch.as_bytes()).await.unwrap();

    for _ in 0..texts.len() {
        let reply = h.reply().await;
        assert_eq!(reply["result"], true, "{reply}");
    }
    let sent: Vec<String> = h.sim.messages("Bob").into_iter().map(|m| m.text).collect();
    assert_eq!(sent[sent.len() - texts.len()..], texts[..]);
}

#[tokio::test]
async fn test_invalid_utf8_line_is_answered() {
    let mut h = start(WhatsAppSimulator::new(sample_chats())).await;
    h.input
        .write_all(b"{\"id\":1,\"method\":\"st\xffatus\"}\n")
        .await
        .unwrap();
    let reply = h.reply().await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["error"]["code"], "unknown-tool");

    let reply = h.call(r#"{"id":2,"method":"status"}"#).await;
    assert_eq!(reply["result"]["available"], true);
}

#[tokio::test]
async fn test_over_long_line_is_skipped() {
    let mut h = start(WhatsAppSimulator::new(sample_chats())).await;
    let mut long = vec![b'x'; MAX_LINE_LENGTH + 1];
    long.push(b'\n');
    h.input.write_all(&long).await.unwrap();

    let reply = h.call(r#"{"id":"after","method":"list-tools"}"#).await;
    assert_eq!(reply["id"], "after");
    assert!(reply["result"].is_array());
    assert_eq!(h.server.phase(), Phase::Running);
}

#[tokio::test]
async fn test_failed_transport_start() {
    let sim = WhatsAppSimulator::new(sample_chats());
    let factory: TransportFactory = Arc::new(|| -> Result<Arc<dyn Transport>, TransportError> {
        Err(TransportError::Unsupported("test".to_string()))
    });
    let server = GatewayServer::new(
        WhatsApp::new(sim.engine(), AutomationConfig::immediate()),
        factory,
        ServerOptions::default(),
    );

    let err = server.start().await.unwrap_err();
    assert!(matches!(
        err,
        StartError::Transport(TransportError::Unsupported(_))
    ));
    assert_eq!(server.phase(), Phase::Stopped);
}
