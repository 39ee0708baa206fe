mod common;

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use slotclaim_connector::rpc_server::process_request;
use slotclaim_connector::{ClaimService, RpcServer};
use slotclaim_state::MemoryStore;

use common::{config, FakeService};

fn idle_service() -> ClaimService {
    let fake = FakeService::new();
    fake.set_quota("main", 0);
    ClaimService::new(
        config(&["main"], &["scout"]),
        Arc::new(fake),
        Arc::new(MemoryStore::default()),
    )
}

fn to_json(response: &slotclaim_protocol::ControlResponse) -> Value {
    serde_json::to_value(response).unwrap()
}

#[tokio::test]
async fn test_parse_error() {
    let service = idle_service();
    let response = to_json(&process_request("{not json", &service).await);
    assert_eq!(response["error"]["code"], -32700);
    assert!(response["id"].is_null());
}

#[tokio::test]
async fn test_unknown_method() {
    let service = idle_service();
    let response = to_json(
        &process_request(
            r#"{"jsonrpc":"2.0","id":7,"method":"claim.explode","params":{}}"#,
            &service,
        )
        .await,
    );
    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["id"], 7);
}

#[tokio::test]
async fn test_status_before_start() {
    let service = idle_service();
    let response = to_json(
        &process_request(r#"{"jsonrpc":"2.0","id":"s","method":"claim.get_status"}"#, &service)
            .await,
    );
    let result = &response["result"];
    assert_eq!(result["running"], false);
    assert_eq!(result["scanning"], false);
    assert_eq!(result["phase"], "idle");
    assert!(result["claimants"].as_array().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_then_log() {
    let service = idle_service();
    let response = to_json(
        &process_request(r#"{"jsonrpc":"2.0","id":1,"method":"claim.start"}"#, &service).await,
    );
    assert_eq!(response["result"]["started"], true);
    service.wait().await;

    let status = to_json(
        &process_request(r#"{"jsonrpc":"2.0","id":2,"method":"claim.get_status"}"#, &service)
            .await,
    );
    assert_eq!(status["result"]["phase"], "finished");

    let log = to_json(
        &process_request(
            r#"{"jsonrpc":"2.0","id":3,"method":"claim.get_log","params":{"limit":2}}"#,
            &service,
        )
        .await,
    );
    let entries = log["result"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[1]["message"],
        "All claimants exhausted, run finished"
    );
    assert_eq!(entries[1]["severity"], "info");

    let stop = to_json(
        &process_request(r#"{"jsonrpc":"2.0","id":4,"method":"claim.stop"}"#, &service).await,
    );
    assert_eq!(stop["result"]["stopped"], false);
}

#[tokio::test]
async fn test_invalid_log_limit() {
    let service = idle_service();
    let response = to_json(
        &process_request(
            r#"{"jsonrpc":"2.0","id":1,"method":"claim.get_log","params":{"limit":"all"}}"#,
            &service,
        )
        .await,
    );
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn test_log_stream_receives_entries() {
    let service = idle_service();
    let mut rx = service.subscribe_log().await;
    assert!(service.start().await);
    let first = rx.recv().await.unwrap();
    assert!(first.message.starts_with("Run started"));
    service.stop().await;
    service.wait().await;
}

#[tokio::test]
async fn test_socket_round_trip() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = RpcServer::new(addr.to_string(), Arc::new(idle_service()), 2);
    let server_task = tokio::spawn(server.serve(listener));

    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"claim.get_status\"}\n")
        .await
        .unwrap();
    let line = lines.next_line().await.unwrap().unwrap();
    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["id"], 1);
    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["result"]["running"], false);

    writer.write_all(b"garbage\n").await.unwrap();
    let line = lines.next_line().await.unwrap().unwrap();
    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["error"]["code"], -32700);

    server_task.abort();
}
