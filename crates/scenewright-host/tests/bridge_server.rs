use scenewright_client::{BridgeClient, ClientError};
use scenewright_core::{ErrorKind, FrameReader, FrameWriter, HelloRequest, ServerHello};
use scenewright_host::{Dispatcher, EditorHost, EditorServer};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::task::JoinSet;

const TOKEN: &str = "test-token";
const TIMEOUT: Duration = Duration::from_secs(5);

async fn start(unsafe_mode: bool) -> (TempDir, SocketAddr) {
    let dir = TempDir::new().unwrap();
    let host = EditorHost::new(dir.path(), unsafe_mode);
    let server = EditorServer::new(Dispatcher::new(host), TOKEN)
        .with_handshake_timeout(Duration::from_millis(300));
    let listener = EditorServer::bind(([127, 0, 0, 1], 0).into()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));
    (dir, addr)
}

async fn connect(addr: SocketAddr, token: &str) -> Result<BridgeClient, ClientError> {
    BridgeClient::connect("127.0.0.1", addr.port(), token, TIMEOUT).await
}

#[tokio::test]
async fn authenticated_requests_reach_the_host() {
    let (dir, addr) = start(false).await;
    let client = connect(addr, TOKEN).await.unwrap();
    assert!(client.capabilities().supports("batch"));
    assert!(client.capabilities().supports("validate_scene"));

    let pong = client.request("ping", json!({}), TIMEOUT).await.unwrap();
    assert_eq!(pong, json!({"pong": true}));

    client
        .request(
            "write_text_file",
            json!({"path": "res://notes/readme.txt", "content": "hi"}),
            TIMEOUT,
        )
        .await
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("notes/readme.txt")).unwrap(),
        "hi"
    );
}

#[tokio::test]
async fn wrong_token_gets_hello_error_and_is_closed() {
    let (_dir, addr) = start(false).await;
    let err = connect(addr, "nope").await.err().expect("must be rejected");
    assert!(matches!(err, ClientError::HandshakeRejected(ref m) if m == "invalid token"));

    // Raw socket: nothing sent after the rejection is answered.
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read, write) = stream.into_split();
    let mut reader = FrameReader::new(read);
    let mut writer = FrameWriter::new(write);
    writer.send(&HelloRequest::new("nope")).await.unwrap();
    let reply = reader.next_frame::<ServerHello>().await.unwrap();
    assert!(matches!(reply, Some(ServerHello::HelloError { .. })));
    let _ = writer
        .send(&json!({"id": 1, "method": "ping", "params": {}}))
        .await;
    assert!(!matches!(
        reader.next_frame::<serde_json::Value>().await,
        Ok(Some(_))
    ));
}

#[tokio::test]
async fn request_before_hello_is_rejected() {
    let (_dir, addr) = start(false).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read, write) = stream.into_split();
    let mut reader = FrameReader::new(read);
    let mut writer = FrameWriter::new(write);
    writer
        .send(&json!({"id": 1, "method": "ping", "params": {}}))
        .await
        .unwrap();
    let reply = reader.next_frame::<ServerHello>().await.unwrap();
    assert!(matches!(reply, Some(ServerHello::HelloError { .. })));
}

#[tokio::test]
async fn second_session_is_busy_until_first_leaves() {
    let (_dir, addr) = start(false).await;
    let first = connect(addr, TOKEN).await.unwrap();

    let err = connect(addr, TOKEN).await.err().expect("second session");
    assert!(matches!(err, ClientError::HandshakeRejected(ref m) if m == "session busy"));

    first.dispose();
    drop(first);
    let mut attempt = 0;
    let second = loop {
        match connect(addr, TOKEN).await {
            Ok(client) => break client,
            Err(_) if attempt < 50 => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(e) => panic!("session never freed: {e}"),
        }
    };
    assert!(second.request("ping", json!({}), TIMEOUT).await.is_ok());
}

#[tokio::test]
async fn failures_are_structured_and_keep_the_connection() {
    let (_dir, addr) = start(false).await;
    let client = connect(addr, TOKEN).await.unwrap();

    let kind = |r: Result<serde_json::Value, ClientError>| {
        r.unwrap_err().remote().and_then(|e| e.kind())
    };
    assert_eq!(
        kind(client.request("explode", json!({}), TIMEOUT).await),
        Some(ErrorKind::UnknownMethod)
    );
    assert_eq!(
        kind(client.request("read_text_file", json!({}), TIMEOUT).await),
        Some(ErrorKind::MissingParam)
    );
    assert_eq!(
        kind(
            client
                .request("read_text_file", json!({"path": "res://missing.txt"}), TIMEOUT)
                .await
        ),
        Some(ErrorKind::NotFound)
    );
    assert_eq!(
        kind(
            client
                .request(
                    "get",
                    json!({"target": {"kind": "singleton", "name": "ProjectSettings"}, "property": "x"}),
                    TIMEOUT
                )
                .await
        ),
        Some(ErrorKind::Blocked)
    );
    assert!(client.request("ping", json!({}), TIMEOUT).await.is_ok());
}

#[tokio::test]
async fn pipelined_requests_all_complete() {
    let (_dir, addr) = start(false).await;
    let client = Arc::new(connect(addr, TOKEN).await.unwrap());
    let mut calls = JoinSet::new();
    for i in 0..8 {
        let client = client.clone();
        calls.spawn(async move {
            client
                .request(
                    "write_text_file",
                    json!({"path": format!("res://p/{i}.txt"), "content": i.to_string()}),
                    TIMEOUT,
                )
                .await
        });
    }
    while let Some(outcome) = calls.join_next().await {
        assert_eq!(outcome.unwrap().unwrap()["written"], true);
    }
    assert_eq!(client.pending_requests(), 0);
}
