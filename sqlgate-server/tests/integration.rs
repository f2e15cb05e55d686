//! End-to-end tests over real TCP connections.

use sqlgate_client::{Client, ClientError, ConnectionConfig};
use sqlgate_protocol::{ChangeSet, Decoder, Encoder, Reply, Row, SqlValue};
use sqlgate_server::{Config, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start_server(config: Config) -> (Arc<Server>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(Server::new(config));
    {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await });
    }
    (server, addr)
}

fn client_config(addr: SocketAddr) -> ConnectionConfig {
    ConnectionConfig::new(addr).with_request_timeout(Duration::from_secs(5))
}

async fn connect(addr: SocketAddr) -> Client {
    Client::connect(client_config(addr)).await.unwrap()
}

/// Reads replies off a raw socket, independent of the client library.
async fn read_raw_reply(stream: &mut TcpStream, decoder: &mut Decoder) -> Option<Reply> {
    let mut buf = [0u8; 1024];
    loop {
        if let Some(reply) = decoder.decode_reply().unwrap() {
            return Some(reply);
        }
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            return None;
        }
        decoder.extend(&buf[..n]);
    }
}

#[tokio::test]
async fn test_full_session_flow() {
    let (_server, addr) = start_server(Config::default()).await;
    let mut client = connect(addr).await;

    client.open(":memory:").await.unwrap();
    assert_eq!(
        client
            .execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        client
            .execute("INSERT INTO notes (body) VALUES ('first'), ('second')")
            .await
            .unwrap(),
        2
    );

    let data = client.query("SELECT * FROM notes ORDER BY id").await.unwrap();
    assert_eq!(data.rows.len(), 2);
    assert_eq!(
        data.rows[0].get("body"),
        Some(&SqlValue::Text("first".to_string()))
    );
    assert_eq!(data.columns.get("id").map(String::as_str), Some("int"));

    let row = client
        .query_single("SELECT body FROM notes ORDER BY id")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get("body"), Some(&SqlValue::Text("first".to_string())));

    let value = client.query_value("SELECT count(*) FROM notes").await.unwrap();
    assert_eq!(value, SqlValue::Int(2));

    let table = client.table("SELECT id, body FROM notes").await.unwrap();
    assert_eq!(table.tablename.as_deref(), Some("notes"));
    assert!(table.columns[0].is_identity);

    let mut inserted = Row::new();
    inserted.insert("body", "third");
    let mut change = ChangeSet::new("notes");
    change.inserted = vec![inserted];
    let result = client.postback(&change).await.unwrap();
    assert_eq!(result.idcolumn.as_deref(), Some("id"));
    assert_eq!(result.identities, vec![3]);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_commands_before_open_are_rejected() {
    let (_server, addr) = start_server(Config::default()).await;
    let mut client = connect(addr).await;

    let err = client.query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, ClientError::Server(ref msg) if msg == "not connected"));

    // The connection survives the error.
    client.open(":memory:").await.unwrap();
    assert_eq!(client.query_value("SELECT 1").await.unwrap(), SqlValue::Int(1));
}

#[tokio::test]
async fn test_double_open_is_rejected() {
    let (_server, addr) = start_server(Config::default()).await;
    let mut client = connect(addr).await;

    client.open(":memory:").await.unwrap();
    let err = client.open(":memory:").await.unwrap_err();
    assert!(matches!(err, ClientError::Server(ref msg) if msg == "already connected"));
}

#[tokio::test]
async fn test_stale_postback_fails_over_the_wire() {
    let (_server, addr) = start_server(Config::default()).await;
    let mut client = connect(addr).await;

    client.open(":memory:").await.unwrap();
    client
        .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v INT)")
        .await
        .unwrap();
    client.execute("INSERT INTO t (v) VALUES (10)").await.unwrap();

    // Snapshot claims v=99, so the delete matches nothing.
    let mut stale = Row::new();
    stale.insert("id", 1i64);
    stale.insert("v", 99i64);
    let mut change = ChangeSet::new("t");
    change.deleted = vec![stale];

    let err = client.postback(&change).await.unwrap_err();
    assert!(matches!(err, ClientError::Server(ref msg) if msg.contains("delete")));

    // Nothing was deleted.
    assert_eq!(
        client.query_value("SELECT count(*) FROM t").await.unwrap(),
        SqlValue::Int(1)
    );
}

#[tokio::test]
async fn test_invalid_json_payload_is_recoverable() {
    let (_server, addr) = start_server(Config::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut decoder = Decoder::new();

    let bytes = Encoder::encode_payload("this is not json").unwrap();
    stream.write_all(&bytes).await.unwrap();
    let reply = read_raw_reply(&mut stream, &mut decoder).await.unwrap();
    assert_eq!(reply, Reply::error("invalid command"));

    // Same connection still accepts well-formed commands.
    let bytes = Encoder::encode_payload(r#"{"type":"open","text":":memory:"}"#).unwrap();
    stream.write_all(&bytes).await.unwrap();
    let reply = read_raw_reply(&mut stream, &mut decoder).await.unwrap();
    assert_eq!(reply, Reply::Ok);
}

#[tokio::test]
async fn test_malformed_frame_closes_connection() {
    let (_server, addr) = start_server(Config::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(b"not-a-length\r\n").await.unwrap();

    // No reply; the server hangs up.
    let mut buf = [0u8; 64];
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_connection_capacity() {
    let mut config = Config::default();
    config.network.max_connections = 1;
    let (_server, addr) = start_server(config).await;

    // First client completes a round-trip, so it is counted as active.
    let mut first = connect(addr).await;
    first.open(":memory:").await.unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut decoder = Decoder::new();
    let reply = read_raw_reply(&mut stream, &mut decoder).await.unwrap();
    assert_eq!(reply, Reply::error("server at connection capacity"));
    assert!(read_raw_reply(&mut stream, &mut decoder).await.is_none());

    // The admitted client keeps working.
    assert_eq!(
        first.query_value("SELECT 7").await.unwrap(),
        SqlValue::Int(7)
    );
}

#[tokio::test]
async fn test_close_frees_connection_slot() {
    let (server, addr) = start_server(Config::default()).await;

    let mut client = connect(addr).await;
    client.open(":memory:").await.unwrap();
    client.close().await.unwrap();

    // The connection task tears down shortly after the close reply.
    for _ in 0..100 {
        let active = server
            .stats()
            .connections_active
            .load(std::sync::atomic::Ordering::Relaxed);
        if active == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("connection slot was not released");
}

#[tokio::test]
async fn test_file_backed_database_under_root_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.database.root_dir = Some(dir.path().to_path_buf());
    let (_server, addr) = start_server(config).await;

    let mut client = connect(addr).await;
    client.open("sales.db").await.unwrap();
    client.execute("CREATE TABLE s (n INT)").await.unwrap();
    client.execute("INSERT INTO s VALUES (41)").await.unwrap();
    client.close().await.unwrap();

    // A later session sees the same file.
    let mut client = connect(addr).await;
    client.open("sales.db").await.unwrap();
    assert_eq!(
        client.query_value("SELECT n FROM s").await.unwrap(),
        SqlValue::Int(41)
    );

    // Escaping the root is refused.
    let mut other = connect(addr).await;
    let err = other.open("../elsewhere.db").await.unwrap_err();
    assert!(matches!(err, ClientError::Server(ref msg) if msg.contains("allowed directory")));
}

#[tokio::test]
async fn test_shutdown_disconnects_clients() {
    let (server, addr) = start_server(Config::default()).await;
    let mut client = connect(addr).await;
    client.open(":memory:").await.unwrap();

    server.shutdown();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = client.query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, ClientError::Disconnected | ClientError::Io(_)));

    for _ in 0..100 {
        if !server.is_running() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server did not stop");
}
