//! End-to-end scenarios driven against a real loopback socket: each test
//! opens a genuine `TcpListener`, hands the accepted stream to an
//! `HttpConnection`, and drives it with a real client `TcpStream` rather
//! than exercising the parser/response-operation pieces in isolation.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Once;

use async_std::io::prelude::*;
use async_std::net::{TcpListener, TcpStream};
use async_std::task;

use filehearth::channel::IoChannel;
use filehearth::config::{ServerConfig, set_config};
use filehearth::connection::HttpConnection;
use filehearth::provider::FilesystemProvider;

static INIT: Once = Once::new();

fn init_config() {
    INIT.call_once(|| {
        set_config(ServerConfig {
            buffer_size: 4096,
            ..Default::default()
        });
    });
}

fn fixture_root() -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "filehearth-it-{}-{:?}",
        std::process::id(),
        std::thread::current().id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("a.txt"), b"hello\n").unwrap();
    std::fs::write(dir.join("big.bin"), vec![0xABu8; 1000]).unwrap();
    dir
}

/// Spawns a listener, accepts exactly one connection, and runs it to
/// completion on a background task. Returns a client stream connected to
/// that listener.
async fn spawn_connection(document_root: PathBuf) -> TcpStream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    task::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let channel = IoChannel::new(stream, 4096, || {});
        let connection = HttpConnection::new(
            channel,
            document_root,
            Arc::new(FilesystemProvider) as Arc<dyn filehearth::provider::ResourceProvider>,
            None,
        );
        connection.run().await;
    });

    TcpStream::connect(addr).await.unwrap()
}

async fn send(stream: &mut TcpStream, request: &str) {
    stream.write_all(request.as_bytes()).await.unwrap();
}

async fn read_until_close(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8_lossy(&buf).into_owned()
}

#[async_std::test]
async fn keep_alive_get_returns_whole_file() {
    init_config();
    let root = fixture_root();
    let mut client = spawn_connection(root).await;

    send(
        &mut client,
        "GET /a.txt HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    )
    .await;

    let response = read_until_close(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Length: 6"));
    assert!(response.contains("Content-Type: text/plain"));
    assert!(response.contains("Accept-Ranges: bytes"));
    assert!(response.ends_with("hello\n"));
}

#[async_std::test]
async fn single_range_returns_partial_content() {
    init_config();
    let root = fixture_root();
    let mut client = spawn_connection(root).await;

    send(
        &mut client,
        "GET /big.bin HTTP/1.1\r\nHost: x\r\nRange: bytes=100-199\r\nConnection: close\r\n\r\n",
    )
    .await;

    let response = read_until_close(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 206 Partial Content\r\n"));
    assert!(response.contains("Content-Range: bytes 100-199/1000"));
    assert!(response.contains("Content-Length: 100"));

    let body_start = response.find("\r\n\r\n").unwrap() + 4;
    assert_eq!(response.len() - body_start, 100);
}

#[async_std::test]
async fn multi_range_uses_multipart_byteranges() {
    init_config();
    let root = fixture_root();
    let mut client = spawn_connection(root).await;

    send(
        &mut client,
        "GET /big.bin HTTP/1.1\r\nHost: x\r\nRange: bytes=0-9, 990-\r\nConnection: close\r\n\r\n",
    )
    .await;

    let response = read_until_close(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 206 Partial Content\r\n"));
    assert!(response.contains("Content-Type: multipart/byteranges; boundary="));
    assert!(response.contains("Content-Range: bytes 0-9/1000"));
    assert!(response.contains("Content-Range: bytes 990-999/1000"));
}

#[async_std::test]
async fn unsatisfiable_range_is_416() {
    init_config();
    let root = fixture_root();
    let mut client = spawn_connection(root.clone()).await;

    std::fs::write(root.join("small.bin"), vec![0u8; 100]).unwrap();

    send(
        &mut client,
        "GET /small.bin HTTP/1.1\r\nHost: x\r\nRange: bytes=200-300\r\nConnection: close\r\n\r\n",
    )
    .await;

    let response = read_until_close(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 416 Range Not Satisfiable\r\n"));
    assert!(response.contains("Content-Range: bytes */100"));
}

#[async_std::test]
async fn if_none_match_hit_returns_304() {
    init_config();
    let root = fixture_root();

    // First request to learn the Etag the provider assigns.
    let mut first = spawn_connection(root.clone()).await;
    send(
        &mut first,
        "GET /a.txt HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    )
    .await;
    let first_response = read_until_close(&mut first).await;
    let etag_line = first_response
        .lines()
        .find(|l| l.starts_with("Etag:"))
        .expect("response should carry an Etag")
        .to_string();
    let etag = etag_line.trim_start_matches("Etag:").trim().to_string();

    let mut second = spawn_connection(root).await;
    send(
        &mut second,
        &format!(
            "GET /a.txt HTTP/1.1\r\nHost: x\r\nIf-None-Match: {etag}\r\nConnection: close\r\n\r\n"
        ),
    )
    .await;
    let second_response = read_until_close(&mut second).await;
    assert!(second_response.starts_with("HTTP/1.1 304 Not Modified\r\n"));
}

#[async_std::test]
async fn pipelined_requests_are_answered_in_order() {
    init_config();
    let root = fixture_root();
    let mut client = spawn_connection(root).await;

    send(
        &mut client,
        "GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n\
         GET /big.bin HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    )
    .await;

    let response = read_until_close(&mut client).await;
    let first_status = response.find("HTTP/1.1 200 OK").unwrap();
    let second_status = response.rfind("HTTP/1.1 200 OK").unwrap();
    assert!(first_status < second_status);

    let hello_pos = response.find("hello\n").unwrap();
    assert!(hello_pos < second_status, "a.txt body must precede big.bin's response");
}
