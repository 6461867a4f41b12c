//! Integration tests for varsend.
//!
//! These tests run a real listener on an ephemeral port, push frames over
//! TCP and assert on what the capture store recorded.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use varsend::protocol::{encode, FrameBuffer};
use varsend::{CaptureStore, FrameSender, ListenerHandle, ServerConfig};

const WAIT: Duration = Duration::from_secs(2);

/// A capture store in a fresh temp dir plus a listener feeding it.
async fn capture_listener(config: ServerConfig) -> (TempDir, Arc<CaptureStore>, ListenerHandle) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(CaptureStore::new(dir.path().join("captured.json")));
    let handle = ListenerHandle::spawn(&config.port(0), store.clone())
        .await
        .unwrap();
    (dir, store, handle)
}

async fn send_all(handle: &ListenerHandle, payloads: &[&[u8]]) {
    let mut sender = FrameSender::connect(handle.local_addr()).await.unwrap();
    for payload in payloads {
        sender.send(payload).await.unwrap();
    }
    sender.close().await.unwrap();
}

/// Test two short messages arrive intact and in order.
#[tokio::test]
async fn test_hello_world_captured_in_order() {
    let (_dir, store, handle) = capture_listener(ServerConfig::default()).await;

    send_all(&handle, &[b"Hello", b"World"]).await;

    assert!(store.wait_for_count(2, WAIT).await);
    let data: Vec<String> = store.list().await.unwrap().into_iter().map(|m| m.data).collect();
    assert_eq!(data, vec!["Hello", "World"]);

    handle.stop().await.unwrap();
}

/// Test a 1 MiB payload is captured whole.
#[tokio::test]
async fn test_large_payload_captured() {
    let (_dir, store, handle) = capture_listener(ServerConfig::default()).await;
    let payload = "x".repeat(1024 * 1024);

    send_all(&handle, &[payload.as_bytes()]).await;

    assert!(store.wait_for_count(1, Duration::from_secs(5)).await);
    let messages = store.list().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].data.len(), 1024 * 1024);
    assert_eq!(messages[0].data, payload);

    handle.stop().await.unwrap();
}

/// Test a zero-length frame is decoded but never captured.
#[tokio::test]
async fn test_zero_length_frame_not_captured() {
    let (_dir, store, handle) = capture_listener(ServerConfig::default()).await;

    let mut sender = FrameSender::connect(handle.local_addr()).await.unwrap();
    sender.send_raw_frame(&encode(b"")).await.unwrap();
    sender.close().await.unwrap();

    // A marker on the next connection proves the first one was fully served.
    send_all(&handle, &[b"marker"]).await;
    assert!(store.wait_for_count(1, WAIT).await);

    let messages = store.list().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].data, "marker");

    handle.stop().await.unwrap();
}

/// Test payloads on one connection keep order and timestamps never go back.
#[tokio::test]
async fn test_ordering_and_timestamps() {
    let (_dir, store, handle) = capture_listener(ServerConfig::default()).await;

    send_all(&handle, &[b"P1\n", b"P2\n", b"P3\n"]).await;

    assert!(store.wait_for_count(3, WAIT).await);
    let messages = store.list().await.unwrap();
    let data: Vec<&str> = messages.iter().map(|m| m.data.as_str()).collect();
    assert_eq!(data, vec!["P1\n", "P2\n", "P3\n"]);
    assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    handle.stop().await.unwrap();
}

/// Test a payload cut short by the peer is dropped.
#[tokio::test]
async fn test_truncated_payload_not_captured() {
    let (_dir, store, handle) = capture_listener(ServerConfig::default()).await;

    let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
    stream.write_all(&100u32.to_be_bytes()).await.unwrap();
    stream.write_all(&[b'a'; 40]).await.unwrap();
    stream.shutdown().await.unwrap();
    drop(stream);

    send_all(&handle, &[b"after"]).await;
    assert!(store.wait_for_count(1, WAIT).await);

    let messages = store.list().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].data, "after");

    let stats = handle.stop().await.unwrap();
    assert_eq!(stats.connections, 2);
    assert_eq!(stats.abnormal, 1);
}

/// Test closing mid-prefix counts as abnormal while closing at a boundary does not.
#[tokio::test]
async fn test_graceful_vs_mid_prefix_close() {
    let (_dir, store, handle) = capture_listener(ServerConfig::default()).await;

    send_all(&handle, &[b"clean"]).await;

    let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
    stream.write_all(&encode(b"whole")).await.unwrap();
    stream.write_all(&[0, 0]).await.unwrap();
    stream.shutdown().await.unwrap();
    drop(stream);

    send_all(&handle, &[b"last"]).await;
    assert!(store.wait_for_count(3, WAIT).await);

    let data: Vec<String> = store.list().await.unwrap().into_iter().map(|m| m.data).collect();
    assert_eq!(data, vec!["clean", "whole", "last"]);

    let stats = handle.stop().await.unwrap();
    assert_eq!(stats.connections, 3);
    assert_eq!(stats.abnormal, 1);
}

/// Test two back-to-back connections both deliver in submission order.
#[tokio::test]
async fn test_back_to_back_connections() {
    let (_dir, store, handle) = capture_listener(ServerConfig::default()).await;

    send_all(&handle, &[b"first-1", b"first-2"]).await;
    send_all(&handle, &[b"second-1", b"second-2"]).await;

    assert!(store.wait_for_count(4, WAIT).await);
    let data: Vec<String> = store.list().await.unwrap().into_iter().map(|m| m.data).collect();
    assert_eq!(data, vec!["first-1", "first-2", "second-1", "second-2"]);

    handle.stop().await.unwrap();
}

/// Test the polling accept discipline delivers the same way.
#[tokio::test]
async fn test_polling_mode() {
    let (_dir, store, handle) = capture_listener(ServerConfig::default().polling_default()).await;

    send_all(&handle, &[b"Hello", b"World"]).await;
    send_all(&handle, &[b"again"]).await;

    assert!(store.wait_for_count(3, WAIT).await);
    let data: Vec<String> = store.list().await.unwrap().into_iter().map(|m| m.data).collect();
    assert_eq!(data, vec!["Hello", "World", "again"]);

    handle.stop().await.unwrap();
}

/// Open connection A, then deliver B while A is still open; B must wait for A.
async fn assert_second_connection_waits(config: ServerConfig) {
    let (_dir, store, handle) = capture_listener(config).await;

    let mut first = FrameSender::connect(handle.local_addr()).await.unwrap();
    first.send(b"A1").await.unwrap();
    assert!(store.wait_for_count(1, WAIT).await);

    send_all(&handle, &[b"B1"]).await;
    assert!(!store.wait_for_count(2, Duration::from_millis(300)).await);

    first.send(b"A2").await.unwrap();
    first.close().await.unwrap();

    assert!(store.wait_for_count(3, WAIT).await);
    let data: Vec<String> = store.list().await.unwrap().into_iter().map(|m| m.data).collect();
    assert_eq!(data, vec!["A1", "A2", "B1"]);

    let stats = handle.stop().await.unwrap();
    assert_eq!(stats.connections, 2);
}

/// Test a second connection is not served while the first is open (blocking accept).
#[tokio::test]
async fn test_one_connection_at_a_time_blocking() {
    assert_second_connection_waits(ServerConfig::default()).await;
}

/// Test a second connection is not served while the first is open (polling accept).
#[tokio::test]
async fn test_one_connection_at_a_time_polling() {
    assert_second_connection_waits(ServerConfig::default().polling_default()).await;
}

/// Test clearing between scenarios and waiting on an empty store.
#[tokio::test]
async fn test_clear_between_scenarios() {
    let (_dir, store, handle) = capture_listener(ServerConfig::default()).await;

    send_all(&handle, &[b"scenario-1"]).await;
    assert!(store.wait_for_count(1, WAIT).await);

    store.clear().await.unwrap();
    assert!(store.list().await.unwrap().is_empty());
    assert!(!store.wait_for_count(1, Duration::from_millis(200)).await);

    send_all(&handle, &[b"scenario-2"]).await;
    assert!(store.wait_for_count(1, WAIT).await);
    assert_eq!(store.list().await.unwrap()[0].data, "scenario-2");

    handle.stop().await.unwrap();
}

/// Test an announced length over the configured maximum ends the connection.
#[tokio::test]
async fn test_max_payload_guard() {
    let (_dir, store, handle) = capture_listener(ServerConfig::default().max_payload(16)).await;

    let mut sender = FrameSender::connect(handle.local_addr()).await.unwrap();
    sender.send(b"small").await.unwrap();
    // The listener may reset the socket once it rejects the frame.
    let _ = sender.send(&[b'z'; 64]).await;
    let _ = sender.close().await;

    send_all(&handle, &[b"next"]).await;
    assert!(store.wait_for_count(2, WAIT).await);

    let data: Vec<String> = store.list().await.unwrap().into_iter().map(|m| m.data).collect();
    assert_eq!(data, vec!["small", "next"]);

    let stats = handle.stop().await.unwrap();
    assert_eq!(stats.abnormal, 1);
}

/// Test the frame buffer reassembles a stream split at every byte.
#[test]
fn test_frame_buffer_byte_at_a_time() {
    let mut wire = Vec::new();
    for payload in [&b"alpha"[..], b"", b"gamma\n"] {
        wire.extend_from_slice(&encode(payload));
    }

    let mut buffer = FrameBuffer::new();
    let mut payloads = Vec::new();
    for byte in &wire {
        payloads.extend(buffer.push(std::slice::from_ref(byte)).unwrap());
    }

    assert_eq!(payloads.len(), 3);
    assert_eq!(&payloads[0][..], b"alpha");
    assert!(payloads[1].is_empty());
    assert_eq!(&payloads[2][..], b"gamma\n");
    assert!(buffer.is_empty());
}
