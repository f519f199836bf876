//! Integration tests for the remote frame channel
//!
//! A `FrameServer` on an ephemeral localhost port serves a mock capture and a
//! `RemoteFrameSource` fetches from it.

mod common;

use std::{sync::Arc, time::Duration};

use framegrab::{
    capture::{Frame, MockBackend},
    config::CaptureConfig,
    controller::VideoCapture,
    error::CaptureError,
    model::FlipType,
    remote::{FrameSource, LocalFrameSource, RemoteFrameSource},
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::common::*;

fn config() -> CaptureConfig {
    CaptureConfig::default().with_remote_timeout(Duration::from_secs(5))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_matches_local() {
    let backend = MockBackend::new().with_frame_size(48, 36);
    let local = LocalFrameSource::new(Arc::new(open_camera(&backend)));
    let server = TestServer::start(open_camera(&backend)).await;

    let remote = RemoteFrameSource::connect(&server.address, &config()).await.unwrap();
    let fetched = remote.query_frame().await.unwrap().unwrap();
    let expected = local.query_frame().await.unwrap().unwrap();

    // Both captures are on their first frame, so the pixels agree
    assert_eq!(fetched.dimensions(), (48, 36));
    assert_eq!(fetched.to_rgba8(), expected.to_rgba8());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_small_frame() {
    let backend = MockBackend::new().with_frame_size(101, 50);
    let server = TestServer::start(open_camera(&backend)).await;

    let remote = RemoteFrameSource::connect(&server.address, &config()).await.unwrap();
    let small = remote.query_small_frame().await.unwrap().unwrap();
    assert_eq!(small.dimensions(), (51, 25));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_applies_server_flip() {
    let backend = MockBackend::new().with_frame_size(8, 8);
    let capture = open_camera(&backend);
    capture.set_flip_type(FlipType::Vertical);
    let server = TestServer::start(capture).await;

    let remote = RemoteFrameSource::connect(&server.address, &config()).await.unwrap();
    let frame = remote.query_frame().await.unwrap().unwrap();

    let mut expected = Frame::new(backend_first_frame(8, 8));
    expected.flip(FlipType::Vertical);
    assert_eq!(frame.to_rgba8(), expected.to_rgba8());

    server.stop().await;
}

fn backend_first_frame(width: u32, height: u32) -> image::DynamicImage {
    let backend = MockBackend::new().with_frame_size(width, height);
    let capture = open_camera(&backend);
    capture.query_frame().unwrap().unwrap().into_inner()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_end_of_stream() {
    let backend = MockBackend::new().with_file("clip.avi", 2);
    let capture = VideoCapture::from_file(&backend, "clip.avi").unwrap();
    let server = TestServer::start(capture).await;

    let remote = RemoteFrameSource::connect(&server.address, &config()).await.unwrap();
    assert!(remote.query_frame().await.unwrap().is_some());
    assert!(remote.query_frame().await.unwrap().is_some());
    assert!(remote.query_frame().await.unwrap().is_none());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_server_error() {
    let backend = MockBackend::new().with_fault_after(2);
    let server = TestServer::start(open_camera(&backend)).await;

    let remote = RemoteFrameSource::connect(&server.address, &config()).await.unwrap();
    assert!(remote.query_frame().await.unwrap().is_some());
    match remote.query_frame().await {
        Err(CaptureError::RemoteError { message }) => assert!(message.contains("injected fault")),
        other => panic!("unexpected result: {other:?}"),
    }
    // The connection survives a server-side error
    assert!(remote.query_frame().await.unwrap().is_some());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_answers_malformed_request() {
    let backend = MockBackend::new();
    let server = TestServer::start(open_camera(&backend)).await;

    let stream = tokio::net::TcpStream::connect(&server.address).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer.write_all(b"{\"op\":\"explode\"}\n").await.unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let reply: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert!(reply.get("error").is_some());

    writer.write_all(b"{\"op\":\"query_frame\"}\n").await.unwrap();
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    let reply: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(reply["frame"]["width"], 640);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_hangs_up_on_unterminated_request() {
    let backend = MockBackend::new();
    let server = TestServer::start(open_camera(&backend)).await;

    let stream = tokio::net::TcpStream::connect(&server.address).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer.write_all(&[b'x'; 5000]).await.unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let reply: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert!(reply["error"].as_str().unwrap().contains("exceeds"));

    line.clear();
    let next = tokio::time::timeout(SETTLE_TIMEOUT, reader.read_line(&mut line))
        .await
        .unwrap();
    assert!(!matches!(next, Ok(n) if n > 0));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_timeout() {
    // Accepts connections but never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let silent = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let config = CaptureConfig::default().with_remote_timeout(Duration::from_millis(100));
    let remote = RemoteFrameSource::connect(&address, &config).await.unwrap();
    assert!(matches!(
        remote.query_frame().await,
        Err(CaptureError::CaptureTimeout { duration_ms: 100 })
    ));

    silent.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_reconnects_after_server_restart() {
    let backend = MockBackend::new();
    let server = TestServer::start(open_camera(&backend)).await;
    let address = server.address.clone();

    let remote = RemoteFrameSource::connect(&address, &config()).await.unwrap();
    assert!(remote.query_frame().await.unwrap().is_some());
    server.stop().await;
    // Give the connection task time to see the shutdown
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Nothing is listening now, and the old connection is closed
    let first = remote.query_frame().await;
    assert!(first.is_err());

    let second = remote.query_frame().await;
    assert!(matches!(second, Err(CaptureError::RemoteUnavailable { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_clients() {
    let backend = MockBackend::new().with_frame_size(32, 32);
    let server = TestServer::start(open_camera(&backend)).await;

    let clients = (0..4).map(|_| {
        let address = server.address.clone();
        async move {
            let remote = RemoteFrameSource::connect(&address, &config()).await.unwrap();
            for _ in 0..5 {
                assert!(remote.query_frame().await.unwrap().is_some());
            }
        }
    });
    futures::future::join_all(clients).await;
    assert_eq!(backend.stats().grabs(), 20);

    server.stop().await;
}
