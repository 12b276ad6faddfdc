//! End-to-end tests: a real server on a loopback port, driven over TCP.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chunkserv::{Server, ServerConfig, ServerError, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), ServerError>>,
}

async fn start(config: ServerConfig) -> Running {
    let server = Server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = server.local_addr();
    let (stop, stopped) = oneshot::channel::<()>();

    let handle = tokio::spawn(server.run_until(Arc::new(config), async {
        let _ = stopped.await;
    }));

    Running { addr, stop, handle }
}

async fn exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}

fn chunked(body: &'static [u8], size: usize) -> ServerConfig {
    ServerConfig {
        chunked: true,
        chunk_size: NonZeroUsize::new(size).unwrap(),
        body: Bytes::from_static(body),
        ..ServerConfig::default()
    }
}

const POST: &[u8] = b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}";

#[tokio::test]
async fn chunked_response_on_the_wire() {
    let server = start(chunked(b"hello world", 5)).await;

    let response = exchange(server.addr, POST).await;

    assert_eq!(
        response,
        b"HTTP/1.1 200 OK\r\n\
          Allow: POST, OPTIONS\r\n\
          Content-Type: application/json\r\n\
          Transfer-Encoding: chunked\r\n\
          \r\n\
          5\r\nhello\r\n5\r\n worl\r\n1\r\nd\r\n0\r\n\r\n"
            .to_vec()
    );
}

#[tokio::test]
async fn single_transmission_has_same_bytes() {
    let server = start(ServerConfig {
        single_chunk: true,
        ..chunked(b"hello world", 5)
    })
    .await;

    let response = exchange(server.addr, POST).await;

    assert!(response.ends_with(b"\r\n\r\n5\r\nhello\r\n5\r\n worl\r\n1\r\nd\r\n0\r\n\r\n"));
}

#[tokio::test]
async fn fixed_length_with_custom_status() {
    let server = start(ServerConfig {
        response_code: StatusCode::NOT_FOUND,
        body: Bytes::from_static(b"err"),
        ..ServerConfig::default()
    })
    .await;

    let response = exchange(server.addr, POST).await;

    assert_eq!(
        response,
        b"HTTP/1.1 404 Not Found\r\n\
          Allow: POST, OPTIONS\r\n\
          Content-Type: application/json\r\n\
          Content-Length: 3\r\n\
          \r\n\
          err"
            .to_vec()
    );
}

#[tokio::test]
async fn put_and_get_are_answered_like_post() {
    let server = start(ServerConfig {
        body: Bytes::from_static(b"same"),
        ..ServerConfig::default()
    })
    .await;

    let post = exchange(server.addr, POST).await;
    let put = exchange(
        server.addr,
        b"PUT /api HTTP/1.1\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    )
    .await;
    let get = exchange(
        server.addr,
        b"GET /api HTTP/1.1\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(post.ends_with(b"same"));
    assert_eq!(put, post);
    assert_eq!(get, post);
}

#[tokio::test]
async fn head_gets_header_fields_only() {
    let server = start(chunked(b"hello world", 5)).await;

    let response = exchange(
        server.addr,
        b"HEAD / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert_eq!(response, b"Content-Type: application/json\r\n\r\n".to_vec());
}

#[tokio::test]
async fn missing_content_length_gets_no_response() {
    let server = start(ServerConfig::default()).await;

    let response = exchange(server.addr, b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

    assert!(response.is_empty());
}

#[tokio::test]
async fn invalid_content_length_gets_no_response() {
    let server = start(ServerConfig::default()).await;

    let response = exchange(
        server.addr,
        b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n",
    )
    .await;

    assert!(response.is_empty());
}

#[tokio::test]
async fn malformed_request_gets_400() {
    let server = start(ServerConfig::default()).await;

    let response = exchange(server.addr, b"\x01\x02 / HTTP/1.1\r\n\r\n").await;

    assert!(response.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn unsupported_method_gets_501() {
    let server = start(ServerConfig::default()).await;

    let response = exchange(server.addr, b"DELETE /thing HTTP/1.1\r\n\r\n").await;
    let text = String::from_utf8(response).unwrap();

    assert!(text.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
    assert!(text.ends_with("Unsupported method ('DELETE')"));
}

#[tokio::test]
async fn keep_alive_serves_pipelined_requests() {
    let server = start(ServerConfig {
        body: Bytes::from_static(b"ok"),
        ..ServerConfig::default()
    })
    .await;

    let response = exchange(
        server.addr,
        b"POST /1 HTTP/1.1\r\nContent-Length: 1\r\n\r\naPOST /2 HTTP/1.1\r\nContent-Length: 1\r\nConnection: close\r\n\r\nb",
    )
    .await;
    let text = String::from_utf8(response).unwrap();

    assert_eq!(text.matches("HTTP/1.1 200 OK\r\n").count(), 2);
    assert!(text.ends_with("\r\n\r\nok"));
}

#[tokio::test]
async fn request_body_arriving_in_pieces() {
    let server = start(ServerConfig {
        body: Bytes::from_static(b"done"),
        ..ServerConfig::default()
    })
    .await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"POST / HTTP/1.1\r\nContent-Length: 6\r\nConnection: close\r\n\r\nabc")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.write_all(b"def").await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert!(response.ends_with(b"\r\n\r\ndone"));
}

#[tokio::test]
async fn expect_continue_gets_interim_response() {
    let server = start(ServerConfig {
        body: Bytes::from_static(b"done"),
        ..ServerConfig::default()
    })
    .await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(
            b"POST / HTTP/1.1\r\nContent-Length: 4\r\nExpect: 100-continue\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();

    let mut interim = [0u8; 25];
    tokio::time::timeout(Duration::from_millis(500), stream.read_exact(&mut interim))
        .await
        .expect("100 Continue should arrive before the body is sent")
        .unwrap();
    assert_eq!(&interim, b"HTTP/1.1 100 Continue\r\n\r\n");

    stream.write_all(b"data").await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();

    assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with(b"\r\n\r\ndone"));
}

#[tokio::test]
async fn peer_reset_mid_response_leaves_server_serving() {
    let server = start(ServerConfig {
        wait: Duration::from_millis(10),
        ..chunked(&[b'x'; 40], 1)
    })
    .await;

    let mut dropped = TcpStream::connect(server.addr).await.unwrap();
    dropped.write_all(POST).await.unwrap();
    let mut partial = [0u8; 17];
    dropped.read_exact(&mut partial).await.unwrap();
    assert_eq!(&partial, b"HTTP/1.1 200 OK\r\n");
    // closing with unread data resets the connection
    drop(dropped);

    let response = exchange(server.addr, POST).await;

    assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with(b"1\r\nx\r\n0\r\n\r\n"));
    assert_eq!(response.iter().filter(|&&b| b == b'x').count(), 40);
    assert!(!server.handle.is_finished());
}

#[tokio::test]
async fn wait_applies_between_data_chunks() {
    let server = start(ServerConfig {
        wait: Duration::from_millis(100),
        ..chunked(b"abc", 1)
    })
    .await;

    let started = Instant::now();
    let response = exchange(server.addr, POST).await;

    assert!(response.ends_with(b"1\r\na\r\n1\r\nb\r\n1\r\nc\r\n0\r\n\r\n"));
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_connection_does_not_block_others() {
    let server = start(ServerConfig {
        wait: Duration::from_millis(200),
        ..chunked(b"abc", 1)
    })
    .await;

    let started = Instant::now();
    let (first, second) = tokio::join!(exchange(server.addr, POST), exchange(server.addr, POST));

    assert_eq!(first, second);
    assert!(
        started.elapsed() < Duration::from_millis(1100),
        "connections were served one after the other: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn shutdown_closes_the_listener() {
    let server = start(ServerConfig::default()).await;
    let addr = server.addr;

    let response = exchange(addr, POST).await;
    assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));

    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn shutdown_closes_idle_keep_alive_connections() {
    let server = start(ServerConfig::default()).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n")
        .await
        .unwrap();

    let mut head = [0u8; 17];
    stream.read_exact(&mut head).await.unwrap();
    assert_eq!(&head, b"HTTP/1.1 200 OK\r\n");

    server.stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), server.handle)
        .await
        .expect("server should stop without waiting out the grace period")
        .unwrap()
        .unwrap();

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.ends_with(b"dummy content"));
}
