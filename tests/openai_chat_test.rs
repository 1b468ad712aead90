use std::net::SocketAddr;
use std::time::Duration;

use journal_rag::config::ChatConfig;
use journal_rag::inference::openai::OpenAiChat;
use journal_rag::inference::{ChatModel, ChatRequest, InferenceError, StreamEnd};
use journal_rag::stream::{ChatEvent, TokenSink};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

const SSE_HEAD: &str =
    "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n";

fn chat_for(addr: SocketAddr) -> OpenAiChat {
    OpenAiChat::new(&ChatConfig {
        provider: "openai".into(),
        base_url: format!("http://{addr}"),
        ..ChatConfig::default()
    })
    .unwrap()
}

fn request() -> ChatRequest {
    ChatRequest {
        system: "be brief".into(),
        user: "Question: hi".into(),
        max_tokens: 16,
    }
}

fn delta(content: &str, finish: Option<&str>) -> String {
    let chunk = serde_json::json!({
        "choices": [{"delta": {"content": content}, "finish_reason": finish}]
    });
    format!("data: {chunk}\n\n")
}

/// Read one request (headers and a Content-Length body), returning the body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client hung up before sending a request");
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let len: usize = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .map(|v| v.trim().parse().unwrap())
            .unwrap_or(0);
        let body_start = end + 4;
        while buf.len() < body_start + len {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client hung up mid-request");
            buf.extend_from_slice(&chunk[..n]);
        }
        return String::from_utf8_lossy(&buf[body_start..body_start + len]).into_owned();
    }
}

/// Serve one streaming response made of `body`, then close the connection.
async fn serve_once(body: String) -> (SocketAddr, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(SSE_HEAD.as_bytes()).await.unwrap();
        socket.write_all(body.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });
    (addr, handle)
}

fn drain_tokens(mut rx: mpsc::Receiver<ChatEvent>) -> Vec<String> {
    let mut tokens = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ChatEvent::Token(t) = event {
            tokens.push(t);
        }
    }
    tokens
}

#[tokio::test]
async fn finish_reason_on_the_last_token_completes_the_answer() {
    let body = delta("Hi", None) + &delta("!", Some("stop"));
    let (addr, server) = serve_once(body).await;

    let (tx, rx) = mpsc::channel(16);
    let sink = TokenSink::new(tx);
    let end = chat_for(addr).stream_chat(&request(), &sink).await.unwrap();
    drop(sink);

    assert_eq!(end, StreamEnd::Completed);
    assert_eq!(drain_tokens(rx), vec!["Hi", "!"]);

    let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["messages"][0]["role"], "system");
    assert_eq!(sent["messages"][1]["content"], "Question: hi");
    assert_eq!(sent["max_tokens"], 16);
}

#[tokio::test]
async fn done_sentinel_completes_the_answer() {
    let body = delta("Hi", None) + "data: [DONE]\n\n";
    let (addr, _server) = serve_once(body).await;

    let (tx, rx) = mpsc::channel(16);
    let sink = TokenSink::new(tx);
    let end = chat_for(addr).stream_chat(&request(), &sink).await.unwrap();
    drop(sink);

    assert_eq!(end, StreamEnd::Completed);
    assert_eq!(drain_tokens(rx), vec!["Hi"]);
}

#[tokio::test]
async fn stream_closed_without_finishing_is_truncated() {
    let body = delta("Hi", None) + &delta(" there", None);
    let (addr, _server) = serve_once(body).await;

    let (tx, rx) = mpsc::channel(16);
    let sink = TokenSink::new(tx);
    let err = chat_for(addr).stream_chat(&request(), &sink).await.unwrap_err();
    drop(sink);

    assert!(matches!(err, InferenceError::Truncated));
    assert_eq!(drain_tokens(rx), vec!["Hi", " there"]);
}

#[tokio::test]
async fn dropping_the_consumer_releases_the_upstream_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (released_tx, released_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket.write_all(SSE_HEAD.as_bytes()).await.unwrap();
        // Trickle tokens until the client goes away
        loop {
            if socket.write_all(delta("la ", None).as_bytes()).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let _ = released_tx.send(());
    });

    let chat = chat_for(addr);
    let (tx, mut rx) = mpsc::channel(4);
    let sink = TokenSink::new(tx);
    let generation = tokio::spawn(async move { chat.stream_chat(&request(), &sink).await });

    assert!(matches!(rx.recv().await, Some(ChatEvent::Token(_))));
    drop(rx);

    let end = tokio::time::timeout(Duration::from_secs(5), generation)
        .await
        .expect("generation kept running after the consumer left")
        .unwrap()
        .unwrap();
    assert_eq!(end, StreamEnd::Cancelled);

    tokio::time::timeout(Duration::from_secs(5), released_rx)
        .await
        .expect("upstream connection was never closed")
        .unwrap();
}
